//! Resolution of arbitrary user input to symbols.
//!
//! [`MemberResolver::resolve`] tries a fixed chain of strategies and returns the first hit:
//!
//! 1. a canonical [`MemberId`] looked up in the member index,
//! 2. a documentation-comment style name, `<T|M|F|P|E>:<Namespace.Type.Member>`, where methods
//!    may carry a parenthesized parameter type list to pick an overload and `/` may stand in
//!    for the nested type separator `+`,
//! 3. a `0x` prefixed hexadecimal token,
//! 4. a decimal token.
//!
//! Tokens of member references and method instantiations resolve to the definition they denote
//! when it lives in the loaded module. The outcome, including "nothing found", is cached per
//! input string and generation.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::trace;

use crate::{
    cache::{CacheKind, CacheScope, GenerationCache},
    context::{BinaryContext, Snapshot},
    identity::{namespace_id, namespace_of, MemberId, MemberKind},
    metadata::{
        signatures::SignatureParameter,
        symbols::{Assembly, MethodDef, TypeDef},
        token::Token,
    },
    summary::Symbol,
    Error::NotFound,
    Result,
};

/// Resolution counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Cached inputs
    pub entries: usize,
    /// Inputs answered from the cache
    pub hits: u64,
    /// Inputs that ran the strategy chain
    pub misses: u64,
    /// Chain runs that found a symbol
    pub successes: u64,
    /// Chain runs that found nothing
    pub failures: u64,
    /// Individual strategy attempts
    pub strategy_runs: u64,
}

#[derive(Debug, Clone, Copy, strum::EnumIter, strum::Display)]
enum Strategy {
    MemberId,
    DocumentationId,
    HexToken,
    DecimalToken,
}

impl Strategy {
    /// Whether `input` has the textual shape this strategy understands
    fn accepts(self, input: &str) -> bool {
        match self {
            Strategy::MemberId => MemberId::is_canonical(input),
            Strategy::DocumentationId => input
                .split_once(':')
                .is_some_and(|(prefix, rest)| {
                    matches!(prefix, "T" | "M" | "F" | "P" | "E") && !rest.trim().is_empty()
                }),
            Strategy::HexToken => input
                .strip_prefix("0x")
                .or_else(|| input.strip_prefix("0X"))
                .is_some_and(|digits| u32::from_str_radix(digits, 16).is_ok()),
            Strategy::DecimalToken => input.parse::<u32>().is_ok(),
        }
    }

    fn run(self, snapshot: &Snapshot, input: &str) -> Option<Symbol> {
        let assembly = &snapshot.assembly;
        match self {
            Strategy::MemberId => {
                let id = MemberId::parse(input).ok()?;
                if id.mvid != assembly.mvid {
                    return None;
                }
                snapshot.indexes.members(assembly).get(&id).cloned()
            }
            Strategy::DocumentationId => by_documentation_id(snapshot, input),
            Strategy::HexToken => {
                let digits = input
                    .strip_prefix("0x")
                    .or_else(|| input.strip_prefix("0X"))?;
                let value = u32::from_str_radix(digits, 16).ok()?;
                by_token(assembly, Token::new(value))
            }
            Strategy::DecimalToken => {
                let value = input.parse::<u32>().ok()?;
                by_token(assembly, Token::new(value))
            }
        }
    }
}

fn by_token(assembly: &Assembly, token: Token) -> Option<Symbol> {
    Symbol::from_token(assembly, assembly.resolve_definition(token)?)
}

/// Splits `Ns.Type.Member`, `Ns.Type::Member` and the constructor forms into type and member
fn split_member(path: &str) -> Option<(&str, String)> {
    if let Some((owner, member)) = path.rsplit_once("::") {
        return Some((owner, member.to_string()));
    }

    for (suffix, name) in [
        ("..ctor", ".ctor"),
        ("..cctor", ".cctor"),
        (".#ctor", ".ctor"),
        (".#cctor", ".cctor"),
    ] {
        if let Some(owner) = path.strip_suffix(suffix) {
            return Some((owner, name.to_string()));
        }
    }

    path.rsplit_once('.')
        .map(|(owner, member)| (owner, member.to_string()))
}

/// Splits a parameter list on its top level commas
fn split_parameters(list: &str) -> Vec<String> {
    let mut parameters = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '<' | '[' | '(' | '{' => depth += 1,
            '>' | ']' | ')' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parameters.push(normalize_type_text(&current));
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if !current.trim().is_empty() {
        parameters.push(normalize_type_text(&current));
    }
    parameters
}

fn normalize_type_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '{' => '<',
            '}' => '>',
            '@' => '&',
            '/' => '+',
            other => other,
        })
        .collect()
}

fn parameter_matches(assembly: &Assembly, parameter: &SignatureParameter, wanted: &str) -> bool {
    let rendered = parameter.render(&|token| assembly.type_name(token));
    if rendered == wanted {
        return true;
    }

    match parameter.base.keyword() {
        Some(keyword) if parameter.by_ref => wanted == format!("{keyword}&"),
        Some(keyword) => wanted == keyword,
        None => false,
    }
}

fn method_matches(
    assembly: &Assembly,
    method: &MethodDef,
    name: &str,
    arity: Option<u32>,
    parameters: Option<&[String]>,
) -> bool {
    if method.name != name {
        return false;
    }
    if arity.is_some_and(|arity| arity != method.signature.param_count_generic) {
        return false;
    }

    match parameters {
        None => true,
        Some(parameters) => {
            parameters.len() == method.signature.params.len()
                && method
                    .signature
                    .params
                    .iter()
                    .zip(parameters)
                    .all(|(parameter, wanted)| parameter_matches(assembly, parameter, wanted))
        }
    }
}

fn by_documentation_id(snapshot: &Snapshot, input: &str) -> Option<Symbol> {
    let assembly = &snapshot.assembly;
    let (prefix, rest) = input.split_once(':')?;
    let kind = match prefix {
        "T" => MemberKind::Type,
        "M" => MemberKind::Method,
        "F" => MemberKind::Field,
        "P" => MemberKind::Property,
        "E" => MemberKind::Event,
        _ => return None,
    };

    let rest = rest.trim().replace('/', "+");
    let names = snapshot.indexes.type_names(assembly);
    if kind == MemberKind::Type {
        return by_token(assembly, names.by_full_name(&rest)?);
    }

    let (path, parameters) = match rest.find('(') {
        Some(open) if rest.ends_with(')') => (
            &rest[..open],
            Some(split_parameters(&rest[open + 1..rest.len() - 1])),
        ),
        _ => (rest.as_str(), None),
    };

    let (owner, member) = split_member(path)?;
    let owner: &Arc<TypeDef> = assembly.type_def(names.by_full_name(owner)?)?;

    let tokens = match kind {
        MemberKind::Method => {
            let (name, arity) = match member.split_once("``") {
                Some((name, arity)) => (name.to_string(), Some(arity.parse::<u32>().ok()?)),
                None => (member, None),
            };
            return owner
                .methods
                .iter()
                .filter_map(|token| assembly.method(*token))
                .find(|method| {
                    method_matches(assembly, method, &name, arity, parameters.as_deref())
                })
                .and_then(|method| by_token(assembly, method.token));
        }
        MemberKind::Field => &owner.fields,
        MemberKind::Property => &owner.properties,
        MemberKind::Event => &owner.events,
        MemberKind::Type => return None,
    };

    tokens
        .iter()
        .filter_map(|token| Symbol::from_token(assembly, *token))
        .find(|symbol| symbol.name() == member)
}

/// Multi-strategy resolver with positive and negative caching
pub struct MemberResolver {
    context: Arc<BinaryContext>,
    cache: Arc<GenerationCache<String, Option<Symbol>>>,
    successes: AtomicU64,
    failures: AtomicU64,
    strategy_runs: AtomicU64,
}

impl MemberResolver {
    /// Creates a resolver and registers its cache with `context`
    #[must_use]
    pub fn new(context: Arc<BinaryContext>) -> Self {
        let cache = Arc::new(GenerationCache::new(CacheKind::Resolution, "resolution"));
        context.register_cache(cache.clone());

        MemberResolver {
            context,
            cache,
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            strategy_runs: AtomicU64::new(0),
        }
    }

    /// Resolves `input` against the loaded assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded. Unresolvable input is
    /// `Ok(None)`.
    pub fn resolve(&self, input: &str) -> Result<Option<Symbol>> {
        let snapshot = self.context.snapshot()?;
        Ok(self.resolve_in(&snapshot, input))
    }

    /// Resolves `input` against a snapshot the caller already holds
    #[must_use]
    pub fn resolve_in(&self, snapshot: &Snapshot, input: &str) -> Option<Symbol> {
        let key = input.trim().to_string();
        if let Some(cached) = self.cache.get(&key, snapshot.generation) {
            return cached;
        }

        let resolved = Strategy::iter().find_map(|strategy| {
            self.strategy_runs.fetch_add(1, Ordering::Relaxed);
            let symbol = strategy.run(snapshot, &key)?;
            trace!(input = %key, %strategy, "resolved");
            Some(symbol)
        });

        if resolved.is_some() {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        self.cache.insert(key, snapshot.generation, resolved.clone());
        resolved
    }

    /// Resolves `input`, failing when it names nothing.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `input` does not resolve.
    pub fn require_in(&self, snapshot: &Snapshot, input: &str) -> Result<Symbol> {
        self.resolve_in(snapshot, input)
            .ok_or_else(|| NotFound(format!("'{input}' does not name a symbol")))
    }

    /// Resolves `input` to a type definition, also accepting a plain full or simple type name
    #[must_use]
    pub fn resolve_type_in(&self, snapshot: &Snapshot, input: &str) -> Option<Arc<TypeDef>> {
        match self.resolve_in(snapshot, input) {
            Some(Symbol::Type(type_def)) => Some(type_def),
            Some(_) => None,
            None => {
                let assembly = &snapshot.assembly;
                let token = snapshot.indexes.type_names(assembly).get(input.trim())?;
                assembly.type_def(token).cloned()
            }
        }
    }

    /// Resolves a namespace identifier (`N:<name>`) or bare namespace name to a namespace of
    /// the loaded assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn resolve_namespace(&self, input: &str) -> Result<Option<String>> {
        let snapshot = self.context.snapshot()?;
        let name = namespace_of(input).unwrap_or(input);
        let known = snapshot
            .indexes
            .namespace_types(&snapshot.assembly)
            .contains_key(name);

        Ok(known.then(|| name.to_string()))
    }

    /// Resolves `input` and re-encodes it canonically; canonical identifiers map to
    /// themselves.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn normalize(&self, input: &str) -> Result<Option<String>> {
        if namespace_of(input).is_some() {
            return Ok(self.resolve_namespace(input)?.map(|name| namespace_id(&name)));
        }

        let snapshot = self.context.snapshot()?;
        Ok(self
            .resolve_in(&snapshot, input)
            .map(|symbol| symbol.id(snapshot.assembly.mvid).to_string()))
    }

    /// Whether `input` has one of the shapes [`MemberResolver::resolve`] understands, or is a
    /// namespace identifier. Purely syntactic; nothing is looked up.
    #[must_use]
    pub fn is_well_formed(input: &str) -> bool {
        let input = input.trim();
        namespace_of(input).is_some() || Strategy::iter().any(|strategy| strategy.accepts(input))
    }

    /// The canonical identifier of `symbol` in the loaded module.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn generate_id(&self, symbol: &Symbol) -> Result<MemberId> {
        Ok(symbol.id(self.context.snapshot()?.assembly.mvid))
    }

    /// Drops every cached resolution
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        let cache = self.cache.stats();
        ResolverStats {
            entries: cache.entries,
            hits: cache.hits,
            misses: cache.misses,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            strategy_runs: self.strategy_runs.load(Ordering::Relaxed),
        }
    }
}
