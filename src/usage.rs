//! Cross references found by scanning method bodies.
//!
//! A usage scan decodes every method body in type declaration order and records the
//! instructions whose token operand denotes the target. The set of tokens denoting a target is
//! computed up front: the definition itself plus every `MemberRef`, `MethodSpec` and `TypeSpec`
//! of the module that resolves to it. Properties and events are found through their accessors.
//!
//! Scans are incremental. One call inspects method bodies in parallel batches until the
//! requested window is filled, the scan is finished, or the configured time or method budget is
//! spent. Scan progress is kept in the usage cache under the query, so following the returned
//! cursor continues where the previous call stopped.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Instant,
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    cache::{CacheKind, GenerationCache},
    config::AnalyzerConfig,
    context::{BinaryContext, Snapshot},
    disassembler::{decode_stream, render_instruction, Instruction},
    file::parser::Parser,
    identity::MemberId,
    metadata::{
        symbols::{Assembly, MethodDef},
        tables::TableId,
        token::Token,
    },
    resolver::MemberResolver,
    search::{matcher::Matcher, Page, PageRequest, Window},
    summary::Symbol,
    Error::InvalidArgument,
    Result,
};

/// How an instruction refers to its target
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum UsageKind {
    /// Method call, also `ldftn` and `jmp`
    Call,
    /// `ldfld`, `ldsfld` and their address forms
    FieldRead,
    /// `stfld`, `stsfld`
    FieldWrite,
    /// Call of a property getter
    PropertyRead,
    /// Call of a property setter
    PropertyWrite,
    /// `newobj`
    NewObject,
    /// Any other token reference to a type
    TypeReference,
}

/// A directed reference from a method to a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEdge {
    /// The method containing the instruction
    pub source: MemberId,
    /// Full name of the source method
    pub source_name: String,
    /// The referenced symbol, `None` for targets outside the module
    pub target: Option<MemberId>,
    /// Full name of the referenced symbol
    pub target_name: String,
    /// Kind of reference
    pub kind: UsageKind,
    /// Offset of the first such instruction in the source method
    pub il_offset: u32,
    /// Source line; always `None`, debug symbols are not read
    pub line: Option<u32>,
    /// The rendered instruction
    pub snippet: Option<String>,
    /// Whether the target lives outside the module
    pub external: bool,
}

/// An `ldstr` occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StringLiteral {
    /// The method loading the literal
    pub source: MemberId,
    /// Full name of the method
    pub source_name: String,
    /// Offset of the `ldstr`
    pub il_offset: u32,
    /// The literal
    pub value: String,
    /// The rendered instruction
    pub snippet: String,
}

/// Decodes the body of `method`; malformed bodies are logged and skipped
pub(crate) fn instructions(method: &MethodDef) -> Option<Vec<Instruction>> {
    let body = method.body.as_ref()?;
    match decode_stream(&mut Parser::new(body)) {
        Ok(instructions) => Some(instructions),
        Err(error) => {
            warn!(method = %method.token, name = %method.name, %error, "skipping malformed method body");
            None
        }
    }
}

/// Name of a method-denoting token that may point outside the module
fn reference_name(assembly: &Assembly, token: Token) -> String {
    if let Some(member_ref) = assembly.member_ref(token) {
        return format!("{}.{}", assembly.type_name(member_ref.parent), member_ref.name);
    }
    if let Some(method_spec) = assembly.method_spec(token) {
        return reference_name(assembly, method_spec.method);
    }

    Symbol::from_token(assembly, token)
        .map_or_else(|| assembly.type_name(token), |symbol| symbol.full_name(assembly))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Method,
    Getter,
    Setter,
    Field,
    Type,
    /// Constructor of a target type; only `newobj` counts
    Constructor,
}

/// The tokens that denote one target and what each of them means
struct Target {
    id: MemberId,
    name: String,
    roles: HashMap<Token, Role>,
}

impl Target {
    fn new(assembly: &Assembly, symbol: &Symbol) -> Target {
        let mut roles = HashMap::new();
        match symbol {
            Symbol::Type(type_def) => {
                roles.insert(type_def.token, Role::Type);
                for method in type_def.methods.iter().filter_map(|token| assembly.method(*token)) {
                    if method.is_constructor() {
                        roles.insert(method.token, Role::Constructor);
                    }
                }
            }
            Symbol::Method(method) => {
                roles.insert(method.token, Role::Method);
            }
            Symbol::Field(field) => {
                roles.insert(field.token, Role::Field);
            }
            Symbol::Property(property) => {
                if let Some(getter) = property.getter {
                    roles.insert(getter, Role::Getter);
                }
                if let Some(setter) = property.setter {
                    roles.insert(setter, Role::Setter);
                }
            }
            Symbol::Event(event) => {
                for accessor in event.accessors() {
                    roles.insert(accessor, Role::Method);
                }
            }
        }

        let aliases: Vec<(Token, Role)> = assembly
            .member_refs
            .iter()
            .map(|member_ref| member_ref.token)
            .chain(assembly.method_specs.iter().map(|spec| spec.token))
            .chain(assembly.type_specs.iter().map(|spec| spec.token))
            .filter_map(|alias| {
                let definition = assembly.resolve_definition(alias)?;
                roles.get(&definition).map(|role| (alias, *role))
            })
            .collect();
        roles.extend(aliases);

        Target {
            id: symbol.id(assembly.mvid),
            name: symbol.full_name(assembly),
            roles,
        }
    }

    fn classify(&self, instruction: &Instruction) -> Option<UsageKind> {
        let role = self.roles.get(&instruction.token()?)?;
        let mnemonic = instruction.mnemonic;

        Some(match role {
            Role::Method if mnemonic == "newobj" => UsageKind::NewObject,
            Role::Method => UsageKind::Call,
            Role::Getter => UsageKind::PropertyRead,
            Role::Setter => UsageKind::PropertyWrite,
            Role::Field if matches!(mnemonic, "stfld" | "stsfld") => UsageKind::FieldWrite,
            Role::Field => UsageKind::FieldRead,
            Role::Type => UsageKind::TypeReference,
            Role::Constructor if mnemonic == "newobj" => UsageKind::NewObject,
            Role::Constructor => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ScanKey {
    Usages(Token),
    Callers(Token),
    Literals { pattern: String, use_regex: bool },
}

/// Progress of one incremental scan
struct ScanState<T> {
    order: Arc<[Token]>,
    next: usize,
    found: Vec<T>,
}

impl<T: Send> ScanState<T> {
    fn new(snapshot: &Snapshot) -> Self {
        ScanState {
            order: snapshot
                .types()
                .flat_map(|type_def| type_def.methods.iter().copied())
                .collect(),
            next: 0,
            found: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.next >= self.order.len()
    }

    /// Scans until more than `wanted` results exist, the scan ends, or a budget runs out.
    ///
    /// The lock is held only to claim a batch and to commit its results, never while the batch
    /// runs on the rayon pool. A batch whose start was committed by a concurrent caller in the
    /// meantime is discarded.
    fn advance<F>(
        state: &Mutex<Self>,
        assembly: &Assembly,
        wanted: usize,
        config: &AnalyzerConfig,
        scan: F,
    ) where
        F: Fn(&Arc<MethodDef>) -> Vec<T> + Sync,
    {
        let started = Instant::now();
        let batch_size = config.scan_batch_size.max(1);
        let mut scanned = 0;

        loop {
            let (order, start) = {
                let state = lock!(state);
                if state.is_complete() || state.found.len() > wanted {
                    return;
                }
                (state.order.clone(), state.next)
            };
            if scanned > 0
                && (scanned >= config.scan_method_budget
                    || started.elapsed() >= config.scan_time_budget())
            {
                debug!(scanned, next = start, total = order.len(), "scan budget spent");
                return;
            }

            let end = (start + batch_size).min(order.len());
            let batch: Vec<Vec<T>> = order[start..end]
                .par_iter()
                .map(|token| assembly.method(*token).map(&scan).unwrap_or_default())
                .collect();
            scanned += end - start;

            let mut state = lock!(state);
            if state.next == start {
                state.found.extend(batch.into_iter().flatten());
                state.next = end;
            }
        }
    }
}

type Scans<T> = GenerationCache<ScanKey, Arc<Mutex<ScanState<T>>>>;

/// Usage, caller, callee and string literal queries
pub struct UsageAnalyzer {
    context: Arc<BinaryContext>,
    resolver: Arc<MemberResolver>,
    config: AnalyzerConfig,
    edges: Arc<Scans<UsageEdge>>,
    literals: Arc<Scans<StringLiteral>>,
}

impl UsageAnalyzer {
    /// Creates the analyzer and registers its scan caches with `context`
    #[must_use]
    pub fn new(
        context: Arc<BinaryContext>,
        resolver: Arc<MemberResolver>,
        config: AnalyzerConfig,
    ) -> Self {
        let edges = Arc::new(GenerationCache::new(CacheKind::Usage, "usage"));
        let literals = Arc::new(GenerationCache::new(CacheKind::Usage, "literals"));
        context.register_cache(edges.clone());
        context.register_cache(literals.clone());

        UsageAnalyzer {
            context,
            resolver,
            config,
            edges,
            literals,
        }
    }

    fn method_target(&self, snapshot: &Snapshot, input: &str) -> Result<Arc<MethodDef>> {
        match self.resolver.require_in(snapshot, input)? {
            Symbol::Method(method) => Ok(method),
            other => Err(InvalidArgument(format!(
                "'{input}' is a {}, not a method",
                other.kind()
            ))),
        }
    }

    fn scan_edges(
        &self,
        snapshot: &Snapshot,
        key: ScanKey,
        target: &Target,
        calls_only: bool,
        window: Window,
    ) -> Page<UsageEdge> {
        let assembly = &snapshot.assembly;
        let state = self.edges.get_or_insert_with(key, snapshot.generation, || {
            Arc::new(Mutex::new(ScanState::new(snapshot)))
        });
        ScanState::advance(&state, assembly, window.end(), &self.config, |method| {
            let Some(instructions) = instructions(method) else {
                return Vec::new();
            };

            let source = Symbol::Method(method.clone());
            let mut edges: Vec<UsageEdge> = Vec::new();
            for instruction in &instructions {
                let Some(kind) = target.classify(instruction) else {
                    continue;
                };
                if calls_only && !matches!(kind, UsageKind::Call | UsageKind::NewObject) {
                    continue;
                }
                // one edge per (method, kind), at the first occurrence
                if edges.iter().any(|edge| edge.kind == kind) {
                    continue;
                }

                edges.push(UsageEdge {
                    source: source.id(assembly.mvid),
                    source_name: source.full_name(assembly),
                    target: Some(target.id),
                    target_name: target.name.clone(),
                    kind,
                    il_offset: instruction.offset,
                    line: None,
                    snippet: Some(render_instruction(assembly, instruction)),
                    external: false,
                });
            }
            edges
        });

        let state = lock!(state);
        Page::scanned(&state.found, window, state.is_complete())
    }

    /// Every method referencing `target`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `target` does not resolve,
    /// [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn find_usages(&self, target: &str, page: &PageRequest) -> Result<Page<UsageEdge>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let symbol = self.resolver.require_in(&snapshot, target)?;
        let target = Target::new(&snapshot.assembly, &symbol);

        Ok(self.scan_edges(
            &snapshot,
            ScanKey::Usages(symbol.token()),
            &target,
            false,
            window,
        ))
    }

    /// Methods calling or instantiating through `method`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method or the page request is invalid,
    /// and [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_callers(&self, method: &str, page: &PageRequest) -> Result<Page<UsageEdge>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let method = self.method_target(&snapshot, method)?;
        let symbol = Symbol::Method(method);
        let target = Target::new(&snapshot.assembly, &symbol);

        Ok(self.scan_edges(
            &snapshot,
            ScanKey::Callers(symbol.token()),
            &target,
            true,
            window,
        ))
    }

    /// Methods called or instantiated by `method`, external references included.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method or the page request is invalid,
    /// and [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_callees(&self, method: &str, page: &PageRequest) -> Result<Page<UsageEdge>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let method = self.method_target(&snapshot, method)?;
        let assembly = &snapshot.assembly;
        let source = Symbol::Method(method.clone());

        let mut edges: Vec<UsageEdge> = Vec::new();
        let mut seen: Vec<(Token, UsageKind)> = Vec::new();
        for instruction in instructions(&method).unwrap_or_default() {
            let kind = match instruction.mnemonic {
                "newobj" => UsageKind::NewObject,
                "call" | "callvirt" | "jmp" | "ldftn" | "ldvirtftn" => UsageKind::Call,
                _ => continue,
            };
            let Some(token) = instruction.token() else {
                continue;
            };
            if token.table() == TableId::StandAloneSig as u8 {
                continue;
            }

            let definition = assembly.resolve_definition(token);
            let identity = definition.unwrap_or(token);
            if seen.contains(&(identity, kind)) {
                continue;
            }
            seen.push((identity, kind));

            let target = definition.and_then(|token| Symbol::from_token(assembly, token));
            edges.push(UsageEdge {
                source: source.id(assembly.mvid),
                source_name: source.full_name(assembly),
                target: target.as_ref().map(|symbol| symbol.id(assembly.mvid)),
                target_name: target
                    .as_ref()
                    .map_or_else(|| reference_name(assembly, token), |symbol| symbol.full_name(assembly)),
                kind,
                il_offset: instruction.offset,
                line: None,
                snippet: Some(render_instruction(assembly, &instruction)),
                external: target.is_none(),
            });
        }

        Ok(Page::complete(edges, window))
    }

    /// `ldstr` literals matching `pattern`; an empty pattern matches every literal.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn find_string_literals(
        &self,
        pattern: &str,
        use_regex: bool,
        page: &PageRequest,
    ) -> Result<Page<StringLiteral>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let assembly = &snapshot.assembly;
        let matcher = Matcher::new(pattern, use_regex, self.config.regex_size_limit);

        let key = ScanKey::Literals {
            pattern: pattern.to_string(),
            use_regex,
        };
        let state = self.literals.get_or_insert_with(key, snapshot.generation, || {
            Arc::new(Mutex::new(ScanState::new(&snapshot)))
        });
        ScanState::advance(&state, assembly, window.end(), &self.config, |method| {
            let source = Symbol::Method(method.clone());
            instructions(method)
                .unwrap_or_default()
                .iter()
                .filter(|instruction| instruction.mnemonic == "ldstr")
                .filter_map(|instruction| {
                    let value = assembly.user_string(instruction.token()?)?;
                    matcher.is_match(&value).then(|| StringLiteral {
                        source: source.id(assembly.mvid),
                        source_name: source.full_name(assembly),
                        il_offset: instruction.offset,
                        value,
                        snippet: render_instruction(assembly, instruction),
                    })
                })
                .collect()
        });

        let state = lock!(state);
        Ok(Page::scanned(&state.found, window, state.is_complete()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CacheScope,
        test::{sample, Sample},
    };

    fn analyzer(config: AnalyzerConfig) -> (Sample, Arc<BinaryContext>, UsageAnalyzer) {
        let sample = sample();
        let context = Arc::new(BinaryContext::new());
        context.load_assembly(sample.assembly.clone()).unwrap();
        let resolver = Arc::new(MemberResolver::new(context.clone()));
        let usage = UsageAnalyzer::new(context.clone(), resolver, config);
        (sample, context, usage)
    }

    fn hex(token: Token) -> String {
        format!("0x{:08x}", token.value())
    }

    #[test]
    fn field_usages() {
        let (sample, _, usage) = analyzer(AnalyzerConfig::default());
        let page = usage
            .find_usages(&hex(sample.counter_field), &PageRequest::default())
            .unwrap();

        assert_eq!(page.len(), 2);
        assert!(page.scan_complete && !page.has_more);
        let read = &page.items[0];
        assert_eq!(read.kind, UsageKind::FieldRead);
        assert_eq!(read.source.token, sample.get_count);
        assert_eq!(read.il_offset, 1);
        assert_eq!(read.line, None);
        assert_eq!(
            read.snippet.as_deref(),
            Some("IL_0001: ldfld System.Int32 Sample.SimpleClass::counter")
        );
        let write = &page.items[1];
        assert_eq!(write.kind, UsageKind::FieldWrite);
        assert_eq!(write.source.token, sample.reset);
        assert_eq!(write.target_name, "Sample.SimpleClass.counter");
    }

    #[test]
    fn method_usages_through_references() {
        let (sample, _, usage) = analyzer(AnalyzerConfig::default());

        // Main calls Animal.Speak through a MemberRef, Describe calls it directly
        let page = usage
            .find_usages("M:Sample.Animals.Animal.Speak", &PageRequest::default())
            .unwrap();
        let sources: Vec<Token> = page.items.iter().map(|edge| edge.source.token).collect();
        assert_eq!(sources, vec![sample.animal_describe, sample.main]);
        assert!(page.items.iter().all(|edge| edge.kind == UsageKind::Call));

        // Main calls Identity<int> through a MethodSpec
        let page = usage
            .find_usages("M:Sample.Util.Helper.Identity", &PageRequest::default())
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.items[0].source.token, sample.main);
    }

    #[test]
    fn property_and_type_usages() {
        let (sample, _, usage) = analyzer(AnalyzerConfig::default());
        let count = usage
            .find_usages("P:Sample.SimpleClass.Count", &PageRequest::default())
            .unwrap();
        assert_eq!(count.len(), 1);
        assert_eq!(count.items[0].kind, UsageKind::PropertyRead);
        assert_eq!(count.items[0].source.token, sample.main);

        let dog = usage.find_usages(&hex(sample.dog), &PageRequest::default()).unwrap();
        assert_eq!(dog.len(), 1);
        assert_eq!(dog.items[0].kind, UsageKind::NewObject);
    }

    #[test]
    fn callers_and_callees() {
        let (sample, _, usage) = analyzer(AnalyzerConfig::default());
        let callers = usage
            .find_callers(&hex(sample.animal_ctor), &PageRequest::default())
            .unwrap();
        assert_eq!(callers.len(), 1);
        assert_eq!(callers.items[0].source.token, sample.dog_ctor);

        let callees = usage
            .find_callees(&hex(sample.main), &PageRequest::default())
            .unwrap();
        let names: Vec<&str> = callees.items.iter().map(|edge| edge.target_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Sample.Animals.Dog..ctor",
                "Sample.Animals.Animal.Speak",
                "System.Console.WriteLine",
                "Sample.Util.Helper.Format",
                "Sample.SimpleClass..ctor",
                "Sample.SimpleClass.get_Count",
                "Sample.Util.Helper.Identity",
            ]
        );
        let write_line = &callees.items[2];
        assert!(write_line.external);
        assert!(write_line.target.is_none());
        assert_eq!(callees.items[0].kind, UsageKind::NewObject);

        assert!(matches!(
            usage.find_callers(&hex(sample.counter_field), &PageRequest::default()),
            Err(InvalidArgument(_))
        ));
        assert!(matches!(
            usage.find_callers("missing", &PageRequest::default()),
            Err(crate::Error::NotFound(_))
        ));
    }

    #[test]
    fn string_literals() {
        let (sample, _, usage) = analyzer(AnalyzerConfig::default());
        let all = usage.find_string_literals("", false, &PageRequest::default()).unwrap();
        let values: Vec<&str> = all.items.iter().map(|literal| literal.value.as_str()).collect();
        assert_eq!(values, vec!["Woof", "Yip", "Meow", "Hello, \"world\""]);

        let regex = usage
            .find_string_literals("^(woof|meow)$", true, &PageRequest::default())
            .unwrap();
        assert_eq!(regex.len(), 2);

        let hello = usage.find_string_literals("hello", false, &PageRequest::default()).unwrap();
        assert_eq!(hello.items[0].source.token, sample.main);
        assert_eq!(hello.items[0].snippet, "IL_000f: ldstr \"Hello, \\\"world\\\"\"");
    }

    #[test]
    fn budgeted_scans_resume() {
        let config = AnalyzerConfig::default()
            .with_scan_method_budget(1)
            .with_scan_batch_size(1);
        let (sample, context, usage) = analyzer(config);
        let (_, _, unbounded) = analyzer(AnalyzerConfig::default());
        let target = hex(sample.counter_field);

        let expected = unbounded.find_usages(&target, &PageRequest::default()).unwrap();

        let mut request = PageRequest::first(10);
        let mut collected = Vec::new();
        let mut calls = 0;
        loop {
            let page = usage.find_usages(&target, &request).unwrap();
            calls += 1;
            collected.extend(page.items);
            if page.scan_complete && !page.has_more {
                break;
            }
            assert!(page.has_more);
            request.cursor = page.next_cursor;
        }

        assert!(calls > 1);
        assert_eq!(collected, expected.items);
        assert!(context
            .cache_stats()
            .iter()
            .any(|stats| stats.name == "usage" && stats.entries == 1));
        assert_eq!(usage.edges.stats().entries, 1);
    }

    #[test]
    fn shared_scans_from_rayon_workers() {
        let config = AnalyzerConfig::default().with_scan_batch_size(1);
        let (sample, _, usage) = analyzer(config);
        let target = hex(sample.counter_field);

        let pages: Vec<Page<UsageEdge>> = (0..32)
            .into_par_iter()
            .map(|_| usage.find_usages(&target, &PageRequest::default()).unwrap())
            .collect();

        let literals: Vec<Page<StringLiteral>> = (0..32)
            .into_par_iter()
            .map(|_| usage.find_string_literals("", false, &PageRequest::default()).unwrap())
            .collect();

        for page in &pages {
            assert!(page.scan_complete);
            assert_eq!(page.items, pages[0].items);
        }
        assert_eq!(pages[0].len(), 2);
        for page in &literals {
            assert_eq!(page.items, literals[0].items);
        }
        assert_eq!(literals[0].len(), 4);
        assert_eq!(usage.edges.stats().entries, 1);
    }
}
