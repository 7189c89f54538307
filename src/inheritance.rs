//! Base, derived, interface and override relationships.
//!
//! The type graph is read straight from the assembly model: every `TypeDef` knows its base type
//! token and its directly implemented interfaces. Base tokens that resolve outside the module
//! end a walk and are reported as external endpoints. Walks are bounded by the configured
//! maximum inheritance depth, which also guards against cyclic base chains in crafted files.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};

use serde::Serialize;

use crate::{
    config::{AnalyzerConfig, OverrideMatching},
    context::{BinaryContext, Snapshot},
    identity::{MemberId, MemberKind},
    metadata::{
        symbols::{Assembly, MethodDef, TypeDef},
        token::Token,
    },
    resolver::MemberResolver,
    search::{Page, PageRequest, Window},
    summary::{Symbol, SymbolSummary},
    Error::{InvalidArgument, NotFound},
    Result,
};

const SYSTEM_OBJECT: &str = "System.Object";

/// One type on an inheritance path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeEndpoint {
    /// Identifier, `None` for types outside the module
    pub id: Option<MemberId>,
    /// Full name
    pub name: String,
    /// Whether the type lives outside the module
    pub external: bool,
    /// Distance from the queried type, 1 for direct relations
    pub depth: usize,
}

impl TypeEndpoint {
    fn internal(assembly: &Assembly, type_def: &TypeDef, depth: usize) -> Self {
        TypeEndpoint {
            id: Some(MemberId::new(assembly.mvid, type_def.token, MemberKind::Type)),
            name: type_def.full_name.clone(),
            external: false,
            depth,
        }
    }

    fn of_token(assembly: &Assembly, token: Token, depth: usize) -> Self {
        match assembly
            .resolve_type_token(token)
            .and_then(|token| assembly.type_def(token))
        {
            Some(type_def) => Self::internal(assembly, type_def, depth),
            None => TypeEndpoint {
                id: None,
                name: assembly.type_name(token),
                external: true,
                depth,
            },
        }
    }
}

/// The override relations of one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overrides {
    /// The queried method
    pub method: MemberId,
    /// The nearest base type method this one overrides
    pub base_definition: Option<SymbolSummary>,
    /// Methods of derived types overriding this one
    pub overridden_by: Vec<SymbolSummary>,
}

/// Whether `candidate` occupies the same virtual slot as `method` under `rule`
fn same_slot(
    assembly: &Assembly,
    method: &MethodDef,
    candidate: &MethodDef,
    rule: OverrideMatching,
) -> bool {
    if method.name != candidate.name || !candidate.is_virtual() {
        return false;
    }

    match rule {
        OverrideMatching::ParameterCount => {
            method.signature.params.len() == candidate.signature.params.len()
        }
        OverrideMatching::Signature => {
            method.signature.param_count_generic == candidate.signature.param_count_generic
                && assembly.parameter_type_names(&method.signature)
                    == assembly.parameter_type_names(&candidate.signature)
        }
    }
}

/// Type relationship queries
pub struct InheritanceAnalyzer {
    context: Arc<BinaryContext>,
    resolver: Arc<MemberResolver>,
    config: AnalyzerConfig,
}

impl InheritanceAnalyzer {
    /// Creates the analyzer
    #[must_use]
    pub fn new(
        context: Arc<BinaryContext>,
        resolver: Arc<MemberResolver>,
        config: AnalyzerConfig,
    ) -> Self {
        InheritanceAnalyzer {
            context,
            resolver,
            config,
        }
    }

    fn require_type(&self, snapshot: &Snapshot, input: &str) -> Result<Arc<TypeDef>> {
        self.resolver
            .resolve_type_in(snapshot, input)
            .ok_or_else(|| NotFound(format!("'{input}' does not name a type")))
    }

    fn require_method(&self, snapshot: &Snapshot, input: &str) -> Result<Arc<MethodDef>> {
        match self.resolver.require_in(snapshot, input)? {
            Symbol::Method(method) => Ok(method),
            other => Err(InvalidArgument(format!(
                "'{input}' is a {}, not a method",
                other.kind()
            ))),
        }
    }

    /// Direct base, its base and so on, nearest first, skipping `System.Object`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `type_id` does not name a type,
    /// [`crate::Error::InvalidArgument`] for a zero `limit` and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_base_types(&self, type_id: &str, limit: usize) -> Result<Vec<TypeEndpoint>> {
        if limit == 0 {
            return Err(InvalidArgument("limit must be at least 1".to_string()));
        }

        let snapshot = self.context.snapshot()?;
        let assembly = &snapshot.assembly;
        let start = self.require_type(&snapshot, type_id)?;

        let mut bases = Vec::new();
        let mut visited = HashSet::from([start.token]);
        let mut current = start;
        while bases.len() < limit && bases.len() < self.config.max_inheritance_depth {
            let Some(base) = current.base else {
                break;
            };

            let endpoint = TypeEndpoint::of_token(assembly, base, bases.len() + 1);
            if endpoint.name == SYSTEM_OBJECT {
                break;
            }
            if endpoint.external {
                bases.push(endpoint);
                break;
            }

            let Some(next) = assembly
                .resolve_type_token(base)
                .and_then(|token| assembly.type_def(token))
            else {
                break;
            };
            if !visited.insert(next.token) {
                break;
            }
            bases.push(endpoint);
            current = next.clone();
        }

        Ok(bases)
    }

    /// Types directly derived from each type, keyed by base definition
    fn derived_map(assembly: &Assembly) -> HashMap<Token, Vec<Token>> {
        let mut derived: HashMap<Token, Vec<Token>> = HashMap::new();
        for type_def in &assembly.types {
            let Some(base) = type_def
                .base
                .and_then(|base| assembly.resolve_type_token(base))
            else {
                continue;
            };
            derived.entry(base).or_default().push(type_def.token);
        }
        derived
    }

    /// Breadth-first walk of the derived types of `root`, with their depth
    fn derived_of(&self, assembly: &Assembly, root: Token) -> Vec<(Token, usize)> {
        let derived = Self::derived_map(assembly);
        let mut found = Vec::new();
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([(root, 0usize)]);

        while let Some((token, depth)) = queue.pop_front() {
            if depth >= self.config.max_inheritance_depth {
                continue;
            }
            for child in derived.get(&token).into_iter().flatten() {
                if visited.insert(*child) {
                    found.push((*child, depth + 1));
                    queue.push_back((*child, depth + 1));
                }
            }
        }

        found
    }

    /// Every type whose base chain reaches `type_id`, ordered by depth and then full name.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `type_id` does not name a type,
    /// [`crate::Error::InvalidArgument`] for an invalid page request and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_derived_types(
        &self,
        type_id: &str,
        page: &PageRequest,
    ) -> Result<Page<TypeEndpoint>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let assembly = &snapshot.assembly;
        let root = self.require_type(&snapshot, type_id)?;

        let mut derived: Vec<TypeEndpoint> = self
            .derived_of(assembly, root.token)
            .into_iter()
            .filter_map(|(token, depth)| {
                assembly
                    .type_def(token)
                    .map(|type_def| TypeEndpoint::internal(assembly, type_def, depth))
            })
            .collect();
        derived.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.name.cmp(&b.name)));

        Ok(Page::complete(derived, window))
    }

    /// Interfaces `type_id` declares directly.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `type_id` does not name a type and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn get_implementations(&self, type_id: &str) -> Result<Vec<TypeEndpoint>> {
        let snapshot = self.context.snapshot()?;
        let assembly = &snapshot.assembly;
        let type_def = self.require_type(&snapshot, type_id)?;

        Ok(type_def
            .interfaces
            .iter()
            .map(|interface| TypeEndpoint::of_token(assembly, *interface, 1))
            .collect())
    }

    /// Types declaring `interface_id` directly, ordered by full name.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `interface_id` does not name a type,
    /// [`crate::Error::InvalidArgument`] for an invalid page request and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_implementors(
        &self,
        interface_id: &str,
        page: &PageRequest,
    ) -> Result<Page<TypeEndpoint>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let assembly = &snapshot.assembly;
        let interface = self.require_type(&snapshot, interface_id)?;

        let mut implementors: Vec<(Token, TypeEndpoint)> = assembly
            .types
            .iter()
            .filter(|type_def| {
                type_def.interfaces.iter().any(|token| {
                    assembly.resolve_type_token(*token) == Some(interface.token)
                })
            })
            .map(|type_def| (type_def.token, TypeEndpoint::internal(assembly, type_def, 1)))
            .collect();
        implementors.sort_by(|a, b| a.1.name.cmp(&b.1.name).then_with(|| a.0.cmp(&b.0)));

        Ok(Page::complete(
            implementors.into_iter().map(|(_, endpoint)| endpoint).collect(),
            window,
        ))
    }

    /// The nearest method up the base chain that `method` overrides; `None` for `newslot` and
    /// non-virtual methods
    fn base_method(&self, assembly: &Assembly, method: &MethodDef) -> Option<Arc<MethodDef>> {
        if !method.is_virtual() || method.is_new_slot() {
            return None;
        }

        let rule = self.config.override_matching;
        let mut visited = HashSet::new();
        let mut current = assembly.type_def(method.declaring_type)?.clone();
        loop {
            if visited.len() >= self.config.max_inheritance_depth
                || !visited.insert(current.token)
            {
                return None;
            }

            let base = current
                .base
                .and_then(|base| assembly.resolve_type_token(base))
                .and_then(|base| assembly.type_def(base))?;
            let found = base
                .methods
                .iter()
                .filter_map(|token| assembly.method(*token))
                .find(|candidate| {
                    candidate.token != method.token && same_slot(assembly, method, candidate, rule)
                });
            if let Some(found) = found {
                return Some(found.clone());
            }
            current = base.clone();
        }
    }

    /// Whether following base definitions upward from `candidate` arrives at `target`. A
    /// `newslot` redeclaration on the way breaks the chain.
    fn reaches_slot(&self, assembly: &Assembly, candidate: &MethodDef, target: &MethodDef) -> bool {
        let mut current = self.base_method(assembly, candidate);
        let mut steps = 0;
        while let Some(base) = current {
            if base.token == target.token {
                return true;
            }
            steps += 1;
            if steps >= self.config.max_inheritance_depth {
                return false;
            }
            current = self.base_method(assembly, &base);
        }
        false
    }

    /// The base method `method_id` overrides and the derived methods overriding it.
    ///
    /// Only virtual methods take part; a `newslot` method starts a new slot and has no base
    /// definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method_id` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn get_overrides(&self, method_id: &str) -> Result<Overrides> {
        let snapshot = self.context.snapshot()?;
        let assembly = &snapshot.assembly;
        let method = self.require_method(&snapshot, method_id)?;
        let rule = self.config.override_matching;

        let mut overrides = Overrides {
            method: Symbol::Method(method.clone()).id(assembly.mvid),
            base_definition: None,
            overridden_by: Vec::new(),
        };
        if !method.is_virtual() {
            return Ok(overrides);
        }

        overrides.base_definition = self
            .base_method(assembly, &method)
            .map(|found| Symbol::Method(found).summary(assembly));

        for (token, _) in self.derived_of(assembly, method.declaring_type) {
            let Some(type_def) = assembly.type_def(token) else {
                continue;
            };
            overrides.overridden_by.extend(
                type_def
                    .methods
                    .iter()
                    .filter_map(|token| assembly.method(*token))
                    .filter(|candidate| same_slot(assembly, &method, candidate, rule))
                    .filter(|candidate| self.reaches_slot(assembly, candidate, &method))
                    .map(|candidate| Symbol::Method(candidate.clone()).summary(assembly)),
            );
        }

        Ok(overrides)
    }

    /// Methods of the same declaring type sharing the name of `method_id`, in token order.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method_id` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn get_overloads(&self, method_id: &str) -> Result<Vec<SymbolSummary>> {
        let snapshot = self.context.snapshot()?;
        let assembly = &snapshot.assembly;
        let method = self.require_method(&snapshot, method_id)?;

        Ok(assembly
            .type_def(method.declaring_type)
            .into_iter()
            .flat_map(|type_def| type_def.methods.iter())
            .filter_map(|token| assembly.method(*token))
            .filter(|candidate| candidate.token != method.token && candidate.name == method.name)
            .map(|candidate| Symbol::Method(candidate.clone()).summary(assembly))
            .collect())
    }
}
