//! The [`Analyzer`] facade.
//!
//! An `Analyzer` owns one [`BinaryContext`] and builds every analysis component over it. It is
//! the object a transport layer holds on to: each exposed operation maps to one request, and
//! every result type is `serde::Serialize`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotlens::{search::TypeSearch, Analyzer};
//!
//! let analyzer = Analyzer::new();
//! let info = analyzer.load("tests/samples/Sample.dll".as_ref(), &[])?;
//! println!("{} {} ({} types)", info.name, info.version, info.types);
//!
//! let page = analyzer.search_types(&TypeSearch::matching("Simple"))?;
//! for summary in &page.items {
//!     println!("{} {}", summary.id, summary.full_name);
//! }
//! # Ok::<(), dotlens::Error>(())
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    cache::CacheKind,
    config::AnalyzerConfig,
    context::{BinaryContext, LoadInfo},
    diagnostics::Diagnostics,
    identity::{MemberId, MemberKind},
    inheritance::{InheritanceAnalyzer, Overrides, TypeEndpoint},
    metadata::symbols::Assembly,
    resolver::MemberResolver,
    search::{MemberSearch, Page, PageRequest, SearchEngine, TypeSearch},
    source::{DecompileFormat, DecompiledSource, Decompiler, SourceCache},
    summary::{Symbol, SymbolSummary},
    usage::{StringLiteral, UsageAnalyzer, UsageEdge},
    Result,
};

/// Analysis endpoints over one loaded assembly
pub struct Analyzer {
    config: AnalyzerConfig,
    context: Arc<BinaryContext>,
    resolver: Arc<MemberResolver>,
    search: SearchEngine,
    usage: UsageAnalyzer,
    inheritance: InheritanceAnalyzer,
    sources: SourceCache,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    /// Creates an analyzer with the default configuration and nothing loaded
    #[must_use]
    pub fn new() -> Self {
        Self::build(AnalyzerConfig::default())
    }

    /// Creates an analyzer with `config` and nothing loaded.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `config` fails
    /// [`AnalyzerConfig::validate`].
    pub fn with_config(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AnalyzerConfig) -> Self {
        let context = Arc::new(BinaryContext::new());
        let resolver = Arc::new(MemberResolver::new(context.clone()));

        Analyzer {
            search: SearchEngine::new(context.clone(), resolver.clone(), config.clone()),
            usage: UsageAnalyzer::new(context.clone(), resolver.clone(), config.clone()),
            inheritance: InheritanceAnalyzer::new(
                context.clone(),
                resolver.clone(),
                config.clone(),
            ),
            sources: SourceCache::new(context.clone(), resolver.clone()),
            config,
            context,
            resolver,
        }
    }

    /// The active configuration
    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// The shared binary context
    #[must_use]
    pub fn context(&self) -> &Arc<BinaryContext> {
        &self.context
    }

    /// Adds an external decompiler, e.g. one producing C#
    pub fn register_decompiler(&self, decompiler: Arc<dyn Decompiler>) {
        self.sources.register(decompiler);
    }

    // Lifecycle

    /// Loads the assembly at `path`, see [`BinaryContext::load`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] for missing files and the loader's errors for
    /// unreadable ones.
    pub fn load(&self, path: &Path, search_directories: &[PathBuf]) -> Result<LoadInfo> {
        self.context.load(path, search_directories)
    }

    /// Installs a programmatically built assembly.
    ///
    /// # Errors
    /// Currently infallible; the signature matches [`Analyzer::load`].
    pub fn load_assembly(&self, assembly: Assembly) -> Result<LoadInfo> {
        self.context.load_assembly(assembly)
    }

    /// Drops the loaded assembly and every cached result
    pub fn unload(&self) {
        self.context.unload();
    }

    /// Loads the current file again.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing file-backed is loaded.
    pub fn reload(&self) -> Result<LoadInfo> {
        self.context.reload()
    }

    /// Summary of the loaded assembly.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn info(&self) -> Result<LoadInfo> {
        self.context.info()
    }

    // Identity

    /// Resolves `input` to a symbol summary, `None` if nothing matches.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn resolve(&self, input: &str) -> Result<Option<SymbolSummary>> {
        let snapshot = self.context.snapshot()?;
        Ok(self
            .resolver
            .resolve_in(&snapshot, input)
            .map(|symbol| symbol.summary(&snapshot.assembly)))
    }

    /// Resolves a namespace identifier or name to the namespace.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn resolve_namespace(&self, input: &str) -> Result<Option<String>> {
        self.resolver.resolve_namespace(input)
    }

    /// The canonical identifier of whatever `input` resolves to.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn normalize(&self, input: &str) -> Result<Option<String>> {
        self.resolver.normalize(input)
    }

    /// The canonical identifier of `symbol` within the loaded module.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn generate_id(&self, symbol: &Symbol) -> Result<MemberId> {
        self.resolver.generate_id(symbol)
    }

    /// Whether `input` has a shape [`Analyzer::resolve`] understands, or is a namespace id
    #[must_use]
    pub fn is_well_formed(&self, input: &str) -> bool {
        MemberResolver::is_well_formed(input)
    }

    // Search

    /// See [`SearchEngine::search_types`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn search_types(&self, search: &TypeSearch) -> Result<Page<SymbolSummary>> {
        self.search.search_types(search)
    }

    /// See [`SearchEngine::search_members`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn search_members(&self, search: &MemberSearch) -> Result<Page<SymbolSummary>> {
        self.search.search_members(search)
    }

    /// See [`SearchEngine::get_types_in_namespace`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn get_types_in_namespace(
        &self,
        namespace: &str,
        page: &PageRequest,
    ) -> Result<Page<SymbolSummary>> {
        self.search.get_types_in_namespace(namespace, page)
    }

    /// See [`SearchEngine::get_members_of_type`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `type_id` does not name a type,
    /// [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn get_members_of_type(
        &self,
        type_id: &str,
        kinds: &[MemberKind],
        page: &PageRequest,
    ) -> Result<Page<SymbolSummary>> {
        self.search.get_members_of_type(type_id, kinds, page)
    }

    /// See [`SearchEngine::list_namespaces`].
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn list_namespaces(&self, page: &PageRequest) -> Result<Page<String>> {
        self.search.list_namespaces(page)
    }

    /// Every type with the simple name `name`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn types_named(&self, name: &str) -> Result<Vec<SymbolSummary>> {
        self.search.types_named(name)
    }

    // Usages

    /// See [`UsageAnalyzer::find_usages`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `target` does not resolve,
    /// [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn find_usages(&self, target: &str, page: &PageRequest) -> Result<Page<UsageEdge>> {
        self.usage.find_usages(target, page)
    }

    /// See [`UsageAnalyzer::find_callers`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method or the page request is invalid
    /// and [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_callers(&self, method: &str, page: &PageRequest) -> Result<Page<UsageEdge>> {
        self.usage.find_callers(method, page)
    }

    /// See [`UsageAnalyzer::find_callees`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method or the page request is invalid
    /// and [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_callees(&self, method: &str, page: &PageRequest) -> Result<Page<UsageEdge>> {
        self.usage.find_callees(method, page)
    }

    /// See [`UsageAnalyzer::find_string_literals`].
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
        self.usage.find_string_literals(pattern, use_regex, page)
    }

    // Inheritance

    /// See [`InheritanceAnalyzer::find_base_types`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `type_id` does not name a type,
    /// [`crate::Error::InvalidArgument`] for a zero `limit` and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn find_base_types(&self, type_id: &str, limit: usize) -> Result<Vec<TypeEndpoint>> {
        self.inheritance.find_base_types(type_id, limit)
    }

    /// See [`InheritanceAnalyzer::find_derived_types`].
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
        self.inheritance.find_derived_types(type_id, page)
    }

    /// See [`InheritanceAnalyzer::get_implementations`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `type_id` does not name a type and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn get_implementations(&self, type_id: &str) -> Result<Vec<TypeEndpoint>> {
        self.inheritance.get_implementations(type_id)
    }

    /// See [`InheritanceAnalyzer::find_implementors`].
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
        self.inheritance.find_implementors(interface_id, page)
    }

    /// See [`InheritanceAnalyzer::get_overrides`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method_id` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn get_overrides(&self, method_id: &str) -> Result<Overrides> {
        self.inheritance.get_overrides(method_id)
    }

    /// See [`InheritanceAnalyzer::get_overloads`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `method_id` does not resolve,
    /// [`crate::Error::InvalidArgument`] if it is not a method and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn get_overloads(&self, method_id: &str) -> Result<Vec<SymbolSummary>> {
        self.inheritance.get_overloads(method_id)
    }

    // Source

    /// See [`SourceCache::decompile`].
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `target` does not resolve,
    /// [`crate::Error::NotSupported`] if no decompiler produces `format` and
    /// [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn decompile(&self, target: &str, format: DecompileFormat) -> Result<DecompiledSource> {
        self.sources.decompile(target, format)
    }

    // Housekeeping

    /// Index readiness, build counts and cache counters
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let snapshot = self.context.snapshot().ok();

        Diagnostics {
            loaded: snapshot.is_some(),
            generation: self.context.generation(),
            indexes: snapshot
                .map(|snapshot| snapshot.indexes.status())
                .unwrap_or_default(),
            caches: self.context.cache_stats(),
            resolver: self.resolver.stats(),
        }
    }

    /// Clears one cache group, or all of them
    pub fn clear_caches(&self, kind: Option<CacheKind>) {
        self.context.clear_caches(kind);
    }
}
