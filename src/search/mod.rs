//! Filtering and pagination over the symbols of the loaded assembly.
//!
//! Every query produces a fully ordered result list (by full name, then token) before the
//! requested window is cut out, which makes cursors stable for the lifetime of one load. Pages
//! are cached per complete request, cursor included, and the cache is cleared as a whole.
//!
//! ```rust,no_run
//! use dotlens::{search::{PageRequest, TypeSearch}, Analyzer};
//! use std::path::Path;
//!
//! let analyzer = Analyzer::new();
//! analyzer.load(Path::new("Sample.dll"), &[])?;
//!
//! let mut request = TypeSearch {
//!     query: "Simple".to_string(),
//!     page: PageRequest::first(10),
//!     ..Default::default()
//! };
//! loop {
//!     let page = analyzer.search_types(&request)?;
//!     for summary in &page.items {
//!         println!("{} {}", summary.id, summary.full_name);
//!     }
//!     match page.next_cursor {
//!         Some(cursor) => request.page.cursor = Some(cursor),
//!         None => break,
//!     }
//! }
//! # Ok::<(), dotlens::Error>(())
//! ```

pub(crate) mod matcher;
mod page;

pub use page::{Page, PageRequest};
pub(crate) use page::Window;

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{CacheKind, GenerationCache},
    config::AnalyzerConfig,
    context::{BinaryContext, Snapshot},
    identity::{namespace_of, MemberKind},
    metadata::{
        symbols::{Accessibility, Assembly, TypeDef},
        token::Token,
    },
    resolver::MemberResolver,
    summary::{Symbol, SymbolSummary},
    Error::NotFound,
    Result,
};
use matcher::Matcher;

/// Name of the pseudo type holding module level members
const MODULE_TYPE: &str = "<Module>";

/// Parameters of [`SearchEngine::search_types`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeSearch {
    /// Case-insensitive substring, or pattern when `use_regex` is set; empty matches all
    pub query: String,
    /// Treat `query` as a regular expression
    pub use_regex: bool,
    /// Exact namespace filter
    pub namespace: Option<String>,
    /// Include nested types
    pub include_nested: bool,
    /// Paging
    pub page: PageRequest,
}

impl Default for TypeSearch {
    fn default() -> Self {
        TypeSearch {
            query: String::new(),
            use_regex: false,
            namespace: None,
            include_nested: true,
            page: PageRequest::default(),
        }
    }
}

impl TypeSearch {
    /// Types whose name contains `query`
    #[must_use]
    pub fn matching(query: &str) -> Self {
        TypeSearch {
            query: query.to_string(),
            ..Self::default()
        }
    }

    /// Sets the page to fetch
    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

/// Parameters of [`SearchEngine::search_members`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberSearch {
    /// Case-insensitive substring, or pattern when `use_regex` is set; empty matches all
    pub query: String,
    /// Treat `query` as a regular expression
    pub use_regex: bool,
    /// Exact namespace filter of the declaring type
    pub namespace: Option<String>,
    /// Declaring type, as identifier, documentation id, token or full name
    pub declaring_type: Option<String>,
    /// Member kinds to include; empty means every member kind
    pub kinds: Vec<MemberKind>,
    /// Static or instance members only
    pub is_static: Option<bool>,
    /// Declared accessibility
    pub accessibility: Option<Accessibility>,
    /// Paging
    pub page: PageRequest,
}

impl MemberSearch {
    /// Members whose name contains `query`
    #[must_use]
    pub fn matching(query: &str) -> Self {
        MemberSearch {
            query: query.to_string(),
            ..Self::default()
        }
    }

    /// Sets the page to fetch
    #[must_use]
    pub fn with_page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SearchKey {
    Types(TypeSearch),
    Members(MemberSearch),
    Namespace(String, PageRequest),
    TypeMembers(Token, Vec<MemberKind>, PageRequest),
}

/// A matched symbol with its sort key
struct Hit {
    full_name: String,
    token: Token,
    symbol: Symbol,
}

fn sort_hits(hits: &mut [Hit]) {
    hits.par_sort_unstable_by(|a, b| {
        a.full_name
            .cmp(&b.full_name)
            .then_with(|| a.token.cmp(&b.token))
    });
}

fn type_hit(type_def: &Arc<TypeDef>) -> Hit {
    Hit {
        full_name: type_def.full_name.clone(),
        token: type_def.token,
        symbol: Symbol::Type(type_def.clone()),
    }
}

/// Symbols of the given kinds declared directly on `type_def`
fn members_of<'a>(
    assembly: &'a Assembly,
    type_def: &'a TypeDef,
    kinds: &'a [MemberKind],
) -> impl Iterator<Item = Symbol> + 'a {
    let wanted = |kind: MemberKind| {
        (kinds.is_empty() && kind != MemberKind::Type) || kinds.contains(&kind)
    };
    let nested = wanted(MemberKind::Type).then_some(&type_def.nested_types);
    let methods = wanted(MemberKind::Method).then_some(&type_def.methods);
    let fields = wanted(MemberKind::Field).then_some(&type_def.fields);
    let properties = wanted(MemberKind::Property).then_some(&type_def.properties);
    let events = wanted(MemberKind::Event).then_some(&type_def.events);

    [nested, methods, fields, properties, events]
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(move |token| Symbol::from_token(assembly, *token))
}

fn page_of(assembly: &Assembly, mut hits: Vec<Hit>, window: Window) -> Page<SymbolSummary> {
    sort_hits(&mut hits);
    Page::complete(hits, window).map(|hit| hit.symbol.summary(assembly))
}

/// Type and member search
pub struct SearchEngine {
    context: Arc<BinaryContext>,
    resolver: Arc<MemberResolver>,
    config: AnalyzerConfig,
    cache: Arc<GenerationCache<SearchKey, Page<SymbolSummary>>>,
}

impl SearchEngine {
    /// Creates a search engine and registers its page cache with `context`
    #[must_use]
    pub fn new(
        context: Arc<BinaryContext>,
        resolver: Arc<MemberResolver>,
        config: AnalyzerConfig,
    ) -> Self {
        let cache = Arc::new(GenerationCache::new(CacheKind::Search, "search"));
        context.register_cache(cache.clone());

        SearchEngine {
            context,
            resolver,
            config,
            cache,
        }
    }

    fn cached(
        &self,
        snapshot: &Snapshot,
        key: SearchKey,
        compute: impl FnOnce() -> Page<SymbolSummary>,
    ) -> Page<SymbolSummary> {
        self.cache
            .get_or_insert_with(key, snapshot.generation, compute)
    }

    /// Candidate types: the exact namespace bucket, or every type
    fn candidate_types<'a>(
        snapshot: &'a Snapshot,
        namespace: Option<&str>,
    ) -> Vec<&'a Arc<TypeDef>> {
        let assembly = &snapshot.assembly;
        let candidates: Vec<&Arc<TypeDef>> = match namespace {
            Some(namespace) => snapshot
                .indexes
                .namespace_types(assembly)
                .get(namespace_of(namespace).unwrap_or(namespace))
                .map(|tokens| {
                    tokens
                        .iter()
                        .filter_map(|token| assembly.type_def(*token))
                        .collect()
                })
                .unwrap_or_default(),
            None => assembly.types.iter().collect(),
        };

        candidates
            .into_iter()
            .filter(|type_def| type_def.full_name != MODULE_TYPE)
            .collect()
    }

    /// Searches type definitions.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn search_types(&self, search: &TypeSearch) -> Result<Page<SymbolSummary>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(&search.page, &self.config)?;

        Ok(self.cached(&snapshot, SearchKey::Types(search.clone()), || {
            let assembly = &snapshot.assembly;
            let matcher = Matcher::new(&search.query, search.use_regex, self.config.regex_size_limit);

            let hits: Vec<Hit> = Self::candidate_types(&snapshot, search.namespace.as_deref())
                .into_par_iter()
                .filter(|type_def| search.include_nested || !type_def.is_nested())
                .filter(|type_def| matcher.matches_name(&type_def.name, &type_def.full_name))
                .map(|type_def| type_hit(type_def))
                .collect();

            page_of(assembly, hits, window)
        }))
    }

    /// Searches methods, fields, properties and events.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn search_members(&self, search: &MemberSearch) -> Result<Page<SymbolSummary>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(&search.page, &self.config)?;

        Ok(self.cached(&snapshot, SearchKey::Members(search.clone()), || {
            let assembly = &snapshot.assembly;
            let matcher = Matcher::new(&search.query, search.use_regex, self.config.regex_size_limit);

            let mut candidates = Self::candidate_types(&snapshot, search.namespace.as_deref());
            if let Some(input) = search.declaring_type.as_deref() {
                let owner = self.resolver.resolve_type_in(&snapshot, input);
                candidates.retain(|type_def| owner.as_ref().is_some_and(|owner| owner.token == type_def.token));
            }

            let kinds: Vec<MemberKind> = if search.kinds.is_empty() {
                MemberKind::members().to_vec()
            } else {
                search.kinds.clone()
            };

            let hits: Vec<Hit> = candidates
                .into_par_iter()
                .flat_map_iter(|type_def| {
                    members_of(assembly, type_def, &kinds)
                        .filter(|symbol| symbol.kind() != MemberKind::Type)
                        .collect::<Vec<_>>()
                })
                .filter(|symbol| {
                    search
                        .is_static
                        .is_none_or(|wanted| symbol.is_static(assembly) == wanted)
                        && search
                            .accessibility
                            .is_none_or(|wanted| symbol.accessibility(assembly) == wanted)
                })
                .filter_map(|symbol| {
                    let full_name = symbol.full_name(assembly);
                    matcher
                        .matches_name(symbol.name(), &full_name)
                        .then(|| Hit {
                            full_name,
                            token: symbol.token(),
                            symbol,
                        })
                })
                .collect();

            page_of(assembly, hits, window)
        }))
    }

    /// Types of one namespace, `""` or `N:` for the global namespace.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn get_types_in_namespace(
        &self,
        namespace: &str,
        page: &PageRequest,
    ) -> Result<Page<SymbolSummary>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let namespace = namespace_of(namespace).unwrap_or(namespace).to_string();

        Ok(self.cached(
            &snapshot,
            SearchKey::Namespace(namespace.clone(), page.clone()),
            || {
                let assembly = &snapshot.assembly;
                let hits = Self::candidate_types(&snapshot, Some(&namespace))
                    .into_iter()
                    .map(|type_def| type_hit(type_def))
                    .collect();
                page_of(assembly, hits, window)
            },
        ))
    }

    /// Members declared on one type; `kinds` may include [`MemberKind::Type`] for nested
    /// types, and an empty list means every member kind.
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
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let Some(owner) = self
            .resolver
            .resolve_type_in(&snapshot, type_id)
            .map(|type_def| type_def.token)
        else {
            return Err(NotFound(format!("'{type_id}' does not name a type")));
        };

        Ok(self.cached(
            &snapshot,
            SearchKey::TypeMembers(owner, kinds.to_vec(), page.clone()),
            || {
                let assembly = &snapshot.assembly;
                let hits = assembly
                    .type_def(owner)
                    .map(|type_def| {
                        members_of(assembly, type_def, kinds)
                            .map(|symbol| Hit {
                                full_name: symbol.full_name(assembly),
                                token: symbol.token(),
                                symbol,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                page_of(assembly, hits, window)
            },
        ))
    }

    /// Distinct non-empty namespaces in sorted order.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded and
    /// [`crate::Error::InvalidArgument`] for an invalid page request.
    pub fn list_namespaces(&self, page: &PageRequest) -> Result<Page<String>> {
        let snapshot = self.context.snapshot()?;
        let window = Window::new(page, &self.config)?;
        let namespaces = snapshot.indexes.namespaces(&snapshot.assembly).to_vec();

        Ok(Page::complete(namespaces, window))
    }

    /// Every type sharing the simple name `name`, in token order
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] if nothing is loaded.
    pub fn types_named(&self, name: &str) -> Result<Vec<SymbolSummary>> {
        let snapshot = self.context.snapshot()?;
        let assembly = &snapshot.assembly;

        Ok(snapshot
            .indexes
            .type_names(assembly)
            .named(name)
            .iter()
            .filter_map(|token| Symbol::from_token(assembly, *token))
            .map(|symbol| symbol.summary(assembly))
            .collect())
    }
}
