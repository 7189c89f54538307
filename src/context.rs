//! The binary context: the one loaded assembly and its lifecycle.
//!
//! A [`BinaryContext`] holds at most one [`Snapshot`] behind a `RwLock<Option<Arc<_>>>`.
//! Queries clone the `Arc` and drop the lock immediately, so a long running query never blocks
//! a reload and always works on one consistent assembly. Loading parses the file before taking
//! the write lock; only the pointer swap and cache invalidation happen under it.
//!
//! Every load bumps a generation counter and records a "loaded at" timestamp that is strictly
//! greater than the previous one, even when two loads land in the same millisecond.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    cache::{CacheKind, CacheScope, CacheStats},
    identity::mvid_hex,
    index::Indexes,
    metadata::{
        loader,
        symbols::{Assembly, TypeDef},
    },
    Error::{self, InvalidArgument, InvalidOperation},
    Result,
};

/// Where a snapshot was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSource {
    /// The assembly file
    pub path: PathBuf,
    /// Extra directories searched for referenced assemblies
    pub search_directories: Vec<PathBuf>,
}

/// An assembly reference and where it was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceInfo {
    /// Referenced assembly name
    pub name: String,
    /// Referenced version
    pub version: String,
    /// `<name>.dll` or `<name>.exe` found in the search directories
    pub resolved_path: Option<PathBuf>,
}

/// Summary of the currently loaded assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadInfo {
    /// Source file, `None` for programmatically built assemblies
    pub path: Option<PathBuf>,
    /// Assembly name
    pub name: String,
    /// Assembly version
    pub version: String,
    /// Module name
    pub module_name: String,
    /// Module version id, 32 hex digits
    pub mvid: String,
    /// Number of type definitions
    pub types: usize,
    /// Number of method definitions
    pub methods: usize,
    /// Load generation
    pub generation: u64,
    /// Unix milliseconds of the load
    pub loaded_at: u64,
    /// Assembly references
    pub references: Vec<ReferenceInfo>,
}

/// One loaded assembly together with its indexes
pub struct Snapshot {
    /// The assembly model
    pub assembly: Arc<Assembly>,
    /// File and search directories, for file backed snapshots
    pub source: Option<LoadSource>,
    /// Load generation
    pub generation: u64,
    /// Unix milliseconds of the load
    pub loaded_at: u64,
    /// Lazily built indexes
    pub indexes: Indexes,
    references: Vec<ReferenceInfo>,
}

impl Snapshot {
    /// Every type definition in token order
    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeDef>> {
        self.assembly.types.iter()
    }

    /// Load summary
    #[must_use]
    pub fn info(&self) -> LoadInfo {
        let assembly = &self.assembly;
        LoadInfo {
            path: self.source.as_ref().map(|source| source.path.clone()),
            name: assembly.name.clone(),
            version: assembly.version.to_string(),
            module_name: assembly.module_name.clone(),
            mvid: mvid_hex(&assembly.mvid),
            types: assembly.types.len(),
            methods: assembly.methods.len(),
            generation: self.generation,
            loaded_at: self.loaded_at,
            references: self.references.clone(),
        }
    }
}

/// Owner of the loaded assembly.
///
/// ```rust,no_run
/// use dotlens::context::BinaryContext;
/// use std::path::Path;
///
/// let context = BinaryContext::new();
/// let info = context.load(Path::new("Sample.dll"), &[])?;
/// println!("{} types, generation {}", info.types, info.generation);
///
/// let snapshot = context.snapshot()?;
/// for type_def in snapshot.types() {
///     println!("{}", type_def.full_name);
/// }
/// # Ok::<(), dotlens::Error>(())
/// ```
#[derive(Default)]
pub struct BinaryContext {
    state: RwLock<Option<Arc<Snapshot>>>,
    generation: AtomicU64,
    last_loaded_at: AtomicU64,
    scopes: RwLock<Vec<Arc<dyn CacheScope>>>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

fn resolve_references(assembly: &Assembly, source: Option<&LoadSource>) -> Vec<ReferenceInfo> {
    let directories: Vec<&Path> = match source {
        Some(source) => source
            .path
            .parent()
            .into_iter()
            .chain(source.search_directories.iter().map(PathBuf::as_path))
            .collect(),
        None => Vec::new(),
    };

    assembly
        .assembly_refs
        .iter()
        .map(|reference| {
            let resolved_path = directories.iter().find_map(|directory| {
                ["dll", "exe"]
                    .iter()
                    .map(|extension| directory.join(format!("{}.{extension}", reference.name)))
                    .find(|candidate| candidate.is_file())
            });

            ReferenceInfo {
                name: reference.name.clone(),
                version: reference.version.to_string(),
                resolved_path,
            }
        })
        .collect()
}

impl BinaryContext {
    /// Creates a context with nothing loaded
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the assembly at `path`, replacing the current one.
    ///
    /// The file's own directory is always searched for referenced assemblies first, followed by
    /// `search_directories`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `path` does not exist, and the loader's error if the
    /// file is not a readable .NET assembly. The current snapshot stays active on error.
    pub fn load(&self, path: &Path, search_directories: &[PathBuf]) -> Result<LoadInfo> {
        if !path.is_file() {
            return Err(InvalidArgument(format!(
                "'{}' does not exist or is not a file",
                path.display()
            )));
        }

        let assembly = loader::load_file(path)?;
        let source = LoadSource {
            path: path.to_path_buf(),
            search_directories: search_directories.to_vec(),
        };

        Ok(self.install(assembly, Some(source)))
    }

    /// Installs a programmatically built assembly, replacing the current one.
    ///
    /// # Errors
    /// Currently infallible; the signature matches [`BinaryContext::load`].
    pub fn load_assembly(&self, assembly: Assembly) -> Result<LoadInfo> {
        Ok(self.install(assembly, None))
    }

    /// Loads the current assembly again from its file.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if nothing is loaded or the current assembly did not
    /// come from a file, and any error of [`BinaryContext::load`].
    pub fn reload(&self) -> Result<LoadInfo> {
        let snapshot = self.snapshot()?;
        let Some(source) = &snapshot.source else {
            return Err(InvalidOperation(
                "the loaded assembly was not loaded from a file".to_string(),
            ));
        };

        self.load(&source.path, &source.search_directories)
    }

    /// Drops the current assembly and invalidates every cache. Unloading an empty context is a
    /// no-op apart from the invalidation.
    pub fn unload(&self) {
        let mut state = write_lock!(self.state);
        let previous = state.take();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.clear_scopes(None);
        drop(state);

        if let Some(previous) = previous {
            info!(assembly = %previous.assembly.name, "assembly unloaded");
        }
    }

    fn install(&self, assembly: Assembly, source: Option<LoadSource>) -> LoadInfo {
        let references = resolve_references(&assembly, source.as_ref());
        let now = now_millis();

        let mut state = write_lock!(self.state);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.last_loaded_at.load(Ordering::SeqCst);
        let loaded_at = now.max(previous + 1);
        self.last_loaded_at.store(loaded_at, Ordering::SeqCst);

        let snapshot = Arc::new(Snapshot {
            assembly: Arc::new(assembly),
            source,
            generation,
            loaded_at,
            indexes: Indexes::default(),
            references,
        });
        *state = Some(Arc::clone(&snapshot));
        self.clear_scopes(None);
        drop(state);

        let info = snapshot.info();
        info!(
            assembly = %info.name,
            version = %info.version,
            mvid = %info.mvid,
            types = info.types,
            methods = info.methods,
            generation,
            "assembly loaded"
        );

        info
    }

    /// The current snapshot.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if nothing is loaded.
    pub fn snapshot(&self) -> Result<Arc<Snapshot>> {
        read_lock!(self.state).clone().ok_or_else(Error::not_loaded)
    }

    /// Whether an assembly is loaded
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        read_lock!(self.state).is_some()
    }

    /// The current generation; bumped by every load and unload
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Summary of the loaded assembly.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if nothing is loaded.
    pub fn info(&self) -> Result<LoadInfo> {
        Ok(self.snapshot()?.info())
    }

    /// All type definitions of the loaded assembly. Each call starts a fresh iteration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOperation`] if nothing is loaded.
    pub fn enumerate_types(&self) -> Result<std::vec::IntoIter<Arc<TypeDef>>> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.assembly.types.clone().into_iter())
    }

    /// Registers a cache to be cleared on every load and unload
    pub fn register_cache(&self, scope: Arc<dyn CacheScope>) {
        write_lock!(self.scopes).push(scope);
    }

    /// Clears the registered caches of one kind, or all of them
    pub fn clear_caches(&self, kind: Option<CacheKind>) {
        self.clear_scopes(kind);
    }

    fn clear_scopes(&self, kind: Option<CacheKind>) {
        let scopes = read_lock!(self.scopes);
        for scope in scopes.iter() {
            if kind.is_none_or(|kind| scope.kind() == kind) {
                scope.clear();
            }
        }
        debug!(kind = ?kind, scopes = scopes.len(), "caches cleared");
    }

    /// Counters of every registered cache
    #[must_use]
    pub fn cache_stats(&self) -> Vec<CacheStats> {
        read_lock!(self.scopes)
            .iter()
            .map(|scope| scope.stats())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::GenerationCache,
        metadata::symbols::{AssemblyBuilder, AssemblyVersion},
    };

    fn small() -> Assembly {
        let mut builder = AssemblyBuilder::new("Small");
        builder.add_assembly_ref("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
        builder.add_type("Small", "A", 0x0000_0001, None);
        builder.build()
    }

    #[test]
    fn nothing_loaded() {
        let context = BinaryContext::new();
        assert!(!context.is_loaded());
        assert!(matches!(context.snapshot(), Err(InvalidOperation(_))));
        assert!(matches!(context.info(), Err(InvalidOperation(_))));
        assert!(matches!(context.reload(), Err(InvalidOperation(_))));
        assert!(context.enumerate_types().is_err());
    }

    #[test]
    fn missing_file() {
        let context = BinaryContext::new();
        let result = context.load(Path::new("/definitely/not/here.dll"), &[]);
        assert!(matches!(result, Err(InvalidArgument(_))));
    }

    #[test]
    fn load_assembly_and_swap() {
        let context = BinaryContext::new();
        let first = context.load_assembly(small()).unwrap();
        assert_eq!(first.name, "Small");
        assert_eq!(first.types, 1);
        assert_eq!(first.references[0].name, "mscorlib");
        assert!(first.references[0].resolved_path.is_none());

        let held = context.snapshot().unwrap();
        let second = context.load_assembly(small()).unwrap();
        assert!(second.generation > first.generation);
        assert!(second.loaded_at > first.loaded_at);

        // the old snapshot stays usable for whoever still holds it
        assert_eq!(held.generation, first.generation);
        assert_eq!(context.snapshot().unwrap().generation, second.generation);

        // programmatic snapshots cannot be reloaded
        assert!(matches!(context.reload(), Err(InvalidOperation(_))));
    }

    #[test]
    fn enumerate_is_restartable() {
        let context = BinaryContext::new();
        context.load_assembly(small()).unwrap();
        assert_eq!(context.enumerate_types().unwrap().count(), 1);
        assert_eq!(context.enumerate_types().unwrap().count(), 1);
    }

    #[test]
    fn invalidation() {
        let context = BinaryContext::new();
        let cache: Arc<GenerationCache<u32, u32>> =
            Arc::new(GenerationCache::new(CacheKind::Search, "search"));
        context.register_cache(cache.clone());

        context.load_assembly(small()).unwrap();
        cache.insert(1, context.generation(), 1);
        assert_eq!(cache.len(), 1);

        context.load_assembly(small()).unwrap();
        assert_eq!(cache.len(), 0);

        cache.insert(1, context.generation(), 1);
        context.clear_caches(Some(CacheKind::Usage));
        assert_eq!(cache.len(), 1);
        context.clear_caches(Some(CacheKind::Search));
        assert_eq!(cache.len(), 0);

        cache.insert(1, context.generation(), 1);
        context.unload();
        assert!(!context.is_loaded());
        assert_eq!(cache.len(), 0);
        assert_eq!(context.cache_stats()[0].entries, 0);
    }
}
