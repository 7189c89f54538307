//! Lazily built lookup indexes over one loaded assembly.
//!
//! There are four independent indexes. Each lives in its own compute-once cell: the first
//! caller pays for the full scan, concurrent callers block until the index is complete, and no
//! caller ever sees a partially built map. The cells live inside the context's snapshot, so a
//! reload discards all of them together with the assembly they were built from.
//!
//! - **type names**: full name and simple name to type. Simple names that several types share
//!   keep the last type in token order; [`TypeNameIndex::named`] lists every candidate.
//! - **namespaces to types**: exact namespace (`""` for the global namespace) to types in token
//!   order. Nested types are listed under the namespace of their outermost type.
//! - **members**: [`MemberId`] of every type, method, field, property and event to its
//!   [`Symbol`].
//! - **namespace set**: the distinct non-empty namespaces, in sorted order.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, OnceLock,
    },
    time::Instant,
};

use crossbeam_skiplist::SkipSet;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::{
    identity::MemberId,
    metadata::{symbols::Assembly, token::Token},
    summary::Symbol,
};

/// Name lookup tables for type definitions
#[derive(Debug, Default)]
pub struct TypeNameIndex {
    by_full_name: HashMap<String, Token>,
    by_simple_name: HashMap<String, Token>,
    candidates: HashMap<String, Vec<Token>>,
}

impl TypeNameIndex {
    /// Looks up a type by full name, then by simple name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Token> {
        self.by_full_name
            .get(name)
            .or_else(|| self.by_simple_name.get(name))
            .copied()
    }

    /// Looks up a type by full name only
    #[must_use]
    pub fn by_full_name(&self, name: &str) -> Option<Token> {
        self.by_full_name.get(name).copied()
    }

    /// Every type with the simple name `name`, in token order
    #[must_use]
    pub fn named(&self, name: &str) -> &[Token] {
        self.candidates.get(name).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_full_name.len() + self.by_simple_name.len()
    }

    /// Returns `true` if no type was indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_full_name.is_empty()
    }
}

/// Readiness of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    /// Index name
    pub name: &'static str,
    /// Built for the current generation
    pub ready: bool,
    /// How many times it was built for the current generation
    pub builds: u32,
}

/// The four lazily built indexes of one snapshot
#[derive(Default)]
pub struct Indexes {
    type_names: OnceLock<TypeNameIndex>,
    namespace_types: OnceLock<HashMap<String, Vec<Token>>>,
    members: OnceLock<HashMap<MemberId, Symbol>>,
    namespaces: OnceLock<Vec<String>>,
    builds: [AtomicU32; 4],
}

const TYPE_NAMES: usize = 0;
const NAMESPACE_TYPES: usize = 1;
const MEMBERS: usize = 2;
const NAMESPACES: usize = 3;

impl Indexes {
    fn built(&self, index: usize, name: &'static str, entries: usize, started: Instant) {
        self.builds[index].fetch_add(1, Ordering::Relaxed);
        debug!(
            index = name,
            entries,
            elapsed_us = started.elapsed().as_micros() as u64,
            "index built"
        );
    }

    /// Type name index, built on first use
    pub fn type_names(&self, assembly: &Assembly) -> &TypeNameIndex {
        self.type_names.get_or_init(|| {
            let started = Instant::now();
            let mut index = TypeNameIndex::default();
            for type_def in &assembly.types {
                index
                    .by_full_name
                    .insert(type_def.full_name.clone(), type_def.token);
                index
                    .by_simple_name
                    .insert(type_def.name.clone(), type_def.token);
                index
                    .candidates
                    .entry(type_def.name.clone())
                    .or_default()
                    .push(type_def.token);
            }

            self.built(TYPE_NAMES, "type_names", index.len(), started);
            index
        })
    }

    /// Namespace to types index, built on first use
    pub fn namespace_types(&self, assembly: &Assembly) -> &HashMap<String, Vec<Token>> {
        self.namespace_types.get_or_init(|| {
            let started = Instant::now();
            let mut index: HashMap<String, Vec<Token>> = HashMap::new();
            for type_def in &assembly.types {
                index
                    .entry(type_def.namespace.clone())
                    .or_default()
                    .push(type_def.token);
            }

            self.built(NAMESPACE_TYPES, "namespace_types", index.len(), started);
            index
        })
    }

    /// Member identifier index, built on first use on the rayon pool
    pub fn members(&self, assembly: &Assembly) -> &HashMap<MemberId, Symbol> {
        self.members.get_or_init(|| {
            let started = Instant::now();
            let mvid = assembly.mvid;
            let index: HashMap<MemberId, Symbol> = assembly
                .types
                .par_iter()
                .flat_map_iter(|type_def| {
                    let members = type_def
                        .methods
                        .iter()
                        .chain(&type_def.fields)
                        .chain(&type_def.properties)
                        .chain(&type_def.events)
                        .filter_map(|token| Symbol::from_token(assembly, *token));

                    std::iter::once(Symbol::Type(Arc::clone(type_def)))
                        .chain(members)
                        .map(move |symbol| (symbol.id(mvid), symbol))
                        .collect::<Vec<_>>()
                })
                .collect();

            self.built(MEMBERS, "members", index.len(), started);
            index
        })
    }

    /// Sorted namespace set, built on first use on the rayon pool
    pub fn namespaces(&self, assembly: &Assembly) -> &[String] {
        self.namespaces.get_or_init(|| {
            let started = Instant::now();
            let set = SkipSet::new();
            assembly
                .types
                .par_iter()
                .filter(|type_def| !type_def.namespace.is_empty())
                .for_each(|type_def| {
                    set.insert(type_def.namespace.clone());
                });

            let namespaces: Vec<String> = set.iter().map(|entry| entry.value().clone()).collect();
            self.built(NAMESPACES, "namespaces", namespaces.len(), started);
            namespaces
        })
    }

    /// Readiness and build counts of all four indexes
    #[must_use]
    pub fn status(&self) -> Vec<IndexStatus> {
        let ready = [
            self.type_names.get().is_some(),
            self.namespace_types.get().is_some(),
            self.members.get().is_some(),
            self.namespaces.get().is_some(),
        ];

        ["type_names", "namespace_types", "members", "namespaces"]
            .into_iter()
            .zip(ready)
            .zip(&self.builds)
            .map(|((name, ready), builds)| IndexStatus {
                name,
                ready,
                builds: builds.load(Ordering::Relaxed),
            })
            .collect()
    }
}
