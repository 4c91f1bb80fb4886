//! The corpus-lifetime cross-document index.
//!
//! Holds the name -> cluster table (seeded from a file, grown as new names are
//! met), the cluster -> bound URI table, and the string-replacement maps used to
//! bind argument names to fixed ontology URIs.
//!
//! Read-only maps live in `DashMap`s. Cluster registration goes through the
//! write side of one `RwLock` and re-checks the table after acquiring it, so two
//! workers racing on the same new name end up with one cluster. Both id counters
//! sit behind a single `Mutex`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::acronym::{initial_count, possible_acronyms};
use super::class::EntityClass;
use super::error::{IndexError, IndexResult};
use super::scratch::DocumentScratchState;
use crate::alignment::DomainLookup;
use crate::identifier::ClusterId;
use crate::literal::{collapse_whitespace, normalize_name};

/// First id handed out by [`CrossDocIndex::next_special_id`].
pub const FIRST_SPECIAL_ID: u64 = i32::MAX as u64 - 1;

/// A cross-document cluster: its entity class and its normalized names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    pub class: EntityClass,
    pub names: BTreeSet<String>,
}

/// A bound URI together with the string it was bound from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundEntry {
    pub label: String,
    pub uri: String,
}

/// Outcome of [`CrossDocIndex::resolve_or_register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub cluster: ClusterId,
    /// The name was already registered under an incompatible entity class and
    /// a new cluster was split off.
    pub conflict: bool,
    /// A new cluster was created by this call.
    pub registered: bool,
}

/// Where a mapped argument's binding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    DocumentReplacement,
    TypeReplacement,
    DomainLookup,
    ClusterBinding,
    Unbound,
}

/// Outcome of [`CrossDocIndex::get_mapped_arg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedArg {
    pub bound_uri: Option<String>,
    pub cluster: Option<ClusterId>,
    pub source: MappingSource,
}

/// Aggregate statistics about the index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub clusters: usize,
    pub names: usize,
    pub bound_uris: usize,
    pub document_replacement_maps: usize,
    pub type_replacement_maps: usize,
    pub next_cluster_id: u64,
    pub next_special_id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct ClusterTables {
    pub(crate) by_name: HashMap<String, BTreeSet<ClusterId>>,
    pub(crate) by_acronym: HashMap<String, BTreeSet<ClusterId>>,
    pub(crate) entries: BTreeMap<ClusterId, ClusterEntry>,
}

impl ClusterTables {
    fn compatible_in(
        &self,
        ids: Option<&BTreeSet<ClusterId>>,
        class: EntityClass,
    ) -> Option<ClusterId> {
        ids?.iter().copied().find(|id| {
            self.entries
                .get(id)
                .is_some_and(|e| e.class.is_compatible(class))
        })
    }

    /// Find a compatible cluster by exact name, by the name's acronyms, or by
    /// a longer name whose acronym this name is.
    fn lookup(&self, normalized: &str, class: EntityClass) -> Option<ClusterId> {
        if let Some(id) = self.compatible_in(self.by_name.get(normalized), class) {
            return Some(id);
        }
        if initial_count(normalized) >= 2 {
            for acronym in possible_acronyms(normalized) {
                if let Some(id) = self.compatible_in(self.by_name.get(&acronym), class) {
                    return Some(id);
                }
            }
        }
        self.compatible_in(self.by_acronym.get(normalized), class)
    }

    /// Add a normalized name to a cluster, creating the cluster if needed.
    pub(crate) fn add_name(&mut self, id: ClusterId, class: EntityClass, normalized: &str) {
        self.entries
            .entry(id)
            .or_insert_with(|| ClusterEntry {
                class,
                names: BTreeSet::new(),
            })
            .names
            .insert(normalized.to_string());
        self.by_name
            .entry(normalized.to_string())
            .or_default()
            .insert(id);
        if initial_count(normalized) >= 2 {
            for acronym in possible_acronyms(normalized) {
                self.by_acronym.entry(acronym).or_default().insert(id);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct IdCounters {
    pub(crate) next_regular: u64,
    pub(crate) next_special: u64,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            next_regular: 1,
            next_special: FIRST_SPECIAL_ID,
        }
    }
}

impl IdCounters {
    fn exhausted(&self) -> IndexError {
        IndexError::ClusterIdsExhausted {
            regular: self.next_regular,
            special: self.next_special,
        }
    }

    fn allocate_regular(&mut self) -> IndexResult<ClusterId> {
        if self.next_regular > self.next_special {
            return Err(self.exhausted());
        }
        let id = self.next_regular;
        self.next_regular += 1;
        Ok(ClusterId(id))
    }

    fn allocate_special(&mut self) -> IndexResult<ClusterId> {
        if self.next_special < self.next_regular {
            return Err(self.exhausted());
        }
        let id = self.next_special;
        self.next_special -= 1;
        Ok(ClusterId(id))
    }

    /// Make sure regular ids continue after a seed id.
    pub(crate) fn observe_seed(&mut self, id: u64) {
        self.next_regular = self.next_regular.max(id.saturating_add(1));
    }
}

/// Corpus-scope name clusters, bound URIs, and string-replacement maps.
pub struct CrossDocIndex {
    pub(crate) clusters: RwLock<ClusterTables>,
    pub(crate) counters: Mutex<IdCounters>,
    pub(crate) bound: DashMap<ClusterId, BoundEntry>,
    /// (doc id, type) -> name -> URI.
    pub(crate) doc_replacements: DashMap<(String, String), HashMap<String, String>>,
    /// type -> name -> URI.
    pub(crate) type_replacements: DashMap<String, HashMap<String, String>>,
}

impl CrossDocIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            clusters: RwLock::new(ClusterTables::default()),
            counters: Mutex::new(IdCounters::default()),
            bound: DashMap::new(),
            doc_replacements: DashMap::new(),
            type_replacements: DashMap::new(),
        }
    }

    /// Look a name up, registering a new cluster if no compatible one exists.
    ///
    /// A name already registered only under incompatible entity classes gets a
    /// fresh cluster (`conflict = true`) instead of being merged into the
    /// existing one.
    pub fn resolve_or_register(
        &self,
        name: &str,
        type_uri: &str,
        doc_id: Option<&str>,
    ) -> IndexResult<Resolution> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Err(IndexError::EmptyName);
        }
        let class = EntityClass::from_type(type_uri);

        {
            let tables = self.clusters.read().map_err(|_| IndexError::LockPoisoned)?;
            if let Some(cluster) = tables.lookup(&normalized, class) {
                return Ok(Resolution {
                    cluster,
                    conflict: false,
                    registered: false,
                });
            }
        }

        let mut tables = self.clusters.write().map_err(|_| IndexError::LockPoisoned)?;
        if let Some(cluster) = tables.lookup(&normalized, class) {
            return Ok(Resolution {
                cluster,
                conflict: false,
                registered: false,
            });
        }

        let conflict = tables
            .by_name
            .get(&normalized)
            .is_some_and(|ids| !ids.is_empty());
        let cluster = self
            .counters
            .lock()
            .map_err(|_| IndexError::LockPoisoned)?
            .allocate_regular()?;
        tables.add_name(cluster, class, &normalized);

        if conflict {
            tracing::info!(
                name = %normalized,
                %class,
                %cluster,
                doc_id = doc_id.unwrap_or("-"),
                "split cluster for name registered under an incompatible class"
            );
        } else {
            tracing::debug!(name = %normalized, %class, %cluster, "registered new cluster");
        }

        Ok(Resolution {
            cluster,
            conflict,
            registered: true,
        })
    }

    /// Look a name up without registering anything.
    pub fn lookup(&self, name: &str, type_uri: &str) -> IndexResult<Option<ClusterId>> {
        let normalized = normalize_name(name);
        let class = EntityClass::from_type(type_uri);
        let tables = self.clusters.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(tables.lookup(&normalized, class))
    }

    /// Hand out the next special cluster id, counting down from
    /// [`FIRST_SPECIAL_ID`]. Each id is handed out exactly once.
    pub fn next_special_id(&self) -> IndexResult<ClusterId> {
        self.counters
            .lock()
            .map_err(|_| IndexError::LockPoisoned)?
            .allocate_special()
    }

    /// Names registered for a cluster.
    pub fn cluster_names(&self, cluster: ClusterId) -> IndexResult<Option<BTreeSet<String>>> {
        let tables = self.clusters.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(tables.entries.get(&cluster).map(|e| e.names.clone()))
    }

    pub fn cluster_class(&self, cluster: ClusterId) -> IndexResult<Option<EntityClass>> {
        let tables = self.clusters.read().map_err(|_| IndexError::LockPoisoned)?;
        Ok(tables.entries.get(&cluster).map(|e| e.class))
    }

    /// Bound URI loaded for a cluster, if any.
    pub fn bound_uri(&self, cluster: ClusterId) -> Option<String> {
        self.bound.get(&cluster).map(|e| e.uri.clone())
    }

    /// Bind a cluster to a fixed ontology URI.
    pub fn bind_cluster(&self, cluster: ClusterId, label: impl Into<String>, uri: impl Into<String>) {
        self.bound.insert(
            cluster,
            BoundEntry {
                label: label.into(),
                uri: uri.into(),
            },
        );
    }

    /// Add a string replacement, scoped to a document when `doc_id` is given.
    /// The name is stored as given, lowercased, and uppercased.
    pub fn add_string_replacement(&self, doc_id: Option<&str>, type_uri: &str, name: &str, uri: &str) {
        let variants = [name.to_string(), name.to_lowercase(), name.to_uppercase()];
        let insert = |map: &mut HashMap<String, String>| {
            for variant in &variants {
                map.insert(variant.clone(), uri.to_string());
            }
        };
        match doc_id {
            Some(doc) => {
                let mut map = self
                    .doc_replacements
                    .entry((doc.to_string(), type_uri.to_string()))
                    .or_default();
                insert(map.value_mut());
            }
            None => {
                let mut map = self.type_replacements.entry(type_uri.to_string()).or_default();
                insert(map.value_mut());
            }
        }
    }

    /// The cleaned name followed by the other names of its cluster, cached per
    /// document.
    pub fn other_names(
        &self,
        scratch: &mut DocumentScratchState,
        type_uri: &str,
        name: &str,
    ) -> IndexResult<Vec<String>> {
        let cleaned = collapse_whitespace(name);
        if let Some(names) = scratch.cached_other_names(type_uri, &cleaned) {
            return Ok(names.clone());
        }

        let mut names = vec![cleaned.clone()];
        if let Some(cluster) = self.lookup(&cleaned, type_uri)? {
            if let Some(cluster_names) = self.cluster_names(cluster)? {
                names.extend(cluster_names.into_iter().filter(|n| *n != cleaned));
            }
        }
        scratch.cache_other_names(type_uri, &cleaned, names.clone());
        Ok(names)
    }

    /// Bind an argument name to a URI.
    ///
    /// Consults, in order: the per-(document, type) replacement map, the
    /// per-type replacement map (each tried with the name and then the other
    /// names of its cluster), the domain lookup, and finally the cluster table,
    /// registering the name if needed. Only the last step can return a cluster.
    pub fn get_mapped_arg(
        &self,
        scratch: &mut DocumentScratchState,
        type_uri: &str,
        name: &str,
        lookup: &dyn DomainLookup,
    ) -> IndexResult<MappedArg> {
        let names = self.other_names(scratch, type_uri, name)?;
        let doc_id = scratch.doc_id().to_string();

        let doc_key = (doc_id.clone(), type_uri.to_string());
        if let Some(map) = self.doc_replacements.get(&doc_key) {
            if let Some(uri) = names.iter().find_map(|n| map.get(n)) {
                return Ok(MappedArg {
                    bound_uri: Some(uri.clone()),
                    cluster: None,
                    source: MappingSource::DocumentReplacement,
                });
            }
        }
        if let Some(map) = self.type_replacements.get(type_uri) {
            if let Some(uri) = names.iter().find_map(|n| map.get(n)) {
                return Ok(MappedArg {
                    bound_uri: Some(uri.clone()),
                    cluster: None,
                    source: MappingSource::TypeReplacement,
                });
            }
        }

        let cleaned = &names[0];
        if let Some(uri) = lookup.lookup_bound_entity(cleaned, type_uri, &doc_id) {
            return Ok(MappedArg {
                bound_uri: Some(uri),
                cluster: None,
                source: MappingSource::DomainLookup,
            });
        }

        let resolution = self.resolve_or_register(cleaned, type_uri, Some(&doc_id))?;
        let bound_uri = self.bound_uri(resolution.cluster);
        let source = if bound_uri.is_some() {
            MappingSource::ClusterBinding
        } else {
            MappingSource::Unbound
        };
        Ok(MappedArg {
            bound_uri,
            cluster: Some(resolution.cluster),
            source,
        })
    }

    /// Make every entity in `others` share the clusters of `primary` within
    /// this document. A primary without a cluster gets a special id.
    pub fn merge_entities(
        &self,
        scratch: &mut DocumentScratchState,
        primary: u64,
        others: &BTreeSet<u64>,
    ) -> IndexResult<()> {
        if scratch.entity_clusters(primary).is_none_or(BTreeSet::is_empty) {
            let cluster = self.next_special_id()?;
            tracing::info!(doc_id = scratch.doc_id(), entity = primary, %cluster, "assigned special cluster id");
            scratch.assign_entity_cluster(primary, cluster);
        }
        scratch.alias_entities(primary, others);
        Ok(())
    }

    pub fn stats(&self) -> IndexResult<IndexStats> {
        let tables = self.clusters.read().map_err(|_| IndexError::LockPoisoned)?;
        let counters = *self.counters.lock().map_err(|_| IndexError::LockPoisoned)?;
        Ok(IndexStats {
            clusters: tables.entries.len(),
            names: tables.by_name.len(),
            bound_uris: self.bound.len(),
            document_replacement_maps: self.doc_replacements.len(),
            type_replacement_maps: self.type_replacements.len(),
            next_cluster_id: counters.next_regular,
            next_special_id: counters.next_special,
        })
    }
}

impl Default for CrossDocIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CrossDocIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossDocIndex")
            .field("bound", &self.bound.len())
            .field("doc_replacements", &self.doc_replacements.len())
            .field("type_replacements", &self.type_replacements.len())
            .finish_non_exhaustive()
    }
}
