//! Per-document mutable state consulted during cross-document resolution.

use std::collections::{BTreeSet, HashMap};

use crate::identifier::ClusterId;

/// Caches and entity maps that live for exactly one document.
///
/// Create one per document, pass it to the index operations that need it, and
/// drop it when the document is done. Each worker owns its own.
#[derive(Debug, Default)]
pub struct DocumentScratchState {
    doc_id: String,
    /// (type, cleaned name) -> the name followed by the other names of its cluster.
    other_names: HashMap<(String, String), Vec<String>>,
    /// Document entity id -> cross-document clusters it was mapped to.
    entity_clusters: HashMap<u64, BTreeSet<ClusterId>>,
    /// Document entity id -> bound URIs it was mapped to.
    entity_bound_uris: HashMap<u64, BTreeSet<String>>,
}

impl DocumentScratchState {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            ..Default::default()
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub(crate) fn cached_other_names(&self, type_uri: &str, name: &str) -> Option<&Vec<String>> {
        self.other_names
            .get(&(type_uri.to_string(), name.to_string()))
    }

    pub(crate) fn cache_other_names(&mut self, type_uri: &str, name: &str, names: Vec<String>) {
        self.other_names
            .insert((type_uri.to_string(), name.to_string()), names);
    }

    pub fn entity_clusters(&self, entity_id: u64) -> Option<&BTreeSet<ClusterId>> {
        self.entity_clusters.get(&entity_id)
    }

    pub fn entity_bound_uris(&self, entity_id: u64) -> Option<&BTreeSet<String>> {
        self.entity_bound_uris.get(&entity_id)
    }

    /// Record that a document entity maps to a cross-document cluster.
    pub fn assign_entity_cluster(&mut self, entity_id: u64, cluster: ClusterId) {
        self.entity_clusters
            .entry(entity_id)
            .or_default()
            .insert(cluster);
    }

    /// Record that a document entity maps to a bound URI.
    pub fn bind_entity(&mut self, entity_id: u64, uri: impl Into<String>) {
        self.entity_bound_uris
            .entry(entity_id)
            .or_default()
            .insert(uri.into());
    }

    /// Point every entity in `others` at exactly the clusters and bound URIs of
    /// `primary`.
    pub(crate) fn alias_entities(&mut self, primary: u64, others: &BTreeSet<u64>) {
        let clusters = self.entity_clusters.get(&primary).cloned().unwrap_or_default();
        let bound = self.entity_bound_uris.get(&primary).cloned();
        for other in others.iter().filter(|e| **e != primary) {
            self.entity_clusters.insert(*other, clusters.clone());
            if let Some(bound) = &bound {
                self.entity_bound_uris.insert(*other, bound.clone());
            }
        }
    }
}
