//! Per-document resolution pipeline.
//!
//! A pipeline takes the partner copies of one document through a fixed
//! sequence of stages, sharing one [`CrossDocIndex`] across documents.
//! Batches run documents in parallel; each worker owns its document and its
//! [`DocumentScratchState`].

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;

use crate::alignment::{AlignmentService, DomainLookup};
use crate::config::CorefConfig;
use crate::coref::{ClusterOutcome, CorefEngine};
use crate::document::Document;
use crate::error::{DocumentError, ResolveResult};
use crate::identifier::IdentifierKind;
use crate::xdoc::{CrossDocIndex, DocumentScratchState};

/// The kind of work a pipeline stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Fold partner copies of the document into one.
    Merge,
    /// Split relations that repeat a non-temporal role.
    SplitRoles,
    /// Cluster coreferent individuals at the configured scope.
    Coref,
    /// Attach cross-document cluster ids and bound URIs.
    CrossDocument,
}

impl StageKind {
    /// Every stage, in execution order.
    pub const ALL: [StageKind; 4] = [
        Self::Merge,
        Self::SplitRoles,
        Self::Coref,
        Self::CrossDocument,
    ];
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::SplitRoles => write!(f, "split-roles"),
            Self::Coref => write!(f, "coref"),
            Self::CrossDocument => write!(f, "cross-document"),
        }
    }
}

/// What the pipeline did to one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub doc_id: String,
    /// Partner copies folded into the document.
    pub partners: usize,
    /// Individuals that received an xdoc cluster id or bound URI.
    pub xdoc_updates: usize,
    /// Relations replaced by their role-split parts.
    pub split_relations: usize,
    /// Coreference clusters, singletons included.
    pub clusters: usize,
    /// Member URIs remapped to a cluster URI.
    pub remapped: usize,
    /// Document entities aliased to another entity's clusters.
    pub aliased_entities: usize,
}

/// Runs documents through the enabled stages.
pub struct Pipeline<'a> {
    index: &'a CrossDocIndex,
    alignment: &'a dyn AlignmentService,
    lookup: &'a dyn DomainLookup,
    coref: CorefConfig,
    stages: Vec<StageKind>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        index: &'a CrossDocIndex,
        alignment: &'a dyn AlignmentService,
        lookup: &'a dyn DomainLookup,
        coref: CorefConfig,
    ) -> Self {
        Self {
            index,
            alignment,
            lookup,
            coref,
            stages: StageKind::ALL.to_vec(),
        }
    }

    /// Restrict the pipeline to `stages`. Execution order stays fixed.
    pub fn with_stages(mut self, stages: impl IntoIterator<Item = StageKind>) -> Self {
        let enabled: BTreeSet<usize> = stages
            .into_iter()
            .filter_map(|s| StageKind::ALL.iter().position(|k| *k == s))
            .collect();
        self.stages = enabled.into_iter().map(|i| StageKind::ALL[i]).collect();
        self
    }

    pub fn stages(&self) -> &[StageKind] {
        &self.stages
    }

    fn enabled(&self, stage: StageKind) -> bool {
        self.stages.contains(&stage)
    }

    /// Run the partner copies of one document through every enabled stage.
    ///
    /// Without the merge stage only the first partner is processed.
    pub fn run_document(&self, partners: Vec<Document>) -> ResolveResult<(Document, DocumentReport)> {
        let partner_count = partners.len();
        let mut doc = if self.enabled(StageKind::Merge) {
            Document::merge(partners)?
        } else {
            if partner_count > 1 {
                tracing::warn!(partners = partner_count, "merge stage disabled, keeping first partner");
            }
            partners
                .into_iter()
                .next()
                .ok_or(DocumentError::EmptyMerge)?
        };
        let mut report = DocumentReport {
            doc_id: doc.id().to_string(),
            partners: partner_count,
            ..Default::default()
        };

        if self.enabled(StageKind::SplitRoles) {
            report.split_relations = doc.split_duplicate_role_relations()?;
        }

        let mut entity_groups: Vec<BTreeSet<u64>> = Vec::new();
        if self.enabled(StageKind::Coref) {
            let engine =
                CorefEngine::new(self.alignment).with_role_limits(self.coref.role_limits.clone());
            let outcome = doc.do_coref(&engine, self.coref.scope, &self.coref.target_types)?;
            report.clusters = outcome.clusters.len();
            report.remapped = outcome.uri_map.len();
            entity_groups = multi_entity_groups(&outcome);
        }

        if self.enabled(StageKind::CrossDocument) {
            let mut scratch = DocumentScratchState::new(doc.id());
            report.xdoc_updates = doc.resolve_cross_document(self.index, &mut scratch, self.lookup)?;
            for group in &entity_groups {
                let mut entities = group.iter().copied();
                let Some(primary) = entities.next() else {
                    continue;
                };
                let others: BTreeSet<u64> = entities.collect();
                self.index.merge_entities(&mut scratch, primary, &others)?;
                report.aliased_entities += others.len();
            }
            if report.aliased_entities > 0 {
                report.xdoc_updates += doc.apply_entity_clusters(&scratch);
            }
        }

        tracing::info!(
            doc_id = %report.doc_id,
            partners = report.partners,
            xdoc_updates = report.xdoc_updates,
            split_relations = report.split_relations,
            clusters = report.clusters,
            aliased_entities = report.aliased_entities,
            "document resolved"
        );
        Ok((doc, report))
    }

    /// Run every document group in parallel. Results come back in id order.
    pub fn run_batch(
        &self,
        groups: BTreeMap<String, Vec<Document>>,
    ) -> Vec<(String, ResolveResult<(Document, DocumentReport)>)> {
        groups
            .into_par_iter()
            .map(|(id, partners)| {
                let result = self.run_document(partners);
                if let Err(e) = &result {
                    tracing::warn!(doc_id = %id, error = %e, "document failed");
                }
                (id, result)
            })
            .collect()
    }
}

/// Group partner copies by document id.
pub fn group_by_id(docs: impl IntoIterator<Item = Document>) -> BTreeMap<String, Vec<Document>> {
    let mut groups: BTreeMap<String, Vec<Document>> = BTreeMap::new();
    for doc in docs {
        groups.entry(doc.id().to_string()).or_default().push(doc);
    }
    groups
}

/// Entity ids of every cluster whose members carry more than one.
fn multi_entity_groups(outcome: &ClusterOutcome) -> Vec<BTreeSet<u64>> {
    outcome
        .clusters
        .iter()
        .map(|c| {
            c.members
                .iter()
                .filter_map(|m| m.ids().number(IdentifierKind::EntityRef))
                .collect::<BTreeSet<u64>>()
        })
        .filter(|entities| entities.len() > 1)
        .collect()
}
