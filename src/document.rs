//! One logical document: its individuals, relations and content stage.
//!
//! Individuals and relations are held as `Arc`s and never mutated in place.
//! Operations that change identity (URI rewrites, cross-document resolution,
//! role splitting) build replacement values and swap them into the vectors.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::alignment::DomainLookup;
use crate::coref::{ClusterOutcome, CorefEngine, CorefScope};
use crate::error::{DocumentError, DocumentResult, IdentityResult, RelationResult};
use crate::identifier::{Identifier, IdentifierKind, NameKind, Span};
use crate::individual::Individual;
use crate::relation::{Relation, RelationArg};
use crate::xdoc::{CrossDocIndex, DocumentScratchState, MappedArg};

/// How far a document has been consolidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStage {
    #[default]
    Partial,
    Merged,
    SentenceCorefed,
    DocumentCorefed,
}

impl fmt::Display for ContentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial => write!(f, "partial"),
            Self::Merged => write!(f, "merged"),
            Self::SentenceCorefed => write!(f, "sentence_corefed"),
            Self::DocumentCorefed => write!(f, "document_corefed"),
        }
    }
}

/// Individuals and relations extracted from one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    id: String,
    stage: ContentStage,
    source: String,
    sentences: Vec<Span>,
    relations: Vec<Arc<Relation>>,
    individuals: Vec<Arc<Individual>>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: ContentStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Sentence spans, used to restrict sentence-level coreference.
    pub fn with_sentences(mut self, mut sentences: Vec<Span>) -> Self {
        sentences.sort();
        sentences.dedup();
        self.sentences = sentences;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> ContentStage {
        self.stage
    }

    pub fn set_stage(&mut self, stage: ContentStage) {
        self.stage = stage;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sentences(&self) -> &[Span] {
        &self.sentences
    }

    pub fn relations(&self) -> &[Arc<Relation>] {
        &self.relations
    }

    /// Free-standing individuals.
    pub fn individuals(&self) -> &[Arc<Individual>] {
        &self.individuals
    }

    /// Free-standing individuals followed by every argument filler, values
    /// included.
    pub fn all_individuals(&self) -> Vec<&Arc<Individual>> {
        self.individuals
            .iter()
            .chain(
                self.relations
                    .iter()
                    .flat_map(|r| r.args().map(|a| a.individual())),
            )
            .collect()
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    /// Add a free-standing individual. An identical individual already present
    /// is returned instead of adding a copy.
    pub fn insert_individual(&mut self, individual: impl Into<Arc<Individual>>) -> Arc<Individual> {
        let individual = individual.into();
        if let Some(existing) = self.individuals.iter().find(|i| **i == individual) {
            return Arc::clone(existing);
        }
        self.individuals.push(Arc::clone(&individual));
        individual
    }

    /// Add a relation after checking it still has two distinct roles.
    pub fn insert_relation(&mut self, relation: Relation) -> RelationResult<Arc<Relation>> {
        relation.validate()?;
        let relation = Arc::new(relation);
        self.relations.push(Arc::clone(&relation));
        Ok(relation)
    }

    // -----------------------------------------------------------------------
    // Merge and removal
    // -----------------------------------------------------------------------

    /// Merge partner documents sharing one id and one stage.
    ///
    /// Relations equal up to offsets collapse into one; when they do, a
    /// non-empty source wins over an empty one. Individuals are copied
    /// unmerged (exact duplicates dropped); clustering them is a separate
    /// step.
    pub fn merge(docs: impl IntoIterator<Item = Document>) -> DocumentResult<Document> {
        let mut docs = docs.into_iter();
        let mut merged = docs.next().ok_or(DocumentError::EmptyMerge)?;
        let mut sentences: BTreeSet<Span> = merged.sentences.drain(..).collect();
        let mut partners = 1;

        for doc in docs {
            if doc.id != merged.id {
                return Err(DocumentError::DocumentIdMismatch {
                    expected: merged.id,
                    found: doc.id,
                });
            }
            if doc.stage != merged.stage {
                return Err(DocumentError::IncompatibleMergeKind {
                    expected: merged.stage.to_string(),
                    found: doc.stage.to_string(),
                });
            }
            if merged.source.is_empty() {
                merged.source = doc.source;
            }
            sentences.extend(doc.sentences);
            for relation in doc.relations {
                merged.absorb_relation(relation);
            }
            for individual in doc.individuals {
                merged.insert_individual(individual);
            }
            partners += 1;
        }

        merged.sentences = sentences.into_iter().collect();
        merged.stage = ContentStage::Merged;
        tracing::debug!(
            doc_id = %merged.id,
            partners,
            relations = merged.relations.len(),
            individuals = merged.individuals.len(),
            "merged partner documents"
        );
        Ok(merged)
    }

    fn absorb_relation(&mut self, relation: Arc<Relation>) {
        let Some(pos) = self
            .relations
            .iter()
            .position(|r| r.offsetless_equals(&relation))
        else {
            self.relations.push(relation);
            return;
        };
        if self.relations[pos].source().is_empty() && !relation.source().is_empty() {
            let mut kept = (*self.relations[pos]).clone();
            kept.set_source(relation.source());
            self.relations[pos] = Arc::new(kept);
        }
    }

    /// Remove these exact relations (pointer identity). Returns how many were
    /// removed.
    pub fn remove_relations(&mut self, targets: &[Arc<Relation>]) -> usize {
        let before = self.relations.len();
        self.relations
            .retain(|r| !targets.iter().any(|t| Arc::ptr_eq(r, t)));
        before - self.relations.len()
    }

    /// Remove free-standing individuals identical to a target (same name,
    /// types, value and identifiers), then every relation referencing a
    /// target through any argument.
    ///
    /// Returns the number of individuals and relations removed.
    pub fn remove_individuals(&mut self, targets: &[Arc<Individual>]) -> (usize, usize) {
        let matches = |i: &Individual| {
            targets
                .iter()
                .any(|t| i.identity_cmp(t).is_eq() && i.has_equal_ids(t))
        };

        let individuals_before = self.individuals.len();
        self.individuals.retain(|i| !matches(i));
        let removed_individuals = individuals_before - self.individuals.len();

        let relations_before = self.relations.len();
        self.relations
            .retain(|r| !r.args().any(|a| matches(a.individual().as_ref())));
        let removed_relations = relations_before - self.relations.len();

        if removed_individuals + removed_relations > 0 {
            tracing::debug!(
                doc_id = %self.id,
                individuals = removed_individuals,
                relations = removed_relations,
                "removed individuals"
            );
        }
        (removed_individuals, removed_relations)
    }

    /// Replace every relation with a multiply-bound role by its expansion.
    ///
    /// Either every split succeeds and is applied, or the document is left
    /// unchanged. Returns the number of relations that were split.
    pub fn split_duplicate_role_relations(&mut self) -> RelationResult<usize> {
        let mut rebuilt = Vec::with_capacity(self.relations.len());
        let mut split = 0;
        for relation in &self.relations {
            match relation.split_duplicate_roles()? {
                Some(parts) => {
                    split += 1;
                    tracing::debug!(doc_id = %self.id, relation = relation.name(), parts = parts.len(), "split relation with duplicate roles");
                    rebuilt.extend(parts.into_iter().map(Arc::new));
                }
                None => rebuilt.push(Arc::clone(relation)),
            }
        }
        self.relations = rebuilt;
        Ok(split)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn individuals_by_type(&self, type_uri: &str) -> Vec<&Arc<Individual>> {
        self.individuals
            .iter()
            .filter(|i| i.has_type(type_uri))
            .collect()
    }

    /// Free-standing individuals of a type whose evidence lies in `sentence`.
    pub fn individuals_by_type_and_sentence(
        &self,
        type_uri: &str,
        sentence: Span,
    ) -> Vec<&Arc<Individual>> {
        self.individuals
            .iter()
            .filter(|i| i.has_type(type_uri))
            .filter(|i| i.evidence_span().is_some_and(|s| sentence.contains(&s)))
            .collect()
    }

    /// First individual, free-standing or embedded, with this generated URI.
    pub fn individual_by_generated_uri(&self, uri: &str) -> Option<&Arc<Individual>> {
        self.all_individuals()
            .into_iter()
            .find(|i| i.ids().uri(IdentifierKind::GeneratedUri) == Some(uri))
    }

    /// Every non-value individual, grouped by best URI and merged.
    pub fn merged_individuals(&self) -> IdentityResult<BTreeMap<String, Individual>> {
        let mut groups: BTreeMap<String, Vec<&Individual>> = BTreeMap::new();
        for individual in self.all_individuals() {
            if individual.is_value() {
                continue;
            }
            let Ok(uri) = individual.best_uri(Some(&self.id)) else {
                continue;
            };
            groups.entry(uri).or_default().push(individual);
        }
        groups
            .into_iter()
            .map(|(uri, members)| Ok((uri, Individual::merge(members)?)))
            .collect()
    }

    pub fn merged_individual_by_uri(&self, uri: &str) -> IdentityResult<Option<Individual>> {
        Ok(self.merged_individuals()?.remove(uri))
    }

    pub fn merged_individuals_by_type(&self, type_uri: &str) -> IdentityResult<Vec<Individual>> {
        Ok(self
            .merged_individuals()?
            .into_values()
            .filter(|i| i.has_type(type_uri))
            .collect())
    }

    /// Relations with an argument filled by `individual` (equal up to offsets).
    pub fn relations_by_individual(&self, individual: &Individual) -> Vec<&Arc<Relation>> {
        self.relations
            .iter()
            .filter(|r| r.references(individual))
            .collect()
    }

    /// Relations with an argument equal to `arg` up to offsets, role included.
    pub fn relations_by_arg(&self, arg: &RelationArg) -> Vec<&Arc<Relation>> {
        self.relations
            .iter()
            .filter(|r| r.args().any(|a| a.offsetless_equals(arg, true)))
            .collect()
    }

    pub fn individual_in_relation(&self, individual: &Individual) -> bool {
        self.relations.iter().any(|r| r.references(individual))
    }

    // -----------------------------------------------------------------------
    // Coreference and URI rewriting
    // -----------------------------------------------------------------------

    /// Cluster at `scope`, apply the resulting URI map, and advance the stage.
    pub fn do_coref(
        &mut self,
        engine: &CorefEngine<'_>,
        scope: CorefScope,
        target_types: &[String],
    ) -> IdentityResult<ClusterOutcome> {
        let outcome = engine.cluster(self, scope, target_types)?;
        let rewritten = self.replace_individual_uris(&outcome.uri_map);
        self.stage = match scope {
            CorefScope::Document => ContentStage::DocumentCorefed,
            CorefScope::Sentence => ContentStage::SentenceCorefed,
        };
        tracing::info!(
            doc_id = %self.id,
            %scope,
            clusters = outcome.clusters.len(),
            rewritten,
            "coreference applied"
        );
        Ok(outcome)
    }

    pub fn do_document_level_coref(
        &mut self,
        engine: &CorefEngine<'_>,
        target_types: &[String],
    ) -> IdentityResult<ClusterOutcome> {
        self.do_coref(engine, CorefScope::Document, target_types)
    }

    pub fn do_sentence_level_coref(
        &mut self,
        engine: &CorefEngine<'_>,
        target_types: &[String],
    ) -> IdentityResult<ClusterOutcome> {
        self.do_coref(engine, CorefScope::Sentence, target_types)
    }

    /// Set the coref URI of every individual, free-standing or embedded, whose
    /// coref-free best URI is a key of `uri_map`. Applying the same map again
    /// changes nothing. Returns the number of individuals rewritten.
    pub fn replace_individual_uris(&mut self, uri_map: &BTreeMap<String, String>) -> usize {
        if uri_map.is_empty() {
            return 0;
        }
        let doc_id = self.id.clone();
        self.rewrite_individuals(|individual| {
            let key = individual.best_uri_without_coref(Some(&doc_id)).ok()?;
            let target = uri_map.get(&key)?;
            if individual.ids().uri(IdentifierKind::CorefUri) == Some(target.as_str()) {
                return None;
            }
            Some(Arc::new(individual.with_coref_uri(target.as_str())))
        })
    }

    /// Set coref URIs from a map keyed by generated URI.
    pub fn add_individual_coref_uris(&mut self, by_generated_uri: &BTreeMap<String, String>) -> usize {
        if by_generated_uri.is_empty() {
            return 0;
        }
        self.rewrite_individuals(|individual| {
            let generated = individual.ids().uri(IdentifierKind::GeneratedUri)?;
            let target = by_generated_uri.get(generated)?;
            if individual.ids().uri(IdentifierKind::CorefUri) == Some(target.as_str()) {
                return None;
            }
            Some(Arc::new(individual.with_coref_uri(target.as_str())))
        })
    }

    /// Swap every individual for which `f` returns a replacement, in the
    /// free-standing list and in relation arguments.
    fn rewrite_individuals(
        &mut self,
        mut f: impl FnMut(&Arc<Individual>) -> Option<Arc<Individual>>,
    ) -> usize {
        let mut count = 0;
        for individual in &mut self.individuals {
            if let Some(replacement) = f(individual) {
                *individual = replacement;
                count += 1;
            }
        }
        for relation in &mut self.relations {
            let rebuilt = relation.with_individuals_replaced(|i| {
                let replacement = f(i);
                if replacement.is_some() {
                    count += 1;
                }
                replacement
            });
            if let Some(rebuilt) = rebuilt {
                *relation = Arc::new(rebuilt);
            }
        }
        count
    }

    // -----------------------------------------------------------------------
    // Cross-document resolution
    // -----------------------------------------------------------------------

    /// Attach xdoc cluster ids and bound URIs to named individuals.
    ///
    /// Individuals sharing an entity id are resolved once, under the longest
    /// name any of them carries, so an entity never ends up in two clusters.
    /// Individuals without an entity id are grouped the same way by coref
    /// URI; a coref cluster holding an entity follows that entity. Values, descriptions, mention-scoped types and individuals that already
    /// carry an xdoc id are left alone. Returns the number of individuals
    /// updated.
    pub fn resolve_cross_document(
        &mut self,
        index: &CrossDocIndex,
        scratch: &mut DocumentScratchState,
        lookup: &dyn DomainLookup,
    ) -> DocumentResult<usize> {
        let mut entity_names: BTreeMap<u64, (String, String)> = BTreeMap::new();
        let mut coref_names: BTreeMap<String, (String, String)> = BTreeMap::new();
        let mut coref_entities: BTreeMap<String, u64> = BTreeMap::new();
        let mut loose_names: BTreeSet<(String, String)> = BTreeSet::new();
        for individual in self.all_individuals() {
            let Some(candidate) = resolution_candidate(individual) else {
                continue;
            };
            let ids = individual.ids();
            match (ids.number(IdentifierKind::EntityRef), ids.uri(IdentifierKind::CorefUri)) {
                (Some(entity), coref) => {
                    if let Some(coref) = coref {
                        let slot = coref_entities.entry(coref.to_string()).or_insert(entity);
                        *slot = (*slot).min(entity);
                    }
                    keep_preferred(entity_names.entry(entity), candidate);
                }
                (None, Some(coref)) => keep_preferred(coref_names.entry(coref.to_string()), candidate),
                (None, None) => {
                    loose_names.insert(candidate);
                }
            }
        }
        coref_names.retain(|coref, _| !coref_entities.contains_key(coref));

        let mut by_entity: HashMap<u64, MappedArg> = HashMap::new();
        for (entity, (name, type_uri)) in entity_names {
            let mapped = index.get_mapped_arg(scratch, &type_uri, &name, lookup)?;
            if let Some(cluster) = mapped.cluster {
                scratch.assign_entity_cluster(entity, cluster);
            }
            if let Some(uri) = &mapped.bound_uri {
                scratch.bind_entity(entity, uri.clone());
            }
            by_entity.insert(entity, mapped);
        }
        let mut by_coref: HashMap<String, MappedArg> = HashMap::new();
        for (coref, (name, type_uri)) in coref_names {
            let mapped = index.get_mapped_arg(scratch, &type_uri, &name, lookup)?;
            by_coref.insert(coref, mapped);
        }
        let mut by_name: HashMap<(String, String), MappedArg> = HashMap::new();
        for (name, type_uri) in loose_names {
            let mapped = index.get_mapped_arg(scratch, &type_uri, &name, lookup)?;
            by_name.insert((name, type_uri), mapped);
        }

        let updated = self.rewrite_individuals(|individual| {
            let candidate = resolution_candidate(individual)?;
            let ids = individual.ids();
            let mapped = match (ids.number(IdentifierKind::EntityRef), ids.uri(IdentifierKind::CorefUri)) {
                (Some(entity), _) => by_entity.get(&entity)?,
                (None, Some(coref)) => match coref_entities.get(coref) {
                    Some(entity) => by_entity.get(entity)?,
                    None => by_coref.get(coref)?,
                },
                (None, None) => by_name.get(&candidate)?,
            };
            apply_mapping(individual, mapped).map(Arc::new)
        });
        tracing::debug!(doc_id = %self.id, updated, "cross-document resolution applied");
        Ok(updated)
    }

    /// Re-point individuals at the clusters their entity maps to in `scratch`,
    /// after entities were aliased. The smallest cluster of the entity wins.
    pub fn apply_entity_clusters(&mut self, scratch: &DocumentScratchState) -> usize {
        self.rewrite_individuals(|individual| {
            let entity = individual.ids().number(IdentifierKind::EntityRef)?;
            let cluster = *scratch.entity_clusters(entity)?.first()?;
            if individual.ids().number(IdentifierKind::XDocClusterId) == Some(cluster.get()) {
                return None;
            }
            Some(Arc::new(
                individual.with_replaced(Identifier::XDocClusterId(cluster)),
            ))
        })
    }
}

/// The (name, type) an individual is resolved under, if it takes part.
fn resolution_candidate(individual: &Individual) -> Option<(String, String)> {
    if individual.is_value()
        || individual.is_mention_scoped()
        || individual.ids().contains(IdentifierKind::XDocClusterId)
    {
        return None;
    }
    let name = individual.name().filter(|n| n.kind == NameKind::Name)?;
    let dominant = individual.dominant_type()?;
    let type_uri = individual
        .types()
        .iter()
        .find(|t| t.local_name() == dominant)?
        .type_uri
        .clone();
    Some((name.text().to_string(), type_uri))
}

/// Fill or replace a group's resolution name with the preferred candidate.
fn keep_preferred<K: Ord>(entry: Entry<'_, K, (String, String)>, candidate: (String, String)) {
    match entry {
        Entry::Vacant(slot) => {
            slot.insert(candidate);
        }
        Entry::Occupied(mut slot) => {
            if prefer_name(&candidate, slot.get()) {
                slot.insert(candidate);
            }
        }
    }
}

/// Longer names win; equal lengths fall back to the smaller string.
fn prefer_name(candidate: &(String, String), current: &(String, String)) -> bool {
    let (a, b) = (candidate.0.chars().count(), current.0.chars().count());
    a > b || (a == b && candidate.0 < current.0)
}

fn apply_mapping(individual: &Individual, mapped: &MappedArg) -> Option<Individual> {
    let mut next: Option<Individual> = None;
    if let Some(cluster) = mapped.cluster {
        if !individual.ids().contains(IdentifierKind::XDocClusterId) {
            let base = next.as_ref().unwrap_or(individual);
            next = Some(base.with_replaced(Identifier::XDocClusterId(cluster)));
        }
    }
    if let Some(uri) = &mapped.bound_uri {
        if !individual.ids().contains(IdentifierKind::BoundUri) {
            let base = next.as_ref().unwrap_or(individual);
            next = Some(base.with_replaced(Identifier::BoundUri(uri.clone())));
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{NoDomainLookup, TextualAlignment};
    use crate::error::RelationError;
    use crate::identifier::{ClusterId, NameOrDesc, TextSpan, TypeAssertion};
    use crate::relation::SPLIT_SOURCE_TAG;

    fn named(name: &str, start: usize, type_uri: &str, ids: Vec<Identifier>) -> Individual {
        let evidence = TextSpan::at(name, start, start + name.len());
        let mut individual = Individual::new()
            .with_name(NameOrDesc::name(evidence.clone()))
            .with_type(TypeAssertion::new(type_uri, evidence));
        for id in ids {
            individual = individual.with_identifier(id).unwrap();
        }
        individual
    }

    fn partner(uri: &str, name: &str) -> Arc<Individual> {
        Arc::new(named(name, 0, "ic:Person", vec![Identifier::PartnerUri(uri.into())]))
    }

    fn literal(text: &str, start: usize) -> Arc<Individual> {
        Arc::new(
            Individual::literal("xsd:string", text, TextSpan::at(text, start, start + text.len()), "D1")
                .unwrap(),
        )
    }

    fn employs(subject: &Arc<Individual>, object: &str, start: usize) -> Relation {
        Relation::new(
            "employs",
            [
                RelationArg::new("rdf:subject", Arc::clone(subject), TextSpan::new("X")),
                RelationArg::new("rdf:object", literal(object, start), TextSpan::at(object, start, start + object.len())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn partner_documents_collapse_equal_relations() {
        let x = partner("ic:X", "X");
        let mut a = Document::new("D1");
        a.insert_relation(employs(&x, "Acme", 10)).unwrap();
        let mut b = Document::new("D1").with_source("partner-b");
        b.insert_relation(employs(&x, "Acme", 55).with_source("bbn:pattern")).unwrap();

        let merged = Document::merge([a, b]).unwrap();
        assert_eq!(merged.relations().len(), 1);
        assert_eq!(merged.relations()[0].source(), "bbn:pattern");
        assert_eq!(merged.stage(), ContentStage::Merged);
        assert_eq!(merged.source(), "partner-b");
    }

    #[test]
    fn merge_rejects_mixed_stages_and_ids() {
        let a = Document::new("D1");
        let b = Document::new("D1").with_stage(ContentStage::DocumentCorefed);
        assert!(matches!(
            Document::merge([a, b]),
            Err(DocumentError::IncompatibleMergeKind { .. })
        ));

        let a = Document::new("D1");
        let b = Document::new("D2");
        assert!(matches!(
            Document::merge([a, b]),
            Err(DocumentError::DocumentIdMismatch { .. })
        ));
        assert!(matches!(
            Document::merge(Vec::new()),
            Err(DocumentError::EmptyMerge)
        ));
    }

    #[test]
    fn merge_copies_individuals_unmerged() {
        let mut a = Document::new("D1");
        a.insert_individual(named("John Smith", 0, "ic:Person", vec![Identifier::EntityRef(7)]));
        let mut b = Document::new("D1");
        b.insert_individual(named("John Smith", 0, "ic:Person", vec![Identifier::EntityRef(7)]));
        b.insert_individual(named("Smith", 40, "ic:Person", vec![Identifier::EntityRef(7)]));

        let merged = Document::merge([a, b]).unwrap();
        assert_eq!(merged.individuals().len(), 2);
        assert_eq!(merged.merged_individuals().unwrap().len(), 1);
    }

    #[test]
    fn removing_individual_cascades_to_relations() {
        let x = partner("ic:X", "X");
        let y = partner("ic:Y", "Y");
        let mut doc = Document::new("D1");
        doc.insert_individual(Arc::clone(&x));
        doc.insert_individual(Arc::clone(&y));
        doc.insert_relation(employs(&x, "Acme", 10)).unwrap();
        doc.insert_relation(employs(&y, "Acme", 30)).unwrap();

        let (individuals, relations) = doc.remove_individuals(&[Arc::clone(&x)]);
        assert_eq!((individuals, relations), (1, 1));
        assert_eq!(doc.individuals().len(), 1);
        assert!(doc.relations().iter().all(|r| !r.references(&x)));
        assert!(!doc.individual_in_relation(&x));
        assert!(doc.individual_in_relation(&y));
    }

    #[test]
    fn removal_spares_relations_of_coreferent_individuals() {
        let smith = Arc::new(named(
            "Smith",
            0,
            "ic:Person",
            vec![Identifier::MentionRef(1), Identifier::CorefUri("cluster-D1-Person-1".into())],
        ));
        let john = Arc::new(named(
            "John Smith",
            40,
            "ic:Person",
            vec![Identifier::MentionRef(2), Identifier::CorefUri("cluster-D1-Person-1".into())],
        ));
        assert_eq!(smith.best_uri(Some("D1")).unwrap(), john.best_uri(Some("D1")).unwrap());

        let mut doc = Document::new("D1");
        doc.insert_individual(Arc::clone(&smith));
        doc.insert_individual(Arc::clone(&john));
        doc.insert_relation(employs(&smith, "Acme", 10)).unwrap();
        doc.insert_relation(employs(&john, "Initech", 60)).unwrap();

        assert_eq!(doc.remove_individuals(&[Arc::clone(&smith)]), (1, 1));
        assert_eq!(doc.individuals().len(), 1);
        assert_eq!(doc.relations().len(), 1);
        assert!(doc.individual_in_relation(&john));
    }

    #[test]
    fn remove_relations_uses_pointer_identity() {
        let x = partner("ic:X", "X");
        let mut doc = Document::new("D1");
        let first = doc.insert_relation(employs(&x, "Acme", 10)).unwrap();
        doc.insert_relation(employs(&x, "Acme", 10)).unwrap();
        assert_eq!(doc.remove_relations(&[first]), 1);
        assert_eq!(doc.relations().len(), 1);
    }

    #[test]
    fn split_replaces_original_relation() {
        let x = partner("ic:X", "X");
        let mut relation = employs(&x, "Acme", 10);
        relation.insert_argument(RelationArg::new("rdf:object", literal("Initech", 20), TextSpan::at("Initech", 20, 27)));
        relation.insert_argument(RelationArg::new("rdf:object", literal("Globex", 30), TextSpan::at("Globex", 30, 36)));
        let mut doc = Document::new("D1");
        doc.insert_relation(relation).unwrap();
        doc.insert_relation(employs(&x, "Hooli", 50)).unwrap();

        assert_eq!(doc.split_duplicate_role_relations().unwrap(), 1);
        assert_eq!(doc.relations().len(), 4);
        let split: Vec<_> = doc
            .relations()
            .iter()
            .filter(|r| r.source().contains(SPLIT_SOURCE_TAG))
            .collect();
        assert_eq!(split.len(), 3);
        assert!(split.iter().all(|r| r.args_with_role("rdf:object").len() == 1));
        assert!(doc.relations().iter().all(|r| r.args_with_role("rdf:object").len() == 1));
    }

    #[test]
    fn insert_relation_rejects_single_role() {
        let x = partner("ic:X", "X");
        let mut relation = employs(&x, "Acme", 10);
        let object = Arc::clone(relation.arg("rdf:object").unwrap());
        assert!(relation.remove_argument(&object));
        let mut doc = Document::new("D1");
        assert!(matches!(
            doc.insert_relation(relation),
            Err(RelationError::AmbiguousRelation { roles: 1, .. })
        ));
    }

    #[test]
    fn replacing_uris_is_idempotent_and_reaches_arguments() {
        let generated = |name: &str, start: usize| {
            named(
                name,
                start,
                "ic:Person",
                vec![Identifier::GeneratedUri(format!("individual-D1-{start}-{}", start + name.len()))],
            )
        };
        let smith = Arc::new(generated("Smith", 40));
        let mut doc = Document::new("D1");
        doc.insert_individual(generated("John Smith", 0));
        doc.insert_relation(employs(&smith, "Acme", 60)).unwrap();

        let engine = CorefEngine::new(&TextualAlignment);
        let outcome = doc.do_document_level_coref(&engine, &[]).unwrap();
        assert_eq!(outcome.uri_map.len(), 2);
        assert_eq!(doc.stage(), ContentStage::DocumentCorefed);

        let once = doc.clone();
        assert_eq!(doc.replace_individual_uris(&outcome.uri_map), 0);
        assert_eq!(doc, once);

        let cluster_uri = &outcome.clusters[0].uri;
        let subject = doc.relations()[0].arg("rdf:subject").unwrap().individual();
        assert_eq!(subject.best_uri(Some("D1")).unwrap(), *cluster_uri);
        assert_eq!(doc.individuals()[0].best_uri(Some("D1")).unwrap(), *cluster_uri);
        let merged = doc.merged_individual_by_uri(cluster_uri).unwrap().unwrap();
        assert_eq!(merged.names().len(), 2);
    }

    #[test]
    fn coref_uris_attach_by_generated_uri() {
        let mut doc = Document::new("D1");
        doc.insert_individual(named(
            "Acme",
            0,
            "ic:Company",
            vec![Identifier::GeneratedUri("individual-D1-0-4".into())],
        ));
        let map: BTreeMap<String, String> =
            [("individual-D1-0-4".to_string(), "ic:AcmeCorp".to_string())].into();
        assert_eq!(doc.add_individual_coref_uris(&map), 1);
        assert_eq!(doc.add_individual_coref_uris(&map), 0);
        assert_eq!(
            doc.individual_by_generated_uri("individual-D1-0-4")
                .unwrap()
                .best_uri(None)
                .unwrap(),
            "ic:AcmeCorp"
        );
    }

    #[test]
    fn queries_filter_by_type_and_sentence() {
        let mut doc = Document::new("D1").with_sentences(vec![Span::new(0, 20), Span::new(20, 40)]);
        doc.insert_individual(named("Acme", 0, "ic:Company", vec![Identifier::MentionRef(1)]));
        doc.insert_individual(named("Bob", 5, "ic:Person", vec![Identifier::MentionRef(2)]));
        doc.insert_individual(named("Initech", 25, "ic:Company", vec![Identifier::MentionRef(3)]));

        assert_eq!(doc.individuals_by_type("ic:Company").len(), 2);
        assert_eq!(
            doc.individuals_by_type_and_sentence("ic:Company", doc.sentences()[1]).len(),
            1
        );
        assert_eq!(doc.merged_individuals_by_type("ic:Person").unwrap().len(), 1);
    }

    #[test]
    fn relation_lookup_by_individual_and_arg() {
        let x = partner("ic:X", "X");
        let y = partner("ic:Y", "Y");
        let mut doc = Document::new("D1");
        let relation = doc.insert_relation(employs(&x, "Acme", 10)).unwrap();
        doc.insert_relation(employs(&y, "Initech", 30)).unwrap();

        assert_eq!(doc.relations_by_individual(&x).len(), 1);
        let object = relation.arg("rdf:object").unwrap();
        assert_eq!(doc.relations_by_arg(object).len(), 1);
    }

    #[test]
    fn cross_document_resolution_shares_cluster_per_entity() {
        let index = CrossDocIndex::new();
        let mut scratch = DocumentScratchState::new("D1");
        let mut doc = Document::new("D1");
        doc.insert_individual(named("John Smith", 0, "ic:Person", vec![Identifier::EntityRef(7)]));
        doc.insert_individual(named("Smith", 40, "ic:Person", vec![Identifier::EntityRef(7)]));
        doc.insert_individual(named("Acme", 60, "ic:Company", vec![Identifier::MentionRef(3)]));
        doc.insert_individual(named("the CEO", 80, "kbp:Title", vec![Identifier::MentionRef(4)]));

        let updated = doc
            .resolve_cross_document(&index, &mut scratch, &NoDomainLookup)
            .unwrap();
        assert_eq!(updated, 3);

        let clusters: BTreeSet<Option<u64>> = doc.individuals()[..2]
            .iter()
            .map(|i| i.ids().number(IdentifierKind::XDocClusterId))
            .collect();
        assert_eq!(clusters.len(), 1);
        let cluster = ClusterId(clusters.into_iter().next().flatten().unwrap());
        assert_eq!(index.cluster_names(cluster).unwrap().unwrap().len(), 1);
        assert!(scratch.entity_clusters(7).unwrap().contains(&cluster));
        assert!(doc.individuals()[3].ids().number(IdentifierKind::XDocClusterId).is_none());
        assert_eq!(doc.merged_individuals().unwrap().len(), 3);

        let again = doc
            .resolve_cross_document(&index, &mut scratch, &NoDomainLookup)
            .unwrap();
        assert_eq!(again, 0);
    }

    #[test]
    fn aliased_entities_take_the_primary_cluster() {
        let index = CrossDocIndex::new();
        let mut scratch = DocumentScratchState::new("D1");
        let mut doc = Document::new("D1");
        doc.insert_individual(named("Bill Gates", 0, "ic:Person", vec![Identifier::EntityRef(1)]));
        doc.insert_individual(named("William Gates", 30, "ic:Person", vec![Identifier::EntityRef(2)]));
        doc.resolve_cross_document(&index, &mut scratch, &NoDomainLookup)
            .unwrap();
        let primary = *scratch.entity_clusters(1).unwrap().first().unwrap();

        index
            .merge_entities(&mut scratch, 1, &BTreeSet::from([2]))
            .unwrap();
        assert_eq!(doc.apply_entity_clusters(&scratch), 1);
        for individual in doc.individuals() {
            assert_eq!(
                individual.ids().number(IdentifierKind::XDocClusterId),
                Some(primary.get())
            );
        }
        assert_eq!(doc.apply_entity_clusters(&scratch), 0);
    }

    #[test]
    fn coref_cluster_resolves_under_its_longest_name() {
        let index = CrossDocIndex::new();
        index.add_string_replacement(None, "nfl:NFLTeam", "Arizona Cardinals", "nfl:ArizonaCardinals");
        let mut scratch = DocumentScratchState::new("D1");
        let mut doc = Document::new("D1");
        for (name, start) in [("Arizona Cardinals", 0), ("Cardinals", 40)] {
            let generated = format!("individual-D1-{start}-{}", start + name.len());
            doc.insert_individual(named(name, start, "nfl:NFLTeam", vec![Identifier::GeneratedUri(generated)]));
        }
        doc.do_document_level_coref(&CorefEngine::new(&TextualAlignment), &[])
            .unwrap();

        let updated = doc
            .resolve_cross_document(&index, &mut scratch, &NoDomainLookup)
            .unwrap();
        assert_eq!(updated, 2);
        for individual in doc.individuals() {
            assert_eq!(individual.best_uri(Some("D1")).unwrap(), "nfl:ArizonaCardinals");
        }
        let merged = doc.merged_individuals().unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["nfl:ArizonaCardinals"].names().len(), 2);
    }

    #[test]
    fn cross_document_resolution_attaches_bound_uris() {
        let index = CrossDocIndex::new();
        index.add_string_replacement(None, "nfl:NFLTeam", "Arizona Cardinals", "nfl:ArizonaCardinals");
        let mut scratch = DocumentScratchState::new("D1");
        let mut doc = Document::new("D1");
        doc.insert_individual(named("Arizona Cardinals", 0, "nfl:NFLTeam", vec![Identifier::MentionRef(1)]));

        doc.resolve_cross_document(&index, &mut scratch, &NoDomainLookup)
            .unwrap();
        assert_eq!(
            doc.individuals()[0].best_uri(Some("D1")).unwrap(),
            "nfl:ArizonaCardinals"
        );
    }
}
