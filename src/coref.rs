//! Scoped coreference clustering.
//!
//! Candidates are the non-value individuals of a document (free-standing and
//! argument-embedded), grouped by their best URI ignoring any coref URI.
//! Pairwise [`Individual::are_coreferent`] edges are fed, in sorted order, to a
//! union-find; each resulting component becomes a [`Cluster`] with one
//! canonical URI. Everything is keyed and sorted by URI before ids or digests
//! are computed, so the outcome does not depend on input order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::alignment::AlignmentService;
use crate::document::Document;
use crate::error::IdentityResult;
use crate::identifier::{IdentifierKind, Span};
use crate::individual::{Individual, digest_hex, dominant_type};

/// Type local name used in cluster URIs when members carry no type.
const UNTYPED: &str = "Thing";

/// Whether candidate pairs may span the whole document or one sentence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorefScope {
    #[default]
    Document,
    Sentence,
}

impl std::fmt::Display for CorefScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Sentence => write!(f, "sentence"),
        }
    }
}

/// A cap on the number of distinct fillers a cluster may accumulate across a
/// group of roles, e.g. no game involves more than two teams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLimit {
    pub roles: Vec<String>,
    pub max_distinct: usize,
}

/// One coreference cluster.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub uri: String,
    pub members: Vec<Arc<Individual>>,
    /// All members merged, carrying `uri` as coref URI.
    pub representative: Individual,
}

/// Result of a clustering run.
#[derive(Debug, Clone, Default)]
pub struct ClusterOutcome {
    /// Clusters ordered by URI.
    pub clusters: Vec<Cluster>,
    /// Member URI -> cluster URI, for members whose URI differs.
    pub uri_map: BTreeMap<String, String>,
}

/// Individuals sharing one coref-free best URI.
struct Node {
    key: String,
    members: Vec<Arc<Individual>>,
    /// role -> distinct filler keys of relations referencing the members.
    role_values: BTreeMap<String, BTreeSet<String>>,
}

/// Clusters coreferent individuals of a document.
pub struct CorefEngine<'a> {
    alignment: &'a dyn AlignmentService,
    role_limits: Vec<RoleLimit>,
}

impl<'a> CorefEngine<'a> {
    pub fn new(alignment: &'a dyn AlignmentService) -> Self {
        Self {
            alignment,
            role_limits: Vec::new(),
        }
    }

    pub fn with_role_limits(mut self, limits: Vec<RoleLimit>) -> Self {
        self.role_limits = limits;
        self
    }

    /// Cluster at the given scope. An empty `target_types` selects every type.
    ///
    /// At sentence scope each sentence is clustered on its own; a member URI
    /// mapped by an earlier sentence keeps that mapping.
    pub fn cluster(
        &self,
        doc: &Document,
        scope: CorefScope,
        target_types: &[String],
    ) -> IdentityResult<ClusterOutcome> {
        match scope {
            CorefScope::Document => self.cluster_within(doc, None, target_types),
            CorefScope::Sentence => {
                let mut outcome = ClusterOutcome::default();
                for sentence in doc.sentences() {
                    let part = self.cluster_within(doc, Some(*sentence), target_types)?;
                    for (from, to) in part.uri_map {
                        match outcome.uri_map.get(&from) {
                            Some(existing) if *existing != to => {
                                tracing::debug!(doc_id = doc.id(), %from, %existing, ignored = %to, "duplicate coref mapping, keeping first");
                            }
                            Some(_) => {}
                            None => {
                                outcome.uri_map.insert(from, to);
                            }
                        }
                    }
                    outcome.clusters.extend(part.clusters);
                }
                outcome.clusters.sort_by(|a, b| a.uri.cmp(&b.uri));
                Ok(outcome)
            }
        }
    }

    /// Cluster the candidates whose evidence lies inside `window`, or every
    /// candidate when `window` is `None`.
    pub fn cluster_within(
        &self,
        doc: &Document,
        window: Option<Span>,
        target_types: &[String],
    ) -> IdentityResult<ClusterOutcome> {
        let doc_id = doc.id();
        let mut nodes = self.candidate_nodes(doc, window, target_types);
        if nodes.is_empty() {
            return Ok(ClusterOutcome::default());
        }

        let mut uf = UnionFind::<usize>::new(nodes.len());
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                if !self.nodes_coreferent(&nodes[i], &nodes[j], doc_id) {
                    continue;
                }
                let (ri, rj) = (uf.find(i), uf.find(j));
                if ri == rj {
                    continue;
                }
                if let Some(limit) = self.exceeded_limit(&nodes[ri], &nodes[rj]) {
                    tracing::debug!(
                        doc_id,
                        a = %nodes[i].key,
                        b = %nodes[j].key,
                        roles = ?limit.roles,
                        max = limit.max_distinct,
                        "refusing coref union over role limit"
                    );
                    continue;
                }
                uf.union(ri, rj);
                let root = uf.find(ri);
                let absorbed = if root == ri { rj } else { ri };
                let moved = std::mem::take(&mut nodes[absorbed].role_values);
                for (role, values) in moved {
                    nodes[root].role_values.entry(role).or_default().extend(values);
                }
            }
        }

        let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (node, label) in uf.into_labeling().into_iter().enumerate() {
            components.entry(label).or_default().push(node);
        }

        let mut outcome = ClusterOutcome::default();
        for indices in components.into_values() {
            let keys: Vec<&str> = indices.iter().map(|&i| nodes[i].key.as_str()).collect();
            let members: Vec<Arc<Individual>> = indices
                .iter()
                .flat_map(|&i| nodes[i].members.iter().cloned())
                .collect();
            let uri = cluster_uri(doc_id, &keys, &members);
            // Every member of a multi-node cluster gets the coref URI, the
            // member whose own URI named the cluster included.
            if keys.len() > 1 {
                for key in &keys {
                    outcome.uri_map.insert((*key).to_string(), uri.clone());
                }
            }
            let representative = Individual::merge_coreferent(members.iter().map(|m| &**m), &uri)?;
            outcome.clusters.push(Cluster {
                uri,
                members,
                representative,
            });
        }
        outcome.clusters.sort_by(|a, b| a.uri.cmp(&b.uri));

        tracing::debug!(
            doc_id,
            candidates = nodes.len(),
            clusters = outcome.clusters.len(),
            remapped = outcome.uri_map.len(),
            "coref clustering done"
        );
        Ok(outcome)
    }

    fn candidate_nodes(
        &self,
        doc: &Document,
        window: Option<Span>,
        target_types: &[String],
    ) -> Vec<Node> {
        let doc_id = doc.id();
        let mut grouped: BTreeMap<String, Vec<Arc<Individual>>> = BTreeMap::new();
        for individual in doc.all_individuals() {
            if individual.is_value() {
                continue;
            }
            if !target_types.is_empty() && !target_types.iter().any(|t| individual.has_type(t)) {
                continue;
            }
            if let Some(window) = window {
                if !individual.evidence_span().is_some_and(|s| window.contains(&s)) {
                    continue;
                }
            }
            let Ok(key) = individual.best_uri_without_coref(Some(doc_id)) else {
                tracing::debug!(doc_id, "skipping coref candidate without identifiers");
                continue;
            };
            let members = grouped.entry(key).or_default();
            if !members.iter().any(|m| **m == **individual) {
                members.push(Arc::clone(individual));
            }
        }

        let limited_roles: BTreeSet<&str> = self
            .role_limits
            .iter()
            .flat_map(|l| l.roles.iter().map(String::as_str))
            .collect();

        grouped
            .into_iter()
            .map(|(key, members)| {
                let role_values = if limited_roles.is_empty() {
                    BTreeMap::new()
                } else {
                    role_values(doc, &members, &limited_roles)
                };
                Node {
                    key,
                    members,
                    role_values,
                }
            })
            .collect()
    }

    fn nodes_coreferent(&self, a: &Node, b: &Node, doc_id: &str) -> bool {
        a.members.iter().any(|x| {
            b.members
                .iter()
                .any(|y| x.are_coreferent(y, self.alignment, doc_id))
        })
    }

    fn exceeded_limit(&self, a: &Node, b: &Node) -> Option<&RoleLimit> {
        self.role_limits.iter().find(|limit| {
            let distinct: BTreeSet<&String> = limit
                .roles
                .iter()
                .flat_map(|role| {
                    a.role_values
                        .get(role)
                        .into_iter()
                        .chain(b.role_values.get(role))
                        .flatten()
                })
                .collect();
            distinct.len() > limit.max_distinct
        })
    }
}

/// Fillers of limited roles in relations that reference any member, other
/// than the member itself.
fn role_values(
    doc: &Document,
    members: &[Arc<Individual>],
    limited_roles: &BTreeSet<&str>,
) -> BTreeMap<String, BTreeSet<String>> {
    let member_keys: BTreeSet<String> = members.iter().filter_map(|m| m.best_uri(None).ok()).collect();
    let mut values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for relation in doc.relations() {
        if !members.iter().any(|m| relation.references(m)) {
            continue;
        }
        for arg in relation.args() {
            if !limited_roles.contains(arg.role()) {
                continue;
            }
            if let Some(filler) = arg.filler_key() {
                if !member_keys.contains(&filler) {
                    values.entry(arg.role().to_string()).or_default().insert(filler);
                }
            }
        }
    }
    values
}

/// The canonical URI of a component.
///
/// A single-node component keeps its own URI. A component whose members agree
/// on one bound URI takes it. Otherwise the URI is derived from the document,
/// the dominant member type, and a digest of the sorted member URIs.
fn cluster_uri(doc_id: &str, keys: &[&str], members: &[Arc<Individual>]) -> String {
    if let [only] = keys {
        return (*only).to_string();
    }
    let bound: BTreeSet<&str> = members
        .iter()
        .filter_map(|m| m.ids().uri(IdentifierKind::BoundUri))
        .collect();
    if bound.len() == 1 {
        if let Some(uri) = bound.into_iter().next() {
            return uri.to_string();
        }
    }
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    let ty = dominant_type(members.iter().map(|m| &**m)).unwrap_or_else(|| UNTYPED.to_string());
    format!("cluster-{doc_id}-{ty}-{}", digest_hex(sorted))
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    use super::*;
    use crate::alignment::TextualAlignment;
    use crate::identifier::{Identifier, NameOrDesc, TextSpan, TypeAssertion};
    use crate::individual::generate_uri_from_offsets;
    use crate::relation::{Relation, RelationArg};

    fn person(name: &str, start: usize, ids: Vec<Identifier>) -> Individual {
        let evidence = TextSpan::at(name, start, start + name.len());
        let mut individual = Individual::new()
            .with_name(NameOrDesc::name(evidence.clone()))
            .with_type(TypeAssertion::new("Person", evidence));
        for id in ids {
            individual = individual.with_identifier(id).unwrap();
        }
        individual
    }

    /// A person known only by its offsets, as pattern-extracted arguments are.
    fn offset_person(doc_id: &str, name: &str, start: usize) -> Individual {
        let uri = generate_uri_from_offsets(doc_id, Span::new(start, start + name.len()));
        person(name, start, vec![Identifier::GeneratedUri(uri)])
    }

    #[test]
    fn shared_entity_ref_yields_one_cluster_with_both_names() {
        let mut doc = Document::new("D1");
        doc.insert_individual(person("John Smith", 0, vec![Identifier::EntityRef(7)]));
        doc.insert_individual(person("Smith", 40, vec![Identifier::EntityRef(7)]));

        let engine = CorefEngine::new(&TextualAlignment);
        let outcome = engine.cluster(&doc, CorefScope::Document, &[]).unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        let cluster = &outcome.clusters[0];
        assert_eq!(cluster.uri, "entity-D1-7");
        assert_eq!(cluster.members.len(), 2);
        assert_eq!(cluster.representative.names().len(), 2);
        assert_eq!(cluster.representative.best_uri(Some("D1")).unwrap(), "entity-D1-7");
        assert_eq!(cluster.representative.name().unwrap().text(), "John Smith");
        assert!(outcome.uri_map.is_empty());
    }

    #[test]
    fn aligned_mentions_share_generated_cluster_uri() {
        let mut doc = Document::new("D1");
        doc.insert_individual(offset_person("D1", "John Smith", 0));
        doc.insert_individual(offset_person("D1", "Smith", 40));
        doc.insert_individual(offset_person("D1", "Mary Jones", 80));

        let engine = CorefEngine::new(&TextualAlignment);
        let outcome = engine.cluster(&doc, CorefScope::Document, &[]).unwrap();
        assert_eq!(outcome.clusters.len(), 2);

        let merged = outcome
            .clusters
            .iter()
            .find(|c| c.members.len() == 2)
            .unwrap();
        assert!(merged.uri.starts_with("cluster-D1-Person-"));
        assert_eq!(outcome.uri_map.get("individual-D1-0-10"), Some(&merged.uri));
        assert_eq!(outcome.uri_map.get("individual-D1-40-45"), Some(&merged.uri));
        assert!(!outcome.uri_map.contains_key("individual-D1-80-90"));
    }

    #[test]
    fn distinct_entity_refs_never_cluster() {
        let mut doc = Document::new("D1");
        doc.insert_individual(person("Smith", 0, vec![Identifier::EntityRef(1)]));
        doc.insert_individual(person("Smith", 20, vec![Identifier::EntityRef(2)]));

        let engine = CorefEngine::new(&TextualAlignment);
        let outcome = engine.cluster(&doc, CorefScope::Document, &[]).unwrap();
        assert_eq!(outcome.clusters.len(), 2);
        assert!(outcome.uri_map.is_empty());
    }

    #[test]
    fn clustering_ignores_insertion_order() {
        let people: Vec<Individual> = vec![
            offset_person("D9", "John Smith", 0),
            offset_person("D9", "Smith", 30),
            offset_person("D9", "J. Smith", 60),
            offset_person("D9", "Mary Jones", 90),
            offset_person("D9", "Jones", 120),
            offset_person("D9", "Bob", 150),
        ];
        let run = |order: &[Individual]| {
            let mut doc = Document::new("D9");
            for p in order {
                doc.insert_individual(p.clone());
            }
            let outcome = CorefEngine::new(&TextualAlignment)
                .cluster(&doc, CorefScope::Document, &[])
                .unwrap();
            let partition: Vec<(String, BTreeSet<String>)> = outcome
                .clusters
                .iter()
                .map(|c| {
                    (
                        c.uri.clone(),
                        c.members
                            .iter()
                            .map(|m| m.best_uri_without_coref(Some("D9")).unwrap())
                            .collect(),
                    )
                })
                .collect();
            (partition, outcome.uri_map)
        };

        let baseline = run(&people);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let mut shuffled = people.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(run(&shuffled), baseline);
        }
    }

    #[test]
    fn target_types_restrict_candidates() {
        let mut doc = Document::new("D1");
        doc.insert_individual(offset_person("D1", "John Smith", 0));
        doc.insert_individual(offset_person("D1", "Smith", 40));

        let engine = CorefEngine::new(&TextualAlignment);
        let outcome = engine
            .cluster(&doc, CorefScope::Document, &["ic:Organization".to_string()])
            .unwrap();
        assert!(outcome.clusters.is_empty());
    }

    #[test]
    fn sentence_scope_keeps_cross_sentence_mentions_apart() {
        let mut doc = Document::new("D1").with_sentences(vec![Span::new(0, 30), Span::new(30, 60)]);
        doc.insert_individual(offset_person("D1", "John Smith", 0));
        doc.insert_individual(offset_person("D1", "Smith", 15));
        doc.insert_individual(offset_person("D1", "Smith", 40));

        let engine = CorefEngine::new(&TextualAlignment);
        let sentence = engine.cluster(&doc, CorefScope::Sentence, &[]).unwrap();
        let merged: Vec<&Cluster> = sentence.clusters.iter().filter(|c| c.members.len() > 1).collect();
        assert_eq!(merged.len(), 1);
        assert!(!sentence.uri_map.contains_key("individual-D1-40-45"));

        let document = engine.cluster(&doc, CorefScope::Document, &[]).unwrap();
        assert_eq!(document.clusters.len(), 1);
        assert_eq!(document.uri_map.len(), 3);
    }

    #[test]
    fn role_limit_blocks_union() {
        let game = |n: u64, start: usize| {
            let evidence = TextSpan::at("the game", start, start + 8);
            Individual::new()
                .with_name(NameOrDesc::desc(evidence.clone()))
                .with_type(TypeAssertion::new("nfl:NFLGame", evidence))
                .with_identifier(Identifier::GeneratedUri(format!("game-{n}")))
                .unwrap()
        };
        let team = |uri: &str| {
            Arc::new(
                Individual::new()
                    .with_type(TypeAssertion::new("nfl:NFLTeam", TextSpan::new(uri)))
                    .with_identifier(Identifier::BoundUri(uri.to_string()))
                    .unwrap(),
            )
        };

        let mut doc = Document::new("D1");
        let g1 = doc.insert_individual(game(1, 0));
        let g2 = doc.insert_individual(game(2, 50));
        for (g, teams) in [(&g1, ["nfl:Cardinals", "nfl:Rams"]), (&g2, ["nfl:Bears", "nfl:Rams"])] {
            let relation = Relation::new(
                "nfl:gameTeams",
                [
                    RelationArg::new("eru:game", Arc::clone(g), TextSpan::new("the game")),
                    RelationArg::new("eru:teamInGame1", team(teams[0]), TextSpan::new(teams[0])),
                    RelationArg::new("eru:teamInGame2", team(teams[1]), TextSpan::new(teams[1])),
                ],
            )
            .unwrap();
            doc.insert_relation(relation).unwrap();
        }

        let unlimited = CorefEngine::new(&TextualAlignment)
            .cluster(&doc, CorefScope::Document, &["nfl:NFLGame".to_string()])
            .unwrap();
        assert_eq!(unlimited.clusters.len(), 1);

        let limited = CorefEngine::new(&TextualAlignment)
            .with_role_limits(vec![RoleLimit {
                roles: vec!["eru:teamInGame1".into(), "eru:teamInGame2".into()],
                max_distinct: 2,
            }])
            .cluster(&doc, CorefScope::Document, &["nfl:NFLGame".to_string()])
            .unwrap();
        assert_eq!(limited.clusters.len(), 2);
        assert!(limited.uri_map.is_empty());
    }

    #[test]
    fn shared_bound_uri_names_the_cluster() {
        let mut doc = Document::new("D1");
        doc.insert_individual(person(
            "Kurt Warner",
            0,
            vec![
                Identifier::GeneratedUri("individual-D1-0-11".into()),
                Identifier::BoundUri("nfl:KurtWarner".into()),
            ],
        ));
        doc.insert_individual(offset_person("D1", "Warner", 30));

        let outcome = CorefEngine::new(&TextualAlignment)
            .cluster(&doc, CorefScope::Document, &[])
            .unwrap();
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(outcome.clusters[0].uri, "nfl:KurtWarner");
        assert_eq!(
            outcome.uri_map.get("individual-D1-30-36").map(String::as_str),
            Some("nfl:KurtWarner")
        );
        assert_eq!(
            outcome.uri_map.get("nfl:KurtWarner").map(String::as_str),
            Some("nfl:KurtWarner")
        );
    }
}
