//! End-to-end integration tests for elf-resolve.
//!
//! These tests drive the public API the way the CLI does: documents built
//! directly or read from JSON records, an index loaded from tables, and the
//! pipeline running coreference and cross-document resolution over them.

use std::collections::BTreeSet;
use std::sync::Arc;

use elf_resolve::alignment::{NoDomainLookup, TextualAlignment};
use elf_resolve::config::{CorefConfig, ResolveConfig};
use elf_resolve::coref::{CorefEngine, CorefScope};
use elf_resolve::document::{ContentStage, Document};
use elf_resolve::identifier::{
    ClusterId, Identifier, IdentifierKind, NameOrDesc, Span, TextSpan, TypeAssertion,
};
use elf_resolve::individual::{Individual, generate_uri_from_offsets};
use elf_resolve::pipeline::{Pipeline, group_by_id};
use elf_resolve::record::{DocumentRecord, read_documents, write_document};
use elf_resolve::relation::{Relation, RelationArg};
use elf_resolve::xdoc::CrossDocIndex;

fn named(name: &str, start: usize, type_uri: &str, id: Identifier) -> Individual {
    let evidence = TextSpan::at(name, start, start + name.len());
    Individual::new()
        .with_name(NameOrDesc::name(evidence.clone()))
        .with_type(TypeAssertion::new(type_uri, evidence))
        .with_identifier(id)
        .unwrap()
}

fn arg(role: &str, individual: &Arc<Individual>) -> RelationArg {
    let text = individual.name().map(|n| n.text().to_string()).unwrap_or_default();
    RelationArg::new(role, Arc::clone(individual), TextSpan::new(text))
}

#[test]
fn same_entity_mentions_cluster_under_entity_uri() {
    let mut doc = Document::new("D1");
    doc.insert_individual(named("John Smith", 0, "ic:Person", Identifier::EntityRef(7)));
    doc.insert_individual(named("Smith", 52, "ic:Person", Identifier::EntityRef(7)));

    let engine = CorefEngine::new(&TextualAlignment);
    let outcome = doc.do_document_level_coref(&engine, &[]).unwrap();
    assert_eq!(outcome.clusters.len(), 1);

    let merged = doc.merged_individuals().unwrap();
    let smith = &merged["entity-D1-7"];
    let names: BTreeSet<&str> = smith.names().iter().map(|n| n.text()).collect();
    assert!(names.contains("John Smith"));
    assert!(names.contains("Smith"));
    assert_eq!(smith.name().unwrap().text(), "John Smith");
}

#[test]
fn implausible_type_splits_shared_name() {
    let index = CrossDocIndex::new();
    index.parse_xdoc_seeds("12\tGPE\tgeorgia\n", "seeds").unwrap();

    let country = index.resolve_or_register("Georgia", "kbp:Country", Some("D1")).unwrap();
    assert_eq!(country.cluster, ClusterId(12));
    assert!(!country.conflict);

    let person = index.resolve_or_register("georgia", "ic:Person", Some("D2")).unwrap();
    assert_ne!(person.cluster, ClusterId(12));
    assert!(person.conflict);

    let again = index.resolve_or_register("Georgia", "ic:Person", Some("D3")).unwrap();
    assert_eq!(again.cluster, person.cluster);
    assert!(!again.registered);
}

#[test]
fn partner_copies_of_a_relation_collapse() {
    let x = Arc::new(named("Jane Doe", 0, "ic:Person", Identifier::EntityRef(1)));
    let acme = Arc::new(named("Acme", 20, "ic:Company", Identifier::EntityRef(2)));
    let employs = Relation::new("eru:employs", [arg("rdf:subject", &x), arg("rdf:object", &acme)]).unwrap();

    let mut a = Document::new("D1");
    a.insert_relation(employs.clone()).unwrap();
    let mut b = Document::new("D1").with_source("serif");
    b.insert_relation(employs.with_evidence(Some(TextSpan::at("Jane Doe works for Acme", 0, 24))))
        .unwrap();

    let merged = Document::merge([a, b]).unwrap();
    assert_eq!(merged.relations().len(), 1);
    assert_eq!(merged.stage(), ContentStage::Merged);
}

#[test]
fn multiply_bound_object_splits_three_ways() {
    let subject = Arc::new(named("Acme", 0, "ic:Company", Identifier::EntityRef(1)));
    let fillers: Vec<Arc<Individual>> = ["Xavier", "Yolanda", "Zed"]
        .iter()
        .enumerate()
        .map(|(i, n)| Arc::new(named(n, 10 + i * 10, "ic:Person", Identifier::EntityRef(2 + i as u64))))
        .collect();
    let mut args = vec![arg("rdf:subject", &subject)];
    args.extend(fillers.iter().map(|f| arg("object", f)));

    let mut doc = Document::new("D1");
    doc.insert_relation(Relation::new("eru:employs", args).unwrap()).unwrap();
    assert_eq!(doc.split_duplicate_role_relations().unwrap(), 1);
    assert_eq!(doc.relations().len(), 3);

    let objects: BTreeSet<&str> = doc
        .relations()
        .iter()
        .map(|r| {
            assert_eq!(r.args_with_role("object").len(), 1);
            assert_eq!(r.arg("rdf:subject").unwrap().individual(), &subject);
            r.arg("object").unwrap().individual().name().unwrap().text()
        })
        .collect();
    assert_eq!(objects, BTreeSet::from(["Xavier", "Yolanda", "Zed"]));
}

#[test]
fn coref_is_idempotent() {
    let mut doc = Document::new("D1");
    doc.insert_individual(named("John Smith", 0, "ic:Person", Identifier::EntityRef(7)));
    let generated = generate_uri_from_offsets("D1", Span::new(52, 57));
    doc.insert_individual(named("Smith", 52, "ic:Person", Identifier::GeneratedUri(generated)));
    let engine = CorefEngine::new(&TextualAlignment);

    let first = doc.do_coref(&engine, CorefScope::Document, &[]).unwrap();
    let snapshot = doc.clone();
    assert_eq!(first.uri_map.len(), 2);
    let second = doc.do_coref(&engine, CorefScope::Document, &[]).unwrap();
    assert_eq!(first.uri_map, second.uri_map);
    assert_eq!(doc.replace_individual_uris(&first.uri_map), 0);
    assert_eq!(doc, snapshot);
}

#[test]
fn config_tables_feed_the_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("xdoc.tsv"), "40\tORG\tarizona cardinals, cardinals\n").unwrap();
    std::fs::write(
        dir.path().join("bound.tsv"),
        "Arizona Cardinals\t40\tnfl:ArizonaCardinals\n",
    )
    .unwrap();
    let config_path = dir.path().join("resolve.toml");
    std::fs::write(
        &config_path,
        "[index]\nxdoc_seeds = \"xdoc.tsv\"\nbound_uris = \"bound.tsv\"\n\n[coref]\nscope = \"document\"\n",
    )
    .unwrap();

    let config = ResolveConfig::load(&config_path).unwrap();
    let index = config.index.build_index().unwrap();
    let pipeline = Pipeline::new(&index, &TextualAlignment, &NoDomainLookup, config.coref);

    let mut doc = Document::new("D1");
    doc.insert_individual(named("Cardinals", 0, "nfl:NFLTeam", Identifier::EntityRef(3)));
    let (doc, report) = pipeline.run_document(vec![doc]).unwrap();
    assert_eq!(report.xdoc_updates, 1);
    let team = &doc.individuals()[0];
    assert_eq!(team.ids().number(IdentifierKind::XDocClusterId), Some(40));
    assert_eq!(team.best_uri(Some("D1")).unwrap(), "nfl:ArizonaCardinals");
}

#[test]
fn json_documents_round_trip_through_the_pipeline() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("input.json");
    std::fs::write(
        &input,
        r#"[
        {"id": "D1", "source": "partner-a", "individuals": [
            {"id": "a1", "name": "John Smith", "name_start": 0, "name_end": 10,
             "types": [{"type": "ic:Person", "text": "John Smith", "start": 0, "end": 10}],
             "identifiers": [{"kind": "entity_ref", "value": 7}]},
            {"id": "a2", "name": "Acme", "name_start": 30, "name_end": 34,
             "types": [{"type": "ic:Company", "text": "Acme", "start": 30, "end": 34}],
             "identifiers": [{"kind": "entity_ref", "value": 8}]}
         ],
         "relations": [{"name": "eru:employs", "args": [
            {"role": "rdf:subject", "individual": "a2"},
            {"role": "rdf:object", "individual": "a1"}]}]},
        {"id": "D1", "individuals": [
            {"id": "b1", "name": "Smith", "name_start": 60, "name_end": 65,
             "types": [{"type": "ic:Person", "text": "Smith", "start": 60, "end": 65}],
             "identifiers": [{"kind": "entity_ref", "value": 7}]}
         ]}
    ]"#,
    )
    .unwrap();

    let docs: Vec<Document> = read_documents(&input)
        .unwrap()
        .into_iter()
        .map(|r| {
            let (doc, skipped) = Document::from_record(r);
            assert!(skipped.is_empty());
            doc
        })
        .collect();
    let groups = group_by_id(docs);
    assert_eq!(groups["D1"].len(), 2);

    let index = CrossDocIndex::new();
    let pipeline = Pipeline::new(&index, &TextualAlignment, &NoDomainLookup, CorefConfig::default());
    let mut results = pipeline.run_batch(groups);
    let (id, result) = results.remove(0);
    assert_eq!(id, "D1");
    let (doc, report) = result.unwrap();
    assert_eq!(report.partners, 2);
    assert_eq!(doc.source(), "partner-a");

    let record = doc.to_record().unwrap();
    let ids: BTreeSet<&str> = record.individuals.iter().filter_map(|i| i.id.as_deref()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.starts_with("xdoc-")));

    let output = dir.path().join("D1.json");
    write_document(&output, &record).unwrap();
    let reread: Vec<DocumentRecord> = read_documents(&output).unwrap();
    assert_eq!(reread, vec![record]);
    assert!(index.lookup("John Smith", "ic:Person").unwrap().is_some());
}
