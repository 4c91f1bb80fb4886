//! Serde records for reading and writing documents as JSON.
//!
//! Record fields are mostly optional. Required fields and offset pairing are
//! checked during conversion, where a malformed individual or relation is
//! reported and skipped without rejecting the whole document.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{ContentStage, Document};
use crate::error::{DocumentError, IdentityResult, RecordError, RecordResult};
use crate::identifier::{Identifier, NameKind, NameOrDesc, Span, TextSpan, TypeAssertion};
use crate::individual::Individual;
use crate::relation::{DEFAULT_CONFIDENCE, Relation, RelationArg};

/// A whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub stage: ContentStage,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sentences: Vec<Span>,
    #[serde(default)]
    pub individuals: Vec<IndividualRecord>,
    #[serde(default)]
    pub relations: Vec<RelationRecord>,
}

/// An entity, event or literal value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualRecord {
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_end: Option<usize>,
    #[serde(default)]
    pub types: Vec<TypeRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Explicit identifiers. When absent the record id is taken as a partner URI.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRecord {
    #[serde(rename = "type")]
    pub type_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub name: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_group: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

/// A relation argument: a reference to an individual record, or an inline
/// literal `value` with its `type`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArgRecord {
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub individual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

// ---------------------------------------------------------------------------
// Record -> Document
// ---------------------------------------------------------------------------

impl Document {
    /// Build a document from a record.
    ///
    /// Individuals and relations that fail to convert are logged and skipped;
    /// their errors are returned next to the document.
    pub fn from_record(record: DocumentRecord) -> (Document, Vec<RecordError>) {
        let mut doc = Document::new(record.id.clone())
            .with_stage(record.stage)
            .with_source(record.source)
            .with_sentences(record.sentences);
        let mut skipped = Vec::new();
        let mut by_id: HashMap<String, Arc<Individual>> = HashMap::new();

        for (i, individual) in record.individuals.iter().enumerate() {
            match individual_from_record(individual, &record.id, i) {
                Ok((id, built)) => {
                    let built = doc.insert_individual(built);
                    by_id.insert(id, built);
                }
                Err(e) => {
                    tracing::warn!(doc_id = %record.id, record = i, error = %e, "skipping individual record");
                    skipped.push(e);
                }
            }
        }

        for (i, relation) in record.relations.iter().enumerate() {
            let built = relation_from_record(relation, &record.id, i, &by_id)
                .and_then(|r| doc.insert_relation(r).map_err(RecordError::from));
            if let Err(e) = built {
                tracing::warn!(doc_id = %record.id, record = i, error = %e, "skipping relation record");
                skipped.push(e);
            }
        }

        tracing::debug!(
            doc_id = %record.id,
            individuals = doc.individuals().len(),
            relations = doc.relations().len(),
            skipped = skipped.len(),
            "document read from record"
        );
        (doc, skipped)
    }

    /// Write the consolidated graph: one individual record per best URI, with
    /// the best URI as record id, and relations referring to those ids.
    pub fn to_record(&self) -> IdentityResult<DocumentRecord> {
        let doc_id = Some(self.id());
        let individuals = self
            .merged_individuals()?
            .into_iter()
            .map(|(uri, individual)| individual_to_record(uri, &individual))
            .collect();

        let mut relations = Vec::with_capacity(self.relations().len());
        for relation in self.relations() {
            let mut args = Vec::new();
            for arg in relation.args() {
                let filler = arg.individual();
                let evidence = arg.evidence();
                let mut out = ArgRecord {
                    role: Some(arg.role().to_string()),
                    text: Some(evidence.text.clone()).filter(|t| !t.is_empty()),
                    start: evidence.span.map(|s| s.start),
                    end: evidence.span.map(|s| s.end),
                    ..Default::default()
                };
                match filler.value() {
                    Some(value) => {
                        out.value = Some(value.to_string());
                        out.type_uri = filler.types().iter().next().map(|t| t.type_uri.clone());
                    }
                    None => out.individual = Some(filler.best_uri(doc_id)?),
                }
                args.push(out);
            }
            let evidence = relation.evidence();
            relations.push(RelationRecord {
                name: Some(relation.name().to_string()),
                args,
                confidence: Some(relation.confidence()),
                score_group: relation.score_group(),
                source: Some(relation.source().to_string()).filter(|s| !s.is_empty()),
                text: evidence.map(|e| e.text.clone()).filter(|t| !t.is_empty()),
                start: evidence.and_then(|e| e.span).map(|s| s.start),
                end: evidence.and_then(|e| e.span).map(|s| s.end),
            });
        }

        Ok(DocumentRecord {
            id: self.id().to_string(),
            stage: self.stage(),
            source: self.source().to_string(),
            sentences: self.sentences().to_vec(),
            individuals,
            relations,
        })
    }
}

fn record_label(doc_id: &str, kind: &str, index: usize, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{doc_id}/{kind}/{id}"),
        None => format!("{doc_id}/{kind}#{index}"),
    }
}

/// Both offsets or neither.
fn paired_span(
    record: &str,
    start: Option<usize>,
    end: Option<usize>,
    start_field: &'static str,
    end_field: &'static str,
) -> RecordResult<Option<Span>> {
    match (start, end) {
        (Some(s), Some(e)) => Ok(Some(Span::new(s, e))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(RecordError::UnpairedOffsets {
            record: record.to_string(),
            present: start_field,
            missing: end_field,
        }),
        (None, Some(_)) => Err(RecordError::UnpairedOffsets {
            record: record.to_string(),
            present: end_field,
            missing: start_field,
        }),
    }
}

fn individual_from_record(
    record: &IndividualRecord,
    doc_id: &str,
    index: usize,
) -> RecordResult<(String, Individual)> {
    let label = record_label(doc_id, "individual", index, record.id.as_deref());
    let id = record.id.clone().ok_or_else(|| RecordError::MissingField {
        record: label.clone(),
        field: "id",
    })?;

    let mut types = Vec::with_capacity(record.types.len());
    for ty in &record.types {
        let type_uri = ty.type_uri.clone().ok_or_else(|| RecordError::MissingField {
            record: label.clone(),
            field: "type",
        })?;
        let span = paired_span(&label, ty.start, ty.end, "start", "end")?;
        let evidence = TextSpan {
            text: ty.text.clone().unwrap_or_default(),
            span,
        };
        types.push(TypeAssertion::new(type_uri, evidence));
    }
    let Some(first_type) = types.first().cloned() else {
        return Err(RecordError::MissingField {
            record: label,
            field: "type",
        });
    };

    if let Some(value) = &record.value {
        let literal = Individual::literal(&first_type.type_uri, value, first_type.evidence, doc_id)?;
        return Ok((id, literal));
    }

    let name_span = paired_span(&label, record.name_start, record.name_end, "name_start", "name_end")?;
    let name = match (&record.name, &record.desc) {
        (Some(name), _) => NameOrDesc::name(TextSpan {
            text: name.clone(),
            span: name_span,
        }),
        (None, Some(desc)) => NameOrDesc::desc(TextSpan {
            text: desc.clone(),
            span: name_span,
        }),
        (None, None) => {
            return Err(RecordError::MissingField {
                record: label,
                field: "name",
            });
        }
    };

    let mut individual = Individual::new().with_name(name);
    for ty in types {
        individual = individual.with_type(ty);
    }
    if record.identifiers.is_empty() {
        individual = individual.with_identifier(Identifier::PartnerUri(id.clone()))?;
    } else {
        for identifier in &record.identifiers {
            individual = individual.with_identifier(identifier.clone())?;
        }
    }
    Ok((id, individual))
}

fn relation_from_record(
    record: &RelationRecord,
    doc_id: &str,
    index: usize,
    by_id: &HashMap<String, Arc<Individual>>,
) -> RecordResult<Relation> {
    let label = record_label(doc_id, "relation", index, record.name.as_deref());
    let name = record.name.clone().ok_or_else(|| RecordError::MissingField {
        record: label.clone(),
        field: "name",
    })?;
    if record.args.is_empty() {
        return Err(RecordError::MissingField {
            record: label,
            field: "args",
        });
    }

    let mut args = Vec::with_capacity(record.args.len());
    for arg in &record.args {
        let role = arg.role.clone().ok_or_else(|| RecordError::MissingField {
            record: label.clone(),
            field: "role",
        })?;
        let span = paired_span(&label, arg.start, arg.end, "start", "end")?;
        let evidence = TextSpan {
            text: arg.text.clone().unwrap_or_default(),
            span,
        };
        let filler = match (&arg.individual, &arg.value) {
            (Some(reference), _) => by_id.get(reference).cloned().ok_or_else(|| {
                RecordError::from(DocumentError::UnresolvedReference {
                    relation: name.clone(),
                    individual: reference.clone(),
                })
            })?,
            (None, Some(value)) => {
                let type_uri = arg.type_uri.as_deref().ok_or_else(|| RecordError::MissingField {
                    record: label.clone(),
                    field: "type",
                })?;
                Arc::new(Individual::literal(type_uri, value, evidence.clone(), doc_id)?)
            }
            (None, None) => {
                return Err(RecordError::MissingField {
                    record: label,
                    field: "individual",
                });
            }
        };
        args.push(RelationArg::new(role, filler, evidence));
    }

    let evidence = match paired_span(&label, record.start, record.end, "start", "end")? {
        Some(span) => Some(TextSpan {
            text: record.text.clone().unwrap_or_default(),
            span: Some(span),
        }),
        None => record.text.clone().map(TextSpan::new),
    };

    Ok(Relation::new(name, args)?
        .with_confidence(record.confidence.unwrap_or(DEFAULT_CONFIDENCE))
        .with_score_group(record.score_group)
        .with_source(record.source.clone().unwrap_or_default())
        .with_evidence(evidence))
}

fn individual_to_record(uri: String, individual: &Individual) -> IndividualRecord {
    let (name, desc, span) = match individual.name() {
        Some(n) if n.kind == NameKind::Name => (Some(n.text().to_string()), None, n.evidence.span),
        Some(n) => (None, Some(n.text().to_string()), n.evidence.span),
        None => (None, None, None),
    };
    IndividualRecord {
        id: Some(uri),
        name,
        desc,
        name_start: span.map(|s| s.start),
        name_end: span.map(|s| s.end),
        types: individual
            .types()
            .iter()
            .map(|t| TypeRecord {
                type_uri: Some(t.type_uri.clone()),
                text: Some(t.evidence.text.clone()).filter(|s| !s.is_empty()),
                start: t.evidence.span.map(|s| s.start),
                end: t.evidence.span.map(|s| s.end),
            })
            .collect(),
        value: None,
        identifiers: individual.ids().iter().cloned().collect(),
    }
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<DocumentRecord>),
    One(DocumentRecord),
}

/// Read a JSON file holding one document record or an array of them.
pub fn read_documents(path: &Path) -> RecordResult<Vec<DocumentRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| RecordError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let parsed: OneOrMany = serde_json::from_str(&content).map_err(|e| RecordError::Json {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(match parsed {
        OneOrMany::Many(records) => records,
        OneOrMany::One(record) => vec![record],
    })
}

/// Write one document record as pretty-printed JSON.
pub fn write_document(path: &Path, record: &DocumentRecord) -> RecordResult<()> {
    let json = serde_json::to_string_pretty(record).map_err(|e| RecordError::Json {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(path, json).map_err(|e| RecordError::Io {
        path: path.display().to_string(),
        source: e,
    })
}
