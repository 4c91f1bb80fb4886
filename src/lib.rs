// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # elf-resolve
//!
//! Identity resolution and coreference merging for entities and relations
//! extracted from text by several partner systems.
//!
//! ## Architecture
//!
//! - **Identifiers** (`identifier`, `literal`): typed identifiers ranked into a
//!   best-URI cascade, literal value normalization
//! - **Individuals and relations** (`individual`, `relation`): immutable values
//!   with strict and coreferent merge, offsetless equality, role splitting
//! - **Cross-document index** (`xdoc`): shared name/type clusters, bound URIs,
//!   string replacement tables, TSV tables and bincode snapshots
//! - **Coreference** (`coref`): union-find clustering with deterministic cluster URIs
//! - **Documents** (`document`, `record`): partner merge, URI rewrites, JSON boundary
//! - **Pipeline** (`pipeline`, `config`): TOML-configured, rayon-parallel batches
//!
//! ## Library usage
//!
//! ```no_run
//! use elf_resolve::alignment::{NoDomainLookup, TextualAlignment};
//! use elf_resolve::config::CorefConfig;
//! use elf_resolve::document::Document;
//! use elf_resolve::pipeline::Pipeline;
//! use elf_resolve::xdoc::CrossDocIndex;
//!
//! let index = CrossDocIndex::new();
//! let pipeline = Pipeline::new(&index, &TextualAlignment, &NoDomainLookup, CorefConfig::default());
//! let (doc, report) = pipeline.run_document(vec![Document::new("D1")]).unwrap();
//! println!("{} resolved, {} clusters", doc.id(), report.clusters);
//! ```

pub mod alignment;
pub mod config;
pub mod coref;
pub mod document;
pub mod error;
pub mod identifier;
pub mod individual;
pub mod literal;
pub mod pipeline;
pub mod record;
pub mod relation;
pub mod xdoc;
