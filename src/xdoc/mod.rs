//! Cross-document identity.
//!
//! This module keeps entity identity stable across a corpus:
//!
//! - [`CrossDocIndex`]: name -> cluster table, bound URIs, string replacements
//! - [`DocumentScratchState`]: per-document caches and entity maps
//! - [`EntityClass`]: the coarse class that keeps same-named entities apart
//! - [`possible_acronyms`]: acronym expansion used during name lookup

pub mod acronym;
pub mod class;
pub mod error;
pub mod index;
pub mod scratch;
pub mod tables;

pub use acronym::possible_acronyms;
pub use class::EntityClass;
pub use error::{IndexError, IndexResult};
pub use index::{
    BoundEntry, ClusterEntry, CrossDocIndex, FIRST_SPECIAL_ID, IndexStats, MappedArg,
    MappingSource, Resolution,
};
pub use scratch::DocumentScratchState;
