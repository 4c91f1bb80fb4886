//! Rich diagnostic error types for the cross-document index.
//!
//! Table files are read-only inputs loaded once per run, so most of these fire
//! at startup. `ClusterIdsExhausted` and `LockPoisoned` can fire mid-run and
//! mean corpus identity can no longer be kept unique.

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced by the cross-document index.
#[derive(Debug, Error, Diagnostic)]
pub enum IndexError {
    #[error("failed to read or write index table {path}: {source}")]
    #[diagnostic(
        code(elf::index::io),
        help("Check that the table path in the [index] config section exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("index table {path} contains no valid lines")]
    #[diagnostic(
        code(elf::index::no_valid_lines),
        help(
            "Seed files need tab-separated `id<TAB>TYPE<TAB>name1, name2` lines; \
             string replacement files need `[docid<TAB>]type<TAB>name<TAB>uri` lines. \
             Lines starting with # are comments."
        )
    )]
    NoValidLines { path: String },

    #[error("cluster ids exhausted: regular counter at {regular}, special counter at {special}")]
    #[diagnostic(
        code(elf::index::ids_exhausted),
        help(
            "New clusters count up from the largest seed id and special ids count down \
             from i32::MAX - 1; they have met. Renumber the seed file."
        )
    )]
    ClusterIdsExhausted { regular: u64, special: u64 },

    #[error("cannot resolve an empty name")]
    #[diagnostic(
        code(elf::index::empty_name),
        help("The name normalized to nothing (only punctuation or whitespace).")
    )]
    EmptyName,

    #[error("index lock poisoned")]
    #[diagnostic(
        code(elf::index::poisoned),
        help("A worker panicked while registering a cluster. Restart the run.")
    )]
    LockPoisoned,

    #[error("index snapshot {path} could not be encoded or decoded: {message}")]
    #[diagnostic(
        code(elf::index::snapshot),
        help("Snapshots are tied to the crate version that wrote them; rebuild from the table files.")
    )]
    Snapshot { path: String, message: String },
}

/// Convenience alias for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
