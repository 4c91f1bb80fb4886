//! Rich diagnostic error types for the elf-resolve engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Errors caused by a single
//! malformed input record are recoverable at the document boundary; errors caused
//! by violated internal invariants always propagate.

use miette::Diagnostic;
use thiserror::Error;

use crate::identifier::IdentifierKind;
pub use crate::xdoc::error::{IndexError, IndexResult};

/// Top-level error type for the elf-resolve engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Identity errors (identifiers, literals, individuals)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IdentityError {
    #[error("malformed literal for type \"{type_uri}\": \"{text}\"")]
    #[diagnostic(
        code(elf::identity::malformed_literal),
        help(
            "The literal text does not satisfy the format its type implies. \
             Integers must be digits (thousands separators allowed) or number words; \
             dates must start with YYYY-MM-DD."
        )
    )]
    MalformedLiteral { type_uri: String, text: String },

    #[error("individual has no identifier that resolves to a URI")]
    #[diagnostic(
        code(elf::identity::unresolved),
        help(
            "Attach at least one identifier (partner URI, generated URI, mention, \
             entity, event, xdoc cluster, coref URI or bound URI) before asking \
             for the best URI."
        )
    )]
    UnresolvedIdentity,

    #[error("conflicting {kind} identifiers: \"{existing}\" vs \"{incoming}\"")]
    #[diagnostic(
        code(elf::identity::conflicting_identifier),
        help(
            "Two different values of the same identifier kind met on one individual. \
             Merge inputs must be grouped by identical best URI first; this points to \
             a grouping bug upstream."
        )
    )]
    ConflictingIdentifier {
        kind: IdentifierKind,
        existing: String,
        incoming: String,
    },

    #[error("cannot merge literal value individual \"{value}\"")]
    #[diagnostic(
        code(elf::identity::merge_of_value),
        help("Literal values are never merge targets. Filter value individuals out before merging.")
    )]
    MergeOfValueIndividual { value: String },

    #[error("cannot attach {kind} identifier to literal value individual")]
    #[diagnostic(
        code(elf::identity::identifier_on_value),
        help("Literal value individuals carry only their synthetic generated URI.")
    )]
    IdentifierOnValue { kind: IdentifierKind },
}

/// Convenience alias for identity operations.
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

// ---------------------------------------------------------------------------
// Relation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RelationError {
    #[error("relation \"{name}\" has {roles} distinct role(s), at least 2 are required")]
    #[diagnostic(
        code(elf::relation::ambiguous),
        help(
            "A relation with fewer than two distinct roles should be emitted as a \
             type assertion on a single individual instead."
        )
    )]
    AmbiguousRelation { name: String, roles: usize },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),
}

/// Convenience alias for relation operations.
pub type RelationResult<T> = std::result::Result<T, RelationError>;

// ---------------------------------------------------------------------------
// Document errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("cannot merge document stages {expected} and {found}")]
    #[diagnostic(
        code(elf::document::incompatible_merge_kind),
        help("Only documents at the same content stage can be merged.")
    )]
    IncompatibleMergeKind { expected: String, found: String },

    #[error("cannot merge document \"{found}\" into \"{expected}\"")]
    #[diagnostic(
        code(elf::document::id_mismatch),
        help("Partner documents are merged per document id; group them by id first.")
    )]
    DocumentIdMismatch { expected: String, found: String },

    #[error("relation \"{relation}\" references unknown individual \"{individual}\"")]
    #[diagnostic(
        code(elf::document::unresolved_reference),
        help("Every relation argument must point to an individual defined in the same document.")
    )]
    UnresolvedReference { relation: String, individual: String },

    #[error("cannot merge an empty set of documents")]
    #[diagnostic(code(elf::document::empty_merge), help("Pass at least one document."))]
    EmptyMerge,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Index(#[from] IndexError),
}

/// Convenience alias for document operations.
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;

// ---------------------------------------------------------------------------
// Record (serialization boundary) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum RecordError {
    #[error("record \"{record}\" is missing required field `{field}`")]
    #[diagnostic(
        code(elf::record::missing_field),
        help("Individuals need `id`, `name` or `desc`, and at least one type; relations need `name` and `args`.")
    )]
    MissingField { record: String, field: &'static str },

    #[error("record \"{record}\" has `{present}` without `{missing}`")]
    #[diagnostic(
        code(elf::record::unpaired_offsets),
        help("Offsets come in pairs: give both start and end, or neither.")
    )]
    UnpairedOffsets {
        record: String,
        present: &'static str,
        missing: &'static str,
    },

    #[error("failed to read or write {path}: {source}")]
    #[diagnostic(code(elf::record::io), help("Check that the path exists and is readable/writable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {message}")]
    #[diagnostic(
        code(elf::record::json),
        help("The file must contain a single document record (or an array of them).")
    )]
    Json { path: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Document(#[from] DocumentError),
}

/// Convenience alias for record conversion.
pub type RecordResult<T> = std::result::Result<T, RecordError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    #[diagnostic(code(elf::config::read), help("Check that the config file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(elf::config::parse),
        help("The config file must be valid TOML matching the [index] and [coref] sections.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config {path}: {source}")]
    #[diagnostic(code(elf::config::write), help("Check directory permissions."))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Crate-wide result alias.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_error_converts_to_resolve_error() {
        let err = IdentityError::UnresolvedIdentity;
        let top: ResolveError = err.into();
        assert!(matches!(
            top,
            ResolveError::Identity(IdentityError::UnresolvedIdentity)
        ));
    }

    #[test]
    fn relation_error_wraps_identity_error() {
        let err: RelationError = IdentityError::UnresolvedIdentity.into();
        assert!(matches!(
            err,
            RelationError::Identity(IdentityError::UnresolvedIdentity)
        ));
    }

    #[test]
    fn conflicting_identifier_message_names_kind_and_values() {
        let err = IdentityError::ConflictingIdentifier {
            kind: IdentifierKind::EntityRef,
            existing: "7".into(),
            incoming: "8".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("entity"));
        assert!(msg.contains('7'));
        assert!(msg.contains('8'));
    }

    #[test]
    fn ambiguous_relation_message_reports_role_count() {
        let err = RelationError::AmbiguousRelation {
            name: "eru:employs".into(),
            roles: 1,
        };
        assert!(format!("{err}").contains("1 distinct role"));
    }
}
