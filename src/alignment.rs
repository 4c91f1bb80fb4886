//! External collaborator seams.
//!
//! The linguistic alignment service answers whether two pieces of document text
//! denote the same thing, and maps token offsets back to mentions. The domain
//! lookup service maps a name to a fixed ontology individual (rosters,
//! gazetteers). Both are pluggable; this module provides text-only defaults.

use crate::identifier::{Span, TextSpan};
use crate::literal::normalize_name;

/// A mention or value mention located from token offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOrValue {
    Mention(u64),
    ValueMention(u64),
}

/// Linguistic alignment over a parsed document.
pub trait AlignmentService: Send + Sync {
    /// Whether the two text spans are textually or positionally coreferent.
    fn are_strings_coreferent(&self, doc_id: &str, a: &TextSpan, b: &TextSpan) -> bool;

    /// Locate the mention or value mention covering `span`, if any.
    fn token_offsets_to_mention_or_value(&self, doc_id: &str, span: Span) -> Option<MentionOrValue>;
}

/// Alignment using only the strings and offsets carried by the evidence.
///
/// Two spans are coreferent when they have identical offsets, identical
/// normalized text, or when the shorter text's tokens are a trailing run of the
/// longer one's (`"Smith"` and `"John Smith"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextualAlignment;

impl AlignmentService for TextualAlignment {
    fn are_strings_coreferent(&self, _doc_id: &str, a: &TextSpan, b: &TextSpan) -> bool {
        if let (Some(sa), Some(sb)) = (a.span, b.span) {
            if sa == sb {
                return true;
            }
        }

        let na = normalize_name(&a.text);
        let nb = normalize_name(&b.text);
        if na.is_empty() || nb.is_empty() {
            return false;
        }
        if na == nb {
            return true;
        }

        let ta: Vec<&str> = na.split(' ').collect();
        let tb: Vec<&str> = nb.split(' ').collect();
        let (short, long) = if ta.len() <= tb.len() { (ta, tb) } else { (tb, ta) };
        long.ends_with(&short)
    }

    fn token_offsets_to_mention_or_value(&self, _doc_id: &str, _span: Span) -> Option<MentionOrValue> {
        None
    }
}

/// Domain-specific bound-entity lookup.
pub trait DomainLookup: Send + Sync {
    /// Map `name` of `type_uri` to a fixed ontology URI. `context` is the
    /// document id the name was seen in.
    fn lookup_bound_entity(&self, name: &str, type_uri: &str, context: &str) -> Option<String>;
}

/// A lookup that never binds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDomainLookup;

impl DomainLookup for NoDomainLookup {
    fn lookup_bound_entity(&self, _name: &str, _type_uri: &str, _context: &str) -> Option<String> {
        None
    }
}
