//! Identifier and type model.
//!
//! An [`Individual`](crate::individual::Individual) is identified by at most one
//! [`Identifier`] of each [`IdentifierKind`], kept in an [`IdentifierSet`]. Kinds are
//! ordered by their precedence in the best-URI cascade, so iterating a set visits
//! the weakest identifier first.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{IdentityError, IdentityResult};

/// Corpus-level cross-document cluster identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ClusterId(pub u64);

impl ClusterId {
    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of an [`Identifier`], ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    PartnerUri,
    GeneratedUri,
    MentionRef,
    ValueMentionRef,
    EventRef,
    EntityRef,
    XDocClusterId,
    CorefUri,
    BoundUri,
}

impl IdentifierKind {
    /// All kinds in cascade order.
    pub const ALL: [IdentifierKind; 9] = [
        Self::PartnerUri,
        Self::GeneratedUri,
        Self::MentionRef,
        Self::ValueMentionRef,
        Self::EventRef,
        Self::EntityRef,
        Self::XDocClusterId,
        Self::CorefUri,
        Self::BoundUri,
    ];

    /// Kinds whose values denote a distinct extraction scope. Two individuals
    /// carrying different values for any of these are never coreferent.
    pub const SCOPED: [IdentifierKind; 4] = [
        Self::MentionRef,
        Self::EntityRef,
        Self::XDocClusterId,
        Self::EventRef,
    ];
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartnerUri => write!(f, "partner-uri"),
            Self::GeneratedUri => write!(f, "generated-uri"),
            Self::MentionRef => write!(f, "mention"),
            Self::ValueMentionRef => write!(f, "value-mention"),
            Self::EventRef => write!(f, "event"),
            Self::EntityRef => write!(f, "entity"),
            Self::XDocClusterId => write!(f, "xdoc"),
            Self::CorefUri => write!(f, "coref-uri"),
            Self::BoundUri => write!(f, "bound-uri"),
        }
    }
}

/// One piece of identity evidence attached to an individual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    /// URI supplied by a partner system.
    PartnerUri(String),
    /// Hash- or offset-derived URI.
    GeneratedUri(String),
    /// Sentence-local mention.
    MentionRef(u64),
    ValueMentionRef(u64),
    EventRef(u64),
    /// Document-level cluster of mentions.
    EntityRef(u64),
    /// Corpus-level name cluster.
    XDocClusterId(ClusterId),
    /// Assigned by the coreference engine.
    CorefUri(String),
    /// Fixed ontology individual.
    BoundUri(String),
}

impl Identifier {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            Self::PartnerUri(_) => IdentifierKind::PartnerUri,
            Self::GeneratedUri(_) => IdentifierKind::GeneratedUri,
            Self::MentionRef(_) => IdentifierKind::MentionRef,
            Self::ValueMentionRef(_) => IdentifierKind::ValueMentionRef,
            Self::EventRef(_) => IdentifierKind::EventRef,
            Self::EntityRef(_) => IdentifierKind::EntityRef,
            Self::XDocClusterId(_) => IdentifierKind::XDocClusterId,
            Self::CorefUri(_) => IdentifierKind::CorefUri,
            Self::BoundUri(_) => IdentifierKind::BoundUri,
        }
    }

    /// Render the carried value, used in diagnostics and records.
    pub fn value_string(&self) -> String {
        match self {
            Self::PartnerUri(s) | Self::GeneratedUri(s) | Self::CorefUri(s) | Self::BoundUri(s) => {
                s.clone()
            }
            Self::MentionRef(n) | Self::ValueMentionRef(n) | Self::EventRef(n) | Self::EntityRef(n) => {
                n.to_string()
            }
            Self::XDocClusterId(c) => c.to_string(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value_string())
    }
}

/// At most one identifier per kind, iterated in cascade order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierSet {
    slots: BTreeMap<IdentifierKind, Identifier>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an identifier.
    ///
    /// Attaching an identical value again is a no-op; attaching a different value
    /// of a kind that is already present fails with `ConflictingIdentifier`.
    pub fn attach(&mut self, id: Identifier) -> IdentityResult<()> {
        let kind = id.kind();
        match self.slots.get(&kind) {
            Some(existing) if *existing == id => Ok(()),
            Some(existing) => Err(IdentityError::ConflictingIdentifier {
                kind,
                existing: existing.value_string(),
                incoming: id.value_string(),
            }),
            None => {
                self.slots.insert(kind, id);
                Ok(())
            }
        }
    }

    /// Overwrite the slot for this identifier's kind, returning the old value.
    pub fn replace(&mut self, id: Identifier) -> Option<Identifier> {
        self.slots.insert(id.kind(), id)
    }

    pub fn remove(&mut self, kind: IdentifierKind) -> Option<Identifier> {
        self.slots.remove(&kind)
    }

    pub fn get(&self, kind: IdentifierKind) -> Option<&Identifier> {
        self.slots.get(&kind)
    }

    pub fn contains(&self, kind: IdentifierKind) -> bool {
        self.slots.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.slots.values()
    }

    pub fn kinds(&self) -> impl Iterator<Item = IdentifierKind> + '_ {
        self.slots.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// URI-valued slot, if present.
    pub fn uri(&self, kind: IdentifierKind) -> Option<&str> {
        match self.slots.get(&kind)? {
            Identifier::PartnerUri(s)
            | Identifier::GeneratedUri(s)
            | Identifier::CorefUri(s)
            | Identifier::BoundUri(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric slot (mention, value mention, event, entity, xdoc), if present.
    pub fn number(&self, kind: IdentifierKind) -> Option<u64> {
        match self.slots.get(&kind)? {
            Identifier::MentionRef(n)
            | Identifier::ValueMentionRef(n)
            | Identifier::EventRef(n)
            | Identifier::EntityRef(n) => Some(*n),
            Identifier::XDocClusterId(c) => Some(c.get()),
            _ => None,
        }
    }
}

impl FromIterator<Identifier> for IdentifierSet {
    /// Later identifiers of the same kind replace earlier ones.
    fn from_iter<I: IntoIterator<Item = Identifier>>(iter: I) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.replace(id);
        }
        set
    }
}

/// Half-open character offsets into a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// True if `other` lies entirely inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest span covering both.
    pub fn union(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A piece of document text with optional offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub span: Option<Span>,
}

impl TextSpan {
    /// Text without offsets.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            span: None,
        }
    }

    /// Text anchored at `start..end`.
    pub fn at(text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            span: Some(Span::new(start, end)),
        }
    }
}

/// An ontology type plus the evidence that asserted it.
///
/// Equality and ordering consider only the type and the evidence offsets, so
/// identical type+span pairs collapse in a set while differing provenance is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeAssertion {
    pub type_uri: String,
    pub evidence: TextSpan,
}

impl TypeAssertion {
    pub fn new(type_uri: impl Into<String>, evidence: TextSpan) -> Self {
        Self {
            type_uri: type_uri.into(),
            evidence,
        }
    }

    /// The type without its namespace prefix (`ic:Person` -> `Person`).
    pub fn local_name(&self) -> &str {
        local_name(&self.type_uri)
    }
}

impl PartialEq for TypeAssertion {
    fn eq(&self, other: &Self) -> bool {
        self.type_uri == other.type_uri && self.evidence.span == other.evidence.span
    }
}

impl Eq for TypeAssertion {}

impl PartialOrd for TypeAssertion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeAssertion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.type_uri
            .cmp(&other.type_uri)
            .then_with(|| self.evidence.span.cmp(&other.evidence.span))
    }
}

impl std::hash::Hash for TypeAssertion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_uri.hash(state);
        self.evidence.span.hash(state);
    }
}

/// Strip a `prefix:` or `...#` namespace from a type or URI.
pub fn local_name(uri: &str) -> &str {
    let after_hash = uri.rsplit('#').next().unwrap_or(uri);
    after_hash.rsplit(':').next().unwrap_or(after_hash)
}

/// Whether a name string is a proper name or a description.
///
/// `Name` sorts after `Desc` so that a maximum picks names first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Desc,
    Name,
}

/// A name or description string with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameOrDesc {
    pub kind: NameKind,
    pub evidence: TextSpan,
}

impl NameOrDesc {
    pub fn name(evidence: TextSpan) -> Self {
        Self {
            kind: NameKind::Name,
            evidence,
        }
    }

    pub fn desc(evidence: TextSpan) -> Self {
        Self {
            kind: NameKind::Desc,
            evidence,
        }
    }

    pub fn text(&self) -> &str {
        &self.evidence.text
    }
}
