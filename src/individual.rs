//! Candidate entities, events, and literal values.
//!
//! An [`Individual`] is built once by extraction and then shared immutably
//! (`Arc<Individual>`). Updates such as a URI rewrite or a merge produce a new
//! value that the owner swaps in.
//!
//! The effective identity of an individual is its *best URI*, chosen by a
//! priority cascade over its identifiers:
//!
//! 1. partner URI, overridden by generated URI
//! 2. mention, then value mention, then event (each overriding the previous)
//! 3. for mention-scoped types (titles, positions, GPE specifications) the
//!    cascade stops here, overridden only by a coref URI and then a bound URI
//! 4. entity, then xdoc cluster, then coref URI
//! 5. bound URI always wins

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};

use crate::alignment::AlignmentService;
use crate::error::{IdentityError, IdentityResult};
use crate::identifier::{
    Identifier, IdentifierKind, IdentifierSet, NameOrDesc, Span, TextSpan, TypeAssertion,
    local_name,
};
use crate::literal;

/// Types whose individuals are never promoted past mention scope.
pub const MENTION_SCOPED_TYPES: &[&str] = &[
    "kbp:GPE-spec",
    "ic:Position",
    "kbp:Title",
    "kbp:HeadOfCompanyTitle",
    "kbp:HeadOfNationStateTitle",
    "kbp:HeadOfCityTownOrVillageTitle",
    "kbp:MinisterTitle",
];

/// A candidate representation of one real-world entity, event, or literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Individual {
    ids: IdentifierSet,
    name: Option<NameOrDesc>,
    names: BTreeSet<NameOrDesc>,
    types: BTreeSet<TypeAssertion>,
    value: Option<String>,
}

impl Individual {
    /// Create an empty individual; attach identity with the `with_*` builders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a literal value individual.
    ///
    /// The raw text is normalized for `type_uri`. The only identifier is a
    /// synthetic generated URI, derived from the evidence offsets when present
    /// and from a hash of the value otherwise.
    pub fn literal(
        type_uri: &str,
        raw: &str,
        evidence: TextSpan,
        doc_id: &str,
    ) -> IdentityResult<Self> {
        let value = literal::normalize(type_uri, raw)?;
        let generated = match evidence.span {
            Some(span) => generate_uri_from_offsets(doc_id, span),
            None => generate_hash_uri(type_uri, doc_id, &value),
        };
        let mut ids = IdentifierSet::new();
        ids.replace(Identifier::GeneratedUri(generated));
        let mut types = BTreeSet::new();
        types.insert(TypeAssertion::new(type_uri, evidence));
        Ok(Self {
            ids,
            name: None,
            names: BTreeSet::new(),
            types,
            value: Some(value),
        })
    }

    /// Attach an identifier, failing on a conflicting value of the same kind.
    pub fn with_identifier(mut self, id: Identifier) -> IdentityResult<Self> {
        if self.value.is_some() && id.kind() != IdentifierKind::GeneratedUri {
            return Err(IdentityError::IdentifierOnValue { kind: id.kind() });
        }
        self.ids.attach(id)?;
        Ok(self)
    }

    /// Set the best name; it is also recorded among all known names.
    pub fn with_name(mut self, name: NameOrDesc) -> Self {
        self.names.insert(name.clone());
        self.name = Some(name);
        self
    }

    pub fn with_type(mut self, assertion: TypeAssertion) -> Self {
        self.types.insert(assertion);
        self
    }

    /// Copy of this individual with one identifier slot overwritten.
    pub fn with_replaced(&self, id: Identifier) -> Self {
        let mut next = self.clone();
        next.ids.replace(id);
        next
    }

    /// Copy of this individual carrying `uri` as its coref URI.
    pub fn with_coref_uri(&self, uri: impl Into<String>) -> Self {
        self.with_replaced(Identifier::CorefUri(uri.into()))
    }

    pub fn ids(&self) -> &IdentifierSet {
        &self.ids
    }

    pub fn identifier(&self, kind: IdentifierKind) -> Option<&Identifier> {
        self.ids.get(kind)
    }

    /// The best name or description, if any.
    pub fn name(&self) -> Option<&NameOrDesc> {
        self.name.as_ref()
    }

    /// Every name or description merged into this individual.
    pub fn names(&self) -> &BTreeSet<NameOrDesc> {
        &self.names
    }

    pub fn types(&self) -> &BTreeSet<TypeAssertion> {
        &self.types
    }

    pub fn type_uris(&self) -> BTreeSet<&str> {
        self.types.iter().map(|t| t.type_uri.as_str()).collect()
    }

    pub fn has_type(&self, type_uri: &str) -> bool {
        self.types.iter().any(|t| t.type_uri == type_uri)
    }

    /// Normalized literal value, present only for value individuals.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_value(&self) -> bool {
        self.value.is_some()
    }

    /// Whether a type forbids promotion past mention scope.
    pub fn is_mention_scoped(&self) -> bool {
        self.types
            .iter()
            .any(|t| MENTION_SCOPED_TYPES.contains(&t.type_uri.as_str()))
    }

    /// Resolve the canonical URI via the priority cascade.
    pub fn best_uri(&self, doc_id: Option<&str>) -> IdentityResult<String> {
        self.resolve_uri(doc_id, true)
    }

    /// The cascade as if no coref URI had been assigned. This is the key used
    /// by coreference URI maps, which makes re-applying a map a no-op.
    pub fn best_uri_without_coref(&self, doc_id: Option<&str>) -> IdentityResult<String> {
        self.resolve_uri(doc_id, false)
    }

    fn resolve_uri(&self, doc_id: Option<&str>, use_coref: bool) -> IdentityResult<String> {
        let ids = &self.ids;
        let mut uri: Option<String> = None;

        if let Some(partner) = ids.uri(IdentifierKind::PartnerUri) {
            uri = Some(partner.to_string());
        }
        if let Some(generated) = ids.uri(IdentifierKind::GeneratedUri) {
            uri = Some(generated.to_string());
        }
        if let Some(n) = ids.number(IdentifierKind::MentionRef) {
            uri = Some(scoped_uri("mention", doc_id, n));
        }
        if let Some(n) = ids.number(IdentifierKind::ValueMentionRef) {
            uri = Some(scoped_uri("value-mention", doc_id, n));
        }
        if let Some(n) = ids.number(IdentifierKind::EventRef) {
            uri = Some(scoped_uri("event", doc_id, n));
        }

        if !self.is_mention_scoped() {
            if let Some(n) = ids.number(IdentifierKind::EntityRef) {
                uri = Some(scoped_uri("entity", doc_id, n));
            }
            if let Some(n) = ids.number(IdentifierKind::XDocClusterId) {
                uri = Some(format!("xdoc-{n}"));
            }
        }

        if use_coref {
            if let Some(coref) = ids.uri(IdentifierKind::CorefUri) {
                uri = Some(coref.to_string());
            }
        }
        // Bound URIs win even for mention-scoped types.
        if let Some(bound) = ids.uri(IdentifierKind::BoundUri) {
            uri = Some(bound.to_string());
        }

        uri.filter(|u| !u.is_empty())
            .ok_or(IdentityError::UnresolvedIdentity)
    }

    /// True if both individuals carry exactly the same identifiers.
    pub fn has_equal_ids(&self, other: &Individual) -> bool {
        self.ids == other.ids
    }

    /// Order by best name, then by type set, then by value.
    pub fn identity_cmp(&self, other: &Individual) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.types.iter().cmp(other.types.iter()))
            .then_with(|| self.value.cmp(&other.value))
    }

    /// Smallest span covering the name and all type evidence.
    pub fn evidence_span(&self) -> Option<Span> {
        self.name
            .iter()
            .filter_map(|n| n.evidence.span)
            .chain(self.types.iter().filter_map(|t| t.evidence.span))
            .reduce(|a, b| a.union(&b))
    }

    /// Most frequent type local name; ties break alphabetically.
    pub fn dominant_type(&self) -> Option<String> {
        dominant_type([self])
    }

    /// Decide whether two individuals denote the same entity.
    ///
    /// Distinct values for any scope-bearing identifier (mention, entity, xdoc,
    /// event) rule coreference out. Otherwise the names, when both present,
    /// must align, and at least one exactly equal type must have aligned
    /// evidence.
    pub fn are_coreferent(
        &self,
        other: &Individual,
        alignment: &dyn AlignmentService,
        doc_id: &str,
    ) -> bool {
        if self.is_value() || other.is_value() {
            return false;
        }
        for kind in IdentifierKind::SCOPED {
            if let (Some(a), Some(b)) = (self.ids.get(kind), other.ids.get(kind)) {
                if a != b {
                    return false;
                }
            }
        }
        if let (Some(a), Some(b)) = (&self.name, &other.name) {
            if !alignment.are_strings_coreferent(doc_id, &a.evidence, &b.evidence) {
                return false;
            }
        }
        self.types.iter().any(|ta| {
            other.types.iter().any(|tb| {
                ta.type_uri == tb.type_uri
                    && alignment.are_strings_coreferent(doc_id, &ta.evidence, &tb.evidence)
            })
        })
    }

    /// Merge individuals already grouped by identical best URI.
    ///
    /// Fails on literal inputs and on identifier conflicts. A conflict on a kind
    /// is tolerated only when every input shares one value of a stronger kind;
    /// the weaker kind then keeps its least value so that merging is
    /// associative.
    pub fn merge<'a>(inputs: impl IntoIterator<Item = &'a Individual>) -> IdentityResult<Self> {
        let inputs: Vec<&Individual> = inputs.into_iter().collect();
        check_mergeable(&inputs)?;

        let mut ids = IdentifierSet::new();
        for kind in IdentifierKind::ALL {
            let values: BTreeSet<&Identifier> =
                inputs.iter().filter_map(|i| i.ids.get(kind)).collect();
            let mut iter = values.iter();
            let Some(first) = iter.next() else { continue };
            if let Some(second) = iter.next() {
                if !subsumed_by_stronger_kind(kind, &inputs) {
                    return Err(IdentityError::ConflictingIdentifier {
                        kind,
                        existing: first.value_string(),
                        incoming: second.value_string(),
                    });
                }
                tracing::debug!(%kind, kept = %first, "subsumed identifier conflict during merge");
            }
            ids.replace((*first).clone());
        }

        Ok(combine(&inputs, ids))
    }

    /// Build the representative of a coreference cluster.
    ///
    /// Identifier kinds on which the members disagree are dropped and
    /// `coref_uri` is attached.
    pub fn merge_coreferent<'a>(
        members: impl IntoIterator<Item = &'a Individual>,
        coref_uri: &str,
    ) -> IdentityResult<Self> {
        let inputs: Vec<&Individual> = members.into_iter().collect();
        check_mergeable(&inputs)?;

        let mut ids = IdentifierSet::new();
        for kind in IdentifierKind::ALL {
            let values: BTreeSet<&Identifier> =
                inputs.iter().filter_map(|i| i.ids.get(kind)).collect();
            if values.len() == 1 {
                if let Some(only) = values.into_iter().next() {
                    ids.replace(only.clone());
                }
            }
        }
        ids.replace(Identifier::CorefUri(coref_uri.to_string()));

        Ok(combine(&inputs, ids))
    }
}

fn check_mergeable(inputs: &[&Individual]) -> IdentityResult<()> {
    if inputs.is_empty() {
        return Err(IdentityError::UnresolvedIdentity);
    }
    if let Some(value) = inputs.iter().find_map(|i| i.value.as_deref()) {
        return Err(IdentityError::MergeOfValueIndividual {
            value: value.to_string(),
        });
    }
    Ok(())
}

/// True if every input carries one common value of a kind stronger than `kind`.
fn subsumed_by_stronger_kind(kind: IdentifierKind, inputs: &[&Individual]) -> bool {
    IdentifierKind::ALL
        .into_iter()
        .filter(|stronger| *stronger > kind)
        .any(|stronger| {
            let mut values = inputs.iter().map(|i| i.ids.get(stronger));
            match values.next() {
                Some(Some(first)) => values.all(|v| v == Some(first)),
                _ => false,
            }
        })
}

/// Union names and types and pick the best name.
fn combine(inputs: &[&Individual], ids: IdentifierSet) -> Individual {
    let mut names = BTreeSet::new();
    let mut types = BTreeSet::new();
    let mut best: Option<(NameRank<'_>, &NameOrDesc)> = None;

    for input in inputs {
        let dominance = name_dominance(&input.ids);
        for name in input.names.iter().chain(input.name.iter()) {
            names.insert(name.clone());
            let rank = NameRank::new(dominance, name);
            if best.as_ref().is_none_or(|(r, _)| rank > *r) {
                best = Some((rank, name));
            }
        }
        types.extend(input.types.iter().cloned());
    }

    Individual {
        ids,
        name: best.map(|(_, n)| n.clone()),
        names,
        types,
        value: None,
    }
}

/// Names attached to an entity beat names attached to a mention.
fn name_dominance(ids: &IdentifierSet) -> u8 {
    if ids.contains(IdentifierKind::EntityRef) {
        2
    } else if ids.contains(IdentifierKind::MentionRef) {
        1
    } else {
        0
    }
}

/// Total order used to choose the best name: dominance, then names over
/// descriptions, then longer text, then lexicographically smaller text.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct NameRank<'a> {
    dominance: u8,
    kind: crate::identifier::NameKind,
    length: usize,
    text: Reverse<&'a str>,
    span: Reverse<Option<Span>>,
}

impl<'a> NameRank<'a> {
    fn new(dominance: u8, name: &'a NameOrDesc) -> Self {
        Self {
            dominance,
            kind: name.kind,
            length: name.text().chars().count(),
            text: Reverse(name.text()),
            span: Reverse(name.evidence.span),
        }
    }
}

fn scoped_uri(prefix: &str, doc_id: Option<&str>, n: u64) -> String {
    match doc_id {
        Some(doc) => format!("{prefix}-{doc}-{n}"),
        None => format!("{prefix}-{n}"),
    }
}

/// URI for an individual known only by its offsets.
pub fn generate_uri_from_offsets(doc_id: &str, span: Span) -> String {
    format!("individual-{doc_id}-{}-{}", span.start, span.end)
}

/// URI for an individual known only by its type and a key string.
pub fn generate_hash_uri(type_uri: &str, doc_id: &str, key: &str) -> String {
    format!(
        "{}-{doc_id}-{}",
        local_name(type_uri),
        digest_hex([type_uri, key])
    )
}

/// First 16 hex digits of the SHA-256 of the parts, each NUL-terminated.
pub fn digest_hex<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let hash = hasher.finalize();
    hash[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Most frequent type local name across individuals; ties break alphabetically.
pub fn dominant_type<'a>(individuals: impl IntoIterator<Item = &'a Individual>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for individual in individuals {
        for assertion in &individual.types {
            *counts.entry(assertion.local_name()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then_with(|| tb.cmp(ta)))
        .map(|(t, _)| t.to_string())
}
