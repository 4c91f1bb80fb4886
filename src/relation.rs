//! Role-labeled relations over individuals.
//!
//! A [`Relation`] keeps its arguments in a role-ordered multimap: a role may be
//! bound more than once, which is how extraction patterns report several
//! candidate fillers. [`Relation::split_duplicate_roles`] expands those into
//! single-valued relations.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{RelationError, RelationResult};
use crate::identifier::TextSpan;
use crate::individual::Individual;

/// Confidence given to relations that do not state one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Roles with this prefix are temporal qualifiers and never split.
pub const TEMPORAL_ROLE_PREFIX: &str = "t:";

/// Source tag appended to relations produced by role-splitting.
pub const SPLIT_SOURCE_TAG: &str = "eru:elfdocument-split_duplicate_role_relations";

/// A role binding: a role label, the filling individual (a literal value
/// individual for inlined literals), and the evidence for this argument.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationArg {
    role: String,
    individual: Arc<Individual>,
    evidence: TextSpan,
}

impl RelationArg {
    pub fn new(
        role: impl Into<String>,
        individual: impl Into<Arc<Individual>>,
        evidence: TextSpan,
    ) -> Self {
        Self {
            role: role.into(),
            individual: individual.into(),
            evidence,
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn individual(&self) -> &Arc<Individual> {
        &self.individual
    }

    pub fn evidence(&self) -> &TextSpan {
        &self.evidence
    }

    pub fn is_temporal(&self) -> bool {
        self.role.starts_with(TEMPORAL_ROLE_PREFIX)
    }

    /// Copy of this argument pointing at another individual.
    pub fn with_individual(&self, individual: Arc<Individual>) -> Self {
        Self {
            role: self.role.clone(),
            individual,
            evidence: self.evidence.clone(),
        }
    }

    /// The literal value, or else the best URI, of the filler.
    pub fn filler_key(&self) -> Option<String> {
        match self.individual.value() {
            Some(v) => Some(v.to_string()),
            None => self.individual.best_uri(None).ok(),
        }
    }

    /// Equality ignoring offsets, text and confidence: the fillers must have
    /// equal values, or equal best URIs if neither is a literal.
    pub fn offsetless_equals(&self, other: &RelationArg, check_role: bool) -> bool {
        if check_role && self.role != other.role {
            return false;
        }
        same_filler(&self.individual, &other.individual)
    }
}

fn same_filler(a: &Individual, b: &Individual) -> bool {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => x == y,
        (None, None) => match (a.best_uri(None), b.best_uri(None)) {
            (Ok(x), Ok(y)) => x == y,
            _ => false,
        },
        _ => false,
    }
}

/// A predicate instance with role-labeled arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    name: String,
    args: BTreeMap<String, Vec<Arc<RelationArg>>>,
    confidence: f64,
    score_group: Option<i32>,
    source: String,
    evidence: Option<TextSpan>,
}

impl Relation {
    /// Build a relation, requiring at least two distinct roles.
    pub fn new(
        name: impl Into<String>,
        args: impl IntoIterator<Item = RelationArg>,
    ) -> RelationResult<Self> {
        let mut relation = Self {
            name: name.into(),
            args: BTreeMap::new(),
            confidence: DEFAULT_CONFIDENCE,
            score_group: None,
            source: String::new(),
            evidence: None,
        };
        for arg in args {
            relation.insert_argument(arg);
        }
        relation.validate()?;
        Ok(relation)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_score_group(mut self, score_group: Option<i32>) -> Self {
        self.score_group = score_group;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_evidence(mut self, evidence: Option<TextSpan>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn score_group(&self) -> Option<i32> {
        self.score_group
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    /// Append a `;`-separated provenance tag unless already present.
    pub fn add_source(&mut self, tag: &str) {
        if self.source.split("; ").any(|s| s == tag) {
            return;
        }
        if self.source.is_empty() {
            self.source = tag.to_string();
        } else {
            self.source = format!("{}; {tag}", self.source);
        }
    }

    pub fn evidence(&self) -> Option<&TextSpan> {
        self.evidence.as_ref()
    }

    /// All arguments, ordered by role.
    pub fn args(&self) -> impl Iterator<Item = &Arc<RelationArg>> {
        self.args.values().flatten()
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }

    pub fn arg_count(&self) -> usize {
        self.args.values().map(Vec::len).sum()
    }

    /// Fail with `AmbiguousRelation` if fewer than two distinct roles remain.
    pub fn validate(&self) -> RelationResult<()> {
        let roles = self.args.len();
        if roles < 2 {
            return Err(RelationError::AmbiguousRelation {
                name: self.name.clone(),
                roles,
            });
        }
        Ok(())
    }

    pub fn args_with_role(&self, role: &str) -> &[Arc<RelationArg>] {
        self.args.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first argument bound to `role`.
    pub fn arg(&self, role: &str) -> Option<&Arc<RelationArg>> {
        let args = self.args_with_role(role);
        if args.len() > 1 {
            tracing::warn!(
                relation = %self.name,
                role,
                count = args.len(),
                "role bound more than once, using first argument"
            );
        }
        args.first()
    }

    /// Insert an argument after any existing arguments of the same role.
    pub fn insert_argument(&mut self, arg: RelationArg) -> Arc<RelationArg> {
        let arg = Arc::new(arg);
        self.args
            .entry(arg.role.clone())
            .or_default()
            .push(Arc::clone(&arg));
        arg
    }

    /// Remove this exact argument (pointer identity, not equality).
    ///
    /// Returns whether it was found. The relation may fail [`validate`](Self::validate)
    /// afterwards.
    pub fn remove_argument(&mut self, arg: &Arc<RelationArg>) -> bool {
        let Some(args) = self.args.get_mut(&arg.role) else {
            return false;
        };
        let Some(pos) = args.iter().position(|a| Arc::ptr_eq(a, arg)) else {
            return false;
        };
        args.remove(pos);
        if args.is_empty() {
            self.args.remove(&arg.role);
        }
        true
    }

    /// Individuals referenced by non-literal arguments.
    pub fn referenced_individuals(&self) -> Vec<&Arc<Individual>> {
        self.args()
            .map(|a| &a.individual)
            .filter(|i| !i.is_value())
            .collect()
    }

    /// First argument offsetless-equal to `arg`, ignoring roles.
    pub fn matching_arg(&self, arg: &RelationArg) -> Option<&Arc<RelationArg>> {
        self.args().find(|a| a.offsetless_equals(arg, false))
    }

    /// Whether any argument's filler is offsetless-equal to `individual`.
    pub fn references(&self, individual: &Individual) -> bool {
        self.args().any(|a| same_filler(&a.individual, individual))
    }

    /// Same predicate, same roles, and per role the same argument fillers in
    /// both directions, ignoring offsets, text and confidence.
    pub fn offsetless_equals(&self, other: &Relation) -> bool {
        if self.name != other.name || !self.args.keys().eq(other.args.keys()) {
            return false;
        }
        self.args.iter().all(|(role, mine)| {
            let theirs = other.args_with_role(role);
            mine.iter()
                .all(|a| theirs.iter().any(|b| a.offsetless_equals(b, true)))
                && theirs
                    .iter()
                    .all(|b| mine.iter().any(|a| a.offsetless_equals(b, true)))
        })
    }

    /// Rebuild with each argument's individual passed through `f`; `f` returns
    /// `None` to keep an individual. Returns `None` if nothing changed.
    pub fn with_individuals_replaced(
        &self,
        mut f: impl FnMut(&Arc<Individual>) -> Option<Arc<Individual>>,
    ) -> Option<Relation> {
        let mut changed = false;
        let mut args = BTreeMap::new();
        for (role, role_args) in &self.args {
            let rebuilt: Vec<Arc<RelationArg>> = role_args
                .iter()
                .map(|arg| match f(&arg.individual) {
                    Some(replacement) => {
                        changed = true;
                        Arc::new(arg.with_individual(replacement))
                    }
                    None => Arc::clone(arg),
                })
                .collect();
            args.insert(role.clone(), rebuilt);
        }
        changed.then(|| Relation {
            args,
            ..self.clone()
        })
    }

    /// Expand multiply-bound roles into single-valued relations.
    ///
    /// Roles with a single filler are copied into every output. A temporal
    /// role is single-valued: only its first filler is kept. Other roles are deduplicated (same offsets, text and filler) and
    /// cross-multiplied. Returns `None` when no role is bound more than once.
    pub fn split_duplicate_roles(&self) -> RelationResult<Option<Vec<Relation>>> {
        let mut shared: BTreeMap<String, Vec<Arc<RelationArg>>> = BTreeMap::new();
        let mut varying: Vec<(String, Vec<Arc<RelationArg>>)> = Vec::new();
        let mut needs_split = false;

        for (role, args) in &self.args {
            if role.starts_with(TEMPORAL_ROLE_PREFIX) {
                shared.insert(role.clone(), args.iter().take(1).cloned().collect());
                continue;
            }
            if args.len() > 1 {
                needs_split = true;
            }
            let distinct = dedupe_args(args);
            if distinct.len() > 1 {
                varying.push((role.clone(), distinct));
            } else {
                shared.insert(role.clone(), distinct);
            }
        }

        if !needs_split {
            return Ok(None);
        }

        let mut outputs = Vec::new();
        let mut choice = vec![0usize; varying.len()];
        loop {
            let mut args = shared.clone();
            for ((role, fillers), &i) in varying.iter().zip(&choice) {
                args.insert(role.clone(), vec![Arc::clone(&fillers[i])]);
            }
            let mut relation = Relation {
                name: self.name.clone(),
                args,
                confidence: self.confidence,
                score_group: self.score_group,
                source: self.source.clone(),
                evidence: self.evidence.clone(),
            };
            relation.add_source(SPLIT_SOURCE_TAG);
            relation.validate()?;
            outputs.push(relation);

            // Odometer over the varying roles, last role fastest.
            let mut pos = varying.len();
            loop {
                if pos == 0 {
                    return Ok(Some(outputs));
                }
                pos -= 1;
                choice[pos] += 1;
                if choice[pos] < varying[pos].1.len() {
                    break;
                }
                choice[pos] = 0;
            }
        }
    }
}

/// Drop arguments repeating an earlier one's offsets, text and filler.
fn dedupe_args(args: &[Arc<RelationArg>]) -> Vec<Arc<RelationArg>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for arg in args {
        let key = arg
            .filler_key()
            .map(|filler| (arg.evidence.span, arg.evidence.text.clone(), filler));
        match key {
            Some(key) => {
                if seen.insert(key) {
                    out.push(Arc::clone(arg));
                }
            }
            None => out.push(Arc::clone(arg)),
        }
    }
    out
}
