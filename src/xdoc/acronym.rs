//! Acronym expansion for name matching.

use std::collections::BTreeSet;

use crate::literal::normalize_name;

const ACRONYM_STOP_WORDS: &[&str] = &["a", "an", "and", "at", "for", "in", "of", "on", "the", "to"];

/// Acronyms a name could be abbreviated to.
///
/// Stop words are skipped; the initials are returned packed and spaced:
/// `"American Insurance Group"` yields `{"aig", "a i g"}`.
pub fn possible_acronyms(name: &str) -> BTreeSet<String> {
    let initials: Vec<char> = normalize_name(name)
        .split(' ')
        .filter(|w| !w.is_empty() && !ACRONYM_STOP_WORDS.contains(w))
        .filter_map(|w| w.chars().next())
        .collect();

    let mut acronyms = BTreeSet::new();
    if initials.is_empty() {
        return acronyms;
    }
    acronyms.insert(initials.iter().collect::<String>());
    acronyms.insert(
        initials
            .iter()
            .map(char::to_string)
            .collect::<Vec<_>>()
            .join(" "),
    );
    acronyms
}

/// Number of acronym-bearing words in a normalized name.
pub(crate) fn initial_count(normalized: &str) -> usize {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty() && !ACRONYM_STOP_WORDS.contains(w))
        .count()
}
