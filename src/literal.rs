//! Literal value normalization and name cleanup.
//!
//! Value individuals carry a canonical literal string. [`normalize`] maps raw
//! extracted text to that form according to the literal's XSD type; it is a pure
//! function and fails with `MalformedLiteral` when the text cannot satisfy the
//! format its type implies.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{IdentityError, IdentityResult};

// ── Regex patterns ──────────────────────────────────────────────────────

static RE_DATE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").unwrap());

static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const INTEGER_TYPES: &[&str] = &[
    "xsd:int",
    "xsd:integer",
    "xsd:long",
    "xsd:nonNegativeInteger",
    "xsd:positiveInteger",
];

const DECIMAL_TYPES: &[&str] = &["xsd:decimal", "xsd:double", "xsd:float"];

const DATE_TYPES: &[&str] = &["xsd:date", "xsd:dateTime"];

/// Normalize raw literal text for the given type.
pub fn normalize(type_uri: &str, raw: &str) -> IdentityResult<String> {
    let malformed = || IdentityError::MalformedLiteral {
        type_uri: type_uri.to_string(),
        text: raw.to_string(),
    };
    let trimmed = raw.trim();

    if INTEGER_TYPES.contains(&type_uri) {
        let floor = match type_uri {
            "xsd:nonNegativeInteger" => 0,
            "xsd:positiveInteger" => 1,
            _ => i64::MIN,
        };
        return parse_integer(trimmed)
            .filter(|n| *n >= floor)
            .map(|n| n.to_string())
            .ok_or_else(malformed);
    }

    if DECIMAL_TYPES.contains(&type_uri) {
        let cleaned = strip_separators(trimmed);
        return match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(cleaned),
            _ => Err(malformed()),
        };
    }

    if DATE_TYPES.contains(&type_uri) {
        return canonical_date(trimmed).ok_or_else(malformed);
    }

    let collapsed = collapse_whitespace(trimmed);
    if collapsed.is_empty() {
        return Err(malformed());
    }
    Ok(collapsed)
}

/// Parse an integer written in digits (with optional thousands separators) or
/// English number words.
pub fn parse_integer(text: &str) -> Option<i64> {
    let cleaned = strip_separators(text.trim());
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if let Ok(n) = digits.parse::<i64>() {
        return Some(n);
    }
    parse_number_words(text)
}

/// Parse English number words: `"twenty three"`, `"one hundred and five"`,
/// `"3 million"`, `"zero"`.
pub fn parse_number_words(text: &str) -> Option<i64> {
    let lower = text.to_lowercase();
    let mut total: i64 = 0;
    let mut current: i64 = 0;
    let mut saw_number = false;

    for token in lower
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
    {
        if token == "and" {
            continue;
        }
        if let Some(v) = small_number(token) {
            current = current.checked_add(v)?;
            saw_number = true;
        } else if token == "hundred" {
            current = current.max(1).checked_mul(100)?;
            saw_number = true;
        } else if let Some(scale) = scale_word(token) {
            total = total.checked_add(current.max(1).checked_mul(scale)?)?;
            current = 0;
            saw_number = true;
        } else if let Ok(n) = strip_separators(token).parse::<i64>() {
            current = current.checked_add(n)?;
            saw_number = true;
        } else {
            return None;
        }
    }

    if saw_number {
        total.checked_add(current)
    } else {
        None
    }
}

fn small_number(word: &str) -> Option<i64> {
    let v = match word {
        "zero" => 0,
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        "fifteen" => 15,
        "sixteen" => 16,
        "seventeen" => 17,
        "eighteen" => 18,
        "nineteen" => 19,
        "twenty" => 20,
        "thirty" => 30,
        "forty" => 40,
        "fifty" => 50,
        "sixty" => 60,
        "seventy" => 70,
        "eighty" => 80,
        "ninety" => 90,
        _ => return None,
    };
    Some(v)
}

fn scale_word(word: &str) -> Option<i64> {
    match word {
        "thousand" => Some(1_000),
        "million" => Some(1_000_000),
        "billion" => Some(1_000_000_000),
        _ => None,
    }
}

fn strip_separators(text: &str) -> String {
    text.chars().filter(|c| *c != ',').collect()
}

/// Extract a validated `YYYY-MM-DD` prefix.
fn canonical_date(text: &str) -> Option<String> {
    let caps = RE_DATE_PREFIX.captures(text)?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    Some(caps[0].to_string())
}

/// Collapse runs of whitespace to a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Canonical form of a name used as a lookup key.
///
/// Applies NFKC, lowercases, turns hyphens, slashes and underscores into
/// spaces, drops other punctuation, and collapses whitespace:
/// `"U.S. Department-of State"` becomes `"us department of state"`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.nfkc().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if c.is_whitespace() || matches!(c, '-' | '/' | '_') {
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_drop_thousands_separators() {
        assert_eq!(normalize("xsd:int", " 12,500 ").unwrap(), "12500");
        assert_eq!(normalize("xsd:integer", "+42").unwrap(), "42");
    }

    #[test]
    fn integers_accept_number_words() {
        assert_eq!(normalize("xsd:int", "zero").unwrap(), "0");
        assert_eq!(normalize("xsd:int", "twenty-three").unwrap(), "23");
        assert_eq!(normalize("xsd:int", "one hundred and five").unwrap(), "105");
        assert_eq!(normalize("xsd:int", "3 million").unwrap(), "3000000");
        assert_eq!(
            normalize("xsd:int", "two thousand four hundred").unwrap(),
            "2400"
        );
    }

    #[test]
    fn integer_garbage_is_malformed() {
        let err = normalize("xsd:int", "several").unwrap_err();
        assert!(matches!(err, IdentityError::MalformedLiteral { .. }));
    }

    #[test]
    fn unsigned_integer_types_enforce_their_range() {
        assert_eq!(normalize("xsd:nonNegativeInteger", "0").unwrap(), "0");
        assert_eq!(normalize("xsd:positiveInteger", "seven").unwrap(), "7");
        for (type_uri, text) in [
            ("xsd:nonNegativeInteger", "-5"),
            ("xsd:positiveInteger", "0"),
            ("xsd:positiveInteger", "-1,000"),
        ] {
            let err = normalize(type_uri, text).unwrap_err();
            assert!(matches!(err, IdentityError::MalformedLiteral { .. }), "{type_uri} {text}");
        }
        assert_eq!(normalize("xsd:integer", "-5").unwrap(), "-5");
    }

    #[test]
    fn dates_keep_year_month_day_prefix() {
        assert_eq!(
            normalize("xsd:date", "2010-08-29T10:00:00").unwrap(),
            "2010-08-29"
        );
        assert_eq!(normalize("xsd:date", "2010-08-29").unwrap(), "2010-08-29");
    }

    #[test]
    fn dates_without_full_ymd_are_malformed() {
        assert!(normalize("xsd:date", "2010-08").is_err());
        assert!(normalize("xsd:date", "last Tuesday").is_err());
        assert!(normalize("xsd:date", "2010-13-01").is_err());
    }

    #[test]
    fn decimals_must_parse() {
        assert_eq!(normalize("xsd:decimal", "1,234.5").unwrap(), "1234.5");
        assert!(normalize("xsd:double", "abc").is_err());
    }

    #[test]
    fn plain_strings_collapse_whitespace() {
        assert_eq!(normalize("xsd:string", "  New \n York ").unwrap(), "New York");
        assert!(normalize("xsd:string", "   ").is_err());
    }

    #[test]
    fn normalize_name_strips_punctuation_and_case() {
        assert_eq!(normalize_name("U.S. Department-of  State"), "us department of state");
        assert_eq!(normalize_name("  AT&T "), "att");
        assert_eq!(normalize_name("Ｇｅｏｒｇｉａ"), "georgia");
    }
}
