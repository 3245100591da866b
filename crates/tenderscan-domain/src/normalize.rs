//! Value normalization and source matching.
//!
//! The same normalizations decide both whether two extracted values are
//! "identical" (conflict detection) and whether an extracted value is
//! traceable to the source (fabrication checks):
//!
//! - case and whitespace folding
//! - number formatting (`1.250,50`, `1,250.50` and `1250.5` are equal)
//! - date formatting (`15.03.2025`, `15/03/2025` and `2025-03-15` are equal)

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static NUMBER_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d[\d.,]*$").unwrap());

static NUMBER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)*").unwrap());

static DMY_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[./-](\d{1,2})[./-](\d{4})$").unwrap());

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[./-]\d{1,2}[./-]\d{4}\b|\b\d{4}-\d{1,2}-\d{1,2}\b").unwrap()
});

const CURRENCY_MARKS: [&str; 9] = ["try", "tl", "₺", "usd", "$", "eur", "€", "gbp", "£"];

/// Lowercase, trim and collapse internal whitespace
pub fn fold_text(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_lowercase()
}

/// Canonical decimal form of a number written with any common separators.
///
/// Currency marks and a percent sign are ignored. Returns `None` when the
/// text is not a number.
///
/// ```
/// use tenderscan_domain::normalize::canonical_number;
///
/// assert_eq!(canonical_number("1.250,50 TL").as_deref(), Some("1250.5"));
/// assert_eq!(canonical_number("1,250.50").as_deref(), Some("1250.5"));
/// assert_eq!(canonical_number("%2,5").as_deref(), Some("2.5"));
/// assert_eq!(canonical_number("Bread"), None);
/// ```
pub fn canonical_number(s: &str) -> Option<String> {
    let mut cleaned = s.trim().to_lowercase();
    for mark in CURRENCY_MARKS {
        cleaned = cleaned.replace(mark, "");
    }
    let cleaned: String = cleaned
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '%')
        .collect();
    if !NUMBER_SHAPE.is_match(&cleaned) {
        return None;
    }

    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.trim_start_matches('+')),
    };

    let last_dot = digits.rfind('.');
    let last_comma = digits.rfind(',');
    let decimal = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(d.max(c)),
        (Some(p), None) | (None, Some(p)) => {
            let sep = digits.as_bytes()[p] as char;
            let occurrences = digits.matches(sep).count();
            let tail = digits.len() - p - 1;
            if occurrences == 1 && tail != 3 {
                Some(p)
            } else {
                None
            }
        }
        (None, None) => None,
    };

    let (int_part, frac_part) = match decimal {
        Some(p) => (&digits[..p], &digits[p + 1..]),
        None => (digits, ""),
    };
    let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
    if frac_part.contains(['.', ',']) {
        return None;
    }
    let int_trimmed = int_digits.trim_start_matches('0');
    let frac_trimmed = frac_part.trim_end_matches('0');

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(if int_trimmed.is_empty() { "0" } else { int_trimmed });
    if !frac_trimmed.is_empty() {
        out.push('.');
        out.push_str(frac_trimmed);
    }
    Some(out)
}

/// Canonical `YYYY-MM-DD` form of a day-first or ISO date
///
/// ```
/// use tenderscan_domain::normalize::canonical_date;
///
/// assert_eq!(canonical_date("15.03.2025").as_deref(), Some("2025-03-15"));
/// assert_eq!(canonical_date("2025-03-15").as_deref(), Some("2025-03-15"));
/// assert_eq!(canonical_date("31.02.2025"), None);
/// ```
pub fn canonical_date(s: &str) -> Option<String> {
    let s = s.trim();
    let (y, m, d) = if let Some(c) = DMY_DATE.captures(s) {
        (c[3].parse().ok()?, c[2].parse().ok()?, c[1].parse().ok()?)
    } else if let Some(c) = ISO_DATE.captures(s) {
        (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
    } else {
        return None;
    };
    NaiveDate::from_ymd_opt(y, m, d).map(|date| date.format("%Y-%m-%d").to_string())
}

/// Comparison key for a value: canonical date, canonical number, or folded text
pub fn comparison_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(
            canonical_date(s)
                .or_else(|| canonical_number(s))
                .unwrap_or_else(|| fold_text(s)),
        ),
        Value::Number(n) => canonical_number(&n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(fold_text(&other.to_string())),
    }
}

/// How a value was matched against the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Exact substring
    Verbatim,
    /// Substring after case and whitespace folding
    Folded,
    /// Same number after separator normalization
    Number,
    /// Same calendar date after format normalization
    Date,
}

/// Pre-digested source text for traceability lookups
#[derive(Debug, Clone)]
pub struct SourceMatcher<'a> {
    source: &'a str,
    folded: String,
    numbers: BTreeSet<String>,
    dates: BTreeSet<String>,
}

impl<'a> SourceMatcher<'a> {
    /// Index the source once
    pub fn new(source: &'a str) -> Self {
        let numbers = NUMBER_TOKEN
            .find_iter(source)
            .filter_map(|m| canonical_number(m.as_str()))
            .collect();
        let dates = DATE_TOKEN
            .find_iter(source)
            .filter_map(|m| canonical_date(m.as_str()))
            .collect();
        Self {
            source,
            folded: fold_text(source),
            numbers,
            dates,
        }
    }

    /// Match a value; blank values match trivially as `Verbatim`
    pub fn find(&self, value: &str) -> Option<MatchKind> {
        let trimmed = value.trim();
        if trimmed.is_empty() || self.source.contains(trimmed) {
            return Some(MatchKind::Verbatim);
        }
        if self.folded.contains(&fold_text(trimmed)) {
            return Some(MatchKind::Folded);
        }
        if let Some(date) = canonical_date(trimmed) {
            if self.dates.contains(&date) {
                return Some(MatchKind::Date);
            }
        }
        if let Some(number) = canonical_number(trimmed) {
            if self.numbers.contains(&number) {
                return Some(MatchKind::Number);
            }
        }
        None
    }

    /// True when the number occurs in the source after normalization
    pub fn has_number(&self, value: &str) -> bool {
        canonical_number(value).is_some_and(|n| self.numbers.contains(&n))
    }
}
