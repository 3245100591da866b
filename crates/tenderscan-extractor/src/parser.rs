//! Defensive decoding of model output
//!
//! Model responses are untrusted: they may be wrapped in markdown fences,
//! surrounded by chatter, contain bare numeric ranges or trailing commas,
//! or be cut off mid-generation. [`safe_json_parse`] applies a fixed series
//! of cleanups and falls back to [`repair_truncated_json`], reporting
//! exactly what it had to do so callers can decide whether to trust the
//! result.

use crate::error::{ExtractorError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```[A-Za-z]*").unwrap());

static VALUE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":(\s*)(\d+(?:[.,]\d+)?)\s*-\s*(\d+(?:[.,]\d+)?)(\s*[,}\]])").unwrap()
});

static ARRAY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\s*)(\d+(?:[.,]\d+)?)\s*-\s*(\d+(?:[.,]\d+)?)(\s*[,\]])").unwrap()
});

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[\]}])").unwrap());

/// Upper bound on decode attempts while walking cut points
const MAX_REPAIR_ATTEMPTS: usize = 256;

/// A cleanup step applied before the response decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cleanup {
    /// Markdown code fences removed
    StrippedFences,
    /// Text before the first bracket or after its last closer removed
    SlicedToJson,
    /// Bare numeric ranges such as `55-60` quoted
    QuotedRanges,
    /// Commas before `]` or `}` removed
    RemovedTrailingCommas,
    /// Truncated output closed by [`repair_truncated_json`]
    RepairedTruncation,
}

/// Decoded model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedJson {
    /// Decoded value
    pub value: Value,
    /// Cleanups applied, in order
    pub cleanups: Vec<Cleanup>,
    /// Decoded only after truncation repair
    pub recovered: bool,
    /// Text the repair discarded
    pub dropped_suffix: String,
}

impl ParsedJson {
    fn clean(value: Value, cleanups: Vec<Cleanup>) -> Self {
        Self {
            value,
            cleanups,
            recovered: false,
            dropped_suffix: String::new(),
        }
    }
}

/// Largest decodable prefix of a truncated response
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// Decoded value
    pub value: Value,
    /// Always true: the value is not what the model finished writing
    pub recovered: bool,
    /// Text discarded to reach a decodable prefix
    pub dropped_suffix: String,
}

/// Per-byte flag: true inside a string literal
fn string_mask(text: &str) -> Vec<bool> {
    let mut mask = vec![false; text.len()];
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if in_string {
            mask[i] = true;
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
            mask[i] = true;
        }
    }
    mask
}

/// Apply `re` outside string literals only
fn replace_outside_strings(
    text: &str,
    re: &Regex,
    replace: impl Fn(&Captures<'_>) -> String,
) -> Option<String> {
    let mask = string_mask(text);
    let mut changed = false;
    let out = re.replace_all(text, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let start = caps.get(0).map_or(0, |m| m.start());
        if mask.get(start).copied().unwrap_or(false) {
            whole.to_string()
        } else {
            changed = true;
            replace(caps)
        }
    });
    changed.then(|| out.into_owned())
}

fn quote_ranges(text: &str) -> Option<String> {
    let values = replace_outside_strings(text, &VALUE_RANGE, |c| {
        format!(":{}\"{}-{}\"{}", &c[1], &c[2], &c[3], &c[4])
    });
    let current = values.as_deref().unwrap_or(text);
    let arrays = replace_outside_strings(current, &ARRAY_RANGE, |c| {
        format!("[{}\"{}-{}\"{}", &c[1], &c[2], &c[3], &c[4])
    });
    arrays.or(values)
}

fn remove_trailing_commas(text: &str) -> Option<String> {
    replace_outside_strings(text, &TRAILING_COMMA, |c| c[1].to_string())
}

/// Apply the textual fixes that do not depend on where the JSON ends
fn fix_values(text: &str, cleanups: &mut Vec<Cleanup>) -> String {
    let mut out = text.to_string();
    if let Some(quoted) = quote_ranges(&out) {
        push_once(cleanups, Cleanup::QuotedRanges);
        out = quoted;
    }
    if let Some(stripped) = remove_trailing_commas(&out) {
        push_once(cleanups, Cleanup::RemovedTrailingCommas);
        out = stripped;
    }
    out
}

fn push_once(cleanups: &mut Vec<Cleanup>, cleanup: Cleanup) {
    if !cleanups.contains(&cleanup) {
        cleanups.push(cleanup);
    }
}

/// Decode a model response defensively.
///
/// Steps, stopping at the first that decodes: strict decode; strip markdown
/// fences; slice from the first `{`/`[` to its last closer; quote bare
/// numeric ranges; remove trailing commas; strict decode again;
/// [`repair_truncated_json`].
///
/// # Errors
///
/// `JsonParse` when the response is blank, holds no JSON, or nothing
/// decodes even after repair.
pub fn safe_json_parse(raw: &str) -> Result<ParsedJson> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractorError::JsonParse("empty response".to_string()));
    }

    let first_error = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(ParsedJson::clean(value, Vec::new())),
        Err(e) => e.to_string(),
    };

    let mut cleanups = Vec::new();
    let mut text = trimmed.to_string();

    let unfenced = FENCE.replace_all(&text, "").trim().to_string();
    if unfenced != text {
        cleanups.push(Cleanup::StrippedFences);
        text = unfenced;
    }

    let Some(start) = text.find(['{', '[']) else {
        return Err(ExtractorError::JsonParse(format!("no JSON found: {}", first_error)));
    };
    let body = &text[start..];
    let closer = if body.starts_with('{') { '}' } else { ']' };
    let sliced = match body.rfind(closer) {
        Some(end) => &body[..=end],
        None => body,
    };
    if sliced.len() != text.len() {
        cleanups.push(Cleanup::SlicedToJson);
    }

    let candidate = fix_values(sliced, &mut cleanups);
    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        debug!(cleanups = ?cleanups, "Decoded response after cleanup");
        return Ok(ParsedJson::clean(value, cleanups));
    }

    let tail = fix_values(body, &mut cleanups);
    match repair_truncated_json(&tail) {
        Some(repair) => {
            if start == 0 {
                cleanups.retain(|c| *c != Cleanup::SlicedToJson);
            }
            cleanups.push(Cleanup::RepairedTruncation);
            debug!(
                dropped = repair.dropped_suffix.chars().count(),
                "Recovered truncated response"
            );
            Ok(ParsedJson {
                value: repair.value,
                cleanups,
                recovered: true,
                dropped_suffix: repair.dropped_suffix,
            })
        }
        None => Err(ExtractorError::JsonParse(first_error)),
    }
}

fn closers(stack: &[char]) -> String {
    stack.iter().rev().collect()
}

fn decode(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Recover the largest valid JSON prefix of a response that was cut off.
///
/// First tries closing an unterminated string together with every open
/// bracket, then walks cut points from the end: after a complete value,
/// before a comma, after an open bracket. Returns `None` when the text holds
/// no bracket or no prefix decodes.
///
/// ```
/// use tenderscan_extractor::parser::repair_truncated_json;
///
/// let repaired = repair_truncated_json(r#"{"requirements": ["Fresh bread", "Daily deli"#).unwrap();
/// assert_eq!(repaired.value["requirements"][1], "Daily deli");
/// assert!(repaired.recovered);
/// ```
pub fn repair_truncated_json(raw: &str) -> Option<RepairOutcome> {
    let start = raw.find(['{', '['])?;
    let text = &raw[start..];

    let mut stack: Vec<char> = Vec::new();
    let mut cuts: Vec<(usize, String)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut complete_at = None;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                cuts.push((i + 1, closers(&stack)));
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                stack.push('}');
                cuts.push((i + 1, closers(&stack)));
            }
            '[' => {
                stack.push(']');
                cuts.push((i + 1, closers(&stack)));
            }
            '}' | ']' => {
                if stack.last() != Some(&c) {
                    break;
                }
                stack.pop();
                cuts.push((i + 1, closers(&stack)));
                if stack.is_empty() {
                    complete_at = Some(i + 1);
                    break;
                }
            }
            ',' => cuts.push((i, closers(&stack))),
            _ => {}
        }
    }

    let outcome = |value: Value, cut: usize| RepairOutcome {
        value,
        recovered: true,
        dropped_suffix: text[cut..].to_string(),
    };

    if let Some(end) = complete_at {
        if let Some(value) = decode(&text[..end]) {
            return Some(outcome(value, end));
        }
    } else {
        let open = closers(&stack);
        if in_string {
            let body = if escaped { &text[..text.len() - 1] } else { text };
            if let Some(value) = decode(&format!("{}\"{}", body, open)) {
                return Some(outcome(value, body.len()));
            }
        } else {
            let body = text.trim_end().trim_end_matches(',').trim_end();
            if let Some(value) = decode(&format!("{}{}", body, open)) {
                return Some(outcome(value, body.len()));
            }
        }
    }

    cuts.iter()
        .rev()
        .take(MAX_REPAIR_ATTEMPTS)
        .find_map(|(cut, open)| decode(&format!("{}{}", &text[..*cut], open)).map(|v| outcome(v, *cut)))
}
