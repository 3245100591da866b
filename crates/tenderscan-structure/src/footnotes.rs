//! Footnote definitions and marker linking

use crate::layout::{Layout, LineClass};
use crate::lines::Line;
use crate::Detected;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tenderscan_domain::{ElementKind, Footnote, MarkerLink};

static STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\(\*{1,3}\))\s*(\S.*)$").unwrap());

static BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\[\d{1,3}\])\s+(\S.*)$").unwrap());

static SUPERSCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([¹²³⁴⁵⁶⁷⁸⁹⁰]+)\s*(\S.*)$").unwrap());

static PAREN_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\(\d{1,2}\))\s+(\S.*)$").unwrap());

static LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(Note|NOTE|Notes|NOTES|Not|NOT|Dipnot|DİPNOT|Açıklama|AÇIKLAMA|Footnote)\s*:\s*(\S.*)$")
        .unwrap()
});

const SUPERSCRIPT_DIGITS: &str = "¹²³⁴⁵⁶⁷⁸⁹⁰";

/// A footnote definition line
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FootnoteMatch {
    pub marker: String,
    pub body: String,
    pub labelled: bool,
    /// `(n)` form: a definition only if the marker also occurs inline
    pub needs_inline_marker: bool,
}

fn plain(c: regex::Captures<'_>, needs_inline_marker: bool) -> FootnoteMatch {
    FootnoteMatch {
        marker: c[1].to_string(),
        body: c[2].trim().to_string(),
        labelled: false,
        needs_inline_marker,
    }
}

/// Classify a single line as a footnote definition candidate
pub(crate) fn match_definition(content: &str) -> Option<FootnoteMatch> {
    if let Some(c) = STAR.captures(content) {
        return Some(plain(c, false));
    }
    if let Some(c) = BRACKET.captures(content) {
        return Some(plain(c, false));
    }
    if let Some(c) = SUPERSCRIPT.captures(content) {
        return Some(plain(c, false));
    }
    if let Some(c) = PAREN_NUMBER.captures(content) {
        return Some(plain(c, true));
    }
    LABELLED.captures(content).map(|c| FootnoteMatch {
        marker: c[1].to_string(),
        body: c[2].trim().to_string(),
        labelled: true,
        needs_inline_marker: false,
    })
}

fn is_superscript(c: char) -> bool {
    SUPERSCRIPT_DIGITS.contains(c)
}

/// Offsets where `marker` occurs anywhere except at the start of a line
pub(crate) fn inline_occurrences(text: &str, lines: &[Line<'_>], marker: &str) -> Vec<usize> {
    let leading: Vec<usize> = lines.iter().map(Line::content_start).collect();
    let superscript = marker.chars().all(is_superscript);
    text.match_indices(marker)
        .map(|(offset, _)| offset)
        .filter(|offset| leading.binary_search(offset).is_err())
        .filter(|offset| {
            if !superscript {
                return true;
            }
            let before = text[..*offset].chars().next_back();
            let after = text[offset + marker.len()..].chars().next();
            !before.is_some_and(is_superscript) && !after.is_some_and(is_superscript)
        })
        .collect()
}

/// Build footnote elements and bind every inline marker occurrence to the
/// nearest following definition with the same marker, falling back to the
/// nearest preceding one. Table and row positions are filled in later.
pub(crate) fn build_footnotes(layout: &Layout<'_>) -> Vec<Detected> {
    let defs: Vec<(usize, &FootnoteMatch)> = layout
        .classes
        .iter()
        .enumerate()
        .filter_map(|(i, class)| match class {
            LineClass::Footnote(f) => Some((i, f)),
            _ => None,
        })
        .collect();

    let mut links: Vec<Vec<MarkerLink>> = vec![Vec::new(); defs.len()];
    let mut by_marker: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (k, (_, def)) in defs.iter().enumerate() {
        if !def.labelled {
            by_marker.entry(def.marker.as_str()).or_default().push(k);
        }
    }

    for (marker, owners) in &by_marker {
        for offset in inline_occurrences(layout.text, &layout.lines, marker) {
            let following = owners
                .iter()
                .find(|k| layout.lines[defs[**k].0].start > offset);
            let owner = following.or_else(|| {
                owners
                    .iter()
                    .rev()
                    .find(|k| layout.lines[defs[**k].0].start <= offset)
            });
            if let Some(k) = owner {
                links[*k].push(MarkerLink {
                    offset,
                    table: None,
                    row: None,
                });
            }
        }
    }

    defs.iter()
        .zip(links)
        .map(|((line_idx, def), links)| Detected {
            span: layout.lines[*line_idx].span(),
            kind: ElementKind::Footnote(Footnote {
                marker: def.marker.clone(),
                body: def.body.clone(),
                labelled: def.labelled,
                links,
            }),
        })
        .collect()
}

/// Detect footnote definitions with their marker links
pub fn detect_footnotes(text: &str) -> Vec<Detected> {
    build_footnotes(&Layout::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footnote(d: &Detected) -> &Footnote {
        match &d.kind {
            ElementKind::Footnote(f) => f,
            other => panic!("expected footnote, got {:?}", other),
        }
    }

    #[test]
    fn test_definition_forms() {
        assert_eq!(match_definition("(*) VAT excluded").unwrap().marker, "(*)");
        assert_eq!(match_definition("[2] Source: ministry").unwrap().marker, "[2]");
        assert_eq!(match_definition("¹ Per kilogram").unwrap().marker, "¹");
        let note = match_definition("Note: prices are fixed").unwrap();
        assert!(note.labelled);
        assert!(match_definition("(1) The bidder shall").unwrap().needs_inline_marker);
        assert!(match_definition("Plain line").is_none());
    }

    #[test]
    fn test_marker_in_table_cell_is_linked() {
        let text = "| Item | Price |\n| Bread (*) | 12 |\n| Milk | 9 |\n(*) VAT excluded\n";
        let notes = detect_footnotes(text);
        assert_eq!(notes.len(), 1);
        let f = footnote(&notes[0]);
        assert_eq!(f.body, "VAT excluded");
        assert_eq!(f.links.len(), 1);
        assert_eq!(f.links[0].offset, text.find("(*) |").unwrap());
    }

    #[test]
    fn test_occurrence_binds_to_following_definition() {
        let text = "First (*) here.\n(*) first note\nSecond (*) there.\n(*) second note\n";
        let notes = detect_footnotes(text);
        assert_eq!(notes.len(), 2);
        assert_eq!(footnote(&notes[0]).links.len(), 1);
        assert_eq!(footnote(&notes[1]).links.len(), 1);
        assert!(footnote(&notes[1]).links[0].offset > text.find("first note").unwrap());
    }

    #[test]
    fn test_parenthetical_without_inline_marker_is_not_a_footnote() {
        let text = "(1) The bidder shall register.\n(2) The bidder shall sign.\n";
        assert!(detect_footnotes(text).is_empty());

        let text = "Unit price (1) applies.\n(1) Excluding transport\n";
        let notes = detect_footnotes(text);
        assert_eq!(notes.len(), 1);
        assert_eq!(footnote(&notes[0]).links.len(), 1);
    }
}
