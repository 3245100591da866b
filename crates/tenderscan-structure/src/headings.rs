//! Heading recognition and section ranges

use crate::layout::{Layout, LineClass};
use crate::Detected;
use regex::Regex;
use std::sync::LazyLock;
use tenderscan_domain::{ElementKind, Heading, HeadingStyle, Span};

static MARKDOWN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*$").unwrap());

static PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:PART|Part|CHAPTER|Chapter|SECTION|Section|BÖLÜM|Bölüm|KISIM|Kısım)\s+([IVXLC]+|\d+)\b\s*(?:[-–—:.]\s*(.*))?$",
    )
    .unwrap()
});

static ANNEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:ANNEX|Annex|APPENDIX|Appendix|EK|Ek)[-\s]?(\d+|[A-Z])\b\s*(?:[-–—:.]\s*(.*))?$",
    )
    .unwrap()
});

static ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:ARTICLE|Article|MADDE|Madde|CLAUSE|Clause)\s+(\d+(?:\.\d+)*)\b\s*(?:[-–—:.]\s*(.*))?$",
    )
    .unwrap()
});

static ROMAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([IVXLC]+)\.\s+(\p{Lu}.*)$").unwrap());

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3})\.\s+(\p{Lu}.*)$").unwrap());

static DOTTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}(?:\.\d{1,3})+)\.?\s+(\p{L}.*)$").unwrap());

static LETTERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z])\.\s+(\p{Lu}.*)$").unwrap());

/// Longest title accepted for numbered forms
const MAX_TITLE_CHARS: usize = 80;

/// Most words accepted for single-number forms, which otherwise swallow
/// numbered sentences
const MAX_SHORT_TITLE_WORDS: usize = 8;

/// A heading line before section ranges are known
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HeadingMatch {
    pub level: u8,
    pub number: Option<String>,
    pub title: String,
    pub style: HeadingStyle,
}

fn title_ok(title: &str, short: bool) -> bool {
    let title = title.trim();
    let chars = title.chars().count();
    if chars < 3 || chars > MAX_TITLE_CHARS {
        return false;
    }
    if title.ends_with(['.', ';', ',']) {
        return false;
    }
    !short || title.split_whitespace().count() <= MAX_SHORT_TITLE_WORDS
}

fn labelled(number: &str, title: Option<&str>, style: HeadingStyle, level: u8) -> HeadingMatch {
    HeadingMatch {
        level,
        number: Some(number.to_string()),
        title: title.unwrap_or("").trim().to_string(),
        style,
    }
}

/// Classify a single line as a heading
pub(crate) fn match_heading(content: &str) -> Option<HeadingMatch> {
    let line = content.trim();
    if line.is_empty() || line.chars().count() > MAX_TITLE_CHARS + 40 {
        return None;
    }

    if let Some(c) = MARKDOWN.captures(line) {
        let title = c[2].trim().to_string();
        let number = title
            .split_whitespace()
            .next()
            .map(|w| w.trim_end_matches('.'))
            .filter(|w| !w.is_empty() && w.split('.').all(|s| s.chars().all(|ch| ch.is_ascii_digit()) && !s.is_empty()))
            .map(str::to_string);
        return Some(HeadingMatch {
            level: c[1].len() as u8,
            number,
            title,
            style: HeadingStyle::Markdown,
        });
    }
    if let Some(c) = PART.captures(line) {
        return Some(labelled(&c[1], c.get(2).map(|m| m.as_str()), HeadingStyle::Part, 1));
    }
    if let Some(c) = ANNEX.captures(line) {
        return Some(labelled(&c[1], c.get(2).map(|m| m.as_str()), HeadingStyle::Annex, 1));
    }
    if let Some(c) = ARTICLE.captures(line) {
        let depth = c[1].split('.').count() as u8;
        return Some(labelled(
            &c[1],
            c.get(2).map(|m| m.as_str()),
            HeadingStyle::Article,
            1 + depth,
        ));
    }
    if let Some(c) = ROMAN.captures(line) {
        // `C.` and `L.` are far more often letters than numerals
        if !matches!(&c[1], "C" | "L") && title_ok(&c[2], true) {
            return Some(labelled(&c[1], Some(&c[2]), HeadingStyle::Roman, 1));
        }
    }
    if let Some(c) = NUMBERED.captures(line) {
        if title_ok(&c[2], true) {
            return Some(labelled(&c[1], Some(&c[2]), HeadingStyle::Numbered, 2));
        }
    }
    if let Some(c) = DOTTED.captures(line) {
        if title_ok(&c[2], false) {
            let depth = c[1].split('.').count() as u8;
            return Some(labelled(&c[1], Some(&c[2]), HeadingStyle::Dotted, depth + 1));
        }
    }
    if let Some(c) = LETTERED.captures(line) {
        if title_ok(&c[2], true) {
            return Some(labelled(&c[1], Some(&c[2]), HeadingStyle::Lettered, 3));
        }
    }
    None
}

/// Build heading elements whose spans run to the next heading of equal or
/// higher rank
pub(crate) fn build_headings(layout: &Layout<'_>) -> Vec<Detected> {
    let found: Vec<(usize, &HeadingMatch)> = layout
        .classes
        .iter()
        .enumerate()
        .filter_map(|(i, class)| match class {
            LineClass::Heading(h) => Some((i, h)),
            _ => None,
        })
        .collect();

    found
        .iter()
        .enumerate()
        .map(|(k, (line_idx, h))| {
            let line = layout.lines[*line_idx];
            let end = found[k + 1..]
                .iter()
                .find(|(_, next)| next.level <= h.level)
                .map(|(next_idx, _)| layout.lines[*next_idx].start)
                .unwrap_or(layout.text.len());
            Detected {
                span: Span::new(line.start, end),
                kind: ElementKind::Heading(Heading {
                    level: h.level,
                    number: h.number.clone(),
                    title: h.title.clone(),
                    style: h.style,
                    line: line.span(),
                }),
            }
        })
        .collect()
}

/// Detect headings
pub fn detect_headings(text: &str) -> Vec<Detected> {
    build_headings(&Layout::new(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level_of(line: &str) -> Option<(u8, HeadingStyle)> {
        match_heading(line).map(|h| (h.level, h.style))
    }

    #[test]
    fn test_heading_forms() {
        assert_eq!(level_of("# Overview"), Some((1, HeadingStyle::Markdown)));
        assert_eq!(level_of("BÖLÜM II - GENEL HÜKÜMLER"), Some((1, HeadingStyle::Part)));
        assert_eq!(level_of("ANNEX A: Technical Specification"), Some((1, HeadingStyle::Annex)));
        assert_eq!(level_of("ARTICLE 8 - Payment Terms"), Some((2, HeadingStyle::Article)));
        assert_eq!(level_of("MADDE 12"), Some((2, HeadingStyle::Article)));
        assert_eq!(level_of("IV. GENERAL TERMS"), Some((1, HeadingStyle::Roman)));
        assert_eq!(level_of("3. Delivery Terms"), Some((2, HeadingStyle::Numbered)));
        assert_eq!(level_of("12.3 Delivery Penalties"), Some((3, HeadingStyle::Dotted)));
        assert_eq!(level_of("12.3.4 Late delivery"), Some((4, HeadingStyle::Dotted)));
        assert_eq!(level_of("B. Scope of Work"), Some((3, HeadingStyle::Lettered)));
    }

    #[test]
    fn test_sentences_are_not_headings() {
        assert!(match_heading("1. The supplier shall deliver all goods.").is_none());
        assert!(match_heading("12.3.5 Deliveries are made daily.").is_none());
        assert!(match_heading("Article 8 applies to all deliveries").is_none());
        assert!(match_heading("see Article 8 for details").is_none());
        assert!(match_heading("12.3.4.a For perishable goods:").is_none());
        assert!(match_heading("Ek-2'de yer alan liste").is_none());
    }

    #[test]
    fn test_heading_numbers() {
        let h = match_heading("ARTICLE 8 - Payment Terms").unwrap();
        assert_eq!(h.number.as_deref(), Some("8"));
        assert_eq!(h.title, "Payment Terms");
        let h = match_heading("## 4.2 Quality").unwrap();
        assert_eq!(h.number.as_deref(), Some("4.2"));
        let h = match_heading("## Quality").unwrap();
        assert_eq!(h.number, None);
    }

    #[test]
    fn test_section_ranges_nest() {
        let text = "ARTICLE 1 - Scope\nintro\n1.1 Goods Covered\ngoods\nARTICLE 2 - Price\nprice\n";
        let headings = detect_headings(text);
        assert_eq!(headings.len(), 3);
        let a2 = text.find("ARTICLE 2").unwrap();
        assert_eq!(headings[0].span, Span::new(0, a2));
        assert_eq!(headings[1].span.end, a2);
        assert_eq!(headings[2].span.end, text.len());
    }
}
