//! Cross-reference phrases and their resolution against heading numbers
//!
//! Mentions never cross a line. Detection is purely textual; targets are
//! bound once heading ids exist, either while building the index or by
//! [`resolve_references`] over a finished index.

use crate::Detected;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tenderscan_domain::{
    ElementId, ElementKind, Heading, Reference, ReferenceFamily, ReferenceTarget, Resolution,
    Span, StructuralIndex,
};

const LABEL: &str = r"(\d+(?:\.\d+)*|[IVXLC]+|[A-Z])";

static ENGLISH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"\b(?i:see|refer[ \t]+to|pursuant[ \t]+to|according[ \t]+to|as[ \t]+(?:stated|specified|defined|described)[ \t]+in|under|in[ \t]+accordance[ \t]+with)[ \t]+(?i:the[ \t]+)?(?i:(article|section|clause|chapter|annex|appendix|paragraph|part))[ \t]+{}\b",
        LABEL
    ))
    .unwrap()
});

static TR_ARTICLE_SEE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Madde|MADDE|madde)[ \t]+(\d+(?:\.\d+)*)(?:['’]\p{L}+)?[ \t]*(?:bakınız|belirtilen|göre|uyarınca)")
        .unwrap()
});

static TR_ARTICLE_AROUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[Yy]ukarıdaki|[Aa]şağıdaki)[ \t]+(\d+(?:\.\d+)*)[ \t]+(?:madde|Madde)").unwrap()
});

static TR_ARTICLE_STATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+(?:\.\d+)*)[ \t]+(?:maddede|maddesinde)[ \t]+(?:belirtildiği|açıklandığı)")
        .unwrap()
});

static TR_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Bölüm|BÖLÜM|bölüm)[ \t]+([IVXLC]+|\d+)(?:['’]\p{L}+)?[ \t]*(?:bakınız|göre)")
        .unwrap()
});

static TR_ANNEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:Ek|EK|ek)-(\d+|[A-Z])(?:['’]\p{L}+)?[ \t]+(?:yer[ \t]+alan|belirtilen|gösterilen)")
        .unwrap()
});

/// Maximum number of suggestions offered for an unresolved reference
const MAX_SUGGESTIONS: usize = 3;

/// Numeric distance within which a heading is offered as a suggestion
const SUGGESTION_DISTANCE: i64 = 2;

fn english_family(noun: &str) -> ReferenceFamily {
    match noun.to_lowercase().as_str() {
        "section" | "chapter" | "part" => ReferenceFamily::Section,
        "annex" | "appendix" => ReferenceFamily::Annex,
        _ => ReferenceFamily::Article,
    }
}

#[derive(Debug, Clone)]
struct Mention {
    span: Span,
    label: String,
    family: ReferenceFamily,
}

fn find_mentions(text: &str) -> Vec<Mention> {
    let mut found: Vec<Mention> = ENGLISH
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some(Mention {
                span: Span::new(whole.start(), whole.end()),
                label: c[2].to_string(),
                family: english_family(&c[1]),
            })
        })
        .collect();

    let turkish: [(&Regex, ReferenceFamily); 5] = [
        (&TR_ARTICLE_SEE, ReferenceFamily::Article),
        (&TR_ARTICLE_AROUND, ReferenceFamily::Article),
        (&TR_ARTICLE_STATED, ReferenceFamily::Article),
        (&TR_SECTION, ReferenceFamily::Section),
        (&TR_ANNEX, ReferenceFamily::Annex),
    ];
    for (re, family) in turkish {
        found.extend(re.captures_iter(text).filter_map(|c| {
            let whole = c.get(0)?;
            Some(Mention {
                span: Span::new(whole.start(), whole.end()),
                label: c[1].to_string(),
                family,
            })
        }));
    }

    // Earliest first, longest first on ties; drop anything overlapping a kept one
    found.sort_by(|a, b| {
        a.span
            .start
            .cmp(&b.span.start)
            .then(b.span.end.cmp(&a.span.end))
    });
    let mut kept: Vec<Mention> = Vec::new();
    for m in found {
        if kept.last().is_none_or(|k| m.span.start >= k.span.end) {
            kept.push(m);
        }
    }
    kept
}

/// Detect cross-reference mentions.
///
/// Targets are left unresolved here; [`crate::detect_structure`] binds them
/// to heading elements.
pub fn detect_references(text: &str) -> Vec<Detected> {
    find_mentions(text)
        .into_iter()
        .map(|m| Detected {
            span: m.span,
            kind: ElementKind::Reference(Reference {
                mention: text[m.span.range()].to_string(),
                label: m.label,
                family: m.family,
                target: ReferenceTarget::Unresolved,
            }),
        })
        .collect()
}

fn prefer_family<'h>(
    candidates: impl Iterator<Item = (ElementId, &'h Heading)>,
    family: ReferenceFamily,
) -> Option<ElementId> {
    let candidates: Vec<(ElementId, &Heading)> = candidates.collect();
    candidates
        .iter()
        .find(|(_, h)| h.style.family() == Some(family))
        .or_else(|| candidates.first())
        .map(|(id, _)| *id)
}

/// Bind a label to the best heading: exact number, then a heading that
/// extends the label, then the heading named by the label's first segment.
pub(crate) fn resolve_label(
    label: &str,
    family: ReferenceFamily,
    headings: &[(ElementId, &Heading)],
) -> ReferenceTarget {
    let numbered = || {
        headings
            .iter()
            .filter_map(|(id, h)| h.number.as_deref().map(|n| (*id, *h, n)))
    };

    let exact = prefer_family(
        numbered().filter(|(_, _, n)| *n == label).map(|(id, h, _)| (id, h)),
        family,
    );
    if let Some(heading) = exact {
        return ReferenceTarget::Resolved {
            heading,
            resolution: Resolution::Exact,
        };
    }

    let prefix = format!("{}.", label);
    let partial = prefer_family(
        numbered()
            .filter(|(_, _, n)| n.starts_with(&prefix))
            .map(|(id, h, _)| (id, h)),
        family,
    );
    if let Some(heading) = partial {
        return ReferenceTarget::Resolved {
            heading,
            resolution: Resolution::Partial,
        };
    }

    if let Some((first, _)) = label.split_once('.') {
        let parent = prefer_family(
            numbered().filter(|(_, _, n)| *n == first).map(|(id, h, _)| (id, h)),
            family,
        );
        if let Some(heading) = parent {
            return ReferenceTarget::Resolved {
                heading,
                resolution: Resolution::Parent,
            };
        }
    }

    ReferenceTarget::Unresolved
}

/// A heading offered for an unresolved reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Heading element
    pub heading: ElementId,
    /// Heading number as written
    pub number: String,
    /// Number and title
    pub text: String,
}

/// Resolution of one reference element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReference {
    /// Reference element
    pub element: ElementId,
    /// Mention text
    pub mention: String,
    /// Label being referred to
    pub label: String,
    /// Resolution result
    pub target: ReferenceTarget,
    /// Display text of the target heading
    pub target_text: Option<String>,
    /// 1.0 exact, 0.8 partial, 0.6 parent, 0.0 unresolved
    pub confidence: f64,
    /// Nearby headings when unresolved
    pub suggestions: Vec<Suggestion>,
}

/// Resolution statistics and per-reference results for an index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceResolution {
    /// References in the index
    pub total: usize,
    /// References bound to a heading
    pub resolved: usize,
    /// References left unresolved
    pub unresolved: usize,
    /// Exact matches
    pub exact: usize,
    /// Partial matches
    pub partial: usize,
    /// Parent matches
    pub parent: usize,
    /// `resolved / total`, 1.0 when there are no references
    pub resolution_rate: f64,
    /// One entry per reference, in document order
    pub entries: Vec<ResolvedReference>,
}

fn leading_number(label: &str) -> Option<i64> {
    label.split('.').next()?.parse().ok()
}

fn suggestions_for(label: &str, headings: &[(ElementId, &Heading)]) -> Vec<Suggestion> {
    let Some(wanted) = leading_number(label) else {
        return Vec::new();
    };
    let mut near: Vec<(i64, Suggestion)> = headings
        .iter()
        .filter_map(|(id, h)| {
            let number = h.number.as_deref()?;
            let distance = (leading_number(number)? - wanted).abs();
            (distance <= SUGGESTION_DISTANCE).then(|| {
                (
                    distance,
                    Suggestion {
                        heading: *id,
                        number: number.to_string(),
                        text: h.display_text(),
                    },
                )
            })
        })
        .collect();
    near.sort_by_key(|(distance, s)| (*distance, s.heading));
    near.into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, s)| s)
        .collect()
}

/// Resolve every reference of an index against its headings
pub fn resolve_references(index: &StructuralIndex) -> ReferenceResolution {
    let headings: Vec<(ElementId, &Heading)> =
        index.headings().map(|(e, h)| (e.id, h)).collect();

    let entries: Vec<ResolvedReference> = index
        .references()
        .map(|(element, reference)| {
            let target = resolve_label(&reference.label, reference.family, &headings);
            let (target_text, confidence, suggestions) = match &target {
                ReferenceTarget::Resolved {
                    heading,
                    resolution,
                } => (
                    index
                        .get(*heading)
                        .and_then(|e| e.as_heading())
                        .map(Heading::display_text),
                    resolution.confidence(),
                    Vec::new(),
                ),
                ReferenceTarget::Unresolved => {
                    (None, 0.0, suggestions_for(&reference.label, &headings))
                }
            };
            ResolvedReference {
                element: element.id,
                mention: reference.mention.clone(),
                label: reference.label.clone(),
                target,
                target_text,
                confidence,
                suggestions,
            }
        })
        .collect();

    let count = |wanted: Resolution| {
        entries
            .iter()
            .filter(|e| {
                matches!(&e.target, ReferenceTarget::Resolved { resolution, .. } if *resolution == wanted)
            })
            .count()
    };
    let total = entries.len();
    let resolved = entries
        .iter()
        .filter(|e| e.target != ReferenceTarget::Unresolved)
        .count();

    ReferenceResolution {
        total,
        resolved,
        unresolved: total - resolved,
        exact: count(Resolution::Exact),
        partial: count(Resolution::Partial),
        parent: count(Resolution::Parent),
        resolution_rate: if total == 0 {
            1.0
        } else {
            resolved as f64 / total as f64
        },
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscan_domain::HeadingStyle;

    fn mentions(text: &str) -> Vec<(String, String, ReferenceFamily)> {
        detect_references(text)
            .into_iter()
            .filter_map(|d| match d.kind {
                ElementKind::Reference(r) => Some((r.mention, r.label, r.family)),
                _ => None,
            })
            .collect()
    }

    fn heading(number: &str, style: HeadingStyle) -> Heading {
        Heading {
            level: 2,
            number: Some(number.to_string()),
            title: "Title".to_string(),
            style,
            line: Span::new(0, 1),
        }
    }

    #[test]
    fn test_english_phrases() {
        let got = mentions("Penalties apply; see Article 8. Prices are set as specified in Annex B.");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], ("see Article 8".to_string(), "8".to_string(), ReferenceFamily::Article));
        assert_eq!(got[1].1, "B");
        assert_eq!(got[1].2, ReferenceFamily::Annex);
        assert_eq!(mentions("in accordance with Section 12.3")[0].1, "12.3");
    }

    #[test]
    fn test_turkish_phrases() {
        assert_eq!(mentions("Ayrıntılar için Madde 8'e bakınız.")[0].1, "8");
        assert_eq!(mentions("yukarıdaki 12.3 madde hükümleri")[0].1, "12.3");
        assert_eq!(mentions("12.3 maddede belirtildiği gibi")[0].1, "12.3");
        assert_eq!(mentions("Bölüm III'e göre")[0].2, ReferenceFamily::Section);
        assert_eq!(mentions("Ek-2'de yer alan liste")[0].2, ReferenceFamily::Annex);
    }

    #[test]
    fn test_mentions_do_not_cross_lines() {
        assert!(mentions("see\nArticle 8").is_empty());
    }

    #[test]
    fn test_resolution_order() {
        let h8 = heading("8", HeadingStyle::Article);
        let h81 = heading("8.1", HeadingStyle::Dotted);
        let h12 = heading("12", HeadingStyle::Numbered);
        let headings = vec![(ElementId(0), &h8), (ElementId(1), &h81), (ElementId(2), &h12)];

        assert_eq!(
            resolve_label("8", ReferenceFamily::Article, &headings),
            ReferenceTarget::Resolved {
                heading: ElementId(0),
                resolution: Resolution::Exact
            }
        );
        assert_eq!(
            resolve_label("12.4", ReferenceFamily::Article, &headings),
            ReferenceTarget::Resolved {
                heading: ElementId(2),
                resolution: Resolution::Parent
            }
        );
        assert_eq!(
            resolve_label("9", ReferenceFamily::Article, &headings),
            ReferenceTarget::Unresolved
        );
    }

    #[test]
    fn test_exact_prefers_family() {
        let lettered = heading("A", HeadingStyle::Lettered);
        let annex = heading("A", HeadingStyle::Annex);
        let headings = vec![(ElementId(0), &lettered), (ElementId(1), &annex)];
        assert_eq!(
            resolve_label("A", ReferenceFamily::Annex, &headings),
            ReferenceTarget::Resolved {
                heading: ElementId(1),
                resolution: Resolution::Exact
            }
        );
    }

    #[test]
    fn test_partial_match() {
        let h = heading("8.1", HeadingStyle::Dotted);
        let headings = vec![(ElementId(3), &h)];
        assert_eq!(
            resolve_label("8", ReferenceFamily::Article, &headings),
            ReferenceTarget::Resolved {
                heading: ElementId(3),
                resolution: Resolution::Partial
            }
        );
    }

    #[test]
    fn test_suggestions_are_close_numbers() {
        let h1 = heading("1", HeadingStyle::Article);
        let h7 = heading("7", HeadingStyle::Article);
        let h10 = heading("10", HeadingStyle::Article);
        let headings = vec![(ElementId(0), &h1), (ElementId(1), &h7), (ElementId(2), &h10)];
        let got: Vec<String> = suggestions_for("9", &headings)
            .into_iter()
            .map(|s| s.number)
            .collect();
        assert_eq!(got, vec!["10", "7"]);
    }
}
