//! List items and hierarchical numbering.
//!
//! Nesting follows the numbering, not the indentation: `12.3.4.a.ii` is a
//! child of `12.3.4.a` wherever it sits on the page. Relative markers
//! (`a)`, `ii)`, `3.`) nest against the stack of open items by marker class.
//! Bullets carry no numbering and nest by indentation.

use crate::layout::{Layout, LineClass};
use crate::Detected;
use regex::Regex;
use std::sync::LazyLock;
use tenderscan_domain::{ElementKind, ListItem, MarkerClass, Span};

static DOTTED_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(\d{1,3}(?:\.(?:\d{1,3}|[a-zA-Z]|[ivxlcIVXLC]{1,5}))+)[.)]?\s+(\S.*)$")
        .unwrap()
});

static PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)\((\d{1,3}|[ivxlc]{2,5}|[a-zA-Z])\)\s+(\S.*)$").unwrap());

static NUMBERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(\d{1,3})[.)]\s+(\S.*)$").unwrap());

static ROMAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)([ivxlc]{2,5}|[IVXLC]{2,5})[.)]\s+(\S.*)$").unwrap());

static LETTERED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)([a-zA-Z])[.)]\s+(\S.*)$").unwrap());

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)([-•*–▪◦·])\s+(\S.*)$").unwrap());

/// How the marker locates the item in the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Numbering {
    /// Full dotted path such as `12.3.4.a.ii`
    Absolute(Vec<String>),
    /// One segment, placed against the open items
    Relative(String),
    /// Unnumbered bullet
    Bullet,
}

/// A list item line before nesting is resolved
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ListMatch {
    pub marker: String,
    pub numbering: Numbering,
    pub text: String,
}

fn is_roman(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| "ivxlcIVXLC".contains(c))
}

fn class_in_path(segment: &str, previous: Option<MarkerClass>) -> MarkerClass {
    if segment.chars().all(|c| c.is_ascii_digit()) {
        MarkerClass::Numeric
    } else if segment.len() > 1 && is_roman(segment) {
        MarkerClass::Roman
    } else if is_roman(segment) && previous == Some(MarkerClass::Letter) {
        MarkerClass::Roman
    } else {
        MarkerClass::Letter
    }
}

fn path_classes(path: &[String]) -> Vec<MarkerClass> {
    let mut out: Vec<MarkerClass> = Vec::with_capacity(path.len());
    for segment in path {
        let class = class_in_path(segment, out.last().copied());
        out.push(class);
    }
    out
}

/// Classify a single line as a list item
pub(crate) fn match_list_item(content: &str) -> Option<ListMatch> {
    if let Some(c) = DOTTED_PATH.captures(content) {
        let path: Vec<String> = c[2].split('.').map(str::to_string).collect();
        return Some(ListMatch {
            marker: c[2].to_string(),
            numbering: Numbering::Absolute(path),
            text: c[3].trim().to_string(),
        });
    }
    for re in [&*PARENTHETICAL, &*NUMBERED, &*ROMAN, &*LETTERED] {
        if let Some(c) = re.captures(content) {
            let marker = c.get(0).map_or("", |m| m.as_str()).trim_start();
            let marker = &marker[..marker.len() - c[3].len()];
            return Some(ListMatch {
                marker: marker.trim().to_string(),
                numbering: Numbering::Relative(c[2].to_string()),
                text: c[3].trim().to_string(),
            });
        }
    }
    BULLET.captures(content).map(|c| ListMatch {
        marker: c[2].to_string(),
        numbering: Numbering::Bullet,
        text: c[3].trim().to_string(),
    })
}

#[derive(Debug, Clone)]
struct Open {
    /// Position in the output list
    item: usize,
    path: Vec<String>,
    class: MarkerClass,
    indent: usize,
    /// Sibling ordinal for bullets
    ordinal: usize,
}

/// A list item with its resolved place in the hierarchy
#[derive(Debug, Clone)]
pub(crate) struct PlacedItem {
    pub own: Span,
    pub span: Span,
    pub list_parent: Option<usize>,
    pub item: ListItem,
}

fn predecessor(c: char) -> Option<char> {
    let lower = c.to_ascii_lowercase();
    (lower > 'a').then(|| (lower as u8 - 1) as char)
}

/// Decide letter vs roman for an ambiguous single character like `i`
fn relative_class(segment: &str, stack: &[Open]) -> MarkerClass {
    if segment.chars().all(|c| c.is_ascii_digit()) {
        return MarkerClass::Numeric;
    }
    if segment.len() > 1 {
        return MarkerClass::Roman;
    }
    let Some(c) = segment.chars().next() else {
        return MarkerClass::Letter;
    };
    if !is_roman(segment) {
        return MarkerClass::Letter;
    }
    let follows_letter = predecessor(c).is_some_and(|p| {
        stack.iter().any(|o| {
            o.class == MarkerClass::Letter
                && o.path
                    .last()
                    .is_some_and(|s| s.eq_ignore_ascii_case(&p.to_string()))
        })
    });
    if follows_letter {
        MarkerClass::Letter
    } else if stack.iter().any(|o| o.class == MarkerClass::Roman)
        || stack.last().is_some_and(|o| o.class == MarkerClass::Letter)
        || c.eq_ignore_ascii_case(&'i')
    {
        MarkerClass::Roman
    } else {
        MarkerClass::Letter
    }
}

/// Resolve nesting for every list line of the layout
pub(crate) fn place_items(layout: &Layout<'_>) -> Vec<PlacedItem> {
    let mut placed: Vec<PlacedItem> = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    // Item whose continuation lines are still being collected
    let mut continuing: Option<usize> = None;

    for (idx, class) in layout.classes.iter().enumerate() {
        let line = layout.lines[idx];
        let matched = match class {
            LineClass::ListItem(m) => m,
            LineClass::Text => {
                if let Some(p) = continuing {
                    placed[p].own.end = line.end;
                } else {
                    stack.clear();
                }
                continue;
            }
            LineClass::Blank => {
                continuing = None;
                continue;
            }
            LineClass::TableStart(_) | LineClass::TableRow(_) => {
                continuing = None;
                continue;
            }
            LineClass::Heading(_) | LineClass::Footnote(_) => {
                continuing = None;
                stack.clear();
                continue;
            }
        };

        let indent = line.indent();
        let (path, item_class, ordinal) = match &matched.numbering {
            Numbering::Absolute(path) => {
                while stack
                    .last()
                    .is_some_and(|o| !(o.path.len() < path.len() && path.starts_with(&o.path)))
                {
                    stack.pop();
                }
                let classes = path_classes(path);
                let class = classes.last().copied().unwrap_or(MarkerClass::Numeric);
                (path.clone(), class, 0)
            }
            Numbering::Relative(segment) => {
                let class = relative_class(segment, &stack);
                match stack.iter().rposition(|o| o.class == class) {
                    Some(pos) => {
                        let mut path = stack[pos].path.clone();
                        path.pop();
                        stack.truncate(pos);
                        path.push(segment.clone());
                        (path, class, 0)
                    }
                    None => {
                        let mut path = stack.last().map(|o| o.path.clone()).unwrap_or_default();
                        path.push(segment.clone());
                        (path, class, 0)
                    }
                }
            }
            Numbering::Bullet => {
                let sibling = stack
                    .iter()
                    .rposition(|o| o.class == MarkerClass::Bullet && o.indent == indent);
                match sibling {
                    Some(pos) => {
                        let ordinal = stack[pos].ordinal + 1;
                        let mut path = stack[pos].path.clone();
                        path.pop();
                        stack.truncate(pos);
                        path.push(format!("•{}", ordinal));
                        (path, MarkerClass::Bullet, ordinal)
                    }
                    None => {
                        while stack
                            .last()
                            .is_some_and(|o| o.class == MarkerClass::Bullet && o.indent >= indent)
                        {
                            stack.pop();
                        }
                        let mut path = stack.last().map(|o| o.path.clone()).unwrap_or_default();
                        path.push("•1".to_string());
                        (path, MarkerClass::Bullet, 1)
                    }
                }
            }
        };

        let list_parent = stack.last().map(|o| o.item);
        let position = placed.len();
        placed.push(PlacedItem {
            own: line.span(),
            span: line.span(),
            list_parent,
            item: ListItem {
                index: path.join("."),
                path: path.clone(),
                marker: matched.marker.clone(),
                class: item_class,
                text: matched.text.clone(),
                own: line.span(),
                indent,
            },
        });
        stack.push(Open {
            item: position,
            path,
            class: item_class,
            indent,
            ordinal,
        });
        continuing = Some(position);
    }

    // Own ranges are final; widen each ancestor over its descendants
    for item in placed.iter_mut() {
        item.item.own = item.own;
        item.span = item.own;
    }
    for i in (0..placed.len()).rev() {
        if let Some(p) = placed[i].list_parent {
            let end = placed[i].span.end;
            if end > placed[p].span.end {
                placed[p].span.end = end;
            }
        }
    }
    placed
}

/// Detect list items with resolved hierarchical indices
pub fn detect_lists(text: &str) -> Vec<Detected> {
    place_items(&Layout::new(text))
        .into_iter()
        .map(|p| Detected {
            span: p.span,
            kind: ElementKind::ListItem(p.item),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(text: &str) -> Vec<ListItem> {
        detect_lists(text)
            .into_iter()
            .filter_map(|d| match d.kind {
                ElementKind::ListItem(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_match_forms() {
        let m = match_list_item("12.3.4.a.ii More than 2 hours").unwrap();
        assert_eq!(
            m.numbering,
            Numbering::Absolute(vec!["12".into(), "3".into(), "4".into(), "a".into(), "ii".into()])
        );
        assert_eq!(match_list_item("a) first").unwrap().marker, "a)");
        assert_eq!(match_list_item("(2) second").unwrap().marker, "(2)");
        assert_eq!(match_list_item("iv. fourth").unwrap().numbering, Numbering::Relative("iv".into()));
        assert_eq!(match_list_item("  - bullet").unwrap().numbering, Numbering::Bullet);
        assert!(match_list_item("Plain sentence.").is_none());
    }

    #[test]
    fn test_dotted_paths_nest_by_prefix() {
        let text = "12.3.4.a For perishable goods:\n12.3.4.a.i Up to 2 hours late: 1%\n12.3.4.a.ii More than 2 hours late: 5%\n12.3.4.b For dry goods: 0.5%\n";
        let placed = place_items(&Layout::new(text));
        assert_eq!(placed.len(), 4);
        assert_eq!(placed[0].item.index, "12.3.4.a");
        assert_eq!(placed[2].item.index, "12.3.4.a.ii");
        assert_eq!(placed[2].item.class, MarkerClass::Roman);
        assert_eq!(placed[1].list_parent, Some(0));
        assert_eq!(placed[2].list_parent, Some(0));
        assert_eq!(placed[3].list_parent, None);
        assert!(placed[0].span.contains(&placed[2].span));
        assert!(!placed[0].span.intersects(&placed[3].span));
    }

    #[test]
    fn test_relative_markers_nest_by_class() {
        let text = "1) Goods\na) bread\nb) milk\ni) skimmed\nii) whole\nc) cheese\n2) Services\n";
        let got: Vec<String> = items(text).into_iter().map(|l| l.index).collect();
        assert_eq!(
            got,
            vec!["1", "1.a", "1.b", "1.b.i", "1.b.ii", "1.c", "2"]
        );
    }

    #[test]
    fn test_letter_i_after_h_stays_a_letter() {
        let text = "g) seven\nh) eight\ni) nine\n";
        let got: Vec<String> = items(text).into_iter().map(|l| l.index).collect();
        assert_eq!(got, vec!["g", "h", "i"]);
    }

    #[test]
    fn test_bullets_nest_by_indent() {
        let text = "- fruit\n  - apples\n  - pears\n- vegetables\n";
        let got: Vec<String> = items(text).into_iter().map(|l| l.index).collect();
        assert_eq!(got, vec!["•1", "•1.•1", "•1.•2", "•2"]);
    }

    #[test]
    fn test_continuation_lines_extend_item() {
        let text = "1) The supplier shall deliver\n   every morning before 7:00.\n\nFree paragraph.\n1) New list\n";
        let placed = place_items(&Layout::new(text));
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].own.end, text.find("\n\n").unwrap() + 1);
        assert_eq!(placed[1].item.index, "1");
        assert_eq!(placed[1].list_parent, None);
    }
}
