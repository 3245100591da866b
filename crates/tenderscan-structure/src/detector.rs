//! Aggregate structure detection
//!
//! Runs every detector over one shared line layout, orders the results into
//! an arena, links parents by innermost containment and binds footnote
//! markers and reference targets.

use crate::error::{Result, StructureError};
use crate::footnotes::build_footnotes;
use crate::headings::build_headings;
use crate::layout::{Layout, LineClass};
use crate::lists::place_items;
use crate::references::{detect_references, resolve_label};
use crate::tables::build_table;
use crate::Detected;
use std::cmp::Reverse;
use std::time::Instant;
use tenderscan_domain::{
    ElementId, ElementKind, ElementType, Heading, Span, StructuralElement, StructuralIndex,
};
use tracing::{debug, info};

/// Default input limit in bytes
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 2_000_000;

fn type_rank(kind: &ElementKind) -> u8 {
    match kind.element_type() {
        ElementType::Heading => 0,
        ElementType::Table => 1,
        ElementType::ListItem => 2,
        ElementType::Footnote => 3,
        ElementType::Reference => 4,
    }
}

/// Detect the full structural index of `text`.
///
/// Deterministic: identical text yields an identical index.
///
/// # Errors
///
/// `EmptyText` for blank input, `TextTooLarge` above
/// [`DEFAULT_MAX_TEXT_LENGTH`] bytes.
pub fn detect_structure(text: &str) -> Result<StructuralIndex> {
    detect_structure_with_limit(text, DEFAULT_MAX_TEXT_LENGTH)
}

/// [`detect_structure`] with an explicit byte limit
pub fn detect_structure_with_limit(text: &str, max_len: usize) -> Result<StructuralIndex> {
    if text.trim().is_empty() {
        return Err(StructureError::EmptyText);
    }
    if text.len() > max_len {
        return Err(StructureError::TextTooLarge {
            len: text.len(),
            max: max_len,
        });
    }

    let started = Instant::now();
    let layout = Layout::new(text);

    let mut detected: Vec<Detected> = build_headings(&layout);
    detected.extend(
        layout
            .classes
            .iter()
            .filter_map(|class| match class {
                LineClass::TableStart(b) => Some(*b),
                _ => None,
            })
            .map(|b| build_table(&layout, &layout.tables[b])),
    );
    detected.extend(place_items(&layout).into_iter().map(|p| Detected {
        span: p.span,
        kind: ElementKind::ListItem(p.item),
    }));
    detected.extend(build_footnotes(&layout));
    detected.extend(detect_references(text));

    detected.sort_by_key(|d| (d.span.start, Reverse(d.span.end), type_rank(&d.kind)));

    let mut elements: Vec<StructuralElement> = detected
        .into_iter()
        .enumerate()
        .map(|(i, d)| StructuralElement {
            id: ElementId(i),
            span: d.span,
            parent: None,
            children: Vec::new(),
            kind: d.kind,
        })
        .collect();

    link_parents(&mut elements);
    link_footnotes_to_rows(&mut elements);
    bind_reference_targets(&mut elements);

    let index = StructuralIndex::from_elements(
        elements,
        text.len(),
        text.chars().count(),
        layout.lines.len(),
    );
    index
        .check_invariants()
        .map_err(StructureError::Inconsistent)?;

    info!(
        elements = index.len(),
        lines = index.line_count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Structure detected"
    );
    for (ty, n) in index.counts() {
        debug!(kind = ty.as_str(), count = n, "Element count");
    }
    Ok(index)
}

/// Stack sweep over elements sorted by start, longest first
fn link_parents(elements: &mut [StructuralElement]) {
    let mut stack: Vec<usize> = Vec::new();
    for i in 0..elements.len() {
        while let Some(&top) = stack.last() {
            if elements[top].span.contains(&elements[i].span) {
                break;
            }
            stack.pop();
        }
        if let Some(&top) = stack.last() {
            elements[i].parent = Some(ElementId(top));
            elements[top].children.push(ElementId(i));
        }
        stack.push(i);
    }
}

fn link_footnotes_to_rows(elements: &mut [StructuralElement]) {
    let tables: Vec<(ElementId, Vec<Span>, Span)> = elements
        .iter()
        .filter_map(|e| {
            e.as_table()
                .map(|t| (e.id, t.rows.iter().map(|r| r.span).collect(), e.span))
        })
        .collect();

    for element in elements.iter_mut() {
        let ElementKind::Footnote(footnote) = &mut element.kind else {
            continue;
        };
        for link in &mut footnote.links {
            let owner = tables
                .iter()
                .find(|(_, _, span)| span.contains_pos(link.offset));
            if let Some((id, rows, _)) = owner {
                link.table = Some(*id);
                link.row = rows.iter().position(|r| r.contains_pos(link.offset));
            }
        }
    }
}

fn bind_reference_targets(elements: &mut [StructuralElement]) {
    let headings: Vec<(ElementId, Heading)> = elements
        .iter()
        .filter_map(|e| e.as_heading().map(|h| (e.id, h.clone())))
        .collect();
    let borrowed: Vec<(ElementId, &Heading)> = headings.iter().map(|(id, h)| (*id, h)).collect();

    for element in elements.iter_mut() {
        if let ElementKind::Reference(reference) = &mut element.kind {
            reference.target = resolve_label(&reference.label, reference.family, &borrowed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscan_domain::{ReferenceTarget, Resolution};

    #[test]
    fn test_empty_text_is_rejected() {
        assert_eq!(detect_structure("  \n\t"), Err(StructureError::EmptyText));
    }

    #[test]
    fn test_size_limit() {
        assert!(matches!(
            detect_structure_with_limit("abcdef", 3),
            Err(StructureError::TextTooLarge { len: 6, max: 3 })
        ));
    }

    #[test]
    fn test_reference_is_child_of_enclosing_heading() {
        let text = "ARTICLE 1 - Scope\nPenalties are described, see Article 2.\nARTICLE 2 - Penalties\nFive percent.\n";
        let index = detect_structure(text).unwrap();
        let (reference_el, reference) = index.references().next().unwrap();
        let parent = index.get(reference_el.parent.unwrap()).unwrap();
        assert_eq!(parent.as_heading().unwrap().number.as_deref(), Some("1"));
        let ReferenceTarget::Resolved { heading, resolution } = reference.target else {
            panic!("reference should resolve");
        };
        assert_eq!(resolution, Resolution::Exact);
        assert_eq!(
            index.get(heading).unwrap().as_heading().unwrap().title,
            "Penalties"
        );
    }

    #[test]
    fn test_unresolved_reference_is_kept() {
        let text = "ARTICLE 1 - Scope\nsee Article 9 for penalties\n";
        let index = detect_structure(text).unwrap();
        let (_, reference) = index.references().next().unwrap();
        assert_eq!(reference.target, ReferenceTarget::Unresolved);
        assert_eq!(reference.mention, "see Article 9");
    }
}
