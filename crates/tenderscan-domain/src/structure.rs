//! Structural index: an arena of detected elements with index-based links

use crate::span::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of an element inside its [`StructuralIndex`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Element kind without payload, used for counting and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// Section heading
    Heading,
    /// Table block
    Table,
    /// List item
    ListItem,
    /// Footnote definition
    Footnote,
    /// Cross-reference mention
    Reference,
}

impl ElementType {
    /// All element types in canonical order
    pub const ALL: [ElementType; 5] = [
        ElementType::Heading,
        ElementType::Table,
        ElementType::ListItem,
        ElementType::Footnote,
        ElementType::Reference,
    ];

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Heading => "heading",
            ElementType::Table => "table",
            ElementType::ListItem => "list_item",
            ElementType::Footnote => "footnote",
            ElementType::Reference => "reference",
        }
    }
}

/// How a heading line was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadingStyle {
    /// `## Title`
    Markdown,
    /// `PART II`, `CHAPTER 3`, `SECTION 4`, `BÖLÜM IV`
    Part,
    /// `ANNEX A`, `EK-2`
    Annex,
    /// `IV. GENERAL TERMS`
    Roman,
    /// `ARTICLE 8`, `MADDE 8`
    Article,
    /// `3. Delivery Terms`
    Numbered,
    /// `12.3 Penalties`
    Dotted,
    /// `B. Scope`
    Lettered,
}

/// What a reference phrase points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFamily {
    /// Articles, clauses, paragraphs and numbered headings
    Article,
    /// Parts, chapters and sections
    Section,
    /// Annexes and appendices
    Annex,
}

impl HeadingStyle {
    /// Family a reference must name to prefer this heading on ties
    pub fn family(&self) -> Option<ReferenceFamily> {
        match self {
            HeadingStyle::Part | HeadingStyle::Roman => Some(ReferenceFamily::Section),
            HeadingStyle::Annex => Some(ReferenceFamily::Annex),
            HeadingStyle::Article | HeadingStyle::Numbered | HeadingStyle::Dotted => {
                Some(ReferenceFamily::Article)
            }
            HeadingStyle::Markdown | HeadingStyle::Lettered => None,
        }
    }
}

/// Heading payload. The element span covers the whole section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Rank; 1 is outermost
    pub level: u8,
    /// Number or label as written (`8`, `12.3`, `IV`, `A`)
    pub number: Option<String>,
    /// Title text, possibly empty
    pub title: String,
    /// Line form
    pub style: HeadingStyle,
    /// Range of the heading line itself
    pub line: Span,
}

impl Heading {
    /// Number and title joined for display
    pub fn display_text(&self) -> String {
        match (&self.number, self.title.is_empty()) {
            (Some(n), false) => format!("{} {}", n, self.title),
            (Some(n), true) => n.clone(),
            (None, _) => self.title.clone(),
        }
    }
}

/// Delimiter style of a table block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableFormat {
    /// `| a | b |`
    Pipe,
    /// Tab separated
    Tab,
    /// Comma separated with numbers
    Csv,
    /// Columns aligned with runs of spaces
    FixedWidth,
}

/// One physical table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Line range including the trailing newline
    pub span: Span,
    /// Trimmed cell texts
    pub cells: Vec<String>,
    /// Markdown `|---|---|` rule
    pub separator: bool,
}

/// Table payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Delimiter style
    pub format: TableFormat,
    /// Caption line preceding the table, if any
    pub caption: Option<String>,
    /// Rows in source order, separators included
    pub rows: Vec<TableRow>,
    /// Widest row
    pub column_count: usize,
}

impl Table {
    /// First non-separator row
    pub fn header(&self) -> Option<&TableRow> {
        self.rows.iter().find(|r| !r.separator)
    }

    /// Rows after the header, separators excluded
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &TableRow)> {
        let header = self.rows.iter().position(|r| !r.separator);
        self.rows
            .iter()
            .enumerate()
            .filter(move |(i, r)| !r.separator && Some(*i) != header)
    }

    /// Index of the row containing `pos`
    pub fn row_at(&self, pos: usize) -> Option<usize> {
        self.rows.iter().position(|r| r.span.contains_pos(pos))
    }
}

/// Numbering class of a list marker segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerClass {
    /// `1`, `12`
    Numeric,
    /// `a`, `B`
    Letter,
    /// `ii`, `iv`
    Roman,
    /// `-`, `•`
    Bullet,
}

/// List item payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    /// Hierarchical index, e.g. `12.3.4.a.ii`
    pub index: String,
    /// Index segments
    pub path: Vec<String>,
    /// Marker exactly as written
    pub marker: String,
    /// Class of the last segment
    pub class: MarkerClass,
    /// Item text after the marker, continuation lines excluded
    pub text: String,
    /// Item line plus continuation lines
    pub own: Span,
    /// Leading whitespace width
    pub indent: usize,
}

impl ListItem {
    /// Nesting depth, 1 for top-level items
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// One inline occurrence of a footnote marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerLink {
    /// Byte offset of the occurrence
    pub offset: usize,
    /// Table holding the occurrence
    pub table: Option<ElementId>,
    /// Row index within that table
    pub row: Option<usize>,
}

/// Footnote definition payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footnote {
    /// Marker as written: `(*)`, `[2]`, `¹`, or a label such as `Note`
    pub marker: String,
    /// Definition text
    pub body: String,
    /// Labelled note without inline markers
    pub labelled: bool,
    /// Every inline occurrence bound to this definition
    pub links: Vec<MarkerLink>,
}

/// Strength of a reference resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Heading number equals the label
    Exact,
    /// Heading number extends the label
    Partial,
    /// Heading number is the label's first segment
    Parent,
}

impl Resolution {
    /// Confidence attached to this kind of match
    pub fn confidence(&self) -> f64 {
        match self {
            Resolution::Exact => 1.0,
            Resolution::Partial => 0.8,
            Resolution::Parent => 0.6,
        }
    }
}

/// Where a reference points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferenceTarget {
    /// No heading matched; the mention is kept as-is
    Unresolved,
    /// Bound to a heading
    Resolved {
        /// Target heading
        heading: ElementId,
        /// Match strength
        resolution: Resolution,
    },
}

/// Cross-reference payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Mention text exactly as written
    pub mention: String,
    /// Label being referred to (`8`, `12.3`, `III`, `A`)
    pub label: String,
    /// What kind of heading is named
    pub family: ReferenceFamily,
    /// Resolution result
    pub target: ReferenceTarget,
}

impl Reference {
    /// True when the reference found its heading
    pub fn is_resolved(&self) -> bool {
        matches!(self.target, ReferenceTarget::Resolved { .. })
    }
}

/// Typed element payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    /// Section heading
    Heading(Heading),
    /// Table block
    Table(Table),
    /// List item
    ListItem(ListItem),
    /// Footnote definition
    Footnote(Footnote),
    /// Cross-reference mention
    Reference(Reference),
}

impl ElementKind {
    /// Payload-free type tag
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Heading(_) => ElementType::Heading,
            ElementKind::Table(_) => ElementType::Table,
            ElementKind::ListItem(_) => ElementType::ListItem,
            ElementKind::Footnote(_) => ElementType::Footnote,
            ElementKind::Reference(_) => ElementType::Reference,
        }
    }
}

/// A detected element with its range and links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralElement {
    /// Arena position
    pub id: ElementId,
    /// Covered range; sections for headings, descendants included for list items
    pub span: Span,
    /// Innermost containing element
    pub parent: Option<ElementId>,
    /// Directly contained elements in source order
    pub children: Vec<ElementId>,
    /// Typed payload
    pub kind: ElementKind,
}

impl StructuralElement {
    /// Payload-free type tag
    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// Heading payload, if this is a heading
    pub fn as_heading(&self) -> Option<&Heading> {
        match &self.kind {
            ElementKind::Heading(h) => Some(h),
            _ => None,
        }
    }

    /// Table payload, if this is a table
    pub fn as_table(&self) -> Option<&Table> {
        match &self.kind {
            ElementKind::Table(t) => Some(t),
            _ => None,
        }
    }

    /// List item payload, if this is a list item
    pub fn as_list_item(&self) -> Option<&ListItem> {
        match &self.kind {
            ElementKind::ListItem(l) => Some(l),
            _ => None,
        }
    }

    /// Footnote payload, if this is a footnote
    pub fn as_footnote(&self) -> Option<&Footnote> {
        match &self.kind {
            ElementKind::Footnote(f) => Some(f),
            _ => None,
        }
    }

    /// Reference payload, if this is a reference
    pub fn as_reference(&self) -> Option<&Reference> {
        match &self.kind {
            ElementKind::Reference(r) => Some(r),
            _ => None,
        }
    }
}

/// Every detected element of one document.
///
/// Elements are stored in an arena ordered by `(span.start, span.end desc)`
/// and addressed by [`ElementId`]. The index is immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralIndex {
    elements: Vec<StructuralElement>,
    text_len: usize,
    char_count: usize,
    line_count: usize,
    counts: BTreeMap<ElementType, usize>,
}

impl StructuralIndex {
    /// Build an index from elements whose ids equal their arena positions.
    pub fn from_elements(
        elements: Vec<StructuralElement>,
        text_len: usize,
        char_count: usize,
        line_count: usize,
    ) -> Self {
        let mut counts: BTreeMap<ElementType, usize> =
            ElementType::ALL.iter().map(|t| (*t, 0)).collect();
        for element in &elements {
            *counts.entry(element.element_type()).or_default() += 1;
        }
        Self {
            elements,
            text_len,
            char_count,
            line_count,
            counts,
        }
    }

    /// All elements in arena order
    pub fn elements(&self) -> &[StructuralElement] {
        &self.elements
    }

    /// Look up an element
    pub fn get(&self, id: ElementId) -> Option<&StructuralElement> {
        self.elements.get(id.0)
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True when nothing was detected
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Source length in bytes
    pub fn text_len(&self) -> usize {
        self.text_len
    }

    /// Source length in characters
    pub fn char_count(&self) -> usize {
        self.char_count
    }

    /// Number of source lines
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Per-type element counts
    pub fn counts(&self) -> &BTreeMap<ElementType, usize> {
        &self.counts
    }

    /// Elements of one type
    pub fn of_type(&self, ty: ElementType) -> impl Iterator<Item = &StructuralElement> {
        self.elements.iter().filter(move |e| e.element_type() == ty)
    }

    /// Headings with their payloads
    pub fn headings(&self) -> impl Iterator<Item = (&StructuralElement, &Heading)> {
        self.elements
            .iter()
            .filter_map(|e| e.as_heading().map(|h| (e, h)))
    }

    /// Tables with their payloads
    pub fn tables(&self) -> impl Iterator<Item = (&StructuralElement, &Table)> {
        self.elements
            .iter()
            .filter_map(|e| e.as_table().map(|t| (e, t)))
    }

    /// List items with their payloads
    pub fn list_items(&self) -> impl Iterator<Item = (&StructuralElement, &ListItem)> {
        self.elements
            .iter()
            .filter_map(|e| e.as_list_item().map(|l| (e, l)))
    }

    /// Footnotes with their payloads
    pub fn footnotes(&self) -> impl Iterator<Item = (&StructuralElement, &Footnote)> {
        self.elements
            .iter()
            .filter_map(|e| e.as_footnote().map(|f| (e, f)))
    }

    /// References with their payloads
    pub fn references(&self) -> impl Iterator<Item = (&StructuralElement, &Reference)> {
        self.elements
            .iter()
            .filter_map(|e| e.as_reference().map(|r| (e, r)))
    }

    /// Innermost table, list item, footnote or reference containing `pos`.
    ///
    /// Heading sections are not returned; use [`Self::find_nearest_heading`].
    pub fn find_containing_structure(&self, pos: usize) -> Option<&StructuralElement> {
        self.elements
            .iter()
            .filter(|e| e.element_type() != ElementType::Heading && e.span.contains_pos(pos))
            .min_by_key(|e| e.span.len())
    }

    /// Heading whose line starts closest before or at `pos`
    pub fn find_nearest_heading(&self, pos: usize) -> Option<&StructuralElement> {
        self.headings()
            .filter(|(_, h)| h.line.start <= pos)
            .max_by_key(|(_, h)| h.line.start)
            .map(|(e, _)| e)
    }

    /// Innermost heading section containing `pos`
    pub fn enclosing_section(&self, pos: usize) -> Option<&StructuralElement> {
        self.headings()
            .map(|(e, _)| e)
            .filter(|e| e.span.contains_pos(pos))
            .min_by_key(|e| e.span.len())
    }

    /// Walk parent links from `id` upwards, excluding `id` itself
    pub fn ancestors(&self, id: ElementId) -> Vec<&StructuralElement> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(|e| e.parent);
        while let Some(pid) = current {
            match self.get(pid) {
                Some(parent) if !out.iter().any(|e: &&StructuralElement| e.id == pid) => {
                    out.push(parent);
                    current = parent.parent;
                }
                _ => break,
            }
        }
        out
    }

    /// Check the nesting invariants: children lie inside their parent and
    /// siblings never overlap.
    pub fn check_invariants(&self) -> Result<(), String> {
        for element in &self.elements {
            if element.span.end > self.text_len {
                return Err(format!("{} ends past the text", element.id));
            }
            if let Some(pid) = element.parent {
                let parent = self
                    .get(pid)
                    .ok_or_else(|| format!("{} has dangling parent {}", element.id, pid))?;
                if !parent.span.contains(&element.span) {
                    return Err(format!("{} escapes its parent {}", element.id, pid));
                }
            }
        }

        let mut siblings: BTreeMap<Option<ElementId>, Vec<Span>> = BTreeMap::new();
        for element in &self.elements {
            siblings.entry(element.parent).or_default().push(element.span);
        }
        for (parent, mut spans) in siblings {
            spans.sort();
            for pair in spans.windows(2) {
                if pair[0].intersects(&pair[1]) {
                    return Err(format!(
                        "siblings under {:?} overlap at {} and {}",
                        parent, pair[0], pair[1]
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(id: usize, span: Span, line: Span, number: &str) -> StructuralElement {
        StructuralElement {
            id: ElementId(id),
            span,
            parent: None,
            children: vec![],
            kind: ElementKind::Heading(Heading {
                level: 1,
                number: Some(number.to_string()),
                title: "Title".to_string(),
                style: HeadingStyle::Article,
                line,
            }),
        }
    }

    fn sample() -> StructuralIndex {
        let mut h1 = heading(0, Span::new(0, 100), Span::new(0, 10), "1");
        h1.children = vec![ElementId(1)];
        let table = StructuralElement {
            id: ElementId(1),
            span: Span::new(20, 60),
            parent: Some(ElementId(0)),
            children: vec![],
            kind: ElementKind::Table(Table {
                format: TableFormat::Pipe,
                caption: None,
                rows: vec![
                    TableRow {
                        span: Span::new(20, 40),
                        cells: vec!["a".into()],
                        separator: false,
                    },
                    TableRow {
                        span: Span::new(40, 60),
                        cells: vec!["b".into()],
                        separator: false,
                    },
                ],
                column_count: 1,
            }),
        };
        let h2 = heading(2, Span::new(100, 150), Span::new(100, 110), "2");
        StructuralIndex::from_elements(vec![h1, table, h2], 150, 150, 8)
    }

    #[test]
    fn test_find_containing_structure_skips_sections() {
        let index = sample();
        assert_eq!(index.find_containing_structure(45).map(|e| e.id), Some(ElementId(1)));
        assert!(index.find_containing_structure(5).is_none());
    }

    #[test]
    fn test_find_nearest_heading() {
        let index = sample();
        assert_eq!(index.find_nearest_heading(50).map(|e| e.id), Some(ElementId(0)));
        assert_eq!(index.find_nearest_heading(120).map(|e| e.id), Some(ElementId(2)));
        assert_eq!(index.find_nearest_heading(100).map(|e| e.id), Some(ElementId(2)));
    }

    #[test]
    fn test_counts_include_zero_types() {
        let index = sample();
        assert_eq!(index.counts()[&ElementType::Heading], 2);
        assert_eq!(index.counts()[&ElementType::Footnote], 0);
    }

    #[test]
    fn test_invariants_hold_and_detect_escape() {
        let index = sample();
        assert!(index.check_invariants().is_ok());
        assert_eq!(index.ancestors(ElementId(1)).len(), 1);

        let mut elements = index.elements().to_vec();
        elements[1].span = Span::new(20, 120);
        let broken = StructuralIndex::from_elements(elements, 150, 150, 8);
        assert!(broken.check_invariants().is_err());
    }

    #[test]
    fn test_table_rows_and_header() {
        let index = sample();
        let (_, table) = index.tables().next().unwrap();
        assert_eq!(table.header().unwrap().cells, vec!["a"]);
        assert_eq!(table.data_rows().count(), 1);
        assert_eq!(table.row_at(45), Some(1));
    }
}
