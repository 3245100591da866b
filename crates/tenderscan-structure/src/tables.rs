//! Table row recognition

use crate::layout::{Layout, LineClass};
use crate::Detected;
use regex::Regex;
use std::sync::LazyLock;
use tenderscan_domain::normalize::canonical_number;
use tenderscan_domain::{ElementKind, Span, Table, TableFormat, TableRow};

static COLUMN_GAP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|?(\s*:?-{2,}:?\s*\|)+\s*:?-{0,}:?\s*\|?$").unwrap());

static CAPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:table|tablo|çizelge|schedule|cetvel)\s*[\w.\-]*\b").unwrap()
});

/// Minimum rows, separators excluded, for a run of lines to be a table
pub(crate) const MIN_TABLE_ROWS: usize = 2;

/// Delimiter style of a single line, if it looks like a table row
pub(crate) fn row_format(content: &str) -> Option<TableFormat> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.matches('|').count() >= 2 {
        return Some(TableFormat::Pipe);
    }
    if content.matches('\t').count() >= 2 {
        return Some(TableFormat::Tab);
    }
    if trimmed.matches(',').count() >= 3 && trimmed.chars().any(|c| c.is_ascii_digit()) {
        return Some(TableFormat::Csv);
    }
    let segments: Vec<&str> = COLUMN_GAP.split(trimmed).collect();
    if segments.len() >= 3
        && segments
            .iter()
            .filter(|s| canonical_number(s).is_some())
            .count()
            >= 2
    {
        return Some(TableFormat::FixedWidth);
    }
    None
}

/// Markdown rule row such as `|---|:--:|`
pub(crate) fn is_separator(content: &str) -> bool {
    SEPARATOR.is_match(content.trim())
}

/// Split a row into trimmed cells
pub(crate) fn split_cells(content: &str, format: TableFormat) -> Vec<String> {
    let trimmed = content.trim();
    let cells: Vec<&str> = match format {
        TableFormat::Pipe => {
            let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
            let inner = inner.strip_suffix('|').unwrap_or(inner);
            inner.split('|').collect()
        }
        TableFormat::Tab => content.trim_matches(['\r', '\n']).split('\t').collect(),
        TableFormat::Csv => trimmed.split(',').collect(),
        TableFormat::FixedWidth => COLUMN_GAP.split(trimmed).collect(),
    };
    cells.into_iter().map(|c| c.trim().to_string()).collect()
}

/// Caption text if `content` reads like a table caption
pub(crate) fn caption_of(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 100 {
        return None;
    }
    if CAPTION.is_match(trimmed) || trimmed.ends_with(':') {
        Some(trimmed.to_string())
    } else {
        None
    }
}

/// A run of table lines found during layout
#[derive(Debug, Clone)]
pub(crate) struct TableBlock {
    /// First line index
    pub first: usize,
    /// Last line index, inclusive
    pub last: usize,
    /// Delimiter style shared by all rows
    pub format: TableFormat,
}

/// Find runs of consecutive lines sharing a table format
pub(crate) fn find_blocks(contents: &[&str]) -> Vec<TableBlock> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < contents.len() {
        let Some(format) = row_format(contents[i]) else {
            i += 1;
            continue;
        };
        let mut j = i;
        let mut rows = 0;
        while j < contents.len() && row_format(contents[j]) == Some(format) {
            if !(format == TableFormat::Pipe && is_separator(contents[j])) {
                rows += 1;
            }
            j += 1;
        }
        if rows >= MIN_TABLE_ROWS {
            blocks.push(TableBlock {
                first: i,
                last: j - 1,
                format,
            });
        }
        i = j;
    }
    blocks
}

/// Build the element for a table block
pub(crate) fn build_table(layout: &Layout<'_>, block: &TableBlock) -> Detected {
    let lines = &layout.lines[block.first..=block.last];
    let rows: Vec<TableRow> = lines
        .iter()
        .map(|line| {
            let separator = block.format == TableFormat::Pipe && is_separator(line.content);
            TableRow {
                span: line.span(),
                cells: if separator {
                    Vec::new()
                } else {
                    split_cells(line.content, block.format)
                },
                separator,
            }
        })
        .collect();
    let column_count = rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);

    let caption = layout.lines[..block.first]
        .iter()
        .rev()
        .take(2)
        .find(|l| !l.is_blank())
        .and_then(|l| caption_of(l.content));

    Detected {
        span: Span::new(lines[0].start, lines[lines.len() - 1].end),
        kind: ElementKind::Table(Table {
            format: block.format,
            caption,
            rows,
            column_count,
        }),
    }
}

/// Detect table blocks
pub fn detect_tables(text: &str) -> Vec<Detected> {
    let layout = Layout::new(text);
    layout
        .classes
        .iter()
        .enumerate()
        .filter_map(|(i, class)| match class {
            LineClass::TableStart(b) => Some((i, *b)),
            _ => None,
        })
        .map(|(_, b)| build_table(&layout, &layout.tables[b]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_formats() {
        assert_eq!(row_format("| Item | Price |"), Some(TableFormat::Pipe));
        assert_eq!(row_format("Item\tQty\tPrice"), Some(TableFormat::Tab));
        assert_eq!(row_format("Bread,kg,100,12.50"), Some(TableFormat::Csv));
        assert_eq!(row_format("Bread     100     12,50"), Some(TableFormat::FixedWidth));
        assert_eq!(row_format("Plain prose, with commas, and more, words"), None);
        assert_eq!(row_format("Just a sentence."), None);
    }

    #[test]
    fn test_separator_and_cells() {
        assert!(is_separator("|------|:----:|"));
        assert!(is_separator("| --- | --- |"));
        assert!(!is_separator("| Bread | 12 |"));
        assert_eq!(
            split_cells("| Bread (*) |  12,50 |", TableFormat::Pipe),
            vec!["Bread (*)", "12,50"]
        );
    }

    #[test]
    fn test_single_row_is_not_a_table() {
        let text = "Intro\n| only | row |\nAfter\n";
        assert!(detect_tables(text).is_empty());
    }

    #[test]
    fn test_detect_pipe_table_with_caption() {
        let text = "Table 1: Unit prices\n| Item | Price |\n|---|---|\n| Bread | 12 |\n| Milk | 9 |\n\nAfter.\n";
        let tables = detect_tables(text);
        assert_eq!(tables.len(), 1);
        let ElementKind::Table(table) = &tables[0].kind else {
            panic!("expected table");
        };
        assert_eq!(table.caption.as_deref(), Some("Table 1: Unit prices"));
        assert_eq!(table.rows.len(), 4);
        assert!(table.rows[1].separator);
        assert_eq!(table.column_count, 2);
        assert_eq!(table.data_rows().count(), 2);
        let start = text.find("| Item").unwrap();
        let end = text.find("\nAfter").unwrap();
        assert_eq!(tables[0].span, Span::new(start, end));
    }
}
