//! Line classification shared by every detector
//!
//! Each line gets exactly one class. Precedence: table row, heading,
//! footnote definition, list item, then plain text or blank.

use crate::footnotes::{inline_occurrences, match_definition, FootnoteMatch};
use crate::headings::{match_heading, HeadingMatch};
use crate::lines::{split_lines, Line};
use crate::lists::{match_list_item, ListMatch};
use crate::tables::{find_blocks, TableBlock};

/// Class of one line
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineClass {
    Blank,
    /// First row of table block `n`
    TableStart(usize),
    /// Later row of table block `n`
    TableRow(usize),
    Heading(HeadingMatch),
    Footnote(FootnoteMatch),
    ListItem(ListMatch),
    Text,
}

/// Classified lines of one document
#[derive(Debug, Clone)]
pub(crate) struct Layout<'a> {
    pub text: &'a str,
    pub lines: Vec<Line<'a>>,
    pub classes: Vec<LineClass>,
    pub tables: Vec<TableBlock>,
}

impl<'a> Layout<'a> {
    pub fn new(text: &'a str) -> Self {
        let lines = split_lines(text);
        let contents: Vec<&str> = lines.iter().map(|l| l.content).collect();
        let tables = find_blocks(&contents);

        let mut classes: Vec<Option<LineClass>> = vec![None; lines.len()];
        for (b, block) in tables.iter().enumerate() {
            classes[block.first] = Some(LineClass::TableStart(b));
            for class in &mut classes[block.first + 1..=block.last] {
                *class = Some(LineClass::TableRow(b));
            }
        }

        let classes = classes
            .into_iter()
            .zip(&lines)
            .map(|(class, line)| class.unwrap_or_else(|| classify(text, &lines, line)))
            .collect();

        Self {
            text,
            lines,
            classes,
            tables,
        }
    }
}

fn classify(text: &str, lines: &[Line<'_>], line: &Line<'_>) -> LineClass {
    if line.is_blank() {
        return LineClass::Blank;
    }
    if let Some(h) = match_heading(line.content) {
        return LineClass::Heading(h);
    }
    if let Some(f) = match_definition(line.content) {
        if !f.needs_inline_marker || !inline_occurrences(text, lines, &f.marker).is_empty() {
            return LineClass::Footnote(f);
        }
    }
    if let Some(l) = match_list_item(line.content) {
        return LineClass::ListItem(l);
    }
    LineClass::Text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let text = "ARTICLE 1 - Scope\n| a | b |\n| 1 | 2 |\n(*) Note text\na) item\nprose\n\n";
        let layout = Layout::new(text);
        assert!(matches!(layout.classes[0], LineClass::Heading(_)));
        assert_eq!(layout.classes[1], LineClass::TableStart(0));
        assert_eq!(layout.classes[2], LineClass::TableRow(0));
        assert!(matches!(layout.classes[3], LineClass::Footnote(_)));
        assert!(matches!(layout.classes[4], LineClass::ListItem(_)));
        assert_eq!(layout.classes[5], LineClass::Text);
        assert_eq!(layout.classes[6], LineClass::Blank);
    }

    #[test]
    fn test_parenthetical_falls_back_to_list() {
        let layout = Layout::new("(1) first duty\n(2) second duty\n");
        assert!(matches!(layout.classes[0], LineClass::ListItem(_)));
    }
}
