//! Physical lines with byte offsets

use tenderscan_domain::Span;

/// One source line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line<'a> {
    /// Offset of the first byte
    pub start: usize,
    /// Offset past the trailing newline, if any
    pub end: usize,
    /// Line text without `\n` or `\r\n`
    pub content: &'a str,
}

impl<'a> Line<'a> {
    /// Range including the newline
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    /// Whitespace-only line
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Leading whitespace width, tabs counted as four
    pub fn indent(&self) -> usize {
        self.content
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum()
    }

    /// Byte offset of the first non-whitespace character
    pub fn content_start(&self) -> usize {
        self.start + (self.content.len() - self.content.trim_start().len())
    }
}

/// Split text into lines; the spans tile the text exactly
pub(crate) fn split_lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut offset = 0;
    for raw in text.split_inclusive('\n') {
        let content = raw
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or(raw);
        out.push(Line {
            start: offset,
            end: offset + raw.len(),
            content,
        });
        offset += raw.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_tile_text() {
        let text = "a\r\nbb\n\nccc";
        let lines = split_lines(text);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].content, "a");
        assert_eq!(lines[0].span(), Span::new(0, 3));
        assert_eq!(lines[2].content, "");
        assert!(lines[2].is_blank());
        assert_eq!(lines[3].end, text.len());
    }

    #[test]
    fn test_indent_and_content_start() {
        let lines = split_lines("  \t- item\n");
        assert_eq!(lines[0].indent(), 6);
        assert_eq!(lines[0].content_start(), 3);
    }
}
