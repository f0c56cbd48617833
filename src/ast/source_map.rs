//! Line index over a program's text, used to quote source in diagnostics.

use super::Span;

/// Borrowed view of one source text, split into lines.
pub struct SourceMap<'a> {
    source: &'a str,
    /// Byte range of each line, terminator excluded.
    lines: Vec<(usize, usize)>,
}

impl<'a> SourceMap<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut start = 0;
        for piece in source.split_inclusive('\n') {
            let body = piece.trim_end_matches('\n').trim_end_matches('\r');
            lines.push((start, start + body.len()));
            start += piece.len();
        }
        if source.is_empty() || source.ends_with('\n') {
            lines.push((start, start));
        }
        SourceMap { source, lines }
    }

    /// Text of a 1-based line; empty when out of range.
    pub fn line(&self, line: usize) -> &'a str {
        line.checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map_or("", |&(start, end)| &self.source[start..end])
    }

    /// 1-based line and column of a byte offset. Columns count characters.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let idx = self.lines.partition_point(|&(start, _)| start <= offset).saturating_sub(1);
        let (start, end) = self.lines.get(idx).copied().unwrap_or_default();
        let prefix = self.source.get(start..offset.clamp(start, end)).unwrap_or("");
        (idx + 1, prefix.chars().count() + 1)
    }

    /// A span over `start..end`, positioned at `start`.
    pub fn span(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.position(start);
        Span::new(start, end, line, column)
    }

    /// First line of the text a span covers; `None` for spans without byte offsets.
    pub fn snippet(&self, span: Span) -> Option<&'a str> {
        if span.end <= span.start {
            return None;
        }
        self.source.get(span.start..span.end)?.lines().next()
    }
}
