use crate::layout::GraphRow;
use std::cmp::Ordering;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Display width of a string in terminal columns
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Truncate to `max_width` columns without splitting a grapheme, marking
/// the cut with an ellipsis
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    if display_width(text) <= max_width {
        return text.to_string();
    }
    if max_width == 0 {
        return String::new();
    }

    let budget = max_width - 1;
    let mut result = String::new();
    let mut used = 0;
    for grapheme in text.graphemes(true) {
        let width = UnicodeWidthStr::width(grapheme);
        if used + width > budget {
            break;
        }
        result.push_str(grapheme);
        used += width;
    }
    result.push('…');
    result
}

/// ASCII drawing of one row: the line holding the commit, plus a second
/// line when edges fan out to other lanes.
///
/// Lane `i` is drawn in column `2 * i`; diagonals sit in the odd columns
/// between two lanes.
pub fn graph_lines(row: &GraphRow) -> (String, Option<String>) {
    let columns = 2 * row.width.max(row.lane + 1);
    let mut node = vec![' '; columns];
    let mut below = vec![' '; columns];
    let mut fans_out = false;

    for segment in row.segments() {
        let (from, to) = (segment.from, segment.to);
        match (segment.upper, from.cmp(&to)) {
            (true, Ordering::Equal) => node[2 * from] = '|',
            (true, Ordering::Greater) => node[2 * from - 1] = '/',
            (true, Ordering::Less) => node[2 * from + 1] = '\\',
            (false, Ordering::Equal) => below[2 * from] = '|',
            (false, Ordering::Less) => {
                below[2 * to - 1] = '\\';
                fans_out = true;
            }
            (false, Ordering::Greater) => {
                below[2 * to + 1] = '/';
                fans_out = true;
            }
        }
    }
    node[2 * row.lane] = '*';

    let collect = |cells: Vec<char>| cells.into_iter().collect::<String>().trim_end().to_string();
    let below = fans_out.then(|| collect(below));
    (collect(node), below)
}

/// Plain text history listing, one commit per line
#[derive(Debug, Clone)]
pub struct TextRenderer {
    subject_width: usize,
}

impl TextRenderer {
    pub fn new(subject_width: usize) -> Self {
        Self { subject_width }
    }

    /// Lines for one row, with the graph padded to `graph_columns`
    pub fn render_row(&self, row: &GraphRow, graph_columns: usize, refs: &[String]) -> Vec<String> {
        let (node, below) = graph_lines(row);
        let subject = truncate_to_width(&row.record.subject, self.subject_width);

        let mut line = format!("{:<width$} {}", node, row.record.id.short(), width = graph_columns);
        if !refs.is_empty() {
            line.push_str(&format!(" ({})", refs.join(", ")));
        }
        line.push(' ');
        line.push_str(&subject);

        let mut lines = vec![line];
        lines.extend(below);
        lines
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new(72)
    }
}
