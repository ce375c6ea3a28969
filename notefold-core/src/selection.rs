//! Selection model: what the user chose to move

use ropey::Rope;

use crate::metadata::Pos;

/// Represents a linewise selection in the document
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineSelection {
    pub anchor: usize,
    pub cursor: usize,
}

impl LineSelection {
    /// Create a new selection at a single line
    pub fn new(line: usize) -> Self {
        Self {
            anchor: line,
            cursor: line,
        }
    }

    /// Get the selection range as (min, max) inclusive
    pub fn range(&self) -> (usize, usize) {
        let a = self.anchor.min(self.cursor);
        let b = self.anchor.max(self.cursor);
        (a, b)
    }

    /// Byte span covering the selected lines, trailing newline of the last line excluded.
    pub fn to_pos(&self, rope: &Rope) -> Pos {
        let line_count = rope.len_lines();
        let (first, last) = self.range();
        let first = first.min(line_count.saturating_sub(1));
        let last = last.min(line_count.saturating_sub(1));

        let start = rope.line_to_byte(first);
        let mut end = rope.line_to_byte(last + 1);
        let line = rope.line(last);
        let line_len = line.len_bytes();
        if line_len > 0 && line.char(line.len_chars() - 1) == '\n' {
            end -= 1;
        }
        Pos::new(start, end.max(start))
    }
}

/// An ordered set of disjoint byte ranges within a source document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    ranges: Vec<Pos>,
}

impl Selection {
    /// Normalize arbitrary ranges: each pair sorted, list sorted by start,
    /// overlapping or touching ranges coalesced.
    pub fn new(ranges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut spans: Vec<Pos> = ranges
            .into_iter()
            .map(|(a, b)| Pos::new(a.min(b), a.max(b)))
            .collect();
        spans.sort_by_key(|p| (p.start, p.end));

        let mut ranges: Vec<Pos> = Vec::with_capacity(spans.len());
        for span in spans {
            match ranges.last_mut() {
                Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
                _ => ranges.push(span),
            }
        }
        Self { ranges }
    }

    /// Selection spanning a whole document of `len` bytes.
    pub fn whole(len: usize) -> Self {
        Self {
            ranges: vec![Pos::new(0, len)],
        }
    }

    pub fn ranges(&self) -> &[Pos] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.iter().all(|r| r.start == r.end)
    }

    /// True if `pos` lies entirely inside one of the ranges.
    pub fn contains(&self, pos: Pos) -> bool {
        self.ranges
            .iter()
            .any(|r| r.start <= pos.start && pos.end <= r.end)
    }

    /// True if `pos` shares at least one byte with one of the ranges.
    pub fn intersects(&self, pos: Pos) -> bool {
        self.ranges
            .iter()
            .any(|r| pos.start < r.end && r.start < pos.end)
    }

    /// Drop the parts of the selection that fall outside a text of `len` bytes.
    pub fn clamp(&self, len: usize) -> Self {
        Self::new(
            self.ranges
                .iter()
                .filter(|r| r.start < len || (r.start == len && r.end == len))
                .map(|r| (r.start, r.end.min(len))),
        )
    }

    /// Selected text, multiple ranges joined by a single newline.
    pub fn extract(&self, text: &str) -> String {
        self.ranges
            .iter()
            .filter_map(|r| text.get(r.start..r.end))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_forward_selection() {
        let sel = LineSelection {
            anchor: 5,
            cursor: 10,
        };
        assert_eq!(sel.range(), (5, 10));
    }

    #[test]
    fn test_range_backward_selection() {
        let sel = LineSelection {
            anchor: 10,
            cursor: 5,
        };
        assert_eq!(sel.range(), (5, 10));
    }

    #[test]
    fn test_line_selection_to_pos() {
        let rope = Rope::from_str("one\ntwo\nthree\n");
        let pos = LineSelection { anchor: 2, cursor: 1 }.to_pos(&rope);
        assert_eq!(pos, Pos::new(4, 13));
        assert_eq!(&"one\ntwo\nthree\n"[pos.start..pos.end], "two\nthree");
    }

    #[test]
    fn test_line_selection_last_line_without_newline() {
        let rope = Rope::from_str("one\ntwo");
        let pos = LineSelection::new(1).to_pos(&rope);
        assert_eq!(pos, Pos::new(4, 7));
    }

    #[test]
    fn normalizes_and_coalesces() {
        let sel = Selection::new([(20, 10), (0, 4), (3, 6)]);
        assert_eq!(sel.ranges(), &[Pos::new(0, 6), Pos::new(10, 20)]);
    }

    #[test]
    fn containment_is_full_containment() {
        let sel = Selection::new([(5, 15)]);
        assert!(sel.contains(Pos::new(5, 15)));
        assert!(sel.contains(Pos::new(6, 10)));
        assert!(!sel.contains(Pos::new(4, 10)));
        assert!(!sel.contains(Pos::new(10, 16)));
        assert!(sel.intersects(Pos::new(10, 16)));
        assert!(!sel.intersects(Pos::new(15, 20)));
    }

    #[test]
    fn extract_joins_ranges() {
        let text = "alpha beta gamma";
        let sel = Selection::new([(11, 16), (0, 5)]);
        assert_eq!(sel.extract(text), "alpha\ngamma");
    }

    #[test]
    fn whole_and_empty() {
        assert!(Selection::new([(3, 3)]).is_empty());
        let sel = Selection::whole(4);
        assert!(!sel.is_empty());
        assert_eq!(sel.extract("text"), "text");
    }

    #[test]
    fn clamp_drops_out_of_range() {
        let sel = Selection::new([(0, 2), (8, 20)]).clamp(10);
        assert_eq!(sel.ranges(), &[Pos::new(0, 2), Pos::new(8, 10)]);
    }
}
