//! Spatial queries over detected text lines.
//!
//! Lines are kept in reading order (top to bottom, then left to right).
//! Right-to-left scripts are not handled specially.

use ekyc_types::geometry::boxes_align;
use ekyc_types::{BoundingBox, TextLine};
use regex::Regex;

#[derive(Debug, Clone, Default)]
pub struct TextLineIndex {
    lines: Vec<TextLine>,
}

impl TextLineIndex {
    /// Drops lines below `min_confidence` and orders the rest.
    pub fn new(lines: Vec<TextLine>, min_confidence: f32) -> Self {
        let mut lines: Vec<TextLine> = lines
            .into_iter()
            .filter(|line| line.confidence >= min_confidence)
            .collect();
        sort_top_left(&mut lines);
        Self { lines }
    }

    pub fn lines_ordered_top_left(&self) -> &[TextLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextLine> {
        self.lines.iter()
    }

    /// Lines whose box aligns with `anchor` within `max_delta`.
    pub fn lines_near(&self, anchor: &BoundingBox, max_delta: f32) -> Vec<&TextLine> {
        self.lines
            .iter()
            .filter(|line| boxes_align(anchor, &line.bounding_box, max_delta))
            .collect()
    }

    /// Lines strictly below `y` starting left of `left_bound`.
    pub fn lines_below(&self, y: f32, left_bound: f32) -> Vec<&TextLine> {
        self.lines
            .iter()
            .filter(|line| line.bounding_box.top > y && line.bounding_box.left < left_bound)
            .collect()
    }

    pub fn first_matching_regex(&self, pattern: &Regex) -> Option<&TextLine> {
        first_matching_regex(&self.lines, pattern)
    }

    /// First line whose trimmed text equals `label`, ignoring case.
    pub fn find_text(&self, label: &str) -> Option<&TextLine> {
        self.lines
            .iter()
            .find(|line| line.text.trim().eq_ignore_ascii_case(label.trim()))
    }

    pub fn first_starting_with(&self, prefix: &str) -> Option<&TextLine> {
        self.lines
            .iter()
            .find(|line| starts_with_ignore_case(line.text.trim(), prefix))
    }
}

/// First line, in iteration order, whose trimmed text matches `pattern`.
/// Build `pattern` with [`anchored`] to require a full match.
pub fn first_matching_regex<'a>(
    lines: impl IntoIterator<Item = &'a TextLine>,
    pattern: &Regex,
) -> Option<&'a TextLine> {
    lines
        .into_iter()
        .find(|line| pattern.is_match(line.text.trim()))
}

/// Compiles `pattern` so that it only matches whole strings.
pub fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

pub fn sort_top_left(lines: &mut [TextLine]) {
    lines.sort_by(|a, b| {
        a.bounding_box
            .top
            .total_cmp(&b.bounding_box.top)
            .then(a.bounding_box.left.total_cmp(&b.bounding_box.left))
    });
}

pub(crate) fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn line(text: &str, top: f32, left: f32) -> TextLine {
        TextLine::new(text, BoundingBox::new(top, left, 0.2, 0.04))
    }

    #[test]
    fn low_confidence_lines_are_dropped() {
        let index = TextLineIndex::new(
            vec![
                line("keep", 0.1, 0.1).with_confidence(99.0),
                line("drop", 0.2, 0.1).with_confidence(40.0),
            ],
            70.0,
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.lines_ordered_top_left()[0].text, "keep");
    }

    #[test]
    fn lines_are_ordered_top_then_left() {
        let index = TextLineIndex::new(
            vec![line("c", 0.5, 0.1), line("b", 0.1, 0.6), line("a", 0.1, 0.2)],
            0.0,
        );
        let texts: Vec<&str> = index.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["a", "b", "c"]);
    }

    #[test]
    fn lines_below_is_strict_and_bounded() {
        let index = TextLineIndex::new(
            vec![line("same", 0.3, 0.1), line("below", 0.4, 0.1), line("right", 0.5, 0.7)],
            0.0,
        );
        let below: Vec<&str> = index
            .lines_below(0.3, 0.25)
            .into_iter()
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(below, ["below"]);
    }

    #[test]
    fn lines_near_uses_alignment_tolerance() {
        let index = TextLineIndex::new(vec![line("near", 0.32, 0.11), line("far", 0.6, 0.11)], 0.0);
        let anchor = BoundingBox::new(0.3, 0.1, 0.3, 0.05);
        let near = index.lines_near(&anchor, 0.05);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].text, "near");
    }

    #[test]
    fn anchored_patterns_require_full_match() {
        let pattern = anchored(r"\d{9}").unwrap();
        let index = TextLineIndex::new(
            vec![line("ID 123456789", 0.1, 0.1), line(" 123456789 ", 0.2, 0.1)],
            0.0,
        );
        let found = index.first_matching_regex(&pattern).unwrap();
        assert_eq!(found.bounding_box.top, 0.2);
    }

    #[test]
    fn prefix_matching_ignores_case_and_short_text() {
        assert!(starts_with_ignore_case("NAME Somchai", "name"));
        assert!(!starts_with_ignore_case("Na", "Name"));
        assert!(!starts_with_ignore_case("นาย", "Name"));
    }

    proptest! {
        #[test]
        fn ordering_is_sorted_for_any_input(
            coords in prop::collection::vec((0.0f32..1.0, 0.0f32..1.0), 0..40)
        ) {
            let lines = coords
                .iter()
                .enumerate()
                .map(|(i, (top, left))| line(&i.to_string(), *top, *left))
                .collect();
            let index = TextLineIndex::new(lines, 0.0);
            let ordered = index.lines_ordered_top_left();
            for pair in ordered.windows(2) {
                let (a, b) = (&pair[0].bounding_box, &pair[1].bounding_box);
                prop_assert!(a.top < b.top || (a.top == b.top && a.left <= b.left));
            }
        }
    }
}
