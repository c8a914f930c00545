//! One side of a stroke outline under construction.
//!
//! Grounded on the teacher's `vcgen_stroke.rs` (`VertexSequence` +
//! two-pass "pre_stroke"/"post_stroke" emission model), simplified to
//! the push/reverse/append primitives spec.md §3 names for
//! `StrokeBorder` (`points`, `tags`, `start`, `movable`).

use crate::fixed::Point;

/// One of the two borders the stroker builds per sub-path; together
/// they tile the stroked region (spec.md §4.4).
#[derive(Debug, Clone, Default)]
pub struct StrokeBorder {
    pub points: Vec<Point>,
    /// Index of the current sub-path's start point in `points`, or
    /// `-1` when no sub-path is open.
    pub start: i32,
    /// True only when the last emitted point came from a straight
    /// line-to and may be rewritten (rather than appended to) by a
    /// degenerate follow-up segment.
    pub movable: bool,
}

impl StrokeBorder {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            start: -1,
            movable: false,
        }
    }

    pub fn begin(&mut self) {
        self.start = self.points.len() as i32;
    }

    pub fn push(&mut self, p: Point) {
        self.points.push(p);
        self.movable = false;
    }

    /// Push `p`, marking it as movable so a subsequent degenerate
    /// segment can rewrite it in place via [`Self::rewrite_last`]
    /// instead of appending a near-duplicate point.
    pub fn push_movable(&mut self, p: Point) {
        self.points.push(p);
        self.movable = true;
    }

    pub fn rewrite_last(&mut self, p: Point) -> bool {
        if self.movable {
            if let Some(last) = self.points.last_mut() {
                *last = p;
                return true;
            }
        }
        false
    }

    pub fn is_open(&self) -> bool {
        self.start >= 0
    }

    pub fn close(&mut self) {
        self.start = -1;
        self.movable = false;
    }

    /// Reverse the points belonging to the currently open sub-path (or
    /// the whole buffer if `from` is `0`) in place — used when an
    /// opened sub-path's end cap needs the left border traced in the
    /// opposite direction before splicing it into the right border
    /// (spec.md §4.4 `end_sub_path`, opened case).
    pub fn reverse_from(&mut self, from: usize) {
        self.points[from..].reverse();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
