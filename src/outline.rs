//! Canonical path representation shared by the stroker and rasterizer.
//!
//! Grounded on the teacher's `path_storage.rs` (parallel vertex/command
//! arrays, a growable builder with `move_to`/`line_to`/`cubic_to`), cut
//! down to exactly the shape spec.md §3 names: two points-per-cubic tags
//! instead of AGG's general path-command byte, and an explicit
//! `contours` end-index array instead of AGG's `move_to` sentinel
//! command embedded in the vertex stream.

use crate::fixed::Point;

/// Tag for one entry in `Outline::tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointTag {
    On,
    CubicControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

/// Axis-aligned bounding box in Q26.6. Empty iff `min == max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn empty() -> Self {
        Self {
            min: Point::new(0, 0),
            max: Point::new(0, 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min == self.max
    }

    pub fn from_point(p: Point) -> Self {
        Self { min: p, max: p }
    }

    pub fn extend(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn intersect(&self, other: &BBox) -> BBox {
        BBox {
            min: Point::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: Point::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        }
    }
}

/// The path representation both the stroker and the rasterizer consume.
///
/// Invariants (spec.md §3): every contour has >= 1 point; a contour may
/// not begin with `CubicControl`; a `CubicControl` tag is always
/// followed by another `CubicControl` then an `On` (two controls + end
/// point per cubic); `contours` is strictly increasing.
#[derive(Debug, Clone, Default)]
pub struct Outline {
    pub points: Vec<Point>,
    pub tags: Vec<PointTag>,
    pub contours: Vec<u32>,
    pub fill_rule: FillRule,
    pub opened: bool,
}

impl Default for FillRule {
    fn default() -> Self {
        FillRule::NonZero
    }
}

impl Outline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all contents but keep the backing storage's capacity —
    /// this is what the memory pool calls between jobs (spec.md §4.2).
    pub fn clear(&mut self) {
        self.points.clear();
        self.tags.clear();
        self.contours.clear();
        self.fill_rule = FillRule::NonZero;
        self.opened = false;
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Start a new contour at `p`. Callers must `close()` the previous
    /// contour (if any) before calling `move_to` again.
    pub fn move_to(&mut self, p: Point) {
        self.points.push(p);
        self.tags.push(PointTag::On);
    }

    /// Append a straight segment to `p`.
    pub fn line_to(&mut self, p: Point) {
        self.points.push(p);
        self.tags.push(PointTag::On);
    }

    /// Append a cubic Bezier segment with the two control points `c1`,
    /// `c2` and end point `p`.
    pub fn cubic_to(&mut self, c1: Point, c2: Point, p: Point) {
        self.points.push(c1);
        self.tags.push(PointTag::CubicControl);
        self.points.push(c2);
        self.tags.push(PointTag::CubicControl);
        self.points.push(p);
        self.tags.push(PointTag::On);
    }

    /// Terminate the current contour at the last pushed point.
    pub fn close(&mut self) {
        if !self.points.is_empty() {
            self.contours.push((self.points.len() - 1) as u32);
        }
    }

    /// Start index (inclusive) of contour `i`.
    pub fn contour_start(&self, i: usize) -> usize {
        if i == 0 {
            0
        } else {
            self.contours[i - 1] as usize + 1
        }
    }

    /// End index (inclusive) of contour `i`.
    pub fn contour_end(&self, i: usize) -> usize {
        self.contours[i] as usize
    }

    pub fn num_contours(&self) -> usize {
        self.contours.len()
    }

    /// Validate the structural invariants spec.md §3 requires. Returns
    /// `false` for an outline whose first tag in any contour is
    /// `CubicControl` (rejected per spec.md §7 `InvalidArguments`), or
    /// whose `contours` indices are not strictly increasing.
    pub fn is_well_formed(&self) -> bool {
        if self.points.len() != self.tags.len() {
            return false;
        }
        let mut prev_end: i64 = -1;
        for &end in &self.contours {
            let end = end as i64;
            if end <= prev_end {
                return false;
            }
            let start = (prev_end + 1) as usize;
            if start > end as usize {
                return false;
            }
            if self.tags[start] == PointTag::CubicControl {
                return false;
            }
            prev_end = end;
        }
        prev_end as usize + 1 == self.points.len()
    }

    /// The bounding box of this outline's points, but only when the
    /// outline is exactly one contour of 4 `On` points forming an
    /// axis-aligned rectangle — each point one of the bbox's own 4
    /// corners, used exactly once (spec.md §4.7 rect fast-track
    /// eligibility: "the shape is an orthogonal rectangle after
    /// transformation"). `None` for anything else, including a
    /// 4-point quad that merely shares the rectangle's bbox without
    /// being one (e.g. a diamond).
    pub fn axis_aligned_rect(&self) -> Option<BBox> {
        if self.num_contours() != 1 {
            return None;
        }
        let start = self.contour_start(0);
        let end = self.contour_end(0);
        if end - start + 1 != 4 {
            return None;
        }
        if self.tags[start..=end].iter().any(|&t| t != PointTag::On) {
            return None;
        }
        let b = self.bbox();
        if b.is_empty() {
            return None;
        }
        let corners = [
            Point::new(b.min.x, b.min.y),
            Point::new(b.max.x, b.min.y),
            Point::new(b.max.x, b.max.y),
            Point::new(b.min.x, b.max.y),
        ];
        let mut used = [false; 4];
        for &p in &self.points[start..=end] {
            let idx = corners.iter().position(|&c| c == p)?;
            if used[idx] {
                return None;
            }
            used[idx] = true;
        }
        Some(b)
    }

    /// Bounding box over every point in the outline (control points
    /// included, matching the cheap pre-flatten bound the job
    /// orchestration layer uses before rasterizing).
    pub fn bbox(&self) -> BBox {
        let mut iter = self.points.iter();
        let Some(&first) = iter.next() else {
            return BBox::empty();
        };
        let mut b = BBox::from_point(first);
        for &p in iter {
            b.extend(p);
        }
        b
    }
}
