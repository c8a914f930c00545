//! Stroker: turns a centerline [`Outline`] into the filled region of its
//! stroke (spec.md §4.4).
//!
//! Grounded on the teacher's `math_stroke.rs` (cap/join enums, a
//! `width`/`line_cap`/`line_join`/`miter_limit` settings struct) and
//! `vcgen_stroke.rs` (two-border construction, walking the source path
//! once to build the left/right offset polylines then splicing caps or
//! closing each border on its own). Reworked from AGG's float vertex
//! generator onto spec.md §3's fixed-point `Outline`, and from AGG's
//! vertex-consumer-driven state machine into a single pass over an
//! already-flattened polyline per sub-path. Corner geometry
//! (miter/round/bevel) is computed with [`crate::fixed::rotate`] rather
//! than AGG's float sin/cos.

pub mod border;
pub mod dash;

use crate::fixed::{atan, cos, diff, length, rotate, small_cubic, split_cubic, tan, Coord, Fixed, Point, ANGLE_PI, ANGLE_PI2, ANGLE_PI4, FIXED_ONE};
use crate::outline::{FillRule, Outline, PointTag};
use border::StrokeBorder;
use dash::DashPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Stroke settings (spec.md §3 `Stroke`). `width` is the full stroke
/// width; the border builder works in terms of `width / 2` either side
/// of the centerline.
#[derive(Debug, Clone)]
pub struct Stroke {
    pub width: Coord,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: Coord,
    pub dash: Option<DashPattern>,
}

impl Stroke {
    /// `miter_limit` defaults to `4 * (width / 2)`, matching the
    /// teacher's `math_stroke.rs` default of 4x the half-width.
    pub fn new(width: Coord, cap: LineCap, join: LineJoin) -> Option<Self> {
        if width <= 0 {
            return None;
        }
        Some(Self {
            width,
            cap,
            join,
            miter_limit: 4 * (width / 2),
            dash: None,
        })
    }

    pub fn with_miter_limit(mut self, limit: Coord) -> Self {
        self.miter_limit = limit.max(0);
        self
    }

    pub fn with_dash(mut self, dash: DashPattern) -> Self {
        self.dash = Some(dash);
        self
    }

    fn half_width(&self) -> Coord {
        self.width / 2
    }

    /// Build the stroked outline of `path`. Every sub-path of `path` is
    /// flattened (cubics included), optionally split by the dash
    /// pattern, then widened into a pair of borders. Degenerate corners
    /// (a segment shorter than the stroke's half-width, where the
    /// border geometry can fold back on itself) flip the result to
    /// `FillRule::EvenOdd` so self-overlap cancels instead of doubling
    /// coverage (spec.md §4.4 "wide-stroke degeneracy").
    pub fn stroke(&self, path: &Outline) -> Outline {
        let mut result = Outline::new();
        let mut degenerate = false;

        for c in 0..path.num_contours() {
            let polyline = flatten_contour(path, c);
            if polyline.len() < 2 {
                if polyline.len() == 1 && self.cap != LineCap::Butt {
                    emit_dot(&mut result, polyline[0], self.half_width(), self.cap);
                }
                continue;
            }
            let closed = !path.opened;

            if let Some(dash) = &self.dash {
                for run in dash::apply(&polyline, closed, dash) {
                    if run.len() < 2 {
                        continue;
                    }
                    degenerate |= self.stroke_polyline(&run, false, &mut result);
                }
            } else {
                degenerate |= self.stroke_polyline(&polyline, closed, &mut result);
            }
        }

        result.fill_rule = if degenerate { FillRule::EvenOdd } else { FillRule::NonZero };
        result
    }

    /// Widen one already-flattened sub-path, appending one or two
    /// closed contours to `result`. Returns true if a degenerate
    /// (sub-half-width) segment was encountered.
    fn stroke_polyline(&self, raw: &[Point], closed: bool, result: &mut Outline) -> bool {
        let pts = dedupe_points(raw, closed);
        if pts.len() < 2 {
            return false;
        }
        let w = self.half_width();
        let n = pts.len();
        let seg_count = if closed { n } else { n - 1 };

        let mut angles = Vec::with_capacity(seg_count);
        let mut lengths = Vec::with_capacity(seg_count);
        let mut degenerate = false;
        for i in 0..seg_count {
            let a = pts[i];
            let b = pts[(i + 1) % n];
            let len = length(b - a);
            if len < w {
                degenerate = true;
            }
            angles.push(atan(b - a));
            lengths.push(len);
        }

        let mut left = StrokeBorder::new();
        let mut right = StrokeBorder::new();
        left.begin();
        right.begin();

        for i in 0..seg_count {
            let a = pts[i];
            let b = pts[(i + 1) % n];
            let normal = rotate(Point::new(w, 0), angles[i] + ANGLE_PI2);

            left.push(a + normal);
            right.push(a - normal);
            // Marked movable: a join that resolves to a single corner
            // point (miter apex, or the inner border's intersection/
            // fallback point) overwrites this provisional offset rather
            // than appending a near-duplicate vertex beside it.
            left.push_movable(b + normal);
            right.push_movable(b - normal);

            let has_next = i + 1 < seg_count || closed;
            if has_next {
                let next_angle = angles[(i + 1) % seg_count];
                let len_in = lengths[i];
                let len_out = lengths[(i + 1) % seg_count];
                apply_join(&mut left, join_points(w, b, angles[i], next_angle, ANGLE_PI2, self.join, self.miter_limit, len_in, len_out));
                apply_join(&mut right, join_points(w, b, angles[i], next_angle, -ANGLE_PI2, self.join, self.miter_limit, len_in, len_out));
            }
        }

        debug_assert!(left.is_open() && right.is_open());
        if closed {
            left.close();
            right.close();
            append_closed_contour(result, &left.points);
            right.reverse_from(0);
            append_closed_contour(result, &right.points);
        } else {
            left.close();
            let mut combined = left.points;
            combined.extend(cap_points(w, pts[n - 1], angles[seg_count - 1], self.cap));
            right.close();
            right.reverse_from(0);
            combined.extend(right.points);
            combined.extend(cap_points(w, pts[0], angles[0] + ANGLE_PI, self.cap));
            append_closed_contour(result, &combined);
        }
        degenerate
    }
}

/// Splice a join's points onto `border`, which just received the
/// corner's provisional (movable) offset point. A single-point result
/// (miter apex, or the inner border's intersection/fallback point) is
/// the corrected corner position rather than a separate vertex, so it
/// overwrites the provisional point via [`StrokeBorder::rewrite_last`].
/// An empty result (bevel, or a turn too small to join) leaves the
/// provisional point as the corner. Multiple points (a round-join arc)
/// are genuinely new interior vertices and are appended normally.
fn apply_join(border: &mut StrokeBorder, points: Vec<Point>) {
    match points.len() {
        0 => {}
        1 => {
            border.rewrite_last(points[0]);
        }
        _ => {
            for p in points {
                border.push(p);
            }
        }
    }
}

/// `|w * tan(half_turn)|`, the segment-length threshold spec.md §4.4's
/// inner-join rule tests adjacent segments against.
fn tan_threshold(w: Coord, half_turn: Fixed) -> Coord {
    let t = tan(half_turn).unsigned_abs() as i64;
    ((w as i64 * t) >> 16) as Coord
}

/// Points inserted between a segment's trailing offset and the next
/// segment's leading offset at a shared corner, for one border side
/// (`side` is `+90deg` for the left border, `-90deg` for the right).
/// Dispatches to the inner- or outer-border rule per spec.md §4.4
/// depending on which side of the turn `side` falls on (`is_inside`),
/// matching the teacher's `math_stroke.rs::calc_join`, which branches
/// on `cross_product(...)`'s sign into a dedicated `inner_join`
/// (`InnerJoin::{Bevel,Miter,Jag,Round}`) path versus the outer
/// `line_join` (`LineJoin`) path rather than sharing one calculation
/// for both sides.
#[allow(clippy::too_many_arguments)]
fn join_points(
    w: Coord,
    center: Point,
    angle_in: Fixed,
    angle_out: Fixed,
    side: Fixed,
    join: LineJoin,
    miter_limit: Coord,
    len_in: Coord,
    len_out: Coord,
) -> Vec<Point> {
    let turn = diff(angle_out, angle_in);
    if turn.abs() < 16 {
        return Vec::new();
    }
    let is_inside = (side > 0) == (turn > 0);
    if is_inside {
        inner_join_points(w, center, angle_in, angle_out, side, turn, len_in, len_out)
    } else {
        outer_join_points(w, center, angle_in, side, turn, join, miter_limit)
    }
}

/// Inner-border join (spec.md §4.4 "Inside border"): a tan-based
/// intersection test independent of `join`. When both adjacent
/// segments are long enough relative to the half-angle, emit the true
/// corner intersection; otherwise fall back to the outgoing edge's
/// own starting offset point rather than folding the border back on
/// itself.
fn inner_join_points(w: Coord, center: Point, angle_in: Fixed, angle_out: Fixed, side: Fixed, turn: Fixed, len_in: Coord, len_out: Coord) -> Vec<Point> {
    let half_turn = turn / 2;
    let threshold = tan_threshold(w, half_turn);
    if len_in > threshold && len_out > threshold {
        let cos_half = cos(half_turn).unsigned_abs().max(1) as i64;
        let r = ((w as i64) * (FIXED_ONE as i64) / cos_half) as Coord;
        vec![center + rotate(Point::new(r, 0), angle_in + half_turn + side)]
    } else {
        vec![center + rotate(Point::new(w, 0), angle_out + side)]
    }
}

/// Outer-border join (spec.md §4.4 "Outside border"): `Miter` falls
/// back to `Bevel` past the miter limit, `Bevel` is two corner points
/// with no join geometry, `Round` is a CORDIC arc.
fn outer_join_points(w: Coord, center: Point, angle_in: Fixed, side: Fixed, turn: Fixed, join: LineJoin, miter_limit: Coord) -> Vec<Point> {
    match join {
        LineJoin::Bevel => Vec::new(),
        LineJoin::Round => {
            let steps = ((turn.unsigned_abs() * 6) / ANGLE_PI4 as u64).clamp(1, 24) as i64;
            (1..steps)
                .map(|k| {
                    let a = angle_in + side + (turn * k) / steps;
                    center + rotate(Point::new(w, 0), a)
                })
                .collect()
        }
        LineJoin::Miter => {
            let half_turn = turn / 2;
            let bisector = angle_in + side + half_turn;
            let cos_half = cos(half_turn).unsigned_abs().max(1) as i64;
            let miter_len = ((w as i64) * (FIXED_ONE as i64) / cos_half) as Coord;
            if miter_len > 0 && miter_len <= miter_limit {
                vec![center + rotate(Point::new(miter_len, 0), bisector)]
            } else {
                Vec::new()
            }
        }
    }
}

/// End-cap geometry bulging outward past `center` in direction
/// `outward`, connecting the left-side offset point (`outward + 90`)
/// to the right-side offset point (`outward - 90`). Empty for
/// [`LineCap::Butt`] since the two border ends already meet there.
fn cap_points(w: Coord, center: Point, outward: Fixed, cap: LineCap) -> Vec<Point> {
    match cap {
        LineCap::Butt => Vec::new(),
        LineCap::Square => {
            let tangent = rotate(Point::new(w, 0), outward);
            let left = rotate(Point::new(w, 0), outward + ANGLE_PI2);
            let right = rotate(Point::new(w, 0), outward - ANGLE_PI2);
            vec![center + left + tangent, center + right + tangent]
        }
        LineCap::Round => {
            const STEPS: i64 = 8;
            (1..STEPS)
                .map(|k| {
                    let a = outward + ANGLE_PI2 - (ANGLE_PI * k) / STEPS;
                    center + rotate(Point::new(w, 0), a)
                })
                .collect()
        }
    }
}

/// A zero-length sub-path still draws a cap-shaped dot when the cap
/// isn't `Butt` (spec.md §4.4 "a degenerate single-point sub-path").
fn emit_dot(result: &mut Outline, center: Point, w: Coord, cap: LineCap) {
    let steps: i64 = match cap {
        LineCap::Round => 16,
        LineCap::Square => 4,
        LineCap::Butt => return,
    };
    result.move_to(center + rotate(Point::new(w, 0), 0));
    for k in 1..steps {
        let a = (ANGLE_PI * 2 * k) / steps;
        result.line_to(center + rotate(Point::new(w, 0), a));
    }
    result.close();
}

fn append_closed_contour(out: &mut Outline, pts: &[Point]) {
    if pts.len() < 3 {
        return;
    }
    out.move_to(pts[0]);
    for &p in &pts[1..] {
        out.line_to(p);
    }
    out.close();
}

/// Drop consecutive near-duplicate points (spec.md's "small" segment
/// test), and collapse a closed contour's redundant closing point if
/// the source already repeated the start point.
fn dedupe_points(pts: &[Point], closed: bool) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(pts.len());
    for &p in pts {
        if !out.last().is_some_and(|&last| (p - last).is_small()) {
            out.push(p);
        }
    }
    if closed && out.len() > 1 {
        if let (Some(&first), Some(&last)) = (out.first(), out.last()) {
            if (last - first).is_small() {
                out.pop();
            }
        }
    }
    out
}

fn flatten_contour(path: &Outline, idx: usize) -> Vec<Point> {
    let start = path.contour_start(idx);
    let end = path.contour_end(idx);
    if end < start {
        return Vec::new();
    }
    let first = path.points[start];
    let mut out = vec![first];
    let mut cur = first;
    let mut i = start + 1;
    while i <= end {
        match path.tags[i] {
            PointTag::On => {
                cur = path.points[i];
                out.push(cur);
                i += 1;
            }
            PointTag::CubicControl => {
                let c1 = path.points[i];
                let c2 = path.points[i + 1];
                let p = path.points[i + 2];
                flatten_cubic_into(&mut out, [cur, c1, c2, p], 0);
                cur = p;
                i += 3;
            }
        }
    }
    out
}

const MAX_CUBIC_DEPTH: u32 = 24;

fn flatten_cubic_into(out: &mut Vec<Point>, base: [Point; 4], depth: u32) {
    if depth >= MAX_CUBIC_DEPTH || small_cubic(&base) {
        out.push(base[3]);
        return;
    }
    let s = split_cubic(&base);
    flatten_cubic_into(out, [s[0], s[1], s[2], s[3]], depth + 1);
    flatten_cubic_into(out, [s[3], s[4], s[5], s[6]], depth + 1);
}
