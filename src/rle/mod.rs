//! Path-to-RLE rasterizer (spec.md §4.5).
//!
//! Owns the band loop, the outline walk (including cubic flattening
//! via [`crate::fixed::split_cubic`]/[`crate::fixed::small_cubic`]),
//! the coverage sweep, and span emission/clipping. The per-band cell
//! accumulation itself lives in [`cells`], ported from the teacher's
//! `rasterizer_cells_aa.rs`; everything in this file — banding,
//! overflow/retry, the sweep from `(cover, area)` to 0..255 coverage,
//! and RLE span packing — is new scope the teacher's flat,
//! single-pass `RasterizerScanlineAa` doesn't need, grounded instead on
//! spec.md §4.5 and `original_source/src/lib/sw_engine/tvgSwRle.cpp`'s
//! band/cell-pool structure (named in `_INDEX.md`).

pub mod cells;

use crate::config::{
    CELL_POOL_BYTES, INITIAL_BAND_SIZE, MAX_CONSECUTIVE_OVERFLOW_RETRIES,
    OVERFLOWS_BEFORE_BAND_SHRINK,
};
use crate::fixed::{small_cubic, split_cubic, Point};
use crate::outline::{FillRule, Outline, PointTag};
use cells::{upscale, Cell, CellGrid, ONE_PIXEL, PIXEL_BITS};

const CELL_BYTES: usize = core::mem::size_of::<Cell>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub x: i16,
    pub y: i16,
    pub len: u16,
    pub coverage: u8,
}

#[derive(Debug, Clone, Default)]
pub struct RleData {
    pub spans: Vec<Span>,
}

impl RleData {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total number of spans (spec.md §3 calls this `RleData::size`,
    /// updated as spans are appended).
    pub fn size(&self) -> usize {
        self.spans.len()
    }

    /// Reserved span storage, mirroring spec.md §3's `RleData::capacity`
    /// field — exposed so callers that `reserve()` up front (the job
    /// orchestration layer reusing a shape's previous RLE allocation)
    /// can observe it without reaching into `spans` directly.
    pub fn capacity(&self) -> u32 {
        self.spans.capacity() as u32
    }
}

/// Integer pixel viewport/clip rectangle, `[x1, x2) x [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl IntRect {
    pub fn width(&self) -> i32 {
        (self.x2 - self.x1).max(0)
    }
    pub fn height(&self) -> i32 {
        (self.y2 - self.y1).max(0)
    }
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }
}

/// Flatten `outline` and rasterize it against `clip`, returning an RLE
/// coverage mask. Never fails: a shape whose band retries are
/// exhausted simply contributes no further spans (spec.md §7), logged
/// at `warn` level.
pub fn rasterize(outline: &Outline, clip: IntRect, antialias: bool) -> RleData {
    if outline.is_empty() || clip.is_empty() {
        return RleData::default();
    }

    let mut spans = Vec::new();
    let mut band_size = INITIAL_BAND_SIZE.max(1);
    let mut overflow_total = 0u32;

    let mut y = clip.y1;
    while y < clip.y2 {
        let mut h = band_size.min(clip.y2 - y);
        let mut consecutive = 0u32;
        loop {
            match rasterize_band(outline, clip.x1, clip.x2, y, h, antialias) {
                Ok(mut band_spans) => {
                    spans.append(&mut band_spans);
                    break;
                }
                Err(_) => {
                    overflow_total += 1;
                    consecutive += 1;
                    if consecutive > MAX_CONSECUTIVE_OVERFLOW_RETRIES || h <= 1 {
                        log::warn!(
                            "rle: band at y={y} exhausted cell pool after {consecutive} retries; \
                             aborting shape with a partial RLE"
                        );
                        return RleData { spans };
                    }
                    h = (h / 2).max(1);
                }
            }
        }
        if overflow_total >= OVERFLOWS_BEFORE_BAND_SHRINK {
            band_size = (band_size / 2).max(1);
        }
        y += h;
    }

    RleData { spans }
}

fn rasterize_band(
    outline: &Outline,
    clip_x1: i32,
    clip_x2: i32,
    band_y0: i32,
    band_h: i32,
    antialias: bool,
) -> Result<Vec<Span>, crate::error::CellPoolExhausted> {
    let max_cells = (CELL_POOL_BYTES / CELL_BYTES).max(16);
    let mut grid = CellGrid::new(max_cells);

    let band_ylo = band_y0 << PIXEL_BITS;
    let band_yhi = (band_y0 + band_h) << PIXEL_BITS;

    for c in 0..outline.num_contours() {
        walk_contour(outline, c, band_ylo, band_yhi, &mut grid)?;
    }

    let cells = grid.finish()?;
    Ok(sweep(cells, band_y0, band_h, clip_x1, clip_x2, outline.fill_rule, antialias))
}

fn walk_contour(
    outline: &Outline,
    contour_idx: usize,
    band_ylo: i32,
    band_yhi: i32,
    grid: &mut CellGrid,
) -> Result<(), crate::error::CellPoolExhausted> {
    let start = outline.contour_start(contour_idx);
    let end = outline.contour_end(contour_idx);
    if end < start {
        return Ok(());
    }

    let first = outline.points[start];
    let mut cur = first;
    let mut i = start + 1;
    while i <= end {
        match outline.tags[i] {
            PointTag::On => {
                let p = outline.points[i];
                add_line(grid, cur, p, band_ylo, band_yhi)?;
                cur = p;
                i += 1;
            }
            PointTag::CubicControl => {
                let c1 = outline.points[i];
                let c2 = outline.points[i + 1];
                let p = outline.points[i + 2];
                flatten_cubic(grid, [cur, c1, c2, p], band_ylo, band_yhi, 0)?;
                cur = p;
                i += 3;
            }
        }
    }
    // Implicit close: connect the last point back to the contour start
    // so every contour rasterizes as a closed region, matching how
    // the cell accumulator only produces correct winding for closed
    // polygons.
    if cur != first {
        add_line(grid, cur, first, band_ylo, band_yhi)?;
    }
    Ok(())
}

const MAX_CUBIC_DEPTH: u32 = 24;

fn flatten_cubic(
    grid: &mut CellGrid,
    base: [Point; 4],
    band_ylo: i32,
    band_yhi: i32,
    depth: u32,
) -> Result<(), crate::error::CellPoolExhausted> {
    if depth >= MAX_CUBIC_DEPTH || small_cubic(&base) {
        add_line(grid, base[0], base[3], band_ylo, band_yhi)?;
        return Ok(());
    }
    let s = split_cubic(&base);
    flatten_cubic(grid, [s[0], s[1], s[2], s[3]], band_ylo, band_yhi, depth + 1)?;
    flatten_cubic(grid, [s[3], s[4], s[5], s[6]], band_ylo, band_yhi, depth + 1)
}

/// Add a line segment (in outline Q26.6 space) to the band's cell
/// grid, clipping it to `[band_ylo, band_yhi)` in internal Q24.8
/// coordinates first. A segment lying entirely outside the band
/// contributes nothing and is skipped without entering the cell grid.
fn add_line(
    grid: &mut CellGrid,
    p0: Point,
    p1: Point,
    band_ylo: i32,
    band_yhi: i32,
) -> Result<(), crate::error::CellPoolExhausted> {
    let x1 = upscale(p0.x);
    let y1 = upscale(p0.y);
    let x2 = upscale(p1.x);
    let y2 = upscale(p1.y);

    if y1 == y2 {
        return Ok(());
    }

    let dy = (y2 - y1) as i64;
    let t_at = |y_bound: i32| -> f64 { (y_bound as i64 - y1 as i64) as f64 / dy as f64 };
    let (mut t_lo, mut t_hi) = {
        let a = t_at(band_ylo);
        let b = t_at(band_yhi);
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    };
    t_lo = t_lo.max(0.0);
    t_hi = t_hi.min(1.0);
    if t_lo >= t_hi {
        return Ok(());
    }

    let lerp = |a: i32, b: i32, t: f64| -> i32 { a + ((b - a) as f64 * t).round() as i32 };
    let cx1 = lerp(x1, x2, t_lo);
    let cy1 = lerp(y1, y2, t_lo);
    let cx2 = lerp(x1, x2, t_hi);
    let cy2 = lerp(y1, y2, t_hi);

    grid.line(cx1, cy1, cx2, cy2)
}

/// Convert accumulated `(cover, area)` cells into spans for one band.
fn sweep(
    mut cells: Vec<Cell>,
    band_y0: i32,
    band_h: i32,
    clip_x1: i32,
    clip_x2: i32,
    fill_rule: FillRule,
    antialias: bool,
) -> Vec<Span> {
    cells.sort_by(|a, b| a.y.cmp(&b.y).then(a.x.cmp(&b.x)));

    let mut out = Vec::new();
    let mut idx = 0usize;
    for row in band_y0..band_y0 + band_h {
        let row_start = idx;
        while idx < cells.len() && cells[idx].y == row {
            idx += 1;
        }
        if idx == row_start {
            continue;
        }
        sweep_row(&cells[row_start..idx], row, clip_x1, clip_x2, fill_rule, antialias, &mut out);
    }
    out
}

fn coverage_from(area: i64, fill_rule: FillRule, antialias: bool) -> u8 {
    let c = area >> (PIXEL_BITS * 2 + 1 - 8);
    let c = match fill_rule {
        FillRule::NonZero => c.clamp(-255, 255).unsigned_abs().min(255),
        FillRule::EvenOdd => {
            let m = c.rem_euclid(512);
            (if m > 256 { 512 - m } else { m }).clamp(0, 255) as u64
        }
    };
    if !antialias && c > 0 {
        255
    } else {
        c as u8
    }
}

/// Walk one row's cells left to right, building `(x0, x1, coverage)`
/// segments: a 1-pixel segment per cell (its area determines
/// coverage) and a gap segment between consecutive cells carrying the
/// running `cover`'s flat coverage (no area contribution, since
/// nothing but vertical edges crossed that span of pixels). Adjacent
/// equal-coverage segments are merged before being clipped and
/// emitted, satisfying the RLE invariant that same-row same-coverage
/// spans never sit side by side.
fn sweep_row(
    row_cells: &[Cell],
    y: i32,
    clip_x1: i32,
    clip_x2: i32,
    fill_rule: FillRule,
    antialias: bool,
    out: &mut Vec<Span>,
) {
    let mut cover: i64 = 0;
    let mut x = row_cells[0].x;
    let mut run: Option<(i32, u8)> = None; // (start, coverage) pending merge

    let mut push = |start: i32, end: i32, cov: u8, run: &mut Option<(i32, u8)>, out: &mut Vec<Span>| {
        if end <= start {
            return;
        }
        match run {
            Some((rs, rc)) if *rc == cov => {
                let _ = rs;
            }
            Some((rs, rc)) => {
                emit_clipped(out, y, *rs, start, *rc, clip_x1, clip_x2);
                *run = Some((start, cov));
            }
            None => {
                *run = Some((start, cov));
            }
        }
    };

    for cell in row_cells {
        if cell.x > x {
            let gap_area = cover << (PIXEL_BITS + 1);
            let gap_cov = coverage_from(gap_area, fill_rule, antialias);
            push(x, cell.x, gap_cov, &mut run, out);
            x = cell.x;
        }
        cover += cell.cover as i64;
        let area = (cover << (PIXEL_BITS + 1)) - cell.area as i64;
        let cov = coverage_from(area, fill_rule, antialias);
        push(x, x + 1, cov, &mut run, out);
        x += 1;
    }

    if let Some((rs, rc)) = run {
        emit_clipped(out, y, rs, x, rc, clip_x1, clip_x2);
    }
}

/// Clip `[x0, x1)` at row `y` to `[clip_x1, clip_x2)` and, if any
/// portion survives, append a span. Coordinates are clamped to
/// `i16::MAX` with a warning (spec.md §4.5 "x and y are also clipped
/// to i16::MAX with a log warning").
fn emit_clipped(out: &mut Vec<Span>, y: i32, x0: i32, x1: i32, coverage: u8, clip_x1: i32, clip_x2: i32) {
    if coverage == 0 {
        return;
    }
    let cx0 = x0.max(clip_x1);
    let cx1 = x1.min(clip_x2);
    if cx1 <= cx0 {
        return;
    }
    let (cx0, cx1, y) = clamp_i16(cx0, cx1, y);
    let len = (cx1 - cx0) as u16;
    if len == 0 {
        return;
    }
    out.push(Span {
        x: cx0 as i16,
        y: y as i16,
        len,
        coverage,
    });
}

fn clamp_i16(x0: i32, x1: i32, y: i32) -> (i32, i32, i32) {
    let clamp = |v: i32| -> i32 {
        if v > i16::MAX as i32 {
            log::warn!("rle: coordinate {v} clamped to i16::MAX");
            i16::MAX as i32
        } else if v < i16::MIN as i32 {
            log::warn!("rle: coordinate {v} clamped to i16::MIN");
            i16::MIN as i32
        } else {
            v
        }
    };
    (clamp(x0), clamp(x1), clamp(y))
}

const _: () = assert!(ONE_PIXEL == 256);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::Point;

    fn unit_square(rule: FillRule) -> Outline {
        let mut o = Outline::new();
        o.fill_rule = rule;
        let s = 64; // 1 pixel in Q26.6
        o.move_to(Point::new(2 * s, 2 * s));
        o.line_to(Point::new(10 * s, 2 * s));
        o.line_to(Point::new(10 * s, 10 * s));
        o.line_to(Point::new(2 * s, 10 * s));
        o.close();
        o
    }

    #[test]
    fn square_produces_expected_span_count() {
        let outline = unit_square(FillRule::NonZero);
        let clip = IntRect {
            x1: 0,
            y1: 0,
            x2: 16,
            y2: 16,
        };
        let rle = rasterize(&outline, clip, true);
        // 8x8 fully-covered interior rows, one span each.
        let full_rows = rle
            .spans
            .iter()
            .filter(|s| s.coverage == 255 && s.len == 8)
            .count();
        assert!(full_rows >= 6, "expected most rows fully covered, got {full_rows}");
    }

    #[test]
    fn single_pixel_square_emits_one_full_span() {
        let mut o = Outline::new();
        o.move_to(Point::new(128, 128)); // (2,2)
        o.line_to(Point::new(192, 128)); // (3,2)
        o.line_to(Point::new(192, 192));
        o.line_to(Point::new(128, 192));
        o.close();
        let clip = IntRect {
            x1: 0,
            y1: 0,
            x2: 16,
            y2: 16,
        };
        let rle = rasterize(&o, clip, true);
        assert_eq!(rle.spans.len(), 1);
        let s = rle.spans[0];
        assert_eq!((s.x, s.y, s.len, s.coverage), (2, 2, 1, 255));
    }

    #[test]
    fn zero_area_outline_emits_no_spans() {
        let mut o = Outline::new();
        o.move_to(Point::new(0, 0));
        o.line_to(Point::new(0, 0));
        o.close();
        let clip = IntRect {
            x1: 0,
            y1: 0,
            x2: 16,
            y2: 16,
        };
        let rle = rasterize(&o, clip, true);
        assert!(rle.is_empty());
    }

    #[test]
    fn empty_clip_produces_no_spans() {
        let o = unit_square(FillRule::NonZero);
        let clip = IntRect {
            x1: 0,
            y1: 0,
            x2: 0,
            y2: 0,
        };
        assert!(rasterize(&o, clip, true).is_empty());
    }

    #[test]
    fn spans_are_sorted_and_in_bounds() {
        let outline = unit_square(FillRule::NonZero);
        let clip = IntRect {
            x1: 0,
            y1: 0,
            x2: 16,
            y2: 16,
        };
        let rle = rasterize(&outline, clip, true);
        let mut prev: Option<(i16, i16)> = None;
        for s in &rle.spans {
            assert!(s.x >= 0 && (s.x as i32 + s.len as i32) <= 16);
            assert!(s.y >= 0 && s.y < 16);
            if let Some((py, px)) = prev {
                assert!((s.y, s.x) >= (py, px));
            }
            prev = Some((s.y, s.x));
        }
    }
}
