//! RLE clip operations (spec.md §4.6).
//!
//! No direct analogue in the teacher (AGG's scanline containers are
//! consumed immediately by a renderer rather than intersected against
//! each other out of band); grounded on
//! `original_source/src/lib/sw_engine/tvgSwRle.cpp`'s `rleClip`
//! family, reimplemented here as two free functions operating on
//! spec.md §3's `Span`/`RleData` rather than the original's linked
//! span list.

use crate::rle::{IntRect, RleData, Span};

/// In-place intersection of every span in `rle` with the axis-aligned
/// integer rectangle `clip`. Spans wholly outside are dropped; spans
/// straddling a vertical edge are truncated, coverage unchanged.
pub fn clip_rect(rle: &mut RleData, clip: IntRect) {
    if clip.is_empty() {
        rle.spans.clear();
        return;
    }
    rle.spans.retain_mut(|s| {
        if (s.y as i32) < clip.y1 || (s.y as i32) >= clip.y2 {
            return false;
        }
        let x0 = (s.x as i32).max(clip.x1);
        let x1 = (s.x as i32 + s.len as i32).min(clip.x2);
        if x1 <= x0 {
            return false;
        }
        s.x = x0 as i16;
        s.len = (x1 - x0) as u16;
        true
    });
}

/// Per-row intersection of two sorted span lists. Overlapping spans
/// combine their coverage as `(a.cov * b.cov) >> 8`; the result
/// replaces `rle.spans`. Linear in `|rle| + |clip_rle|`.
pub fn clip_path(rle: &mut RleData, clip_rle: &RleData) {
    let mut out = Vec::with_capacity(rle.spans.len().min(clip_rle.spans.len()));

    let mut i = 0usize;
    let mut j = 0usize;
    let a = &rle.spans;
    let b = &clip_rle.spans;

    while i < a.len() && j < b.len() {
        let sa = a[i];
        let sb = b[j];
        if sa.y != sb.y {
            if sa.y < sb.y {
                i += 1;
            } else {
                j += 1;
            }
            continue;
        }

        let a_end = sa.x as i32 + sa.len as i32;
        let b_end = sb.x as i32 + sb.len as i32;
        let lo = (sa.x as i32).max(sb.x as i32);
        let hi = a_end.min(b_end);
        if lo < hi {
            let cov = ((sa.coverage as u32 * sb.coverage as u32) >> 8) as u8;
            if cov > 0 {
                out.push(Span {
                    x: lo as i16,
                    y: sa.y,
                    len: (hi - lo) as u16,
                    coverage: cov,
                });
            }
        }

        if a_end < b_end {
            i += 1;
        } else {
            j += 1;
        }
    }

    merge_adjacent(&mut out);
    rle.spans = out;
}

/// Merge adjacent same-row, same-coverage, x-contiguous spans — the
/// RLE invariant `clip_path`'s span-by-span construction can otherwise
/// violate when two overlaps of equal coverage sit side by side.
fn merge_adjacent(spans: &mut Vec<Span>) {
    let mut write = 0usize;
    for read in 1..spans.len() {
        let prev = spans[write];
        let cur = spans[read];
        if prev.y == cur.y && prev.coverage == cur.coverage && prev.x as i32 + prev.len as i32 == cur.x as i32 {
            spans[write].len += cur.len;
        } else {
            write += 1;
            spans[write] = cur;
        }
    }
    if !spans.is_empty() {
        spans.truncate(write + 1);
    }
}
