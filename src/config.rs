//! Tunable constants the spec documents as "the source doesn't explain
//! this, treat as a heuristic" (spec.md §9 Open Questions) plus the
//! numeric budgets spec.md states inline (§4.5 band size, cell pool
//! size, overflow retry count).

use crate::fixed::Coord;

/// Initial scanline band height, in pixels (spec.md §4.5 item 1).
pub const INITIAL_BAND_SIZE: i32 = 64;

/// Cell pool budget per band, in bytes (spec.md §4.5 "Overflow
/// handling"). A `Cell` is 4 × i32 == 16 bytes, so this bounds a band
/// to 1024 resident cells before a halving retry kicks in.
pub const CELL_POOL_BYTES: usize = 16 * 1024;

/// Number of per-band overflows tolerated before `INITIAL_BAND_SIZE`
/// itself is halved for subsequent bands (spec.md §4.5 item 1).
pub const OVERFLOWS_BEFORE_BAND_SHRINK: u32 = 8;

/// Two consecutive overflow-retries with no forward progress abort the
/// shape with an empty RLE (spec.md §4.5 "Overflow handling", §7).
pub const MAX_CONSECUTIVE_OVERFLOW_RETRIES: u32 = 2;

/// 1024-entry gradient lookup table size (spec.md §4.3).
pub const GRADIENT_TABLE_SIZE: usize = 1024;

/// Stroke-width threshold above which anti-aliasing is disabled on a
/// fill+stroke combo (spec.md §4.8 step 3, §9 Open Questions: "no
/// comment explains the '2' threshold"). Expressed in Q26.6 pixel
/// units (`2.0 * 64`).
pub const STROKE_AA_DISABLE_WIDTH: Coord = 2 * 64;

/// `2 * inv_a` scale threshold separating the bilinear and box-filter
/// image resampling paths (spec.md §4.7 "Otherwise: bilinear").
pub const IMAGE_DOWNSCALE_THRESHOLD: f32 = 0.5;

/// Tolerance below which a paint-transform determinant is treated as
/// singular and the image draw is dropped (spec.md §4.7
/// "Transform-inverse").
pub const DETERMINANT_EPSILON: f64 = 1e-9;

/// Tolerance an image paint transform's third row (`m31`, `m32`, `m33`)
/// must fall within of `(0, 0, 1)` to be accepted (spec.md §9 Open
/// Questions, "clamp or reject a non-affine third row"). A transform
/// outside this tolerance is rejected with `Error::InvalidArguments`
/// rather than silently clamped, since this crate's resampler only
/// ever applies the affine part and a perspective third row would
/// otherwise be dropped without the caller knowing.
pub const AFFINE_THIRD_ROW_EPSILON: f64 = 1e-6;
