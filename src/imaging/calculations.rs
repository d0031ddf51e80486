//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{ColorDepth, SizeBudget};

/// Factor applied to both edges after every over-budget attempt.
pub const SHRINK_FACTOR: f64 = 0.9;

/// Assumed lossless compression ratio (50%) when turning bytes into pixels.
const LOSSLESS_HEADROOM: f64 = 2.0;

/// Shrink both edges by [`SHRINK_FACTOR`], truncating toward zero.
///
/// ```
/// # use fitsize::imaging::shrink_dimensions;
/// assert_eq!(shrink_dimensions(4000, 3000), (3600, 2700));
/// assert_eq!(shrink_dimensions(1, 1), (0, 0));
/// ```
pub fn shrink_dimensions(width: u32, height: u32) -> (u32, u32) {
    (
        (f64::from(width) * SHRINK_FACTOR) as u32,
        (f64::from(height) * SHRINK_FACTOR) as u32,
    )
}

/// Number of pixels a lossless encode at `depth` can afford within `budget`.
///
/// Raw size is `pixels × depth / 8`; lossless compression is assumed to halve
/// it, so the affordable pixel count is `budget / (depth / 8) × 2`.
pub fn pixel_budget(budget: SizeBudget, depth: ColorDepth) -> u64 {
    (budget.bytes() as f64 / depth.bytes_per_pixel() * LOSSLESS_HEADROOM) as u64
}

/// Starting dimensions for the dimension-reducing strategy.
///
/// Picks `width × height ≈ pixel_budget` at the original aspect ratio, never
/// larger than the original in either edge and never below 1.
///
/// # Arguments
/// * `budget` - Target byte ceiling
/// * `depth` - Color depth the lossless encoder will write
/// * `original` - Original image dimensions (width, height)
///
/// # Returns
/// * `(width, height)` - Seed for the first encode attempt
pub fn estimate_start_dimensions(
    budget: SizeBudget,
    depth: ColorDepth,
    original: (u32, u32),
) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    if orig_w == 0 || orig_h == 0 {
        return (orig_w, orig_h);
    }

    let pixels = pixel_budget(budget, depth) as f64;
    let w = f64::from(orig_w);
    let h = f64::from(orig_h);

    let new_w = (pixels * w / h).sqrt().ceil() as u32;
    let new_h = (pixels * h / w).sqrt().ceil() as u32;

    (new_w.clamp(1, orig_w), new_h.clamp(1, orig_h))
}
