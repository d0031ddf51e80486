//! Alpha-channel scan deciding whether transparency is visually significant.
//!
//! Only pixel layouts that carry an alpha channel are scanned. Each alpha
//! sample is widened to 16 bits (the alpha of a 64-bit RGBA pixel) and
//! compared against the fully opaque value; the scan stops at the first pixel
//! that differs. Layouts without alpha are opaque by construction.
//!
//! Palette PNGs with a `tRNS` chunk are expanded to RGBA by the decoder, so
//! they are covered by the `Rgba8` arm.

use image::DynamicImage;

/// Alpha of a fully opaque pixel in the 64-bit canonical layout.
const OPAQUE: u16 = u16::MAX;

/// Widen an 8-bit sample to 16 bits (`0xAB` → `0xABAB`).
#[inline]
fn widen(sample: u8) -> u16 {
    u16::from(sample) * 257
}

/// Widen a float sample to 16 bits, saturating outside `0.0..=1.0`.
#[inline]
fn widen_f32(sample: f32) -> u16 {
    (sample.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
}

/// Returns `true` if any pixel is not fully opaque.
pub fn has_significant_transparency(image: &DynamicImage) -> bool {
    match image {
        DynamicImage::ImageLumaA8(buf) => buf.pixels().any(|p| widen(p[1]) != OPAQUE),
        DynamicImage::ImageRgba8(buf) => buf.pixels().any(|p| widen(p[3]) != OPAQUE),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().any(|p| p[1] != OPAQUE),
        DynamicImage::ImageRgba16(buf) => buf.pixels().any(|p| p[3] != OPAQUE),
        DynamicImage::ImageRgba32F(buf) => buf.pixels().any(|p| widen_f32(p[3]) != OPAQUE),
        _ => false,
    }
}
