//! Parameter types for the convergence engine.
//!
//! These types describe *what* to encode, not *how*. They are the interface
//! between the [`operations`](super::operations) module (which decides the
//! strategy and the dimensions of each attempt) and the
//! [`backend`](super::backend) (which does the pixel work). Everything here is
//! chosen once per image and never mutated while the loop runs; only the
//! target dimensions change between attempts.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG quality (1–100, default 90). Clamped on construction.
//! - [`ColorDepth`]: Bits per pixel of the source, drives the PNG layout and the pixel-budget seed.
//! - [`SourceFormat`] / [`FormatFamily`]: What the input file was decoded as.
//! - [`EncodeStrategy`]: The closed set of strategies the loop can run.
//! - [`SizeBudget`]: The byte ceiling every result must satisfy.

use image::{ColorType, ImageFormat};
use serde::Serialize;

/// Quality setting for lossy JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Bits per pixel of a decoded source image.
///
/// Floating-point sources (128 bpp) are capped at 64 because PNG has no
/// float layout; they are written as 16-bit RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColorDepth(u16);

impl ColorDepth {
    pub const MAX_BITS: u16 = 64;

    pub fn new(bits: u16) -> Self {
        Self(bits.clamp(8, Self::MAX_BITS))
    }

    pub fn from_color_type(color: ColorType) -> Self {
        Self::new(color.bits_per_pixel())
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn bytes_per_pixel(self) -> f64 {
        f64::from(self.0) / 8.0
    }
}

/// The two codec families the engine knows how to re-encode into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    /// Quality-dial codecs (JPEG).
    LossyPhotographic,
    /// Codecs without a quality dial whose size is driven by pixel count (PNG, BMP).
    LosslessWithAlpha,
}

/// Container format the source file was decoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
    Bmp,
}

impl SourceFormat {
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    pub fn family(self) -> FormatFamily {
        match self {
            Self::Jpeg => FormatFamily::LossyPhotographic,
            Self::Png | Self::Bmp => FormatFamily::LosslessWithAlpha,
        }
    }
}

/// How an image is re-encoded on every iteration of the convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum EncodeStrategy {
    /// JPEG at a fixed quality, starting from the original dimensions.
    QualityPreserving { quality: Quality },
    /// PNG at the source color depth, starting from a pixel-budget estimate.
    DimensionReducing { depth: ColorDepth },
}

impl EncodeStrategy {
    pub fn family(&self) -> FormatFamily {
        match self {
            Self::QualityPreserving { .. } => FormatFamily::LossyPhotographic,
            Self::DimensionReducing { .. } => FormatFamily::LosslessWithAlpha,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::QualityPreserving { .. } => "jpeg",
            Self::DimensionReducing { .. } => "png",
        }
    }
}

/// Maximum acceptable output length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SizeBudget(u64);

impl SizeBudget {
    /// 2.75 MiB, the ceiling most chat and forum uploads accept.
    pub const DEFAULT: SizeBudget = SizeBudget(2_883_584);

    pub fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn fits(self, len: u64) -> bool {
        len <= self.0
    }
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}
