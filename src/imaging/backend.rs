//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the convergence
//! engine needs from a codec: decode a source file, and perform one
//! resample + encode attempt at given dimensions.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use `tests::MockBackend`, which models encoded size from
//! the pixel count instead of encoding.

use super::params::{EncodeStrategy, SourceFormat};
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Where the backend reads the encoded source from.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// The whole file, already read into memory.
    Bytes(&'a [u8]),
    /// Streamed from disk by the decoder.
    File(&'a Path),
}

/// Source metadata carried onto every re-encoded attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarriedMetadata {
    /// Embedded ICC color profile.
    pub icc_profile: Option<Vec<u8>>,
    /// Raw EXIF APP1 payload (JPEG sources only), starting with `"Exif\0\0"`.
    pub exif: Option<Vec<u8>>,
}

/// A decoded source image, owned by one job for the duration of its loop.
#[derive(Debug)]
pub struct SourceImage {
    pub image: DynamicImage,
    pub format: SourceFormat,
    pub metadata: CarriedMetadata,
    /// Quality estimated from the source's quantization tables (JPEG only).
    pub jpeg_quality: Option<u8>,
}

impl SourceImage {
    pub fn new(image: DynamicImage, format: SourceFormat) -> Self {
        Self {
            image,
            format,
            metadata: CarriedMetadata::default(),
            jpeg_quality: None,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }
}

/// Result of one resample + encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
}

impl Encoded {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Trait for codec backends.
///
/// Implementations must be `Sync`: jobs share one backend across the rayon
/// pool.
pub trait ImageBackend: Sync {
    /// Decode a source image and collect the metadata worth carrying over.
    fn decode(&self, source: ImageSource<'_>) -> Result<SourceImage, BackendError>;

    /// Resample `source` to exactly `width × height` and encode it with
    /// `strategy`. Performs no loop control of its own.
    fn resample_encode(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        strategy: &EncodeStrategy,
    ) -> Result<Encoded, BackendError>;
}
