//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, BMP) | `image::ImageReader` (format sniffed from content) |
//! | ICC profile | `image::ImageDecoder::icc_profile` |
//! | EXIF block, source quality | [`jpeg_markers`](super::jpeg_markers) header walk |
//! | Resample | `image::DynamicImage::resize_exact` with `CatmullRom` (bicubic) |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (best compression, adaptive filter) |

use super::backend::{
    BackendError, CarriedMetadata, Dimensions, Encoded, ImageBackend, ImageSource, SourceImage,
};
use super::jpeg_markers;
use super::params::{ColorDepth, EncodeStrategy, SourceFormat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder, ImageFormat, ImageReader};
use std::borrow::Cow;
use std::io::{BufRead, Read, Seek};
use std::path::Path;
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("bmp", ImageFormat::Bmp),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Bicubic; fixed, not tunable.
const RESAMPLE_FILTER: FilterType = FilterType::CatmullRom;

/// How much of a file is read for marker scanning when decoding from disk.
/// EXIF is capped at 64 KiB per segment and DQT follows shortly after.
const HEADER_PREFIX_LEN: u64 = 256 * 1024;

/// Backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode from any reader; `header` holds the leading bytes of the file.
fn decode_reader<R: BufRead + Seek>(
    reader: ImageReader<R>,
    header: &[u8],
) -> Result<SourceImage, BackendError> {
    let reader = reader.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| BackendError::UnsupportedFormat("unrecognized content".into()))?;
    let format = SourceFormat::from_image_format(format)
        .ok_or_else(|| BackendError::UnsupportedFormat(format!("{format:?}")))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    // A malformed profile is not worth failing the image over
    let icc_profile = decoder.icc_profile().ok().flatten();
    let image =
        DynamicImage::from_decoder(decoder).map_err(|e| BackendError::Decode(e.to_string()))?;

    let (exif, jpeg_quality) = match format {
        SourceFormat::Jpeg => (
            jpeg_markers::find_exif_segment(header).map(<[u8]>::to_vec),
            jpeg_markers::estimate_quality(header),
        ),
        SourceFormat::Png | SourceFormat::Bmp => (None, None),
    };

    Ok(SourceImage {
        image,
        format,
        metadata: CarriedMetadata { icc_profile, exif },
        jpeg_quality,
    })
}

fn read_header(path: &Path) -> Result<Vec<u8>, BackendError> {
    let mut header = Vec::new();
    std::fs::File::open(path)?
        .take(HEADER_PREFIX_LEN)
        .read_to_end(&mut header)?;
    Ok(header)
}

/// Resample to exact dimensions; identity when the size already matches.
fn resample(image: &DynamicImage, width: u32, height: u32) -> Cow<'_, DynamicImage> {
    if image.width() == width && image.height() == height {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(image.resize_exact(width, height, RESAMPLE_FILTER))
    }
}

/// JPEG takes 8-bit gray or RGB only; alpha (always opaque here) is dropped.
fn jpeg_layout(image: &DynamicImage) -> Cow<'_, DynamicImage> {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
        ColorType::L16 | ColorType::La8 | ColorType::La16 => {
            Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
        }
        _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
    }
}

/// PNG layout matching the source depth. Gray sources stay gray+alpha
/// (8 or 16 bit); color sources become RGBA8 or RGBA16.
fn png_layout(image: &DynamicImage, depth: ColorDepth) -> Cow<'_, DynamicImage> {
    let gray = !image.color().has_color();
    let target = match (gray, depth.bits()) {
        (_, 0..=16) => ColorType::La8,
        (true, 17..=32) => ColorType::La16,
        (false, 17..=32) => ColorType::Rgba8,
        _ => ColorType::Rgba16,
    };
    if image.color() == target {
        return Cow::Borrowed(image);
    }
    Cow::Owned(match target {
        ColorType::La8 => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
        ColorType::La16 => DynamicImage::ImageLumaA16(image.to_luma_alpha16()),
        ColorType::Rgba8 => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgba16(image.to_rgba16()),
    })
}

fn attach_icc(encoder: &mut impl ImageEncoder, metadata: &CarriedMetadata) {
    let Some(icc) = &metadata.icc_profile else {
        return;
    };
    if encoder.set_icc_profile(icc.clone()).is_err() {
        tracing::debug!("encoder does not support ICC profiles, dropping it");
    }
}

fn encode(
    image: &DynamicImage,
    strategy: &EncodeStrategy,
    metadata: &CarriedMetadata,
) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    match strategy {
        EncodeStrategy::QualityPreserving { quality } => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
            attach_icc(&mut encoder, metadata);
            jpeg_layout(image)
                .write_with_encoder(encoder)
                .map_err(|e| BackendError::Encode(format!("JPEG: {e}")))?;
            if let Some(exif) = &metadata.exif {
                buf = jpeg_markers::insert_app1(&buf, exif);
            }
        }
        EncodeStrategy::DimensionReducing { depth } => {
            let mut encoder = PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Best,
                PngFilter::Adaptive,
            );
            attach_icc(&mut encoder, metadata);
            png_layout(image, *depth)
                .write_with_encoder(encoder)
                .map_err(|e| BackendError::Encode(format!("PNG: {e}")))?;
        }
    }
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, source: ImageSource<'_>) -> Result<SourceImage, BackendError> {
        match source {
            ImageSource::Bytes(bytes) => {
                decode_reader(ImageReader::new(std::io::Cursor::new(bytes)), bytes)
            }
            ImageSource::File(path) => {
                let header = read_header(path)?;
                decode_reader(ImageReader::open(path)?, &header)
            }
        }
    }

    fn resample_encode(
        &self,
        source: &SourceImage,
        width: u32,
        height: u32,
        strategy: &EncodeStrategy,
    ) -> Result<Encoded, BackendError> {
        if width == 0 || height == 0 {
            return Err(BackendError::Encode(format!(
                "cannot encode a {width}x{height} image"
            )));
        }
        let resized = resample(&source.image, width, height);
        let bytes = encode(&resized, strategy, &source.metadata)?;
        Ok(Encoded {
            bytes,
            dimensions: Dimensions::new(resized.width(), resized.height()),
        })
    }
}
