//! Image processing for the convergence engine, built on the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `ImageReader` with content sniffing |
//! | **Transparency check** | alpha scan over the decoded buffer |
//! | **Resample** | `resize_exact` (Catmull-Rom) |
//! | **Encode → JPEG** | `JpegEncoder` at a fixed quality, EXIF + ICC carried |
//! | **Encode → PNG** | `PngEncoder` (best compression) at the source depth |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing encode strategies and budgets
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Strategy selection and the convergence loop

pub mod backend;
mod calculations;
pub mod jpeg_markers;
pub mod operations;
mod params;
pub mod rust_backend;
mod transparency;

pub use backend::{BackendError, Dimensions, Encoded, ImageBackend, ImageSource, SourceImage};
pub use calculations::{SHRINK_FACTOR, estimate_start_dimensions, pixel_budget, shrink_dimensions};
pub use operations::{
    ConvergeError, ConvergeLimits, Converged, ConvergenceState, converge, select_strategy,
    start_dimensions,
};
pub use params::{ColorDepth, EncodeStrategy, FormatFamily, Quality, SizeBudget, SourceFormat};
pub use rust_backend::{RustBackend, supported_input_extensions};
pub use transparency::has_significant_transparency;
