//! The size-convergence engine.
//!
//! These functions combine calculations with backend execution:
//! [`select_strategy`] picks how an image is re-encoded, [`start_dimensions`]
//! seeds the first attempt, and [`converge`] repeats resample + encode,
//! shrinking by [`SHRINK_FACTOR`](super::calculations::SHRINK_FACTOR) until
//! the result fits the budget.
//!
//! The loop is memoryless: only the previous attempt is kept, there is no
//! search or backtracking. Encoded size usually drops with pixel count but
//! that is not guaranteed for every codec, so the loop is bounded by a
//! minimum dimension, an attempt cap and an optional deadline.

use super::backend::{BackendError, Dimensions, Encoded, ImageBackend, SourceImage};
use super::calculations::{estimate_start_dimensions, shrink_dimensions};
use super::params::{ColorDepth, EncodeStrategy, FormatFamily, Quality, SizeBudget, SourceFormat};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Choose the encode strategy for one image. Called once, before the loop.
///
/// JPEG sources, and any source without significant transparency, are
/// re-encoded as JPEG at `quality`. Lossless sources with real transparency
/// are re-encoded as PNG at their own color depth.
pub fn select_strategy(
    format: SourceFormat,
    transparent: bool,
    depth: ColorDepth,
    quality: Quality,
) -> EncodeStrategy {
    if format.family() == FormatFamily::LossyPhotographic || !transparent {
        EncodeStrategy::QualityPreserving { quality }
    } else {
        EncodeStrategy::DimensionReducing { depth }
    }
}

/// Dimensions of the first attempt for `strategy`.
///
/// Quality-preserving starts at the original size; dimension-reducing starts
/// from the pixel-budget estimate.
pub fn start_dimensions(
    strategy: &EncodeStrategy,
    original: Dimensions,
    budget: SizeBudget,
) -> Dimensions {
    match strategy {
        EncodeStrategy::QualityPreserving { .. } => original,
        EncodeStrategy::DimensionReducing { depth } => {
            let (w, h) = estimate_start_dimensions(budget, *depth, original.as_tuple());
            Dimensions::new(w, h)
        }
    }
}

/// Bounds that keep the loop finite on incompressible input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergeLimits {
    /// Neither edge may shrink below this.
    pub min_dimension: u32,
    /// Maximum number of encode attempts.
    pub max_iterations: u32,
    /// Give up once this instant has passed.
    pub deadline: Option<Instant>,
}

impl Default for ConvergeLimits {
    fn default() -> Self {
        Self {
            min_dimension: 1,
            max_iterations: 200,
            deadline: None,
        }
    }
}

/// The last attempt: its dimensions, measured length, and attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceState {
    pub width: u32,
    pub height: u32,
    pub byte_len: u64,
    pub iteration: u32,
}

/// A result that fits the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged {
    pub encoded: Encoded,
    /// Number of encode attempts, including the final one.
    pub iterations: u32,
}

#[derive(Error, Debug)]
pub enum ConvergeError {
    #[error("encode failed at {width}x{height}: {source}")]
    Backend {
        width: u32,
        height: u32,
        #[source]
        source: BackendError,
    },
    #[error(
        "size budget unattainable for this input: {} bytes at {}x{} after {} attempts (budget {budget} bytes)",
        .last.byte_len, .last.width, .last.height, .last.iteration
    )]
    Unattainable { last: ConvergenceState, budget: u64 },
    #[error(
        "timed out after {} attempts ({}x{}, {} bytes)",
        .last.iteration, .last.width, .last.height, .last.byte_len
    )]
    TimedOut { last: ConvergenceState },
}

/// Re-encode `source` until the result fits `budget`.
///
/// Each attempt resamples to the current dimensions and encodes with the
/// fixed `strategy`. If the result is over budget both edges are multiplied by
/// 0.9 (truncating) and the loop repeats.
///
/// # Errors
/// * [`ConvergeError::Backend`] - an attempt failed to encode
/// * [`ConvergeError::Unattainable`] - the next shrink would go below
///   `limits.min_dimension`, or `limits.max_iterations` attempts were spent
/// * [`ConvergeError::TimedOut`] - `limits.deadline` passed
pub fn converge(
    backend: &impl ImageBackend,
    source: &SourceImage,
    strategy: &EncodeStrategy,
    start: Dimensions,
    budget: SizeBudget,
    limits: &ConvergeLimits,
) -> Result<Converged, ConvergeError> {
    // Never upscale: an edge that starts below the floor becomes its own floor
    let mut width = start.width.max(1);
    let mut height = start.height.max(1);
    let floor = limits.min_dimension.max(1);
    let (min_w, min_h) = (floor.min(width), floor.min(height));
    let mut iteration = 0;

    loop {
        let encoded = backend
            .resample_encode(source, width, height, strategy)
            .map_err(|source| ConvergeError::Backend {
                width,
                height,
                source,
            })?;
        iteration += 1;

        let state = ConvergenceState {
            width,
            height,
            byte_len: encoded.len(),
            iteration,
        };
        debug!(
            iteration,
            width,
            height,
            bytes = state.byte_len,
            budget = budget.bytes(),
            strategy = strategy.label(),
            "encode attempt"
        );

        if budget.fits(state.byte_len) {
            return Ok(Converged {
                encoded,
                iterations: iteration,
            });
        }

        if iteration >= limits.max_iterations {
            return Err(ConvergeError::Unattainable {
                last: state,
                budget: budget.bytes(),
            });
        }
        if limits.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ConvergeError::TimedOut { last: state });
        }

        let (next_w, next_h) = shrink_dimensions(width, height);
        if next_w < min_w || next_h < min_h {
            return Err(ConvergeError::Unattainable {
                last: state,
                budget: budget.bytes(),
            });
        }
        width = next_w;
        height = next_h;
    }
}
