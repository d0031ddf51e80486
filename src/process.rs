//! Job runner: one job per input file.
//!
//! For each file:
//!
//! ```text
//! stat ──▶ within budget? ──yes──▶ untouched (never decoded)
//!              │ no
//!              ▼
//!          decode ──▶ classify transparency ──▶ select strategy
//!              │
//!              ▼
//!          converge (resample + encode, shrink 0.9 until it fits)
//!              │
//!              ▼
//!          drop decoded image ──▶ backup original ──▶ write result
//! ```
//!
//! ## Parallel Processing
//!
//! Jobs run in parallel using [rayon](https://docs.rs/rayon). They share no
//! mutable state: each returns a [`JobResult`], collected in input order, and
//! progress is streamed as [`ProcessEvent`]s over an optional channel so a
//! single printer thread owns the console.
//!
//! A failing job never stops the run. Its error is recorded and the other
//! jobs carry on.

use crate::config::{DecodeSource, FitConfig};
use crate::imaging::{
    BackendError, ColorDepth, ConvergeError, ConvergeLimits, ConvergenceState, Dimensions,
    EncodeStrategy, ImageBackend, ImageSource, Quality, RustBackend, SizeBudget, SourceFormat,
    SourceImage, converge, has_significant_transparency, select_strategy, start_dimensions,
};
use crate::replace::{self, ReplaceError};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Decode failed: {0}")]
    Decode(#[source] BackendError),
    #[error("Encode failed at {width}x{height}: {source}")]
    Encode {
        width: u32,
        height: u32,
        #[source]
        source: BackendError,
    },
    #[error(
        "size budget unattainable for this input ({} bytes at {}x{} after {} attempts, budget {budget} bytes)",
        .last.byte_len, .last.width, .last.height, .last.iteration
    )]
    BudgetUnattainable { last: ConvergenceState, budget: u64 },
    #[error("timed out after {} attempts at {}x{}", .last.iteration, .last.width, .last.height)]
    TimedOut { last: ConvergenceState },
    #[error(transparent)]
    Replace(#[from] ReplaceError),
}

impl From<ConvergeError> for JobError {
    fn from(err: ConvergeError) -> Self {
        match err {
            ConvergeError::Backend {
                width,
                height,
                source,
            } => JobError::Encode {
                width,
                height,
                source,
            },
            ConvergeError::Unattainable { last, budget } => {
                JobError::BudgetUnattainable { last, budget }
            }
            ConvergeError::TimedOut { last } => JobError::TimedOut { last },
        }
    }
}

/// Per-run settings, resolved from [`FitConfig`] and command-line flags.
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub budget: SizeBudget,
    /// JPEG quality when the source carries no quantization tables.
    pub default_quality: Quality,
    pub decode_source: DecodeSource,
    pub backup_dir: String,
    pub min_dimension: u32,
    pub max_iterations: u32,
    pub job_timeout: Option<Duration>,
    /// Run the engine but leave every file untouched.
    pub dry_run: bool,
}

impl ProcessSettings {
    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            budget: config.budget(),
            default_quality: config.quality(),
            decode_source: config.decode_source,
            backup_dir: config.backup_dir.clone(),
            min_dimension: config.limits.min_dimension,
            max_iterations: config.limits.max_iterations,
            job_timeout: config.limits.job_timeout(),
            dry_run: false,
        }
    }

    fn limits(&self, started: Instant) -> ConvergeLimits {
        ConvergeLimits {
            min_dimension: self.min_dimension,
            max_iterations: self.max_iterations,
            deadline: self.job_timeout.map(|t| started + t),
        }
    }
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self::from_config(&FitConfig::default())
    }
}

/// A decoded input file that is over budget.
///
/// Owns the decoded pixels exclusively; [`ImageJob::shrink`] consumes the job
/// and releases them as soon as the converged buffer exists.
#[derive(Debug)]
pub struct ImageJob {
    pub path: PathBuf,
    pub original_len: u64,
    source: SourceImage,
}

/// The converged buffer of a job, with the decoded image already released.
#[derive(Debug)]
pub struct ShrunkImage {
    pub bytes: Vec<u8>,
    pub dimensions: Dimensions,
    pub original_dimensions: Dimensions,
    pub strategy: EncodeStrategy,
    pub iterations: u32,
}

impl ImageJob {
    /// Decode `path` through `backend`.
    pub fn load(
        backend: &impl ImageBackend,
        path: &Path,
        original_len: u64,
        decode_source: DecodeSource,
    ) -> Result<Self, JobError> {
        let source = match decode_source {
            DecodeSource::Memory => {
                let data = fs::read(path).map_err(|source| JobError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                backend.decode(ImageSource::Bytes(&data))
            }
            DecodeSource::File => backend.decode(ImageSource::File(path)),
        }
        .map_err(JobError::Decode)?;

        Ok(Self {
            path: path.to_path_buf(),
            original_len,
            source,
        })
    }

    pub fn original_dimensions(&self) -> Dimensions {
        self.source.dimensions()
    }

    pub fn format(&self) -> SourceFormat {
        self.source.format
    }

    /// The strategy this job will run with. JPEG sources keep their own
    /// estimated quality; everything else uses `default_quality`.
    pub fn strategy(&self, default_quality: Quality) -> EncodeStrategy {
        let quality = self
            .source
            .jpeg_quality
            .map(|q| Quality::new(u32::from(q)))
            .unwrap_or(default_quality);
        let transparent = has_significant_transparency(&self.source.image);
        let depth = ColorDepth::from_color_type(self.source.image.color());
        select_strategy(self.source.format, transparent, depth, quality)
    }

    /// Run the convergence loop and release the decoded image.
    pub fn shrink(
        self,
        backend: &impl ImageBackend,
        settings: &ProcessSettings,
        limits: &ConvergeLimits,
    ) -> Result<ShrunkImage, JobError> {
        let original_dimensions = self.original_dimensions();
        let strategy = self.strategy(settings.default_quality);
        let start = start_dimensions(&strategy, original_dimensions, settings.budget);
        debug!(
            path = %self.path.display(),
            format = ?self.source.format,
            strategy = strategy.label(),
            %original_dimensions,
            %start,
            "converging"
        );

        let converged = converge(backend, &self.source, &strategy, start, settings.budget, limits)?;
        drop(self.source);

        Ok(ShrunkImage {
            dimensions: converged.encoded.dimensions,
            bytes: converged.encoded.bytes,
            original_dimensions,
            strategy,
            iterations: converged.iterations,
        })
    }
}

/// What happened to a file that was processed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Already at or under budget; not decoded, not touched.
    WithinBudget,
    /// Re-encoded, original backed up, result written.
    Resized,
    /// Re-encoded but not written (`--dry-run`).
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub path: PathBuf,
    pub outcome: JobOutcome,
    pub original_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_dimensions: Option<Dimensions>,
    pub final_len: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<EncodeStrategy>,
    pub iterations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

impl JobReport {
    fn within_budget(path: &Path, len: u64) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome: JobOutcome::WithinBudget,
            original_len: len,
            original_dimensions: None,
            final_len: len,
            final_dimensions: None,
            strategy: None,
            iterations: 0,
            backup: None,
        }
    }

    pub fn was_resized(&self) -> bool {
        self.outcome == JobOutcome::Resized
    }
}

#[derive(Debug)]
pub struct JobFailure {
    pub path: PathBuf,
    pub error: JobError,
}

pub type JobResult = Result<JobReport, JobFailure>;

/// Progress events streamed while a run is in flight.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started { total: usize },
    Finished(JobReport),
    Failed { path: PathBuf, error: String },
}

/// Counts per outcome over a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub resized: usize,
    pub within_budget: usize,
    pub dry_run: usize,
    pub failed: usize,
    pub bytes_saved: u64,
}

impl RunStats {
    pub fn from_results(results: &[JobResult]) -> Self {
        let mut stats = Self::default();
        for result in results {
            match result {
                Ok(report) => {
                    match report.outcome {
                        JobOutcome::WithinBudget => stats.within_budget += 1,
                        JobOutcome::Resized => stats.resized += 1,
                        JobOutcome::DryRun => stats.dry_run += 1,
                    }
                    stats.bytes_saved += report.original_len.saturating_sub(report.final_len);
                }
                Err(_) => stats.failed += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.resized + self.within_budget + self.dry_run + self.failed
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} resized, {} within budget",
            self.resized, self.within_budget
        )?;
        if self.dry_run > 0 {
            write!(f, ", {} would be resized", self.dry_run)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}

/// Process `paths` with the `image`-crate backend.
pub fn process(
    paths: &[PathBuf],
    settings: &ProcessSettings,
    progress: Option<Sender<ProcessEvent>>,
) -> Vec<JobResult> {
    let backend = RustBackend::new();
    process_with_backend(&backend, paths, settings, progress)
}

/// Process `paths` using a specific backend (allows testing with mock).
///
/// Results are returned in the order of `paths`.
pub fn process_with_backend(
    backend: &impl ImageBackend,
    paths: &[PathBuf],
    settings: &ProcessSettings,
    progress: Option<Sender<ProcessEvent>>,
) -> Vec<JobResult> {
    if let Some(tx) = &progress {
        tx.send(ProcessEvent::Started { total: paths.len() }).ok();
    }
    info!(
        files = paths.len(),
        budget = settings.budget.bytes(),
        dry_run = settings.dry_run,
        "processing"
    );

    paths
        .par_iter()
        .map_with(progress, |tx, path| {
            let result = process_file(backend, path, settings).map_err(|error| JobFailure {
                path: path.clone(),
                error,
            });
            if let Some(tx) = tx {
                let event = match &result {
                    Ok(report) => ProcessEvent::Finished(report.clone()),
                    Err(failure) => ProcessEvent::Failed {
                        path: failure.path.clone(),
                        error: failure.error.to_string(),
                    },
                };
                tx.send(event).ok();
            }
            result
        })
        .collect()
}

/// Run one job to completion.
pub fn process_file(
    backend: &impl ImageBackend,
    path: &Path,
    settings: &ProcessSettings,
) -> Result<JobReport, JobError> {
    let started = Instant::now();
    let original_len = fs::metadata(path)
        .map_err(|source| JobError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    if settings.budget.fits(original_len) {
        debug!(path = %path.display(), bytes = original_len, "within budget");
        return Ok(JobReport::within_budget(path, original_len));
    }

    let job = ImageJob::load(backend, path, original_len, settings.decode_source)?;
    let shrunk = job.shrink(backend, settings, &settings.limits(started))?;

    let backup = if settings.dry_run {
        None
    } else {
        Some(replace::backup_and_write(
            path,
            &shrunk.bytes,
            &settings.backup_dir,
        )?)
    };

    let final_len = shrunk.bytes.len() as u64;
    Ok(JobReport {
        path: path.to_path_buf(),
        outcome: if settings.dry_run {
            JobOutcome::DryRun
        } else {
            JobOutcome::Resized
        },
        original_len,
        original_dimensions: Some(shrunk.original_dimensions),
        final_len,
        final_dimensions: Some(shrunk.dimensions),
        strategy: Some(shrunk.strategy),
        iterations: shrunk.iterations,
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use image::DynamicImage;
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn dummy_file(dir: &Path, name: &str, len: usize) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0xAB; len]).unwrap();
        path
    }

    fn jpeg_source(w: u32, h: u32) -> SourceImage {
        SourceImage::new(DynamicImage::new_rgb8(w, h), SourceFormat::Jpeg)
    }

    /// RGBA, all pixels fully transparent.
    fn transparent_png_source(w: u32, h: u32) -> SourceImage {
        SourceImage::new(DynamicImage::new_rgba8(w, h), SourceFormat::Png)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    #[test]
    fn settings_from_config() {
        let mut config = FitConfig::default();
        config.max_bytes = 1234;
        config.default_quality = 70;
        config.limits.job_timeout_secs = 0;
        let settings = ProcessSettings::from_config(&config);

        assert_eq!(settings.budget, SizeBudget::new(1234));
        assert_eq!(settings.default_quality, Quality::new(70));
        assert_eq!(settings.job_timeout, None);
        assert_eq!(settings.backup_dir, "Backup");
        assert!(!settings.dry_run);
    }

    // =========================================================================
    // End-to-end scenarios with the mock backend
    // =========================================================================

    #[test]
    fn oversized_jpeg_shrinks_from_original_dimensions() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "photo.jpg", 5_000_000);
        let backend = MockBackend::bytes_per_pixel(5_000_000.0 / 12_000_000.0)
            .with_source(jpeg_source(4000, 3000));

        let report = process_file(&backend, &path, &ProcessSettings::default()).unwrap();

        assert_eq!(report.outcome, JobOutcome::Resized);
        assert_eq!(
            report.strategy,
            Some(EncodeStrategy::QualityPreserving {
                quality: Quality::new(90)
            })
        );
        assert_eq!(backend.encode_sizes()[0], (4000, 3000));
        assert_eq!(report.final_dimensions, Some(Dimensions::new(2916, 2187)));
        assert_eq!(report.iterations, 4);
        assert!(report.final_len <= SizeBudget::DEFAULT.bytes());

        let backup = tmp.path().join("Backup").join("photo.jpg");
        assert_eq!(report.backup.as_deref(), Some(backup.as_path()));
        assert_eq!(fs::metadata(&backup).unwrap().len(), 5_000_000);
        assert_eq!(fs::metadata(&path).unwrap().len(), report.final_len);
    }

    #[test]
    fn source_quality_overrides_default() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "q.jpg", 3_000_000);
        let mut source = jpeg_source(100, 100);
        source.jpeg_quality = Some(75);
        let backend = MockBackend::bytes_per_pixel(1.0).with_source(source);

        let report = process_file(&backend, &path, &ProcessSettings::default()).unwrap();
        assert_eq!(
            report.strategy,
            Some(EncodeStrategy::QualityPreserving {
                quality: Quality::new(75)
            })
        );
    }

    #[test]
    fn transparent_png_starts_from_estimate() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "logo.png", 4_000_000);
        let backend = MockBackend::bytes_per_pixel(2.0).with_source(transparent_png_source(2000, 2000));

        let report = process_file(&backend, &path, &ProcessSettings::default()).unwrap();

        assert_eq!(
            report.strategy,
            Some(EncodeStrategy::DimensionReducing {
                depth: ColorDepth::new(32)
            })
        );
        // 1201² × 2 is just over budget, one shrink fits
        assert_eq!(backend.encode_sizes(), vec![(1201, 1201), (1080, 1080)]);
        let dims = report.final_dimensions.unwrap();
        assert!(dims.width < 2000 && dims.height < 2000);
        assert!(report.final_len <= SizeBudget::DEFAULT.bytes());
        assert!(tmp.path().join("Backup/logo.png").exists());
    }

    #[test]
    fn dimension_reducing_keeps_aspect_ratio() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "wide.png", 4_000_000);
        let backend =
            MockBackend::bytes_per_pixel(4.0).with_source(transparent_png_source(3000, 1000));

        let report = process_file(&backend, &path, &ProcessSettings::default()).unwrap();

        let dims = report.final_dimensions.unwrap();
        assert!(dims.width <= 3000 && dims.height <= 1000);
        let ratio = f64::from(dims.width) / f64::from(dims.height);
        assert!((ratio - 3.0).abs() < 0.05, "ratio drifted to {ratio}");
    }

    #[test]
    fn opaque_png_becomes_quality_preserving() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "shot.png", 3_000_000);
        let backend = MockBackend::bytes_per_pixel(0.1).with_source(SourceImage::new(
            DynamicImage::new_rgb8(1920, 1080),
            SourceFormat::Png,
        ));

        let report = process_file(&backend, &path, &ProcessSettings::default()).unwrap();
        assert_eq!(
            report.strategy.map(|s| s.label()),
            Some("jpeg")
        );
        assert_eq!(backend.encode_sizes(), vec![(1920, 1080)]);
    }

    #[test]
    fn within_budget_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "small.jpg", 1_000);
        let backend = MockBackend::bytes_per_pixel(1.0);

        let report = process_file(&backend, &path, &ProcessSettings::default()).unwrap();

        assert_eq!(report.outcome, JobOutcome::WithinBudget);
        assert_eq!(report.iterations, 0);
        assert!(backend.get_operations().is_empty());
        assert!(!tmp.path().join("Backup").exists());
        assert_eq!(fs::read(&path).unwrap(), vec![0xAB; 1_000]);
    }

    #[test]
    fn exactly_at_budget_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "edge.jpg", 1_000);
        let backend = MockBackend::bytes_per_pixel(1.0);
        let settings = ProcessSettings {
            budget: SizeBudget::new(1_000),
            ..ProcessSettings::default()
        };

        let report = process_file(&backend, &path, &settings).unwrap();
        assert_eq!(report.outcome, JobOutcome::WithinBudget);
    }

    #[test]
    fn converged_output_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "photo.jpg", 5_000_000);
        let backend = MockBackend::bytes_per_pixel(5_000_000.0 / 12_000_000.0)
            .with_source(jpeg_source(4000, 3000));
        process_file(&backend, &path, &ProcessSettings::default()).unwrap();

        let second = MockBackend::bytes_per_pixel(1.0);
        let report = process_file(&second, &path, &ProcessSettings::default()).unwrap();

        assert_eq!(report.outcome, JobOutcome::WithinBudget);
        assert_eq!(report.iterations, 0);
        assert!(second.get_operations().is_empty());
    }

    #[test]
    fn dry_run_leaves_files_alone() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "photo.jpg", 5_000_000);
        let backend = MockBackend::bytes_per_pixel(0.1).with_source(jpeg_source(4000, 3000));
        let settings = ProcessSettings {
            dry_run: true,
            ..ProcessSettings::default()
        };

        let report = process_file(&backend, &path, &settings).unwrap();

        assert_eq!(report.outcome, JobOutcome::DryRun);
        assert!(report.backup.is_none());
        assert!(!tmp.path().join("Backup").exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 5_000_000);
    }

    #[test]
    fn unattainable_budget_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "noise.png", 4_000_000);
        let backend =
            MockBackend::new(|_, _, _| 4_000_000).with_source(transparent_png_source(64, 64));

        let err = process_file(&backend, &path, &ProcessSettings::default()).unwrap_err();

        assert!(matches!(err, JobError::BudgetUnattainable { .. }));
        assert!(err.to_string().contains("size budget unattainable"));
        assert!(!tmp.path().join("Backup").exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), 4_000_000);
    }

    #[test]
    fn narrow_strip_below_min_dimension_is_left_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "strip.jpg", 4_000_000);
        let backend = MockBackend::bytes_per_pixel(0.5).with_source(jpeg_source(4000, 40));
        let settings = ProcessSettings {
            budget: SizeBudget::new(50_000),
            min_dimension: 50,
            ..ProcessSettings::default()
        };

        let err = process_file(&backend, &path, &settings).unwrap_err();

        assert!(matches!(err, JobError::BudgetUnattainable { .. }));
        assert!(
            backend
                .encode_sizes()
                .iter()
                .all(|&(w, h)| w <= 4000 && h <= 40)
        );
        assert_eq!(fs::metadata(&path).unwrap().len(), 4_000_000);
        assert!(!tmp.path().join("Backup").exists());
    }

    #[test]
    fn expired_timeout_reports_timed_out() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "slow.jpg", 4_000_000);
        let backend =
            MockBackend::new(|_, _, _| 4_000_000).with_source(jpeg_source(100, 100));
        let settings = ProcessSettings {
            job_timeout: Some(Duration::ZERO),
            ..ProcessSettings::default()
        };

        let err = process_file(&backend, &path, &settings).unwrap_err();
        assert!(matches!(err, JobError::TimedOut { .. }));
    }

    #[test]
    fn decode_failure_is_reported() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "broken.jpg", 4_000_000);
        let backend = MockBackend::bytes_per_pixel(1.0);

        let err = process_file(&backend, &path, &ProcessSettings::default()).unwrap_err();
        assert!(matches!(err, JobError::Decode(_)));
        assert_eq!(backend.get_operations(), vec![RecordedOp::Decode]);
    }

    #[test]
    fn missing_file_is_read_error() {
        let tmp = TempDir::new().unwrap();
        let backend = MockBackend::bytes_per_pixel(1.0);
        let err = process_file(
            &backend,
            &tmp.path().join("missing.jpg"),
            &ProcessSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, JobError::Read { .. }));
    }

    #[test]
    fn existing_backup_blocks_replacement() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "photo.jpg", 5_000_000);
        fs::create_dir(tmp.path().join("Backup")).unwrap();
        fs::write(tmp.path().join("Backup/photo.jpg"), b"older").unwrap();
        let backend = MockBackend::bytes_per_pixel(0.1).with_source(jpeg_source(4000, 3000));

        let err = process_file(&backend, &path, &ProcessSettings::default()).unwrap_err();

        assert!(matches!(
            err,
            JobError::Replace(ReplaceError::BackupExists(_))
        ));
        assert_eq!(fs::metadata(&path).unwrap().len(), 5_000_000);
    }

    #[test]
    fn file_decode_source_skips_read() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "photo.jpg", 4_000_000);
        let backend = MockBackend::bytes_per_pixel(0.1).with_source(jpeg_source(1000, 1000));
        let settings = ProcessSettings {
            decode_source: DecodeSource::File,
            ..ProcessSettings::default()
        };

        let report = process_file(&backend, &path, &settings).unwrap();
        assert_eq!(report.outcome, JobOutcome::Resized);
    }

    // =========================================================================
    // Batch runs
    // =========================================================================

    #[test]
    fn failures_do_not_stop_the_run() {
        let tmp = TempDir::new().unwrap();
        let small = dummy_file(tmp.path(), "a.jpg", 100);
        let broken = dummy_file(tmp.path(), "b.jpg", 4_000_000);
        let small2 = dummy_file(tmp.path(), "c.png", 200);
        // No queued sources: any decode fails
        let backend = MockBackend::bytes_per_pixel(1.0);

        let paths = vec![small.clone(), broken.clone(), small2.clone()];
        let results = process_with_backend(&backend, &paths, &ProcessSettings::default(), None);

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().path, small);
        assert_eq!(results[1].as_ref().unwrap_err().path, broken);
        assert_eq!(results[2].as_ref().unwrap().path, small2);

        let stats = RunStats::from_results(&results);
        assert_eq!(stats.within_budget, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn same_file_twice_never_loses_the_original() {
        let tmp = TempDir::new().unwrap();
        let path = dummy_file(tmp.path(), "dup.jpg", 5_000_000);
        let backend = MockBackend::bytes_per_pixel(5_000_000.0 / 12_000_000.0)
            .with_source(jpeg_source(4000, 3000))
            .with_source(jpeg_source(4000, 3000));

        let paths = vec![path.clone(), path.clone()];
        let results = process_with_backend(&backend, &paths, &ProcessSettings::default(), None);

        let stats = RunStats::from_results(&results);
        assert_eq!(stats.resized, 1);
        assert_eq!(
            fs::read(tmp.path().join("Backup/dup.jpg")).unwrap(),
            vec![0xAB; 5_000_000]
        );
        assert!(fs::metadata(&path).unwrap().len() <= SizeBudget::DEFAULT.bytes());
    }

    #[test]
    fn progress_events_are_streamed() {
        let tmp = TempDir::new().unwrap();
        let paths = vec![
            dummy_file(tmp.path(), "a.jpg", 10),
            dummy_file(tmp.path(), "b.jpg", 4_000_000),
        ];
        let backend = MockBackend::bytes_per_pixel(1.0);
        let (tx, rx) = mpsc::channel();

        process_with_backend(&backend, &paths, &ProcessSettings::default(), Some(tx));
        let events: Vec<ProcessEvent> = rx.iter().collect();

        assert!(matches!(events[0], ProcessEvent::Started { total: 2 }));
        assert_eq!(events.len(), 3);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ProcessEvent::Finished(_)))
                .count(),
            1
        );
        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::Failed { error, .. } if error.contains("Decode failed")
        )));
    }

    #[test]
    fn run_stats_display() {
        let stats = RunStats {
            resized: 2,
            within_budget: 5,
            dry_run: 0,
            failed: 1,
            bytes_saved: 0,
        };
        assert_eq!(stats.to_string(), "2 resized, 5 within budget, 1 failed");

        let stats = RunStats {
            dry_run: 3,
            ..RunStats::default()
        };
        assert_eq!(
            stats.to_string(),
            "0 resized, 0 within budget, 3 would be resized"
        );
    }

    #[test]
    fn report_serializes_outcome() {
        let report = JobReport::within_budget(Path::new("a.jpg"), 10);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcome"], "within_budget");
        assert_eq!(json["iterations"], 0);
        assert!(json.get("backup").is_none());
    }
}
