//! # fitsize
//!
//! Shrinks oversized photos in place until each fits a byte budget (2.75 MiB
//! by default), keeping the original in a `Backup/` directory next to it.
//!
//! # Architecture: One Job Per File
//!
//! ```text
//! 1. Select   files / directory  →  candidate paths   (extension filter)
//! 2. Process  path               →  JobResult          (parallel, independent)
//! 3. Report   JobResults         →  stdout             (lines or JSON)
//! ```
//!
//! A job that is already within budget is reported and left alone; it is never
//! decoded. Everything else is decoded, classified, and pushed through the
//! convergence loop in [`imaging::operations`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Input selection: explicit files or a non-recursive directory scan |
//! | [`process`] | Job runner: decode, select strategy, converge, replace; rayon fan-out |
//! | [`imaging`] | Transparency check, strategy selection, shrink loop, `image`-crate backend |
//! | [`replace`] | Backup-then-write replacement of the original file |
//! | [`config`] | `config.toml` loading, validation, and merging over stock defaults |
//! | [`output`] | CLI output formatting: per-file lines, summary, JSON report |
//! | [`logging`] | `tracing` subscriber setup (stderr) |
//!
//! # Design Decisions
//!
//! ## Two Strategies, Chosen Once
//!
//! JPEG sources and anything without real transparency are re-encoded as JPEG
//! at a fixed quality: the quality estimated from the source's quantization
//! tables, or the configured default. Only dimensions change between attempts.
//! Images with visible transparency are re-encoded as PNG at their own color
//! depth, starting from an estimate of how many pixels fit the budget.
//!
//! ## Geometric Shrinking
//!
//! Every over-budget attempt multiplies both edges by 0.9 and tries again.
//! There is no search and no backtracking, so the result is not the largest
//! image that fits, only one that does. The loop is bounded by a minimum edge,
//! an attempt cap, and a per-file deadline; an input that cannot fit is
//! reported as a distinct failure and left untouched.
//!
//! ## Backup Before Write
//!
//! The original is moved into the backup directory before the new bytes are
//! written, and an existing backup is never overwritten. At any point either
//! the original or its backup is on disk.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling, and encoding use the `image` crate only. The binary
//! has no system dependencies.

pub mod config;
pub mod imaging;
pub mod logging;
pub mod output;
pub mod process;
pub mod replace;
pub mod scan;
