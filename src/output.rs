//! CLI output formatting.
//!
//! # Output Format
//!
//! One line per file as jobs finish, then a summary:
//!
//! ```text
//! 4000x3000 4.8 MiB => 2916x2187 2.5 MiB : IMG_0042.jpg
//! 512.0 KiB within budget : icon.png
//! failed : scan.bmp : Decode failed: ...
//!
//! 1 resized, 1 within budget, 1 failed (saved 2.3 MiB)
//! ```
//!
//! With `--json` the per-file results are printed as one JSON array instead.
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `String` or `Vec<String>`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects. Diagnostics go through
//! `tracing` to stderr and never mix with these lines.

use crate::process::{JobOutcome, JobReport, JobResult, ProcessEvent, RunStats};
use serde::Serialize;
use std::path::Path;

/// Human-readable byte size with one decimal.
///
/// Units switch at 1000 B, 1000 KiB and 1000 MiB so the number never shows
/// four integer digits.
pub fn human_size(bytes: u64) -> String {
    let size = bytes as f64;
    if bytes < 1000 {
        format!("{size:.1} B")
    } else if bytes < 1_024_000 {
        format!("{:.1} KiB", size / 1024.0)
    } else if bytes < 1_048_576_000 {
        format!("{:.1} MiB", size / 1_048_576.0)
    } else {
        format!("{:.1} GiB", size / 1_073_741_824.0)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One line for a finished job.
pub fn format_job_line(report: &JobReport) -> String {
    let name = file_name(&report.path);
    match (report.original_dimensions, report.final_dimensions) {
        (Some(before), Some(after)) => {
            let line = format!(
                "{before} {} => {after} {} : {name}",
                human_size(report.original_len),
                human_size(report.final_len),
            );
            if report.outcome == JobOutcome::DryRun {
                format!("{line} (dry run)")
            } else {
                line
            }
        }
        _ => format!("{} within budget : {name}", human_size(report.original_len)),
    }
}

/// One line for a failed job.
pub fn format_failure_line(path: &Path, error: &str) -> String {
    format!("failed : {} : {error}", file_name(path))
}

/// Format a progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started { total } => match total {
            0 => vec!["No images to process".to_string()],
            1 => vec!["Processing 1 image".to_string()],
            n => vec![format!("Processing {n} images")],
        },
        ProcessEvent::Finished(report) => vec![format_job_line(report)],
        ProcessEvent::Failed { path, error } => vec![format_failure_line(path, error)],
    }
}

/// Closing summary line.
pub fn format_summary(stats: &RunStats) -> String {
    if stats.bytes_saved > 0 {
        format!("{stats} (saved {})", human_size(stats.bytes_saved))
    } else {
        stats.to_string()
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonEntry<'a> {
    Done(&'a JobReport),
    Failed {
        path: &'a Path,
        outcome: &'static str,
        error: String,
    },
}

/// All job results as a pretty-printed JSON array, in input order.
pub fn json_report(results: &[JobResult]) -> serde_json::Result<String> {
    let entries: Vec<JsonEntry<'_>> = results
        .iter()
        .map(|result| match result {
            Ok(report) => JsonEntry::Done(report),
            Err(failure) => JsonEntry::Failed {
                path: &failure.path,
                outcome: "failed",
                error: failure.error.to_string(),
            },
        })
        .collect();
    serde_json::to_string_pretty(&entries)
}

/// Print a progress event to stdout.
pub fn print_process_event(event: &ProcessEvent) {
    for line in format_process_event(event) {
        println!("{}", line);
    }
}

/// Print the summary line to stdout.
pub fn print_summary(stats: &RunStats) {
    println!();
    println!("{}", format_summary(stats));
}
