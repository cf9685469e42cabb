//! CLI output formatting.
//!
//! Output leads with what was asked for and what came back; paths and
//! byte counts are secondary, indented context.
//!
//! # Output Format
//!
//! ## Resize
//!
//! ```text
//! photo.jpg (1920x1080, 245.1 KB)
//!     001 photo-1280x720.jpeg 1280x720 q80
//!     002 photo-640x360.jpeg 640x360 q80
//!
//! photo_resized_images.zip (96.4 KB)
//!     001 photo.jpeg 1920x1080 (201.5 KB)
//!     ...
//! ```
//!
//! ## Failure
//!
//! ```text
//! Failed [transform_failure]: Image processing failed for broken.png: ...
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::imaging::resolve_output;
use crate::types::{DownloadState, ImageDimensionsResizeJob, JobFailure};
use std::io::Cursor;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count with one decimal.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

// ============================================================================
// Job request
// ============================================================================

/// Describe a job before it is submitted: the source, then each target.
pub fn format_job_request(source_name: &str, job: &ImageDimensionsResizeJob) -> Vec<String> {
    let mut lines = Vec::new();
    let size = human_size(job.original_image.len() as u64);
    match &job.origin {
        Some(origin) => lines.push(format!(
            "{} ({}x{}, {})",
            source_name, origin.width, origin.height, size
        )),
        None => lines.push(format!("{} ({})", source_name, size)),
    }
    for (i, dim) in job.dimensions.iter().enumerate() {
        // Same naming as the archive entry; an unencodable format is shown raw.
        let name = resolve_output(&dim.filename, &dim.image_format)
            .map(|(name, _)| name)
            .unwrap_or_else(|_| format!("{}.{}", dim.filename, dim.image_format));
        lines.push(format!(
            "{}{} {} {}x{} q{}",
            indent(1),
            format_index(i + 1),
            name,
            dim.width,
            dim.height,
            dim.quality
        ));
    }
    lines
}

pub fn print_job_request(source_name: &str, job: &ImageDimensionsResizeJob) {
    for line in format_job_request(source_name, job) {
        println!("{}", line);
    }
}

// ============================================================================
// Archive
// ============================================================================

/// List the entries of a finished archive in order with their sizes.
pub fn format_archive(archive_name: &str, zip_buffer: &[u8]) -> Vec<String> {
    let mut lines = vec![format!(
        "{} ({})",
        archive_name,
        human_size(zip_buffer.len() as u64)
    )];
    let mut archive = match zip::ZipArchive::new(Cursor::new(zip_buffer)) {
        Ok(archive) => archive,
        Err(e) => {
            lines.push(format!("{}unreadable archive: {}", indent(1), e));
            return lines;
        }
    };
    for i in 0..archive.len() {
        match archive.by_index(i) {
            Ok(entry) => lines.push(format!(
                "{}{} {} ({})",
                indent(1),
                format_index(i + 1),
                entry.name(),
                human_size(entry.size())
            )),
            Err(e) => lines.push(format!("{}{} <{}>", indent(1), format_index(i + 1), e)),
        }
    }
    lines
}

pub fn print_archive(archive_name: &str, zip_buffer: &[u8]) {
    for line in format_archive(archive_name, zip_buffer) {
        println!("{}", line);
    }
}

// ============================================================================
// Failures and self-test
// ============================================================================

pub fn format_failure(failure: &JobFailure) -> Vec<String> {
    vec![format!("Failed [{}]: {}", failure.kind.code(), failure.message)]
}

/// Self-test verdict, followed by the archive listing on success.
pub fn format_self_test(state: &DownloadState, elapsed: Duration) -> Vec<String> {
    match state {
        DownloadState::Success { zip_buffer } => {
            let mut lines = vec![format!(
                "Self-test passed in {} ms",
                elapsed.as_millis()
            )];
            lines.extend(format_archive("self-test.zip", zip_buffer));
            lines
        }
        DownloadState::Failure(failure) => {
            let mut lines = vec![format!(
                "Self-test failed after {} ms",
                elapsed.as_millis()
            )];
            lines.extend(
                format_failure(failure)
                    .into_iter()
                    .map(|l| format!("{}{}", indent(1), l)),
            );
            lines
        }
    }
}

pub fn print_self_test(state: &DownloadState, elapsed: Duration) {
    for line in format_self_test(state, elapsed) {
        println!("{}", line);
    }
}
