//! Security gate for untrusted input.
//!
//! Everything that reaches the decoders or the filesystem passes through
//! here first: dropped file paths, raw image buffers, and the dimension list
//! built by the UI.
//!
//! | Check | Function |
//! |---|---|
//! | Path traversal | [`validate_file_path`] |
//! | File size, extension, magic bytes | [`validate_file`] |
//! | Buffer presence and size | [`validate_image_buffer`] |
//! | Dimension list shape and bounds | [`validate_image_dimensions`] |
//! | Filename cleanup | [`sanitize_filename`] |
//! | Concurrency admission | [`JobSlots`] |
//!
//! Validators never repair input. [`validate_image_dimensions`] rejects a
//! filename that differs from its sanitized form instead of silently using
//! the cleaned one, so the caller always knows which name ends up in the
//! archive.

mod magic;
mod paths;
mod slots;

pub use magic::{DetectedFormat, HEADER_LEN, detect_format, validate_header};
pub use paths::{ALLOWED_EXTENSIONS, validate_file, validate_file_path};
pub use slots::{JobSlot, JobSlots};

use crate::types::{ImageDimension, ImageSource};
use thiserror::Error;

/// Default upper bound for an input image: 100 MiB.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Default upper bound for a target width or height.
pub const MAX_DIMENSION: u32 = 10_000;
/// Default upper bound for the number of requested outputs per job.
pub const MAX_DIMENSIONS_PER_JOB: usize = 20;
/// Default number of jobs admitted at the same time.
pub const MAX_CONCURRENT_JOBS: usize = 3;
/// Longest filename, in bytes, that [`sanitize_filename`] produces.
pub const MAX_FILENAME_LEN: usize = 255;

const FALLBACK_FILENAME: &str = "untitled";

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Path traversal detected: {0}")]
    PathTraversal(String),
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("Invalid image buffer: {0}")]
    InvalidImageBuffer(String),
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
    #[error("Too many concurrent operations: maximum {max} jobs allowed")]
    TooManyJobs { max: usize },
}

/// Runtime bounds every validator is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_file_size: u64,
    pub max_dimension: u32,
    pub max_dimensions_per_job: usize,
    pub max_concurrent_jobs: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            max_dimension: MAX_DIMENSION,
            max_dimensions_per_job: MAX_DIMENSIONS_PER_JOB,
            max_concurrent_jobs: MAX_CONCURRENT_JOBS,
        }
    }
}

fn megabytes(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0 / 1024.0).round() as u64
}

/// Normalize any [`ImageSource`] representation to one byte slice and check
/// that it is non-empty and within `limits.max_file_size`.
pub fn validate_image_buffer<'a>(
    source: &'a ImageSource,
    limits: &Limits,
) -> Result<&'a [u8], SecurityError> {
    let bytes = source.as_bytes();
    if bytes.is_empty() {
        return Err(SecurityError::InvalidImageBuffer(
            "image buffer is empty".into(),
        ));
    }
    if bytes.len() as u64 > limits.max_file_size {
        return Err(SecurityError::InvalidImageBuffer(format!(
            "buffer too large: {}MB exceeds {}MB limit",
            megabytes(bytes.len() as u64),
            megabytes(limits.max_file_size)
        )));
    }
    Ok(bytes)
}

/// Validate the requested outputs of a job: 1 to `max_dimensions_per_job`
/// entries, each passing [`validate_dimension`].
pub fn validate_image_dimensions(
    dimensions: &[ImageDimension],
    limits: &Limits,
) -> Result<(), SecurityError> {
    if dimensions.is_empty() {
        return Err(SecurityError::InvalidDimensions(
            "at least one dimension is required".into(),
        ));
    }
    if dimensions.len() > limits.max_dimensions_per_job {
        return Err(SecurityError::InvalidDimensions(format!(
            "too many dimensions: maximum {} allowed",
            limits.max_dimensions_per_job
        )));
    }
    dimensions
        .iter()
        .try_for_each(|dim| validate_dimension(dim, limits))
}

/// Validate a single dimension entry.
pub fn validate_dimension(dim: &ImageDimension, limits: &Limits) -> Result<(), SecurityError> {
    let max = limits.max_dimension;
    if dim.width == 0 || dim.height == 0 || dim.width > max || dim.height > max {
        return Err(SecurityError::InvalidDimensions(format!(
            "width/height must be between 1 and {max}, got {}x{}",
            dim.width, dim.height
        )));
    }
    if dim.filename.is_empty() {
        return Err(SecurityError::InvalidDimensions(
            "filename must be a non-empty string".into(),
        ));
    }
    let sanitized = sanitize_filename(&dim.filename);
    if sanitized != dim.filename {
        return Err(SecurityError::InvalidDimensions(format!(
            "filename contains forbidden characters. Use: {sanitized}"
        )));
    }
    if dim.image_format.is_empty() {
        return Err(SecurityError::InvalidDimensions(
            "imageFormat must be specified".into(),
        ));
    }
    if dim.quality > 100 {
        return Err(SecurityError::InvalidDimensions(format!(
            "quality must be between 0 and 100, got {}",
            dim.quality
        )));
    }
    Ok(())
}

/// Turn an arbitrary string into a safe archive entry name.
///
/// Path separators and shell-special characters become `_`, `..` sequences
/// collapse to `_`, leading dots and surrounding whitespace are removed, and
/// the result is cut to [`MAX_FILENAME_LEN`] bytes keeping the extension.
/// An empty result becomes `"untitled"`.
///
/// Idempotent: `sanitize_filename(&sanitize_filename(x)) == sanitize_filename(x)`.
pub fn sanitize_filename(filename: &str) -> String {
    // Truncation can expose a trailing dot next to the extension, so repeat
    // until nothing changes. Every changing pass strictly shrinks the string
    // or removes forbidden characters, which bounds the loop.
    let mut current = sanitize_once(filename);
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_once(filename: &str) -> String {
    let replaced: String = filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            other => other,
        })
        .collect();
    let collapsed = replaced.replace("..", "_");
    let trimmed = collapsed
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .trim_end();

    if trimmed.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }
    if trimmed.len() <= MAX_FILENAME_LEN {
        return trimmed.to_string();
    }
    truncate_keeping_extension(trimmed)
}

fn truncate_keeping_extension(name: &str) -> String {
    let ext = match name.rfind('.') {
        Some(pos) if pos > 0 && name.len() - pos < MAX_FILENAME_LEN => &name[pos..],
        _ => "",
    };
    let stem = &name[..name.len() - ext.len()];
    let budget = MAX_FILENAME_LEN - ext.len();
    let mut cut = budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    let stem = stem[..cut].trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    format!("{stem}{ext}")
}
