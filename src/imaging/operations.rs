//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take caller-facing types, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::calculations::fit_within;
use super::params::{EncodeFormat, Quality, ResizeParams};
use crate::naming::extension_of;
use crate::types::{DEFAULT_QUALITY, ImageFormat, ImageSource};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_image_dimensions(backend: &impl ImageBackend, source: &[u8]) -> Result<(u32, u32)> {
    let dims = backend.identify(source)?;
    Ok((dims.width, dims.height))
}

/// Resize `source` to exactly `size` and encode it as `format`.
///
/// The output fills the target box; the source aspect ratio is not kept
/// unless `size` already matches it. A quality of 0 means "unset" and falls
/// back to the default.
pub fn get_resize_image_buffer(
    backend: &impl ImageBackend,
    source: &ImageSource,
    format: &ImageFormat,
    quality: u8,
    size: (u32, u32),
) -> Result<Vec<u8>> {
    let bytes = source.as_bytes();
    if bytes.is_empty() {
        return Err(BackendError::Decode("image buffer is empty".into()));
    }
    let (width, height) = size;
    if width == 0 || height == 0 {
        return Err(BackendError::InvalidTarget(format!("{width}x{height}")));
    }
    let format = EncodeFormat::from_image_format(format).ok_or_else(|| BackendError::Encode {
        format: format.to_string(),
        message: "unsupported output format".into(),
    })?;
    let quality = if quality == 0 { DEFAULT_QUALITY } else { quality };

    backend.resize(
        bytes,
        &ResizeParams {
            width,
            height,
            format,
            quality: Quality::new(quality),
        },
    )
}

/// Fit the source image into each `[max_width, max_height]` box.
///
/// Returns one size per box, in order, each the largest size inside the box
/// that keeps the source aspect ratio.
pub fn get_resize_image_dimensions(
    backend: &impl ImageBackend,
    source: &[u8],
    max_sizes: &[(u32, u32)],
) -> Result<Vec<(u32, u32)>> {
    let original = get_image_dimensions(backend, source)?;
    if original.0 == 0 || original.1 == 0 {
        return Err(BackendError::Decode(format!(
            "source has degenerate size {}x{}",
            original.0, original.1
        )));
    }
    Ok(max_sizes
        .iter()
        .map(|&bounds| fit_within(original, bounds))
        .collect())
}

/// Decide the archive entry name and encoder for one target.
///
/// When the (already sanitized) filename ends in an extension this build can
/// encode, that extension wins over `requested`. Otherwise `requested` is
/// appended as a new extension.
pub fn resolve_output(filename: &str, requested: &ImageFormat) -> Result<(String, ImageFormat)> {
    if let Some(ext) = extension_of(filename) {
        if EncodeFormat::from_extension(&ext).is_some() {
            return Ok((filename.to_string(), ImageFormat::parse(&ext)));
        }
    }

    if EncodeFormat::from_image_format(requested).is_none() {
        return Err(BackendError::Encode {
            format: requested.to_string(),
            message: "unsupported output format".into(),
        });
    }
    let ext = requested.as_str().to_ascii_lowercase();
    Ok((format!("{filename}.{ext}"), ImageFormat::parse(&ext)))
}
