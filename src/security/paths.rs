//! Filesystem-facing checks for paths the user drops or selects.

use super::magic::{DetectedFormat, HEADER_LEN, validate_header};
use super::{Limits, SecurityError, megabytes};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

/// Extensions accepted by [`validate_file`], lowercase and dot-prefixed.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".avif", ".gif", ".jpeg", ".jpg", ".png", ".tif", ".tiff", ".webp",
];

/// Reject paths that could escape the intended location.
///
/// Fails on parent-directory segments, `~` home shortcuts, NUL bytes, and
/// on Windows the reserved characters `<>:"|?*` outside the drive prefix.
pub fn validate_file_path(path: &Path) -> Result<(), SecurityError> {
    let raw = path.to_string_lossy();
    if raw.is_empty() {
        return Err(SecurityError::PathTraversal(
            "file path must be a non-empty string".into(),
        ));
    }
    if raw.contains('\0') {
        return Err(SecurityError::PathTraversal(
            "file path contains null bytes".into(),
        ));
    }
    if raw.contains('~') {
        return Err(SecurityError::PathTraversal(format!(
            "file path contains a home directory shortcut: {raw}"
        )));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(SecurityError::PathTraversal(format!(
            "file path contains a parent directory segment: {raw}"
        )));
    }
    if cfg!(windows) {
        let reserved = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .any(|part| part.contains(['<', '>', ':', '"', '|', '?', '*']));
        if reserved {
            return Err(SecurityError::PathTraversal(format!(
                "file path contains forbidden Windows characters: {raw}"
            )));
        }
    }
    Ok(())
}

/// Full check of an image file on disk.
///
/// All of path safety, existence, size, extension and magic bytes must pass.
/// Returns the format recognised from the header.
pub fn validate_file(path: &Path, limits: &Limits) -> Result<DetectedFormat, SecurityError> {
    validate_file_path(path)?;

    let metadata = std::fs::metadata(path).map_err(|e| {
        SecurityError::InvalidFile(format!(
            "{} does not exist or is not accessible: {e}",
            path.display()
        ))
    })?;
    if !metadata.is_file() {
        return Err(SecurityError::InvalidFile(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let size = metadata.len();
    if size == 0 {
        return Err(SecurityError::InvalidFile("file is empty".into()));
    }
    if size > limits.max_file_size {
        return Err(SecurityError::InvalidFile(format!(
            "file too large: {}MB exceeds {}MB limit",
            megabytes(size),
            megabytes(limits.max_file_size)
        )));
    }

    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(SecurityError::InvalidFile(format!(
            "unsupported file extension: {ext:?}. Allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    let header = read_header(path)?;
    validate_header(&header)
}

fn read_header(path: &Path) -> Result<Vec<u8>, SecurityError> {
    let file = File::open(path).map_err(|e| {
        SecurityError::InvalidFile(format!("cannot open {}: {e}", path.display()))
    })?;
    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| SecurityError::InvalidFile(format!("cannot read header: {e}")))?;
    Ok(header)
}
