//! Resize job worker: runs one job end-to-end inside an isolation unit.
//!
//! ## Algorithm
//!
//! 1. Reject a job without origin or dimensions.
//! 2. Validate the dimension list and the origin.
//! 3. Validate the source buffer.
//! 4. For each target in `[origin, ...dimensions]`:
//!    - skip entries with no filename, format, width or height (logged);
//!    - sanitize the filename and resolve the output extension;
//!    - resize and encode;
//!    - on any transform error, abort the whole job.
//! 5. Pack the outputs into one ZIP, in target order.
//!
//! Malformed metadata is tolerated per entry, but a decode or encode failure
//! means the source may be unusable at every size, so no partial archive is
//! ever returned.
//!
//! [`serve`] wraps [`handle_job`] for the child-process side: one job frame
//! in on stdin, one reply frame out on stdout.

use crate::imaging::{ImageBackend, get_resize_image_buffer, resolve_output};
use crate::protocol::{self, ProtocolError};
use crate::security::{
    Limits, sanitize_filename, validate_dimension, validate_image_buffer,
    validate_image_dimensions,
};
use crate::types::{DownloadState, FailureKind, ImageDimension, ImageDimensionsResizeJob, JobFailure};
use std::io::{Cursor, Read, Write};
use std::time::Instant;
use tracing::{error, info, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// One encoded output, named as it will appear in the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

fn is_incomplete(dim: &ImageDimension) -> bool {
    dim.filename.is_empty() || dim.image_format.is_empty() || dim.width == 0 || dim.height == 0
}

/// Check the job shape, dimensions and buffer; returns the validated bytes.
pub fn validate_job<'a>(
    job: &'a ImageDimensionsResizeJob,
    limits: &Limits,
) -> Result<&'a [u8], JobFailure> {
    let Some(origin) = &job.origin else {
        return Err(JobFailure::new(
            FailureKind::InvalidJobStructure,
            "invalid image resize job parameters: origin is missing",
        ));
    };
    if job.dimensions.is_empty() {
        return Err(JobFailure::new(
            FailureKind::InvalidJobStructure,
            "invalid image resize job parameters: no dimensions requested",
        ));
    }

    validate_image_dimensions(&job.dimensions, limits)
        .and_then(|()| validate_dimension(origin, limits))
        .map_err(|e| JobFailure::new(FailureKind::InvalidDimensions, e.to_string()))?;

    validate_image_buffer(&job.original_image, limits)
        .map_err(|e| JobFailure::new(FailureKind::InvalidImageBuffer, e.to_string()))
}

/// Resize every target of `job`, failing fast on the first transform error.
pub fn render_entries(
    backend: &impl ImageBackend,
    job: &ImageDimensionsResizeJob,
) -> Result<Vec<ArchiveEntry>, JobFailure> {
    let mut entries: Vec<ArchiveEntry> = Vec::new();

    for dim in job.targets() {
        if is_incomplete(dim) {
            warn!(
                filename = %dim.filename,
                width = dim.width,
                height = dim.height,
                "skipping incomplete dimension"
            );
            continue;
        }

        let sanitized = sanitize_filename(&dim.filename);
        let transform_failure = |e: &dyn std::fmt::Display| {
            error!(filename = %sanitized, error = %e, "resize failed");
            JobFailure::new(
                FailureKind::TransformFailure,
                format!("Image processing failed for {sanitized}: {e}"),
            )
        };

        let (name, format) =
            resolve_output(&sanitized, &dim.image_format).map_err(|e| transform_failure(&e))?;
        let bytes = get_resize_image_buffer(
            backend,
            &job.original_image,
            &format,
            dim.quality,
            dim.size(),
        )
        .map_err(|e| transform_failure(&e))?;

        // A later entry with the same name replaces the earlier one in place.
        match entries.iter_mut().find(|entry| entry.name == name) {
            Some(existing) => existing.bytes = bytes,
            None => entries.push(ArchiveEntry { name, bytes }),
        }
    }

    Ok(entries)
}

/// Serialize entries into one in-memory ZIP, preserving their order.
pub fn build_archive(entries: &[ArchiveEntry]) -> Result<Vec<u8>, JobFailure> {
    let archive_failure = |e: &dyn std::fmt::Display| {
        JobFailure::new(
            FailureKind::TransformFailure,
            format!("failed to build archive: {e}"),
        )
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| archive_failure(&e))?;
        writer
            .write_all(&entry.bytes)
            .map_err(|e| archive_failure(&e))?;
    }
    let cursor = writer.finish().map_err(|e| archive_failure(&e))?;
    Ok(cursor.into_inner())
}

/// Run one job and return the archive bytes.
pub fn run_job(
    backend: &impl ImageBackend,
    job: &ImageDimensionsResizeJob,
    limits: &Limits,
) -> Result<Vec<u8>, JobFailure> {
    let started = Instant::now();
    info!(dimensions = job.dimensions.len(), "received job");

    let bytes = validate_job(job, limits)?;
    info!(bytes = bytes.len(), "base buffer size");

    let entries = render_entries(backend, job)?;
    let zip = build_archive(&entries)?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        entries = entries.len(),
        zip_size = zip.len(),
        "job completed"
    );
    Ok(zip)
}

/// [`run_job`] folded into the single reply a worker sends.
pub fn handle_job(
    backend: &impl ImageBackend,
    job: &ImageDimensionsResizeJob,
    limits: &Limits,
) -> DownloadState {
    match run_job(backend, job, limits) {
        Ok(zip_buffer) => DownloadState::Success { zip_buffer },
        Err(failure) => {
            warn!(kind = ?failure.kind, "job failed: {}", failure.message);
            DownloadState::Failure(failure)
        }
    }
}

/// Serve exactly one job: read a job frame, write one reply frame.
///
/// A frame that cannot be read still gets a failure reply before the error
/// is returned, so the parent never waits on a silent worker.
pub fn serve(
    reader: &mut impl Read,
    writer: &mut impl Write,
    backend: &impl ImageBackend,
    limits: &Limits,
) -> Result<(), ProtocolError> {
    let job = match protocol::read_job(reader, limits) {
        Ok(job) => job,
        Err(e) => {
            let kind = match e {
                ProtocolError::FrameTooLarge {
                    what: "image payload",
                    ..
                } => FailureKind::InvalidImageBuffer,
                _ => FailureKind::InvalidJobStructure,
            };
            let failure = JobFailure::new(kind, format!("invalid job frame: {e}"));
            protocol::write_reply(writer, &DownloadState::Failure(failure))?;
            return Err(e);
        }
    };
    let state = handle_job(backend, &job, limits);
    protocol::write_reply(writer, &state)
}
