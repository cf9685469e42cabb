//! Binary framing for the job and its reply across the process boundary.
//!
//! ## Job frame
//!
//! | Bytes | Content |
//! |---|---|
//! | 4 | magic `GRMJ` |
//! | 4 | header length, u32 big-endian |
//! | n | JSON header `{"origin": …, "dimensions": […]}` |
//! | 8 | payload length, u64 big-endian |
//! | m | raw source image bytes |
//!
//! ## Reply frame
//!
//! | Bytes | Content |
//! |---|---|
//! | 4 | magic `GRMR` |
//! | 1 | tag: `0` success, `1` failure |
//! | 8 + m | success: u64 length + ZIP bytes |
//! | 4 + n | failure: u32 length + JSON [`JobFailure`] |
//!
//! The image travels as raw bytes, never re-encoded. Lengths are checked
//! against their caps before anything is allocated.

use crate::security::Limits;
use crate::types::{DownloadState, ImageDimension, ImageDimensionsResizeJob, ImageSource, JobFailure};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

pub const JOB_MAGIC: &[u8; 4] = b"GRMJ";
pub const REPLY_MAGIC: &[u8; 4] = b"GRMR";
/// Cap for any JSON section of a frame.
pub const MAX_JSON_LEN: u64 = 1024 * 1024;

const TAG_SUCCESS: u8 = 0;
const TAG_FAILURE: u8 = 1;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bad frame magic {found:?}")]
    BadMagic { found: [u8; 4] },
    #[error("{what} of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        what: &'static str,
        len: u64,
        max: u64,
    },
    #[error("Unknown reply tag {0}")]
    UnknownTag(u8),
}

#[derive(Serialize)]
struct JobHeaderRef<'a> {
    origin: Option<&'a ImageDimension>,
    dimensions: &'a [ImageDimension],
}

#[derive(Deserialize)]
struct JobHeader {
    origin: Option<ImageDimension>,
    #[serde(default)]
    dimensions: Vec<ImageDimension>,
}

fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N], ProtocolError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn expect_magic(reader: &mut impl Read, magic: &[u8; 4]) -> Result<(), ProtocolError> {
    let found = read_array::<4>(reader)?;
    if &found != magic {
        return Err(ProtocolError::BadMagic { found });
    }
    Ok(())
}

fn check_len(what: &'static str, len: u64, max: u64) -> Result<(), ProtocolError> {
    if len > max {
        return Err(ProtocolError::FrameTooLarge { what, len, max });
    }
    Ok(())
}

/// Read exactly `len` bytes without trusting `len` for the allocation.
fn read_body(reader: &mut impl Read, len: u64) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::new();
    reader.take(len).read_to_end(&mut body)?;
    if body.len() as u64 != len {
        return Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("frame truncated: expected {len} bytes, got {}", body.len()),
        )));
    }
    Ok(body)
}

fn write_json_section(writer: &mut impl Write, json: &[u8]) -> Result<(), ProtocolError> {
    check_len("JSON section", json.len() as u64, MAX_JSON_LEN)?;
    writer.write_all(&(json.len() as u32).to_be_bytes())?;
    writer.write_all(json)?;
    Ok(())
}

fn read_json_section(reader: &mut impl Read) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::from_be_bytes(read_array(reader)?) as u64;
    check_len("JSON section", len, MAX_JSON_LEN)?;
    read_body(reader, len)
}

/// Write one job frame.
pub fn write_job(writer: &mut impl Write, job: &ImageDimensionsResizeJob) -> Result<(), ProtocolError> {
    let header = serde_json::to_vec(&JobHeaderRef {
        origin: job.origin.as_ref(),
        dimensions: &job.dimensions,
    })?;
    let payload = job.original_image.as_bytes();

    writer.write_all(JOB_MAGIC)?;
    write_json_section(writer, &header)?;
    writer.write_all(&(payload.len() as u64).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one job frame. The payload may not exceed `limits.max_file_size`.
pub fn read_job(
    reader: &mut impl Read,
    limits: &Limits,
) -> Result<ImageDimensionsResizeJob, ProtocolError> {
    expect_magic(reader, JOB_MAGIC)?;
    let header: JobHeader = serde_json::from_slice(&read_json_section(reader)?)?;

    let len = u64::from_be_bytes(read_array(reader)?);
    check_len("image payload", len, limits.max_file_size)?;
    let payload = read_body(reader, len)?;

    Ok(ImageDimensionsResizeJob {
        original_image: ImageSource::Bytes(payload),
        origin: header.origin,
        dimensions: header.dimensions,
    })
}

/// Write the single reply frame.
pub fn write_reply(writer: &mut impl Write, state: &DownloadState) -> Result<(), ProtocolError> {
    writer.write_all(REPLY_MAGIC)?;
    match state {
        DownloadState::Success { zip_buffer } => {
            writer.write_all(&[TAG_SUCCESS])?;
            writer.write_all(&(zip_buffer.len() as u64).to_be_bytes())?;
            writer.write_all(zip_buffer)?;
        }
        DownloadState::Failure(failure) => {
            writer.write_all(&[TAG_FAILURE])?;
            write_json_section(writer, &serde_json::to_vec(failure)?)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Read the single reply frame.
pub fn read_reply(reader: &mut impl Read) -> Result<DownloadState, ProtocolError> {
    expect_magic(reader, REPLY_MAGIC)?;
    let [tag] = read_array::<1>(reader)?;
    match tag {
        TAG_SUCCESS => {
            let len = u64::from_be_bytes(read_array(reader)?);
            Ok(DownloadState::Success {
                zip_buffer: read_body(reader, len)?,
            })
        }
        TAG_FAILURE => {
            let failure: JobFailure = serde_json::from_slice(&read_json_section(reader)?)?;
            Ok(DownloadState::Failure(failure))
        }
        other => Err(ProtocolError::UnknownTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sample_job, tiny_png};
    use crate::types::FailureKind;
    use std::io::Cursor;

    fn framed_job() -> Vec<u8> {
        let mut buf = Vec::new();
        write_job(&mut buf, &sample_job(tiny_png(), &[("test_resized", 2, 2)])).unwrap();
        buf
    }

    #[test]
    fn job_frame_carries_raw_bytes_and_metadata() {
        let job = sample_job(tiny_png(), &[("test_resized", 2, 2)]);
        let read = read_job(&mut Cursor::new(framed_job()), &Limits::default()).unwrap();
        assert_eq!(read.original_image.as_bytes(), job.original_image.as_bytes());
        assert_eq!(read.origin, job.origin);
        assert_eq!(read.dimensions, job.dimensions);
    }

    #[test]
    fn job_without_origin_survives_framing() {
        let mut job = sample_job(tiny_png(), &[]);
        job.origin = None;
        let mut buf = Vec::new();
        write_job(&mut buf, &job).unwrap();
        let read = read_job(&mut Cursor::new(buf), &Limits::default()).unwrap();
        assert!(read.origin.is_none());
        assert!(read.dimensions.is_empty());
    }

    #[test]
    fn oversized_payload_rejected_before_reading() {
        let limits = Limits {
            max_file_size: 10,
            ..Limits::default()
        };
        let err = read_job(&mut Cursor::new(framed_job()), &limits).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FrameTooLarge {
                what: "image payload",
                ..
            }
        ));
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut frame = framed_job();
        frame[..4].copy_from_slice(b"NOPE");
        let err = read_job(&mut Cursor::new(frame), &Limits::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::BadMagic { .. }));
    }

    #[test]
    fn truncated_payload_is_io_error() {
        let mut frame = framed_job();
        frame.truncate(frame.len() - 5);
        let err = read_job(&mut Cursor::new(frame), &Limits::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }

    #[test]
    fn huge_header_length_rejected() {
        let mut frame = JOB_MAGIC.to_vec();
        frame.extend_from_slice(&u32::MAX.to_be_bytes());
        let err = read_job(&mut Cursor::new(frame), &Limits::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
    }

    #[test]
    fn success_and_failure_replies() {
        let ok = DownloadState::Success {
            zip_buffer: vec![b'P', b'K', 3, 4],
        };
        let failed = DownloadState::Failure(JobFailure::new(
            FailureKind::TransformFailure,
            "Image processing failed for broken.png",
        ));
        for state in [ok, failed] {
            let mut buf = Vec::new();
            write_reply(&mut buf, &state).unwrap();
            assert_eq!(read_reply(&mut Cursor::new(buf)).unwrap(), state);
        }
    }

    #[test]
    fn unknown_reply_tag_rejected() {
        let mut frame = REPLY_MAGIC.to_vec();
        frame.push(7);
        let err = read_reply(&mut Cursor::new(frame)).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag(7)));
    }

    #[test]
    fn empty_stream_is_io_error() {
        let err = read_reply(&mut Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, ProtocolError::Io(_)));
    }
}
