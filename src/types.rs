//! Shared types that cross module and isolation boundaries.
//!
//! The job and its dimensions are serialized (camelCase JSON) in the worker
//! frame header, so field names here are part of the wire contract with the
//! UI collaborator and with the worker process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Quality used when a dimension does not specify one.
pub const DEFAULT_QUALITY: u8 = 80;

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

/// Requested output format.
///
/// The known set mirrors what the encoder side understands. Anything else
/// is kept verbatim in [`ImageFormat::Other`] so that a newer UI can send a
/// format this build does not know yet; it fails at encode time instead of
/// at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageFormat {
    Avif,
    Gif,
    Jpeg,
    Jpg,
    Png,
    Tiff,
    Webp,
    Other(String),
}

impl ImageFormat {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "avif" => Self::Avif,
            "gif" => Self::Gif,
            "jpeg" => Self::Jpeg,
            "jpg" => Self::Jpg,
            "png" => Self::Png,
            "tiff" => Self::Tiff,
            "webp" => Self::Webp,
            _ => Self::Other(value.to_string()),
        }
    }

    /// Lowercase name, also used as the file extension.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Avif => "avif",
            Self::Gif => "gif",
            Self::Jpeg => "jpeg",
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
            Self::Other(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl From<String> for ImageFormat {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ImageFormat> for String {
    fn from(value: ImageFormat) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target (or origin) output specification.
///
/// `aspect_ratio` is captured when the dimension is created and is not
/// recomputed when width or height change later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDimension {
    /// Assigned by the store on insertion; absent before that.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub aspect_ratio: f64,
    pub image_format: ImageFormat,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl ImageDimension {
    /// Build an id-less dimension with the aspect ratio derived from the size.
    pub fn new(filename: impl Into<String>, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            id: None,
            filename: filename.into(),
            width,
            height,
            aspect_ratio: aspect_ratio(width, height),
            image_format: format,
            quality: DEFAULT_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// `width / height`, or 0 for a degenerate height.
pub fn aspect_ratio(width: u32, height: u32) -> f64 {
    if height == 0 {
        0.0
    } else {
        width as f64 / height as f64
    }
}

/// The raw image handed over by the UI collaborator.
///
/// Three representations are accepted and normalized to one byte slice by
/// [`validate_image_buffer`](crate::security::validate_image_buffer).
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// File-like object with an optional declared MIME type.
    Blob {
        bytes: Vec<u8>,
        content_type: Option<String>,
    },
    /// Plain owned bytes.
    Bytes(Vec<u8>),
    /// Shared, reference-counted buffer.
    Shared(Arc<[u8]>),
}

impl ImageSource {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Blob { bytes, .. } => bytes,
            Self::Bytes(bytes) => bytes,
            Self::Shared(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Arc<[u8]>> for ImageSource {
    fn from(bytes: Arc<[u8]>) -> Self {
        Self::Shared(bytes)
    }
}

/// The unit of work crossing the isolation boundary.
///
/// `origin` is optional because the job arrives from untrusted UI code; the
/// dispatcher and the worker both reject a job without one.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDimensionsResizeJob {
    pub original_image: ImageSource,
    pub origin: Option<ImageDimension>,
    pub dimensions: Vec<ImageDimension>,
}

impl ImageDimensionsResizeJob {
    pub fn new(
        original_image: impl Into<ImageSource>,
        origin: ImageDimension,
        dimensions: Vec<ImageDimension>,
    ) -> Self {
        Self {
            original_image: original_image.into(),
            origin: Some(origin),
            dimensions,
        }
    }

    /// `[origin, ...dimensions]`, the processing and archive order.
    pub fn targets(&self) -> impl Iterator<Item = &ImageDimension> {
        self.origin.iter().chain(self.dimensions.iter())
    }
}

/// Category of a job failure.
///
/// The worker itself only reports the first four; the rest are produced by
/// the dispatcher around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidJobStructure,
    InvalidImageBuffer,
    InvalidDimensions,
    TransformFailure,
    TooManyJobs,
    WorkerSpawnFailure,
    WorkerCrash,
    Timeout,
}

impl FailureKind {
    /// Stable machine-readable code, e.g. `"too_many_jobs"`.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidJobStructure => "invalid_job_structure",
            Self::InvalidImageBuffer => "invalid_image_buffer",
            Self::InvalidDimensions => "invalid_dimensions",
            Self::TransformFailure => "transform_failure",
            Self::TooManyJobs => "too_many_jobs",
            Self::WorkerSpawnFailure => "worker_spawn_failure",
            Self::WorkerCrash => "worker_crash",
            Self::Timeout => "timeout",
        }
    }
}

/// Typed failure carried by [`DownloadState::Failure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The single reply a worker sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadState {
    Success { zip_buffer: Vec<u8> },
    Failure(JobFailure),
}

impl DownloadState {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn zip_buffer(&self) -> Option<&[u8]> {
        match self {
            Self::Success { zip_buffer } => Some(zip_buffer),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&JobFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_formats_parse_case_insensitively() {
        assert_eq!(ImageFormat::parse("PNG"), ImageFormat::Png);
        assert_eq!(ImageFormat::parse("jpg"), ImageFormat::Jpg);
        assert_eq!(ImageFormat::parse("Jpeg"), ImageFormat::Jpeg);
    }

    #[test]
    fn unknown_format_is_kept_verbatim() {
        let format = ImageFormat::parse("heic");
        assert_eq!(format, ImageFormat::Other("heic".into()));
        assert_eq!(format.as_str(), "heic");
    }

    #[test]
    fn new_dimension_derives_aspect_ratio_and_default_quality() {
        let dim = ImageDimension::new("photo", 1920, 1080, ImageFormat::Jpeg);
        assert!((dim.aspect_ratio - 1920.0 / 1080.0).abs() < f64::EPSILON);
        assert_eq!(dim.quality, 80);
        assert!(dim.id.is_none());
    }

    #[test]
    fn dimension_json_uses_camel_case() {
        let json = r#"{
            "filename": "test",
            "width": 2,
            "height": 3,
            "aspectRatio": 0.66,
            "imageFormat": "webp"
        }"#;
        let dim: ImageDimension = serde_json::from_str(json).unwrap();
        assert_eq!(dim.image_format, ImageFormat::Webp);
        assert_eq!(dim.quality, 80);

        let back = serde_json::to_value(&dim).unwrap();
        assert_eq!(back["imageFormat"], "webp");
        assert!(back.get("id").is_none());
    }

    #[test]
    fn job_targets_put_origin_first() {
        let origin = ImageDimension::new("origin", 10, 10, ImageFormat::Png);
        let small = ImageDimension::new("small", 5, 5, ImageFormat::Png);
        let job = ImageDimensionsResizeJob::new(vec![1u8], origin, vec![small]);
        let names: Vec<&str> = job.targets().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["origin", "small"]);
    }

    #[test]
    fn image_source_representations_expose_same_bytes() {
        let bytes = vec![1u8, 2, 3];
        let shared: Arc<[u8]> = Arc::from(bytes.clone());
        let blob = ImageSource::Blob {
            bytes: bytes.clone(),
            content_type: Some("image/png".into()),
        };
        assert_eq!(blob.as_bytes(), ImageSource::Bytes(bytes.clone()).as_bytes());
        assert_eq!(ImageSource::Shared(shared).as_bytes(), &bytes[..]);
    }

    #[test]
    fn download_state_accessors_are_exclusive() {
        let ok = DownloadState::Success {
            zip_buffer: vec![1],
        };
        assert!(ok.is_success());
        assert!(ok.error().is_none());

        let failed = DownloadState::Failure(JobFailure::new(FailureKind::TransformFailure, "boom"));
        assert!(failed.zip_buffer().is_none());
        assert_eq!(failed.error().unwrap().message, "boom");
    }
}
