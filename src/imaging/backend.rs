//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline
//! needs from a codec stack: identify (dimensions only) and resize (decode,
//! fill-resize, encode). Both work on in-memory buffers; nothing here
//! touches the filesystem.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::ResizeParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode {format}: {message}")]
    Encode { format: String, message: String },
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `Send + Sync` so one backend can be shared by every worker thread.
pub trait ImageBackend: Send + Sync {
    /// Read the pixel size of an encoded image without a full decode.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode `source`, resize it to exactly `params.width × params.height`
    /// and encode the result.
    fn resize(&self, source: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::params::{EncodeFormat, Quality};
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    /// Uses Mutex (not RefCell) so it is Sync and can be shared with worker threads.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Option<Dimensions>,
        /// Target sizes whose resize fails as if the decoder choked.
        pub fail_sizes: Vec<(u32, u32)>,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(usize),
        Resize {
            width: u32,
            height: u32,
            format: EncodeFormat,
            quality: u8,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Some(Dimensions { width, height }),
                ..Self::default()
            }
        }

        pub fn failing_on(sizes: &[(u32, u32)]) -> Self {
            Self {
                fail_sizes: sizes.to_vec(),
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(source.len()));
            self.dimensions
                .ok_or_else(|| BackendError::Decode("No mock dimensions".to_string()))
        }

        fn resize(&self, _source: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Resize {
                width: params.width,
                height: params.height,
                format: params.format,
                quality: params.quality.value(),
            });
            if self.fail_sizes.contains(&(params.width, params.height)) {
                return Err(BackendError::Decode("corrupt mock input".to_string()));
            }
            Ok(format!("{}x{}.{}", params.width, params.height, params.format).into_bytes())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(&[1, 2, 3]).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Identify(3)]);
    }

    #[test]
    fn mock_records_resize() {
        let backend = MockBackend::new();

        let out = backend
            .resize(
                &[0],
                &ResizeParams {
                    width: 800,
                    height: 600,
                    format: EncodeFormat::WebP,
                    quality: Quality::new(90),
                },
            )
            .unwrap();
        assert_eq!(out, b"800x600.webp");

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Resize {
                width: 800,
                height: 600,
                quality: 90,
                ..
            }
        ));
    }

    #[test]
    fn mock_fails_on_configured_size() {
        let backend = MockBackend::failing_on(&[(2, 2)]);
        let params = ResizeParams {
            width: 2,
            height: 2,
            format: EncodeFormat::Png,
            quality: Quality::default(),
        };
        assert!(matches!(
            backend.resize(&[0], &params),
            Err(BackendError::Decode(_))
        ));
    }
}
