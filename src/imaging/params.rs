//! Parameter types for image operations.
//!
//! These structs describe *what* to produce, not *how*. They sit between
//! [`operations`](super::operations), which decides output names and formats,
//! and the [`backend`](super::backend), which does the pixel work. Keeping
//! them separate lets tests swap in a mock backend and assert on the exact
//! requests without decoding anything.
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`EncodeFormat`]: the output encoders this build actually has.
//! - [`ResizeParams`]: target size, format and quality for one output.

use crate::types::ImageFormat;
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(crate::types::DEFAULT_QUALITY)
    }
}

/// Output encoders compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeFormat {
    Avif,
    Gif,
    Jpeg,
    Png,
    Tiff,
    WebP,
}

impl EncodeFormat {
    /// Map a file extension (without dot, any case) to an encoder.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "avif" => Some(Self::Avif),
            "gif" => Some(Self::Gif),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn from_image_format(format: &ImageFormat) -> Option<Self> {
        Self::from_extension(format.as_str())
    }
}

impl fmt::Display for EncodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Avif => "avif",
            Self::Gif => "gif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::WebP => "webp",
        };
        f.write_str(name)
    }
}

/// Parameters for one fill-resize + encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
    pub format: EncodeFormat,
    pub quality: Quality,
}
