//! Magic-byte sniffing on the first [`HEADER_LEN`] bytes of a file.

use super::SecurityError;
use std::fmt;

/// Number of leading bytes inspected.
pub const HEADER_LEN: usize = 12;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Container format recognised from a file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Tiff,
    Avif,
}

impl DetectedFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Tiff => "image/tiff",
            Self::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
        }
    }
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Identify the image container from its leading bytes.
pub fn detect_format(header: &[u8]) -> Option<DetectedFormat> {
    if header.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DetectedFormat::Jpeg);
    }
    if header.starts_with(&PNG_SIGNATURE) {
        return Some(DetectedFormat::Png);
    }
    if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WEBP" {
        return Some(DetectedFormat::WebP);
    }
    if header.starts_with(b"GIF8") {
        return Some(DetectedFormat::Gif);
    }
    if header.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || header.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
    {
        return Some(DetectedFormat::Tiff);
    }
    if header.len() >= 12
        && &header[4..8] == b"ftyp"
        && (&header[8..12] == b"avif" || &header[8..12] == b"avis")
    {
        return Some(DetectedFormat::Avif);
    }
    None
}

/// Like [`detect_format`], but an unknown header is an error.
pub fn validate_header(header: &[u8]) -> Result<DetectedFormat, SecurityError> {
    let header = &header[..header.len().min(HEADER_LEN)];
    detect_format(header).ok_or_else(|| {
        SecurityError::InvalidFile(format!(
            "file header does not match any supported image format (first bytes: {:02X?})",
            &header[..header.len().min(8)]
        ))
    })
}
