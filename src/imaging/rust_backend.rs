//! Pure Rust image processing backend built on the `image` crate.
//!
//! Everything is statically linked into the binary and works on in-memory
//! buffers only.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `ImageReader::with_guessed_format` + `into_dimensions` |
//! | Identify (AVIF) | `avif-parse` container metadata |
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::load_from_memory` |
//! | Decode (AVIF) | `avif-parse` + `rav1d`, see [`avif`](super::avif) |
//! | Resize | `DynamicImage::resize_exact` with `CatmullRom` (cubic) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//! | Encode → WebP | `WebPEncoder::new_lossless` (quality ignored) |
//! | Encode → PNG, TIFF, GIF | default encoders |
//!
//! AVIF inputs are recognised by their `ftyp` brand, not by asking `image`,
//! which claims AVIF reading is enabled whenever the encoder feature is on.

use super::avif;
use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{EncodeFormat, Quality, ResizeParams};
use image::codecs::avif::AvifEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tiff::TiffEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use crate::security::{DetectedFormat, detect_format};
use image::{DynamicImage, Frame, ImageReader};
use std::io::Cursor;

/// AVIF encoder speed (1 slowest … 10 fastest).
const AVIF_SPEED: u8 = 6;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

fn is_avif(source: &[u8]) -> bool {
    detect_format(source) == Some(DetectedFormat::Avif)
}

fn decode(source: &[u8]) -> Result<DynamicImage, BackendError> {
    if is_avif(source) {
        return avif::decode(source);
    }
    image::load_from_memory(source).map_err(|e| BackendError::Decode(e.to_string()))
}

fn encode_error(format: EncodeFormat) -> impl Fn(image::ImageError) -> BackendError {
    move |e| BackendError::Encode {
        format: format.to_string(),
        message: e.to_string(),
    }
}

/// Encode `img` into a fresh buffer in the requested format.
fn encode(img: &DynamicImage, format: EncodeFormat, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let err = encode_error(format);
    match format {
        EncodeFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.value()))
                .map_err(err)?;
        }
        EncodeFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut out))
                .map_err(err)?;
        }
        EncodeFormat::WebP => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))
                .map_err(err)?;
        }
        EncodeFormat::Avif => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            let encoder = AvifEncoder::new_with_speed_quality(&mut out, AVIF_SPEED, quality.value());
            rgba.write_with_encoder(encoder).map_err(err)?;
        }
        EncodeFormat::Tiff => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(TiffEncoder::new(Cursor::new(&mut out)))
                .map_err(err)?;
        }
        EncodeFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode_frame(Frame::new(img.to_rgba8()))
                .map_err(err)?;
        }
    }
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        if is_avif(source) {
            return avif::identify(source);
        }
        let (width, height) = ImageReader::new(Cursor::new(source))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {e}")))?;
        Ok(Dimensions { width, height })
    }

    fn resize(&self, source: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
        if params.width == 0 || params.height == 0 {
            return Err(BackendError::InvalidTarget(format!(
                "{}x{}",
                params.width, params.height
            )));
        }
        let img = decode(source)?;
        let resized = img.resize_exact(params.width, params.height, FilterType::CatmullRom);
        encode(&resized, params.format, params.quality)
    }
}
