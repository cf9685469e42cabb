//! Shared test utilities for the grumpy-image test suite.
//!
//! Provides in-memory image fixtures, ready-made dimensions and jobs, and
//! archive inspection helpers.
//!
//! # Usage
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let job = sample_job(tiny_png(), &[("test_resized", 2, 2)]);
//! let zip = run_somehow(job);
//! assert_eq!(zip_entry_names(&zip), ["test.png", "test_resized.png"]);
//! ```

use crate::dispatcher::PROBE_PNG;
use crate::types::{ImageDimension, ImageDimensionsResizeJob, ImageFormat};
use image::{ImageEncoder, RgbImage};
use std::io::Cursor;

// =========================================================================
// Image fixtures
// =========================================================================

/// A valid 1×1 grayscale+alpha PNG.
pub fn tiny_png() -> Vec<u8> {
    PROBE_PNG.to_vec()
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// A valid JPEG of the given size with a simple gradient.
pub fn synthetic_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// A valid PNG of the given size with a simple gradient.
pub fn synthetic_png(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

// =========================================================================
// Dimensions and jobs
// =========================================================================

/// A PNG dimension at quality 80.
pub fn sample_dimension(filename: &str, width: u32, height: u32) -> ImageDimension {
    ImageDimension::new(filename, width, height, ImageFormat::Png)
}

/// Job over `image` with a 1×1 `test` origin and the given `(name, w, h)` targets.
pub fn sample_job(image: Vec<u8>, targets: &[(&str, u32, u32)]) -> ImageDimensionsResizeJob {
    ImageDimensionsResizeJob::new(
        image,
        sample_dimension("test", 1, 1),
        targets
            .iter()
            .map(|&(name, w, h)| sample_dimension(name, w, h))
            .collect(),
    )
}

// =========================================================================
// Archive inspection
// =========================================================================

/// Entry names of a ZIP archive, in archive order. Panics on a bad archive.
pub fn zip_entry_names(zip: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(zip)).expect("valid zip archive");
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

/// Contents of one ZIP entry. Panics if the entry is missing.
pub fn zip_entry(zip: &[u8], name: &str) -> Vec<u8> {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(Cursor::new(zip)).expect("valid zip archive");
    let mut file = archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("entry '{name}' not found"));
    let mut out = Vec::new();
    file.read_to_end(&mut out).unwrap();
    out
}
