//! Image transform engine: pure Rust, in-memory only.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions`; AVIF via `avif-parse` |
//! | **Decode AVIF** | `avif-parse` + `rav1d` |
//! | **Resize (fill)** | `resize_exact` + cubic (`CatmullRom`) filter |
//! | **Encode** | `image` codecs: JPEG, PNG, WebP, GIF, TIFF, AVIF (rav1e) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

mod avif;
pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_within, height_for_width, width_for_height};
pub use operations::{
    get_image_dimensions, get_resize_image_buffer, get_resize_image_dimensions, resolve_output,
};
pub use params::{EncodeFormat, Quality, ResizeParams};
pub use rust_backend::RustBackend;
