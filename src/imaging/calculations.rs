//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Largest size that fits inside `bounds` while keeping the aspect ratio of
/// `source`.
///
/// The scale factor is `min(max_w / src_w, max_h / src_h)`; both results are
/// rounded to the nearest integer and never drop below 1.
///
/// # Examples
/// ```
/// # use grumpy_image::imaging::fit_within;
/// // 1920x1080 into a 300x300 box → ratio 0.15625 → 300x169
/// assert_eq!(fit_within((1920, 1080), (300, 300)), (300, 169));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;
    if src_w == 0 || src_h == 0 {
        return (0, 0);
    }

    let ratio = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = (src_w as f64 * ratio).round().max(1.0) as u32;
    let h = (src_h as f64 * ratio).round().max(1.0) as u32;
    (w, h)
}

/// Height matching `width` under a locked aspect ratio (`width / height`).
pub fn height_for_width(width: u32, aspect_ratio: f64) -> u32 {
    if aspect_ratio <= 0.0 || !aspect_ratio.is_finite() {
        return width;
    }
    (width as f64 / aspect_ratio).round().max(1.0) as u32
}

/// Width matching `height` under a locked aspect ratio (`width / height`).
pub fn width_for_height(height: u32, aspect_ratio: f64) -> u32 {
    if aspect_ratio <= 0.0 || !aspect_ratio.is_finite() {
        return height;
    }
    (height as f64 * aspect_ratio).round().max(1.0) as u32
}
