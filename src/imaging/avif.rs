//! AVIF input: container parsing with `avif-parse`, AV1 decoding with
//! `rav1d`.
//!
//! The `image` crate's `"avif"` feature only ships the rav1e encoder; its
//! decoder needs the C dav1d library. `rav1d` is the pure Rust port of
//! dav1d, driven here through its C-compatible API on one thread.

use super::backend::{BackendError, Dimensions};
use image::{DynamicImage, RgbImage};
use rav1d::include::dav1d::data::Dav1dData;
use rav1d::include::dav1d::dav1d::Dav1dSettings;
use rav1d::include::dav1d::headers::{
    DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
    DAV1D_PIXEL_LAYOUT_I444,
};
use rav1d::include::dav1d::picture::Dav1dPicture;
use rav1d::src::lib as dav1d;
use std::io::Cursor;
use std::ptr::NonNull;

fn parse(source: &[u8]) -> Result<avif_parse::AvifData, BackendError> {
    avif_parse::read_avif(&mut Cursor::new(source))
        .map_err(|e| BackendError::Decode(format!("Failed to parse AVIF container: {e:?}")))
}

/// Dimensions from the container metadata; no AV1 decode.
pub(super) fn identify(source: &[u8]) -> Result<Dimensions, BackendError> {
    let meta = parse(source)?
        .primary_item_metadata()
        .map_err(|e| BackendError::Decode(format!("Failed to read AVIF metadata: {e:?}")))?;
    Ok(Dimensions {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
    })
}

/// Decode the primary item to RGB8. Alpha items are ignored.
pub(super) fn decode(source: &[u8]) -> Result<DynamicImage, BackendError> {
    let avif = parse(source)?;
    let av1_bytes: &[u8] = &avif.primary_item;

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| BackendError::Decode("rav1d settings unavailable".into()))?;
    unsafe { dav1d::dav1d_default_settings(settings_ptr) };
    let mut settings = unsafe { settings.assume_init() };
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(BackendError::Decode(format!("rav1d open failed ({})", rc.0)));
    }

    let mut data = Dav1dData::default();
    let buf_ptr = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1_bytes.len()) };
    if buf_ptr.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::Decode("rav1d data_create failed".into()));
    }
    unsafe { std::ptr::copy_nonoverlapping(av1_bytes.as_ptr(), buf_ptr, av1_bytes.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(BackendError::Decode(format!("rav1d send_data failed ({})", rc.0)));
    }

    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(BackendError::Decode(format!("rav1d get_picture failed ({})", rc.0)));
    }

    // Planes are only valid until the picture is released.
    let converted = picture_to_rgb(&pic);
    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }
    let (width, height, rgb) = converted?;

    RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| BackendError::Decode("decoded AVIF planes do not match its size".into()))
}

fn picture_to_rgb(pic: &Dav1dPicture) -> Result<(u32, u32, Vec<u8>), BackendError> {
    let missing = || BackendError::Decode("rav1d returned a picture without planes".into());
    let width = pic.p.w as u32;
    let height = pic.p.h as u32;
    let layout = pic.p.layout;
    let y_ptr = pic.data[0].ok_or_else(missing)?.as_ptr() as *const u8;

    let planes = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        YuvPlanes {
            y_ptr,
            u_ptr: y_ptr,
            v_ptr: y_ptr,
            y_stride: pic.stride[0],
            uv_stride: 0,
            width,
            height,
            bpc: pic.p.bpc as u32,
            ss_x: false,
            ss_y: false,
            monochrome: true,
        }
    } else {
        let (ss_x, ss_y) = match layout {
            DAV1D_PIXEL_LAYOUT_I420 => (true, true),
            DAV1D_PIXEL_LAYOUT_I422 => (true, false),
            DAV1D_PIXEL_LAYOUT_I444 => (false, false),
            _ => {
                return Err(BackendError::Decode(format!(
                    "Unsupported AVIF pixel layout: {layout}"
                )));
            }
        };
        YuvPlanes {
            y_ptr,
            u_ptr: pic.data[1].ok_or_else(missing)?.as_ptr() as *const u8,
            v_ptr: pic.data[2].ok_or_else(missing)?.as_ptr() as *const u8,
            y_stride: pic.stride[0],
            uv_stride: pic.stride[1],
            width,
            height,
            bpc: pic.p.bpc as u32,
            ss_x,
            ss_y,
            monochrome: false,
        }
    };
    Ok((width, height, planes.to_rgb()))
}

/// Borrowed YUV planes of a decoded picture.
struct YuvPlanes {
    y_ptr: *const u8,
    u_ptr: *const u8,
    v_ptr: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bpc: u32,
    /// Chroma subsampling, horizontal and vertical.
    ss_x: bool,
    ss_y: bool,
    monochrome: bool,
}

impl YuvPlanes {
    /// Interleaved RGB8 using BT.601 coefficients.
    fn to_rgb(&self) -> Vec<u8> {
        let max_val = ((1u32 << self.bpc) - 1) as f32;
        let center = (1u32 << (self.bpc - 1)) as f32;
        let scale = 255.0 / max_val;

        let mut rgb = vec![0u8; (self.width * self.height * 3) as usize];
        for row in 0..self.height {
            for col in 0..self.width {
                let y = read_sample(self.y_ptr, self.y_stride, col, row, self.bpc);
                let (r, g, b) = if self.monochrome {
                    let v = (y * scale).clamp(0.0, 255.0);
                    (v, v, v)
                } else {
                    let uc = if self.ss_x { col / 2 } else { col };
                    let ur = if self.ss_y { row / 2 } else { row };
                    let cb = read_sample(self.u_ptr, self.uv_stride, uc, ur, self.bpc) - center;
                    let cr = read_sample(self.v_ptr, self.uv_stride, uc, ur, self.bpc) - center;
                    (
                        ((y + 1.402 * cr) * scale).clamp(0.0, 255.0),
                        ((y - 0.344136 * cb - 0.714136 * cr) * scale).clamp(0.0, 255.0),
                        ((y + 1.772 * cb) * scale).clamp(0.0, 255.0),
                    )
                };
                let idx = ((row * self.width + col) * 3) as usize;
                rgb[idx] = r as u8;
                rgb[idx + 1] = g as u8;
                rgb[idx + 2] = b as u8;
            }
        }
        rgb
    }
}

/// One sample; high bit depths are stored as u16.
#[inline]
fn read_sample(ptr: *const u8, stride: isize, x: u32, y: u32, bpc: u32) -> f32 {
    if bpc <= 8 {
        (unsafe { *ptr.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let offset = y as isize * stride + x as isize * 2;
        (unsafe { (ptr.offset(offset) as *const u16).read_unaligned() }) as f32
    }
}
