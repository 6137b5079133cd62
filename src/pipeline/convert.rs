//! YUYV to RGB conversion
//!
//! Studio-range BT.601 integer formula, chroma shared by each pixel pair.

use image::RgbImage;

use crate::capture::frame::packed_pitch;
use crate::error::{Result, SnapshotError};

/// Convert one YUV sample triple to RGB
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp(r), clamp(g), clamp(b)]
}

#[inline]
fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Convert a packed YUYV frame into an RGB image of exactly
/// `width * height * 3` bytes.
///
/// Rows start every `stride` bytes in `raw` (`0` means the packed pitch, with
/// an odd width rounded up to a whole pair). Pixels whose source bytes are
/// missing from `raw` are left black.
pub fn convert(raw: &[u8], width: u32, height: u32, stride: u32) -> Result<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    let stride = if stride == 0 {
        packed_pitch(width)
    } else {
        stride as usize
    };
    let row_len = w * 3;
    let bytes = row_len * h;

    let mut rgb = Vec::new();
    rgb.try_reserve_exact(bytes)
        .map_err(|_| SnapshotError::Allocation { bytes })?;
    rgb.resize(bytes, 0);

    if row_len > 0 {
        for (row, out) in rgb.chunks_exact_mut(row_len).enumerate() {
            let start = (row * stride).min(raw.len());
            let end = (start + stride).min(raw.len());
            convert_row(&raw[start..end], out);
        }
    }

    RgbImage::from_raw(width, height, rgb).ok_or(SnapshotError::Allocation { bytes })
}

/// One row: every 4 source bytes `Y0 U Y1 V` become two RGB pixels
fn convert_row(src: &[u8], out: &mut [u8]) {
    for (pair, dst) in src.chunks_exact(4).zip(out.chunks_mut(6)) {
        let (y0, u, y1, v) = (pair[0], pair[1], pair[2], pair[3]);

        dst[..3].copy_from_slice(&yuv_to_rgb(y0, u, v));
        // The last chunk of an odd-width row holds a single pixel
        if dst.len() == 6 {
            dst[3..].copy_from_slice(&yuv_to_rgb(y1, u, v));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(y0: u8, u: u8, y1: u8, v: u8) -> [u8; 4] {
        [y0, u, y1, v]
    }

    fn uniform(y: u8, u: u8, v: u8, width: u32, height: u32) -> Vec<u8> {
        pair(y, u, y, v)
            .iter()
            .copied()
            .cycle()
            .take((width * height * 2) as usize)
            .collect()
    }

    #[test]
    fn output_is_exactly_three_bytes_per_pixel() {
        for (w, h) in [(640, 480), (2, 1), (8, 3), (1, 1), (0, 4)] {
            let raw = uniform(100, 90, 200, w, h);
            let image = convert(&raw, w, h, 0).unwrap();
            assert_eq!(image.as_raw().len(), (w * h * 3) as usize);
            assert_eq!(image.dimensions(), (w, h));
        }
    }

    #[test]
    fn reference_black_and_white() {
        let black = convert(&uniform(16, 128, 128, 4, 2), 4, 2, 0).unwrap();
        assert!(black.as_raw().iter().all(|&b| b == 0));

        let white = convert(&uniform(235, 128, 128, 4, 2), 4, 2, 0).unwrap();
        assert!(white.as_raw().iter().all(|&b| b == 255));
    }

    #[test]
    fn chroma_is_shared_by_the_pair() {
        // Black and white luma under one neutral chroma pair
        let raw = pair(16, 128, 235, 128);
        let image = convert(&raw, 2, 1, 0).unwrap();
        assert_eq!(image.as_raw().as_slice(), &[0, 0, 0, 255, 255, 255]);

        // Same chroma tints both pixels identically
        let raw = pair(120, 60, 120, 200);
        let image = convert(&raw, 2, 1, 0).unwrap();
        let px = image.as_raw();
        assert_eq!(px[..3], px[3..]);
        assert_eq!(px[..3], yuv_to_rgb(120, 60, 200));
    }

    #[test]
    fn formula_matches_reference_values() {
        // Saturated red and blue in studio range
        assert_eq!(yuv_to_rgb(81, 90, 240), [255, 0, 0]);
        assert_eq!(yuv_to_rgb(41, 240, 110), [0, 0, 255]);
        // Clamped below zero
        assert_eq!(yuv_to_rgb(0, 128, 128), [0, 0, 0]);
    }

    #[test]
    fn conversion_is_deterministic() {
        let raw: Vec<u8> = (0..=255u8).cycle().take(16 * 4 * 2).collect();
        let a = convert(&raw, 16, 4, 0).unwrap();
        let b = convert(&raw, 16, 4, 0).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn stride_padding_is_skipped() {
        // 2x2 frame with 4 bytes of padding after each row
        let raw = [
            235, 128, 235, 128, 9, 9, 9, 9, //
            16, 128, 16, 128, 9, 9, 9, 9,
        ];
        let image = convert(&raw, 2, 2, 8).unwrap();
        assert_eq!(&image.as_raw()[..6], &[255; 6]);
        assert_eq!(&image.as_raw()[6..], &[0; 6]);
    }

    #[test]
    fn short_input_leaves_remaining_pixels_black() {
        let mut raw = uniform(235, 128, 128, 4, 2);
        raw.truncate(8);
        let image = convert(&raw, 4, 2, 0).unwrap();
        assert_eq!(&image.as_raw()[..12], &[255; 12]);
        assert_eq!(&image.as_raw()[12..], &[0; 12]);
    }

    #[test]
    fn odd_width_uses_pair_chroma_for_last_pixel() {
        // Width 3: one full pair plus a trailing pixel stored as a full quad
        let raw = [235, 128, 235, 128, 16, 128, 0, 128];
        let image = convert(&raw, 3, 1, 8).unwrap();
        assert_eq!(image.as_raw().as_slice(), &[255, 255, 255, 255, 255, 255, 0, 0, 0]);

        // Without an explicit stride the trailing group is still read
        let image = convert(&raw, 3, 1, 0).unwrap();
        assert_eq!(image.as_raw().as_slice(), &[255, 255, 255, 255, 255, 255, 0, 0, 0]);

        let raw = [235, 128, 235, 128, 235, 128, 0, 128, 16, 128, 16, 128, 16, 128, 0, 128];
        let image = convert(&raw, 3, 2, 0).unwrap();
        assert_eq!(&image.as_raw()[..9], &[255; 9]);
        assert_eq!(&image.as_raw()[9..], &[0; 9]);
    }
}
