// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion utilities for depth device backends
//!
//! Everything inside the pipeline is RGB8 (color), GRAY8 (infrared) or
//! native-endian `u16` (depth); these helpers bring wire formats into that shape.

/// Convert YUYV (YUV 4:2:2) to RGB
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    // YUYV: Y0 U0 Y1 V0 - processes 2 pixels at a time
    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break;
            }
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    // Short buffers are padded black
    rgb.resize(pixel_count * 3, 0);
    rgb
}

/// Decode Z16 (little-endian 16-bit depth units) into depth values
pub fn z16_to_depth(data: &[u8], width: u32, height: u32) -> Vec<u16> {
    let pixel_count = (width * height) as usize;
    let mut depth: Vec<u16> = data
        .chunks_exact(2)
        .take(pixel_count)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    depth.resize(pixel_count, 0);
    depth
}

/// Copy an 8-bit grayscale buffer, padding or truncating to the frame size
pub fn gray_frame(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut gray: Vec<u8> = data.iter().take(pixel_count).copied().collect();
    gray.resize(pixel_count, 0);
    gray
}

/// Copy a packed RGB buffer, padding or truncating to the frame size
pub fn rgb_frame(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let len = (width * height) as usize * 3;
    let mut rgb: Vec<u8> = data.iter().take(len).copied().collect();
    rgb.resize(len, 0);
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_white() {
        // Pure white in YUV (Y=255, U=128, V=128)
        let yuyv = vec![255u8, 128, 255, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);

        assert_eq!(rgb.len(), 6);
        assert!(rgb.iter().all(|&c| c > 250));
    }

    #[test]
    fn test_yuyv_short_buffer_is_padded() {
        let rgb = yuyv_to_rgb(&[16, 128, 16, 128], 4, 1);
        assert_eq!(rgb.len(), 12);
        assert_eq!(&rgb[6..], &[0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_z16_little_endian() {
        let depth = z16_to_depth(&[0x34, 0x12, 0xff, 0x00], 2, 1);
        assert_eq!(depth, vec![0x1234, 0x00ff]);
    }
}
