// SPDX-License-Identifier: GPL-3.0-only

//! Depth/color alignment
//!
//! Reprojects one stream into the other's pixel grid through the session
//! calibration: deproject with the source intrinsics, apply the extrinsics,
//! project with the target intrinsics.

use super::spatial::{deproject_pixel_to_point, project_point_to_pixel};
use crate::backends::device::types::{Calibration, ColorFrame, DepthFrame, Extrinsics, FrameSet};
use crate::errors::{CameraError, CameraResult};
use serde::{Deserialize, Serialize};

/// Which stream's pixel grid the aligned frameset uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignTo {
    /// Color is resampled onto the depth grid
    #[default]
    Depth,
    /// Depth is reprojected onto the color grid
    Color,
}

/// Inverse of a rigid transform
fn inverse(e: &Extrinsics) -> Extrinsics {
    let r = &e.rotation;
    // Transpose of a column-major rotation
    let rotation = [r[0], r[3], r[6], r[1], r[4], r[7], r[2], r[5], r[8]];
    let t = &e.translation;
    let translation = [
        -(rotation[0] * t[0] + rotation[3] * t[1] + rotation[6] * t[2]),
        -(rotation[1] * t[0] + rotation[4] * t[1] + rotation[7] * t[2]),
        -(rotation[2] * t[0] + rotation[5] * t[1] + rotation[8] * t[2]),
    ];
    Extrinsics {
        rotation,
        translation,
    }
}

/// Color sampled at the projection of every valid depth pixel
pub fn align_color_to_depth(
    depth: &DepthFrame,
    color: &ColorFrame,
    calibration: &Calibration,
) -> CameraResult<ColorFrame> {
    let (Some(depth_intr), Some(color_intr)) = (calibration.depth, calibration.color) else {
        return Err(CameraError::AlignmentUnavailable);
    };
    let depth_intr = depth_intr.scaled(depth.width, depth.height);
    let color_intr = color_intr.scaled(color.width, color.height);

    let mut out = vec![0u8; depth.pixel_count() * 3];
    for y in 0..depth.height {
        for x in 0..depth.width {
            let i = (y * depth.width + x) as usize;
            let raw = depth.data[i];
            if raw == 0 {
                continue;
            }
            let point = deproject_pixel_to_point(
                &depth_intr,
                [x as f32, y as f32],
                raw as f32 * calibration.depth_scale,
            );
            let point = calibration.depth_to_color.transform(point);
            let [u, v] = project_point_to_pixel(&color_intr, point);
            let (u, v) = (u.round(), v.round());
            if u < 0.0 || v < 0.0 || u >= color.width as f32 || v >= color.height as f32 {
                continue;
            }
            let src = ((v as u32 * color.width + u as u32) * 3) as usize;
            out[i * 3..i * 3 + 3].copy_from_slice(&color.data[src..src + 3]);
        }
    }

    Ok(ColorFrame::new(
        depth.width,
        depth.height,
        out,
        color.timestamp_us,
        color.frame_number,
    ))
}

/// Depth reprojected onto the color grid, nearest depth wins
pub fn align_depth_to_color(
    depth: &DepthFrame,
    color_width: u32,
    color_height: u32,
    calibration: &Calibration,
) -> CameraResult<DepthFrame> {
    let (Some(depth_intr), Some(color_intr)) = (calibration.depth, calibration.color) else {
        return Err(CameraError::AlignmentUnavailable);
    };
    let depth_intr = depth_intr.scaled(depth.width, depth.height);
    let color_intr = color_intr.scaled(color_width, color_height);
    let scale = calibration.depth_scale;
    let to_depth_raw = 1.0 / scale;

    let mut out = vec![0u16; (color_width * color_height) as usize];
    for y in 0..depth.height {
        for x in 0..depth.width {
            let raw = depth.data[(y * depth.width + x) as usize];
            if raw == 0 {
                continue;
            }
            let point =
                deproject_pixel_to_point(&depth_intr, [x as f32, y as f32], raw as f32 * scale);
            let point = calibration.depth_to_color.transform(point);
            if point[2] <= 0.0 {
                continue;
            }
            let [u, v] = project_point_to_pixel(&color_intr, point);
            let (u, v) = (u.round(), v.round());
            if u < 0.0 || v < 0.0 || u >= color_width as f32 || v >= color_height as f32 {
                continue;
            }
            let j = (v as u32 * color_width + u as u32) as usize;
            let z = (point[2] * to_depth_raw).round().clamp(1.0, u16::MAX as f32) as u16;
            if out[j] == 0 || z < out[j] {
                out[j] = z;
            }
        }
    }

    Ok(DepthFrame::new(
        color_width,
        color_height,
        out,
        depth.timestamp_us,
        depth.frame_number,
    ))
}

/// Align a frameset in the requested direction
///
/// Fails with `AlignmentUnavailable` unless both depth and color are present.
pub fn align_frameset(
    frameset: &FrameSet,
    calibration: &Calibration,
    to: AlignTo,
) -> CameraResult<FrameSet> {
    let (Some(depth), Some(color)) = (&frameset.depth, &frameset.color) else {
        return Err(CameraError::AlignmentUnavailable);
    };
    match to {
        AlignTo::Depth => Ok(FrameSet {
            color: Some(align_color_to_depth(depth, color, calibration)?),
            ..frameset.clone()
        }),
        AlignTo::Color => Ok(FrameSet {
            depth: Some(align_depth_to_color(
                depth,
                color.width,
                color.height,
                calibration,
            )?),
            ..frameset.clone()
        }),
    }
}

/// Camera-space transform from the color sensor back to depth
pub fn color_to_depth(calibration: &Calibration) -> Extrinsics {
    inverse(&calibration.depth_to_color)
}
