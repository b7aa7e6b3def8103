// SPDX-License-Identifier: GPL-3.0-only

//! Point cloud and snapshot export from the display buffers

use super::materializer::{DisplayBuffer, FrameMaterializer};
use super::spatial::deproject_pixel_to_point;
use crate::backends::device::types::Intrinsics;
use crate::errors::{AppError, AppResult};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use las::{Builder, Color, Point, Writer};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Write every valid depth pixel as a LAS point
///
/// Points are colored from `color` when it shares the depth grid (aligned to
/// depth), gray otherwise. Y is flipped so the cloud is Y-up.
pub fn export_point_cloud_las(
    path: &Path,
    depth_raw: &DisplayBuffer<u16>,
    color: Option<&DisplayBuffer<u8>>,
    intrinsics: &Intrinsics,
    depth_scale: f32,
) -> AppResult<usize> {
    let (width, height) = (depth_raw.width(), depth_raw.height());
    let color = color.filter(|c| c.width() == width && c.height() == height);

    let mut points: Vec<([f64; 3], [u16; 3])> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let i = (y * width + x) as usize;
            let raw = depth_raw.data()[i];
            if raw == 0 {
                continue;
            }
            let p = deproject_pixel_to_point(
                intrinsics,
                [x as f32, y as f32],
                raw as f32 * depth_scale,
            );
            let rgb = match color {
                Some(c) => {
                    let px = &c.data()[i * 3..i * 3 + 3];
                    [px[0] as u16 * 256, px[1] as u16 * 256, px[2] as u16 * 256]
                }
                None => [128 * 256; 3],
            };
            points.push(([p[0] as f64, -(p[1] as f64), p[2] as f64], rgb));
        }
    }

    if points.is_empty() {
        return Err(AppError::Storage("No valid depth points to export".into()));
    }

    info!(point_count = points.len(), path = %path.display(), "Exporting point cloud");

    let bounds = |axis: usize| {
        points
            .iter()
            .map(|(p, _)| p[axis])
            .fold((f64::MAX, f64::MIN), |(min, max), v| (min.min(v), max.max(v)))
    };
    let transform = |axis: usize| {
        let (min, max) = bounds(axis);
        las::Transform {
            scale: 0.001,
            offset: (min + max) / 2.0,
        }
    };

    let mut builder = Builder::from((1, 4));
    builder.point_format.has_color = true;
    builder.point_format.is_compressed = false;
    builder.transforms = las::Vector {
        x: transform(0),
        y: transform(1),
        z: transform(2),
    };
    let header = builder
        .into_header()
        .map_err(|e| AppError::Storage(format!("Failed to build LAS header: {}", e)))?;

    let mut writer = Writer::from_path(path, header)
        .map_err(|e| AppError::Storage(format!("Failed to create LAS writer: {}", e)))?;

    let count = points.len();
    for ([x, y, z], [r, g, b]) in points {
        let mut point = Point::default();
        point.x = x;
        point.y = y;
        point.z = z;
        point.color = Some(Color::new(r, g, b));
        writer
            .write_point(point)
            .map_err(|e| AppError::Storage(format!("Failed to write point: {}", e)))?;
    }
    writer
        .close()
        .map_err(|e| AppError::Storage(format!("Failed to close LAS file: {}", e)))?;

    debug!(path = %path.display(), "LAS export complete");
    Ok(count)
}

fn save_rgb(path: &Path, buffer: &DisplayBuffer<u8>) -> AppResult<()> {
    let img = RgbImage::from_raw(buffer.width(), buffer.height(), buffer.data().to_vec())
        .ok_or_else(|| AppError::Storage("Failed to create RGB image".into()))?;
    img.save(path)
        .map_err(|e| AppError::Storage(format!("Failed to save {}: {}", path.display(), e)))
}

/// Write the current buffers as PNG files named `<stem>_<stream>.png`
///
/// Empty buffers are skipped. Raw depth is saved as 16-bit grayscale.
pub fn save_snapshot(dir: &Path, stem: &str, frames: &FrameMaterializer) -> AppResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    if !frames.depth_buffer().is_empty() {
        let path = dir.join(format!("{}_depth.png", stem));
        save_rgb(&path, frames.depth_buffer())?;
        written.push(path);

        let raw = frames.depth_raw_buffer();
        let path = dir.join(format!("{}_depth_raw.png", stem));
        let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(
            raw.width(),
            raw.height(),
            raw.data().to_vec(),
        )
        .ok_or_else(|| AppError::Storage("Failed to create 16-bit depth image".into()))?;
        img.save(&path)
            .map_err(|e| AppError::Storage(format!("Failed to save depth 16-bit PNG: {}", e)))?;
        written.push(path);
    }

    if !frames.color_buffer().is_empty() {
        let path = dir.join(format!("{}_color.png", stem));
        save_rgb(&path, frames.color_buffer())?;
        written.push(path);
    }

    let ir = frames.infrared_buffer();
    if !ir.is_empty() {
        let path = dir.join(format!("{}_infrared.png", stem));
        let img = GrayImage::from_raw(ir.width(), ir.height(), ir.data().to_vec())
            .ok_or_else(|| AppError::Storage("Failed to create grayscale image".into()))?;
        img.save(&path)
            .map_err(|e| AppError::Storage(format!("Failed to save infrared PNG: {}", e)))?;
        written.push(path);
    }

    info!(files = written.len(), dir = %dir.display(), "Snapshot saved");
    Ok(written)
}
