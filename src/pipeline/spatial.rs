// SPDX-License-Identifier: GPL-3.0-only

//! Pixel ↔ camera-space projection through per-stream intrinsics
//!
//! Each distortion model has one closed-form direction; the other direction
//! is solved iteratively.

use crate::backends::device::types::{DistortionModel, Intrinsics};

const FIXED_POINT_ITERATIONS: usize = 20;
const KB4_NEWTON_ITERATIONS: usize = 4;

#[inline]
fn brown_conrady(c: &[f32; 5], x: f32, y: f32) -> [f32; 2] {
    let r2 = x * x + y * y;
    let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
    [
        x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x),
        y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y),
    ]
}

/// Tangential terms use the radially scaled coordinates
#[inline]
fn modified_brown_conrady(c: &[f32; 5], x: f32, y: f32) -> [f32; 2] {
    let r2 = x * x + y * y;
    let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
    let (x, y) = (x * f, y * f);
    [
        x + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x),
        y + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y),
    ]
}

#[inline]
fn kannala_brandt(c: &[f32; 5], x: f32, y: f32) -> [f32; 2] {
    let r = (x * x + y * y).sqrt().max(f32::EPSILON);
    let theta = r.atan();
    let theta2 = theta * theta;
    let series = 1.0 + theta2 * (c[0] + theta2 * (c[1] + theta2 * (c[2] + theta2 * c[3])));
    let rd = theta * series;
    [x * rd / r, y * rd / r]
}

fn kannala_brandt_inverse(c: &[f32; 5], x: f32, y: f32) -> [f32; 2] {
    let rd = (x * x + y * y).sqrt().max(f32::EPSILON);
    let mut theta = rd;
    let mut theta2 = theta * theta;
    for _ in 0..KB4_NEWTON_ITERATIONS {
        let f = theta * (1.0 + theta2 * (c[0] + theta2 * (c[1] + theta2 * (c[2] + theta2 * c[3]))))
            - rd;
        if f.abs() < f32::EPSILON {
            break;
        }
        let df = 1.0
            + theta2
                * (3.0 * c[0] + theta2 * (5.0 * c[1] + theta2 * (7.0 * c[2] + 9.0 * theta2 * c[3])));
        theta -= f / df;
        theta2 = theta * theta;
    }
    let r = theta.tan();
    [x * r / rd, y * r / rd]
}

/// Solve `forward(u) = target` for `u`
fn invert(forward: impl Fn(f32, f32) -> [f32; 2], target: [f32; 2]) -> [f32; 2] {
    let mut u = target;
    for _ in 0..FIXED_POINT_ITERATIONS {
        let f = forward(u[0], u[1]);
        u[0] += target[0] - f[0];
        u[1] += target[1] - f[1];
    }
    u
}

/// Ideal normalized coordinates to distorted ones
fn distort(intr: &Intrinsics, x: f32, y: f32) -> [f32; 2] {
    let c = &intr.coeffs;
    match intr.model {
        DistortionModel::None => [x, y],
        DistortionModel::ModifiedBrownConrady => modified_brown_conrady(c, x, y),
        DistortionModel::BrownConrady => brown_conrady(c, x, y),
        DistortionModel::InverseBrownConrady => invert(|u, v| brown_conrady(c, u, v), [x, y]),
        DistortionModel::KannalaBrandt4 => kannala_brandt(c, x, y),
    }
}

/// Distorted normalized coordinates to ideal ones
fn undistort(intr: &Intrinsics, x: f32, y: f32) -> [f32; 2] {
    let c = &intr.coeffs;
    match intr.model {
        DistortionModel::None => [x, y],
        DistortionModel::InverseBrownConrady => brown_conrady(c, x, y),
        DistortionModel::BrownConrady => invert(|u, v| brown_conrady(c, u, v), [x, y]),
        DistortionModel::ModifiedBrownConrady => {
            invert(|u, v| modified_brown_conrady(c, u, v), [x, y])
        }
        DistortionModel::KannalaBrandt4 => kannala_brandt_inverse(c, x, y),
    }
}

/// Pixel plus metric depth to a camera-space point in meters
pub fn deproject_pixel_to_point(intr: &Intrinsics, pixel: [f32; 2], depth: f32) -> [f32; 3] {
    let x = (pixel[0] - intr.ppx) / intr.fx;
    let y = (pixel[1] - intr.ppy) / intr.fy;
    let [x, y] = undistort(intr, x, y);
    [depth * x, depth * y, depth]
}

/// Camera-space point to pixel coordinates
pub fn project_point_to_pixel(intr: &Intrinsics, point: [f32; 3]) -> [f32; 2] {
    let x = point[0] / point[2];
    let y = point[1] / point[2];
    let [x, y] = distort(intr, x, y);
    [x * intr.fx + intr.ppx, y * intr.fy + intr.ppy]
}
