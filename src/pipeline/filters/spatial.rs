// SPDX-License-Identifier: GPL-3.0-only

//! Edge-preserving spatial smoothing

use super::{DepthFilter, DepthImage, FilterContext, SpatialSettings, unknown_option};
use crate::constants::filters::SPATIAL_ITERATIONS_MAX;
use crate::errors::FilterError;

/// Recursive 1-D exponential smoothing along rows and columns
///
/// Each iteration runs left→right, right→left, top→bottom and bottom→top.
/// A pixel is blended with its already-filtered neighbour only when both are
/// valid and differ by at most `delta`, so depth edges stay sharp.
pub struct SpatialFilter {
    alpha: f32,
    delta: f32,
    iterations: u32,
}

impl SpatialFilter {
    pub fn new(settings: SpatialSettings) -> Self {
        Self {
            alpha: settings.alpha.clamp(0.25, 1.0),
            delta: settings.delta.max(0.0),
            iterations: settings.iterations.clamp(1, SPATIAL_ITERATIONS_MAX),
        }
    }
}

#[inline]
fn blend(values: &mut [f32], cur: usize, prev: usize, alpha: f32, delta: f32) {
    let (c, p) = (values[cur], values[prev]);
    if c > 0.0 && p > 0.0 && (c - p).abs() <= delta {
        values[cur] = alpha * c + (1.0 - alpha) * p;
    }
}

fn smooth(values: &mut [f32], width: u32, height: u32, alpha: f32, delta: f32) {
    let (w, h) = (width as usize, height as usize);

    for y in 0..h {
        let row = y * w;
        for x in 1..w {
            blend(values, row + x, row + x - 1, alpha, delta);
        }
        for x in (0..w.saturating_sub(1)).rev() {
            blend(values, row + x, row + x + 1, alpha, delta);
        }
    }

    for x in 0..w {
        for y in 1..h {
            blend(values, y * w + x, (y - 1) * w + x, alpha, delta);
        }
        for y in (0..h.saturating_sub(1)).rev() {
            blend(values, y * w + x, (y + 1) * w + x, alpha, delta);
        }
    }
}

impl DepthFilter for SpatialFilter {
    fn name(&self) -> &'static str {
        "spatial"
    }

    fn set_option(&mut self, option: &str, value: f32) -> Result<(), FilterError> {
        match option {
            "alpha" => self.alpha = value.clamp(0.25, 1.0),
            "delta" => self.delta = value.max(0.0),
            "iterations" => {
                self.iterations = (value.round().max(1.0) as u32).min(SPATIAL_ITERATIONS_MAX)
            }
            _ => return Err(unknown_option(self.name(), option)),
        }
        Ok(())
    }

    fn process(
        &mut self,
        image: DepthImage,
        _ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError> {
        let (alpha, delta, iterations) = (self.alpha, self.delta, self.iterations);
        Ok(Some(image.map_values(|values, w, h| {
            for _ in 0..iterations {
                smooth(values, w, h, alpha, delta);
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filters::DepthData;

    fn image(width: u32, height: u32, values: Vec<f32>) -> DepthImage {
        DepthImage {
            width,
            height,
            data: DepthData::Disparity(values),
            timestamp_us: 0,
            frame_number: 0,
        }
    }

    fn values(image: DepthImage) -> Vec<f32> {
        match image.data {
            DepthData::Disparity(v) => v,
            DepthData::Depth(_) => panic!("domain changed"),
        }
    }

    #[test]
    fn test_small_steps_are_smoothed() {
        let mut filter = SpatialFilter::new(SpatialSettings {
            delta: 5.0,
            ..Default::default()
        });
        let out = values(
            filter
                .process(image(3, 1, vec![10.0, 12.0, 10.0]), &FilterContext::default())
                .unwrap()
                .unwrap(),
        );
        assert!(out[1] < 12.0);
        assert!(out[1] > 10.0);
    }

    #[test]
    fn test_edges_and_holes_are_preserved() {
        let mut filter = SpatialFilter::new(SpatialSettings {
            delta: 1.0,
            ..Default::default()
        });
        let input = vec![10.0, 10.0, 0.0, 30.0, 30.0];
        let out = values(
            filter
                .process(image(5, 1, input.clone()), &FilterContext::default())
                .unwrap()
                .unwrap(),
        );
        assert_eq!(out, input);
    }
}
