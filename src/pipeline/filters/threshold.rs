// SPDX-License-Identifier: GPL-3.0-only

//! Distance clipping

use super::{DepthData, DepthFilter, DepthImage, FilterContext, unknown_option};
use crate::constants::depth::{MAX_DISTANCE_M, MIN_DISTANCE_M};
use crate::errors::FilterError;

/// Invalidates pixels outside `[min_distance, max_distance]` meters
pub struct ThresholdFilter {
    min_distance: f32,
    max_distance: f32,
}

impl ThresholdFilter {
    pub fn new(min_distance: f32, max_distance: f32) -> Self {
        Self {
            min_distance: min_distance.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M),
            max_distance: max_distance.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M),
        }
    }

    pub fn range(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }

    fn keeps(&self, meters: f32) -> bool {
        meters >= self.min_distance && meters <= self.max_distance
    }
}

impl DepthFilter for ThresholdFilter {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn set_option(&mut self, option: &str, value: f32) -> Result<(), FilterError> {
        let value = value.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M);
        match option {
            "min_distance" => self.min_distance = value,
            "max_distance" => self.max_distance = value,
            _ => return Err(unknown_option(self.name(), option)),
        }
        Ok(())
    }

    fn process(
        &mut self,
        mut image: DepthImage,
        ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError> {
        match &mut image.data {
            DepthData::Depth(values) => {
                for v in values.iter_mut() {
                    if *v != 0 && !self.keeps(*v as f32 * ctx.depth_scale) {
                        *v = 0;
                    }
                }
            }
            DepthData::Disparity(values) => {
                // z·scale = F / d
                for d in values.iter_mut() {
                    if *d > 0.0 && !self.keeps(ctx.disparity_factor / *d) {
                        *d = 0.0;
                    }
                }
            }
        }
        Ok(Some(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clips_outside_range() {
        let mut filter = ThresholdFilter::new(0.5, 2.0);
        let ctx = FilterContext {
            depth_scale: 0.001,
            disparity_factor: 20.0,
        };
        let image = DepthImage {
            width: 4,
            height: 1,
            data: DepthData::Depth(vec![0, 400, 1000, 2500]),
            timestamp_us: 0,
            frame_number: 0,
        };
        let out = filter.process(image, &ctx).unwrap().unwrap();
        assert_eq!(out.data, DepthData::Depth(vec![0, 0, 1000, 0]));
    }

    #[test]
    fn test_options_are_clamped() {
        let mut filter = ThresholdFilter::new(0.1, 4.0);
        filter.set_option("max_distance", 100.0).unwrap();
        assert_eq!(filter.range().1, MAX_DISTANCE_M);
        assert!(filter.set_option("near", 1.0).is_err());
    }
}
