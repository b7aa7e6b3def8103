// SPDX-License-Identifier: GPL-3.0-only

//! Depth ↔ disparity domain transforms
//!
//! `d = F / (z·scale)` and `z = F / (d·scale)` with `F = fx · baseline`.
//! Zero maps to zero in both directions.

use super::{DepthData, DepthFilter, DepthImage, FilterContext, unknown_option};
use crate::errors::FilterError;

fn check_context(ctx: &FilterContext, filter: &'static str) -> Result<(), FilterError> {
    if !(ctx.disparity_factor.is_finite() && ctx.disparity_factor > 0.0) {
        return Err(FilterError::new(
            filter,
            format!("invalid disparity factor {}", ctx.disparity_factor),
        ));
    }
    if !(ctx.depth_scale.is_finite() && ctx.depth_scale > 0.0) {
        return Err(FilterError::new(
            filter,
            format!("invalid depth scale {}", ctx.depth_scale),
        ));
    }
    Ok(())
}

pub(super) fn to_disparity(
    image: DepthImage,
    ctx: &FilterContext,
    filter: &'static str,
) -> Result<DepthImage, FilterError> {
    check_context(ctx, filter)?;
    let values = match &image.data {
        DepthData::Depth(values) => values,
        DepthData::Disparity(_) => return Ok(image),
    };
    let f = ctx.disparity_factor / ctx.depth_scale;
    let disparity = values
        .iter()
        .map(|&z| if z == 0 { 0.0 } else { f / z as f32 })
        .collect();
    Ok(image.with_data(image.width, image.height, DepthData::Disparity(disparity)))
}

pub(super) fn to_depth(
    image: DepthImage,
    ctx: &FilterContext,
    filter: &'static str,
) -> Result<DepthImage, FilterError> {
    check_context(ctx, filter)?;
    let values = match &image.data {
        DepthData::Disparity(values) => values,
        DepthData::Depth(_) => return Ok(image),
    };
    let f = ctx.disparity_factor / ctx.depth_scale;
    let depth = values
        .iter()
        .map(|&d| {
            if d <= 0.0 {
                0
            } else {
                (f / d).round().clamp(0.0, u16::MAX as f32) as u16
            }
        })
        .collect();
    Ok(image.with_data(image.width, image.height, DepthData::Depth(depth)))
}

/// Converts raw depth into disparity
pub struct DepthToDisparity;

impl DepthFilter for DepthToDisparity {
    fn name(&self) -> &'static str {
        "depth_to_disparity"
    }

    fn set_option(&mut self, option: &str, _value: f32) -> Result<(), FilterError> {
        Err(unknown_option(self.name(), option))
    }

    fn process(
        &mut self,
        image: DepthImage,
        ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError> {
        to_disparity(image, ctx, self.name()).map(Some)
    }
}

/// Converts disparity back into raw depth
pub struct DisparityToDepth;

impl DepthFilter for DisparityToDepth {
    fn name(&self) -> &'static str {
        "disparity_to_depth"
    }

    fn set_option(&mut self, option: &str, _value: f32) -> Result<(), FilterError> {
        Err(unknown_option(self.name(), option))
    }

    fn process(
        &mut self,
        image: DepthImage,
        ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError> {
        to_depth(image, ctx, self.name()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FilterContext {
        FilterContext {
            depth_scale: 0.001,
            disparity_factor: 20.0,
        }
    }

    fn image(values: Vec<u16>) -> DepthImage {
        DepthImage {
            width: values.len() as u32,
            height: 1,
            data: DepthData::Depth(values),
            timestamp_us: 0,
            frame_number: 0,
        }
    }

    #[test]
    fn test_disparity_values() {
        let out = DepthToDisparity
            .process(image(vec![0, 1000, 2000]), &ctx())
            .unwrap()
            .unwrap();
        // 1000 units = 1m -> 20 / 1 = 20; 2m -> 10
        let DepthData::Disparity(values) = out.data else {
            panic!("expected disparity");
        };
        assert_eq!(values[0], 0.0);
        assert!((values[1] - 20.0).abs() < 1e-3);
        assert!((values[2] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_back_to_depth() {
        let disparity = DepthToDisparity
            .process(image(vec![0, 750, 3333]), &ctx())
            .unwrap()
            .unwrap();
        let depth = DisparityToDepth.process(disparity, &ctx()).unwrap().unwrap();
        assert_eq!(depth.data, DepthData::Depth(vec![0, 750, 3333]));
    }

    #[test]
    fn test_invalid_factor_fails() {
        let bad = FilterContext {
            depth_scale: 0.001,
            disparity_factor: 0.0,
        };
        let err = DepthToDisparity.process(image(vec![1]), &bad).unwrap_err();
        assert_eq!(err.filter, "depth_to_disparity");
    }
}
