// SPDX-License-Identifier: GPL-3.0-only

//! Block-median downsampling

use super::{DepthData, DepthFilter, DepthImage, FilterContext, unknown_option};
use crate::constants::filters::{DECIMATION_MAX, DECIMATION_MIN};
use crate::errors::FilterError;

/// Median of the valid pixels of each `m×m` block
///
/// Output is `⌈w/m⌉×⌈h/m⌉`; blocks without valid pixels become 0.
pub struct DecimationFilter {
    magnitude: u32,
}

impl DecimationFilter {
    pub fn new(magnitude: u32) -> Self {
        Self {
            magnitude: magnitude.clamp(DECIMATION_MIN, DECIMATION_MAX),
        }
    }
}

fn decimate<T: Copy + PartialOrd + Default>(data: &[T], width: u32, height: u32, m: u32) -> Vec<T> {
    let out_w = width.div_ceil(m);
    let out_h = height.div_ceil(m);
    let zero = T::default();
    let mut out = Vec::with_capacity((out_w * out_h) as usize);
    let mut block: Vec<T> = Vec::with_capacity((m * m) as usize);

    for by in 0..out_h {
        for bx in 0..out_w {
            block.clear();
            for y in (by * m)..((by + 1) * m).min(height) {
                for x in (bx * m)..((bx + 1) * m).min(width) {
                    let v = data[(y * width + x) as usize];
                    if v > zero {
                        block.push(v);
                    }
                }
            }
            if block.is_empty() {
                out.push(zero);
            } else {
                block.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                out.push(block[block.len() / 2]);
            }
        }
    }
    out
}

impl DepthFilter for DecimationFilter {
    fn name(&self) -> &'static str {
        "decimation"
    }

    fn set_option(&mut self, option: &str, value: f32) -> Result<(), FilterError> {
        match option {
            "magnitude" => {
                let m = value.round() as u32;
                if !(DECIMATION_MIN..=DECIMATION_MAX).contains(&m) {
                    return Err(FilterError::new(
                        self.name(),
                        format!("magnitude {} outside {}..={}", value, DECIMATION_MIN, DECIMATION_MAX),
                    ));
                }
                self.magnitude = m;
                Ok(())
            }
            _ => Err(unknown_option(self.name(), option)),
        }
    }

    fn process(
        &mut self,
        image: DepthImage,
        _ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError> {
        let m = self.magnitude;
        let (w, h) = (image.width, image.height);
        if w == 0 || h == 0 {
            return Ok(Some(image));
        }
        let data = match &image.data {
            DepthData::Depth(v) => DepthData::Depth(decimate(v, w, h, m)),
            DepthData::Disparity(v) => DepthData::Disparity(decimate(v, w, h, m)),
        };
        Ok(Some(image.with_data(w.div_ceil(m), h.div_ceil(m), data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_ignores_invalid() {
        // 2x2 block: 0 (invalid), 10, 20, 30 -> median of [10, 20, 30] = 20
        let out = decimate(&[0u16, 10, 20, 30], 2, 2, 2);
        assert_eq!(out, vec![20]);
    }

    #[test]
    fn test_partial_blocks() {
        let values: Vec<u16> = (1..=15).collect();
        let out = decimate(&values, 5, 3, 2);
        assert_eq!(out.len(), 3 * 2);
        // Bottom-right block only holds pixel (4, 2) = 15
        assert_eq!(out[5], 15);
    }

    #[test]
    fn test_all_invalid_block() {
        assert_eq!(decimate(&[0u16; 4], 2, 2, 2), vec![0]);
    }

    #[test]
    fn test_magnitude_option_range() {
        let mut filter = DecimationFilter::new(2);
        assert!(filter.set_option("magnitude", 4.0).is_ok());
        assert!(filter.set_option("magnitude", 1.0).is_err());
        assert!(filter.set_option("magnitude", 9.0).is_err());
    }
}
