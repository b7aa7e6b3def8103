// SPDX-License-Identifier: GPL-3.0-only

//! Hole filling

use super::{DepthData, DepthFilter, DepthImage, FilterContext, unknown_option};
use crate::errors::FilterError;
use serde::{Deserialize, Serialize};

/// How invalid pixels are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoleFillMode {
    /// Last valid value to the left on the same row
    FillFromLeft,
    /// Farthest valid of the four direct neighbours
    FarthestFromAround,
    /// Nearest valid of the four direct neighbours
    NearestFromAround,
}

impl HoleFillMode {
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(Self::FillFromLeft),
            1 => Some(Self::FarthestFromAround),
            2 => Some(Self::NearestFromAround),
            _ => None,
        }
    }
}

pub struct HoleFillingFilter {
    mode: HoleFillMode,
}

impl HoleFillingFilter {
    pub fn new(mode: HoleFillMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> HoleFillMode {
        self.mode
    }
}

/// Fill zero pixels; `farther(a, b)` is true when `a` is the more distant value
fn fill<T: Copy + PartialOrd + Default>(
    values: &mut [T],
    width: usize,
    height: usize,
    mode: HoleFillMode,
    farther: impl Fn(T, T) -> bool,
) {
    let zero = T::default();

    if mode == HoleFillMode::FillFromLeft {
        for row in values.chunks_mut(width) {
            let mut last = zero;
            for v in row.iter_mut() {
                if *v > zero {
                    last = *v;
                } else {
                    *v = last;
                }
            }
        }
        return;
    }

    let source = values.to_vec();
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            if source[i] > zero {
                continue;
            }
            let mut neighbours = [zero; 4];
            if x > 0 {
                neighbours[0] = source[i - 1];
            }
            if x + 1 < width {
                neighbours[1] = source[i + 1];
            }
            if y > 0 {
                neighbours[2] = source[i - width];
            }
            if y + 1 < height {
                neighbours[3] = source[i + width];
            }

            let mut best: Option<T> = None;
            for n in neighbours.into_iter().filter(|&n| n > zero) {
                best = match best {
                    None => Some(n),
                    Some(b) => {
                        let take = match mode {
                            HoleFillMode::FarthestFromAround => farther(n, b),
                            _ => farther(b, n),
                        };
                        Some(if take { n } else { b })
                    }
                };
            }
            if let Some(b) = best {
                values[i] = b;
            }
        }
    }
}

impl DepthFilter for HoleFillingFilter {
    fn name(&self) -> &'static str {
        "hole_filling"
    }

    fn set_option(&mut self, option: &str, value: f32) -> Result<(), FilterError> {
        match option {
            "mode" => {
                self.mode = HoleFillMode::from_index(value.round().max(0.0) as u32).ok_or_else(
                    || FilterError::new(self.name(), format!("unknown mode {}", value)),
                )?;
                Ok(())
            }
            _ => Err(unknown_option(self.name(), option)),
        }
    }

    fn process(
        &mut self,
        mut image: DepthImage,
        _ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError> {
        let (w, h) = (image.width as usize, image.height as usize);
        if w == 0 || h == 0 {
            return Ok(Some(image));
        }
        match &mut image.data {
            DepthData::Depth(values) => fill(values, w, h, self.mode, |a, b| a > b),
            // Smaller disparity is farther away
            DepthData::Disparity(values) => fill(values, w, h, self.mode, |a, b| a < b),
        }
        Ok(Some(image))
    }
}
