// SPDX-License-Identifier: GPL-3.0-only

//! Temporal smoothing with hole persistence

use super::{DepthFilter, DepthImage, FilterContext, TemporalSettings, unknown_option};
use crate::constants::filters::TEMPORAL_HISTORY;
use crate::errors::FilterError;
use tracing::debug;

/// Exponential blend with the previous output
///
/// A valid pixel is blended with the previous output when both are valid and
/// differ by at most `delta`. An invalid pixel takes the previous output when
/// it was valid in at least `persistence` of the last 8 frames. History is
/// cleared whenever the resolution changes. Output depends only on the
/// ordered history of inputs.
pub struct TemporalFilter {
    alpha: f32,
    delta: f32,
    persistence: u32,
    previous: Vec<f32>,
    /// Per-pixel validity bits of the last 8 frames, newest in bit 0
    history: Vec<u8>,
    dims: (u32, u32),
}

impl TemporalFilter {
    pub fn new(settings: TemporalSettings) -> Self {
        Self {
            alpha: settings.alpha.clamp(0.0, 1.0),
            delta: settings.delta.max(0.0),
            persistence: settings.persistence.min(TEMPORAL_HISTORY),
            previous: Vec::new(),
            history: Vec::new(),
            dims: (0, 0),
        }
    }
}

impl DepthFilter for TemporalFilter {
    fn name(&self) -> &'static str {
        "temporal"
    }

    fn set_option(&mut self, option: &str, value: f32) -> Result<(), FilterError> {
        match option {
            "alpha" => self.alpha = value.clamp(0.0, 1.0),
            "delta" => self.delta = value.max(0.0),
            "persistence" => {
                self.persistence = (value.round().max(0.0) as u32).min(TEMPORAL_HISTORY)
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
        let dims = (image.width, image.height);
        if dims != self.dims {
            debug!(width = dims.0, height = dims.1, "Temporal history reset");
            self.reset();
            self.dims = dims;
        }

        let (alpha, delta, persistence) = (self.alpha, self.delta, self.persistence);
        let previous = &mut self.previous;
        let history = &mut self.history;

        let out = image.map_values(|values, _, _| {
            if previous.len() != values.len() {
                previous.clear();
                previous.resize(values.len(), 0.0);
                history.clear();
                history.resize(values.len(), 0);
            }

            for (i, v) in values.iter_mut().enumerate() {
                let prev = previous[i];
                let valid = *v > 0.0;
                history[i] = (history[i] << 1) | valid as u8;

                if valid {
                    if prev > 0.0 && (*v - prev).abs() <= delta {
                        *v = alpha * *v + (1.0 - alpha) * prev;
                    }
                } else if persistence > 0 && prev > 0.0 && history[i].count_ones() >= persistence
                {
                    *v = prev;
                }
                previous[i] = *v;
            }
        });

        Ok(Some(out))
    }

    fn reset(&mut self) {
        self.previous.clear();
        self.history.clear();
        self.dims = (0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::filters::DepthData;

    fn image(values: Vec<f32>) -> DepthImage {
        DepthImage {
            width: values.len() as u32,
            height: 1,
            data: DepthData::Disparity(values),
            timestamp_us: 0,
            frame_number: 0,
        }
    }

    fn run(filter: &mut TemporalFilter, values: Vec<f32>) -> Vec<f32> {
        match filter
            .process(image(values), &FilterContext::default())
            .unwrap()
            .unwrap()
            .data
        {
            DepthData::Disparity(v) => v,
            DepthData::Depth(_) => panic!("domain changed"),
        }
    }

    #[test]
    fn test_blends_with_history() {
        let mut filter = TemporalFilter::new(TemporalSettings {
            alpha: 0.5,
            delta: 10.0,
            persistence: 0,
            enabled: true,
        });
        assert_eq!(run(&mut filter, vec![10.0]), vec![10.0]);
        assert_eq!(run(&mut filter, vec![20.0]), vec![15.0]);
    }

    #[test]
    fn test_large_step_is_not_blended() {
        let mut filter = TemporalFilter::new(TemporalSettings {
            alpha: 0.5,
            delta: 1.0,
            persistence: 0,
            enabled: true,
        });
        run(&mut filter, vec![10.0]);
        assert_eq!(run(&mut filter, vec![20.0]), vec![20.0]);
    }

    #[test]
    fn test_persistence_fills_holes() {
        let mut filter = TemporalFilter::new(TemporalSettings {
            alpha: 1.0,
            delta: 1.0,
            persistence: 2,
            enabled: true,
        });
        run(&mut filter, vec![10.0]);
        run(&mut filter, vec![10.0]);
        // Valid in 2 of the last 8 frames -> filled from history
        assert_eq!(run(&mut filter, vec![0.0]), vec![10.0]);
    }

    #[test]
    fn test_without_enough_history_hole_stays() {
        let mut filter = TemporalFilter::new(TemporalSettings {
            alpha: 1.0,
            delta: 1.0,
            persistence: 3,
            enabled: true,
        });
        run(&mut filter, vec![10.0]);
        assert_eq!(run(&mut filter, vec![0.0]), vec![0.0]);
    }

    #[test]
    fn test_resolution_change_resets_history() {
        let mut filter = TemporalFilter::new(TemporalSettings {
            alpha: 0.5,
            delta: 100.0,
            persistence: 0,
            enabled: true,
        });
        run(&mut filter, vec![10.0]);
        assert_eq!(run(&mut filter, vec![20.0, 20.0]), vec![20.0, 20.0]);
    }
}
