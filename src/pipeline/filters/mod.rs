// SPDX-License-Identifier: GPL-3.0-only

//! Depth post-processing filter chain
//!
//! Filters run in a fixed order on every depth frame:
//!
//! ```text
//! Decimation → Threshold → DepthToDisparity → Spatial → Temporal
//!            → DisparityToDepth → HoleFilling
//! ```
//!
//! The disparity pair brackets the smoothing filters so they operate in the
//! disparity domain, where noise is roughly uniform across distance.
//!
//! Filters keep cross-frame state (temporal history), so a chain is owned by
//! exactly one thread at a time and frames go through it strictly in order.

mod decimation;
mod disparity;
mod hole_filling;
mod spatial;
mod temporal;
mod threshold;

pub use decimation::DecimationFilter;
pub use disparity::{DepthToDisparity, DisparityToDepth};
pub use hole_filling::{HoleFillMode, HoleFillingFilter};
pub use spatial::SpatialFilter;
pub use temporal::TemporalFilter;
pub use threshold::ThresholdFilter;

use crate::backends::device::types::{Calibration, DepthFrame};
use crate::errors::FilterError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Pixel values of a depth image in the working domain
#[derive(Debug, Clone, PartialEq)]
pub enum DepthData {
    /// Raw depth units (0 = invalid)
    Depth(Vec<u16>),
    /// Disparity `F / (z·scale)` (0 = invalid)
    Disparity(Vec<f32>),
}

/// Working image passed between filters
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: DepthData,
    pub timestamp_us: u64,
    pub frame_number: u64,
}

impl DepthImage {
    pub fn from_frame(frame: &DepthFrame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            data: DepthData::Depth(frame.data.to_vec()),
            timestamp_us: frame.timestamp_us,
            frame_number: frame.frame_number,
        }
    }

    pub fn is_disparity(&self) -> bool {
        matches!(self.data, DepthData::Disparity(_))
    }

    /// Same metadata with new pixel data and dimensions
    pub fn with_data(&self, width: u32, height: u32, data: DepthData) -> Self {
        Self {
            width,
            height,
            data,
            timestamp_us: self.timestamp_us,
            frame_number: self.frame_number,
        }
    }

    /// Run a transform over the values as `f32`, keeping the domain
    pub fn map_values(self, f: impl FnOnce(&mut [f32], u32, u32)) -> Self {
        let (w, h) = (self.width, self.height);
        let data = match self.data {
            DepthData::Depth(values) => {
                let mut buf: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                f(&mut buf, w, h);
                DepthData::Depth(
                    buf.into_iter()
                        .map(|v| v.round().clamp(0.0, u16::MAX as f32) as u16)
                        .collect(),
                )
            }
            DepthData::Disparity(mut values) => {
                f(&mut values, w, h);
                DepthData::Disparity(values)
            }
        };
        Self { data, ..self }
    }

    /// Convert to a depth frame, leaving the disparity domain if needed
    pub fn into_frame(self, ctx: &FilterContext) -> Result<DepthFrame, FilterError> {
        let image = if self.is_disparity() {
            disparity::to_depth(self, ctx, "disparity_to_depth")?
        } else {
            self
        };
        let values = match image.data {
            DepthData::Depth(values) => values,
            DepthData::Disparity(_) => {
                return Err(FilterError::new("chain", "image left in disparity domain"));
            }
        };
        Ok(DepthFrame::new(
            image.width,
            image.height,
            values,
            image.timestamp_us,
            image.frame_number,
        ))
    }
}

/// Session constants the filters need
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterContext {
    /// Meters per raw depth unit
    pub depth_scale: f32,
    /// `F = fx · baseline` (pixels · meters)
    pub disparity_factor: f32,
}

impl Default for FilterContext {
    fn default() -> Self {
        Self {
            depth_scale: crate::constants::calibration::DEPTH_SCALE,
            disparity_factor: crate::constants::calibration::FX
                * crate::constants::calibration::BASELINE_M,
        }
    }
}

impl FilterContext {
    pub fn from_calibration(calibration: &Calibration) -> Self {
        let fx = calibration
            .depth
            .map(|i| i.fx)
            .unwrap_or(crate::constants::calibration::FX);
        Self {
            depth_scale: calibration.depth_scale,
            disparity_factor: fx * calibration.baseline,
        }
    }
}

/// A stateful depth transform
pub trait DepthFilter: Send {
    /// Stable identifier used for option lookups and errors
    fn name(&self) -> &'static str;

    /// Set a named numeric option
    fn set_option(&mut self, option: &str, value: f32) -> Result<(), FilterError>;

    /// Process one image; `Ok(None)` drops the frame
    fn process(
        &mut self,
        image: DepthImage,
        ctx: &FilterContext,
    ) -> Result<Option<DepthImage>, FilterError>;

    /// Forget cross-frame state
    fn reset(&mut self) {}
}

pub(crate) fn unknown_option(filter: &'static str, option: &str) -> FilterError {
    FilterError::new(filter, format!("unknown option '{}'", option))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationSettings {
    pub enabled: bool,
    /// Block size, 2..=8
    pub magnitude: u32,
}

impl Default for DecimationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            magnitude: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub enabled: bool,
    /// Meters
    pub min_distance: f32,
    /// Meters
    pub max_distance: f32,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_distance: 0.1,
            max_distance: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialSettings {
    pub enabled: bool,
    /// Weight of the current pixel, 0.25..=1
    pub alpha: f32,
    /// Largest neighbour step that is still smoothed, in working-domain units
    pub delta: f32,
    pub iterations: u32,
}

impl Default for SpatialSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.5,
            delta: 1.0,
            iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalSettings {
    pub enabled: bool,
    /// Weight of the current frame
    pub alpha: f32,
    /// Largest step that is still blended, in working-domain units
    pub delta: f32,
    /// Valid frames out of the last 8 needed to fill a hole from history (0 disables)
    pub persistence: u32,
}

impl Default for TemporalSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: 0.4,
            delta: 1.0,
            persistence: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleFillingSettings {
    pub enabled: bool,
    pub mode: HoleFillMode,
}

impl Default for HoleFillingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: HoleFillMode::FarthestFromAround,
        }
    }
}

/// Configuration of the whole chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub decimation: DecimationSettings,
    pub threshold: ThresholdSettings,
    /// Enables the depth→disparity / disparity→depth pair
    pub disparity_transform: bool,
    pub spatial: SpatialSettings,
    pub temporal: TemporalSettings,
    pub hole_filling: HoleFillingSettings,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            decimation: DecimationSettings::default(),
            threshold: ThresholdSettings::default(),
            disparity_transform: true,
            spatial: SpatialSettings::default(),
            temporal: TemporalSettings::default(),
            hole_filling: HoleFillingSettings::default(),
        }
    }
}

struct FilterSlot {
    filter: Box<dyn DepthFilter>,
    enabled: bool,
}

/// Ordered list of filters applied to every depth frame
pub struct FilterChain {
    slots: Vec<FilterSlot>,
    ctx: FilterContext,
    processed: u64,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new(&FilterSettings::default())
    }
}

impl FilterChain {
    /// Build the standard chain in its fixed order
    pub fn new(settings: &FilterSettings) -> Self {
        let slots = vec![
            FilterSlot {
                filter: Box::new(DecimationFilter::new(settings.decimation.magnitude)),
                enabled: settings.decimation.enabled,
            },
            FilterSlot {
                filter: Box::new(ThresholdFilter::new(
                    settings.threshold.min_distance,
                    settings.threshold.max_distance,
                )),
                enabled: settings.threshold.enabled,
            },
            FilterSlot {
                filter: Box::new(DepthToDisparity),
                enabled: settings.disparity_transform,
            },
            FilterSlot {
                filter: Box::new(SpatialFilter::new(settings.spatial)),
                enabled: settings.spatial.enabled,
            },
            FilterSlot {
                filter: Box::new(TemporalFilter::new(settings.temporal)),
                enabled: settings.temporal.enabled,
            },
            FilterSlot {
                filter: Box::new(DisparityToDepth),
                enabled: settings.disparity_transform,
            },
            FilterSlot {
                filter: Box::new(HoleFillingFilter::new(settings.hole_filling.mode)),
                enabled: settings.hole_filling.enabled,
            },
        ];

        let chain = Self {
            slots,
            ctx: FilterContext::default(),
            processed: 0,
        };
        info!(filters = ?chain.describe(), "Filter chain set up");
        chain
    }

    /// Chain with caller-supplied filters, all enabled, in the given order
    pub fn with_filters(filters: Vec<Box<dyn DepthFilter>>) -> Self {
        Self {
            slots: filters
                .into_iter()
                .map(|filter| FilterSlot {
                    filter,
                    enabled: true,
                })
                .collect(),
            ctx: FilterContext::default(),
            processed: 0,
        }
    }

    /// Chain that passes frames through untouched
    pub fn empty() -> Self {
        Self::with_filters(Vec::new())
    }

    pub fn set_context(&mut self, ctx: FilterContext) {
        self.ctx = ctx;
    }

    pub fn context(&self) -> &FilterContext {
        &self.ctx
    }

    /// Filter names with their enabled state, in execution order
    pub fn describe(&self) -> Vec<(&'static str, bool)> {
        self.slots
            .iter()
            .map(|s| (s.filter.name(), s.enabled))
            .collect()
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut FilterSlot, FilterError> {
        self.slots
            .iter_mut()
            .find(|s| s.filter.name() == name)
            .ok_or_else(|| FilterError::new("chain", format!("no filter named '{}'", name)))
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), FilterError> {
        let slot = self.slot_mut(name)?;
        slot.enabled = enabled;
        slot.filter.reset();
        debug!(filter = name, enabled, "Filter toggled");
        Ok(())
    }

    pub fn set_option(&mut self, name: &str, option: &str, value: f32) -> Result<(), FilterError> {
        self.slot_mut(name)?.filter.set_option(option, value)
    }

    /// Forget all cross-frame state
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.filter.reset();
        }
    }

    /// Run every enabled filter in order
    ///
    /// Returns `Ok(None)` when a filter dropped the frame.
    pub fn apply(&mut self, frame: &DepthFrame) -> Result<Option<DepthFrame>, FilterError> {
        let ctx = self.ctx;
        let mut image = DepthImage::from_frame(frame);

        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            match slot.filter.process(image, &ctx)? {
                Some(next) => image = next,
                None => {
                    debug!(
                        filter = slot.filter.name(),
                        frame = frame.frame_number,
                        "Frame dropped by filter"
                    );
                    return Ok(None);
                }
            }
        }

        self.processed += 1;
        if self.processed % crate::constants::timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                processed = self.processed,
                width = image.width,
                height = image.height,
                "Filter chain progress"
            );
        }

        image.into_frame(&ctx).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, values: Vec<u16>) -> DepthFrame {
        DepthFrame::new(width, height, values, 0, 0)
    }

    #[test]
    fn test_fixed_order() {
        let chain = FilterChain::default();
        let names: Vec<_> = chain.describe().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "decimation",
                "threshold",
                "depth_to_disparity",
                "spatial",
                "temporal",
                "disparity_to_depth",
                "hole_filling"
            ]
        );
    }

    #[test]
    fn test_default_enablement() {
        let enabled: Vec<_> = FilterChain::default()
            .describe()
            .into_iter()
            .filter(|(_, e)| *e)
            .map(|(n, _)| n)
            .collect();
        assert_eq!(
            enabled,
            vec!["depth_to_disparity", "spatial", "temporal", "disparity_to_depth"]
        );
    }

    #[test]
    fn test_uniform_frame_survives_default_chain() {
        let mut chain = FilterChain::default();
        let input = frame(8, 8, vec![1500; 64]);
        let out = chain.apply(&input).unwrap().unwrap();
        assert_eq!((out.width, out.height), (8, 8));
        assert!(out.data.iter().all(|&v| (1499..=1501).contains(&v)));
    }

    #[test]
    fn test_chain_is_deterministic() {
        let input: Vec<DepthFrame> = (0..4)
            .map(|n| {
                let values = (0..64u16).map(|i| 1000 + i * 7 + n * 3).collect();
                DepthFrame::new(8, 8, values, n as u64 * 33_000, n as u64)
            })
            .collect();

        let run = || {
            let mut chain = FilterChain::default();
            input
                .iter()
                .map(|f| chain.apply(f).unwrap().unwrap().data.to_vec())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_disabled_chain_passes_through() {
        let mut chain = FilterChain::default();
        for name in ["depth_to_disparity", "spatial", "temporal", "disparity_to_depth"] {
            chain.set_enabled(name, false).unwrap();
        }
        let input = frame(2, 2, vec![0, 10, 20, 30]);
        let out = chain.apply(&input).unwrap().unwrap();
        assert_eq!(out.data.to_vec(), vec![0, 10, 20, 30]);
    }

    #[test]
    fn test_unknown_filter_name() {
        let mut chain = FilterChain::default();
        assert!(chain.set_enabled("sharpen", true).is_err());
        assert!(chain.set_option("spatial", "gamma", 1.0).is_err());
        assert!(chain.set_option("spatial", "alpha", 0.7).is_ok());
    }

    struct DropAll;

    impl DepthFilter for DropAll {
        fn name(&self) -> &'static str {
            "drop_all"
        }
        fn set_option(&mut self, option: &str, _value: f32) -> Result<(), FilterError> {
            Err(unknown_option("drop_all", option))
        }
        fn process(
            &mut self,
            _image: DepthImage,
            _ctx: &FilterContext,
        ) -> Result<Option<DepthImage>, FilterError> {
            Ok(None)
        }
    }

    #[test]
    fn test_dropping_filter() {
        let mut chain = FilterChain::with_filters(vec![Box::new(DropAll)]);
        assert_eq!(chain.apply(&frame(1, 1, vec![1])).unwrap(), None);
    }

    #[test]
    fn test_decimation_in_chain_changes_resolution() {
        let mut settings = FilterSettings::default();
        settings.decimation.enabled = true;
        settings.decimation.magnitude = 2;
        let mut chain = FilterChain::new(&settings);
        let out = chain.apply(&frame(5, 3, vec![1000; 15])).unwrap().unwrap();
        assert_eq!((out.width, out.height), (3, 2));
    }
}
