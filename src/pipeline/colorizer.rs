// SPDX-License-Identifier: GPL-3.0-only

//! Depth colorization
//!
//! Maps raw depth to RGB8 through one of nine color schemas. Zero (invalid)
//! depth is always black.

use crate::backends::device::types::DepthFrame;
use crate::constants::depth::{
    COLORMAP_BANDS, DEFAULT_MAX_M, DEFAULT_MIN_M, MAX_DISTANCE_M, MIN_DISTANCE_M, PATTERN_PERIOD_M,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Depth color schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSchema {
    /// Blue (near) through red (far)
    #[default]
    Jet,
    Classic,
    /// Near is white
    WhiteToBlack,
    /// Near is black
    BlackToWhite,
    Bio,
    Cold,
    Warm,
    /// Turbo quantized to bands
    Quantized,
    /// Repeating stripes with a fixed metric period
    Pattern,
}

impl ColorSchema {
    pub const ALL: [ColorSchema; 9] = [
        ColorSchema::Jet,
        ColorSchema::Classic,
        ColorSchema::WhiteToBlack,
        ColorSchema::BlackToWhite,
        ColorSchema::Bio,
        ColorSchema::Cold,
        ColorSchema::Warm,
        ColorSchema::Quantized,
        ColorSchema::Pattern,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColorSchema::Jet => "jet",
            ColorSchema::Classic => "classic",
            ColorSchema::WhiteToBlack => "white_to_black",
            ColorSchema::BlackToWhite => "black_to_white",
            ColorSchema::Bio => "bio",
            ColorSchema::Cold => "cold",
            ColorSchema::Warm => "warm",
            ColorSchema::Quantized => "quantized",
            ColorSchema::Pattern => "pattern",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Control points of the piecewise-linear map, near to far
    fn stops(&self) -> &'static [[u8; 3]] {
        match self {
            ColorSchema::Jet => &[
                [0, 0, 255],
                [0, 255, 255],
                [255, 255, 0],
                [255, 0, 0],
                [50, 0, 0],
            ],
            ColorSchema::Classic => &[
                [30, 77, 203],
                [25, 60, 192],
                [45, 117, 220],
                [204, 108, 191],
                [196, 57, 178],
                [198, 33, 24],
            ],
            ColorSchema::WhiteToBlack => &[[255, 255, 255], [0, 0, 0]],
            ColorSchema::BlackToWhite => &[[0, 0, 0], [255, 255, 255]],
            ColorSchema::Bio => &[
                [0, 0, 204],
                [204, 230, 255],
                [255, 255, 153],
                [170, 255, 146],
                [61, 153, 112],
                [0, 102, 0],
                [153, 76, 0],
                [255, 255, 255],
            ],
            ColorSchema::Cold => &[
                [0, 0, 0],
                [0, 0, 255],
                [0, 255, 255],
                [255, 255, 255],
            ],
            ColorSchema::Warm => &[
                [0, 0, 0],
                [255, 0, 0],
                [255, 255, 0],
                [255, 255, 255],
            ],
            ColorSchema::Quantized | ColorSchema::Pattern => &[[0, 0, 0], [255, 255, 255]],
        }
    }
}

impl fmt::Display for ColorSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// User-facing colorizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorizerOptions {
    pub schema: ColorSchema,
    /// Meters mapped to the start of the schema
    pub min_distance: f32,
    /// Meters mapped to the end of the schema
    pub max_distance: f32,
    /// Use the cumulative histogram rank instead of the metric range
    pub histogram_equalization: bool,
}

impl Default for ColorizerOptions {
    fn default() -> Self {
        Self {
            schema: ColorSchema::Jet,
            min_distance: DEFAULT_MIN_M,
            max_distance: DEFAULT_MAX_M,
            histogram_equalization: false,
        }
    }
}

/// Turbo colormap polynomial approximation
#[inline]
fn turbo(t: f32) -> [u8; 3] {
    let r = (0.13572138
        + t * (4.6153926 + t * (-42.66032 + t * (132.13108 + t * (-152.54825 + t * 59.28144)))))
        .clamp(0.0, 1.0);
    let g = (0.09140261
        + t * (2.19418 + t * (4.84296 + t * (-14.18503 + t * (4.27805 + t * 2.53377)))))
        .clamp(0.0, 1.0);
    let b = (0.1066733
        + t * (12.64194 + t * (-60.58204 + t * (109.99648 + t * (-82.52904 + t * 20.43388)))))
        .clamp(0.0, 1.0);
    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

#[inline]
fn interpolate(stops: &[[u8; 3]], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let last = stops.len() - 1;
    if last == 0 {
        return stops[0];
    }
    let pos = t * last as f32;
    let i = (pos.floor() as usize).min(last - 1);
    let frac = pos - i as f32;
    let (a, b) = (stops[i], stops[i + 1]);
    std::array::from_fn(|c| (a[c] as f32 + (b[c] as f32 - a[c] as f32) * frac).round() as u8)
}

/// Stateless depth→RGB mapper
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Colorizer {
    options: ColorizerOptions,
}

impl Colorizer {
    pub fn new(options: ColorizerOptions) -> Self {
        let mut colorizer = Self::default();
        colorizer.set_options(options);
        colorizer
    }

    pub fn options(&self) -> &ColorizerOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ColorizerOptions) {
        self.options = options;
        self.set_range(options.min_distance, options.max_distance);
    }

    pub fn set_schema(&mut self, schema: ColorSchema) {
        self.options.schema = schema;
    }

    /// Clamped to the sensor range; `max` never drops below `min`
    pub fn set_range(&mut self, min: f32, max: f32) {
        let min = min.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M);
        let max = max.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M);
        self.options.min_distance = min;
        self.options.max_distance = max.max(min);
    }

    pub fn set_min_distance(&mut self, min: f32) {
        self.set_range(min, self.options.max_distance.max(min));
    }

    pub fn set_max_distance(&mut self, max: f32) {
        self.set_range(self.options.min_distance.min(max), max);
    }

    pub fn set_histogram_equalization(&mut self, enabled: bool) {
        self.options.histogram_equalization = enabled;
    }

    /// Color of a single metric distance, with `t` the normalized position
    fn color(&self, meters: f32, t: f32) -> [u8; 3] {
        match self.options.schema {
            ColorSchema::Quantized => turbo((t * COLORMAP_BANDS).floor() / COLORMAP_BANDS),
            ColorSchema::Pattern => {
                let phase = (meters / PATTERN_PERIOD_M).fract();
                let v = (phase * 255.0) as u8;
                [v, v, v]
            }
            schema => interpolate(schema.stops(), t),
        }
    }

    /// Colorize a depth frame into packed RGB8
    pub fn colorize(&self, frame: &DepthFrame, depth_scale: f32) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(frame.data.len() * 3);

        if self.options.histogram_equalization {
            let cdf = cumulative_histogram(&frame.data);
            let total = *cdf.last().unwrap_or(&0) as f32;
            for &raw in frame.data.iter() {
                if raw == 0 || total == 0.0 {
                    rgb.extend_from_slice(&[0, 0, 0]);
                    continue;
                }
                let t = cdf[raw as usize] as f32 / total;
                rgb.extend_from_slice(&self.color(raw as f32 * depth_scale, t));
            }
            return rgb;
        }

        let min = self.options.min_distance;
        let span = (self.options.max_distance - min).max(f32::EPSILON);
        for &raw in frame.data.iter() {
            if raw == 0 {
                rgb.extend_from_slice(&[0, 0, 0]);
                continue;
            }
            let meters = raw as f32 * depth_scale;
            let t = ((meters - min) / span).clamp(0.0, 1.0);
            rgb.extend_from_slice(&self.color(meters, t));
        }
        rgb
    }
}

/// Cumulative count of valid pixels at or below each raw value
fn cumulative_histogram(data: &[u16]) -> Vec<u32> {
    let mut hist = vec![0u32; u16::MAX as usize + 1];
    for &v in data.iter().filter(|&&v| v != 0) {
        hist[v as usize] += 1;
    }
    for i in 1..hist.len() {
        hist[i] += hist[i - 1];
    }
    hist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(values: Vec<u16>) -> DepthFrame {
        DepthFrame::new(values.len() as u32, 1, values, 0, 0)
    }

    #[test]
    fn test_zero_is_black_for_every_schema() {
        for schema in ColorSchema::ALL {
            let colorizer = Colorizer::new(ColorizerOptions {
                schema,
                ..Default::default()
            });
            assert_eq!(colorizer.colorize(&frame(vec![0]), 0.001), vec![0, 0, 0]);
        }
    }

    #[test]
    fn test_jet_endpoints() {
        let colorizer = Colorizer::new(ColorizerOptions {
            min_distance: 1.0,
            max_distance: 2.0,
            ..Default::default()
        });
        let rgb = colorizer.colorize(&frame(vec![500, 3000]), 0.001);
        // Below range clamps to the first stop, above to the last
        assert_eq!(&rgb[0..3], &[0, 0, 255]);
        assert_eq!(&rgb[3..6], &[50, 0, 0]);
    }

    #[test]
    fn test_white_to_black_near_is_white() {
        let colorizer = Colorizer::new(ColorizerOptions {
            schema: ColorSchema::WhiteToBlack,
            min_distance: 0.0,
            max_distance: 4.0,
            ..Default::default()
        });
        let rgb = colorizer.colorize(&frame(vec![1, 4000]), 0.001);
        assert!(rgb[0] > 250);
        assert_eq!(&rgb[3..6], &[0, 0, 0]);
    }

    #[test]
    fn test_histogram_equalization_ranks() {
        let colorizer = Colorizer::new(ColorizerOptions {
            schema: ColorSchema::BlackToWhite,
            histogram_equalization: true,
            ..Default::default()
        });
        // Widely spaced values still spread over the whole ramp
        let rgb = colorizer.colorize(&frame(vec![100, 10_000, 60_000]), 0.001);
        assert!(rgb[0] < rgb[3]);
        assert!(rgb[3] < rgb[6]);
        assert_eq!(rgb[6], 255);
    }

    #[test]
    fn test_range_is_clamped() {
        let mut colorizer = Colorizer::default();
        colorizer.set_range(-1.0, 100.0);
        assert_eq!(colorizer.options().min_distance, MIN_DISTANCE_M);
        assert_eq!(colorizer.options().max_distance, MAX_DISTANCE_M);
        colorizer.set_max_distance(0.0);
        assert!(colorizer.options().max_distance >= colorizer.options().min_distance);
    }

    #[test]
    fn test_schema_names() {
        for schema in ColorSchema::ALL {
            assert_eq!(ColorSchema::from_name(schema.name()), Some(schema));
        }
        assert_eq!(ColorSchema::from_name("rainbow"), None);
    }
}
