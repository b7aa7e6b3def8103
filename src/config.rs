// SPDX-License-Identifier: GPL-3.0-only

//! Persisted user configuration
//!
//! Stored as pretty-printed JSON at `<config dir>/depthcam/config.json`.

use crate::backends::device::types::{Calibration, Extrinsics, Intrinsics};
use crate::constants::calibration;
use crate::errors::{AppError, AppResult};
use crate::pipeline::align::AlignTo;
use crate::pipeline::colorizer::ColorizerOptions;
use crate::pipeline::filters::FilterSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Calibration used when the backend cannot report one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationDefaults {
    /// Reference resolution the focal lengths and principal point belong to
    pub width: u32,
    pub height: u32,
    pub fx: f32,
    pub fy: f32,
    pub ppx: f32,
    pub ppy: f32,
    /// Stereo baseline in meters
    pub baseline: f32,
    /// Meters per raw depth unit
    pub depth_scale: f32,
    /// Color sensor offset from the depth sensor along X, meters
    pub depth_to_color_x: f32,
}

impl Default for CalibrationDefaults {
    fn default() -> Self {
        Self {
            width: calibration::BASE_WIDTH,
            height: calibration::BASE_HEIGHT,
            fx: calibration::FX,
            fy: calibration::FY,
            ppx: calibration::PPX,
            ppy: calibration::PPY,
            baseline: calibration::BASELINE_M,
            depth_scale: calibration::DEPTH_SCALE,
            depth_to_color_x: calibration::DEPTH_TO_COLOR_X_M,
        }
    }
}

impl CalibrationDefaults {
    /// Reference intrinsics rescaled to a stream resolution
    pub fn intrinsics(&self, width: u32, height: u32) -> Intrinsics {
        Intrinsics::pinhole(self.width, self.height, self.fx, self.fy, self.ppx, self.ppy)
            .scaled(width, height)
    }

    /// Build a full calibration for the given per-stream resolutions
    pub fn to_calibration(
        &self,
        depth: Option<(u32, u32)>,
        color: Option<(u32, u32)>,
        infrared: Option<(u32, u32)>,
    ) -> Calibration {
        Calibration {
            depth_scale: self.depth_scale,
            depth: depth.map(|(w, h)| self.intrinsics(w, h)),
            color: color.map(|(w, h)| self.intrinsics(w, h)),
            infrared: infrared.map(|(w, h)| self.intrinsics(w, h)),
            depth_to_color: Extrinsics::baseline(self.depth_to_color_x),
            baseline: self.baseline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device index used when none is given
    pub device_index: usize,
    /// Append the synthetic test-pattern device to the device list
    pub synthetic_device: bool,
    /// Directory for recordings and snapshots
    pub recordings_dir: PathBuf,
    /// Restart playback from the beginning at end of file
    pub playback_repeat: bool,
    /// Sleep during playback to honour recorded timestamps
    pub playback_realtime: bool,
    /// Depth colorizer settings
    pub colorizer: ColorizerOptions,
    /// Alignment direction used when alignment is enabled
    pub align_to: AlignTo,
    /// Post-processing filter settings
    pub filters: FilterSettings,
    /// Fallback calibration
    pub calibration: CalibrationDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_index: crate::constants::stream::DEFAULT_DEVICE_ID,
            synthetic_device: false,
            recordings_dir: default_recordings_dir(),
            playback_repeat: true,
            playback_realtime: true,
            colorizer: ColorizerOptions::default(),
            align_to: AlignTo::default(),
            filters: FilterSettings::default(),
            calibration: CalibrationDefaults::default(),
        }
    }
}

/// Default recordings directory (`<videos>/depthcam`, falling back to the working directory)
pub fn default_recordings_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("depthcam"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Path of the persisted configuration file
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("depthcam").join("config.json"))
}

impl Config {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                warn!("Could not determine config directory, using defaults");
                Self::default()
            }
        }
    }

    /// Load from a path; a missing or malformed file yields the defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "Loaded config");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<()> {
        let path =
            config_path().ok_or_else(|| AppError::Config("no config directory".to_string()))?;
        self.save_to(&path)
    }

    /// Save to a path, creating parent directories
    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, json)?;

        info!(path = %path.display(), "Saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_defaults_scale_with_resolution() {
        let defaults = CalibrationDefaults::default();
        let half = defaults.intrinsics(320, 240);
        assert!((half.fx - defaults.fx / 2.0).abs() < 1e-3);
        assert_eq!(half.width, 320);
    }

    #[test]
    fn test_to_calibration_only_fills_enabled_streams() {
        let cal = CalibrationDefaults::default().to_calibration(Some((640, 480)), None, None);
        assert!(cal.depth.is_some());
        assert!(cal.color.is_none());
        assert!(cal.infrared.is_none());
        assert_eq!(cal.depth_scale, calibration::DEPTH_SCALE);
    }
}
