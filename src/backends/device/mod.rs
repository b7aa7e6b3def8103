// SPDX-License-Identifier: GPL-3.0-only

//! Depth device abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │     DepthCamera     │  ← Facade, owns the capture session
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │  DepthDevice trait  │  ← Profiles, calibration, controls
//! └──────────┬──────────┘
//!            │ open()
//!            ▼
//! ┌─────────────────────┐
//! │  FrameSource trait  │  ← Blocking frameset delivery
//! └──────────┬──────────┘
//!            │
//!   ┌────────┼───────────┐
//!   ▼        ▼           ▼
//! ┌────┐ ┌─────────┐ ┌────────┐
//! │V4L2│ │Synthetic│ │Playback│
//! └────┘ └─────────┘ └────────┘
//! ```

pub mod format_converters;
pub mod synthetic;
pub mod types;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod v4l2_controls;

pub use types::*;

use crate::config::Config;
use crate::errors::{CameraError, CameraResult};
use std::sync::Arc;
use tracing::{debug, info};

/// A physical or virtual depth device
pub trait DepthDevice: Send + Sync {
    /// Identification for logs and listings
    fn info(&self) -> DeviceInfo;

    /// Every stream profile the device can deliver
    fn profiles(&self) -> Vec<StreamProfile>;

    /// Meters per raw depth unit, `None` if the device has no depth sensor
    fn depth_scale(&self) -> Option<f32>;

    /// Calibration for the given negotiated streams
    fn calibration(&self, streams: &StreamSet) -> Calibration;

    /// Open a capture session delivering the enabled streams
    fn open(&self, streams: &StreamSet) -> CameraResult<Box<dyn FrameSource>>;

    /// Sensor option handle, `None` for devices without adjustable options
    fn controls(&self) -> Option<Arc<dyn DeviceControls>> {
        None
    }

    /// Whether frames come from a recording
    fn is_playback(&self) -> bool {
        false
    }
}

/// Blocking source of synchronized framesets
///
/// Owned by the acquisition thread for the lifetime of a session.
pub trait FrameSource: Send {
    /// Block until the next frameset is available
    ///
    /// Errors end the session: `DeviceDisconnected` when the device went away,
    /// `EndOfStream` when a non-repeating recording is exhausted.
    fn wait_for_frames(&mut self) -> CameraResult<FrameSet>;
}

/// Sensor options applied to a live device
///
/// Implementations must not share state with the capture stream; options are
/// changed from the consumer thread while the acquisition thread is blocked.
pub trait DeviceControls: Send + Sync {
    fn set_auto_exposure(&self, enabled: bool) -> CameraResult<()>;

    fn set_emitter_enabled(&self, enabled: bool) -> CameraResult<()>;

    /// Manual IR exposure in microseconds
    fn set_ir_exposure(&self, micros: i64) -> CameraResult<()>;
}

/// Enumerate the available devices
///
/// V4L2 devices come first (sorted by node path), then the synthetic device
/// when enabled in the config.
pub fn enumerate_devices(config: &Config) -> Vec<Arc<dyn DepthDevice>> {
    let mut devices: Vec<Arc<dyn DepthDevice>> = Vec::new();

    #[cfg(all(target_os = "linux", feature = "v4l2"))]
    for device in v4l2::find_depth_devices(config.calibration) {
        devices.push(Arc::new(device));
    }

    if config.synthetic_device {
        devices.push(Arc::new(
            synthetic::SyntheticDevice::new(synthetic::SyntheticPattern::Wave)
                .with_calibration(config.calibration),
        ));
    }

    debug!(count = devices.len(), "Enumerated depth devices");
    devices
}

/// Select the profile matching an exact width × height × fps request
///
/// Prefers the pipeline-native pixel format of the stream kind, otherwise the
/// first format offered for that mode.
pub fn negotiate(
    profiles: &[StreamProfile],
    kind: StreamKind,
    request: StreamRequest,
) -> CameraResult<StreamConfig> {
    let candidates: Vec<&StreamProfile> = profiles
        .iter()
        .filter(|p| p.matches(kind, request.width, request.height, request.fps))
        .collect();

    let chosen = candidates
        .iter()
        .find(|p| p.format == kind.pipeline_format())
        .or_else(|| candidates.first())
        .ok_or(CameraError::UnsupportedProfile {
            kind,
            width: request.width,
            height: request.height,
            fps: request.fps,
        })?;

    info!(profile = %chosen, "Negotiated stream profile");
    Ok(StreamConfig::from_profile(
        chosen,
        request.use_arbitrary_texture_layout,
    ))
}

/// Log every profile of a device, grouped by stream kind
pub fn log_profiles(device: &dyn DepthDevice) {
    let info = device.info();
    let profiles = device.profiles();
    info!(
        name = %info.name,
        serial = %info.serial,
        count = profiles.len(),
        "Available stream profiles"
    );
    for kind in StreamKind::ALL {
        for profile in profiles.iter().filter(|p| p.kind == kind) {
            info!(name = %info.name, profile = %profile, "  profile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles() -> Vec<StreamProfile> {
        vec![
            StreamProfile {
                kind: StreamKind::Depth,
                width: 640,
                height: 480,
                fps: 30,
                format: PixelFormat::Z16,
            },
            StreamProfile {
                kind: StreamKind::Color,
                width: 640,
                height: 480,
                fps: 30,
                format: PixelFormat::Yuyv,
            },
            StreamProfile {
                kind: StreamKind::Color,
                width: 640,
                height: 480,
                fps: 30,
                format: PixelFormat::Rgb8,
            },
        ]
    }

    #[test]
    fn test_negotiate_exact_match() {
        let config =
            negotiate(&profiles(), StreamKind::Depth, StreamRequest::new(640, 480).fps(30)).unwrap();
        assert!(config.enabled);
        assert_eq!((config.width, config.height, config.fps), (640, 480, 30));
        assert!(config.use_arbitrary_texture_layout);
    }

    #[test]
    fn test_negotiate_prefers_native_format() {
        let config =
            negotiate(&profiles(), StreamKind::Color, StreamRequest::new(640, 480).fps(30)).unwrap();
        assert_eq!(config.format, PixelFormat::Rgb8);
    }

    #[test]
    fn test_negotiate_rejects_unknown_mode() {
        let err = negotiate(&profiles(), StreamKind::Depth, StreamRequest::new(123, 45).fps(7))
            .unwrap_err();
        assert_eq!(
            err,
            CameraError::UnsupportedProfile {
                kind: StreamKind::Depth,
                width: 123,
                height: 45,
                fps: 7
            }
        );
    }

    #[test]
    fn test_negotiate_fps_must_match() {
        assert!(
            negotiate(&profiles(), StreamKind::Depth, StreamRequest::new(640, 480)).is_err(),
            "default 60fps is not offered"
        );
    }
}
