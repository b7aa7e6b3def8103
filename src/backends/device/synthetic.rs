// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic depth device
//!
//! Produces deterministic test-pattern framesets for headless operation and
//! tests. Timestamps derive from the frame number, never from the wall clock.

use super::types::*;
use super::{DepthDevice, DeviceControls, FrameSource};
use crate::config::CalibrationDefaults;
use crate::constants::stream::{COMMON_FRAMERATES, SYNTHETIC_RESOLUTIONS};
use crate::errors::{CameraError, CameraResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Depth content generated by the synthetic device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticPattern {
    /// Every pixel carries the same raw value
    Constant(u16),
    /// Horizontal ramp from 500 to 4000 raw units
    Ramp,
    /// Moving sine relief around 1.5m, with an invalid band on the left edge
    Wave,
}

impl SyntheticPattern {
    fn depth_at(&self, x: u32, y: u32, width: u32, height: u32, frame: u64) -> u16 {
        match *self {
            SyntheticPattern::Constant(value) => value,
            SyntheticPattern::Ramp => 500 + ((x as u64 * 3500) / width.max(1) as u64) as u16,
            SyntheticPattern::Wave => {
                if x < width / 32 {
                    return 0;
                }
                let fx = x as f32 / width.max(1) as f32;
                let fy = y as f32 / height.max(1) as f32;
                let phase = frame as f32 * 0.1;
                let relief = (fx * std::f32::consts::TAU + phase).sin()
                    * (fy * std::f32::consts::PI).sin();
                (1500.0 + 500.0 * relief) as u16
            }
        }
    }
}

/// Option state of the synthetic device, readable for inspection
#[derive(Debug)]
pub struct SyntheticControls {
    auto_exposure: AtomicBool,
    emitter_enabled: AtomicBool,
    ir_exposure_us: AtomicI64,
}

impl Default for SyntheticControls {
    fn default() -> Self {
        Self {
            auto_exposure: AtomicBool::new(true),
            emitter_enabled: AtomicBool::new(true),
            ir_exposure_us: AtomicI64::new(crate::constants::sensor::IR_EXPOSURE_DEFAULT_US),
        }
    }
}

impl SyntheticControls {
    pub fn auto_exposure(&self) -> bool {
        self.auto_exposure.load(Ordering::SeqCst)
    }

    pub fn emitter_enabled(&self) -> bool {
        self.emitter_enabled.load(Ordering::SeqCst)
    }

    pub fn ir_exposure_us(&self) -> i64 {
        self.ir_exposure_us.load(Ordering::SeqCst)
    }
}

impl DeviceControls for SyntheticControls {
    fn set_auto_exposure(&self, enabled: bool) -> CameraResult<()> {
        self.auto_exposure.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn set_emitter_enabled(&self, enabled: bool) -> CameraResult<()> {
        self.emitter_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn set_ir_exposure(&self, micros: i64) -> CameraResult<()> {
        self.ir_exposure_us.store(micros, Ordering::SeqCst);
        Ok(())
    }
}

/// Test-pattern device
pub struct SyntheticDevice {
    pattern: SyntheticPattern,
    calibration: CalibrationDefaults,
    realtime: bool,
    has_depth_sensor: bool,
    disconnect_after: Option<u64>,
    controls: Arc<SyntheticControls>,
}

impl SyntheticDevice {
    pub fn new(pattern: SyntheticPattern) -> Self {
        Self {
            pattern,
            calibration: CalibrationDefaults::default(),
            realtime: true,
            has_depth_sensor: true,
            disconnect_after: None,
            controls: Arc::new(SyntheticControls::default()),
        }
    }

    pub fn with_calibration(mut self, calibration: CalibrationDefaults) -> Self {
        self.calibration = calibration;
        self
    }

    pub fn with_depth_scale(mut self, depth_scale: f32) -> Self {
        self.calibration.depth_scale = depth_scale;
        self
    }

    /// Pace framesets at the negotiated frame rate (default on)
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Behave like a color-only camera
    pub fn without_depth_sensor(mut self) -> Self {
        self.has_depth_sensor = false;
        self
    }

    /// Report a disconnect after delivering `framesets` framesets
    pub fn disconnect_after(mut self, framesets: u64) -> Self {
        self.disconnect_after = Some(framesets);
        self
    }

    /// Shared option state
    pub fn synthetic_controls(&self) -> Arc<SyntheticControls> {
        Arc::clone(&self.controls)
    }
}

impl DepthDevice for SyntheticDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Synthetic Depth Camera".to_string(),
            serial: "SYNTH-0001".to_string(),
            backend: "synthetic".to_string(),
            path: format!("synthetic:{:?}", self.pattern),
        }
    }

    fn profiles(&self) -> Vec<StreamProfile> {
        let mut profiles = Vec::new();
        for kind in StreamKind::ALL {
            if kind == StreamKind::Depth && !self.has_depth_sensor {
                continue;
            }
            for &(width, height) in SYNTHETIC_RESOLUTIONS {
                for &fps in COMMON_FRAMERATES {
                    profiles.push(StreamProfile {
                        kind,
                        width,
                        height,
                        fps,
                        format: kind.pipeline_format(),
                    });
                }
            }
        }
        profiles
    }

    fn depth_scale(&self) -> Option<f32> {
        self.has_depth_sensor.then_some(self.calibration.depth_scale)
    }

    fn calibration(&self, streams: &StreamSet) -> Calibration {
        let res = |c: &StreamConfig| c.enabled.then_some((c.width, c.height));
        self.calibration
            .to_calibration(res(&streams.depth), res(&streams.color), res(&streams.infrared))
    }

    fn open(&self, streams: &StreamSet) -> CameraResult<Box<dyn FrameSource>> {
        if !streams.any_enabled() {
            return Err(CameraError::NoStreamEnabled);
        }
        let fps = streams
            .enabled()
            .iter()
            .map(|s| s.fps)
            .max()
            .unwrap_or(30)
            .max(1);

        info!(pattern = ?self.pattern, fps, realtime = self.realtime, "Opening synthetic source");

        Ok(Box::new(SyntheticSource {
            streams: *streams,
            pattern: self.pattern,
            interval: Duration::from_micros(1_000_000 / fps as u64),
            realtime: self.realtime,
            started: Instant::now(),
            frame_number: 0,
            disconnect_after: self.disconnect_after,
        }))
    }

    fn controls(&self) -> Option<Arc<dyn DeviceControls>> {
        Some(self.controls.clone())
    }
}

struct SyntheticSource {
    streams: StreamSet,
    pattern: SyntheticPattern,
    interval: Duration,
    realtime: bool,
    started: Instant,
    frame_number: u64,
    disconnect_after: Option<u64>,
}

impl SyntheticSource {
    fn depth_values(&self, width: u32, height: u32) -> Vec<u16> {
        let mut values = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(
                    self.pattern
                        .depth_at(x, y, width, height, self.frame_number),
                );
            }
        }
        values
    }
}

impl FrameSource for SyntheticSource {
    fn wait_for_frames(&mut self) -> CameraResult<FrameSet> {
        if self
            .disconnect_after
            .is_some_and(|limit| self.frame_number >= limit)
        {
            return Err(CameraError::DeviceDisconnected(
                "synthetic device unplugged".to_string(),
            ));
        }

        let timestamp_us = self.frame_number * self.interval.as_micros() as u64;
        if self.realtime {
            let due = self.started + Duration::from_micros(timestamp_us);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        let n = self.frame_number;
        let mut set = FrameSet::default();

        if self.streams.depth.enabled {
            let (w, h) = (self.streams.depth.width, self.streams.depth.height);
            set.depth = Some(DepthFrame::new(w, h, self.depth_values(w, h), timestamp_us, n));
        }

        if self.streams.color.enabled {
            let (w, h) = (self.streams.color.width, self.streams.color.height);
            let mut rgb = Vec::with_capacity((w * h * 3) as usize);
            for y in 0..h {
                for x in 0..w {
                    rgb.extend_from_slice(&[
                        (x * 255 / w.max(1)) as u8,
                        (y * 255 / h.max(1)) as u8,
                        (n % 256) as u8,
                    ]);
                }
            }
            set.color = Some(ColorFrame::new(w, h, rgb, timestamp_us, n));
        }

        if self.streams.infrared.enabled {
            let (w, h) = (self.streams.infrared.width, self.streams.infrared.height);
            let gray = self
                .depth_values(w, h)
                .into_iter()
                .map(|d| if d == 0 { 0 } else { 255 - (d / 16).min(255) as u8 })
                .collect();
            set.infrared = Some(InfraredFrame::new(w, h, gray, timestamp_us, n));
        }

        if n % crate::constants::timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frame = n, timestamp_us, "Synthetic frameset generated");
        }

        self.frame_number += 1;
        Ok(set)
    }
}
