// SPDX-License-Identifier: GPL-3.0-only

//! Consumer-side frame materialization
//!
//! Turns the latest frameset from the mailbox into display buffers. Runs on
//! the consumer thread only; buffers are never touched by the acquisition
//! thread.

use super::align::{AlignTo, align_frameset};
use super::colorizer::{Colorizer, ColorizerOptions};
use super::mailbox::Mailbox;
use super::spatial::deproject_pixel_to_point;
use crate::backends::device::types::{Calibration, FrameSet, Intrinsics, PixelFormat, StreamSet};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::CameraError;
use tracing::{debug, warn};

/// What a texture sink needs to upload a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Texture coordinates are 0..1 instead of pixel units
    pub normalized_coordinates: bool,
}

/// Pixel storage owned by the consumer
#[derive(Debug, Clone)]
pub struct DisplayBuffer<T> {
    width: u32,
    height: u32,
    format: PixelFormat,
    normalized_coordinates: bool,
    data: Vec<T>,
    generation: u64,
}

impl<T: Copy + Default> DisplayBuffer<T> {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            width: 0,
            height: 0,
            format,
            normalized_coordinates: false,
            data: Vec::new(),
            generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Bumped on every write
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.generation == 0
    }

    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            width: self.width,
            height: self.height,
            format: self.format,
            normalized_coordinates: self.normalized_coordinates,
        }
    }

    pub fn set_normalized_coordinates(&mut self, normalized: bool) {
        self.normalized_coordinates = normalized;
    }

    /// Values per pixel
    fn channels(&self) -> usize {
        match self.format {
            PixelFormat::Rgb8 => 3,
            _ => 1,
        }
    }

    /// Single-channel sample, `None` outside the buffer
    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get((y * self.width + x) as usize * self.channels())
            .copied()
    }

    /// Copy new contents, reallocating only when the dimensions change
    fn write(&mut self, width: u32, height: u32, values: &[T]) {
        if width != self.width || height != self.height {
            debug!(
                format = %self.format,
                width,
                height,
                "Display buffer resized"
            );
            self.width = width;
            self.height = height;
            self.data = vec![T::default(); values.len()];
        }
        if self.data.len() != values.len() {
            self.data.resize(values.len(), T::default());
        }
        self.data.copy_from_slice(values);
        self.generation += 1;
    }

    fn clear(&mut self) {
        self.width = 0;
        self.height = 0;
        self.data.clear();
        self.generation = 0;
    }
}

/// Display buffers plus the calibration snapshot they were produced with
pub struct FrameMaterializer {
    colorizer: Colorizer,
    align: bool,
    align_to: AlignTo,
    calibration: Option<Calibration>,
    depth: DisplayBuffer<u8>,
    depth_raw: DisplayBuffer<u16>,
    color: DisplayBuffer<u8>,
    infrared: DisplayBuffer<u8>,
    /// Raw depth of the last frame lives on the color grid
    depth_on_color_grid: bool,
    frame_new: bool,
    delivered: u64,
}

impl FrameMaterializer {
    pub fn new(colorizer: ColorizerOptions) -> Self {
        Self {
            colorizer: Colorizer::new(colorizer),
            align: false,
            align_to: AlignTo::default(),
            calibration: None,
            depth: DisplayBuffer::new(PixelFormat::Rgb8),
            depth_raw: DisplayBuffer::new(PixelFormat::Z16),
            color: DisplayBuffer::new(PixelFormat::Rgb8),
            infrared: DisplayBuffer::new(PixelFormat::Gray8),
            depth_on_color_grid: false,
            frame_new: false,
            delivered: 0,
        }
    }

    /// Prepare for a new session
    ///
    /// Buffers of enabled streams stay visible until replaced; buffers of
    /// disabled streams are dropped.
    pub fn begin_session(&mut self, calibration: Calibration, streams: &StreamSet) {
        self.calibration = Some(calibration);
        self.frame_new = false;
        if !streams.depth.enabled {
            self.depth.clear();
            self.depth_raw.clear();
            self.depth_on_color_grid = false;
        }
        if !streams.color.enabled {
            self.color.clear();
        }
        if !streams.infrared.enabled {
            self.infrared.clear();
        }
        // Arbitrary texture layout means pixel-unit texture coordinates
        let depth_normalized = !streams.depth.use_arbitrary_texture_layout;
        self.depth.set_normalized_coordinates(depth_normalized);
        self.depth_raw.set_normalized_coordinates(depth_normalized);
        self.color
            .set_normalized_coordinates(!streams.color.use_arbitrary_texture_layout);
        self.infrared
            .set_normalized_coordinates(!streams.infrared.use_arbitrary_texture_layout);
    }

    /// Forget all buffers and calibration
    pub fn reset(&mut self) {
        self.calibration = None;
        self.depth.clear();
        self.depth_raw.clear();
        self.color.clear();
        self.infrared.clear();
        self.depth_on_color_grid = false;
        self.frame_new = false;
    }

    pub fn colorizer(&self) -> &Colorizer {
        &self.colorizer
    }

    pub fn colorizer_mut(&mut self) -> &mut Colorizer {
        &mut self.colorizer
    }

    pub fn set_alignment(&mut self, enabled: bool, to: AlignTo) {
        self.align = enabled;
        self.align_to = to;
    }

    pub fn is_aligned(&self) -> bool {
        self.align
    }

    pub fn align_to(&self) -> AlignTo {
        self.align_to
    }

    /// Non-blocking; returns whether a frameset was materialized
    pub fn update(&mut self, mailbox: &Mailbox<FrameSet>) -> bool {
        match mailbox.try_take() {
            Some(frameset) => {
                self.materialize(frameset);
                true
            }
            None => false,
        }
    }

    /// Consult-and-clear
    pub fn is_frame_new(&mut self) -> bool {
        std::mem::take(&mut self.frame_new)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered
    }

    pub fn materialize(&mut self, frameset: FrameSet) {
        let calibration = self.calibration;
        let mut on_color_grid = false;

        let frameset = match (self.align, &calibration) {
            (true, Some(cal)) if frameset.depth.is_some() && frameset.color.is_some() => {
                match align_frameset(&frameset, cal, self.align_to) {
                    Ok(aligned) => {
                        on_color_grid = self.align_to == AlignTo::Color;
                        aligned
                    }
                    Err(CameraError::AlignmentUnavailable) => {
                        if self.delivered % FRAME_LOG_INTERVAL == 0 {
                            warn!("Alignment unavailable for this frameset, showing unaligned");
                        }
                        frameset
                    }
                    Err(e) => {
                        warn!(error = %e, "Alignment failed");
                        frameset
                    }
                }
            }
            _ => frameset,
        };

        if let Some(depth) = &frameset.depth {
            let scale = self.depth_scale();
            let rgb = self.colorizer.colorize(depth, scale);
            self.depth.write(depth.width, depth.height, &rgb);
            self.depth_raw.write(depth.width, depth.height, &depth.data);
            self.depth_on_color_grid = on_color_grid;
        }
        if let Some(color) = &frameset.color {
            self.color.write(color.width, color.height, &color.data);
        }
        if let Some(ir) = &frameset.infrared {
            self.infrared.write(ir.width, ir.height, &ir.data);
        }

        self.frame_new = true;
        self.delivered += 1;
        if self.delivered % FRAME_LOG_INTERVAL == 0 {
            debug!(
                delivered = self.delivered,
                timestamp_us = frameset.timestamp_us(),
                "Frames materialized"
            );
        }
    }

    pub fn depth_buffer(&self) -> &DisplayBuffer<u8> {
        &self.depth
    }

    pub fn depth_raw_buffer(&self) -> &DisplayBuffer<u16> {
        &self.depth_raw
    }

    pub fn color_buffer(&self) -> &DisplayBuffer<u8> {
        &self.color
    }

    pub fn infrared_buffer(&self) -> &DisplayBuffer<u8> {
        &self.infrared
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Meters per raw unit of the current session, 0.0 without one
    pub fn depth_scale(&self) -> f32 {
        self.calibration.map(|c| c.depth_scale).unwrap_or(0.0)
    }

    /// Intrinsics matching the raw depth buffer's pixel grid
    pub fn depth_intrinsics(&self) -> Option<Intrinsics> {
        let cal = self.calibration.as_ref()?;
        let base = if self.depth_on_color_grid {
            cal.color?
        } else {
            cal.depth?
        };
        if self.depth_raw.is_empty() {
            return Some(base);
        }
        Some(base.scaled(self.depth_raw.width(), self.depth_raw.height()))
    }

    /// Metric distance at a pixel, 0.0 when out of range or unavailable
    pub fn distance_at(&self, x: f32, y: f32) -> f32 {
        if !(x >= 0.0 && y >= 0.0) {
            return 0.0;
        }
        self.depth_raw
            .get(x as u32, y as u32)
            .map(|raw| raw as f32 * self.depth_scale())
            .unwrap_or(0.0)
    }

    /// Camera-space point under a pixel, `None` without valid depth
    pub fn world_coordinate_at(&self, x: f32, y: f32) -> Option<[f32; 3]> {
        let depth = self.distance_at(x, y);
        if depth <= 0.0 {
            return None;
        }
        let intr = self.depth_intrinsics()?;
        Some(deproject_pixel_to_point(&intr, [x, y], depth))
    }
}
