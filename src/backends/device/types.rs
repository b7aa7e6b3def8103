// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for depth device backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sensor stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Color,
    Infrared,
    Depth,
}

impl StreamKind {
    pub const ALL: [StreamKind; 3] = [StreamKind::Color, StreamKind::Infrared, StreamKind::Depth];

    /// Stable tag used by the recording container
    pub fn tag(&self) -> u8 {
        match self {
            StreamKind::Color => 0,
            StreamKind::Infrared => 1,
            StreamKind::Depth => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StreamKind::Color),
            1 => Some(StreamKind::Infrared),
            2 => Some(StreamKind::Depth),
            _ => None,
        }
    }

    /// Pixel format frames of this kind carry once inside the pipeline
    pub fn pipeline_format(&self) -> PixelFormat {
        match self {
            StreamKind::Color => PixelFormat::Rgb8,
            StreamKind::Infrared => PixelFormat::Gray8,
            StreamKind::Depth => PixelFormat::Z16,
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Color => write!(f, "color"),
            StreamKind::Infrared => write!(f, "infrared"),
            StreamKind::Depth => write!(f, "depth"),
        }
    }
}

/// Pixel format of a stream as delivered by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16-bit depth units, one value per pixel
    Z16,
    /// Packed 24-bit RGB
    Rgb8,
    /// Packed 4:2:2 YUV, converted to RGB8 at capture
    Yuyv,
    /// 8-bit luminance (infrared)
    Gray8,
}

impl PixelFormat {
    /// V4L2 FourCC for this format
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            PixelFormat::Z16 => *b"Z16 ",
            PixelFormat::Rgb8 => *b"RGB3",
            PixelFormat::Yuyv => *b"YUYV",
            PixelFormat::Gray8 => *b"GREY",
        }
    }

    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"Z16 " => Some(PixelFormat::Z16),
            b"RGB3" => Some(PixelFormat::Rgb8),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"GREY" => Some(PixelFormat::Gray8),
            _ => None,
        }
    }

    /// Bytes per pixel on the wire
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Z16 | PixelFormat::Yuyv => 2,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fourcc = self.fourcc();
        write!(f, "{}", String::from_utf8_lossy(&fourcc).trim_end())
    }
}

/// One resolution × format × fps combination a device can stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamProfile {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
}

impl StreamProfile {
    pub fn matches(&self, kind: StreamKind, width: u32, height: u32, fps: u32) -> bool {
        self.kind == kind && self.width == width && self.height == height && self.fps == fps
    }
}

impl std::fmt::Display for StreamProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}x{} @ {}fps ({})",
            self.kind, self.width, self.height, self.fps, self.format
        )
    }
}

/// Requested stream parameters, as passed to the enable calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Use pixel-addressed (rectangle) texture coordinates instead of normalized ones
    pub use_arbitrary_texture_layout: bool,
}

impl StreamRequest {
    /// Request with the default 60fps and arbitrary texture layout
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fps: 60,
            use_arbitrary_texture_layout: true,
        }
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn arbitrary_texture_layout(mut self, enabled: bool) -> Self {
        self.use_arbitrary_texture_layout = enabled;
        self
    }
}

/// Negotiated configuration of one stream
///
/// Set by the enable calls before the session starts and left untouched while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub enabled: bool,
    pub format: PixelFormat,
    pub use_arbitrary_texture_layout: bool,
}

impl StreamConfig {
    pub fn disabled(kind: StreamKind) -> Self {
        Self {
            kind,
            width: 0,
            height: 0,
            fps: 0,
            enabled: false,
            format: kind.pipeline_format(),
            use_arbitrary_texture_layout: true,
        }
    }

    pub fn from_profile(profile: &StreamProfile, use_arbitrary_texture_layout: bool) -> Self {
        Self {
            kind: profile.kind,
            width: profile.width,
            height: profile.height,
            fps: profile.fps,
            enabled: true,
            format: profile.format,
            use_arbitrary_texture_layout,
        }
    }

    pub fn profile(&self) -> StreamProfile {
        StreamProfile {
            kind: self.kind,
            width: self.width,
            height: self.height,
            fps: self.fps,
            format: self.format,
        }
    }
}

/// The three stream slots of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSet {
    pub color: StreamConfig,
    pub infrared: StreamConfig,
    pub depth: StreamConfig,
}

impl Default for StreamSet {
    fn default() -> Self {
        Self {
            color: StreamConfig::disabled(StreamKind::Color),
            infrared: StreamConfig::disabled(StreamKind::Infrared),
            depth: StreamConfig::disabled(StreamKind::Depth),
        }
    }
}

impl StreamSet {
    pub fn get(&self, kind: StreamKind) -> &StreamConfig {
        match kind {
            StreamKind::Color => &self.color,
            StreamKind::Infrared => &self.infrared,
            StreamKind::Depth => &self.depth,
        }
    }

    pub fn get_mut(&mut self, kind: StreamKind) -> &mut StreamConfig {
        match kind {
            StreamKind::Color => &mut self.color,
            StreamKind::Infrared => &mut self.infrared,
            StreamKind::Depth => &mut self.depth,
        }
    }

    pub fn any_enabled(&self) -> bool {
        self.color.enabled || self.infrared.enabled || self.depth.enabled
    }

    /// Enabled stream configurations in color, infrared, depth order
    pub fn enabled(&self) -> Vec<StreamConfig> {
        [self.color, self.infrared, self.depth]
            .into_iter()
            .filter(|s| s.enabled)
            .collect()
    }
}

/// Lens distortion model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistortionModel {
    /// Rectilinear images, no distortion compensation required
    #[default]
    None,
    /// Equivalent to Brown-Conrady, but the radial factor is applied to the tangential terms too
    ModifiedBrownConrady,
    /// Coefficients describe the undistortion of a distorted image
    InverseBrownConrady,
    /// Classic Brown-Conrady distortion
    BrownConrady,
    /// Four-parameter Kannala-Brandt fisheye model
    KannalaBrandt4,
}

/// Per-stream pinhole calibration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Principal point, pixels from the left edge
    pub ppx: f32,
    /// Principal point, pixels from the top edge
    pub ppy: f32,
    /// Focal length in multiples of pixel width
    pub fx: f32,
    /// Focal length in multiples of pixel height
    pub fy: f32,
    pub model: DistortionModel,
    pub coeffs: [f32; 5],
}

impl Intrinsics {
    /// Pinhole calibration without distortion
    pub fn pinhole(width: u32, height: u32, fx: f32, fy: f32, ppx: f32, ppy: f32) -> Self {
        Self {
            width,
            height,
            ppx,
            ppy,
            fx,
            fy,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }

    /// Rescale to another resolution of the same sensor
    pub fn scaled(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return *self;
        }
        let sx = width as f32 / self.width.max(1) as f32;
        let sy = height as f32 / self.height.max(1) as f32;
        Self {
            width,
            height,
            ppx: (self.ppx + 0.5) * sx - 0.5,
            ppy: (self.ppy + 0.5) * sy - 0.5,
            fx: self.fx * sx,
            fy: self.fy * sy,
            model: self.model,
            coeffs: self.coeffs,
        }
    }
}

/// Rigid transform between two sensors' coordinate frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Column-major 3x3 rotation
    pub rotation: [f32; 9],
    /// Translation in meters
    pub translation: [f32; 3],
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::identity()
    }
}

impl Extrinsics {
    pub fn identity() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }

    /// Pure translation along X (stereo baseline)
    pub fn baseline(meters: f32) -> Self {
        Self {
            translation: [meters, 0.0, 0.0],
            ..Self::identity()
        }
    }

    pub fn transform(&self, p: [f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0] * p[0] + r[3] * p[1] + r[6] * p[2] + t[0],
            r[1] * p[0] + r[4] * p[1] + r[7] * p[2] + t[1],
            r[2] * p[0] + r[5] * p[1] + r[8] * p[2] + t[2],
        ]
    }
}

/// Calibration snapshot of a capture session
///
/// Immutable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Meters per raw depth unit
    pub depth_scale: f32,
    pub depth: Option<Intrinsics>,
    pub color: Option<Intrinsics>,
    pub infrared: Option<Intrinsics>,
    /// Depth sensor to color sensor transform
    pub depth_to_color: Extrinsics,
    /// Stereo baseline in meters, used by the disparity transforms
    pub baseline: f32,
}

impl Calibration {
    pub fn intrinsics(&self, kind: StreamKind) -> Option<&Intrinsics> {
        match kind {
            StreamKind::Color => self.color.as_ref(),
            StreamKind::Infrared => self.infrared.as_ref(),
            StreamKind::Depth => self.depth.as_ref(),
        }
    }
}

/// A single sensor frame
///
/// Pixel storage is shared, so cloning a frame never copies pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame<T> {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[T]>,
    /// Acquisition time in microseconds since the session started
    pub timestamp_us: u64,
    /// Monotonically increasing per stream
    pub frame_number: u64,
}

impl<T: Copy> Frame<T> {
    pub fn new(width: u32, height: u32, data: Vec<T>, timestamp_us: u64, frame_number: u64) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data),
            timestamp_us,
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Sample at pixel coordinates, `None` outside the frame
    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get((y * self.width + x) as usize).copied()
    }
}

/// Raw 16-bit depth units
pub type DepthFrame = Frame<u16>;
/// Packed RGB8 pixels (3 values per pixel)
pub type ColorFrame = Frame<u8>;
/// 8-bit luminance
pub type InfraredFrame = Frame<u8>;

/// Synchronized bundle of frames sharing an acquisition moment
///
/// Immutable once produced; stages derive new framesets instead of mutating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    pub depth: Option<DepthFrame>,
    pub color: Option<ColorFrame>,
    pub infrared: Option<InfraredFrame>,
}

impl FrameSet {
    /// Copy of this frameset with the depth frame replaced
    pub fn with_depth(&self, depth: DepthFrame) -> Self {
        Self {
            depth: Some(depth),
            color: self.color.clone(),
            infrared: self.infrared.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.depth.is_none() && self.color.is_none() && self.infrared.is_none()
    }

    /// Latest timestamp among the contained frames
    pub fn timestamp_us(&self) -> u64 {
        [
            self.depth.as_ref().map(|f| f.timestamp_us),
            self.color.as_ref().map(|f| f.timestamp_us),
            self.infrared.as_ref().map(|f| f.timestamp_us),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }
}

/// Identification of an enumerated device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Product name
    pub name: String,
    /// Serial number or bus identifier
    pub serial: String,
    /// Backend name (e.g. "v4l2", "synthetic")
    pub backend: String,
    /// Device node(s) or other locator
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_kind_tags_round_trip() {
        for kind in StreamKind::ALL {
            assert_eq!(StreamKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(StreamKind::from_tag(9), None);
    }

    #[test]
    fn test_fourcc_parsing() {
        assert_eq!(PixelFormat::from_fourcc(b"Z16 "), Some(PixelFormat::Z16));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
        assert_eq!(PixelFormat::Z16.to_string(), "Z16");
    }

    #[test]
    fn test_frame_get_bounds() {
        let frame = DepthFrame::new(2, 2, vec![1, 2, 3, 4], 0, 0);
        assert_eq!(frame.get(1, 1), Some(4));
        assert_eq!(frame.get(2, 0), None);
        assert_eq!(frame.get(0, 2), None);
    }

    #[test]
    fn test_intrinsics_scaling() {
        let intr = Intrinsics::pinhole(640, 480, 600.0, 600.0, 319.5, 239.5);
        let half = intr.scaled(320, 240);
        assert_eq!(half.fx, 300.0);
        assert!((half.ppx - 159.5).abs() < 1e-4);
        assert_eq!(intr.scaled(640, 480), intr);
    }

    #[test]
    fn test_extrinsics_baseline_transform() {
        let ext = Extrinsics::baseline(0.05);
        assert_eq!(ext.transform([1.0, 2.0, 3.0]), [1.05, 2.0, 3.0]);
    }

    #[test]
    fn test_frameset_with_depth_keeps_other_frames() {
        let color = ColorFrame::new(1, 1, vec![1, 2, 3], 10, 1);
        let set = FrameSet {
            depth: Some(DepthFrame::new(1, 1, vec![5], 12, 1)),
            color: Some(color.clone()),
            infrared: None,
        };
        let replaced = set.with_depth(DepthFrame::new(1, 1, vec![7], 12, 1));
        assert_eq!(replaced.depth.as_ref().and_then(|d| d.get(0, 0)), Some(7));
        assert_eq!(replaced.color, Some(color));
        // original untouched
        assert_eq!(set.depth.as_ref().and_then(|d| d.get(0, 0)), Some(5));
        assert_eq!(set.timestamp_us(), 12);
    }
}
