// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Default stream parameters
pub mod stream {
    /// Default frame rate for enable calls
    pub const DEFAULT_FPS: u32 = 60;

    /// Default device index for `setup_device`
    pub const DEFAULT_DEVICE_ID: usize = 0;

    /// Common frame rates offered by depth sensors
    pub const COMMON_FRAMERATES: &[u32] = &[6, 15, 30, 60, 90];

    /// Resolutions offered by the synthetic device
    pub const SYNTHETIC_RESOLUTIONS: &[(u32, u32)] =
        &[(424, 240), (480, 270), (640, 360), (640, 480), (848, 480), (1280, 720)];
}

/// Fallback calibration used when the backend cannot report one
///
/// Reference resolution: 640x480. Values are rescaled to the negotiated
/// resolution with [`crate::backends::device::types::Intrinsics::scaled`].
pub mod calibration {
    /// Focal length X (pixels) at 640x480 base resolution
    pub const FX: f32 = 383.7;
    /// Focal length Y (pixels) at 640x480 base resolution
    pub const FY: f32 = 383.7;
    /// Principal point X (pixels) at 640x480 base resolution
    pub const PPX: f32 = 319.5;
    /// Principal point Y (pixels) at 640x480 base resolution
    pub const PPY: f32 = 239.5;

    /// Base width for intrinsics calculation
    pub const BASE_WIDTH: u32 = 640;
    /// Base height for intrinsics calculation
    pub const BASE_HEIGHT: u32 = 480;

    /// Stereo baseline in meters
    pub const BASELINE_M: f32 = 0.05;

    /// Meters per raw depth unit
    pub const DEPTH_SCALE: f32 = 0.001;

    /// Color sensor offset from the depth sensor along X, meters
    pub const DEPTH_TO_COLOR_X_M: f32 = 0.015;
}

/// Depth range limits
pub mod depth {
    /// Smallest accepted colorizer / threshold distance in meters
    pub const MIN_DISTANCE_M: f32 = 0.0;

    /// Largest accepted colorizer / threshold distance in meters
    pub const MAX_DISTANCE_M: f32 = 16.0;

    /// Default colorizer near plane in meters
    pub const DEFAULT_MIN_M: f32 = 0.3;

    /// Default colorizer far plane in meters
    pub const DEFAULT_MAX_M: f32 = 4.0;

    /// Number of colour bands used by the quantized schema
    pub const COLORMAP_BANDS: f32 = 32.0;

    /// Period of the pattern schema in meters
    pub const PATTERN_PERIOD_M: f32 = 0.25;
}

/// Sensor option limits
pub mod sensor {
    /// Minimum manual IR exposure in microseconds
    pub const IR_EXPOSURE_MIN_US: i64 = 1;

    /// Maximum manual IR exposure in microseconds
    pub const IR_EXPOSURE_MAX_US: i64 = 165_000;

    /// Default manual IR exposure in microseconds
    pub const IR_EXPOSURE_DEFAULT_US: i64 = 8_500;
}

/// Post-processing filter limits
pub mod filters {
    /// Decimation magnitude range
    pub const DECIMATION_MIN: u32 = 2;
    pub const DECIMATION_MAX: u32 = 8;

    /// Number of history frames tracked by the temporal persistence mask
    pub const TEMPORAL_HISTORY: u32 = 8;

    /// Spatial filter iteration range
    pub const SPATIAL_ITERATIONS_MAX: u32 = 5;
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 60;

    /// Poll interval of the CLI streaming loop
    pub const CLI_TICK_MS: u64 = 16;
}

/// Recording container constants
pub mod recording {
    /// File magic
    pub const MAGIC: &[u8; 4] = b"DSR1";

    /// Default file extension
    pub const EXTENSION: &str = "dsr";

    /// Upper bound for the JSON header length
    pub const MAX_HEADER_LEN: u32 = 1 << 20;
}

/// Resolution labels for profile listings
pub fn get_resolution_label(width: u32) -> Option<&'static str> {
    match width {
        w if w >= 1920 => Some("HD"),
        w if w >= 1280 => Some("720p"),
        w if w >= 640 => Some("SD"),
        _ => None,
    }
}
