// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the depth camera pipeline

use std::fmt;

use crate::backends::device::types::StreamKind;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for device and pipeline operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Device, stream and pipeline errors
    Camera(CameraError),
    /// Recording and playback errors
    Recording(RecordingError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Device, session and acquisition errors
#[derive(Debug, Clone, PartialEq)]
pub enum CameraError {
    /// No device at the requested index
    DeviceNotFound(String),
    /// The device cannot negotiate the requested resolution/fps combination
    UnsupportedProfile {
        kind: StreamKind,
        width: u32,
        height: u32,
        fps: u32,
    },
    /// `start_stream` called with every stream disabled
    NoStreamEnabled,
    /// A session is already open, or the configuration is locked by a running session
    DeviceBusy,
    /// Recording file could not be opened or parsed
    FileOpenError(String),
    /// The device stopped delivering frames
    DeviceDisconnected(String),
    /// The device has no depth sensor (no depth scale available)
    NoDepthSensor,
    /// Alignment requested without both color and depth enabled
    AlignmentUnavailable,
    /// A post-processing filter failed; fatal to the acquisition loop
    FilterFailure(FilterError),
    /// Playback reached the end of a non-repeating recording
    EndOfStream,
    /// Unknown or mistyped parameter-change event
    InvalidParameter(String),
    /// Operation needs a selected device or loaded recording
    NotConfigured,
    /// Backend-specific I/O failure
    BackendError(String),
}

/// Post-processing filter errors
#[derive(Debug, Clone, PartialEq)]
pub struct FilterError {
    /// Name of the failing filter
    pub filter: &'static str,
    /// Failure description
    pub message: String,
}

impl FilterError {
    pub fn new(filter: &'static str, message: impl Into<String>) -> Self {
        Self {
            filter,
            message: message.into(),
        }
    }
}

/// Recording-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingError {
    /// Recording needs a live session
    NoLiveSession,
    /// Recording already in progress
    AlreadyRecording,
    /// `stop_record` without an active recording
    NotRecording,
    /// `playback_recorded` without a previous recording
    NoRecording,
    /// Recording file could not be created or written
    WriteFailed(String),
    /// Restarting the stream after a mode switch failed
    Camera(CameraError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            CameraError::UnsupportedProfile {
                kind,
                width,
                height,
                fps,
            } => write!(
                f,
                "Unsupported {} profile: {}x{} @ {}fps",
                kind, width, height, fps
            ),
            CameraError::NoStreamEnabled => write!(f, "No stream enabled"),
            CameraError::DeviceBusy => write!(f, "Device is busy"),
            CameraError::FileOpenError(msg) => write!(f, "Cannot open recording: {}", msg),
            CameraError::DeviceDisconnected(msg) => write!(f, "Device disconnected: {}", msg),
            CameraError::NoDepthSensor => write!(f, "Device does not have a depth sensor"),
            CameraError::AlignmentUnavailable => {
                write!(f, "Alignment needs both color and depth streams")
            }
            CameraError::FilterFailure(e) => write!(f, "Filter failure: {}", e),
            CameraError::EndOfStream => write!(f, "End of recording"),
            CameraError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            CameraError::NotConfigured => write!(f, "No device or recording selected"),
            CameraError::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.filter, self.message)
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::NoLiveSession => write!(f, "Recording needs a live session"),
            RecordingError::AlreadyRecording => write!(f, "Recording already in progress"),
            RecordingError::NotRecording => write!(f, "No recording in progress"),
            RecordingError::NoRecording => write!(f, "Nothing has been recorded yet"),
            RecordingError::WriteFailed(msg) => write!(f, "Failed to write recording: {}", msg),
            RecordingError::Camera(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}
impl std::error::Error for FilterError {}
impl std::error::Error for RecordingError {}

// Conversions from sub-errors to AppError
impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<RecordingError> for AppError {
    fn from(err: RecordingError) -> Self {
        AppError::Recording(err)
    }
}

impl From<FilterError> for CameraError {
    fn from(err: FilterError) -> Self {
        CameraError::FilterFailure(err)
    }
}

impl From<CameraError> for RecordingError {
    fn from(err: CameraError) -> Self {
        RecordingError::Camera(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

// Conversions for I/O errors
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::WriteFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_error_message() {
        let err = CameraError::UnsupportedProfile {
            kind: StreamKind::Depth,
            width: 123,
            height: 45,
            fps: 7,
        };
        assert_eq!(err.to_string(), "Unsupported depth profile: 123x45 @ 7fps");
    }

    #[test]
    fn test_filter_error_converts_to_camera_error() {
        let err: CameraError = FilterError::new("temporal", "bad history").into();
        assert!(matches!(err, CameraError::FilterFailure(ref e) if e.filter == "temporal"));
        assert_eq!(err.to_string(), "Filter failure: temporal: bad history");
    }

    #[test]
    fn test_io_error_is_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Storage(_)));
    }
}
