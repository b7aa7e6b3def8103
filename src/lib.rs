// SPDX-License-Identifier: GPL-3.0-only

//! depthcam - depth camera capture and processing
//!
//! Captures synchronized depth, color and infrared streams from a depth
//! sensor (or a `.dsr` recording), post-processes depth on a background
//! thread and hands the latest frameset to a cooperative consumer that
//! renders display buffers and answers per-pixel spatial queries.
//!
//! # Architecture
//!
//! - [`camera`]: the [`DepthCamera`] facade
//! - [`backends`]: device enumeration, stream negotiation and recordings
//! - [`pipeline`]: acquisition thread, filters, mailbox and materializer
//! - [`params`]: inbound parameter-change events
//! - [`recording`]: record/playback mode state
//! - [`config`]: user configuration
//!
//! # Example
//!
//! ```no_run
//! use depthcam::{Config, DepthCamera, StreamRequest};
//!
//! let mut camera = DepthCamera::new(Config::load());
//! camera.setup_default_device()?;
//! camera.enable_depth(StreamRequest::new(640, 480).fps(30))?;
//! camera.start_stream()?;
//! loop {
//!     camera.update();
//!     if camera.is_frame_new() {
//!         println!("{:.3} m", camera.get_distance_at(320.0, 240.0));
//!     }
//! }
//! # Ok::<(), depthcam::CameraError>(())
//! ```

pub mod backends;
pub mod camera;
pub mod config;
pub mod constants;
pub mod errors;
pub mod params;
pub mod pipeline;
pub mod recording;

// Re-export commonly used types
pub use backends::device::{StreamKind, StreamRequest};
pub use camera::DepthCamera;
pub use config::Config;
pub use errors::{AppError, AppResult, CameraError, CameraResult, RecordingError};
pub use params::{ParameterChange, ParameterValue};
pub use pipeline::align::AlignTo;
pub use pipeline::colorizer::ColorSchema;
pub use recording::RecordingState;
