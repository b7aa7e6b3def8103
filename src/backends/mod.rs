// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 DepthCamera                  │
//! └──────────────────────┬───────────────────────┘
//!                        │ DepthDevice / FrameSource
//! ┌──────────────────────┴───────────────────────┐
//! │  ┌────────────┐  ┌────────────┐  ┌─────────┐ │
//! │  │    V4L2    │  │ Synthetic  │  │Playback │ │
//! │  │  (device)  │  │  (device)  │  │ (.dsr)  │ │
//! │  └────────────┘  └────────────┘  └─────────┘ │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! - [`device`]: device traits, stream negotiation and the live backends
//! - [`recording`]: `.dsr` writer, reader and playback device

pub mod device;
pub mod recording;
