// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing pipeline
//!
//! ```text
//! FrameSource ─▶ acquisition thread ─▶ Mailbox ─▶ FrameMaterializer ─▶ DisplayBuffers
//!                 (record, filter)     (latest)    (align, colorize)
//! ```
//!
//! - [`acquisition`]: background loop owning the source and filter chain
//! - [`filters`]: depth post-processing chain
//! - [`mailbox`]: latest-wins handoff
//! - [`materializer`]: consumer-side display buffers and pixel queries
//! - [`colorizer`], [`align`], [`spatial`]: per-frame transforms
//! - [`export`]: LAS and PNG output

pub mod acquisition;
pub mod align;
pub mod colorizer;
pub mod export;
pub mod filters;
pub mod frame_loop;
pub mod mailbox;
pub mod materializer;
pub mod spatial;
