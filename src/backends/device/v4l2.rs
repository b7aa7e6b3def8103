// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture for UVC depth cameras
//!
//! Depth cameras exposed through uvcvideo show up as several video nodes on
//! the same USB bus: one delivering `Z16 ` depth, one `YUYV` color and one
//! `GREY` infrared. Nodes are grouped by `bus_info` into a single device, and
//! each node is streamed from its own capture thread with memory-mapped buffers.

use super::format_converters::{gray_frame, rgb_frame, yuyv_to_rgb, z16_to_depth};
use super::types::*;
use super::v4l2_controls::{self, V4l2DepthControls};
use super::{DepthDevice, DeviceControls, FrameSource};
use crate::config::CalibrationDefaults;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{CameraError, CameraResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Consecutive dequeue failures after which a node is considered gone
const MAX_CONSECUTIVE_ERRORS: u32 = 50;

/// One video node of a depth camera
#[derive(Debug, Clone)]
struct V4l2Node {
    path: String,
    kind: StreamKind,
    profiles: Vec<StreamProfile>,
}

/// A UVC depth camera made of grouped video nodes
pub struct V4l2DepthDevice {
    card: String,
    bus_info: String,
    nodes: Vec<V4l2Node>,
    calibration: CalibrationDefaults,
}

fn classify(formats: &[PixelFormat]) -> Option<StreamKind> {
    if formats.contains(&PixelFormat::Z16) {
        Some(StreamKind::Depth)
    } else if formats.contains(&PixelFormat::Gray8) {
        Some(StreamKind::Infrared)
    } else if formats.contains(&PixelFormat::Yuyv) || formats.contains(&PixelFormat::Rgb8) {
        Some(StreamKind::Color)
    } else {
        None
    }
}

/// Enumerate width × height × fps modes of one node for the formats we decode
fn node_profiles(dev: &Device, kind: StreamKind) -> Vec<StreamProfile> {
    let mut profiles = Vec::new();

    let Ok(format_iter) = dev.enum_formats() else {
        return profiles;
    };

    for fmt_desc in format_iter {
        let Some(format) = PixelFormat::from_fourcc(&fmt_desc.fourcc.repr) else {
            continue;
        };
        if classify(&[format]) != Some(kind) {
            continue;
        }
        let Ok(frame_sizes) = dev.enum_framesizes(fmt_desc.fourcc) else {
            continue;
        };
        for size in frame_sizes {
            let v4l::framesize::FrameSizeEnum::Discrete(discrete) = size.size else {
                continue;
            };
            let Ok(intervals) =
                dev.enum_frameintervals(fmt_desc.fourcc, discrete.width, discrete.height)
            else {
                continue;
            };
            for interval in intervals {
                if let v4l::frameinterval::FrameIntervalEnum::Discrete(frac) = interval.interval
                    && frac.numerator > 0
                {
                    profiles.push(StreamProfile {
                        kind,
                        width: discrete.width,
                        height: discrete.height,
                        fps: frac.denominator / frac.numerator,
                        format,
                    });
                }
            }
        }
    }

    profiles
}

/// Scan /dev/video* for depth cameras
///
/// Nodes sharing a `bus_info` are grouped into one device; only groups with a
/// `Z16 ` node are reported. Devices are sorted by their first node path.
pub fn find_depth_devices(calibration: CalibrationDefaults) -> Vec<V4l2DepthDevice> {
    let mut paths: Vec<String> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("video")
                .then(|| e.path().to_string_lossy().to_string())
        })
        .collect();
    paths.sort();

    let mut by_bus: HashMap<String, (String, Vec<V4l2Node>)> = HashMap::new();

    for path in paths {
        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        let formats: Vec<PixelFormat> = dev
            .enum_formats()
            .into_iter()
            .flatten()
            .filter_map(|f| PixelFormat::from_fourcc(&f.fourcc.repr))
            .collect();
        let Some(kind) = classify(&formats) else {
            debug!(path = %path, "Skipping node without depth camera formats");
            continue;
        };

        let profiles = node_profiles(&dev, kind);
        debug!(
            path = %path,
            kind = %kind,
            bus_info = %caps.bus,
            card = %caps.card,
            profiles = profiles.len(),
            "Found depth camera node"
        );

        by_bus
            .entry(caps.bus.clone())
            .or_insert_with(|| (caps.card.clone(), Vec::new()))
            .1
            .push(V4l2Node {
                path,
                kind,
                profiles,
            });
    }

    let mut devices: Vec<V4l2DepthDevice> = by_bus
        .into_iter()
        .filter(|(_, (_, nodes))| nodes.iter().any(|n| n.kind == StreamKind::Depth))
        .map(|(bus_info, (card, nodes))| {
            info!(card = %card, bus_info = %bus_info, nodes = nodes.len(), "Found depth camera");
            V4l2DepthDevice {
                card,
                bus_info,
                nodes,
                calibration,
            }
        })
        .collect();
    devices.sort_by(|a, b| a.first_path().cmp(b.first_path()));
    devices
}

impl V4l2DepthDevice {
    fn first_path(&self) -> &str {
        self.nodes.first().map(|n| n.path.as_str()).unwrap_or("")
    }

    fn node(&self, kind: StreamKind) -> Option<&V4l2Node> {
        self.nodes.iter().find(|n| n.kind == kind)
    }
}

impl DepthDevice for V4l2DepthDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.card.clone(),
            serial: self.bus_info.clone(),
            backend: "v4l2".to_string(),
            path: self
                .nodes
                .iter()
                .map(|n| n.path.as_str())
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    fn profiles(&self) -> Vec<StreamProfile> {
        self.nodes
            .iter()
            .flat_map(|n| n.profiles.iter().copied())
            .collect()
    }

    fn depth_scale(&self) -> Option<f32> {
        self.node(StreamKind::Depth)
            .map(|_| self.calibration.depth_scale)
    }

    fn calibration(&self, streams: &StreamSet) -> Calibration {
        let res = |c: &StreamConfig| c.enabled.then_some((c.width, c.height));
        self.calibration
            .to_calibration(res(&streams.depth), res(&streams.color), res(&streams.infrared))
    }

    fn open(&self, streams: &StreamSet) -> CameraResult<Box<dyn FrameSource>> {
        let enabled = streams.enabled();
        if enabled.is_empty() {
            return Err(CameraError::NoStreamEnabled);
        }

        // Depth paces the session when enabled, else color, else infrared
        let primary = [StreamKind::Depth, StreamKind::Color, StreamKind::Infrared]
            .into_iter()
            .find(|k| streams.get(*k).enabled)
            .ok_or(CameraError::NoStreamEnabled)?;

        // Every node is opened and configured before any capture thread runs
        let nodes = prepare_nodes(&enabled, |config| {
            let node = self.node(config.kind).ok_or(CameraError::UnsupportedProfile {
                kind: config.kind,
                width: config.width,
                height: config.height,
                fps: config.fps,
            })?;
            let mut dev = Device::with_path(&node.path).map_err(|e| {
                CameraError::DeviceNotFound(format!("Failed to open {}: {}", node.path, e))
            })?;
            configure_node(&mut dev, config)?;
            Ok((node.path.clone(), dev))
        })?;

        let (primary_tx, primary_rx) = mpsc::sync_channel(2);
        let latest = Arc::new(Mutex::new(FrameSet::default()));
        let running = Arc::new(AtomicBool::new(true));
        let started = Instant::now();

        let threads = nodes
            .into_iter()
            .map(|((path, dev), config)| {
                let link = NodeLink {
                    kind: config.kind,
                    tx: (config.kind == primary).then(|| primary_tx.clone()),
                    running: Arc::clone(&running),
                };
                let ctx = NodeContext {
                    path,
                    config,
                    latest: Arc::clone(&latest),
                    started,
                };
                std::thread::spawn(move || {
                    let result = capture_loop(dev, &ctx, &link);
                    link.finish(result);
                })
            })
            .collect();
        drop(primary_tx);

        if let Some(node) = self.node(StreamKind::Depth)
            && let Some(exposure) =
                v4l2_controls::get_control(&node.path, v4l2_controls::V4L2_CID_EXPOSURE_ABSOLUTE)
        {
            debug!(exposure_100us = exposure, "Current depth sensor exposure");
        }

        info!(card = %self.card, primary = %primary, "V4L2 capture session opened");

        Ok(Box::new(V4l2Source {
            primary,
            primary_rx,
            latest,
            running,
            threads,
        }))
    }

    fn controls(&self) -> Option<Arc<dyn DeviceControls>> {
        let node = self
            .node(StreamKind::Depth)
            .or_else(|| self.node(StreamKind::Infrared))?;
        Some(Arc::new(V4l2DepthControls::new(node.path.clone())))
    }
}

fn configure_node(dev: &mut Device, config: &StreamConfig) -> CameraResult<()> {
    let fourcc = v4l::FourCC::new(&config.format.fourcc());
    let mut format = dev
        .format()
        .map_err(|e| CameraError::BackendError(format!("Failed to query format: {}", e)))?;
    format.width = config.width;
    format.height = config.height;
    format.fourcc = fourcc;

    let applied = dev
        .set_format(&format)
        .map_err(|e| CameraError::BackendError(format!("Failed to set format: {}", e)))?;
    if applied.fourcc != fourcc || applied.width != config.width || applied.height != config.height
    {
        warn!(
            expected = ?fourcc,
            got = ?applied.fourcc,
            width = applied.width,
            height = applied.height,
            "Device did not accept the requested format"
        );
        return Err(CameraError::UnsupportedProfile {
            kind: config.kind,
            width: config.width,
            height: config.height,
            fps: config.fps,
        });
    }

    if let Err(e) = dev.set_params(&v4l::video::capture::Parameters::with_fps(config.fps)) {
        warn!(error = %e, fps = config.fps, "Could not set frame rate");
    }

    info!(
        width = applied.width,
        height = applied.height,
        fourcc = ?applied.fourcc,
        fps = config.fps,
        "Set V4L2 format"
    );
    Ok(())
}

/// Open every enabled node, or none of them
fn prepare_nodes<D>(
    configs: &[StreamConfig],
    mut open: impl FnMut(&StreamConfig) -> CameraResult<D>,
) -> CameraResult<Vec<(D, StreamConfig)>> {
    configs
        .iter()
        .map(|config| Ok((open(config)?, *config)))
        .collect()
}

struct NodeContext {
    path: String,
    config: StreamConfig,
    latest: Arc<Mutex<FrameSet>>,
    started: Instant,
}

/// Session plumbing of one capture thread
///
/// Only the primary node holds a sender, so the consumer sees a disconnect
/// as soon as the primary thread ends.
struct NodeLink {
    kind: StreamKind,
    tx: Option<SyncSender<FrameSet>>,
    running: Arc<AtomicBool>,
}

impl NodeLink {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Hand a frameset to the consumer; false when it was dropped
    fn publish(&self, set: FrameSet) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.try_send(set).is_ok())
    }

    /// A failed node ends the whole session
    fn finish(self, result: Result<(), String>) {
        if let Err(e) = result {
            error!(kind = %self.kind, error = %e, "V4L2 capture loop failed");
            self.running.store(false, Ordering::SeqCst);
        }
    }
}

/// Capture loop of one node, running in its own thread
fn capture_loop(mut dev: Device, ctx: &NodeContext, link: &NodeLink) -> Result<(), String> {
    let config = ctx.config;
    let mut stream = MmapStream::with_buffers(&mut dev, Type::VideoCapture, 4)
        .map_err(|e| format!("Failed to create buffer stream: {}", e))?;

    info!(path = %ctx.path, kind = %config.kind, "V4L2 capture stream started");

    let mut frame_num: u64 = 0;
    let mut consecutive_errors = 0u32;

    while link.is_running() {
        let (buf, meta) = match stream.next() {
            Ok(frame) => frame,
            Err(e) => {
                consecutive_errors += 1;
                warn!(path = %ctx.path, error = %e, "Failed to capture frame");
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(format!("{} stopped delivering frames: {}", ctx.path, e));
                }
                std::thread::sleep(Duration::from_millis(10));
                continue;
            }
        };
        consecutive_errors = 0;

        let timestamp_us = ctx.started.elapsed().as_micros() as u64;
        let (w, h) = (config.width, config.height);
        let mut latest = ctx.latest.lock().unwrap_or_else(|e| e.into_inner());
        match config.kind {
            StreamKind::Depth => {
                latest.depth = Some(DepthFrame::new(
                    w,
                    h,
                    z16_to_depth(buf, w, h),
                    timestamp_us,
                    frame_num,
                ))
            }
            StreamKind::Color => {
                let rgb = match config.format {
                    PixelFormat::Yuyv => yuyv_to_rgb(buf, w, h),
                    _ => rgb_frame(buf, w, h),
                };
                latest.color = Some(ColorFrame::new(w, h, rgb, timestamp_us, frame_num))
            }
            StreamKind::Infrared => {
                latest.infrared = Some(InfraredFrame::new(
                    w,
                    h,
                    gray_frame(buf, w, h),
                    timestamp_us,
                    frame_num,
                ))
            }
        }

        if link.tx.is_some() {
            let set = latest.clone();
            drop(latest);
            // Full channel means the consumer is behind; the newest set wins next round
            if !link.publish(set) && frame_num % FRAME_LOG_INTERVAL == 0 {
                debug!(frame = frame_num, "Frameset dropped (channel full)");
            }
        }

        if frame_num % FRAME_LOG_INTERVAL == 0 {
            debug!(
                path = %ctx.path,
                frame = frame_num,
                sequence = meta.sequence,
                size = buf.len(),
                "Frame captured"
            );
        }
        frame_num += 1;
    }

    info!(path = %ctx.path, "V4L2 capture loop ended");
    Ok(())
}

/// Frameset source assembled from the per-node capture threads
struct V4l2Source {
    primary: StreamKind,
    primary_rx: Receiver<FrameSet>,
    latest: Arc<Mutex<FrameSet>>,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl FrameSource for V4l2Source {
    fn wait_for_frames(&mut self) -> CameraResult<FrameSet> {
        let mut set = self.primary_rx.recv().map_err(|_| {
            CameraError::DeviceDisconnected(format!("{} node stopped", self.primary))
        })?;

        // Attach the newest frames of the secondary streams
        let latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        if self.primary != StreamKind::Color {
            set.color = latest.color.clone();
        }
        if self.primary != StreamKind::Infrared {
            set.infrared = latest.infrared.clone();
        }
        Ok(set)
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("V4L2 capture thread panicked");
            }
        }
        info!("V4L2 capture session closed");
    }
}
