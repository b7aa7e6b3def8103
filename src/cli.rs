// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Listing depth devices and their profiles
//! - Headless streaming and recording
//! - Playback and inspection of `.dsr` recordings
//! - Snapshots

use crate::StreamArgs;
use chrono::Local;
use depthcam::backends::recording::RecordingReader;
use depthcam::constants::{self, timing::CLI_TICK_MS};
use depthcam::{Config, DepthCamera, ParameterChange, StreamKind, StreamRequest};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// List all depth devices with their profiles
pub fn list_devices(config: Config) -> CliResult<()> {
    let camera = DepthCamera::new(config);
    let devices = camera.devices();

    if devices.is_empty() {
        println!("No depth devices found.");
        println!("Use --synthetic to add the test-pattern device.");
        return Ok(());
    }

    println!("Available depth devices:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        let info = device.info();
        println!("  [{}] {} ({})", index, info.name, info.backend);
        println!("      Serial: {}", info.serial);
        println!("      Path:   {}", info.path);
        match device.depth_scale() {
            Some(scale) => println!("      Depth scale: {} m/unit", scale),
            None => println!("      No depth sensor"),
        }

        let profiles = device.profiles();
        for kind in StreamKind::ALL {
            let mut modes: Vec<String> = profiles
                .iter()
                .filter(|p| p.kind == kind)
                .map(|p| match constants::get_resolution_label(p.width) {
                    Some(label) => format!("{}x{}@{} {} ({})", p.width, p.height, p.fps, p.format, label),
                    None => format!("{}x{}@{} {}", p.width, p.height, p.fps, p.format),
                })
                .collect();
            if modes.is_empty() {
                continue;
            }
            modes.sort();
            modes.dedup();
            println!("      {}: {}", kind, modes.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Select the device and enable the requested streams
fn open_camera(config: Config, args: &StreamArgs) -> CliResult<DepthCamera> {
    let device_index = args.device.unwrap_or(config.device_index);
    let mut camera = DepthCamera::new(config);
    camera.setup_device(device_index, true)?;

    if let Some(info) = camera.device_info() {
        println!("Using device: {} ({})", info.name, info.serial);
    }

    let request = StreamRequest::new(args.width, args.height).fps(args.fps);
    camera.enable_depth(request)?;
    if args.color {
        camera.enable_color(request)?;
    }
    if args.ir {
        camera.enable_ir(request)?;
    }
    if args.align {
        camera.set_aligned(true)?;
    }
    if let Some(schema) = args.schema {
        camera.set_depth_color_schema(schema);
    }
    if args.histogram {
        let mut options = camera.colorizer_options();
        options.histogram_equalization = true;
        camera.set_colorizer_options(options);
    }
    Ok(camera)
}

fn apply_parameters(camera: &mut DepthCamera, parameters: &[String]) -> CliResult<()> {
    for raw in parameters {
        let change: ParameterChange = raw.parse()?;
        camera.apply_parameter(&change)?;
        println!("Set {} = {}", change.name, change.value);
    }
    Ok(())
}

fn stop_flag() -> CliResult<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(stop)
}

/// Drive `update()` until Ctrl+C, the frame limit or the end of the stream
fn run_loop(camera: &mut DepthCamera, frames: Option<u64>) -> CliResult<u64> {
    let stop = stop_flag()?;
    let start = Instant::now();
    let mut delivered = 0u64;

    loop {
        if stop.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }

        camera.update();
        if camera.is_frame_new() {
            delivered += 1;
            let (cx, cy) = (camera.depth_width() / 2, camera.depth_height() / 2);
            let distance = camera.get_distance_at(cx as f32, cy as f32);
            print!(
                "\rFrame {:6}  {}x{}  center {:6.3} m  {:5.1} fps",
                delivered,
                camera.depth_width(),
                camera.depth_height(),
                distance,
                delivered as f64 / start.elapsed().as_secs_f64().max(1e-3)
            );
            std::io::stdout().flush()?;

            if frames.is_some_and(|limit| delivered >= limit) {
                println!();
                break;
            }
            continue;
        }

        if !camera.is_running() {
            println!();
            let status = camera.acquisition_status();
            match status.exit_error {
                Some(e) => return Err(e.into()),
                None => {
                    println!("End of stream.");
                    break;
                }
            }
        }

        std::thread::sleep(Duration::from_millis(CLI_TICK_MS));
    }

    Ok(delivered)
}

/// Stream from a live device, optionally recording
pub fn stream(
    config: Config,
    args: &StreamArgs,
    record: Option<PathBuf>,
    frames: Option<u64>,
) -> CliResult<()> {
    let mut camera = open_camera(config, args)?;
    camera.start_stream()?;
    apply_parameters(&mut camera, &args.parameters)?;

    if let Some(path) = &record {
        camera.start_record(path)?;
        println!("Recording to: {}", path.display());
    }
    println!("Streaming... (press Ctrl+C to stop)");

    let delivered = run_loop(&mut camera, frames)?;

    if camera.is_recording() {
        camera.stop_record(false)?;
        if let Some(path) = &record {
            println!("Recording saved: {}", path.display());
        }
    }
    camera.stop();
    println!("Frames delivered: {}", delivered);
    Ok(())
}

/// Play a recording
pub fn play(mut config: Config, file: &Path, frames: Option<u64>, once: bool) -> CliResult<()> {
    if once {
        config.playback_repeat = false;
    }
    let mut camera = DepthCamera::new(config);
    camera.load(file)?;
    camera.start_stream()?;
    println!("Playing: {} (press Ctrl+C to stop)", file.display());

    let delivered = run_loop(&mut camera, frames)?;
    camera.stop();
    println!("Frames delivered: {}", delivered);
    Ok(())
}

/// Print the header and frameset count of a recording
pub fn info(file: &Path) -> CliResult<()> {
    let mut reader = RecordingReader::open(file)?;
    let header = reader.header().clone();
    let mut framesets = 0u64;
    let mut first_us = None;
    let mut last_us = 0u64;
    while let Some(set) = reader.read_frameset() {
        framesets += 1;
        let ts = set.timestamp_us();
        first_us.get_or_insert(ts);
        last_us = ts;
    }

    println!("Recording: {}", file.display());
    println!("Device:    {} ({})", header.device_name, header.device_serial);
    println!("Created:   {}", header.created);
    println!("Framesets: {}", framesets);
    if let Some(first) = first_us {
        println!(
            "Duration:  {:.2}s",
            last_us.saturating_sub(first) as f64 / 1_000_000.0
        );
    }
    for stream in header.streams.enabled() {
        println!(
            "Stream:    {} {}x{}@{} {}",
            stream.kind, stream.width, stream.height, stream.fps, stream.format
        );
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&header.calibration)?);
    Ok(())
}

/// Capture a single frame and write it to disk
pub fn snapshot(
    config: Config,
    args: &StreamArgs,
    output: Option<PathBuf>,
    point_cloud: bool,
) -> CliResult<()> {
    let dir = output.unwrap_or_else(|| config.recordings_dir.clone());
    let mut camera = open_camera(config, args)?;
    camera.start_stream()?;
    apply_parameters(&mut camera, &args.parameters)?;

    let deadline = Instant::now() + Duration::from_secs(5);
    while !camera.update() {
        if Instant::now() > deadline || !camera.is_running() {
            camera.stop();
            return Err("No frame received".into());
        }
        std::thread::sleep(Duration::from_millis(CLI_TICK_MS));
    }
    camera.stop();

    for path in camera.save_snapshot(&dir)? {
        println!("Saved: {}", path.display());
    }

    if point_cloud {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("depthcam_{}.las", timestamp));
        let points = camera.export_point_cloud(&path)?;
        println!("Point cloud saved: {} ({} points)", path.display(), points);
    }
    Ok(())
}
