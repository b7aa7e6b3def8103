// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use depthcam::ColorSchema;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "depthcam")]
#[command(about = "Depth camera capture, recording and playback")]
#[command(version)]
struct Cli {
    /// Add the synthetic test-pattern device to the device list
    #[arg(long, global = true)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Stream selection shared by the live commands
#[derive(Args, Clone, Debug)]
pub struct StreamArgs {
    /// Device index to use (from 'depthcam list')
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Stream width
    #[arg(long, default_value = "640")]
    pub width: u32,

    /// Stream height
    #[arg(long, default_value = "480")]
    pub height: u32,

    /// Stream frame rate
    #[arg(long, default_value = "30")]
    pub fps: u32,

    /// Also enable the color stream
    #[arg(long)]
    pub color: bool,

    /// Also enable the infrared stream
    #[arg(long)]
    pub ir: bool,

    /// Align color and depth (requires --color)
    #[arg(long)]
    pub align: bool,

    /// Depth color schema
    #[arg(long, value_parser = parse_schema)]
    pub schema: Option<ColorSchema>,

    /// Colorize depth by histogram rank instead of distance
    #[arg(long)]
    pub histogram: bool,

    /// Parameter changes applied after start, as name=value
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub parameters: Vec<String>,
}

fn parse_schema(name: &str) -> Result<ColorSchema, String> {
    ColorSchema::from_name(name).ok_or_else(|| {
        let names: Vec<&str> = ColorSchema::ALL.iter().map(|s| s.name()).collect();
        format!("unknown schema '{}', expected one of: {}", name, names.join(", "))
    })
}

#[derive(Subcommand)]
enum Commands {
    /// List depth devices and their stream profiles
    List,

    /// Stream from a device, printing the center distance
    Stream {
        #[command(flatten)]
        streams: StreamArgs,

        /// Record the session to a .dsr file
        #[arg(short, long)]
        record: Option<PathBuf>,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        frames: Option<u64>,
    },

    /// Play a .dsr recording, printing the center distance
    Play {
        /// Recording to play
        file: PathBuf,

        /// Stop after this many frames
        #[arg(short = 'n', long)]
        frames: Option<u64>,

        /// Stop at the end of the file instead of looping
        #[arg(long)]
        once: bool,
    },

    /// Show the header of a .dsr recording
    Info {
        /// Recording to inspect
        file: PathBuf,
    },

    /// Capture one frame and save it as PNG files
    Snapshot {
        #[command(flatten)]
        streams: StreamArgs,

        /// Output directory (default: the recordings directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also export the depth frame as a LAS point cloud
        #[arg(long)]
        point_cloud: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control the log level, e.g. RUST_LOG=depthcam=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let mut config = depthcam::Config::load();
    if cli.synthetic {
        config.synthetic_device = true;
    }

    match cli.command {
        Commands::List => cli::list_devices(config),
        Commands::Stream {
            streams,
            record,
            frames,
        } => cli::stream(config, &streams, record, frames),
        Commands::Play { file, frames, once } => cli::play(config, &file, frames, once),
        Commands::Info { file } => cli::info(&file),
        Commands::Snapshot {
            streams,
            output,
            point_cloud,
        } => cli::snapshot(config, &streams, output, point_cloud),
    }
}
