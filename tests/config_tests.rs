// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use depthcam::pipeline::filters::HoleFillMode;
use depthcam::{AlignTo, ColorSchema, Config};
use tempfile::TempDir;

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.device_index, 0);
    assert!(!config.synthetic_device);
    assert!(config.playback_repeat, "Playback should loop by default");
    assert!(config.playback_realtime);
    assert_eq!(config.colorizer.schema, ColorSchema::Jet);
    assert_eq!(config.align_to, AlignTo::Depth);
    assert!(config.colorizer.min_distance < config.colorizer.max_distance);
}

#[test]
fn test_config_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("depthcam").join("config.json");

    let mut config = Config::default();
    config.synthetic_device = true;
    config.colorizer.schema = ColorSchema::Quantized;
    config.filters.decimation.enabled = true;
    config.filters.decimation.magnitude = 4;
    config.filters.hole_filling.mode = HoleFillMode::NearestFromAround;
    config.align_to = AlignTo::Color;
    config.save_to(&path).unwrap();

    assert_eq!(Config::load_from(&path), config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{ "device_index": 2, "colorizer": { "schema": "white_to_black" } }"#,
    )
    .unwrap();

    let config = Config::load_from(&path);
    assert_eq!(config.device_index, 2);
    assert_eq!(config.colorizer.schema, ColorSchema::WhiteToBlack);
    assert_eq!(config.colorizer.max_distance, Config::default().colorizer.max_distance);
    assert_eq!(config.filters, Config::default().filters);
}

#[test]
fn test_malformed_config_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert_eq!(Config::load_from(&path), Config::default());
    assert_eq!(
        Config::load_from(&dir.path().join("absent.json")),
        Config::default()
    );
}
