// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for streaming through the camera facade

use depthcam::backends::device::synthetic::{SyntheticDevice, SyntheticPattern};
use depthcam::backends::device::{
    Calibration, DepthDevice, DepthFrame, DeviceInfo, FrameSet, FrameSource, PixelFormat,
    StreamKind, StreamProfile, StreamSet,
};
use depthcam::config::CalibrationDefaults;
use depthcam::pipeline::filters::FilterChain;
use depthcam::{
    AlignTo, CameraError, CameraResult, ColorSchema, Config, DepthCamera, ParameterChange,
    ParameterValue, StreamRequest,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `update()` until a frameset is materialized
fn wait_for_frame(camera: &mut DepthCamera) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if camera.update() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn wait_until_stopped(camera: &DepthCamera) -> bool {
    let start = Instant::now();
    while start.elapsed() < TIMEOUT {
        if !camera.is_running() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn synthetic_camera(device: SyntheticDevice) -> DepthCamera {
    let mut camera = DepthCamera::new(Config::default());
    camera.use_device(Arc::new(device), false).unwrap();
    camera
}

/// Depth-only device replaying a fixed list of uniform frames, then ending
struct ScriptedDevice {
    values: Vec<u16>,
}

const SCRIPTED_WIDTH: u32 = 64;
const SCRIPTED_HEIGHT: u32 = 48;

impl DepthDevice for ScriptedDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Scripted".to_string(),
            serial: "TEST".to_string(),
            backend: "test".to_string(),
            path: "scripted".to_string(),
        }
    }

    fn profiles(&self) -> Vec<StreamProfile> {
        vec![StreamProfile {
            kind: StreamKind::Depth,
            width: SCRIPTED_WIDTH,
            height: SCRIPTED_HEIGHT,
            fps: 30,
            format: PixelFormat::Z16,
        }]
    }

    fn depth_scale(&self) -> Option<f32> {
        Some(0.001)
    }

    fn calibration(&self, _streams: &StreamSet) -> Calibration {
        CalibrationDefaults::default().to_calibration(
            Some((SCRIPTED_WIDTH, SCRIPTED_HEIGHT)),
            None,
            None,
        )
    }

    fn open(&self, _streams: &StreamSet) -> CameraResult<Box<dyn FrameSource>> {
        Ok(Box::new(ScriptedSource {
            values: self.values.clone(),
            next: 0,
        }))
    }
}

struct ScriptedSource {
    values: Vec<u16>,
    next: usize,
}

impl FrameSource for ScriptedSource {
    fn wait_for_frames(&mut self) -> CameraResult<FrameSet> {
        let value = *self.values.get(self.next).ok_or(CameraError::EndOfStream)?;
        let n = self.next as u64;
        self.next += 1;
        let pixels = (SCRIPTED_WIDTH * SCRIPTED_HEIGHT) as usize;
        Ok(FrameSet::default().with_depth(DepthFrame::new(
            SCRIPTED_WIDTH,
            SCRIPTED_HEIGHT,
            vec![value; pixels],
            n * 33_333,
            n,
        )))
    }
}

#[test]
fn test_constant_depth_end_to_end() {
    let mut camera =
        synthetic_camera(SyntheticDevice::new(SyntheticPattern::Constant(255)).with_depth_scale(0.001));
    camera.set_filter_chain(FilterChain::empty()).unwrap();
    camera
        .enable_depth(StreamRequest::new(640, 480).fps(30))
        .unwrap();
    camera.start_stream().unwrap();

    assert!(wait_for_frame(&mut camera), "no frame delivered");
    assert!((camera.get_distance_at(10.0, 10.0) - 0.255).abs() < 1e-6);
    assert!(camera.is_frame_new());
    assert!(!camera.is_frame_new());

    camera.stop();
    assert!(!camera.is_running());
}

#[test]
fn test_buffer_dimensions_match_negotiated_stream() {
    for (width, height) in [(424, 240), (848, 480)] {
        let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
        camera
            .enable_depth(StreamRequest::new(width, height).fps(90))
            .unwrap();
        assert_eq!((camera.depth_width(), camera.depth_height()), (width, height));

        camera.start_stream().unwrap();
        assert!(wait_for_frame(&mut camera));
        let raw = camera.depth_raw_buffer();
        assert_eq!((raw.width(), raw.height()), (width, height));
        let colorized = camera.depth_buffer();
        assert_eq!(colorized.data().len(), (width * height * 3) as usize);
        assert_eq!(camera.depth_width(), width);
        camera.stop();
    }
}

#[test]
fn test_latest_frameset_wins() {
    let values: Vec<u16> = (1..=20).map(|i| i * 100).collect();
    let mut camera = DepthCamera::new(Config::default());
    camera
        .use_device(Arc::new(ScriptedDevice { values }), false)
        .unwrap();
    camera.set_filter_chain(FilterChain::empty()).unwrap();
    camera
        .enable_depth(StreamRequest::new(SCRIPTED_WIDTH, SCRIPTED_HEIGHT).fps(30))
        .unwrap();
    camera.start_stream().unwrap();

    assert!(wait_until_stopped(&camera));
    assert_eq!(camera.frames_published(), 20);
    assert_eq!(camera.acquisition_status().exit_error, None);

    assert!(camera.update());
    assert!((camera.get_distance_at(0.0, 0.0) - 2.0).abs() < 1e-6);
    assert!(!camera.update());
}

#[test]
fn test_distance_outside_frame_is_zero() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Constant(1000)));
    assert_eq!(camera.get_distance_at(1.0, 1.0), 0.0);
    assert_eq!(camera.get_world_coordinate_at(1.0, 1.0), None);

    camera
        .enable_depth(StreamRequest::new(424, 240).fps(90))
        .unwrap();
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));

    assert_eq!(camera.get_distance_at(424.0, 0.0), 0.0);
    assert_eq!(camera.get_distance_at(0.0, 240.0), 0.0);
    assert_eq!(camera.get_distance_at(-1.0, 5.0), 0.0);
    assert_eq!(camera.get_world_coordinate_at(10_000.0, 5.0), None);
    assert!(camera.get_distance_at(212.0, 120.0) > 0.0);
}

#[test]
fn test_world_coordinate_at_principal_point() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Constant(2000)));
    camera.set_filter_chain(FilterChain::empty()).unwrap();
    camera
        .enable_depth(StreamRequest::new(640, 480).fps(90))
        .unwrap();
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));

    let intrinsics = camera.camera_intrinsics().unwrap();
    assert_eq!((intrinsics.width, intrinsics.height), (640, 480));
    let point = camera
        .get_world_coordinate_at(intrinsics.ppx, intrinsics.ppy)
        .unwrap();
    assert!(point[0].abs() < 1e-4);
    assert!(point[1].abs() < 1e-4);
    assert!((point[2] - 2.0).abs() < 1e-4);
}

#[test]
fn test_decimation_reports_decimated_dimensions() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Constant(1500)));
    camera.set_filter_enabled("decimation", true).unwrap();
    camera
        .enable_depth(StreamRequest::new(640, 480).fps(90))
        .unwrap();
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));

    assert_eq!((camera.depth_width(), camera.depth_height()), (320, 240));
    let intrinsics = camera.camera_intrinsics().unwrap();
    assert_eq!((intrinsics.width, intrinsics.height), (320, 240));
}

#[test]
fn test_start_requires_a_stream() {
    let mut camera = DepthCamera::new(Config::default());
    assert_eq!(
        camera.enable_depth(StreamRequest::new(640, 480)),
        Err(CameraError::NotConfigured)
    );

    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    assert_eq!(camera.start_stream(), Err(CameraError::NoStreamEnabled));
}

#[test]
fn test_unsupported_profile() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    let err = camera
        .enable_depth(StreamRequest::new(123, 45).fps(30))
        .unwrap_err();
    assert!(matches!(err, CameraError::UnsupportedProfile { width: 123, .. }));
    assert!(!camera.streams().depth.enabled);
}

#[test]
fn test_configuration_locked_while_running() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera.start_stream().unwrap();

    assert_eq!(camera.start_stream(), Err(CameraError::DeviceBusy));
    assert_eq!(
        camera.enable_color(StreamRequest::new(424, 240).fps(30)),
        Err(CameraError::DeviceBusy)
    );
    assert_eq!(camera.disable_depth(), Err(CameraError::DeviceBusy));

    camera.stop();
    camera
        .enable_color(StreamRequest::new(424, 240).fps(30))
        .unwrap();
}

#[test]
fn test_device_without_depth_sensor() {
    let mut camera = DepthCamera::new(Config::default());
    let device = SyntheticDevice::new(SyntheticPattern::Ramp).without_depth_sensor();
    assert_eq!(
        camera.use_device(Arc::new(device), true),
        Err(CameraError::NoDepthSensor)
    );
}

#[test]
fn test_missing_device_index() {
    let mut camera = DepthCamera::new(Config::default());
    assert!(matches!(
        camera.setup_device(10_000, false),
        Err(CameraError::DeviceNotFound(_))
    ));
}

#[test]
fn test_alignment_requires_color_and_depth() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();

    assert_eq!(camera.set_aligned(true), Err(CameraError::AlignmentUnavailable));
    assert!(!camera.is_aligned());

    camera
        .enable_color(StreamRequest::new(640, 480).fps(30))
        .unwrap();
    camera.set_aligned(true).unwrap();
    assert!(camera.is_aligned());

    camera.disable_color().unwrap();
    assert!(!camera.is_aligned());
}

#[test]
fn test_aligned_color_uses_depth_grid() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Constant(1200)));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera
        .enable_color(StreamRequest::new(640, 480).fps(30))
        .unwrap();
    camera.set_align_to(AlignTo::Depth);
    camera.set_aligned(true).unwrap();
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));

    assert_eq!((camera.color_width(), camera.color_height()), (424, 240));
    assert_eq!((camera.depth_width(), camera.depth_height()), (424, 240));
}

#[test]
fn test_unaligned_streams_keep_their_resolution() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera
        .enable_color(StreamRequest::new(640, 480).fps(30))
        .unwrap();
    camera
        .enable_ir(StreamRequest::new(848, 480).fps(30))
        .unwrap();
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));

    assert_eq!((camera.color_width(), camera.color_height()), (640, 480));
    assert_eq!((camera.ir_width(), camera.ir_height()), (848, 480));
    assert_eq!(camera.color_buffer().data().len(), 640 * 480 * 3);
    assert_eq!(camera.infrared_buffer().data().len(), 848 * 480);
}

#[test]
fn test_switching_device_turns_alignment_off() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera
        .enable_color(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera.set_aligned(true).unwrap();
    assert!(camera.is_aligned());

    camera
        .use_device(Arc::new(SyntheticDevice::new(SyntheticPattern::Wave)), false)
        .unwrap();
    assert!(!camera.streams().color.enabled);
    assert!(!camera.streams().depth.enabled);
    assert!(!camera.is_aligned());
}

#[test]
fn test_disabled_stream_reports_zero_after_restart() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera
        .enable_color(StreamRequest::new(640, 480).fps(30))
        .unwrap();
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));
    assert_eq!((camera.color_width(), camera.color_height()), (640, 480));
    camera.stop();

    camera.disable_color().unwrap();
    assert_eq!((camera.color_width(), camera.color_height()), (0, 0));
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));

    assert_eq!((camera.color_width(), camera.color_height()), (0, 0));
    assert!(camera.color_buffer().is_empty());
    assert_eq!((camera.depth_width(), camera.depth_height()), (424, 240));
}

#[test]
fn test_disconnect_keeps_last_frame() {
    let device = SyntheticDevice::new(SyntheticPattern::Constant(800))
        .realtime(false)
        .disconnect_after(5);
    let mut camera = synthetic_camera(device);
    camera.set_filter_chain(FilterChain::empty()).unwrap();
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    camera.start_stream().unwrap();

    assert!(wait_until_stopped(&camera));
    assert!(matches!(
        camera.acquisition_status().exit_error,
        Some(CameraError::DeviceDisconnected(_))
    ));

    assert!(camera.update());
    assert!(camera.is_frame_new());
    assert!(!camera.update());
    assert!(!camera.is_frame_new());
    assert!((camera.get_distance_at(5.0, 5.0) - 0.8).abs() < 1e-6);

    // The caller may restart after a failure
    camera.start_stream().unwrap();
    assert!(wait_until_stopped(&camera));
}

#[test]
fn test_filter_edits_while_idle_are_validated() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    assert!(matches!(
        camera.set_filter_enabled("bilateral", true),
        Err(CameraError::InvalidParameter(_))
    ));
    camera.set_filter_option("spatial", "alpha", 0.8).unwrap();
    camera.set_filter_enabled("temporal", false).unwrap();

    let filters = camera.filters().unwrap();
    assert!(filters.contains(&("temporal", false)));
    assert!(filters.contains(&("spatial", true)));
}

#[test]
fn test_setup_filter_restores_settings() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera.set_filter_enabled("spatial", false).unwrap();
    camera.setup_filter().unwrap();
    assert!(camera.filters().unwrap().contains(&("spatial", true)));

    camera
        .enable_ir(StreamRequest::new(424, 240).fps(30))
        .unwrap();
    assert_eq!((camera.ir_width(), camera.ir_height()), (424, 240));
    camera.disable_ir().unwrap();
    assert_eq!(camera.ir_width(), 0);
}

#[test]
fn test_filter_edits_while_running_are_queued() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(90))
        .unwrap();
    camera.start_stream().unwrap();
    assert!(camera.filters().is_none());

    camera.set_filter_enabled("spatial", false).unwrap();
    assert!(wait_for_frame(&mut camera));
    camera.stop();

    let filters = camera.filters().unwrap();
    assert!(filters.contains(&("spatial", false)));
}

#[test]
fn test_color_schema_changes_depth_texture() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Constant(2000)));
    camera.set_filter_chain(FilterChain::empty()).unwrap();
    camera
        .enable_depth(StreamRequest::new(424, 240).fps(90))
        .unwrap();

    camera.set_depth_color_schema(ColorSchema::WhiteToBlack);
    camera.start_stream().unwrap();
    assert!(wait_for_frame(&mut camera));
    let first = camera.depth_buffer().data()[..3].to_vec();
    assert_eq!(first[0], first[1]);
    assert_eq!(first[1], first[2]);

    camera.set_depth_color_schema(ColorSchema::Jet);
    assert_eq!(camera.colorizer_options().schema, ColorSchema::Jet);
}

#[test]
fn test_device_parameters_reach_controls() {
    let device = SyntheticDevice::new(SyntheticPattern::Ramp);
    let controls = device.synthetic_controls();
    let mut camera = synthetic_camera(device);

    camera
        .apply_parameter(&ParameterChange::new("auto_exposure", ParameterValue::Bool(false)))
        .unwrap();
    camera
        .apply_parameter(&"ir_exposure=500000".parse().unwrap())
        .unwrap();
    camera
        .apply_parameter(&"enable_emitter=false".parse().unwrap())
        .unwrap();

    assert!(!controls.auto_exposure());
    assert!(!controls.emitter_enabled());
    assert_eq!(controls.ir_exposure_us(), 165_000);
}

#[test]
fn test_depth_range_parameters_update_colorizer() {
    let mut camera = synthetic_camera(SyntheticDevice::new(SyntheticPattern::Ramp));
    camera
        .apply_parameter(&ParameterChange::new("depth_max", ParameterValue::Float(2.5)))
        .unwrap();
    camera
        .apply_parameter(&ParameterChange::new("depth_min", ParameterValue::Float(0.5)))
        .unwrap();

    let options = camera.colorizer_options();
    assert_eq!(options.max_distance, 2.5);
    assert_eq!(options.min_distance, 0.5);
    assert_eq!(camera.filter_settings().threshold.max_distance, 2.5);

    assert!(matches!(
        camera.apply_parameter(&ParameterChange::new("depth_max", ParameterValue::Bool(true))),
        Err(CameraError::InvalidParameter(_))
    ));
}
