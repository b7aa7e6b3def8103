// SPDX-License-Identifier: GPL-3.0-only

//! Depth camera facade
//!
//! [`DepthCamera`] is the surface a renderer or the CLI drives: configure
//! streams, start the acquisition thread, call [`DepthCamera::update`] once
//! per tick and read the display buffers. All methods run on the consumer
//! thread; the only state shared with the acquisition thread is the mailbox,
//! the recorder slot and the status snapshot.

use crate::backends::device::{
    Calibration, DepthDevice, DeviceInfo, FrameSet, Intrinsics, StreamConfig, StreamKind, StreamRequest,
    StreamSet, enumerate_devices, log_profiles, negotiate,
};
use crate::backends::recording::{PlaybackDevice, RecordingHeader, RecordingWriter};
use crate::config::Config;
use crate::errors::{AppError, AppResult, CameraError, CameraResult, RecordingError};
use crate::params::{ParameterChange, SensorParameter};
use crate::pipeline::acquisition::{
    Acquisition, AcquisitionStatus, ChainCommand, RecorderSlot, StatusHandle,
};
use crate::pipeline::align::AlignTo;
use crate::pipeline::colorizer::{ColorSchema, ColorizerOptions};
use crate::pipeline::export;
use crate::pipeline::filters::{FilterChain, FilterContext, FilterSettings};
use crate::pipeline::mailbox::Mailbox;
use crate::pipeline::materializer::{DisplayBuffer, FrameMaterializer};
use crate::recording::{RecordingController, RecordingState};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Buffer dimensions once a frame arrived, negotiated dimensions before,
/// zero for a disabled stream
fn reported_size<T: Copy + Default>(buffer: &DisplayBuffer<T>, stream: &StreamConfig) -> (u32, u32) {
    if !stream.enabled {
        (0, 0)
    } else if !buffer.is_empty() {
        (buffer.width(), buffer.height())
    } else {
        (stream.width, stream.height)
    }
}

pub struct DepthCamera {
    config: Config,
    /// Device of the current session (live or playback)
    device: Option<Arc<dyn DepthDevice>>,
    /// Last live device, kept across playback
    live_device: Option<Arc<dyn DepthDevice>>,
    streams: StreamSet,
    filter_settings: FilterSettings,
    /// Home of the chain while no acquisition thread owns it
    chain: Option<FilterChain>,
    acquisition: Option<Acquisition>,
    calibration: Option<Calibration>,
    mailbox: Mailbox<FrameSet>,
    recorder: RecorderSlot,
    status: StatusHandle,
    recording: RecordingController,
    frames: FrameMaterializer,
}

impl Default for DepthCamera {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl DepthCamera {
    pub fn new(config: Config) -> Self {
        let mut frames = FrameMaterializer::new(config.colorizer);
        frames.set_alignment(false, config.align_to);
        Self {
            filter_settings: config.filters,
            chain: Some(FilterChain::new(&config.filters)),
            config,
            device: None,
            live_device: None,
            streams: StreamSet::default(),
            acquisition: None,
            calibration: None,
            mailbox: Mailbox::new(),
            recorder: Arc::new(Mutex::new(None)),
            status: StatusHandle::default(),
            recording: RecordingController::default(),
            frames,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Devices available under the current configuration
    pub fn devices(&self) -> Vec<Arc<dyn DepthDevice>> {
        enumerate_devices(&self.config)
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        self.device.as_ref().map(|d| d.info())
    }

    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    // ===== Device setup =====

    /// Select a device by enumeration index
    pub fn setup_device(&mut self, device_id: usize, list_available: bool) -> CameraResult<()> {
        self.ensure_idle()?;
        let devices = self.devices();
        let count = devices.len();
        let device = devices.into_iter().nth(device_id).ok_or_else(|| {
            CameraError::DeviceNotFound(format!(
                "no device at index {} ({} available)",
                device_id, count
            ))
        })?;
        self.use_device(device, list_available)
    }

    /// Select the configured default device and log its profiles
    pub fn setup_default_device(&mut self) -> CameraResult<()> {
        self.setup_device(self.config.device_index, true)
    }

    /// Select an already constructed device
    pub fn use_device(
        &mut self,
        device: Arc<dyn DepthDevice>,
        list_available: bool,
    ) -> CameraResult<()> {
        self.ensure_idle()?;
        let info = device.info();
        let depth_scale = device.depth_scale().ok_or(CameraError::NoDepthSensor)?;
        info!(
            name = %info.name,
            serial = %info.serial,
            backend = %info.backend,
            path = %info.path,
            depth_scale,
            "Depth device selected"
        );
        if list_available {
            log_profiles(device.as_ref());
        }

        if !device.is_playback() {
            self.live_device = Some(Arc::clone(&device));
        }
        self.device = Some(device);
        self.streams = StreamSet::default();
        self.calibration = None;
        self.recording.enter_idle();
        self.frames.reset();
        self.check_alignment();
        Ok(())
    }

    /// Open a `.dsr` recording as the session device
    ///
    /// The streams stored in the recording are enabled; `start_stream` plays it.
    pub fn load(&mut self, path: impl AsRef<Path>) -> CameraResult<()> {
        self.ensure_idle()?;
        let path = path.as_ref();
        let playback = PlaybackDevice::open(
            path,
            self.config.playback_repeat,
            self.config.playback_realtime,
        )?;
        let streams = playback.header().streams;
        debug!(
            path = %path.display(),
            streams = streams.enabled().len(),
            "Playback device selected"
        );

        self.device = Some(Arc::new(playback));
        self.streams = streams;
        self.calibration = None;
        self.recording.enter_playback(path.to_path_buf());
        self.frames.reset();
        self.check_alignment();
        Ok(())
    }

    // ===== Stream configuration =====

    pub fn enable_color(&mut self, request: StreamRequest) -> CameraResult<()> {
        self.enable_stream(StreamKind::Color, request)
    }

    pub fn enable_ir(&mut self, request: StreamRequest) -> CameraResult<()> {
        self.enable_stream(StreamKind::Infrared, request)
    }

    pub fn enable_depth(&mut self, request: StreamRequest) -> CameraResult<()> {
        self.enable_stream(StreamKind::Depth, request)
    }

    pub fn disable_color(&mut self) -> CameraResult<()> {
        self.disable_stream(StreamKind::Color)
    }

    pub fn disable_ir(&mut self) -> CameraResult<()> {
        self.disable_stream(StreamKind::Infrared)
    }

    pub fn disable_depth(&mut self) -> CameraResult<()> {
        self.disable_stream(StreamKind::Depth)
    }

    fn enable_stream(&mut self, kind: StreamKind, request: StreamRequest) -> CameraResult<()> {
        self.ensure_idle()?;
        let device = self.device.as_ref().ok_or(CameraError::NotConfigured)?;
        let config = negotiate(&device.profiles(), kind, request)?;
        *self.streams.get_mut(kind) = config;
        Ok(())
    }

    fn disable_stream(&mut self, kind: StreamKind) -> CameraResult<()> {
        self.ensure_idle()?;
        *self.streams.get_mut(kind) = StreamConfig::disabled(kind);
        self.check_alignment();
        Ok(())
    }

    /// Alignment stays on only while color and depth are both enabled
    fn check_alignment(&mut self) {
        if self.frames.is_aligned() && !(self.streams.color.enabled && self.streams.depth.enabled) {
            debug!("Alignment disabled, color and depth are no longer both enabled");
            self.frames.set_alignment(false, self.frames.align_to());
        }
    }

    // ===== Session lifecycle =====

    /// Whether the acquisition thread is producing framesets
    pub fn is_running(&self) -> bool {
        self.acquisition
            .as_ref()
            .is_some_and(|a| a.is_running())
    }

    /// Open the session and spawn the acquisition thread
    pub fn start_stream(&mut self) -> CameraResult<()> {
        self.ensure_idle()?;
        if !self.streams.any_enabled() {
            return Err(CameraError::NoStreamEnabled);
        }
        let device = self.device.clone().ok_or(CameraError::NotConfigured)?;

        let calibration = device.calibration(&self.streams);
        let source = device.open(&self.streams)?;

        let settings = self.filter_settings;
        let mut chain = self
            .chain
            .take()
            .unwrap_or_else(|| FilterChain::new(&settings));
        chain.set_context(FilterContext::from_calibration(&calibration));
        chain.reset();

        self.calibration = Some(calibration);
        self.frames.begin_session(calibration, &self.streams);
        self.mailbox.clear();

        for stream in self.streams.enabled() {
            info!(
                kind = %stream.kind,
                width = stream.width,
                height = stream.height,
                fps = stream.fps,
                format = %stream.format,
                "Stream started"
            );
        }

        self.acquisition = Some(Acquisition::start(
            source,
            chain,
            self.mailbox.clone(),
            Arc::clone(&self.recorder),
            Arc::clone(&self.status),
        ));
        Ok(())
    }

    /// Stop and join the acquisition thread; finishes an active recording
    pub fn stop(&mut self) {
        if self.recording.is_recording()
            && let Err(e) = self.finish_recording()
        {
            error!(error = %e, "Failed to finish recording on stop");
        }

        let Some(acquisition) = self.acquisition.take() else {
            return;
        };
        let status = acquisition.status();
        self.chain = acquisition.stop();
        if self.chain.is_none() {
            warn!("Filter chain was not returned, rebuilding from settings");
        }
        match &status.exit_error {
            Some(e) => warn!(
                framesets = status.framesets,
                error = %e,
                "Stream stopped after acquisition error"
            ),
            None => info!(
                framesets = status.framesets,
                dropped = status.dropped,
                "Stream stopped"
            ),
        }
    }

    /// Join a loop that already ended on its own
    fn reap(&mut self) {
        if self.acquisition.is_some() && !self.is_running() {
            debug!("Reaping finished acquisition thread");
            self.stop();
        }
    }

    fn ensure_idle(&mut self) -> CameraResult<()> {
        self.reap();
        if self.acquisition.is_some() {
            return Err(CameraError::DeviceBusy);
        }
        Ok(())
    }

    pub fn acquisition_status(&self) -> AcquisitionStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Framesets published by the current (or last) acquisition run
    pub fn frames_published(&self) -> u64 {
        self.acquisition_status().framesets
    }

    // ===== Consumer surface =====

    /// Materialize the latest frameset, if any; never blocks
    pub fn update(&mut self) -> bool {
        self.frames.update(&self.mailbox)
    }

    /// True once per delivered frameset
    pub fn is_frame_new(&mut self) -> bool {
        self.frames.is_frame_new()
    }

    pub fn depth_buffer(&self) -> &DisplayBuffer<u8> {
        self.frames.depth_buffer()
    }

    pub fn depth_raw_buffer(&self) -> &DisplayBuffer<u16> {
        self.frames.depth_raw_buffer()
    }

    pub fn color_buffer(&self) -> &DisplayBuffer<u8> {
        self.frames.color_buffer()
    }

    pub fn infrared_buffer(&self) -> &DisplayBuffer<u8> {
        self.frames.infrared_buffer()
    }

    pub fn depth_width(&self) -> u32 {
        reported_size(self.frames.depth_raw_buffer(), &self.streams.depth).0
    }

    pub fn depth_height(&self) -> u32 {
        reported_size(self.frames.depth_raw_buffer(), &self.streams.depth).1
    }

    pub fn color_width(&self) -> u32 {
        reported_size(self.frames.color_buffer(), &self.streams.color).0
    }

    pub fn color_height(&self) -> u32 {
        reported_size(self.frames.color_buffer(), &self.streams.color).1
    }

    pub fn ir_width(&self) -> u32 {
        reported_size(self.frames.infrared_buffer(), &self.streams.infrared).0
    }

    pub fn ir_height(&self) -> u32 {
        reported_size(self.frames.infrared_buffer(), &self.streams.infrared).1
    }

    /// Meters per raw depth unit, 0.0 without a device
    pub fn depth_scale(&self) -> f32 {
        match (&self.calibration, &self.device) {
            (Some(cal), _) => cal.depth_scale,
            (None, Some(device)) => device.depth_scale().unwrap_or(0.0),
            (None, None) => 0.0,
        }
    }

    /// Depth intrinsics at the materialized depth resolution
    pub fn camera_intrinsics(&self) -> Option<Intrinsics> {
        self.frames.depth_intrinsics()
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// Meters at a depth pixel; 0.0 outside the frame or without depth
    pub fn get_distance_at(&self, x: f32, y: f32) -> f32 {
        self.frames.distance_at(x, y)
    }

    /// Camera-space point in meters at a depth pixel
    pub fn get_world_coordinate_at(&self, x: f32, y: f32) -> Option<[f32; 3]> {
        self.frames.world_coordinate_at(x, y)
    }

    // ===== Alignment and colorizer =====

    /// Alignment needs both color and depth enabled; otherwise it stays off
    pub fn set_aligned(&mut self, aligned: bool) -> CameraResult<()> {
        if aligned && !(self.streams.color.enabled && self.streams.depth.enabled) {
            warn!(
                color = self.streams.color.enabled,
                depth = self.streams.depth.enabled,
                "Alignment needs color and depth streams, leaving it off"
            );
            return Err(CameraError::AlignmentUnavailable);
        }
        self.frames.set_alignment(aligned, self.config.align_to);
        debug!(aligned, align_to = ?self.config.align_to, "Alignment updated");
        Ok(())
    }

    pub fn is_aligned(&self) -> bool {
        self.frames.is_aligned()
    }

    pub fn set_align_to(&mut self, align_to: AlignTo) {
        self.config.align_to = align_to;
        self.frames
            .set_alignment(self.frames.is_aligned(), align_to);
    }

    pub fn set_depth_color_schema(&mut self, schema: ColorSchema) {
        debug!(%schema, "Depth color schema changed");
        self.frames.colorizer_mut().set_schema(schema);
    }

    pub fn colorizer_options(&self) -> ColorizerOptions {
        *self.frames.colorizer().options()
    }

    pub fn set_colorizer_options(&mut self, options: ColorizerOptions) {
        self.frames.colorizer_mut().set_options(options);
    }

    // ===== Filters =====

    pub fn filter_settings(&self) -> &FilterSettings {
        &self.filter_settings
    }

    /// Rebuild the standard chain from the current filter settings
    pub fn setup_filter(&mut self) -> CameraResult<()> {
        self.ensure_idle()?;
        self.chain = Some(FilterChain::new(&self.filter_settings));
        Ok(())
    }

    pub fn set_filter_settings(&mut self, settings: FilterSettings) -> CameraResult<()> {
        self.ensure_idle()?;
        self.filter_settings = settings;
        self.chain = Some(FilterChain::new(&settings));
        Ok(())
    }

    /// Replace the chain with a custom one
    pub fn set_filter_chain(&mut self, chain: FilterChain) -> CameraResult<()> {
        self.ensure_idle()?;
        self.chain = Some(chain);
        Ok(())
    }

    /// Names and enabled flags of the idle chain; `None` while streaming
    pub fn filters(&self) -> Option<Vec<(&'static str, bool)>> {
        self.chain.as_ref().map(|c| c.describe())
    }

    pub fn set_filter_enabled(&mut self, filter: &str, enabled: bool) -> CameraResult<()> {
        self.edit_chain(ChainCommand::SetEnabled(filter.to_string(), enabled))
    }

    pub fn set_filter_option(&mut self, filter: &str, option: &str, value: f32) -> CameraResult<()> {
        self.edit_chain(ChainCommand::SetOption(
            filter.to_string(),
            option.to_string(),
            value,
        ))
    }

    /// Queued to the running loop, applied directly otherwise
    fn edit_chain(&mut self, command: ChainCommand) -> CameraResult<()> {
        if let Some(acquisition) = self.acquisition.as_ref().filter(|a| a.is_running()) {
            if !acquisition.send(command) {
                debug!("Acquisition ended before the filter edit was queued");
            }
            return Ok(());
        }

        self.reap();
        let settings = self.filter_settings;
        let chain = self
            .chain
            .get_or_insert_with(|| FilterChain::new(&settings));
        let result = match command {
            ChainCommand::SetEnabled(name, enabled) => chain.set_enabled(&name, enabled),
            ChainCommand::SetOption(name, option, value) => chain.set_option(&name, &option, value),
            ChainCommand::Reset => {
                chain.reset();
                Ok(())
            }
        };
        result.map_err(|e| CameraError::InvalidParameter(e.to_string()))
    }

    // ===== Parameter events =====

    /// Apply an inbound parameter change without restarting the session
    pub fn apply_parameter(&mut self, change: &ParameterChange) -> CameraResult<()> {
        let parameter = SensorParameter::try_from(change).inspect_err(|e| {
            warn!(name = %change.name, value = %change.value, error = %e, "Rejected parameter change");
        })?;

        match parameter {
            SensorParameter::DepthMin(v) => {
                self.frames.colorizer_mut().set_min_distance(v);
                self.filter_settings.threshold.min_distance = v;
                self.update_threshold("min_distance", v);
            }
            SensorParameter::DepthMax(v) => {
                self.frames.colorizer_mut().set_max_distance(v);
                self.filter_settings.threshold.max_distance = v;
                self.update_threshold("max_distance", v);
            }
            _ => {
                let device = self.device.as_ref().ok_or(CameraError::NotConfigured)?;
                if device.is_playback() {
                    warn!(parameter = parameter.name(), "Device parameters are ignored during playback");
                    return Ok(());
                }
                let Some(controls) = device.controls() else {
                    warn!(parameter = parameter.name(), "Device exposes no controls, parameter ignored");
                    return Ok(());
                };
                match parameter {
                    SensorParameter::AutoExposure(v) => controls.set_auto_exposure(v)?,
                    SensorParameter::EnableEmitter(v) => controls.set_emitter_enabled(v)?,
                    SensorParameter::IrExposure(v) => controls.set_ir_exposure(v)?,
                    SensorParameter::DepthMin(_) | SensorParameter::DepthMax(_) => {}
                }
            }
        }

        debug!(parameter = parameter.name(), value = %change.value, "Parameter applied");
        Ok(())
    }

    fn update_threshold(&mut self, option: &str, value: f32) {
        if let Err(e) = self.set_filter_option("threshold", option, value) {
            debug!(error = %e, "Active chain has no threshold filter");
        }
    }

    // ===== Recording and playback =====

    pub fn recording_state(&self) -> &RecordingState {
        self.recording.state()
    }

    /// True while frames are being written
    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
            && self
                .recorder
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .is_some()
    }

    /// Record the running live session to `path`
    pub fn start_record(&mut self, path: impl AsRef<Path>) -> Result<(), RecordingError> {
        self.reap();
        self.recording.check_start()?;
        let device = match &self.device {
            Some(device) if self.is_running() && !device.is_playback() => Arc::clone(device),
            _ => return Err(RecordingError::NoLiveSession),
        };

        let path = path.as_ref();
        let calibration = self
            .calibration
            .unwrap_or_else(|| device.calibration(&self.streams));
        let header = RecordingHeader::new(&device.info(), self.streams, calibration);
        let writer = RecordingWriter::create(path, &header)?;

        *self.recorder.lock().unwrap_or_else(|e| e.into_inner()) = Some(writer);
        self.recording.commit_start(path.to_path_buf());
        debug!(path = %path.display(), "Recorder installed");
        Ok(())
    }

    /// Finish the recording; with `playback` the file is reopened and played
    pub fn stop_record(&mut self, playback: bool) -> Result<(), RecordingError> {
        let path = self.finish_recording()?;
        if playback {
            self.play_file(&path)?;
        }
        Ok(())
    }

    /// Play the most recently finished recording
    pub fn playback_recorded(&mut self) -> Result<(), RecordingError> {
        let path = self.recording.recorded_target()?;
        self.play_file(&path)
    }

    /// Leave playback and restart streaming on the last live device
    pub fn return_to_live(&mut self) -> CameraResult<()> {
        if !self.recording.state().is_playback() {
            return Ok(());
        }
        let live = self.live_device.clone().ok_or(CameraError::NotConfigured)?;
        let was_running = self.is_running();
        self.stop();

        let profiles = live.profiles();
        let mut streams = StreamSet::default();
        for stream in self.streams.enabled() {
            let request = StreamRequest {
                width: stream.width,
                height: stream.height,
                fps: stream.fps,
                use_arbitrary_texture_layout: stream.use_arbitrary_texture_layout,
            };
            *streams.get_mut(stream.kind) = negotiate(&profiles, stream.kind, request)?;
        }

        info!(device = %live.info().name, "Returning to live capture");
        self.device = Some(live);
        self.streams = streams;
        self.recording.enter_idle();
        if was_running {
            self.start_stream()?;
        }
        Ok(())
    }

    fn finish_recording(&mut self) -> Result<PathBuf, RecordingError> {
        let path = self.recording.finish()?;
        let writer = self
            .recorder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match writer {
            Some(writer) => {
                let framesets = writer.finish()?;
                info!(path = %path.display(), framesets, "Recording finished");
            }
            None => warn!(path = %path.display(), "Recording had already stopped after a write failure"),
        }
        Ok(path)
    }

    /// Stop, load `path` and start streaming it
    fn play_file(&mut self, path: &Path) -> Result<(), RecordingError> {
        self.stop();
        self.load(path)?;
        self.start_stream()?;
        Ok(())
    }

    // ===== Export =====

    /// Write the current raw depth buffer as a LAS point cloud
    pub fn export_point_cloud(&self, path: impl AsRef<Path>) -> AppResult<usize> {
        if self.frames.depth_raw_buffer().is_empty() {
            return Err(AppError::Storage("No depth frame to export".into()));
        }
        let intrinsics = self
            .camera_intrinsics()
            .ok_or_else(|| AppError::Other("Depth intrinsics unavailable".into()))?;
        export::export_point_cloud_las(
            path.as_ref(),
            self.frames.depth_raw_buffer(),
            Some(self.frames.color_buffer()),
            &intrinsics,
            self.frames.depth_scale(),
        )
    }

    /// Save the current buffers as PNG files with a timestamped name
    pub fn save_snapshot(&self, dir: impl AsRef<Path>) -> AppResult<Vec<PathBuf>> {
        let stem = chrono::Local::now()
            .format("depthcam_%Y%m%d_%H%M%S")
            .to_string();
        export::save_snapshot(dir.as_ref(), &stem, &self.frames)
    }
}

impl Drop for DepthCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
