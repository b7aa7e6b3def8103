// SPDX-License-Identifier: GPL-3.0-only

//! Recording container (`.dsr`) and playback device
//!
//! Layout:
//!
//! ```text
//! "DSR1" | u32 LE header length | JSON header | record*
//! record = u8 frame count | frame*
//! frame  = u8 kind | u32 width | u32 height | u64 timestamp_us
//!        | u64 frame_number | u32 byte length | payload
//! ```
//!
//! Integers are little-endian. Depth payloads are little-endian `u16`,
//! color RGB8 and infrared GRAY8. A truncated trailing record is ignored.

use crate::backends::device::types::*;
use crate::backends::device::{DepthDevice, FrameSource};
use crate::constants::recording::{MAGIC, MAX_HEADER_LEN};
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::{CameraError, CameraResult, RecordingError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest frame dimension accepted when reading
const MAX_DIMENSION: u32 = 16_384;

/// Metadata stored at the start of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub version: u32,
    pub device_name: String,
    pub device_serial: String,
    /// RFC 3339 creation time
    pub created: String,
    pub streams: StreamSet,
    pub calibration: Calibration,
}

impl RecordingHeader {
    pub fn new(info: &DeviceInfo, streams: StreamSet, calibration: Calibration) -> Self {
        Self {
            version: 1,
            device_name: info.name.clone(),
            device_serial: info.serial.clone(),
            created: chrono::Local::now().to_rfc3339(),
            streams,
            calibration,
        }
    }
}

fn depth_to_le_bytes(values: &[u16]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice::<u16, u8>(values).to_vec()
    } else {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }
}

fn depth_from_le_bytes(bytes: &[u8]) -> Vec<u16> {
    let mut values: Vec<u16> = bytemuck::pod_collect_to_vec(bytes);
    if cfg!(target_endian = "big") {
        for v in &mut values {
            *v = u16::from_le(*v);
        }
    }
    values
}

/// Append-only writer for framesets
pub struct RecordingWriter {
    out: BufWriter<File>,
    path: PathBuf,
    framesets: u64,
}

impl RecordingWriter {
    /// Create the file and write the header
    pub fn create(path: &Path, header: &RecordingHeader) -> Result<Self, RecordingError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .map_err(|e| RecordingError::WriteFailed(format!("{}: {}", path.display(), e)))?;
        let mut out = BufWriter::new(file);

        let json = serde_json::to_vec(header)
            .map_err(|e| RecordingError::WriteFailed(format!("header: {}", e)))?;
        out.write_all(MAGIC)?;
        out.write_all(&(json.len() as u32).to_le_bytes())?;
        out.write_all(&json)?;

        info!(path = %path.display(), device = %header.device_name, "Recording started");

        Ok(Self {
            out,
            path: path.to_path_buf(),
            framesets: 0,
        })
    }

    fn write_frame(
        &mut self,
        kind: StreamKind,
        width: u32,
        height: u32,
        timestamp_us: u64,
        frame_number: u64,
        payload: &[u8],
    ) -> io::Result<()> {
        self.out.write_all(&[kind.tag()])?;
        self.out.write_all(&width.to_le_bytes())?;
        self.out.write_all(&height.to_le_bytes())?;
        self.out.write_all(&timestamp_us.to_le_bytes())?;
        self.out.write_all(&frame_number.to_le_bytes())?;
        self.out.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.out.write_all(payload)
    }

    /// Append one frameset record
    pub fn write_frameset(&mut self, set: &FrameSet) -> Result<(), RecordingError> {
        let count = [set.color.is_some(), set.infrared.is_some(), set.depth.is_some()]
            .iter()
            .filter(|present| **present)
            .count() as u8;
        self.out.write_all(&[count])?;

        if let Some(f) = &set.color {
            self.write_frame(StreamKind::Color, f.width, f.height, f.timestamp_us, f.frame_number, &f.data)?;
        }
        if let Some(f) = &set.infrared {
            self.write_frame(StreamKind::Infrared, f.width, f.height, f.timestamp_us, f.frame_number, &f.data)?;
        }
        if let Some(f) = &set.depth {
            let payload = depth_to_le_bytes(&f.data);
            self.write_frame(StreamKind::Depth, f.width, f.height, f.timestamp_us, f.frame_number, &payload)?;
        }

        self.framesets += 1;
        if self.framesets % FRAME_LOG_INTERVAL == 0 {
            debug!(framesets = self.framesets, "Recording progress");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn framesets(&self) -> u64 {
        self.framesets
    }

    /// Flush and close, returning the number of framesets written
    pub fn finish(mut self) -> Result<u64, RecordingError> {
        self.out.flush()?;
        info!(path = %self.path.display(), framesets = self.framesets, "Recording finished");
        Ok(self.framesets)
    }
}

/// Sequential reader over a recording
pub struct RecordingReader {
    input: BufReader<File>,
    header: RecordingHeader,
    data_start: u64,
    path: PathBuf,
}

fn file_error(path: &Path, msg: impl std::fmt::Display) -> CameraError {
    CameraError::FileOpenError(format!("{}: {}", path.display(), msg))
}

impl RecordingReader {
    /// Open a recording and parse its header
    pub fn open(path: &Path) -> CameraResult<Self> {
        let file = File::open(path).map_err(|e| file_error(path, e))?;
        let mut input = BufReader::new(file);

        let mut magic = [0u8; 4];
        input
            .read_exact(&mut magic)
            .map_err(|_| file_error(path, "file too short"))?;
        if &magic != MAGIC {
            return Err(file_error(path, "not a depth recording"));
        }

        let mut len = [0u8; 4];
        input
            .read_exact(&mut len)
            .map_err(|_| file_error(path, "missing header"))?;
        let len = u32::from_le_bytes(len);
        if len > MAX_HEADER_LEN {
            return Err(file_error(path, "header too large"));
        }

        let mut json = vec![0u8; len as usize];
        input
            .read_exact(&mut json)
            .map_err(|_| file_error(path, "truncated header"))?;
        let header: RecordingHeader =
            serde_json::from_slice(&json).map_err(|e| file_error(path, e))?;

        let data_start = 8 + len as u64;
        debug!(path = %path.display(), device = %header.device_name, created = %header.created, "Opened recording");

        Ok(Self {
            input,
            header,
            data_start,
            path: path.to_path_buf(),
        })
    }

    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }

    /// Seek back to the first record
    pub fn rewind(&mut self) -> io::Result<()> {
        self.input.seek(SeekFrom::Start(self.data_start))?;
        Ok(())
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut b = [0u8; 4];
        self.input.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        let mut b = [0u8; 8];
        self.input.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }

    fn read_record(&mut self) -> io::Result<FrameSet> {
        let mut count = [0u8; 1];
        self.input.read_exact(&mut count)?;

        let mut set = FrameSet::default();
        for _ in 0..count[0] {
            let mut tag = [0u8; 1];
            self.input.read_exact(&mut tag)?;
            let kind = StreamKind::from_tag(tag[0])
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown stream tag"))?;
            let width = self.read_u32()?;
            let height = self.read_u32()?;
            let timestamp_us = self.read_u64()?;
            let frame_number = self.read_u64()?;
            let len = self.read_u32()? as usize;

            if width > MAX_DIMENSION || height > MAX_DIMENSION {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
            }
            let expected = (width * height) as usize * kind.pipeline_format().bytes_per_pixel();
            if len != expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{} payload is {} bytes, expected {}", kind, len, expected),
                ));
            }

            let mut payload = vec![0u8; len];
            self.input.read_exact(&mut payload)?;

            match kind {
                StreamKind::Depth => {
                    set.depth = Some(DepthFrame::new(
                        width,
                        height,
                        depth_from_le_bytes(&payload),
                        timestamp_us,
                        frame_number,
                    ))
                }
                StreamKind::Color => {
                    set.color = Some(ColorFrame::new(width, height, payload, timestamp_us, frame_number))
                }
                StreamKind::Infrared => {
                    set.infrared = Some(InfraredFrame::new(width, height, payload, timestamp_us, frame_number))
                }
            }
        }
        Ok(set)
    }

    /// Next frameset, `None` at end of file or at a truncated/corrupt tail
    pub fn read_frameset(&mut self) -> Option<FrameSet> {
        match self.read_record() {
            Ok(set) => Some(set),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt recording tail");
                None
            }
        }
    }
}

/// Read only the header of a recording
pub fn read_header(path: &Path) -> CameraResult<RecordingHeader> {
    RecordingReader::open(path).map(|r| r.header)
}

/// Recording exposed as a device
pub struct PlaybackDevice {
    path: PathBuf,
    header: RecordingHeader,
    repeat: bool,
    realtime: bool,
}

impl PlaybackDevice {
    /// Validate the file and read its header
    pub fn open(path: &Path, repeat: bool, realtime: bool) -> CameraResult<Self> {
        let header = read_header(path)?;
        info!(
            path = %path.display(),
            device = %header.device_name,
            repeat,
            realtime,
            "Loaded recording"
        );
        Ok(Self {
            path: path.to_path_buf(),
            header,
            repeat,
            realtime,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &RecordingHeader {
        &self.header
    }
}

impl DepthDevice for PlaybackDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: self.header.device_name.clone(),
            serial: self.header.device_serial.clone(),
            backend: "playback".to_string(),
            path: self.path.display().to_string(),
        }
    }

    fn profiles(&self) -> Vec<StreamProfile> {
        self.header
            .streams
            .enabled()
            .iter()
            .map(|s| s.profile())
            .collect()
    }

    fn depth_scale(&self) -> Option<f32> {
        self.header
            .streams
            .depth
            .enabled
            .then_some(self.header.calibration.depth_scale)
    }

    fn calibration(&self, _streams: &StreamSet) -> Calibration {
        self.header.calibration
    }

    fn open(&self, streams: &StreamSet) -> CameraResult<Box<dyn FrameSource>> {
        let reader = RecordingReader::open(&self.path)?;
        Ok(Box::new(PlaybackSource {
            reader,
            streams: *streams,
            repeat: self.repeat,
            realtime: self.realtime,
            clock: None,
            delivered: 0,
        }))
    }

    fn is_playback(&self) -> bool {
        true
    }
}

/// Frameset source replaying a recording
struct PlaybackSource {
    reader: RecordingReader,
    streams: StreamSet,
    repeat: bool,
    realtime: bool,
    /// Wall-clock start and first recorded timestamp of the current pass
    clock: Option<(Instant, u64)>,
    delivered: u64,
}

impl PlaybackSource {
    fn next_set(&mut self) -> CameraResult<FrameSet> {
        if let Some(set) = self.reader.read_frameset() {
            return Ok(set);
        }
        if !self.repeat || self.delivered == 0 {
            info!(delivered = self.delivered, "Playback reached end of recording");
            return Err(CameraError::EndOfStream);
        }

        debug!("Playback restarting from the beginning");
        self.reader
            .rewind()
            .map_err(|e| CameraError::BackendError(e.to_string()))?;
        self.clock = None;
        self.reader.read_frameset().ok_or(CameraError::EndOfStream)
    }
}

impl FrameSource for PlaybackSource {
    fn wait_for_frames(&mut self) -> CameraResult<FrameSet> {
        let mut set = self.next_set()?;

        // Streams disabled for this session are not delivered
        if !self.streams.depth.enabled {
            set.depth = None;
        }
        if !self.streams.color.enabled {
            set.color = None;
        }
        if !self.streams.infrared.enabled {
            set.infrared = None;
        }

        if self.realtime {
            let ts = set.timestamp_us();
            let (start, first_ts) = *self.clock.get_or_insert((Instant::now(), ts));
            let due = start + Duration::from_micros(ts.saturating_sub(first_ts));
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }

        self.delivered += 1;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> RecordingHeader {
        let mut streams = StreamSet::default();
        streams.depth = StreamConfig::from_profile(
            &StreamProfile {
                kind: StreamKind::Depth,
                width: 2,
                height: 2,
                fps: 30,
                format: PixelFormat::Z16,
            },
            true,
        );
        let calibration =
            crate::config::CalibrationDefaults::default().to_calibration(Some((2, 2)), None, None);
        RecordingHeader::new(&DeviceInfo::default(), streams, calibration)
    }

    fn depth_set(value: u16, n: u64) -> FrameSet {
        FrameSet {
            depth: Some(DepthFrame::new(2, 2, vec![value; 4], n * 1000, n)),
            ..Default::default()
        }
    }

    #[test]
    fn test_write_then_read_framesets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.dsr");

        let mut writer = RecordingWriter::create(&path, &header()).unwrap();
        writer.write_frameset(&depth_set(100, 0)).unwrap();
        writer.write_frameset(&depth_set(200, 1)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let mut reader = RecordingReader::open(&path).unwrap();
        assert_eq!(reader.header().streams.depth.width, 2);
        let first = reader.read_frameset().unwrap();
        assert_eq!(first.depth.unwrap().data.to_vec(), vec![100; 4]);
        let second = reader.read_frameset().unwrap().depth.unwrap();
        assert_eq!(second.frame_number, 1);
        assert_eq!(second.timestamp_us, 1000);
        assert!(reader.read_frameset().is_none());
    }

    #[test]
    fn test_truncated_tail_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dsr");
        let mut writer = RecordingWriter::create(&path, &header()).unwrap();
        writer.write_frameset(&depth_set(1, 0)).unwrap();
        writer.write_frameset(&depth_set(2, 1)).unwrap();
        writer.finish().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let mut reader = RecordingReader::open(&path).unwrap();
        assert!(reader.read_frameset().is_some());
        assert!(reader.read_frameset().is_none());
    }

    #[test]
    fn test_bad_magic_is_file_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dsr");
        std::fs::write(&path, b"NOPE0000").unwrap();
        assert!(matches!(
            RecordingReader::open(&path),
            Err(CameraError::FileOpenError(_))
        ));
        assert!(matches!(
            RecordingReader::open(&dir.path().join("missing.dsr")),
            Err(CameraError::FileOpenError(_))
        ));
    }

    #[test]
    fn test_playback_without_repeat_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.dsr");
        let mut writer = RecordingWriter::create(&path, &header()).unwrap();
        writer.write_frameset(&depth_set(5, 0)).unwrap();
        writer.finish().unwrap();

        let device = PlaybackDevice::open(&path, false, false).unwrap();
        let streams = device.header().streams;
        let mut source = device.open(&streams).unwrap();
        assert!(source.wait_for_frames().is_ok());
        assert_eq!(source.wait_for_frames().unwrap_err(), CameraError::EndOfStream);
    }

    #[test]
    fn test_playback_repeat_loops() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.dsr");
        let mut writer = RecordingWriter::create(&path, &header()).unwrap();
        writer.write_frameset(&depth_set(5, 0)).unwrap();
        writer.write_frameset(&depth_set(6, 1)).unwrap();
        writer.finish().unwrap();

        let device = PlaybackDevice::open(&path, true, false).unwrap();
        let streams = device.header().streams;
        let mut source = device.open(&streams).unwrap();
        let values: Vec<u16> = (0..5)
            .map(|_| source.wait_for_frames().unwrap().depth.unwrap().data[0])
            .collect();
        assert_eq!(values, vec![5, 6, 5, 6, 5]);
    }
}
