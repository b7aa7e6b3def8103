// SPDX-License-Identifier: GPL-3.0-only

//! Recording/playback mode state
//!
//! ```text
//! Idle ──start_record──▶ Recording(path) ──stop_record(true)──▶ Playback(path)
//!  ▲                          │                                     │
//!  └────stop_record(false)────┘◀───────────return_to_live──────────┘
//! ```

use crate::errors::RecordingError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exactly one mode at a time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording(PathBuf),
    Playback(PathBuf),
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording(_))
    }

    pub fn is_playback(&self) -> bool {
        matches!(self, RecordingState::Playback(_))
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            RecordingState::Idle => None,
            RecordingState::Recording(p) | RecordingState::Playback(p) => Some(p),
        }
    }
}

/// Gatekeeper for mode transitions
///
/// Only tracks state; opening files and restarting the stream is up to the
/// caller, which commits a transition once the side effects succeeded.
#[derive(Debug, Default)]
pub struct RecordingController {
    state: RecordingState,
    last_recording: Option<PathBuf>,
}

impl RecordingController {
    pub fn state(&self) -> &RecordingState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Most recently finished recording
    pub fn last_recording(&self) -> Option<&Path> {
        self.last_recording.as_deref()
    }

    /// Validate `Idle → Recording` without committing it
    pub fn check_start(&self) -> Result<(), RecordingError> {
        match self.state {
            RecordingState::Idle => Ok(()),
            RecordingState::Recording(_) => Err(RecordingError::AlreadyRecording),
            RecordingState::Playback(_) => Err(RecordingError::NoLiveSession),
        }
    }

    pub fn commit_start(&mut self, path: PathBuf) {
        debug!(path = %path.display(), "Recording state: recording");
        self.state = RecordingState::Recording(path);
    }

    /// `Recording → Idle`; returns the finished file
    pub fn finish(&mut self) -> Result<PathBuf, RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        let RecordingState::Recording(path) = std::mem::take(&mut self.state) else {
            return Err(RecordingError::NotRecording);
        };
        self.last_recording = Some(path.clone());
        debug!(path = %path.display(), "Recording state: idle");
        Ok(path)
    }

    /// Target of `playback_recorded`
    pub fn recorded_target(&self) -> Result<PathBuf, RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        self.last_recording
            .clone()
            .ok_or(RecordingError::NoRecording)
    }

    pub fn enter_playback(&mut self, path: PathBuf) {
        debug!(path = %path.display(), "Recording state: playback");
        self.state = RecordingState::Playback(path);
    }

    /// Back to `Idle` (live capture or nothing)
    pub fn enter_idle(&mut self) {
        if self.state != RecordingState::Idle {
            debug!("Recording state: idle");
        }
        self.state = RecordingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_playback() {
        let mut c = RecordingController::default();
        assert_eq!(c.recorded_target(), Err(RecordingError::NoRecording));

        c.check_start().unwrap();
        c.commit_start(PathBuf::from("/tmp/a.dsr"));
        assert!(c.is_recording());
        assert_eq!(c.check_start(), Err(RecordingError::AlreadyRecording));

        let path = c.finish().unwrap();
        assert!(!c.is_recording());
        c.enter_playback(path.clone());
        assert_eq!(c.state(), &RecordingState::Playback(path.clone()));
        assert_eq!(c.recorded_target(), Ok(path));
    }

    #[test]
    fn test_finish_without_recording() {
        let mut c = RecordingController::default();
        assert_eq!(c.finish(), Err(RecordingError::NotRecording));
    }

    #[test]
    fn test_no_recording_during_playback() {
        let mut c = RecordingController::default();
        c.enter_playback(PathBuf::from("x.dsr"));
        assert_eq!(c.check_start(), Err(RecordingError::NoLiveSession));
        c.enter_idle();
        assert_eq!(c.state(), &RecordingState::Idle);
    }
}
