// SPDX-License-Identifier: GPL-3.0-only

//! Acquisition loop
//!
//! Blocks on the frame source, records the raw frameset, runs the filter
//! chain and publishes the result to the mailbox. Runs on its own thread
//! through [`CaptureLoopController`]. The source and chain are owned by that
//! thread while it runs; the chain is handed back when the loop ends.

use super::filters::FilterChain;
use super::frame_loop::{CaptureLoopController, LoopAction, StopToken};
use super::mailbox::Mailbox;
use crate::backends::device::{FrameSet, FrameSource};
use crate::backends::recording::RecordingWriter;
use crate::constants::timing::FRAME_LOG_INTERVAL;
use crate::errors::CameraError;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Lifecycle of the acquisition thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    #[default]
    Idle,
    Running,
    /// Stop requested, waiting for the current iteration to finish
    Draining,
}

/// Snapshot of the loop's progress and exit reason
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquisitionStatus {
    pub state: AcquisitionState,
    /// Framesets published to the mailbox in this run
    pub framesets: u64,
    /// Framesets a filter dropped in this run
    pub dropped: u64,
    /// `None` after a requested stop or end of playback
    pub exit_error: Option<CameraError>,
}

pub type StatusHandle = Arc<Mutex<AcquisitionStatus>>;

/// Recording target shared with the acquisition thread
pub type RecorderSlot = Arc<Mutex<Option<RecordingWriter>>>;

/// Filter-chain edits applied between framesets
#[derive(Debug, Clone, PartialEq)]
pub enum ChainCommand {
    SetEnabled(String, bool),
    SetOption(String, String, f32),
    Reset,
}

fn update_status(status: &StatusHandle, f: impl FnOnce(&mut AcquisitionStatus)) {
    let mut guard = status.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard);
}

/// Loop-thread state; returns the chain to its home slot when dropped
struct LoopState {
    source: Box<dyn FrameSource>,
    chain: Option<FilterChain>,
    chain_home: Arc<Mutex<Option<FilterChain>>>,
    commands: Receiver<ChainCommand>,
    mailbox: Mailbox<FrameSet>,
    recorder: RecorderSlot,
    status: StatusHandle,
    iterations: u64,
}

impl Drop for LoopState {
    fn drop(&mut self) {
        // Edits queued after the last frameset still reach the returned chain
        self.apply_commands();
        if let Some(chain) = self.chain.take() {
            *self.chain_home.lock().unwrap_or_else(|e| e.into_inner()) = Some(chain);
        }
    }
}

impl LoopState {
    fn apply_commands(&mut self) {
        let Some(chain) = self.chain.as_mut() else {
            return;
        };
        while let Ok(command) = self.commands.try_recv() {
            let result = match &command {
                ChainCommand::SetEnabled(name, enabled) => chain.set_enabled(name, *enabled),
                ChainCommand::SetOption(name, option, value) => {
                    chain.set_option(name, option, *value)
                }
                ChainCommand::Reset => {
                    chain.reset();
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(?command, error = %e, "Filter command rejected");
            }
        }
    }

    fn record(&self, frameset: &FrameSet) {
        let mut slot = self.recorder.lock().unwrap_or_else(|e| e.into_inner());
        let Some(writer) = slot.as_mut() else {
            return;
        };
        if let Err(e) = writer.write_frameset(frameset) {
            error!(error = %e, path = %writer.path().display(), "Recording write failed, recording stopped");
            if let Some(writer) = slot.take() {
                let _ = writer.finish();
            }
        }
    }

    fn exit(&self, error: Option<CameraError>) -> LoopAction {
        update_status(&self.status, |s| s.exit_error = error);
        LoopAction::Stop
    }

    fn step(&mut self, stop: &StopToken) -> LoopAction {
        self.apply_commands();

        let frameset = match self.source.wait_for_frames() {
            Ok(_) if stop.is_requested() => {
                debug!("Stop requested during wait, frameset discarded");
                return LoopAction::Stop;
            }
            Ok(set) => set,
            Err(CameraError::EndOfStream) => {
                info!("Playback reached end of stream");
                return self.exit(None);
            }
            Err(e) => {
                error!(error = %e, "Acquisition loop terminated");
                return self.exit(Some(e));
            }
        };

        self.record(&frameset);

        let frameset = match (&frameset.depth, self.chain.as_mut()) {
            (Some(depth), Some(chain)) => match chain.apply(depth) {
                Ok(Some(filtered)) => frameset.with_depth(filtered),
                Ok(None) => {
                    update_status(&self.status, |s| s.dropped += 1);
                    return LoopAction::Continue;
                }
                Err(e) => {
                    error!(filter = e.filter, error = %e, "Filter failed, stopping acquisition");
                    return self.exit(Some(CameraError::FilterFailure(e)));
                }
            },
            _ => frameset,
        };

        self.mailbox.publish(frameset);
        update_status(&self.status, |s| s.framesets += 1);

        self.iterations += 1;
        if self.iterations % FRAME_LOG_INTERVAL == 0 {
            debug!(
                framesets = self.iterations,
                overwritten = self.mailbox.overwritten(),
                "Acquisition progress"
            );
        }
        LoopAction::Continue
    }
}

/// Handle to a running (or finished) acquisition thread
pub struct Acquisition {
    controller: Option<CaptureLoopController>,
    chain_home: Arc<Mutex<Option<FilterChain>>>,
    commands: Sender<ChainCommand>,
    status: StatusHandle,
}

impl Acquisition {
    /// Spawn the loop; the source is opened by the caller so setup errors stay synchronous
    pub fn start(
        source: Box<dyn FrameSource>,
        chain: FilterChain,
        mailbox: Mailbox<FrameSet>,
        recorder: RecorderSlot,
        status: StatusHandle,
    ) -> Self {
        update_status(&status, |s| *s = AcquisitionStatus {
            state: AcquisitionState::Running,
            ..Default::default()
        });

        let chain_home = Arc::new(Mutex::new(None));
        let (commands, receiver) = mpsc::channel();
        let mut state = LoopState {
            source,
            chain: Some(chain),
            chain_home: Arc::clone(&chain_home),
            commands: receiver,
            mailbox,
            recorder,
            status: Arc::clone(&status),
            iterations: 0,
        };

        let status_on_exit = Arc::clone(&status);
        let spawned = CaptureLoopController::start("depthcam-acquisition", move |stop| {
            let action = state.step(stop);
            if action == LoopAction::Stop {
                update_status(&status_on_exit, |s| s.state = AcquisitionState::Idle);
            }
            action
        });

        Self::from_spawned(spawned, chain_home, commands, status)
    }

    /// A failed spawn leaves an ended acquisition whose status carries the error
    fn from_spawned(
        spawned: io::Result<CaptureLoopController>,
        chain_home: Arc<Mutex<Option<FilterChain>>>,
        commands: Sender<ChainCommand>,
        status: StatusHandle,
    ) -> Self {
        let controller = match spawned {
            Ok(controller) => Some(controller),
            Err(e) => {
                error!(error = %e, "Failed to spawn acquisition thread");
                update_status(&status, |s| {
                    s.state = AcquisitionState::Idle;
                    s.exit_error = Some(CameraError::BackendError(format!(
                        "failed to spawn acquisition thread: {}",
                        e
                    )));
                });
                None
            }
        };
        Self {
            controller,
            chain_home,
            commands,
            status,
        }
    }

    /// Whether the thread is still producing framesets
    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .map(|c| c.is_running())
            .unwrap_or(false)
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Queue a filter edit; false once the loop has ended
    pub fn send(&self, command: ChainCommand) -> bool {
        self.is_running() && self.commands.send(command).is_ok()
    }

    /// Signal, drain and join; returns the filter chain
    pub fn stop(mut self) -> Option<FilterChain> {
        if let Some(mut controller) = self.controller.take() {
            update_status(&self.status, |s| {
                if s.state == AcquisitionState::Running {
                    s.state = AcquisitionState::Draining;
                }
            });
            controller.stop();
        }
        update_status(&self.status, |s| s.state = AcquisitionState::Idle);
        let chain = self.chain_home.lock().unwrap_or_else(|e| e.into_inner()).take();
        debug!(returned = chain.is_some(), "Acquisition stopped");
        chain
    }
}
