// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle of the acquisition loop
//!
//! A step closure runs repeatedly on a named thread until it returns
//! [`LoopAction::Stop`] or a stop is requested. The stop flag is checked
//! between steps and handed to each step, so a step blocked on device I/O
//! can tell on return that it should discard its result.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the step closure asks of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// Read side of the stop flag, given to every step
#[derive(Debug, Clone)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owner of one loop thread; stops and joins it on drop
pub struct CaptureLoopController {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Spawn a thread called `name` driving `step`
    ///
    /// `step` and everything it captured is dropped on the loop thread once
    /// the loop ends. If the thread cannot be spawned, `step` is dropped on
    /// the calling thread before the error is returned.
    pub fn start<F>(name: &str, mut step: F) -> io::Result<Self>
    where
        F: FnMut(&StopToken) -> LoopAction + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let token = StopToken(Arc::clone(&stop));
        let thread_name = name.to_string();

        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!(name = %thread_name, "Loop thread started");
            let mut steps = 0u64;
            while !token.is_requested() {
                steps += 1;
                if step(&token) == LoopAction::Stop {
                    debug!(name = %thread_name, steps, "Loop ended by its step");
                    break;
                }
            }
            drop(step);
            info!(name = %thread_name, steps, "Loop thread exiting");
        })?;

        info!(name = %name, "Loop thread spawned");
        Ok(Self {
            handle: Some(handle),
            stop,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Raise the stop flag without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Loop stop requested");
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Raise the stop flag and join
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Join without raising the stop flag
    pub fn join(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.join().is_err() {
            warn!(name = %self.name, "Loop thread panicked");
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn current_name() -> Option<String> {
        thread::current().name().map(str::to_string)
    }

    #[test]
    fn test_step_runs_on_named_thread() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_step = Arc::clone(&seen);

        let mut controller = CaptureLoopController::start("depth-acq", move |_| {
            *seen_in_step.lock().unwrap() = current_name();
            LoopAction::Stop
        })
        .unwrap();
        controller.join();

        assert_eq!(seen.lock().unwrap().as_deref(), Some("depth-acq"));
        assert!(!controller.is_running());
    }

    /// Records the thread it was dropped on
    struct ThreadWitness(Arc<Mutex<Option<String>>>);

    impl Drop for ThreadWitness {
        fn drop(&mut self) {
            *self.0.lock().unwrap() = current_name();
        }
    }

    #[test]
    fn test_step_state_dropped_on_loop_thread() {
        let dropped_on = Arc::new(Mutex::new(None));
        let state = ThreadWitness(Arc::clone(&dropped_on));

        let mut controller = CaptureLoopController::start("state-owner", move |_| {
            let _keep = &state;
            LoopAction::Stop
        })
        .unwrap();
        controller.join();

        assert_eq!(dropped_on.lock().unwrap().as_deref(), Some("state-owner"));
    }

    #[test]
    fn test_stop_is_visible_to_blocked_step() {
        let observed = Arc::new(AtomicBool::new(false));
        let observed_in_step = Arc::clone(&observed);
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let mut controller = CaptureLoopController::start("blocking", move |stop| {
            let _ = entered_tx.send(());
            thread::sleep(Duration::from_millis(50));
            if stop.is_requested() {
                observed_in_step.store(true, Ordering::SeqCst);
            }
            LoopAction::Continue
        })
        .unwrap();
        entered_rx.recv().unwrap();
        controller.stop();

        assert!(observed.load(Ordering::SeqCst));
        assert!(!controller.is_running());
    }

    #[test]
    fn test_drop_joins_running_loop() {
        let steps = Arc::new(Mutex::new(0u32));
        let steps_in_loop = Arc::clone(&steps);
        let controller = CaptureLoopController::start("endless", move |_| {
            *steps_in_loop.lock().unwrap() += 1;
            thread::sleep(Duration::from_millis(1));
            LoopAction::Continue
        })
        .unwrap();
        thread::sleep(Duration::from_millis(10));
        drop(controller);

        let after_drop = *steps.lock().unwrap();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(*steps.lock().unwrap(), after_drop);
    }
}
