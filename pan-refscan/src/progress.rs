//! Best-effort progress reporting.
//!
//! Updates travel over a small bounded channel to a dedicated thread that
//! invokes the caller's sink. [`ProgressReporter::report`] uses `try_send`, so
//! a slow sink loses updates instead of stalling ingestion.

use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};

const PROGRESS_BUFFER: usize = 16;

/// Receives `(fraction in 0..=1, message)` pairs.
pub type ProgressSink = Box<dyn FnMut(f64, &str) + Send>;

#[derive(Debug)]
struct ProgressUpdate {
    fraction: f64,
    message: String,
}

#[derive(Debug, Default)]
pub struct ProgressReporter {
    sender: Option<SyncSender<ProgressUpdate>>,
    worker: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Forward updates to `sink` on a background thread.
    ///
    /// Falls back to a silent reporter if the thread cannot be started.
    pub fn new(mut sink: ProgressSink) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<ProgressUpdate>(PROGRESS_BUFFER);
        let spawned = thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || {
                for update in receiver {
                    sink(update.fraction, &update.message);
                }
            });
        match spawned {
            Ok(worker) => Self {
                sender: Some(sender),
                worker: Some(worker),
            },
            Err(err) => {
                tracing::warn!("progress reporting disabled: {err}");
                Self::silent()
            }
        }
    }

    /// A reporter that drops every update.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Queue an update; returns `false` when it was dropped.
    pub fn report(&self, fraction: f64, message: impl Into<String>) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        let update = ProgressUpdate {
            fraction: fraction.clamp(0.0, 1.0),
            message: message.into(),
        };
        match sender.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Close the channel and wait until the sink has seen every queued update.
    pub fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
