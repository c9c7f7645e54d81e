//! Single-threaded task queue owning one feature's storage state.
//!
//! A [`FeatureWorker`] moves its state onto a dedicated thread and runs
//! submitted closures against it one at a time, in submission order.
//! Nothing else can reach the state, so no lock guards it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use bv_common::Result;
use thiserror::Error;
use tracing::{debug, warn, Level};

use crate::logging::{log_internal, LogTarget, MAINTAINER_TARGET};

type Task<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Why a task was not accepted (or did not complete).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("task queue is saturated")]
    Saturated,

    #[error("task queue is shut down")]
    ShutDown,

    #[error("blocking call issued from the worker thread")]
    Reentrant,

    #[error("task was dropped before completing")]
    Dropped,
}

impl SubmitError {
    /// Convert into the crate-wide error for `feature`.
    pub fn into_error(self, feature: &str) -> bv_common::Error {
        match self {
            SubmitError::Saturated => bv_common::Error::QueueSaturated {
                feature: feature.to_string(),
            },
            SubmitError::ShutDown | SubmitError::Reentrant | SubmitError::Dropped => {
                bv_common::Error::QueueShutDown {
                    feature: feature.to_string(),
                }
            }
        }
    }
}

/// Handle to a worker thread that owns a value of type `S`.
pub struct FeatureWorker<S: Send + 'static> {
    name: String,
    sender: Mutex<Option<SyncSender<Task<S>>>>,
    done: Mutex<Option<Receiver<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    abort: Arc<AtomicBool>,
    shutdown_timeout: Duration,
}

impl<S: Send + 'static> FeatureWorker<S> {
    /// Spawn a worker named `bv-<name>` owning `state`.
    ///
    /// At most `capacity` tasks wait in the queue; further submissions are
    /// rejected until it drains. Dropping the worker shuts it down with
    /// `shutdown_timeout`.
    pub fn spawn(name: &str, state: S, capacity: usize, shutdown_timeout: Duration) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Task<S>>(capacity.max(1));
        let (done_tx, done_rx) = mpsc::channel();
        let abort = Arc::new(AtomicBool::new(false));
        let abort_flag = abort.clone();
        let thread_name = format!("bv-{}", name);
        let worker_name = name.to_string();

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                run_tasks(&worker_name, state, receiver, &abort_flag);
                let _ = done_tx.send(());
            })
            .map_err(bv_common::Error::Io)?;

        debug!(worker = name, capacity, "worker started");
        Ok(FeatureWorker {
            name: name.to_string(),
            thread_id: thread.thread().id(),
            sender: Mutex::new(Some(sender)),
            done: Mutex::new(Some(done_rx)),
            thread: Mutex::new(Some(thread)),
            abort,
            shutdown_timeout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller is running on this worker's thread.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Queue `task` without waiting for it.
    pub fn submit<F>(&self, task: F) -> std::result::Result<(), SubmitError>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(SubmitError::ShutDown)?;
        sender.try_send(Box::new(task)).map_err(|e| match e {
            TrySendError::Full(_) => SubmitError::Saturated,
            TrySendError::Disconnected(_) => SubmitError::ShutDown,
        })
    }

    /// Queue `task` and block until it has run, returning its result.
    ///
    /// Calling this from the worker thread itself would wait forever on a
    /// task queued behind the caller, so it fails with `Reentrant` instead.
    pub fn submit_and_wait<F, R>(&self, task: F) -> std::result::Result<R, SubmitError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_worker_thread() {
            return Err(SubmitError::Reentrant);
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.submit(move |state| {
            let _ = reply_tx.send(task(state));
        })?;
        reply_rx.recv().map_err(|_| SubmitError::Dropped)
    }

    /// Stop accepting tasks and drain the queue.
    ///
    /// Waits at most `timeout` for queued tasks to run; whatever is still
    /// queued afterwards is dropped. Returns true if the queue drained in
    /// time.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return true;
        }
        drop(sender);

        if self.is_worker_thread() {
            // The loop ends on its own once the current task returns
            return false;
        }

        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner).take();
        let drained = match done.map(|rx| rx.recv_timeout(timeout)) {
            Some(Ok(())) | Some(Err(RecvTimeoutError::Disconnected)) | None => true,
            Some(Err(RecvTimeoutError::Timeout)) => false,
        };

        if drained {
            if let Some(thread) = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = thread.join();
            }
            debug!(worker = %self.name, "worker stopped");
        } else {
            self.abort.store(true, Ordering::SeqCst);
            warn!(
                target: MAINTAINER_TARGET,
                worker = %self.name,
                timeout_ms = timeout.as_millis() as u64,
                "worker did not drain in time, dropping remaining tasks"
            );
        }
        drained
    }
}

impl<S: Send + 'static> Drop for FeatureWorker<S> {
    fn drop(&mut self) {
        self.shutdown(self.shutdown_timeout);
    }
}

impl<S: Send + 'static> std::fmt::Debug for FeatureWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureWorker")
            .field("name", &self.name)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn run_tasks<S>(name: &str, mut state: S, receiver: Receiver<Task<S>>, abort: &AtomicBool) {
    let mut dropped = 0usize;
    while let Ok(task) = receiver.recv() {
        if abort.load(Ordering::SeqCst) {
            dropped += 1;
            continue;
        }
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(&mut state))) {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log_internal(
                Level::ERROR,
                &[LogTarget::Maintainer, LogTarget::Telemetry],
                &format!("Task on worker {} panicked: {}", name, reason),
            );
        }
    }
    if dropped > 0 {
        log_internal(
            Level::WARN,
            &[LogTarget::Maintainer, LogTarget::Telemetry],
            &format!("Worker {} dropped {} tasks after shutdown timeout", name, dropped),
        );
    }
}
