use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::AnalysisBackend;
use crate::error::TaskError;
use crate::events::SessionEvent;
use crate::genome::{GenomeStore, HistoryEntry, TaskStatus};
use crate::session::FeedbackBuffer;

/// Prompt used when the very first round is submitted with no feedback,
/// letting the backend bootstrap a default analysis
pub const BOOTSTRAP_PROMPT: &str = "Please describe the project you have in mind.";

/// Drives one analysis task at a time: submits feedback plus the current
/// genome, then polls the task on a fixed interval until a terminal status.
///
/// Polling is single-flight — one spawned loop per task, each poll awaited
/// before the next tick — so history append order equals poll-arrival
/// order. The task identifier is cleared the instant a terminal status is
/// observed.
pub struct TaskController {
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<GenomeStore>,
    feedback: Arc<FeedbackBuffer>,
    events: mpsc::Sender<SessionEvent>,
    poll_interval: Duration,
    generating: Arc<AtomicBool>,
    active_task: Arc<Mutex<Option<String>>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TaskController {
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        store: Arc<GenomeStore>,
        feedback: Arc<FeedbackBuffer>,
        events: mpsc::Sender<SessionEvent>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            feedback,
            events,
            poll_interval,
            generating: Arc::new(AtomicBool::new(false)),
            active_task: Arc::new(Mutex::new(None)),
            poller: Mutex::new(None),
        }
    }

    /// Atomically claim the single-task slot; fails with `TaskActive`
    /// when a task is already in flight. A claim is followed by
    /// [`submit_reserved`], which gives the slot back on every
    /// non-starting path.
    pub(crate) fn reserve(&self) -> Result<(), TaskError> {
        if self
            .generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TaskError::TaskActive);
        }
        Ok(())
    }

    pub(crate) fn release(&self) {
        self.generating.store(false, Ordering::SeqCst);
    }

    /// Submit the pending feedback buffer and start polling.
    ///
    /// Returns `Ok(None)` without any network call when the buffer is
    /// empty past round 0. At round 0 an empty buffer is replaced by
    /// [`BOOTSTRAP_PROMPT`]. On success the buffer is cleared immediately
    /// (optimistically), regardless of the eventual task outcome.
    pub async fn submit(&self) -> Result<Option<String>, TaskError> {
        self.reserve()?;
        self.submit_reserved().await
    }

    /// The body of [`submit`], entered with the task slot already held
    pub(crate) async fn submit_reserved(&self) -> Result<Option<String>, TaskError> {
        let pending = self.feedback.peek();
        let trimmed = pending.trim();
        let genome = self.store.genome();

        if trimmed.is_empty() && genome.round > 0 {
            self.release();
            info!("Empty feedback past round 0, nothing to submit");
            return Ok(None);
        }

        let prompt = if trimmed.is_empty() {
            BOOTSTRAP_PROMPT
        } else {
            trimmed
        };

        let prior_status = self.store.status();
        self.store.set_status(Some(TaskStatus::Queued));

        let task_id = match self.backend.submit_feedback(prompt, &genome).await {
            Ok(task_id) => task_id,
            Err(e) => {
                // No task started: restore the status shown before the
                // optimistic `queued`
                self.store.set_status(prior_status);
                self.release();
                return Err(e.into());
            }
        };

        self.feedback.clear();
        *lock(&self.active_task) = Some(task_id.clone());

        info!("Task {} submitted at round {}", task_id, genome.round);

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.backend),
            Arc::clone(&self.store),
            self.events.clone(),
            Arc::clone(&self.generating),
            Arc::clone(&self.active_task),
            task_id.clone(),
            self.poll_interval,
        ));
        *lock(&self.poller) = Some(handle);

        Ok(Some(task_id))
    }

    /// Identifier of the in-flight task, if any
    pub fn task_id(&self) -> Option<String> {
        lock(&self.active_task).clone()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    /// Cancel the poll loop and forget the task. Used on teardown; the
    /// backend task itself is left to finish or rot server-side.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }
        *lock(&self.active_task) = None;
        self.generating.store(false, Ordering::SeqCst);
    }
}

impl Drop for TaskController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Single-flight polling loop for one task.
///
/// Transient poll failures are logged and the loop continues; only a
/// terminal status (or teardown) ends it. `clarifying` is treated as
/// terminal for polling: repeated identical polls would otherwise append
/// duplicate history entries, and the next submission starts a fresh task
/// anyway.
async fn poll_loop(
    backend: Arc<dyn AnalysisBackend>,
    store: Arc<GenomeStore>,
    events: mpsc::Sender<SessionEvent>,
    generating: Arc<AtomicBool>,
    active_task: Arc<Mutex<Option<String>>>,
    task_id: String,
    poll_interval: Duration,
) {
    loop {
        tokio::time::sleep(poll_interval).await;

        let status = match backend.poll_status(&task_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Poll failed for task {}: {}", task_id, e);
                continue;
            }
        };

        store.set_status(Some(status.clone()));
        let _ = events.send(SessionEvent::StatusChanged(status.clone())).await;

        match &status {
            TaskStatus::Queued | TaskStatus::Processing => continue,
            TaskStatus::Completed(_) | TaskStatus::Clarifying(_) => {
                // from_status is guaranteed Some for these two variants
                if let Some(entry) = HistoryEntry::from_status(&status) {
                    let round = entry.resolution.round;
                    let kind = entry.status;
                    store.apply_resolution(entry);
                    let _ = events
                        .send(SessionEvent::RoundResolved { round, kind })
                        .await;
                    info!("Task {} resolved: round {}", task_id, round);
                }
                break;
            }
            TaskStatus::Failed { error } => {
                let message = error
                    .clone()
                    .unwrap_or_else(|| "analysis task failed".to_string());
                warn!("Task {} failed: {}", task_id, message);
                let _ = events.send(SessionEvent::TaskFailed { message }).await;
                break;
            }
        }
    }

    *lock(&active_task) = None;
    generating.store(false, Ordering::SeqCst);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
