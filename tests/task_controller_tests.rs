// Integration tests for the task lifecycle: submit preconditions, the
// polling loop, terminal statuses, and the optimistic feedback buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use reqgenome::{
    AnalysisBackend, ApiError, AppSession, GenomeStore, HistoryEntry, RequirementGenome,
    Resolution, ResolutionKind, SessionEvent, TaskError, TaskStatus, TranscriptionBackend,
    BOOTSTRAP_PROMPT,
};

const FAST_POLL: Duration = Duration::from_millis(10);

/// Analysis backend that replays a scripted sequence of poll responses
struct ScriptedAnalysis {
    submissions: Mutex<Vec<String>>,
    statuses: Mutex<VecDeque<TaskStatus>>,
    polls: AtomicUsize,
    fail_submit: bool,
}

impl ScriptedAnalysis {
    fn new(statuses: Vec<TaskStatus>) -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into()),
            polls: AtomicUsize::new(0),
            fail_submit: false,
        })
    }

    fn failing_submit() -> Arc<Self> {
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            polls: AtomicUsize::new(0),
            fail_submit: true,
        })
    }

    fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedAnalysis {
    async fn submit_feedback(
        &self,
        feedback: &str,
        _state: &RequirementGenome,
    ) -> Result<String, ApiError> {
        if self.fail_submit {
            return Err(ApiError::Status(
                reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        self.submissions.lock().unwrap().push(feedback.to_string());
        Ok("task-1".to_string())
    }

    async fn poll_status(&self, _task_id: &str) -> Result<TaskStatus, ApiError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        Ok(next.unwrap_or(TaskStatus::Processing))
    }
}

/// Transcription backend that is never reached in these tests
struct NoTranscription;

#[async_trait]
impl TranscriptionBackend for NoTranscription {
    async fn transcribe(&self, _wav_bytes: Vec<u8>) -> Result<String, ApiError> {
        panic!("transcription should not run in task tests")
    }
}

fn session_with(
    backend: Arc<ScriptedAnalysis>,
) -> Result<(AppSession, mpsc::Receiver<SessionEvent>, tempfile::TempDir)> {
    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(GenomeStore::open(dir.path())?);
    let (session, events) =
        AppSession::new(store, backend, Arc::new(NoTranscription), FAST_POLL);
    Ok((session, events, dir))
}

fn completed_status(round: u32) -> TaskStatus {
    TaskStatus::Completed(Resolution {
        round,
        document: Some(serde_json::json!({ "project": { "name": "Todo" } })),
        clarifications_needed: None,
        updated_state: Some(RequirementGenome {
            round,
            requirements_summary: "a todo app".to_string(),
            ..RequirementGenome::default()
        }),
    })
}

async fn wait_for_idle(session: &AppSession) {
    timeout(Duration::from_secs(2), async {
        while session.is_generating() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task never became idle");
}

#[tokio::test]
async fn completed_round_appends_history_and_replaces_genome() -> Result<()> {
    let backend = ScriptedAnalysis::new(vec![TaskStatus::Processing, completed_status(1)]);
    let (session, mut events, _dir) = session_with(Arc::clone(&backend))?;

    session.push_feedback("Build a todo app");
    let task_id = session.submit().await?;
    assert_eq!(task_id.as_deref(), Some("task-1"));

    // Buffer cleared optimistically on successful submission
    assert!(session.pending_feedback().is_empty());

    let resolved = timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::RoundResolved { round, kind }) => break (round, kind),
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await?;
    assert_eq!(resolved, (1, ResolutionKind::Completed));

    wait_for_idle(&session).await;

    let store = session.store();
    assert_eq!(store.history_len(), 1);
    assert_eq!(store.genome().round, 1);
    assert_eq!(session.task_id(), None);
    assert_eq!(backend.submissions(), vec!["Build a todo app".to_string()]);
    Ok(())
}

#[tokio::test]
async fn failed_task_clears_task_and_leaves_state_untouched() -> Result<()> {
    let backend = ScriptedAnalysis::new(vec![TaskStatus::Failed {
        error: Some("LLM timeout".to_string()),
    }]);
    let (session, mut events, _dir) = session_with(backend)?;

    session.push_feedback("anything");
    session.submit().await?;

    let message = timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Some(SessionEvent::TaskFailed { message }) => break message,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    })
    .await?;
    assert_eq!(message, "LLM timeout");

    wait_for_idle(&session).await;

    let store = session.store();
    assert_eq!(store.history_len(), 0);
    assert_eq!(store.genome(), RequirementGenome::default());
    assert_eq!(session.task_id(), None);
    Ok(())
}

#[tokio::test]
async fn clarifying_stops_polling_and_archives_the_round() -> Result<()> {
    let backend = ScriptedAnalysis::new(vec![TaskStatus::Clarifying(Resolution {
        round: 1,
        document: None,
        clarifications_needed: Some(vec!["Which platforms?".to_string()]),
        updated_state: None,
    })]);
    let (session, _events, _dir) = session_with(Arc::clone(&backend))?;

    session.push_feedback("Build something");
    session.submit().await?;
    wait_for_idle(&session).await;

    assert_eq!(session.store().history_len(), 1);
    // No updated_state on this clarifying round: genome untouched
    assert_eq!(session.store().genome().round, 0);
    assert_eq!(session.task_id(), None);

    // The loop stopped at the terminal status; no further polls fire
    let polls = backend.poll_count();
    tokio::time::sleep(FAST_POLL * 5).await;
    assert_eq!(backend.poll_count(), polls);
    Ok(())
}

#[tokio::test]
async fn empty_feedback_past_round_zero_is_a_local_no_op() -> Result<()> {
    let backend = ScriptedAnalysis::new(vec![]);
    let (session, _events, _dir) = session_with(Arc::clone(&backend))?;

    // Seed the store past round 0
    session.store().apply_resolution(HistoryEntry {
        status: ResolutionKind::Completed,
        resolution: Resolution {
            round: 1,
            updated_state: Some(RequirementGenome {
                round: 1,
                ..RequirementGenome::default()
            }),
            ..Resolution::default()
        },
    });

    let outcome = session.submit().await?;

    assert_eq!(outcome, None);
    assert!(backend.submissions().is_empty(), "no network call expected");
    assert!(session.store().status().is_none(), "no state change expected");
    Ok(())
}

#[tokio::test]
async fn empty_feedback_at_round_zero_submits_bootstrap_prompt() -> Result<()> {
    let backend = ScriptedAnalysis::new(vec![completed_status(1)]);
    let (session, _events, _dir) = session_with(Arc::clone(&backend))?;

    let outcome = session.submit().await?;

    assert!(outcome.is_some());
    assert_eq!(backend.submissions(), vec![BOOTSTRAP_PROMPT.to_string()]);
    wait_for_idle(&session).await;
    Ok(())
}

#[tokio::test]
async fn failed_submission_restores_prior_status_and_keeps_feedback() -> Result<()> {
    let backend = ScriptedAnalysis::failing_submit();
    let (session, _events, _dir) = session_with(backend)?;

    session.push_feedback("keep me");
    let result = session.submit().await;

    assert!(matches!(result, Err(TaskError::Submission(_))));
    // The optimistic `queued` status was reverted
    assert!(session.store().status().is_none());
    assert_eq!(session.task_id(), None);
    assert!(!session.is_generating());
    // The buffer is only cleared on success
    assert_eq!(session.pending_feedback(), "keep me");
    Ok(())
}

#[tokio::test]
async fn second_submission_is_rejected_while_a_task_is_active() -> Result<()> {
    // The scripted backend never reaches a terminal status here
    let backend = ScriptedAnalysis::new(vec![]);
    let (session, _events, _dir) = session_with(backend)?;

    session.push_feedback("first");
    session.submit().await?;

    session.push_feedback("second");
    let result = session.submit().await;
    assert!(matches!(result, Err(TaskError::TaskActive)));

    session.shutdown();
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_submissions_accept_at_most_one_task() -> Result<()> {
    for _ in 0..200 {
        let backend = ScriptedAnalysis::new(vec![]);
        let (session, _events, _dir) = session_with(Arc::clone(&backend))?;
        let session = Arc::new(session);
        session.push_feedback("contended");

        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let submissions: Vec<_> = (0..2)
            .map(|_| {
                let session = Arc::clone(&session);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    session.submit().await
                })
            })
            .collect();

        let mut accepted = 0;
        for submission in submissions {
            if matches!(submission.await?, Ok(Some(_))) {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1, "exactly one racing submission may win");
        assert_eq!(backend.submissions().len(), 1);
        session.shutdown();
    }
    Ok(())
}

#[tokio::test]
async fn transient_poll_failures_do_not_stop_the_loop() -> Result<()> {
    /// Fails the first poll, then resolves
    struct FlakyAnalysis {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl AnalysisBackend for FlakyAnalysis {
        async fn submit_feedback(
            &self,
            _feedback: &str,
            _state: &RequirementGenome,
        ) -> Result<String, ApiError> {
            Ok("task-1".to_string())
        }

        async fn poll_status(&self, _task_id: &str) -> Result<TaskStatus, ApiError> {
            if self.polls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ApiError::Status(reqwest::StatusCode::BAD_GATEWAY))
            } else {
                Ok(TaskStatus::Completed(Resolution {
                    round: 1,
                    ..Resolution::default()
                }))
            }
        }
    }

    let dir = tempfile::TempDir::new()?;
    let store = Arc::new(GenomeStore::open(dir.path())?);
    let (session, _events) = AppSession::new(
        store,
        Arc::new(FlakyAnalysis {
            polls: AtomicUsize::new(0),
        }),
        Arc::new(NoTranscription),
        FAST_POLL,
    );

    session.push_feedback("resilient");
    session.submit().await?;
    wait_for_idle(&session).await;

    assert_eq!(session.store().history_len(), 1);
    Ok(())
}
