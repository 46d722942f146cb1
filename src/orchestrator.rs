// =============================================================================
// Bounded Task Orchestrator — named tasks under per-task and global deadlines
// =============================================================================
//
// Each task runs on its own tokio task and reports back over a channel.  The
// supervisor waits until every task has reported or the global deadline
// passes, then cancels whatever is still running.
//
// Guarantee: every requested task name has exactly one entry in the result
// map.  A task that times out, fails, panics or is skipped gets its fixed
// placeholder value instead of being dropped.
//
// Per-task state machine:
//
//   Pending -> Running -> Completed | TimedOut | Failed
//   Pending -> Skipped
//
// Cancellation is best-effort: a cancelled task's future is dropped at its
// next await point and its late result, if any, is discarded.
// =============================================================================

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default deadline for the whole batch.
pub const GLOBAL_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

/// Terminal result for one task name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult<T> {
    pub value: T,
    pub status: TaskStatus,
    pub timed_out: bool,
    /// Failure or skip reason, when the value is a placeholder.
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl<T> TaskResult<T> {
    pub fn is_placeholder(&self) -> bool {
        self.status != TaskStatus::Completed
    }
}

enum Work<T> {
    Run(BoxFuture<'static, Result<T>>),
    Skip(String),
}

/// A named unit of work plus the value to use if it does not complete.
pub struct TaskSpec<T> {
    name: String,
    timeout: Option<Duration>,
    work: Work<T>,
    placeholder: T,
}

impl<T> TaskSpec<T> {
    pub fn new<F>(name: impl Into<String>, future: F, placeholder: T) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            timeout: None,
            work: Work::Run(future.boxed()),
            placeholder,
        }
    }

    /// A task that is never executed; its placeholder is recorded as skipped.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>, placeholder: T) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            work: Work::Skip(reason.into()),
            placeholder,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

enum Outcome<T> {
    Done(T),
    Failed(String),
    TimedOut,
}

// =============================================================================
// TaskOrchestrator
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct TaskOrchestrator {
    global_timeout: Duration,
}

impl Default for TaskOrchestrator {
    fn default() -> Self {
        Self::new(Duration::from_secs(GLOBAL_TIMEOUT_SECS))
    }
}

impl TaskOrchestrator {
    pub fn new(global_timeout: Duration) -> Self {
        Self { global_timeout }
    }

    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    /// Run every task concurrently and return one terminal result per name.
    /// Duplicate names keep the first spec.
    pub async fn run<T>(&self, tasks: Vec<TaskSpec<T>>) -> BTreeMap<String, TaskResult<T>>
    where
        T: Clone + Send + 'static,
    {
        let started = Instant::now();
        let deadline = started + self.global_timeout;
        let cancel = CancellationToken::new();
        // Dropping this future early still stops every spawned task.
        let _cancel_on_drop = cancel.clone().drop_guard();
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Outcome<T>, u64)>();

        let mut placeholders: BTreeMap<String, T> = BTreeMap::new();
        let mut status: BTreeMap<String, TaskStatus> = BTreeMap::new();
        let mut results: BTreeMap<String, TaskResult<T>> = BTreeMap::new();

        for spec in tasks {
            if placeholders.contains_key(&spec.name) {
                warn!(task = %spec.name, "duplicate task name ignored");
                continue;
            }
            let TaskSpec {
                name,
                timeout,
                work,
                placeholder,
            } = spec;
            status.insert(name.clone(), TaskStatus::Pending);

            match work {
                Work::Skip(reason) => {
                    info!(task = %name, reason = %reason, "task skipped");
                    status.insert(name.clone(), TaskStatus::Skipped);
                    results.insert(
                        name.clone(),
                        TaskResult {
                            value: placeholder.clone(),
                            status: TaskStatus::Skipped,
                            timed_out: false,
                            error: Some(reason),
                            elapsed_ms: 0,
                        },
                    );
                }
                Work::Run(future) => {
                    status.insert(name.clone(), TaskStatus::Running);
                    spawn_task(name.clone(), future, timeout, cancel.child_token(), tx.clone());
                }
            }
            placeholders.insert(name, placeholder);
        }
        drop(tx);

        let mut running = status.values().filter(|s| **s == TaskStatus::Running).count();
        while running > 0 {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((name, outcome, elapsed_ms))) => {
                    if status.get(&name) != Some(&TaskStatus::Running) {
                        continue;
                    }
                    let Some(placeholder) = placeholders.get(&name) else {
                        continue;
                    };
                    let result = match outcome {
                        Outcome::Done(value) => TaskResult {
                            value,
                            status: TaskStatus::Completed,
                            timed_out: false,
                            error: None,
                            elapsed_ms,
                        },
                        Outcome::Failed(error) => {
                            warn!(task = %name, error = %error, "task failed, using placeholder");
                            TaskResult {
                                value: placeholder.clone(),
                                status: TaskStatus::Failed,
                                timed_out: false,
                                error: Some(error),
                                elapsed_ms,
                            }
                        }
                        Outcome::TimedOut => {
                            warn!(task = %name, elapsed_ms, "task timed out, using placeholder");
                            TaskResult {
                                value: placeholder.clone(),
                                status: TaskStatus::TimedOut,
                                timed_out: true,
                                error: Some("task deadline exceeded".to_string()),
                                elapsed_ms,
                            }
                        }
                    };
                    status.insert(name.clone(), result.status);
                    results.insert(name, result);
                    running -= 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        timeout_ms = self.global_timeout.as_millis() as u64,
                        outstanding = running,
                        "global deadline reached"
                    );
                    break;
                }
            }
        }
        cancel.cancel();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        for (name, placeholder) in placeholders {
            results.entry(name).or_insert_with_key(|name| {
                warn!(task = %name, "task did not report before deadline, using placeholder");
                TaskResult {
                    value: placeholder,
                    status: TaskStatus::TimedOut,
                    timed_out: true,
                    error: Some("global deadline exceeded".to_string()),
                    elapsed_ms,
                }
            });
        }

        debug!(tasks = results.len(), elapsed_ms, "orchestrator batch complete");
        results
    }
}

fn spawn_task<T>(
    name: String,
    future: BoxFuture<'static, Result<T>>,
    timeout: Option<Duration>,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<(String, Outcome<T>, u64)>,
) where
    T: Send + 'static,
{
    tokio::spawn(async move {
        let started = Instant::now();
        let guarded = AssertUnwindSafe(future).catch_unwind();
        let bounded = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, guarded).await.ok(),
                None => Some(guarded.await),
            }
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => {
                debug!(task = %name, "task cancelled");
                return;
            }
            r = bounded => match r {
                Some(Ok(Ok(value))) => Outcome::Done(value),
                Some(Ok(Err(e))) => Outcome::Failed(format!("{e:#}")),
                Some(Err(_)) => Outcome::Failed("task panicked".to_string()),
                None => Outcome::TimedOut,
            },
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        // The supervisor may already have given up on this task.
        let _ = tx.send((name, outcome, elapsed_ms));
    });
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    async fn sleep_then(secs: u64, value: &'static str) -> Result<&'static str> {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn slow_task_is_marked_timed_out() {
        let orch = TaskOrchestrator::default();
        let results = orch
            .run(vec![
                TaskSpec::new("text", sleep_then(1, "text-done"), "text-placeholder"),
                TaskSpec::new("stock", sleep_then(30, "stock-done"), "stock-placeholder")
                    .with_timeout(Duration::from_secs(5)),
            ])
            .await;

        assert_eq!(results.len(), 2);
        let text = &results["text"];
        assert_eq!(text.status, TaskStatus::Completed);
        assert_eq!(text.value, "text-done");

        let stock = &results["stock"];
        assert_eq!(stock.status, TaskStatus::TimedOut);
        assert!(stock.timed_out);
        assert_eq!(stock.value, "stock-placeholder");
    }

    #[tokio::test(start_paused = true)]
    async fn global_deadline_fills_missing_results() {
        let orch = TaskOrchestrator::new(Duration::from_secs(15));
        let started = Instant::now();
        let results = orch
            .run(vec![TaskSpec::new("stock", sleep_then(60, "late"), "placeholder")])
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
        let stock = &results["stock"];
        assert!(stock.timed_out);
        assert_eq!(stock.status, TaskStatus::TimedOut);
        assert_eq!(stock.value, "placeholder");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_work_never_finishes() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let work = async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1u32)
        };
        let results = TaskOrchestrator::new(Duration::from_secs(2))
            .run(vec![TaskSpec::new("slow", work, 0u32)])
            .await;
        assert!(results["slow"].timed_out);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_batch_cancels_spawned_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let work = async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(1u32)
        };
        let orchestrator = TaskOrchestrator::new(Duration::from_secs(300));
        let outer = tokio::time::timeout(
            Duration::from_secs(1),
            orchestrator.run(vec![TaskSpec::new("slow", work, 0u32)]),
        )
        .await;
        assert!(outer.is_err());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn errors_and_panics_become_failed_placeholders() {
        let failing = async { anyhow::bail!("upstream exploded") };
        let panicking = async {
            let v: Vec<i32> = Vec::new();
            Ok(v[3])
        };
        let results = TaskOrchestrator::default()
            .run(vec![
                TaskSpec::new("failing", failing, -1i32),
                TaskSpec::new("panicking", panicking, -2i32),
            ])
            .await;

        let failing = &results["failing"];
        assert_eq!(failing.status, TaskStatus::Failed);
        assert_eq!(failing.value, -1);
        assert!(!failing.timed_out);
        assert!(failing.error.as_deref().unwrap_or_default().contains("exploded"));

        assert_eq!(results["panicking"].status, TaskStatus::Failed);
        assert_eq!(results["panicking"].value, -2);
    }

    #[tokio::test]
    async fn skipped_task_never_runs() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let results = TaskOrchestrator::default()
            .run(vec![
                TaskSpec::new(
                    "text",
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok("analysed")
                    },
                    "placeholder",
                ),
                TaskSpec::skipped("stock", "skipped_for_performance", "skipped"),
            ])
            .await;

        assert!(ran.load(Ordering::SeqCst));
        let stock = &results["stock"];
        assert_eq!(stock.status, TaskStatus::Skipped);
        assert_eq!(stock.error.as_deref(), Some("skipped_for_performance"));
        assert!(stock.status.is_terminal());
    }

    #[tokio::test]
    async fn empty_batch_returns_immediately() {
        let results: BTreeMap<String, TaskResult<u8>> =
            TaskOrchestrator::default().run(Vec::new()).await;
        assert!(results.is_empty());
    }
}
