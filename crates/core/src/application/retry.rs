// Retry policy for task handler failures (spec §4.6 "Retry classification").
//
// Adapted from the teacher's job-level exponential-backoff-with-jitter
// policy (ADR-002) down to the task level: Transient and Throttling
// outcomes consume a per-task retry budget with exponential backoff;
// Permanent bypasses the budget entirely and fails the task immediately.

use crate::domain::Task;
use crate::port::{HandlerError, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// What the executor should do with a task after a handler error.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff delay (ms).
    Retry(i64),
    /// Retry budget exhausted, or the error was permanent: fail the task.
    Failed,
}

pub struct RetryPolicy {
    time_provider: Arc<dyn TimeProvider>,
    base_delay_ms: i64,
    retry_budget: i32,
}

impl RetryPolicy {
    pub fn new(time_provider: Arc<dyn TimeProvider>, base_delay_ms: i64, retry_budget: i32) -> Self {
        Self {
            time_provider,
            base_delay_ms,
            retry_budget,
        }
    }

    /// Classifies a handler's failure against the task's remaining retry
    /// budget (spec §4.6: "Transient/Throttling consume retry budget...
    /// Permanent bypasses retry, goes straight to Failed").
    pub fn should_retry(&self, task: &Task, error: &HandlerError) -> RetryDecision {
        if matches!(error, HandlerError::Permanent(_)) {
            warn!(task_id = %task.task_id, "permanent handler error, skipping retry budget");
            return RetryDecision::Failed;
        }

        if task.retry_count >= self.retry_budget {
            warn!(
                task_id = %task.task_id,
                retry_count = task.retry_count,
                retry_budget = self.retry_budget,
                "retry budget exhausted"
            );
            return RetryDecision::Failed;
        }

        let exponent = task.retry_count;
        let base_delay_ms = self.base_delay_ms as f64 * 2f64.powi(exponent);

        // Jitter seeded from the task's own id so retries of the same
        // task are deterministic across replays, but different tasks
        // don't all retry in lockstep.
        let jitter_seed = task.task_id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9..=1.1
        let delay_ms = (base_delay_ms * jitter_factor) as i64;

        info!(
            task_id = %task.task_id,
            retry_count = task.retry_count,
            delay_ms,
            "scheduling task retry"
        );

        RetryDecision::Retry(delay_ms)
    }

    /// Job-level deadline check (spec §4.3 SPEC_FULL resolved open
    /// question): the janitor consults this before synthesizing
    /// StageDone or seeding further stages.
    pub fn is_job_deadline_exceeded(&self, deadline: Option<i64>) -> bool {
        match deadline {
            Some(d) => self.time_provider.now_millis() > d,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::SystemTimeProvider;

    fn make_task(retry_count: i32) -> Task {
        let mut task = Task::new(
            "job123456789abcd-s1-0",
            "job123456789abcd",
            "ingest_vector",
            "fetch_tile",
            1,
            0,
            serde_json::json!({}),
            0,
        );
        task.retry_count = retry_count;
        task
    }

    #[test]
    fn permanent_errors_skip_the_retry_budget() {
        let policy = RetryPolicy::new(Arc::new(SystemTimeProvider), 1000, 3);
        let task = make_task(0);
        let decision = policy.should_retry(&task, &HandlerError::Permanent("bad input".into()));
        assert_eq!(decision, RetryDecision::Failed);
    }

    #[test]
    fn transient_errors_retry_until_budget_exhausted() {
        let policy = RetryPolicy::new(Arc::new(SystemTimeProvider), 1000, 3);

        for retry_count in 0..3 {
            let task = make_task(retry_count);
            let decision = policy.should_retry(&task, &HandlerError::Transient("timeout".into()));
            assert!(matches!(decision, RetryDecision::Retry(_)));
        }

        let exhausted = make_task(3);
        let decision = policy.should_retry(&exhausted, &HandlerError::Transient("timeout".into()));
        assert_eq!(decision, RetryDecision::Failed);
    }

    #[test]
    fn throttling_errors_consume_the_same_budget_as_transient() {
        let policy = RetryPolicy::new(Arc::new(SystemTimeProvider), 1000, 1);
        let exhausted = make_task(1);
        let decision = policy.should_retry(&exhausted, &HandlerError::Throttling("rate limited".into()));
        assert_eq!(decision, RetryDecision::Failed);
    }

    #[test]
    fn no_deadline_never_exceeds() {
        let policy = RetryPolicy::new(Arc::new(SystemTimeProvider), 1000, 3);
        assert!(!policy.is_job_deadline_exceeded(None));
    }

    #[test]
    fn past_deadline_exceeds() {
        let policy = RetryPolicy::new(Arc::new(SystemTimeProvider), 1000, 3);
        assert!(policy.is_job_deadline_exceeded(Some(1)));
    }
}
