// Executor/janitor constants (no magic values)
use std::time::Duration;

/// Sleep duration when no task messages are available
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a consume/claim error before retry
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default retry base delay for exponential backoff (spec §4.6)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Default retry budget per task (spec §6 `task_retry_budget_default`)
pub const DEFAULT_RETRY_BUDGET: i32 = 3;

/// Threshold above which the executor starts emitting periodic heartbeats
/// for a running handler (spec §4.6: "> a configurable threshold, e.g. 5 min")
pub const HEARTBEAT_EMIT_THRESHOLD_MS: i64 = 5 * 60 * 1000;

/// How often the executor ticks the heartbeat once the threshold is crossed
pub const HEARTBEAT_TICK_INTERVAL_MS: i64 = 30 * 1000;

/// Default janitor sweep interval (spec §6 `janitor_interval`)
pub const DEFAULT_JANITOR_INTERVAL_MS: i64 = 60 * 1000;

/// Default heartbeat staleness timeout (spec §6 `task_heartbeat_timeout`)
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: i64 = 10 * 60 * 1000;

/// Default age before a Queued task with no discoverable broker message is
/// considered orphaned (spec §4.7 "Orphaned Queued tasks")
pub const DEFAULT_ORPHAN_TASK_AGE_MS: i64 = 5 * 60 * 1000;

/// Default age before a Queued job is considered stuck (spec §4.7 "Stuck
/// Queued jobs")
pub const DEFAULT_STUCK_JOB_AGE_MS: i64 = 5 * 60 * 1000;
