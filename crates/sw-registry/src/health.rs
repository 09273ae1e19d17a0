//! Per-system health records and the threshold model.

use shared_types::{HealthStatus, Timestamp};
use std::collections::VecDeque;

/// Error count above which a system is critical.
const CRITICAL_ERROR_THRESHOLD: u32 = 10;

/// Error count above which a system is in warning state.
const WARNING_ERROR_THRESHOLD: u32 = 5;

/// Response time (ms) above which a system is in warning state.
const WARNING_RESPONSE_MS: u64 = 1_000;

/// Bound on the recent-error log.
const RECENT_ERROR_CAPACITY: usize = 20;

/// Counter deltas merged into a health record.
#[derive(Debug, Clone, Default)]
pub struct HealthDelta {
    /// Errors observed since the last merge.
    pub errors: u32,
    /// Successes observed since the last merge.
    pub successes: u64,
    /// Most recent response time, when measured.
    pub response_time_ms: Option<u64>,
    /// Description of the most recent error, when one occurred.
    pub error_message: Option<String>,
}

impl HealthDelta {
    /// Delta for one successful operation.
    #[must_use]
    pub fn success(response_time_ms: u64) -> Self {
        Self {
            successes: 1,
            response_time_ms: Some(response_time_ms),
            ..Self::default()
        }
    }

    /// Delta for one failed operation.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            errors: 1,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One logged error with its timestamp.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    /// When the error was recorded.
    pub at: Timestamp,
    /// Error description.
    pub message: String,
}

/// Aggregated health of one registration. Created with it, destroyed with it.
#[derive(Debug, Clone)]
pub struct HealthRecord {
    /// Current status under the threshold model.
    pub status: HealthStatus,
    /// Most recent response time in milliseconds.
    pub response_time_ms: u64,
    /// Accumulated error count, decayed by successful probes.
    pub error_count: u32,
    /// Accumulated success count.
    pub success_count: u64,
    /// Bounded log of recent errors, oldest evicted.
    pub recent_errors: VecDeque<ErrorEntry>,
    /// Last time the record was updated.
    pub last_check: Timestamp,
}

impl HealthRecord {
    /// Fresh record for a newly registered system.
    #[must_use]
    pub fn new(at: Timestamp) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: 0,
            error_count: 0,
            success_count: 0,
            recent_errors: VecDeque::new(),
            last_check: at,
        }
    }

    /// Merge a delta and recompute the status.
    ///
    /// Returns the previous status so callers can detect transitions.
    pub fn merge(&mut self, delta: &HealthDelta, at: Timestamp) -> HealthStatus {
        let previous = self.status;

        self.error_count += delta.errors;
        self.success_count += delta.successes;
        if let Some(rt) = delta.response_time_ms {
            self.response_time_ms = rt;
        }
        if let Some(message) = &delta.error_message {
            if self.recent_errors.len() == RECENT_ERROR_CAPACITY {
                self.recent_errors.pop_front();
            }
            self.recent_errors.push_back(ErrorEntry {
                at,
                message: message.clone(),
            });
        }
        self.last_check = at;
        self.status = self.compute_status();
        previous
    }

    /// Decay the error count by one after a successful liveness probe.
    ///
    /// Returns the previous status.
    pub fn decay(&mut self, at: Timestamp) -> HealthStatus {
        let previous = self.status;
        self.error_count = self.error_count.saturating_sub(1);
        self.success_count += 1;
        self.last_check = at;
        self.status = self.compute_status();
        previous
    }

    fn compute_status(&self) -> HealthStatus {
        if self.error_count > CRITICAL_ERROR_THRESHOLD {
            HealthStatus::Critical
        } else if self.error_count > WARNING_ERROR_THRESHOLD
            || self.response_time_ms > WARNING_RESPONSE_MS
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}
