//! Flow records and orchestrator metrics.

use shared_types::{ConnectionId, FlowId, Payload, PriorityClass, SystemId, Timestamp};
use std::time::Duration;

/// Default retry budget per flow.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt delivery timeout.
pub const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a flow. Transitions are monotonic:
/// `Pending → Processing → {Completed | Retrying → Processing | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// Accepted, waiting in a queue.
    Pending,
    /// An attempt is in progress.
    Processing,
    /// Delivered. Terminal.
    Completed,
    /// Failed retryably, waiting out the backoff delay.
    Retrying,
    /// Retries exhausted or not retryable. Terminal.
    Failed,
}

impl FlowStatus {
    /// Whether the flow will never change state again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Caller-supplied flow parameters.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Dispatch priority.
    pub priority: PriorityClass,
    /// Retry budget.
    pub max_retries: u32,
    /// Per-attempt delivery timeout.
    pub timeout: Duration,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            priority: PriorityClass::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_FLOW_TIMEOUT,
        }
    }
}

/// One discrete payload delivery attempt chain.
#[derive(Debug, Clone)]
pub struct Flow {
    /// Flow id.
    pub id: FlowId,
    /// Originating system.
    pub source: SystemId,
    /// Destination system.
    pub target: SystemId,
    /// Connection the flow travels over.
    pub connection_id: ConnectionId,
    /// Payload as submitted (pre-transformation).
    pub payload: Payload,
    /// Dispatch priority.
    pub priority: PriorityClass,
    /// Lifecycle state.
    pub status: FlowStatus,
    /// Retries performed so far. Attempts = `retry_count + 1`.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Per-attempt delivery timeout.
    pub timeout: Duration,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last state change.
    pub updated_at: Timestamp,
    /// Time the flow reached a terminal state.
    pub completed_at: Option<Timestamp>,
    /// Most recent attempt error.
    pub last_error: Option<String>,
    /// Monotonic arrival sequence number, used for conflict tie-breaking.
    pub arrival: u64,
}

/// Counters accumulated over the orchestrator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrchestratorMetrics {
    /// Flows accepted.
    pub total_flows: u64,
    /// Flows that reached `Completed`.
    pub succeeded: u64,
    /// Flows that reached `Failed`.
    pub failed: u64,
    /// Conflicted field groups resolved.
    pub conflicts_resolved: u64,
    /// Rolling average processing latency of completed flows (ms).
    pub avg_processing_ms: f64,
}

impl OrchestratorMetrics {
    /// Fold one completed flow's latency into the rolling average.
    pub fn record_success(&mut self, latency_ms: u64) {
        let total = self.avg_processing_ms * self.succeeded as f64 + latency_ms as f64;
        self.succeeded += 1;
        self.avg_processing_ms = total / self.succeeded as f64;
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorStatus {
    /// Lifetime counters.
    pub metrics: OrchestratorMetrics,
    /// Non-terminal flows.
    pub active_flows: usize,
    /// Flows waiting in the high-priority queue.
    pub high_queue_len: usize,
    /// Flows waiting in the batch queue.
    pub batch_queue_len: usize,
    /// Transformation cache entries.
    pub cache_size: usize,
    /// Systems with a running periodic schedule.
    pub scheduled_systems: usize,
    /// Registered custom transforms.
    pub custom_transforms: usize,
}
