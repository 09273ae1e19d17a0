//! Events published on the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::{
    ConnectionId, ConnectionKind, FlowId, HealthStatus, InstanceId, PriorityClass, ScopeCategory,
    SystemId, SystemKind,
};

/// Aggregate per-status counts returned by a health check sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCounts {
    /// Systems currently healthy.
    pub healthy: usize,
    /// Systems in warning state.
    pub warning: usize,
    /// Systems in critical state.
    pub critical: usize,
    /// Systems whose liveness probe was invoked during the sweep.
    pub probed: usize,
}

/// All notifications published by the integration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IntegrationEvent {
    // =========================================================================
    // REGISTRY
    // =========================================================================
    /// A subsystem registered and its health record was created.
    SystemRegistered {
        /// Registered system.
        system_id: SystemId,
        /// Heuristic or deterministic.
        kind: SystemKind,
        /// Visibility scope.
        scope: ScopeCategory,
        /// Owning instance, if scoped.
        instance: Option<InstanceId>,
    },

    /// A subsystem was unregistered; its connections were cascaded away.
    SystemUnregistered {
        /// Removed system.
        system_id: SystemId,
        /// Connections removed by the cascade.
        removed_connections: Vec<ConnectionId>,
    },

    // =========================================================================
    // CONNECTIONS
    // =========================================================================
    /// A connection was registered or overwritten.
    ConnectionRegistered {
        /// Connection id (deterministic for the pair).
        connection_id: ConnectionId,
        /// Source system.
        source: SystemId,
        /// Target system.
        target: SystemId,
        /// Direction-typed kind.
        kind: ConnectionKind,
        /// True when created by automatic route discovery.
        auto_discovered: bool,
    },

    // =========================================================================
    // FLOWS
    // =========================================================================
    /// A flow was accepted and dispatched to a queue or inline processing.
    FlowInitiated {
        /// Flow id.
        flow_id: FlowId,
        /// Connection carrying the flow.
        connection_id: ConnectionId,
        /// Priority class it was dispatched under.
        priority: PriorityClass,
    },

    /// A flow completed successfully.
    FlowCompleted {
        /// Flow id.
        flow_id: FlowId,
        /// Connection carrying the flow.
        connection_id: ConnectionId,
        /// End-to-end processing latency in milliseconds.
        latency_ms: u64,
    },

    /// A flow failed terminally (retries exhausted or not retryable).
    FlowFailed {
        /// Flow id.
        flow_id: FlowId,
        /// Connection carrying the flow, when one was resolved.
        connection_id: Option<ConnectionId>,
        /// Final error description.
        error: String,
        /// Retries performed before giving up.
        retries: u32,
    },

    /// Conflicting writes to one target were resolved within a batch.
    ConflictResolved {
        /// Target system whose fields conflicted.
        target: SystemId,
        /// Conflicted field names.
        fields: Vec<String>,
        /// Flow that won the resolution.
        winner: FlowId,
    },

    // =========================================================================
    // HEALTH
    // =========================================================================
    /// A system's aggregated health status changed.
    HealthUpdated {
        /// System concerned.
        system_id: SystemId,
        /// New status.
        status: HealthStatus,
    },

    /// A health check sweep finished.
    HealthCheckComplete {
        /// Aggregate counts per status.
        counts: HealthCounts,
    },
}

impl IntegrationEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::SystemRegistered { .. } | Self::SystemUnregistered { .. } => EventTopic::Registry,
            Self::ConnectionRegistered { .. } => EventTopic::Connections,
            Self::FlowInitiated { .. }
            | Self::FlowCompleted { .. }
            | Self::FlowFailed { .. }
            | Self::ConflictResolved { .. } => EventTopic::Flows,
            Self::HealthUpdated { .. } | Self::HealthCheckComplete { .. } => EventTopic::Health,
        }
    }

    /// The system the event concerns, when it concerns exactly one.
    #[must_use]
    pub fn subject(&self) -> Option<&SystemId> {
        match self {
            Self::SystemRegistered { system_id, .. }
            | Self::SystemUnregistered { system_id, .. }
            | Self::HealthUpdated { system_id, .. } => Some(system_id),
            Self::ConnectionRegistered { source, .. } => Some(source),
            Self::ConflictResolved { target, .. } => Some(target),
            Self::FlowInitiated { .. }
            | Self::FlowCompleted { .. }
            | Self::FlowFailed { .. }
            | Self::HealthCheckComplete { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Registration and unregistration.
    Registry,
    /// Connection table changes.
    Connections,
    /// Flow lifecycle and conflict resolutions.
    Flows,
    /// Health updates and check sweeps.
    Health,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Subject systems to include. Empty means all subjects.
    pub subjects: Vec<SystemId>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            subjects: Vec::new(),
        }
    }

    /// Create a filter for events concerning specific systems.
    #[must_use]
    pub fn subjects(subjects: Vec<SystemId>) -> Self {
        Self {
            topics: Vec::new(),
            subjects,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &IntegrationEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let subject_match = self.subjects.is_empty()
            || event
                .subject()
                .is_some_and(|s| self.subjects.contains(s));

        topic_match && subject_match
    }
}
