//! Catalog entries: registrations and connections.

use serde::{Deserialize, Serialize};
use shared_types::{
    ChannelDescriptor, ConnectionId, ConnectionKind, InstanceId, KnobDescriptor, PriorityClass,
    ScopeCategory, SystemId, SystemKind, SystemStatus, Timestamp, TransformationRule,
};
use std::collections::BTreeMap;
use std::time::Duration;

/// Declared interface of a registered subsystem, tagged by kind.
///
/// Descriptors are read from the subsystem instance at registration time;
/// the registry never invents them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemProfile {
    /// Decision-generating subsystem.
    Heuristic {
        /// Capability labels matched against knob ids during discovery.
        capabilities: Vec<String>,
        /// Input labels matched against output channel ids during discovery.
        input_requirements: Vec<String>,
    },
    /// Simulation subsystem with typed knobs and output channels.
    Deterministic {
        /// Input knob schema, keyed by knob id.
        knobs: BTreeMap<String, KnobDescriptor>,
        /// Output channel schema, keyed by channel id.
        channels: BTreeMap<String, ChannelDescriptor>,
    },
}

impl SystemProfile {
    /// Kind tag of this profile.
    #[must_use]
    pub fn kind(&self) -> SystemKind {
        match self {
            Self::Heuristic { .. } => SystemKind::Heuristic,
            Self::Deterministic { .. } => SystemKind::Deterministic,
        }
    }
}

/// Caller-supplied registration parameters.
#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    /// Visibility scope.
    pub scope: ScopeCategory,
    /// Owning instance. `None` means globally shared.
    pub instance: Option<InstanceId>,
    /// Periodic execution opt-in: the orchestrator schedules a tick task at
    /// this interval when set.
    pub update_frequency: Option<Duration>,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            scope: ScopeCategory::Internal,
            instance: None,
            update_frequency: None,
        }
    }
}

/// One catalog entry.
#[derive(Debug, Clone)]
pub struct SystemRegistration {
    /// System id (unique across the catalog).
    pub id: SystemId,
    /// Declared interface.
    pub profile: SystemProfile,
    /// Visibility scope.
    pub scope: ScopeCategory,
    /// Owning instance, if scoped.
    pub instance: Option<InstanceId>,
    /// Periodic execution interval, if opted in.
    pub update_frequency: Option<Duration>,
    /// Administrative status.
    pub status: SystemStatus,
    /// Registration time.
    pub registered_at: Timestamp,
    /// Last recorded activity.
    pub last_active: Timestamp,
}

impl SystemRegistration {
    /// Kind of the registered subsystem.
    #[must_use]
    pub fn kind(&self) -> SystemKind {
        self.profile.kind()
    }

    /// Whether two registrations may be connected across ownership scopes.
    ///
    /// Pairs with different non-`None` instance ids belong to different
    /// simulation instances and must not exchange data.
    #[must_use]
    pub fn shares_scope_with(&self, other: &SystemRegistration) -> bool {
        match (&self.instance, &other.instance) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Usage statistics of one connection, updated by the orchestrator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Flows completed over this connection.
    pub flow_count: u64,
    /// Rolling average end-to-end latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Last completion time.
    pub last_used: Option<Timestamp>,
}

impl ConnectionStats {
    /// Fold one completed flow into the rolling average.
    pub fn record(&mut self, latency_ms: u64, at: Timestamp) {
        let total = self.avg_latency_ms * self.flow_count as f64 + latency_ms as f64;
        self.flow_count += 1;
        self.avg_latency_ms = total / self.flow_count as f64;
        self.last_used = Some(at);
    }
}

/// Caller-supplied connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Source field name to target field name.
    pub field_mapping: BTreeMap<String, String>,
    /// Ordered transformation pipeline applied before the field mapping.
    pub transformations: Vec<TransformationRule>,
    /// Default priority of flows over this connection.
    pub priority: PriorityClass,
    /// Disabled connections reject flows immediately.
    pub enabled: bool,
    /// Weight in `[0, 1]`, used by the `weight` conflict strategy.
    pub weight: f64,
    /// Declared direction kind. When set, registration fails if it
    /// contradicts the endpoint kinds.
    pub declared_kind: Option<ConnectionKind>,
    /// True when created by automatic route discovery.
    pub auto_discovered: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            field_mapping: BTreeMap::new(),
            transformations: Vec::new(),
            priority: PriorityClass::default(),
            enabled: true,
            weight: 0.5,
            declared_kind: None,
            auto_discovered: false,
        }
    }
}

/// A directed connection between two registered systems.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Deterministic id for the ordered (source, target) pair.
    pub id: ConnectionId,
    /// Source system.
    pub source: SystemId,
    /// Target system.
    pub target: SystemId,
    /// Direction-typed kind resolved from the endpoint kinds.
    pub kind: ConnectionKind,
    /// Source field name to target field name.
    pub field_mapping: BTreeMap<String, String>,
    /// Ordered transformation pipeline.
    pub transformations: Vec<TransformationRule>,
    /// Default flow priority.
    pub priority: PriorityClass,
    /// Disabled connections reject flows immediately.
    pub enabled: bool,
    /// Weight in `[0, 1]`.
    pub weight: f64,
    /// True when created by automatic route discovery.
    pub auto_discovered: bool,
    /// Usage statistics.
    pub stats: ConnectionStats,
}

/// Incoming and outgoing connections of one system.
#[derive(Debug, Clone, Default)]
pub struct SystemConnections {
    /// Connections where the system is the target.
    pub incoming: Vec<Connection>,
    /// Connections where the system is the source.
    pub outgoing: Vec<Connection>,
}

/// Catalog size snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    /// Registered systems.
    pub systems: usize,
    /// Registered connections.
    pub connections: usize,
}
