//! Classification enums for systems, connections, and flows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two families of registered subsystems.
///
/// Heuristic systems produce recommended parameter adjustments from
/// contextual analysis; deterministic systems expose typed knobs and
/// channels and update as a fixed function of their inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemKind {
    /// Decision-generating subsystem (capabilities + context intake).
    Heuristic,
    /// Simulation subsystem with declared knobs and output channels.
    Deterministic,
}

impl fmt::Display for SystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic => f.write_str("heuristic"),
            Self::Deterministic => f.write_str("deterministic"),
        }
    }
}

/// Visibility scope of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeCategory {
    /// Private to one simulation instance.
    Internal,
    /// Shared by all systems of one instance.
    Shared,
    /// Visible across instances.
    CrossInstance,
}

/// Administrative status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatus {
    /// Participates in scheduling and flows.
    Active,
    /// Registered but excluded from scheduling and delivery.
    Disabled,
}

/// Priority class of a connection or flow.
///
/// Ordering is significant: `Critical > High > Medium > Low`. The derived
/// `Ord` is used by the `priority` conflict strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum PriorityClass {
    /// Batch-processed, drained last.
    Low,
    /// Batch-processed.
    #[default]
    Medium,
    /// Dedicated queue, drained before every batch tick.
    High,
    /// Processed synchronously inline with `initiate_flow`.
    Critical,
}

impl PriorityClass {
    /// Numeric value used for tie-breaking and reporting (low = 1).
    #[must_use]
    pub fn value(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }
}

/// Direction-typed kind of a connection, resolved from the kinds of its
/// endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionKind {
    /// Heuristic source feeding a deterministic target's knobs.
    HeuristicToDeterministic,
    /// Deterministic outputs feeding a heuristic system's context.
    DeterministicToHeuristic,
    /// Heuristic-to-heuristic context sharing.
    HeuristicToHeuristic,
    /// Deterministic-to-deterministic chaining.
    DeterministicToDeterministic,
}

impl ConnectionKind {
    /// Resolve the connection kind from the endpoint kinds.
    #[must_use]
    pub fn from_endpoints(source: SystemKind, target: SystemKind) -> Self {
        match (source, target) {
            (SystemKind::Heuristic, SystemKind::Deterministic) => Self::HeuristicToDeterministic,
            (SystemKind::Deterministic, SystemKind::Heuristic) => Self::DeterministicToHeuristic,
            (SystemKind::Heuristic, SystemKind::Heuristic) => Self::HeuristicToHeuristic,
            (SystemKind::Deterministic, SystemKind::Deterministic) => {
                Self::DeterministicToDeterministic
            }
        }
    }
}

/// Aggregated health status of a registered subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Operating normally.
    Healthy,
    /// Elevated error count or slow responses.
    Warning,
    /// Error count above the critical threshold.
    Critical,
}
