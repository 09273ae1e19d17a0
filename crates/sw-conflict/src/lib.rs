//! # Conflict Resolver
//!
//! When several flows in one batch write overlapping fields on the same
//! target subsystem, exactly one value per field may be delivered. The
//! resolver picks that value under a configured [`ResolutionStrategy`].
//!
//! Resolution is pure: the orchestrator collects the competing
//! [`Contribution`]s and applies the winning value; nothing here touches
//! queues or subsystems.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{FlowId, PriorityClass, SystemId, Timestamp};

/// Strategy used to pick a winner among conflicting contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Highest priority class wins; ties broken by arrival order.
    #[default]
    Priority,
    /// Highest connection weight wins; ties broken by arrival order.
    Weight,
    /// Most recent timestamp wins.
    Latest,
    /// Mean of numeric contributions. Non-numeric fields keep the first
    /// (earliest-arrival) conflicting value; callers needing deterministic
    /// non-numeric outcomes should use `Priority` or `Latest`.
    Average,
}

/// One flow's competing write to a conflicted field.
#[derive(Debug, Clone)]
pub struct Contribution {
    /// Flow making the write.
    pub flow: FlowId,
    /// System the flow originated from.
    pub source: SystemId,
    /// Priority class of the flow.
    pub priority: PriorityClass,
    /// Weight of the connection carrying the flow.
    pub weight: f64,
    /// Creation timestamp of the flow.
    pub timestamp: Timestamp,
    /// Arrival sequence number (monotonic per orchestrator).
    pub arrival: u64,
    /// The value the flow wants to write.
    pub value: Value,
}

/// Outcome of resolving one conflicted field.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Value to deliver.
    pub value: Value,
    /// Flow credited with the win.
    pub winner: FlowId,
}

/// Resolver configured with one strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    strategy: ResolutionStrategy,
}

impl ConflictResolver {
    /// Create a resolver using the given strategy.
    #[must_use]
    pub fn new(strategy: ResolutionStrategy) -> Self {
        Self { strategy }
    }

    /// The configured strategy.
    #[must_use]
    pub fn strategy(&self) -> ResolutionStrategy {
        self.strategy
    }

    /// Resolve one conflicted field.
    ///
    /// Returns `None` for an empty contribution set. A single contribution
    /// wins trivially under every strategy.
    #[must_use]
    pub fn resolve(&self, contributions: &[Contribution]) -> Option<Resolution> {
        let winner = match self.strategy {
            ResolutionStrategy::Priority => contributions.iter().max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    // Earlier arrival wins ties, so compare reversed.
                    .then(b.arrival.cmp(&a.arrival))
            }),
            ResolutionStrategy::Weight => contributions.iter().max_by(|a, b| {
                a.weight
                    .total_cmp(&b.weight)
                    .then(b.arrival.cmp(&a.arrival))
            }),
            ResolutionStrategy::Latest => contributions.iter().max_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then(a.arrival.cmp(&b.arrival))
            }),
            ResolutionStrategy::Average => return Self::resolve_average(contributions),
        }?;
        Some(Resolution {
            value: winner.value.clone(),
            winner: winner.flow,
        })
    }

    fn resolve_average(contributions: &[Contribution]) -> Option<Resolution> {
        let first = contributions.iter().min_by_key(|c| c.arrival)?;

        let numeric: Vec<f64> = contributions
            .iter()
            .filter_map(|c| c.value.as_f64())
            .collect();

        if numeric.is_empty() {
            return Some(Resolution {
                value: first.value.clone(),
                winner: first.flow,
            });
        }

        let mean = numeric.iter().sum::<f64>() / numeric.len() as f64;
        let value = serde_json::Number::from_f64(mean)
            .map(Value::Number)
            .unwrap_or_else(|| first.value.clone());
        Some(Resolution {
            value,
            winner: first.flow,
        })
    }
}
