//! The contract registered subsystems expose to the integration layer.
//!
//! The orchestrator is the only component that calls into these traits:
//! it pulls outputs on periodic ticks, pushes context into heuristic systems,
//! and assigns knob values on deterministic systems. The registry invokes
//! the optional liveness probe during health checks.

use crate::ids::SystemId;
use crate::kinds::{PriorityClass, SystemKind};
use crate::knobs::{ChannelDescriptor, KnobDescriptor, KnobError, KnobValue};
use crate::payload::Payload;
use crate::time::Timestamp;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by subsystem implementations.
#[derive(Debug, Error)]
pub enum SystemError {
    /// A knob assignment was rejected by schema validation.
    #[error("knob rejected: {0}")]
    Knob(#[from] KnobError),

    /// The subsystem refused or failed the operation.
    #[error("subsystem failure: {0}")]
    Failed(String),
}

/// Delivery metadata handed to a heuristic system along with a payload.
#[derive(Debug, Clone)]
pub struct ContextMetadata {
    /// System the payload originated from.
    pub source: SystemId,
    /// Delivery timestamp.
    pub timestamp: Timestamp,
    /// Priority class of the delivering flow.
    pub priority: PriorityClass,
}

/// Contract of a heuristic (decision-generating) subsystem.
#[async_trait]
pub trait HeuristicSystem: Send + Sync {
    /// Declared capabilities, matched against knob ids during route
    /// discovery.
    fn capabilities(&self) -> Vec<String>;

    /// Declared input requirements, matched against output channel ids
    /// during route discovery.
    fn input_requirements(&self) -> Vec<String>;

    /// Receive a payload as contextual input for the next decision cycle.
    async fn receive_context(
        &self,
        data: Payload,
        metadata: ContextMetadata,
    ) -> Result<(), SystemError>;

    /// Optional periodic processing hook. Returns the tick's recommended
    /// parameter adjustments, fanned out along outgoing connections.
    ///
    /// The default implementation produces nothing.
    async fn process_tick(&self) -> Result<Payload, SystemError> {
        Ok(Payload::new())
    }

    /// Whether this system exposes a liveness probe.
    fn supports_probe(&self) -> bool {
        false
    }

    /// Liveness probe invoked by health checks when
    /// [`supports_probe`](Self::supports_probe) is true.
    async fn probe(&self) -> Result<(), SystemError> {
        Ok(())
    }
}

/// Contract of a deterministic simulation subsystem.
#[async_trait]
pub trait DeterministicSystem: Send + Sync {
    /// Declared input knob schema. The registry reads this directly and
    /// never invents descriptors.
    fn input_knobs(&self) -> BTreeMap<String, KnobDescriptor>;

    /// Declared output channel schema.
    fn output_channels(&self) -> BTreeMap<String, ChannelDescriptor>;

    /// Assign one named knob. Implementations validate against their
    /// declared schema and reject invalid values.
    async fn set_input(
        &self,
        knob_id: &str,
        value: KnobValue,
        source: &SystemId,
    ) -> Result<(), SystemError>;

    /// Current values of the output channels, keyed by channel id.
    async fn current_outputs(&self) -> Payload;

    /// Optional periodic processing hook advancing the simulation step.
    async fn process_tick(&self) -> Result<(), SystemError> {
        Ok(())
    }

    /// Whether this system exposes a liveness probe.
    fn supports_probe(&self) -> bool {
        false
    }

    /// Liveness probe invoked by health checks when
    /// [`supports_probe`](Self::supports_probe) is true.
    async fn probe(&self) -> Result<(), SystemError> {
        Ok(())
    }
}

/// Handle to a registered subsystem instance: one polymorphic interface over
/// the two call contracts.
#[derive(Clone)]
pub enum SystemHandle {
    /// Heuristic subsystem.
    Heuristic(Arc<dyn HeuristicSystem>),
    /// Deterministic subsystem.
    Deterministic(Arc<dyn DeterministicSystem>),
}

impl SystemHandle {
    /// Kind of the wrapped subsystem.
    #[must_use]
    pub fn kind(&self) -> SystemKind {
        match self {
            Self::Heuristic(_) => SystemKind::Heuristic,
            Self::Deterministic(_) => SystemKind::Deterministic,
        }
    }

    /// Whether the wrapped subsystem exposes a liveness probe.
    #[must_use]
    pub fn supports_probe(&self) -> bool {
        match self {
            Self::Heuristic(s) => s.supports_probe(),
            Self::Deterministic(s) => s.supports_probe(),
        }
    }

    /// Invoke the wrapped subsystem's liveness probe.
    pub async fn probe(&self) -> Result<(), SystemError> {
        match self {
            Self::Heuristic(s) => s.probe().await,
            Self::Deterministic(s) => s.probe().await,
        }
    }
}

impl std::fmt::Debug for SystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SystemHandle").field(&self.kind()).finish()
    }
}
