//! Mock subsystems used across the integration scenarios.

use async_trait::async_trait;
use serde_json::json;
use shared_types::{
    payload::payload_from, ChannelDescriptor, ConsumerFlags, ContextMetadata,
    DeterministicSystem, HeuristicSystem, KnobConstraint, KnobDescriptor, KnobType, KnobValue,
    Payload, SystemError, SystemId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// HEURISTIC MOCK
// =============================================================================

/// A decision-generating system with an `economic_policy` capability.
///
/// Records every delivered context and emits a configurable payload from its
/// periodic tick. Failure injection flags drive the retry and health tests.
#[derive(Default)]
pub struct PolicyAdvisor {
    /// Payload returned by the next `process_tick`.
    pub next_output: Mutex<Payload>,
    /// Contexts delivered so far.
    pub received: Mutex<Vec<(Payload, ContextMetadata)>>,
    /// When set, `receive_context` refuses delivery.
    pub fail_delivery: AtomicBool,
    /// When set, `process_tick` fails.
    pub fail_tick: AtomicBool,
    /// Ticks attempted (including failed ones).
    pub tick_count: AtomicU64,
    /// Delivery attempts (including refused ones).
    pub delivery_attempts: AtomicU64,
}

impl PolicyAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advisor whose every tick recommends the given policy value.
    pub fn recommending(value: f64) -> Self {
        let advisor = Self::new();
        *advisor.next_output.lock().unwrap() =
            payload_from([("economic_policy", json!(value))]);
        advisor
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl HeuristicSystem for PolicyAdvisor {
    fn capabilities(&self) -> Vec<String> {
        vec!["economic_policy".into()]
    }

    fn input_requirements(&self) -> Vec<String> {
        vec!["market_index".into()]
    }

    async fn receive_context(
        &self,
        data: Payload,
        metadata: ContextMetadata,
    ) -> Result<(), SystemError> {
        self.delivery_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(SystemError::Failed("advisor refused context".into()));
        }
        self.received.lock().unwrap().push((data, metadata));
        Ok(())
    }

    async fn process_tick(&self) -> Result<Payload, SystemError> {
        self.tick_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_tick.load(Ordering::SeqCst) {
            return Err(SystemError::Failed("advisor tick failed".into()));
        }
        Ok(self.next_output.lock().unwrap().clone())
    }

    fn supports_probe(&self) -> bool {
        true
    }
}

// =============================================================================
// DETERMINISTIC MOCK
// =============================================================================

/// A simulation system with one `tax_rate` knob and one `market_health`
/// output channel. Knob assignments are validated against the declared
/// schema and recorded.
pub struct TaxModel {
    /// Accepted knob assignments: (knob id, value, source).
    pub assignments: Mutex<Vec<(String, KnobValue, SystemId)>>,
    /// Payload returned by `current_outputs`.
    pub outputs: Mutex<Payload>,
}

impl TaxModel {
    pub fn new() -> Self {
        Self {
            assignments: Mutex::new(Vec::new()),
            outputs: Mutex::new(payload_from([("market_health", json!(0.8))])),
        }
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.lock().unwrap().len()
    }

    fn knob_schema() -> BTreeMap<String, KnobDescriptor> {
        [(
            "tax_rate".to_string(),
            KnobDescriptor {
                name: "Tax Rate".into(),
                description: "Fraction of income collected".into(),
                knob_type: KnobType::Number,
                default: KnobValue::Number(0.1),
                constraint: KnobConstraint::Range { min: 0.0, max: 1.0 },
                category: "economic".into(),
            },
        )]
        .into()
    }
}

impl Default for TaxModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeterministicSystem for TaxModel {
    fn input_knobs(&self) -> BTreeMap<String, KnobDescriptor> {
        Self::knob_schema()
    }

    fn output_channels(&self) -> BTreeMap<String, ChannelDescriptor> {
        [(
            "market_health".to_string(),
            ChannelDescriptor {
                name: "Market Health".into(),
                description: "Composite market wellbeing index".into(),
                data_type: "ratio".into(),
                category: "economic".into(),
                consumers: ConsumerFlags {
                    heuristic: true,
                    reporting: true,
                },
            },
        )]
        .into()
    }

    async fn set_input(
        &self,
        knob_id: &str,
        value: KnobValue,
        source: &SystemId,
    ) -> Result<(), SystemError> {
        let schema = Self::knob_schema();
        let descriptor = schema
            .get(knob_id)
            .ok_or_else(|| SystemError::Failed(format!("unknown knob: {knob_id}")))?;
        descriptor.validate(&value)?;
        self.assignments
            .lock()
            .unwrap()
            .push((knob_id.to_string(), value, source.clone()));
        Ok(())
    }

    async fn current_outputs(&self) -> Payload {
        self.outputs.lock().unwrap().clone()
    }
}

// =============================================================================
// PATHOLOGICAL MOCKS
// =============================================================================

/// A heuristic system whose context intake never finishes in time.
pub struct StalledSystem {
    pub delay: Duration,
}

#[async_trait]
impl HeuristicSystem for StalledSystem {
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    fn input_requirements(&self) -> Vec<String> {
        Vec::new()
    }

    async fn receive_context(
        &self,
        _data: Payload,
        _metadata: ContextMetadata,
    ) -> Result<(), SystemError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
