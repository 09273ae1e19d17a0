//! Transformation pipelines and the bounded memo cache.
//!
//! A connection's rules run in declared order over the flow payload, then
//! the field mapping renames (and narrows to) the mapped keys. The full
//! result is memoized per (connection, payload) so repeated identical flows
//! skip recomputation.

use crate::error::FlowError;
use serde_json::{Number, Value};
use shared_types::{
    AggregateMethod, ConnectionId, ConvertTarget, Payload, TransformationRule,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Bound on the transformation cache.
pub const CACHE_CAPACITY: usize = 1_000;

/// A named transform closure registered with the orchestrator.
pub type CustomTransform = Arc<dyn Fn(&Payload) -> Result<Payload, String> + Send + Sync>;

/// Apply a connection's rules in order.
pub fn apply_rules(
    payload: &Payload,
    rules: &[TransformationRule],
    customs: &HashMap<String, CustomTransform>,
) -> Result<Payload, FlowError> {
    let mut data = payload.clone();
    for rule in rules {
        data = apply_rule(data, rule, customs)?;
    }
    Ok(data)
}

fn apply_rule(
    data: Payload,
    rule: &TransformationRule,
    customs: &HashMap<String, CustomTransform>,
) -> Result<Payload, FlowError> {
    match rule {
        TransformationRule::Scale { factor } => Ok(map_numeric(data, |n| n * factor)),
        TransformationRule::Normalize { min, max } => {
            Ok(map_numeric(data, |n| n.clamp(*min, *max)))
        }
        TransformationRule::Filter { criteria } => Ok(filter_fields(data, criteria)),
        TransformationRule::Aggregate { method } => Ok(aggregate_fields(data, *method)),
        TransformationRule::Convert { target } => Ok(convert_fields(data, *target)),
        TransformationRule::Custom { name } => {
            let transform = customs.get(name).ok_or_else(|| {
                FlowError::Transformation(format!("unknown custom transform: {name}"))
            })?;
            transform(&data).map_err(FlowError::Transformation)
        }
    }
}

/// Rename payload keys through the mapping. An empty mapping passes the
/// payload through unchanged; a non-empty mapping also narrows the payload
/// to the mapped keys.
#[must_use]
pub fn apply_field_mapping(data: Payload, mapping: &BTreeMap<String, String>) -> Payload {
    if mapping.is_empty() {
        return data;
    }
    let mut mapped = Payload::new();
    for (source_key, target_key) in mapping {
        if let Some(value) = data.get(source_key) {
            mapped.insert(target_key.clone(), value.clone());
        }
    }
    mapped
}

fn map_numeric(data: Payload, f: impl Fn(f64) -> f64) -> Payload {
    data.into_iter()
        .map(|(key, value)| {
            let value = match value.as_f64() {
                Some(n) => Number::from_f64(f(n)).map(Value::Number).unwrap_or(value),
                None => value,
            };
            (key, value)
        })
        .collect()
}

fn filter_fields(data: Payload, criteria: &BTreeMap<String, Value>) -> Payload {
    data.into_iter()
        .filter(|(key, value)| {
            criteria.iter().all(|(criterion, expected)| {
                match criterion.as_str() {
                    "key" => expected.as_str() == Some(key.as_str()),
                    "value" => expected == value,
                    _ => false,
                }
            })
        })
        .collect()
}

fn aggregate_fields(data: Payload, method: AggregateMethod) -> Payload {
    data.into_iter()
        .map(|(key, value)| {
            let value = match &value {
                Value::Array(items) => {
                    let numbers: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
                    aggregate_numbers(&numbers, method)
                        .and_then(Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(value)
                }
                _ => value,
            };
            (key, value)
        })
        .collect()
}

fn aggregate_numbers(numbers: &[f64], method: AggregateMethod) -> Option<f64> {
    match method {
        AggregateMethod::Sum => Some(numbers.iter().sum()),
        AggregateMethod::Average => {
            if numbers.is_empty() {
                Some(0.0)
            } else {
                Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateMethod::Max => numbers.iter().copied().reduce(f64::max),
        AggregateMethod::Min => numbers.iter().copied().reduce(f64::min),
    }
}

fn convert_fields(data: Payload, target: ConvertTarget) -> Payload {
    data.into_iter()
        .map(|(key, value)| (key, convert_value(value, target)))
        .collect()
}

fn convert_value(value: Value, target: ConvertTarget) -> Value {
    match target {
        ConvertTarget::Number => match &value {
            Value::Number(_) => value,
            Value::Bool(b) => Value::Number(Number::from(u8::from(*b))),
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(value),
            _ => value,
        },
        ConvertTarget::Text => match &value {
            Value::String(_) => value,
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            _ => value,
        },
        ConvertTarget::Boolean => match &value {
            Value::Bool(_) => value,
            Value::Number(n) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
            Value::String(s) => Value::Bool(!s.is_empty()),
            Value::Null => Value::Bool(false),
            _ => value,
        },
    }
}

/// Order-insensitive fingerprint of a payload's serialized form.
pub fn payload_fingerprint(payload: &Payload) -> Result<u64, FlowError> {
    let serialized = serde_json::to_string(payload)
        .map_err(|e| FlowError::Transformation(format!("unserializable payload: {e}")))?;
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    Ok(hasher.finish())
}

/// Bounded memo cache keyed by (connection, payload fingerprint).
/// Insertion-ordered; the oldest entry is evicted at capacity.
pub struct TransformCache {
    entries: HashMap<(ConnectionId, u64), Payload>,
    order: VecDeque<(ConnectionId, u64)>,
    capacity: usize,
}

impl TransformCache {
    /// Cache with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    /// Cache with a specific capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Cached result for a key, if present.
    #[must_use]
    pub fn get(&self, connection: &ConnectionId, fingerprint: u64) -> Option<Payload> {
        self.entries
            .get(&(connection.clone(), fingerprint))
            .cloned()
    }

    /// Store a result, evicting the oldest entry at capacity.
    pub fn insert(&mut self, connection: ConnectionId, fingerprint: u64, result: Payload) {
        let key = (connection, fingerprint);
        if self.entries.contains_key(&key) {
            self.entries.insert(key, result);
            return;
        }
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, result);
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}
