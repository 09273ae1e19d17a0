//! Knob and channel schemas for deterministic subsystems.
//!
//! A knob is a named, typed, range-constrained configuration input. Values
//! are tagged variants carrying their own schema, validated at assignment
//! time rather than accepted untyped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised when validating a knob assignment against its descriptor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KnobError {
    /// The supplied value's type does not match the knob's declared type.
    #[error("knob expects {expected:?}, got {got:?}")]
    TypeMismatch {
        /// Declared type.
        expected: KnobType,
        /// Type of the rejected value.
        got: KnobType,
    },

    /// A numeric value fell outside the declared range.
    #[error("value {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        /// Rejected value.
        value: f64,
        /// Lower bound (inclusive).
        min: f64,
        /// Upper bound (inclusive).
        max: f64,
    },

    /// A choice value is not one of the declared options.
    #[error("choice {value:?} not among allowed options")]
    InvalidChoice {
        /// Rejected choice.
        value: String,
    },

    /// The value could not be interpreted as any knob type.
    #[error("unsupported value for knob assignment")]
    Unsupported,
}

/// Declared type of a knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnobType {
    /// Floating-point number.
    Number,
    /// Boolean switch.
    Boolean,
    /// Free-form text.
    Text,
    /// One of a fixed set of options.
    Choice,
}

/// A typed knob value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KnobValue {
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
    /// Text value.
    Text(String),
    /// Enumerated choice.
    Choice(String),
}

impl KnobValue {
    /// The tag of this value.
    #[must_use]
    pub fn knob_type(&self) -> KnobType {
        match self {
            Self::Number(_) => KnobType::Number,
            Self::Boolean(_) => KnobType::Boolean,
            Self::Text(_) => KnobType::Text,
            Self::Choice(_) => KnobType::Choice,
        }
    }

    /// Interpret a JSON value as a knob value of the expected type.
    ///
    /// Returns `None` when the JSON shape cannot represent the expected
    /// type (e.g. an object or array).
    #[must_use]
    pub fn from_json(value: &Value, expected: KnobType) -> Option<Self> {
        match (expected, value) {
            (KnobType::Number, Value::Number(n)) => n.as_f64().map(Self::Number),
            (KnobType::Boolean, Value::Bool(b)) => Some(Self::Boolean(*b)),
            (KnobType::Text, Value::String(s)) => Some(Self::Text(s.clone())),
            (KnobType::Choice, Value::String(s)) => Some(Self::Choice(s.clone())),
            _ => None,
        }
    }

    /// Numeric view of the value, if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Constraint attached to a knob descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum KnobConstraint {
    /// No constraint beyond the declared type.
    #[default]
    None,
    /// Inclusive numeric range.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Fixed set of allowed choices.
    OneOf(Vec<String>),
}

/// Schema of one deterministic-system input knob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobDescriptor {
    /// Human-readable name.
    pub name: String,
    /// What the knob controls.
    pub description: String,
    /// Declared value type.
    pub knob_type: KnobType,
    /// Default value applied at registration.
    pub default: KnobValue,
    /// Constraint validated at assignment time.
    pub constraint: KnobConstraint,
    /// Domain category used by route discovery (e.g. `economic`).
    pub category: String,
}

impl KnobDescriptor {
    /// Validate a candidate value against this descriptor.
    pub fn validate(&self, value: &KnobValue) -> Result<(), KnobError> {
        if value.knob_type() != self.knob_type {
            return Err(KnobError::TypeMismatch {
                expected: self.knob_type,
                got: value.knob_type(),
            });
        }
        match (&self.constraint, value) {
            (KnobConstraint::Range { min, max }, KnobValue::Number(n)) => {
                if n < min || n > max {
                    return Err(KnobError::OutOfRange {
                        value: *n,
                        min: *min,
                        max: *max,
                    });
                }
            }
            (KnobConstraint::OneOf(options), KnobValue::Choice(c)) => {
                if !options.contains(c) {
                    return Err(KnobError::InvalidChoice { value: c.clone() });
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Flags describing who consumes an output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsumerFlags {
    /// Consumable by heuristic systems as decision context.
    pub heuristic: bool,
    /// Exposed to reporting/presentation layers outside the core.
    pub reporting: bool,
}

/// Schema of one deterministic-system output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Human-readable name.
    pub name: String,
    /// What the channel carries.
    pub description: String,
    /// Data type label (free-form, e.g. `ratio`, `index`).
    pub data_type: String,
    /// Domain category used by route discovery.
    pub category: String,
    /// Consumer flags.
    pub consumers: ConsumerFlags,
}
