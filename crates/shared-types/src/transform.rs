//! Transformation rules attached to connections.
//!
//! Rules are declarative and ordered; the orchestrator applies them to a
//! flow's payload before the connection's field mapping. `Custom` rules name
//! a closure registered with the orchestrator at runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reduction method for [`TransformationRule::Aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateMethod {
    /// Sum of numeric elements.
    Sum,
    /// Mean of numeric elements.
    Average,
    /// Maximum numeric element.
    Max,
    /// Minimum numeric element.
    Min,
}

/// Target type for [`TransformationRule::Convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConvertTarget {
    /// Coerce to a number (strings parsed, booleans 0/1).
    Number,
    /// Coerce to a display string.
    Text,
    /// Coerce to a boolean (numbers: non-zero, strings: non-empty).
    Boolean,
}

/// One step of a connection's transformation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformationRule {
    /// Multiply every numeric field by a factor.
    Scale {
        /// Multiplier.
        factor: f64,
    },
    /// Clamp every numeric field into `[min, max]`.
    Normalize {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Keep only the fields whose value equals the criteria entry.
    Filter {
        /// Field name to expected value.
        criteria: BTreeMap<String, Value>,
    },
    /// Reduce array-valued fields to a single number.
    Aggregate {
        /// Reduction method.
        method: AggregateMethod,
    },
    /// Coerce every field to the target type where possible.
    Convert {
        /// Target type.
        target: ConvertTarget,
    },
    /// Apply a named closure registered with the orchestrator.
    Custom {
        /// Registered transform name.
        name: String,
    },
}
