//! Automatic route discovery.
//!
//! When a system registers, it is matched against every existing system of
//! the complementary kind in the same ownership scope. Heuristic
//! capabilities are matched against deterministic knob ids, and
//! deterministic output channels against heuristic input requirements; each
//! match becomes one field-mapping entry.

use shared_types::SystemId;
use std::collections::BTreeMap;
use sw_registry::{SystemProfile, SystemRegistration};

/// Per-match increment of the connection weight, capped at 1.0.
const MATCH_WEIGHT: f64 = 0.2;

/// Domain synonym groups. Two terms match when each mentions a member of
/// the same group.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &[
        "economic", "economy", "financial", "fiscal", "monetary", "tax", "budget",
    ],
    &["population", "demographic", "citizen", "people"],
    &["military", "defense", "security", "armed"],
    &["trade", "commerce", "business", "market"],
    &["policy", "governance", "government", "political"],
];

fn normalize(term: &str) -> String {
    term.to_lowercase().replace(['_', '-'], " ")
}

/// Whether two field names refer to the same concept: equal after
/// normalization, substring containment, or shared synonym group.
#[must_use]
pub fn semantic_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);

    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }

    SYNONYM_GROUPS.iter().any(|group| {
        let a_hit = group.iter().any(|term| a.contains(term));
        let b_hit = group.iter().any(|term| b.contains(term));
        a_hit && b_hit
    })
}

/// A connection proposed by discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCandidate {
    /// Proposed source.
    pub source: SystemId,
    /// Proposed target.
    pub target: SystemId,
    /// Matched source field to target field.
    pub field_mapping: BTreeMap<String, String>,
    /// `min(1, matches * 0.2)`.
    pub weight: f64,
}

fn match_fields<'a>(
    sources: impl IntoIterator<Item = &'a str>,
    targets: &[&str],
) -> Option<(BTreeMap<String, String>, f64)> {
    let mut mapping = BTreeMap::new();
    for source_field in sources {
        for target_field in targets {
            if semantic_match(source_field, target_field) {
                mapping.insert(source_field.to_string(), (*target_field).to_string());
            }
        }
    }
    if mapping.is_empty() {
        return None;
    }
    let weight = (mapping.len() as f64 * MATCH_WEIGHT).min(1.0);
    Some((mapping, weight))
}

fn routes_between(
    heuristic: &SystemRegistration,
    deterministic: &SystemRegistration,
) -> Vec<RouteCandidate> {
    let SystemProfile::Heuristic {
        capabilities,
        input_requirements,
    } = &heuristic.profile
    else {
        return Vec::new();
    };
    let SystemProfile::Deterministic { knobs, channels } = &deterministic.profile else {
        return Vec::new();
    };

    let mut candidates = Vec::new();

    // Heuristic capabilities drive deterministic knobs.
    let knob_ids: Vec<&str> = knobs.keys().map(String::as_str).collect();
    if let Some((field_mapping, weight)) =
        match_fields(capabilities.iter().map(String::as_str), &knob_ids)
    {
        candidates.push(RouteCandidate {
            source: heuristic.id.clone(),
            target: deterministic.id.clone(),
            field_mapping,
            weight,
        });
    }

    // Deterministic channels feed heuristic context.
    let requirement_ids: Vec<&str> = input_requirements.iter().map(String::as_str).collect();
    if let Some((field_mapping, weight)) =
        match_fields(channels.keys().map(String::as_str), &requirement_ids)
    {
        candidates.push(RouteCandidate {
            source: deterministic.id.clone(),
            target: heuristic.id.clone(),
            field_mapping,
            weight,
        });
    }

    candidates
}

/// Compute every route the new system should be connected by, in both
/// directions, against the existing catalog.
#[must_use]
pub fn candidate_routes(
    new_system: &SystemRegistration,
    existing: &[SystemRegistration],
) -> Vec<RouteCandidate> {
    let mut candidates = Vec::new();
    for other in existing {
        if other.id == new_system.id
            || other.kind() == new_system.kind()
            || !new_system.shares_scope_with(other)
        {
            continue;
        }
        let pair = match &new_system.profile {
            SystemProfile::Heuristic { .. } => routes_between(new_system, other),
            SystemProfile::Deterministic { .. } => routes_between(other, new_system),
        };
        candidates.extend(pair);
    }
    candidates
}
