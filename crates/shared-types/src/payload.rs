//! Flow payloads.

use serde_json::{Map, Value};

/// Payload moved by a flow: named fields with JSON values.
///
/// Field names are the vocabulary matched by route discovery and rewritten
/// by a connection's field mapping.
pub type Payload = Map<String, Value>;

/// Build a payload from `(name, value)` pairs. Convenience for callers and
/// tests.
pub fn payload_from<I, K>(entries: I) -> Payload
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect()
}
