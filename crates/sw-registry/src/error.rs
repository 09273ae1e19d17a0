//! Registry error types.

use shared_types::{ConnectionId, ConnectionKind, SystemId};
use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No registration exists for the id.
    #[error("system not registered: {0}")]
    NotFound(SystemId),

    /// A registration with the same id already exists.
    #[error("system already registered: {0}")]
    DuplicateSystem(SystemId),

    /// No connection exists for the id.
    #[error("connection not registered: {0}")]
    ConnectionNotFound(ConnectionId),

    /// The endpoints belong to different simulation instances.
    #[error("systems {source_id} and {target_id} belong to different instances")]
    CrossInstance {
        /// Source system.
        source_id: SystemId,
        /// Target system.
        target_id: SystemId,
    },

    /// A declared connection kind contradicts the endpoint kinds.
    #[error("declared kind {declared:?} contradicts endpoint kinds ({resolved:?})")]
    KindMismatch {
        /// Kind the caller declared.
        declared: ConnectionKind,
        /// Kind resolved from the endpoints.
        resolved: ConnectionKind,
    },
}
