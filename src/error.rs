//! Error taxonomy for world orchestration.
//!
//! Each collaborator boundary has its own error enum; [`WorldError`] is the
//! type surfaced by manager and subscription operations. Malformed mentions
//! are deliberately absent: they degrade to public-broadcast semantics.

use thiserror::Error;

/// Failures reported by a storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested world or agent does not exist in storage.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Underlying filesystem failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted document could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Shorthand for a missing world.
    pub fn world_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "world",
            id: id.into(),
        }
    }

    /// Shorthand for a missing agent.
    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "agent",
            id: id.into(),
        }
    }
}

/// Failures reported by an LLM collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    /// The provider rejected or failed the request.
    #[error("provider error: {0}")]
    Provider(String),

    /// The call did not complete within the caller-supplied timeout.
    #[error("LLM call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A streaming response terminated with an error mid-flight.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Failures reported by a transport's client connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The peer has gone away.
    #[error("connection closed")]
    Closed,

    /// The frame could not be handed to the transport.
    #[error("send failed: {0}")]
    Send(String),
}

/// Top-level error for manager and subscription operations.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Missing world or agent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A world or agent with the same id already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Rejected input (empty names, bad parameters).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Subscribe attempted on a connection that is not open.
    #[error("client connection is already closed")]
    AlreadyClosed,

    /// Storage failure other than a missing entity.
    #[error(transparent)]
    Storage(StorageError),

    /// LLM failure surfaced to a direct caller.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl From<StorageError> for WorldError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => WorldError::NotFound { entity, id },
            other => WorldError::Storage(other),
        }
    }
}

impl WorldError {
    /// Shorthand for a missing world.
    pub fn world_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "world",
            id: id.into(),
        }
    }

    /// Shorthand for a missing agent.
    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "agent",
            id: id.into(),
        }
    }

    /// Whether this error denotes a missing entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorldError::NotFound { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WorldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_world_not_found() {
        let err: WorldError = StorageError::world_not_found("w1").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "world not found: w1");
    }

    #[test]
    fn test_storage_io_stays_storage_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: WorldError = StorageError::from(io).into();
        assert!(matches!(err, WorldError::Storage(StorageError::Io(_))));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_llm_timeout_display() {
        let err = LlmError::Timeout { timeout_ms: 1500 };
        assert_eq!(err.to_string(), "LLM call timed out after 1500ms");
    }
}
