//! Error taxonomy for the memory engine.
//!
//! Every fallible operation returns [`Result<T>`]. Errors are tagged with the
//! collaborator that produced them so callers (HTTP layers, the admin CLI)
//! can map failures to the right status code / exit code without re-deriving
//! that information from the error message.

use crate::ids::MemoryId;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The external collaborator a [`Error::Unavailable`] or backend-logic error
/// originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vector,
    Graph,
    Row,
    Ephemeral,
    Llm,
    Embedding,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Backend::Vector => "vector",
            Backend::Graph => "graph",
            Backend::Row => "row",
            Backend::Ephemeral => "ephemeral",
            Backend::Llm => "llm",
            Backend::Embedding => "embedding",
        };
        f.write_str(s)
    }
}

/// Error kinds for the memory engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required backend could not be reached at all (network/timeout).
    #[error("{0} backend unavailable: {1}")]
    Unavailable(Backend, String),

    /// A backend rejected a well-formed request (bad query, constraint
    /// violation). Never silent: always logged by the caller before
    /// propagating.
    #[error("{0} backend error: {1}")]
    BackendLogic(Backend, String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced memory/relationship/session/user does not exist.
    #[error("not found: {0}")]
    NotFound(MemoryId),

    /// Anything else internal that doesn't fit the above.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the operation (after backoff, external to this
    /// crate) might succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Unavailable(_, _))
    }

    /// The admin CLI exit code this error maps to (§6 exit codes).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Unavailable(_, _) => 3,
            Error::InvalidInput(_) => 2,
            Error::NotFound(_) | Error::BackendLogic(_, _) | Error::Internal(_) | Error::Serialization(_) => 1,
        }
    }
}
