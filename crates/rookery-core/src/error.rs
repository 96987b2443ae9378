//! Error taxonomy shared by the registry, router and presence layers.

use thiserror::Error;

/// Errors surfaced by the routing core.
///
/// Administrative errors (`NotFound`, `AlreadyExists`, `InvalidOperation`)
/// are reported back to the calling client with their reason text.
/// `Communication` is raised when a remote endpoint cannot be reached; the
/// router recovers from it locally by demoting the destination to a mailbox,
/// so it only escapes to callers from the login flush path.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Operation referenced an account or group that does not exist.
    #[error("no such account: {0}")]
    NotFound(String),

    /// Account or group creation with a name that is already taken.
    #[error("account name already exists: {0}")]
    AlreadyExists(String),

    /// Structurally invalid request, e.g. nesting one group in another.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Remote endpoint unreachable during delivery or login flush.
    #[error("unable to reach endpoint: {0}")]
    Communication(String),
}

impl ChatError {
    /// Stable wire identifier for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => "not_found",
            ChatError::AlreadyExists(_) => "already_exists",
            ChatError::InvalidOperation(_) => "invalid_operation",
            ChatError::Communication(_) => "communication_failure",
        }
    }
}
