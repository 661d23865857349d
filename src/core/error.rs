use thiserror::Error;

/// Failure taxonomy of the inbox pipeline.
///
/// `ContextLost` is raised when a page script stays unreadable after its
/// retries; the safe-evaluate bridge itself only ever hands back `None`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortalError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("execution context lost")]
    ContextLost,

    #[error("session expired (redirected to {0})")]
    SessionExpired(String),

    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),
}

impl PortalError {
    /// Session expiry ends the run; everything else is scoped to one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PortalError::SessionExpired(_))
    }
}

pub type PortalResult<T> = std::result::Result<T, PortalError>;
