//! Error types for node-register.

use thiserror::Error;

/// Result type alias for node-register operations.
pub type RegisterResult<T> = Result<T, RegisterError>;

/// Errors raised while reconciling membership into the registry.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// Invalid startup configuration. Fatal.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A remote call failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// The registry already holds an entry with this name.
    #[error("registry entry already exists: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Reverse lookup of a member address failed.
    #[error("unable to resolve {address}: {reason}")]
    Resolution { address: String, reason: String },

    /// The member did not pass its health probe this tick.
    #[error("member {0} is unhealthy, deferring registration")]
    Unhealthy(String),
}

impl RegisterError {
    /// Whether the next tick may succeed where this one failed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            RegisterError::Transport(_)
                | RegisterError::Unhealthy(_)
                | RegisterError::Resolution { .. }
        )
    }

    /// Absence is a valid outcome for lookups and deletes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegisterError::NotFound(_))
    }
}
