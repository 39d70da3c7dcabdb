//! Errors a command handler can raise on purpose.
//!
//! Anything else a handler returns is treated as an internal failure by the
//! invocation wrapper.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    /// A permission predicate on the command did not pass.
    #[error("Permission denied")]
    PermissionDenied,

    /// Fewer (non-empty) arguments than the command requires.
    #[error("Missing parameter")]
    MissingParameter,

    /// Domain failure with a user-facing message.
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    pub fn new(msg: impl Into<String>) -> Self {
        CommandError::Failed(msg.into())
    }
}
