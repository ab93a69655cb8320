//! Errors raised while resolving or invoking an action

use thiserror::Error;

/// Failure vocabulary of an [`ActionInvoker`](crate::ActionInvoker)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("No such component: {0}")]
    NoSuchComponent(String),

    #[error("No such action '{action}' on component '{component}'")]
    NoSuchAction { component: String, action: String },

    #[error("No compatible method for '{component}.{action}': {reason}")]
    NoCompatibleMethod {
        component: String,
        action: String,
        reason: String,
    },

    /// The action body itself failed
    #[error("Action '{component}.{action}' failed: {message}")]
    InternalComponent {
        component: String,
        action: String,
        message: String,
    },
}

impl InvokeError {
    /// Resolution errors prevent a queue from being scheduled at all,
    /// while internal failures are only counted in statistics.
    pub fn is_resolution_error(&self) -> bool {
        !matches!(self, InvokeError::InternalComponent { .. })
    }
}

pub type InvokeResult<T> = std::result::Result<T, InvokeError>;
