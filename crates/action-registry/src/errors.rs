use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid parameters for '{action}': {reason}")]
    InvalidParameters { action: String, reason: String },

    #[error("handler for '{action}' returned an unsupported result: {detail}")]
    InvalidHandlerResult { action: String, detail: String },

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{0}' is already registered")]
    DuplicateAction(String),

    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

impl ActionError {
    pub fn invalid_parameters(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Errors that indicate a malformed proposal rather than a page failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ActionError::InvalidParameters { .. } | ActionError::UnknownAction(_)
        )
    }

    /// Registry misuse that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ActionError::DuplicateAction(_) | ActionError::InvalidHandlerResult { .. }
        )
    }
}
