use serde::{Deserialize, Serialize};

/// Request for human input raised by `ask_human`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInputRequest {
    pub prompt: String,
    pub input_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Outcome of one executed action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    #[serde(default)]
    pub is_done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub include_in_memory: bool,
    #[serde(default)]
    pub requires_user_action: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input_request: Option<UserInputRequest>,
}

impl ActionResult {
    pub fn extracted(content: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Extracted content that should be carried into the agent's memory.
    pub fn in_memory(content: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(content.into()),
            include_in_memory: true,
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            include_in_memory: true,
            ..Self::default()
        }
    }

    pub fn done(text: impl Into<String>, success: bool) -> Self {
        Self {
            is_done: true,
            success: Some(success),
            extracted_content: Some(text.into()),
            include_in_memory: true,
            ..Self::default()
        }
    }

    pub fn user_input(request: UserInputRequest) -> Self {
        Self {
            extracted_content: Some(request.prompt.clone()),
            include_in_memory: true,
            requires_user_action: true,
            user_input_request: Some(request),
            ..Self::default()
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Results after which a plan must not continue.
    pub fn is_terminal(&self) -> bool {
        self.is_done || self.has_error() || self.requires_user_action
    }
}
