use std::fmt;

use action_registry::{ActionError, ActionResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use soulbrowser_event_bus::BusError;
use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Malformed action proposal or registry misuse.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// An action was rejected mid-plan. Carries the results produced before
    /// the rejected action.
    #[error("plan aborted after {} completed actions: {source}", .results.len())]
    ActionAborted {
        #[source]
        source: ActionError,
        results: Vec<ActionResult>,
    },

    /// The browser state provider could not produce a snapshot.
    #[error("browser state capture failed: {0}")]
    StateProvider(#[source] anyhow::Error),

    /// The planner failed to propose actions.
    #[error("planner failed: {0}")]
    Planner(#[source] anyhow::Error),

    /// Retries are used up. Carries the results produced before escalation.
    #[error("recovery exhausted after {attempts} attempts: {last_error}")]
    RecoveryExhausted {
        attempts: u32,
        last_error: String,
        results: Vec<ActionResult>,
    },

    /// Another plan or workflow is already executing.
    #[error("another run is already in progress")]
    Busy,

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl AgentError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AgentError::Action(err) if err.is_validation() => ErrorClass::Validation,
            AgentError::ActionAborted { source, .. } if source.is_validation() => {
                ErrorClass::Validation
            }
            other => ErrorClass::classify(&other.to_string()),
        }
    }

    /// Results gathered before the failure, if the variant carries any.
    pub fn partial_results(&self) -> &[ActionResult] {
        match self {
            AgentError::RecoveryExhausted { results, .. }
            | AgentError::ActionAborted { results, .. } => results,
            _ => &[],
        }
    }
}

/// Coarse error classification used by recovery and workflow routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Timeout,
    RateLimit,
    Validation,
    Navigation,
    StaleElement,
    Other,
}

static TIMEOUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)time[sd]?[ _-]?out|deadline exceeded").expect("timeout pattern"));
static RATE_LIMIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate[ _-]?limit|too many requests|\b429\b").expect("rate limit pattern")
});
static VALIDATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)invalid parameters|validation|unknown action|exactly one top-level key")
        .expect("validation pattern")
});
static NAVIGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)navigation|net::err|dns|connection (refused|reset)|\b404\b")
        .expect("navigation pattern")
});
static STALE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)stale|detached|no longer attached|element .*not found|not clickable")
        .expect("stale element pattern")
});

impl ErrorClass {
    /// Classify from error text. Checked in order: timeout, rate limit,
    /// validation, navigation, stale element.
    pub fn classify(message: &str) -> Self {
        if TIMEOUT.is_match(message) {
            ErrorClass::Timeout
        } else if RATE_LIMIT.is_match(message) {
            ErrorClass::RateLimit
        } else if VALIDATION.is_match(message) {
            ErrorClass::Validation
        } else if NAVIGATION.is_match(message) {
            ErrorClass::Navigation
        } else if STALE.is_match(message) {
            ErrorClass::StaleElement
        } else {
            ErrorClass::Other
        }
    }

    /// Failures that usually clear up on their own after a pause.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorClass::Timeout | ErrorClass::RateLimit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Timeout => "timeout",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Validation => "validation",
            ErrorClass::Navigation => "navigation",
            ErrorClass::StaleElement => "stale_element",
            ErrorClass::Other => "other",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
