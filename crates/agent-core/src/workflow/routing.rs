//! Conditional edges of the workflow graph.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorClass;
use crate::workflow::state::WorkflowState;

/// Edge taken after `evaluate_results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationRoute {
    Continue,
    Error,
    Complete,
}

/// Edge taken after `handle_errors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorRoute {
    Retry,
    Alternative,
    Escalate,
}

pub fn route_after_evaluation(state: &WorkflowState) -> EvaluationRoute {
    if state.error.is_some() {
        return EvaluationRoute::Error;
    }
    let last_terminal = state
        .last_results
        .last()
        .map(|result| result.is_terminal())
        .unwrap_or(false);
    if !state.should_continue || last_terminal {
        EvaluationRoute::Complete
    } else {
        EvaluationRoute::Continue
    }
}

/// The retry budget is checked before the error class.
pub fn route_after_error(state: &WorkflowState, max_retries: u32) -> ErrorRoute {
    if state.retry_count >= max_retries {
        return ErrorRoute::Escalate;
    }
    let class = state
        .error
        .as_ref()
        .or(state.last_error.as_ref())
        .map(|ctx| ctx.class)
        .unwrap_or(ErrorClass::Other);
    match class {
        ErrorClass::Timeout | ErrorClass::RateLimit => ErrorRoute::Retry,
        ErrorClass::Validation => ErrorRoute::Alternative,
        _ => ErrorRoute::Retry,
    }
}
