//! Structured outcomes handed to the output layer.

use serde::{Deserialize, Serialize};

use crate::http::{HttpRequest, HttpResponse};

/// Outcome of one step. Immutable once appended to a chain result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionResult {
    pub step_id: String,
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepExecutionResult {
    /// Failure recorded before a request could be built; request and response are empty placeholders.
    pub fn preparation_failure(step_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            request: HttpRequest::default(),
            response: HttpResponse::default(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a chain run. Holds results for every step that was attempted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainExecutionResult {
    pub chain_name: String,
    pub success: bool,
    pub steps: Vec<StepExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChainExecutionResult {
    /// Looks up an attempted step by id.
    pub fn step(&self, step_id: &str) -> Option<&StepExecutionResult> {
        self.steps.iter().find(|step| step.step_id == step_id)
    }
}
