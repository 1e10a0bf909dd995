use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeType {
    Success,
    Warning,
    Failure,
}

/// Envelope returned by every mutation and batch endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(rename = "type")]
    pub outcome_type: OutcomeType,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Per-identifier failure messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl OperationResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            outcome_type: OutcomeType::Success,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    pub fn warning(message: impl Into<String>, errors: BTreeMap<String, String>) -> Self {
        Self {
            outcome_type: OutcomeType::Warning,
            message: message.into(),
            data: None,
            errors: Some(errors),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            outcome_type: OutcomeType::Failure,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_errors(mut self, errors: BTreeMap<String, String>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn error_count(&self) -> usize {
        self.errors.as_ref().map_or(0, |e| e.len())
    }
}
