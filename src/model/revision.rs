use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RevisionType {
    Add,
    Modify,
    Delete,
}

impl RevisionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionType::Add => "ADD",
            RevisionType::Modify => "MODIFY",
            RevisionType::Delete => "DELETE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ADD" => Some(RevisionType::Add),
            "MODIFY" => Some(RevisionType::Modify),
            "DELETE" => Some(RevisionType::Delete),
            _ => None,
        }
    }
}

/// Who changed a record and through which operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditContext {
    pub actor: String,
    pub operation_event: String,
}

impl AuditContext {
    pub fn new(actor: impl Into<String>, operation_event: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            operation_event: operation_event.into(),
        }
    }

    pub fn system(operation_event: impl Into<String>) -> Self {
        Self::new("system", operation_event)
    }
}

/// Historical state of one entity at one audit revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSnapshot {
    pub rev: i64,
    pub revision_type: RevisionType,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub operation_event: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub old_state: Option<String>,
    pub new_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_state_display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_state_display: Option<String>,
    pub display: String,
    pub entity: Value,
}

/// One comparable field of a revision comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRow {
    pub field: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev_left_property_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev_right_property_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionComparison {
    pub entity_id: String,
    pub rev_left: i64,
    pub rev_right: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<RevisionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<RevisionSnapshot>,
    pub rows: Vec<DiffRow>,
}
