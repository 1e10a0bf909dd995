use log::warn;
use serde_json::Value;

use crate::error::EngineError;
use crate::logic::property_filter::value_to_text;
use crate::model::{DiffRow, EntitySchema, FieldDef, RevisionSnapshot};
use crate::store::traits::ReferenceResolver;

/// Shown when a referenced row cannot be resolved at all.
pub const NOT_AVAILABLE: &str = "N/A";

/// Field-by-field comparison of two revision snapshots.
pub struct RevisionDiffEngine;

impl RevisionDiffEngine {
    /// One row per comparable field of `schema`. Each side is filled only
    /// when a snapshot for that revision number exists.
    pub async fn diff<R: ReferenceResolver + ?Sized>(
        resolver: &R,
        schema: &EntitySchema,
        snapshots: &[RevisionSnapshot],
        rev_left: i64,
        rev_right: i64,
    ) -> Vec<DiffRow> {
        let left = snapshots.iter().find(|s| s.rev == rev_left);
        let right = snapshots.iter().find(|s| s.rev == rev_right);

        let mut rows = Vec::new();
        for field in schema.comparable_fields() {
            let rev_left_property_value = match left {
                Some(snapshot) => Some(Self::render(resolver, field, snapshot).await),
                None => None,
            };
            let rev_right_property_value = match right {
                Some(snapshot) => Some(Self::render(resolver, field, snapshot).await),
                None => None,
            };
            rows.push(DiffRow {
                field: field.name.to_string(),
                name: field.label.to_string(),
                rev_left_property_value,
                rev_right_property_value,
            });
        }
        rows
    }

    async fn render<R: ReferenceResolver + ?Sized>(
        resolver: &R,
        field: &FieldDef,
        snapshot: &RevisionSnapshot,
    ) -> String {
        let value = snapshot.entity.get(field.name).unwrap_or(&Value::Null);
        if value.is_null() {
            return String::new();
        }

        match field.reference_target() {
            Some(target) => match reference_id(value) {
                Some(id) => Self::render_reference(resolver, target, &id).await,
                None => String::new(),
            },
            None => value_to_text(value),
        }
    }

    /// Label of a referenced row. A stale reference falls back to the
    /// generic lookup by the type and id it carries; anything else renders
    /// as `N/A`.
    pub async fn render_reference<R: ReferenceResolver + ?Sized>(
        resolver: &R,
        entity_type: &str,
        id: &str,
    ) -> String {
        let err = match resolver.load_display(entity_type, id).await {
            Ok(display) => return display,
            Err(err) => EngineError::from(err),
        };

        let (stale_type, stale_id) = match err {
            EngineError::StaleReference { entity_type, id } => (entity_type, id),
            other => {
                warn!("Failed to render {} '{}': {}", entity_type, id, other);
                return NOT_AVAILABLE.to_string();
            }
        };

        warn!(
            "Reference {} '{}' is stale, retrying generic lookup",
            stale_type, stale_id
        );
        match resolver.find_entity_display(&stale_type, &stale_id).await {
            Ok(Some(display)) => display,
            Ok(None) => NOT_AVAILABLE.to_string(),
            Err(e) => {
                warn!("Generic lookup of {} '{}' failed: {:#}", stale_type, stale_id, e);
                NOT_AVAILABLE.to_string()
            }
        }
    }
}

fn reference_id(value: &Value) -> Option<String> {
    let id = match value {
        Value::Object(map) => map.get("id").map(value_to_text),
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    id.filter(|id| !id.is_empty())
}
