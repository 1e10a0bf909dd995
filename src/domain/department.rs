use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::logic::EntityPolicy;
use crate::model::{
    ColumnDef, Entity, EntityRef, EntitySchema, FieldDef, GroupFilter, PropertyFilter,
    UserContext,
};

/// Organization unit. Departments form a tree through `parent`; the
/// department code doubles as the prefix of every member's ACL code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: Option<String>,
    pub version: i32,
    pub code: String,
    pub name: String,
    pub parent: Option<EntityRef>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Department {
    type Id = String;

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new("department", "Department", EntitySchema::auditable())
                .field(
                    FieldDef::text("code", "Code")
                        .column(ColumnDef::new().not_null().unique().length(32))
                        .comparable(),
                )
                .field(
                    FieldDef::text("name", "Name")
                        .column(ColumnDef::new().not_null().length(128))
                        .comparable(),
                )
                .field(
                    FieldDef::reference("parent", "Parent department", "department")
                        .join_column(true)
                        .comparable(),
                )
                .field(FieldDef::text("description", "Description").column(ColumnDef::new().lob()))
        })
    }

    fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: String) {
        self.id = Some(id);
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    fn display(&self) -> String {
        format!("{} {}", self.code, self.name)
    }

    fn on_create(&mut self, actor: &str, at: DateTime<Utc>) {
        self.created_by = Some(actor.to_string());
        self.created_at = Some(at);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DepartmentPolicy;

impl EntityPolicy<Department> for DepartmentPolicy {
    /// An unfiltered listing shows the top of the tree only.
    fn append_scope_filter(&self, filter: &mut GroupFilter, _user: &UserContext) {
        if filter.is_empty_search() {
            filter.force_and(PropertyFilter::is_null("parent"));
        }
    }

    /// New departments take their code as id, so the ids users inherit as
    /// `aclCode` stay usable as hierarchy prefixes.
    fn prepare_save(&self, entity: &mut Department, _user: &UserContext) -> Result<(), EngineError> {
        if entity.is_new() && !entity.code.is_empty() {
            entity.id = Some(entity.code.clone());
        }
        Ok(())
    }

    fn is_disallow_update(&self, entity: &Department, _user: &UserContext) -> Option<String> {
        let own = entity.id.as_deref()?;
        match &entity.parent {
            Some(parent) if parent.id == own => {
                Some("a department cannot be its own parent".to_string())
            }
            _ => None,
        }
    }
}
