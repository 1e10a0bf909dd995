use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::logic::EntityPolicy;
use crate::model::{
    ColumnDef, Entity, EntitySchema, FieldDef, GroupFilter, MatchType, PropertyFilter, UserContext,
};

/// Role codes the platform itself depends on.
pub const RESERVED_ROLE_CODES: [&str; 2] = ["ROLE_ADMIN", "ROLE_ANONYMOUSLY"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: Option<String>,
    pub version: i32,
    pub code: String,
    pub name: String,
    /// Administrative level; callers only see roles at or below their own.
    pub acl_type: i32,
    pub description: Option<String>,
    pub disabled: bool,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Role {
    pub fn is_reserved(&self) -> bool {
        RESERVED_ROLE_CODES.contains(&self.code.as_str())
    }
}

impl Entity for Role {
    type Id = String;

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new("role", "Role", EntitySchema::auditable())
                .field(
                    FieldDef::text("code", "Code")
                        .column(ColumnDef::new().not_null().unique().length(64))
                        .pattern("ROLE_[A-Z0-9_]+")
                        .tooltips("Upper case, prefixed with ROLE_")
                        .comparable(),
                )
                .field(
                    FieldDef::text("name", "Name")
                        .column(ColumnDef::new().not_null().length(128))
                        .comparable(),
                )
                .field(
                    FieldDef::integer("aclType", "ACL type")
                        .column(ColumnDef::new().not_null())
                        .comparable(),
                )
                .field(FieldDef::text("description", "Description").column(ColumnDef::new().lob()))
                .field(
                    FieldDef::boolean("disabled", "Disabled")
                        .column(ColumnDef::new().not_null())
                        .comparable(),
                )
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
        self.name.clone()
    }

    fn on_create(&mut self, actor: &str, at: DateTime<Utc>) {
        self.created_by = Some(actor.to_string());
        self.created_at = Some(at);
    }
}

fn exceeds_caller_level(entity: &Role, user: &UserContext) -> Option<String> {
    match user.acl_type {
        Some(level) if entity.acl_type > level => {
            Some(format!("ACL type {} exceeds your own level {}", entity.acl_type, level))
        }
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RolePolicy;

impl EntityPolicy<Role> for RolePolicy {
    fn is_disallow_delete(&self, entity: &Role, _user: &UserContext) -> Option<String> {
        entity
            .is_reserved()
            .then(|| format!("{} is system reserved and cannot be deleted", entity.code))
    }

    fn is_disallow_create(&self, entity: &Role, user: &UserContext) -> Option<String> {
        exceeds_caller_level(entity, user)
    }

    fn is_disallow_update(&self, entity: &Role, user: &UserContext) -> Option<String> {
        exceeds_caller_level(entity, user)
    }

    fn append_scope_filter(&self, filter: &mut GroupFilter, user: &UserContext) {
        if let Some(level) = user.acl_type {
            filter.force_and(PropertyFilter::new(MatchType::Le, "aclType", vec![level.into()]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_codes_cannot_be_deleted() {
        let admin = Role {
            code: "ROLE_ADMIN".to_string(),
            ..Role::default()
        };
        let ops = Role {
            code: "ROLE_OPS".to_string(),
            ..Role::default()
        };
        let user = UserContext::default_user();
        assert!(RolePolicy.is_disallow_delete(&admin, &user).is_some());
        assert!(RolePolicy.is_disallow_delete(&ops, &user).is_none());
    }

    #[test]
    fn scope_caps_acl_type_at_caller_level() {
        let mut filter = GroupFilter::new();
        RolePolicy.append_scope_filter(&mut filter, &UserContext::new("ops").with_acl_type(2));
        assert_eq!(filter.forced().len(), 1);
        assert_eq!(filter.forced()[0].match_type, MatchType::Le);

        let mut open = GroupFilter::new();
        RolePolicy.append_scope_filter(&mut open, &UserContext::default_user());
        assert!(open.forced().is_empty());
    }

    #[test]
    fn scoped_caller_cannot_create_above_own_level() {
        let root = Role {
            code: "ROLE_ROOT".to_string(),
            acl_type: 9,
            ..Role::default()
        };
        let ops = UserContext::new("ops").with_acl_type(2);
        assert_eq!(
            RolePolicy.is_disallow_create(&root, &ops).as_deref(),
            Some("ACL type 9 exceeds your own level 2")
        );
        assert!(RolePolicy.is_disallow_create(&root, &UserContext::default_user()).is_none());
    }
}
