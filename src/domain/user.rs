use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::EngineError;
use crate::logic::{EntityEngine, EntityPolicy};
use crate::model::{
    ColumnDef, Entity, EntityRef, EntitySchema, FieldDef, GroupFilter, MatchType, OperationResult,
    PropertyFilter, RequestParams, UserContext,
};
use crate::store::traits::Store;

/// Administrator account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Option<i64>,
    pub version: i32,
    pub signinid: String,
    pub nick: String,
    pub password: Option<String>,
    pub email: Option<String>,
    /// Copied from the department on every save; drives data scoping.
    pub acl_code: Option<String>,
    pub acl_type: i32,
    pub department: Option<EntityRef>,
    pub enabled: bool,
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

const STATE_ENABLED: &str = "enabled";
const STATE_DISABLED: &str = "disabled";

impl Entity for User {
    type Id = i64;

    fn schema() -> &'static EntitySchema {
        static SCHEMA: OnceLock<EntitySchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            EntitySchema::new("user", "User", EntitySchema::auditable())
                .field(
                    FieldDef::text("signinid", "Sign-in ID")
                        .column(ColumnDef::new().not_null().unique().not_updatable().length(64))
                        .comparable(),
                )
                .field(
                    FieldDef::text("nick", "Nickname")
                        .column(ColumnDef::new().length(64))
                        .comparable(),
                )
                .field(
                    FieldDef::text("password", "Password")
                        .column(ColumnDef::new().length(128))
                        .bind_exempt(),
                )
                .field(FieldDef::text("email", "Email").column(ColumnDef::new().length(128)).email())
                .field(
                    FieldDef::text("aclCode", "ACL code")
                        .column(ColumnDef::new().length(64))
                        .bind_exempt(),
                )
                .field(FieldDef::integer("aclType", "ACL type").comparable())
                .field(
                    FieldDef::reference("department", "Department", "department")
                        .join_column(false)
                        .comparable(),
                )
                .field(
                    FieldDef::boolean("enabled", "Enabled")
                        .column(ColumnDef::new().not_null())
                        .comparable(),
                )
        })
    }

    fn id(&self) -> Option<&i64> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    fn display(&self) -> String {
        if self.nick.is_empty() {
            self.signinid.clone()
        } else {
            format!("{} ({})", self.nick, self.signinid)
        }
    }

    fn audit_state(&self) -> Option<String> {
        let state = if self.enabled { STATE_ENABLED } else { STATE_DISABLED };
        Some(state.to_string())
    }

    fn on_create(&mut self, actor: &str, at: DateTime<Utc>) {
        self.created_by = Some(actor.to_string());
        self.created_at = Some(at);
    }
}

/// Users are scoped by the ACL code they inherit from their department.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserPolicy;

impl EntityPolicy<User> for UserPolicy {
    fn check_permission(&self, entity: &User, user: &UserContext) -> Result<(), EngineError> {
        if entity.is_new() || !user.is_scope_restricted() {
            return Ok(());
        }
        match entity.acl_code.as_deref() {
            Some(code) if user.covers_acl_code(code) => Ok(()),
            _ => Err(EngineError::permission_denied(format!(
                "user '{}' is outside your administrative scope",
                entity.signinid
            ))),
        }
    }

    fn append_scope_filter(&self, filter: &mut GroupFilter, user: &UserContext) {
        if user.is_scope_restricted() {
            let prefixes: Vec<Value> = user
                .acl_code_prefixes
                .iter()
                .map(|p| Value::String(p.clone()))
                .collect();
            filter.force_and(PropertyFilter::new(MatchType::Aclprefixs, "aclCode", prefixes));
        }
    }

    fn prepare_save(&self, entity: &mut User, user: &UserContext) -> Result<(), EngineError> {
        entity.acl_code = entity.department.as_ref().map(|d| d.id.clone());
        let covered = entity
            .acl_code
            .as_deref()
            .map_or(!user.is_scope_restricted(), |code| user.covers_acl_code(code));
        if !covered {
            return Err(EngineError::permission_denied(
                "the selected department is outside your administrative scope",
            ));
        }
        Ok(())
    }

    fn convert_state_to_display(&self, state: &str) -> String {
        match state {
            STATE_ENABLED => "Enabled".to_string(),
            STATE_DISABLED => "Disabled".to_string(),
            other => other.to_string(),
        }
    }
}

/// Batch enable/disable of the users named by `ids`.
pub async fn do_state<S: Store<User>>(
    engine: &EntityEngine<User, S>,
    params: &RequestParams,
    user: &UserContext,
) -> Result<OperationResult, EngineError> {
    let enabled = match params.get_non_blank("state") {
        Some("enable") => true,
        Some("disable") => false,
        other => {
            return Err(EngineError::unsupported(format!(
                "state '{}'",
                other.unwrap_or_default()
            )))
        }
    };
    let (operation, event) = if enabled {
        ("Enable", "do-state-enable")
    } else {
        ("Disable", "do-state-disable")
    };
    engine
        .batch_update(operation, event, params, user, move |entity: &mut User| {
            entity.enabled = enabled;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(code: &str) -> User {
        User {
            id: Some(7),
            signinid: "carol".to_string(),
            acl_code: Some(code.to_string()),
            ..User::default()
        }
    }

    #[test]
    fn permission_follows_acl_prefixes() {
        let scoped = UserContext::new("lead").with_acl_code_prefixes(vec!["D10".to_string()]);
        assert!(UserPolicy.check_permission(&member("D1010"), &scoped).is_ok());
        assert!(matches!(
            UserPolicy.check_permission(&member("D20"), &scoped),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(UserPolicy
            .check_permission(&member("D20"), &UserContext::default_user())
            .is_ok());
    }

    #[test]
    fn acl_code_is_taken_from_the_department() {
        let mut user = User {
            department: Some(EntityRef::new("D1010")),
            ..User::default()
        };
        let scoped = UserContext::new("lead").with_acl_code_prefixes(vec!["D10".to_string()]);
        UserPolicy.prepare_save(&mut user, &scoped).unwrap();
        assert_eq!(user.acl_code.as_deref(), Some("D1010"));

        user.department = Some(EntityRef::new("D20"));
        assert!(UserPolicy.prepare_save(&mut user, &scoped).is_err());
    }

    #[test]
    fn audit_state_renders_for_display() {
        let user = User {
            enabled: true,
            ..User::default()
        };
        let state = user.audit_state().unwrap();
        assert_eq!(UserPolicy.convert_state_to_display(&state), "Enabled");
    }
}
