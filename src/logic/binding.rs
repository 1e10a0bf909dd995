use log::debug;
use serde_json::{Map, Number, Value};

use crate::error::EngineError;
use crate::logic::{EntityPolicy, IdentityResolver};
use crate::model::{Entity, EntitySchema, FieldDef, FieldKind, RequestParams, UserContext, ValueType, Verb};
use crate::store::traits::EntityStore;

/// Produces the working entity of one request.
pub struct BindingPipeline;

impl BindingPipeline {
    /// Resolve `id`, load or instantiate the working entity, run the
    /// permission check, then bind the request values onto it.
    ///
    /// Reads load the live row; mutations with an id load a detached copy;
    /// mutations without an id start from an empty entity. A read without
    /// an id yields `None`.
    pub async fn prepare<E, S, P>(
        store: &S,
        policy: &P,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<Option<E>, EngineError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
        P: EntityPolicy<E> + ?Sized,
    {
        let id = IdentityResolver::resolve::<E::Id>(params.get("id"))?;
        let schema = E::schema();

        let entity = match (id, params.verb()) {
            (Some(id), Verb::Mutation) => Some(
                store
                    .find_detached_one(&id)
                    .await?
                    .ok_or_else(|| not_found(schema, &id))?,
            ),
            (Some(id), Verb::Read) => Some(
                store
                    .find_one(&id)
                    .await?
                    .ok_or_else(|| not_found(schema, &id))?,
            ),
            (None, Verb::Mutation) => Some(E::default()),
            (None, Verb::Read) => None,
        };

        let Some(entity) = entity else {
            return Ok(None);
        };

        policy.check_permission(&entity, user)?;

        let entity = Self::bind(entity, params)?;
        debug!(
            "Prepared {} working entity {:?}",
            schema.entity_type,
            entity.id_string()
        );
        Ok(Some(entity))
    }

    /// Overlay request values onto the entity's serialized form.
    ///
    /// Only parameters naming a bindable field are applied. `id`,
    /// collections, transient and bind-exempt fields (over the whole
    /// ancestor chain) are never touched, and non-updatable columns only
    /// bind on new entities. To-one references bind from `<field>.id`.
    pub fn bind<E: Entity>(entity: E, params: &RequestParams) -> Result<E, EngineError> {
        let schema = E::schema();
        let exempt = schema.bind_exempt_fields();
        let is_new = entity.is_new();

        let mut value = serde_json::to_value(&entity)?;
        let Some(object) = value.as_object_mut() else {
            return Err(EngineError::Configuration(format!(
                "{} does not serialize to a JSON object",
                schema.entity_type
            )));
        };

        let mut touched = false;
        for field in schema.all_fields() {
            if field.name == "id"
                || field.transient
                || field.is_collection()
                || exempt.contains(&field.name)
                || (!is_new && field.column.as_ref().map_or(false, |c| !c.updatable))
            {
                continue;
            }
            if Self::bind_field(object, field, params)? {
                touched = true;
            }
        }

        if !touched {
            return Ok(entity);
        }

        serde_json::from_value(value).map_err(|e| {
            EngineError::validation(format!("Invalid {} data: {}", schema.label, e))
        })
    }

    fn bind_field(
        object: &mut Map<String, Value>,
        field: &FieldDef,
        params: &RequestParams,
    ) -> Result<bool, EngineError> {
        match field.kind {
            FieldKind::Value { value_type } => {
                let Some(raw) = params.get(field.name) else {
                    return Ok(false);
                };
                let value = convert(field, value_type, raw)?;
                object.insert(field.name.to_string(), value);
                Ok(true)
            }
            FieldKind::Reference { .. } => {
                let Some(raw) = params.get(&format!("{}.id", field.name)) else {
                    return Ok(false);
                };
                let raw = raw.trim();
                let value = if raw.is_empty() {
                    Value::Null
                } else {
                    let mut reference = Map::new();
                    reference.insert("id".to_string(), Value::String(raw.to_string()));
                    Value::Object(reference)
                };
                object.insert(field.name.to_string(), value);
                Ok(true)
            }
            FieldKind::Collection => Ok(false),
        }
    }
}

fn not_found<I: std::fmt::Display>(schema: &EntitySchema, id: &I) -> EngineError {
    EngineError::not_found(format!("{} '{}' not found", schema.label, id))
}

/// Request text to the JSON shape of the field. Blank non-text values bind as null.
fn convert(field: &FieldDef, value_type: ValueType, raw: &str) -> Result<Value, EngineError> {
    let trimmed = raw.trim();
    if value_type != ValueType::Text && trimmed.is_empty() {
        return Ok(match value_type {
            ValueType::Boolean => Value::Bool(false),
            _ => Value::Null,
        });
    }

    let invalid = || EngineError::validation(format!("{}: invalid value '{}'", field.label, raw));
    let value = match value_type {
        ValueType::Text => Value::String(raw.to_string()),
        ValueType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" | "yes" => Value::Bool(true),
            "false" | "off" | "0" | "no" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        ValueType::Integer => Value::Number(trimmed.parse::<i64>().map_err(|_| invalid())?.into()),
        ValueType::Decimal => {
            let number = trimmed.parse::<f64>().map_err(|_| invalid())?;
            Value::Number(Number::from_f64(number).ok_or_else(invalid)?)
        }
        ValueType::Date => Value::String(trimmed.to_string()),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::User;
    use crate::logic::OpenPolicy;
    use crate::model::EntityRef;
    use crate::store::MemoryStore;

    fn params(verb: Verb, pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::new(
            verb,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn bind_exempt_fields_keep_their_value() {
        let mut user = User::default();
        user.password = Some("hash".to_string());
        user.acl_code = Some("D10".to_string());

        let bound = BindingPipeline::bind(
            user,
            &params(
                Verb::Mutation,
                &[
                    ("password", "injected"),
                    ("aclCode", "ROOT"),
                    ("createdBy", "mallory"),
                    ("nick", "Alice"),
                ],
            ),
        )
        .unwrap();

        assert_eq!(bound.password.as_deref(), Some("hash"));
        assert_eq!(bound.acl_code.as_deref(), Some("D10"));
        assert_eq!(bound.created_by, None);
        assert_eq!(bound.nick, "Alice");
    }

    #[test]
    fn binds_references_and_typed_values() {
        let bound = BindingPipeline::bind(
            User::default(),
            &params(
                Verb::Mutation,
                &[("department.id", "D10"), ("aclType", "3"), ("enabled", "on")],
            ),
        )
        .unwrap();
        assert_eq!(bound.department, Some(EntityRef::new("D10")));
        assert_eq!(bound.acl_type, 3);
        assert!(bound.enabled);

        let cleared = BindingPipeline::bind(bound, &params(Verb::Mutation, &[("department.id", "")]))
            .unwrap();
        assert_eq!(cleared.department, None);
    }

    #[test]
    fn malformed_values_are_validation_errors() {
        let err = BindingPipeline::bind(
            User::default(),
            &params(Verb::Mutation, &[("aclType", "many")]),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn prepare_follows_verb_and_id() {
        let store = MemoryStore::new();
        let user = UserContext::default_user();

        let none = BindingPipeline::prepare::<User, _, _>(&store, &OpenPolicy, &params(Verb::Read, &[]), &user)
            .await
            .unwrap();
        assert!(none.is_none());

        let fresh = BindingPipeline::prepare::<User, _, _>(
            &store,
            &OpenPolicy,
            &params(Verb::Mutation, &[("id", "-1"), ("signinid", "alice")]),
            &user,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(fresh.is_new());
        assert_eq!(fresh.signinid, "alice");

        let missing = BindingPipeline::prepare::<User, _, _>(
            &store,
            &OpenPolicy,
            &params(Verb::Read, &[("id", "404")]),
            &user,
        )
        .await
        .unwrap_err();
        assert!(matches!(missing, EngineError::NotFound(_)));
    }
}
