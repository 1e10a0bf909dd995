use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::error::{EngineError, VersionConflict};
use crate::logic::PropertyFilterEvaluator;
use crate::model::{
    AuditContext, Entity, EntityId, GroupFilter, MatchType, PropertyFilter, RevisionSnapshot,
    RevisionType, SortOrder,
};
use crate::store::traits::{EntityStore, ReferenceResolver, RevisionStore};

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Create the entity and revision tables if they do not exist yet
    pub async fn migrate(&self) -> Result<()> {
        for statement in INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| s.lines().any(|line| !line.trim().is_empty() && !line.trim().starts_with("--")))
        {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to run migration statement: {}", statement))?;
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_revision(
        tx: &mut Transaction<'_, Postgres>,
        entity_type: &str,
        entity_id: &str,
        revision_type: RevisionType,
        audit: &AuditContext,
        states: (Option<String>, Option<String>),
        display: &str,
        data: &Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_revisions
                (entity_type, entity_id, revision_type, actor, operation_event, old_state, new_state, display, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(revision_type.as_str())
        .bind(&audit.actor)
        .bind(&audit.operation_event)
        .bind(states.0)
        .bind(states.1)
        .bind(display)
        .bind(data)
        .execute(&mut **tx)
        .await
        .context("Failed to record revision")?;
        Ok(())
    }
}

fn decode<E: Entity>(data: Value) -> Result<E> {
    serde_json::from_value(data)
        .with_context(|| format!("Failed to decode stored {}", E::schema().entity_type))
}

#[async_trait::async_trait]
impl<E: Entity> EntityStore<E> for PostgresStore {
    async fn find_one(&self, id: &E::Id) -> Result<Option<E>> {
        let row = sqlx::query("SELECT data FROM entities WHERE entity_type = $1 AND id = $2")
            .bind(E::schema().entity_type)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch entity")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(decode(row.get::<Value, _>("data"))?))
    }

    async fn find_all(&self, filter: &GroupFilter, sort: &[SortOrder]) -> Result<Vec<E>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT data FROM entities WHERE entity_type = ");
        builder.push_bind(E::schema().entity_type);
        for (path, expected) in equality_pushdown(filter) {
            builder
                .push(" AND (jsonb_typeof(data #> ")
                .push_bind(path.clone())
                .push(") IN ('object', 'array') OR data #>> ")
                .push_bind(path)
                .push(" = ")
                .push_bind(expected)
                .push(")");
        }
        builder.push(" ORDER BY seq");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entities")?;

        let values: Vec<Value> = rows.into_iter().map(|row| row.get("data")).collect();
        let mut matched = PropertyFilterEvaluator::filter_rows(values, filter);
        PropertyFilterEvaluator::sort_rows(&mut matched, sort);

        matched.into_iter().map(decode).collect()
    }

    async fn save(&self, entity: E, audit: &AuditContext) -> Result<E> {
        let entity_type = E::schema().entity_type;
        let mut entity = entity;
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let seq: i64 = sqlx::query("SELECT nextval('entity_seq') AS seq")
            .fetch_one(&mut *tx)
            .await
            .context("Failed to allocate sequence value")?
            .get("seq");

        if entity.is_new() {
            entity.set_id(<E::Id as EntityId>::generate(seq));
            entity.set_version(0);
        }
        let key = entity
            .id_string()
            .ok_or_else(|| anyhow!("Entity has no id after assignment"))?;

        let existing = sqlx::query(
            "SELECT version, state FROM entities WHERE entity_type = $1 AND id = $2 FOR UPDATE",
        )
        .bind(entity_type)
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock entity row")?;

        let (revision_type, old_state) = match existing {
            Some(row) => {
                let found: i32 = row.get("version");
                if found != entity.version() {
                    return Err(VersionConflict {
                        entity_type: entity_type.to_string(),
                        id: key,
                        expected: entity.version(),
                        found,
                    }
                    .into());
                }
                entity.set_version(found + 1);
                (RevisionType::Modify, row.get::<Option<String>, _>("state"))
            }
            None if entity.version() == 0 => (RevisionType::Add, None),
            None => {
                return Err(EngineError::not_found(format!(
                    "{} '{}' no longer exists",
                    E::schema().label,
                    key
                ))
                .into())
            }
        };

        let data = serde_json::to_value(&entity)?;
        let display = entity.display();
        let state = entity.audit_state();

        match revision_type {
            RevisionType::Add => {
                sqlx::query(
                    r#"
                    INSERT INTO entities (entity_type, id, seq, version, display, state, data)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    "#,
                )
                .bind(entity_type)
                .bind(&key)
                .bind(seq)
                .bind(entity.version())
                .bind(&display)
                .bind(&state)
                .bind(&data)
                .execute(&mut *tx)
                .await
                .context("Failed to insert entity")?;
            }
            _ => {
                sqlx::query(
                    r#"
                    UPDATE entities
                    SET version = $3, display = $4, state = $5, data = $6, updated_at = NOW()
                    WHERE entity_type = $1 AND id = $2
                    "#,
                )
                .bind(entity_type)
                .bind(&key)
                .bind(entity.version())
                .bind(&display)
                .bind(&state)
                .bind(&data)
                .execute(&mut *tx)
                .await
                .context("Failed to update entity")?;
            }
        }

        Self::insert_revision(
            &mut tx,
            entity_type,
            &key,
            revision_type,
            audit,
            (old_state, state),
            &display,
            &data,
        )
        .await?;

        tx.commit().await.context("Failed to commit entity save")?;
        Ok(entity)
    }

    async fn delete(&self, entity: &E, audit: &AuditContext) -> Result<()> {
        let entity_type = E::schema().entity_type;
        let key = entity
            .id_string()
            .ok_or_else(|| anyhow!("Cannot delete an entity without id"))?;
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let removed = sqlx::query(
            "DELETE FROM entities WHERE entity_type = $1 AND id = $2 RETURNING display, state, data",
        )
        .bind(entity_type)
        .bind(&key)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to delete entity")?;

        let Some(removed) = removed else {
            return Err(EngineError::not_found(format!(
                "{} '{}' not found",
                E::schema().label,
                key
            ))
            .into());
        };

        let display: String = removed.get("display");
        let data: Value = removed.get("data");
        Self::insert_revision(
            &mut tx,
            entity_type,
            &key,
            RevisionType::Delete,
            audit,
            (removed.get("state"), None),
            &display,
            &data,
        )
        .await?;

        tx.commit().await.context("Failed to commit entity delete")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<E: Entity> RevisionStore<E> for PostgresStore {
    async fn find_revisions(&self, id: &E::Id) -> Result<Vec<RevisionSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT rev, entity_type, entity_id, revision_type, actor, operation_event,
                   old_state, new_state, display, data, created_at
            FROM entity_revisions
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY rev
            "#,
        )
        .bind(E::schema().entity_type)
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list revisions")?;

        rows.into_iter()
            .map(|row| {
                let revision_type: String = row.get("revision_type");
                Ok(RevisionSnapshot {
                    rev: row.get("rev"),
                    revision_type: RevisionType::parse(&revision_type)
                        .ok_or_else(|| anyhow!("Unknown revision type '{}'", revision_type))?,
                    timestamp: row.get::<DateTime<Utc>, _>("created_at"),
                    actor: row.get("actor"),
                    operation_event: row.get("operation_event"),
                    entity_type: row.get("entity_type"),
                    entity_id: row.get("entity_id"),
                    old_state: row.get("old_state"),
                    new_state: row.get("new_state"),
                    old_state_display: None,
                    new_state_display: None,
                    display: row.get("display"),
                    entity: row.get("data"),
                })
            })
            .collect()
    }

    async fn find_revisions_at(&self, id: &E::Id, revs: &[i64]) -> Result<Vec<RevisionSnapshot>> {
        let all = <Self as RevisionStore<E>>::find_revisions(self, id).await?;
        Ok(all.into_iter().filter(|s| revs.contains(&s.rev)).collect())
    }
}

#[async_trait::async_trait]
impl ReferenceResolver for PostgresStore {
    async fn load_display(&self, entity_type: &str, id: &str) -> Result<String> {
        self.find_entity_display(entity_type, id)
            .await?
            .ok_or_else(|| {
                anyhow::Error::new(EngineError::StaleReference {
                    entity_type: entity_type.to_string(),
                    id: id.to_string(),
                })
            })
    }

    async fn find_entity_display(&self, entity_type: &str, id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT display FROM entities WHERE entity_type = $1 AND id = $2")
            .bind(entity_type)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to resolve referenced entity")?;
        Ok(row.map(|row| row.get("display")))
    }
}

/// `EQ` predicates on one property with a non-numeric text value, as
/// `(json path, text)` pairs SQL can pre-filter on. Numeric values and
/// reference objects are left to the in-process evaluator, which still runs
/// over every fetched row.
fn equality_pushdown(filter: &GroupFilter) -> Vec<(Vec<String>, String)> {
    filter
        .filters
        .iter()
        .chain(filter.forced().iter())
        .filter_map(|predicate: &PropertyFilter| {
            if predicate.match_type != MatchType::Eq || predicate.properties.len() != 1 {
                return None;
            }
            let Some(Value::String(expected)) = predicate.values.first() else {
                return None;
            };
            if expected.trim().parse::<f64>().is_ok() {
                return None;
            }
            let path = predicate.properties[0].split('.').map(str::to_string).collect();
            Some((path, expected.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_textual_equality_is_pushed_down() {
        let filter = GroupFilter::new()
            .and(PropertyFilter::eq("code", "ROLE_OPS"))
            .and(PropertyFilter::eq("aclType", "2"))
            .and(PropertyFilter::eq("department.id", "D10"))
            .and(PropertyFilter::new(MatchType::Cn, "name", vec!["ops".into()]))
            .and(PropertyFilter::new(MatchType::Eq, "code", Vec::new()));

        let pushed = equality_pushdown(&filter);
        assert_eq!(
            pushed,
            vec![
                (vec!["code".to_string()], "ROLE_OPS".to_string()),
                (vec!["department".to_string(), "id".to_string()], "D10".to_string()),
            ]
        );
    }

    #[test]
    fn forced_predicates_are_pushed_down_too() {
        let mut filter = GroupFilter::new();
        filter.force_and(PropertyFilter::eq("signinid", "admin"));
        assert_eq!(equality_pushdown(&filter).len(), 1);
    }
}
