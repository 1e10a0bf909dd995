use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{EngineError, VersionConflict};
use crate::logic::PropertyFilterEvaluator;
use crate::model::{
    AuditContext, Entity, EntityId, GroupFilter, RevisionSnapshot, RevisionType, SortOrder,
};
use crate::store::traits::{EntityStore, ReferenceResolver, RevisionStore};

/// One persisted row.
#[derive(Clone, Debug)]
struct StoredRow {
    seq: i64,
    version: i32,
    display: String,
    state: Option<String>,
    data: Value,
}

/// Process-local store used for development and tests.
///
/// Rows are kept as JSON keyed by entity type and id; every read hands out
/// a fresh deserialized copy, so callers never share a live instance.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Rows keyed by entity type, then by id.
    tables: Arc<RwLock<HashMap<String, BTreeMap<String, StoredRow>>>>,
    revisions: Arc<RwLock<Vec<RevisionSnapshot>>>,
    sequence: AtomicI64,
    revision_sequence: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> i64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn next_revision(&self) -> i64 {
        self.revision_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn record_revision(
        &self,
        entity_type: &str,
        entity_id: &str,
        revision_type: RevisionType,
        audit: &AuditContext,
        old_state: Option<String>,
        row: StoredRow,
    ) {
        let new_state = match revision_type {
            RevisionType::Delete => None,
            _ => row.state,
        };
        let snapshot = RevisionSnapshot {
            rev: self.next_revision(),
            revision_type,
            timestamp: Utc::now(),
            actor: audit.actor.clone(),
            operation_event: Some(audit.operation_event.clone()),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            old_state,
            new_state,
            old_state_display: None,
            new_state_display: None,
            display: row.display,
            entity: row.data,
        };
        self.revisions.write().await.push(snapshot);
    }
}

fn decode<E: Entity>(row: &StoredRow) -> Result<E> {
    serde_json::from_value(row.data.clone())
        .with_context(|| format!("Failed to decode stored {}", E::schema().entity_type))
}

#[async_trait::async_trait]
impl<E: Entity> EntityStore<E> for MemoryStore {
    async fn find_one(&self, id: &E::Id) -> Result<Option<E>> {
        let tables = self.tables.read().await;
        let row = tables
            .get(E::schema().entity_type)
            .and_then(|table| table.get(&id.to_string()));
        row.map(decode::<E>).transpose()
    }

    async fn find_all(&self, filter: &GroupFilter, sort: &[SortOrder]) -> Result<Vec<E>> {
        let mut rows: Vec<(i64, Value)> = {
            let tables = self.tables.read().await;
            match tables.get(E::schema().entity_type) {
                Some(table) => table
                    .values()
                    .filter(|row| PropertyFilterEvaluator::matches(&row.data, filter))
                    .map(|row| (row.seq, row.data.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };
        rows.sort_by_key(|(seq, _)| *seq);

        let mut values: Vec<Value> = rows.into_iter().map(|(_, data)| data).collect();
        PropertyFilterEvaluator::sort_rows(&mut values, sort);

        values
            .into_iter()
            .map(|data| {
                serde_json::from_value(data)
                    .with_context(|| format!("Failed to decode stored {}", E::schema().entity_type))
            })
            .collect()
    }

    async fn save(&self, entity: E, audit: &AuditContext) -> Result<E> {
        let entity_type = E::schema().entity_type;
        let mut entity = entity;

        let seq = self.next_sequence();
        if entity.is_new() {
            entity.set_id(<E::Id as EntityId>::generate(seq));
            entity.set_version(0);
        }
        let key = entity
            .id_string()
            .context("Entity has no id after assignment")?;

        let (revision_type, old_state, row) = {
            let mut tables = self.tables.write().await;
            let table = tables.entry(entity_type.to_string()).or_default();

            let (revision_type, old_state, row_seq) = match table.get(&key) {
                Some(existing) => {
                    if existing.version != entity.version() {
                        return Err(VersionConflict {
                            entity_type: entity_type.to_string(),
                            id: key,
                            expected: entity.version(),
                            found: existing.version,
                        }
                        .into());
                    }
                    entity.set_version(existing.version + 1);
                    (RevisionType::Modify, existing.state.clone(), existing.seq)
                }
                None if entity.version() == 0 => (RevisionType::Add, None, seq),
                None => {
                    return Err(EngineError::not_found(format!(
                        "{} '{}' no longer exists",
                        E::schema().label,
                        key
                    ))
                    .into())
                }
            };

            let row = StoredRow {
                seq: row_seq,
                version: entity.version(),
                display: entity.display(),
                state: entity.audit_state(),
                data: serde_json::to_value(&entity)?,
            };
            table.insert(key.clone(), row.clone());
            (revision_type, old_state, row)
        };

        self.record_revision(entity_type, &key, revision_type, audit, old_state, row)
            .await;

        Ok(entity)
    }

    async fn delete(&self, entity: &E, audit: &AuditContext) -> Result<()> {
        let entity_type = E::schema().entity_type;
        let key = entity.id_string().context("Cannot delete an entity without id")?;

        let removed = {
            let mut tables = self.tables.write().await;
            tables
                .get_mut(entity_type)
                .and_then(|table| table.remove(&key))
        };
        let Some(removed) = removed else {
            return Err(EngineError::not_found(format!(
                "{} '{}' not found",
                E::schema().label,
                key
            ))
            .into());
        };

        let old_state = removed.state.clone();
        self.record_revision(entity_type, &key, RevisionType::Delete, audit, old_state, removed)
            .await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<E: Entity> RevisionStore<E> for MemoryStore {
    async fn find_revisions(&self, id: &E::Id) -> Result<Vec<RevisionSnapshot>> {
        let entity_type = E::schema().entity_type;
        let key = id.to_string();
        let revisions = self.revisions.read().await;
        let mut found: Vec<RevisionSnapshot> = revisions
            .iter()
            .filter(|r| r.entity_type == entity_type && r.entity_id == key)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.rev);
        Ok(found)
    }
}

#[async_trait::async_trait]
impl ReferenceResolver for MemoryStore {
    async fn load_display(&self, entity_type: &str, id: &str) -> Result<String> {
        let display = self.find_entity_display(entity_type, id).await?;
        display.ok_or_else(|| {
            anyhow::Error::new(EngineError::StaleReference {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            })
        })
    }

    async fn find_entity_display(&self, entity_type: &str, id: &str) -> Result<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(entity_type)
            .and_then(|table| table.get(id))
            .map(|row| row.display.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::Role;
    use crate::model::PropertyFilter;

    fn role(code: &str) -> Role {
        Role {
            code: code.to_string(),
            name: code.to_lowercase(),
            acl_type: 1,
            ..Role::default()
        }
    }

    #[tokio::test]
    async fn save_assigns_id_and_bumps_version() {
        let store = MemoryStore::new();
        let audit = AuditContext::system("test");

        let saved = store.save(role("ROLE_A"), &audit).await.unwrap();
        assert!(!saved.is_new());
        assert_eq!(saved.version, 0);

        let mut changed = saved.clone();
        changed.name = "renamed".to_string();
        let updated = store.save(changed, &audit).await.unwrap();
        assert_eq!(updated.version, 1);

        let revisions = RevisionStore::<Role>::find_revisions(&store, saved.id.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].revision_type, RevisionType::Add);
        assert_eq!(revisions[1].revision_type, RevisionType::Modify);
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = MemoryStore::new();
        let audit = AuditContext::system("test");
        let saved = store.save(role("ROLE_A"), &audit).await.unwrap();

        store.save(saved.clone(), &audit).await.unwrap();
        let err = store.save(saved, &audit).await.unwrap_err();
        assert!(matches!(EngineError::from(err), EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_leaves_a_trail_and_stale_references() {
        let store = MemoryStore::new();
        let audit = AuditContext::system("test");
        let saved = store.save(role("ROLE_GONE"), &audit).await.unwrap();
        let id = saved.id.clone().unwrap();

        assert_eq!(store.load_display("role", &id).await.unwrap(), saved.display());
        store.delete(&saved, &audit).await.unwrap();

        let err = EngineError::from(store.load_display("role", &id).await.unwrap_err());
        assert!(matches!(err, EngineError::StaleReference { .. }));
        assert_eq!(store.find_entity_display("role", &id).await.unwrap(), None);

        let trail = RevisionStore::<Role>::find_revisions(&store, &id).await.unwrap();
        assert_eq!(trail.last().unwrap().revision_type, RevisionType::Delete);
    }

    #[tokio::test]
    async fn find_all_filters_and_keeps_insertion_order() {
        let store = MemoryStore::new();
        let audit = AuditContext::system("test");
        for code in ["ROLE_B", "ROLE_A", "ROLE_C"] {
            store.save(role(code), &audit).await.unwrap();
        }

        let all: Vec<Role> = store.find_all(&GroupFilter::new(), &[]).await.unwrap();
        let codes: Vec<_> = all.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["ROLE_B", "ROLE_A", "ROLE_C"]);

        let filter = GroupFilter::new().and(PropertyFilter::eq("code", "ROLE_C"));
        let found: Vec<Role> = store.find_all(&filter, &[SortOrder::asc("code")]).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
