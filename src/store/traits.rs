use anyhow::Result;

use crate::model::{AuditContext, Entity, GroupFilter, RevisionSnapshot, SortOrder};

/// Persistence for one entity type.
#[async_trait::async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Load the live instance.
    async fn find_one(&self, id: &E::Id) -> Result<Option<E>>;
    /// Load a copy that is safe to mutate before an explicit `save`.
    async fn find_detached_one(&self, id: &E::Id) -> Result<Option<E>> {
        self.find_one(id).await
    }
    /// All rows matching the filter (client and forced predicates), sorted.
    async fn find_all(&self, filter: &GroupFilter, sort: &[SortOrder]) -> Result<Vec<E>>;
    async fn find_by_ids(&self, ids: &[E::Id]) -> Result<Vec<E>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find_one(id).await? {
                found.push(entity);
            }
        }
        Ok(found)
    }
    /// Insert or update, checking and bumping the optimistic version and
    /// recording a revision. Fails with `VersionConflict` on a stale version.
    async fn save(&self, entity: E, audit: &AuditContext) -> Result<E>;
    /// Remove the row and record a DELETE revision.
    async fn delete(&self, entity: &E, audit: &AuditContext) -> Result<()>;
}

/// Read side of the audit trail.
#[async_trait::async_trait]
pub trait RevisionStore<E: Entity>: Send + Sync {
    /// Every revision of one entity, oldest first.
    async fn find_revisions(&self, id: &E::Id) -> Result<Vec<RevisionSnapshot>>;
    /// Only the snapshots at the given revision numbers.
    async fn find_revisions_at(&self, id: &E::Id, revs: &[i64]) -> Result<Vec<RevisionSnapshot>> {
        Ok(self
            .find_revisions(id)
            .await?
            .into_iter()
            .filter(|snapshot| revs.contains(&snapshot.rev))
            .collect())
    }
}

/// Display lookups for references found in revision snapshots.
#[async_trait::async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Label of the referenced row. Fails with `EngineError::StaleReference`
    /// when the row no longer exists.
    async fn load_display(&self, entity_type: &str, id: &str) -> Result<String>;
    /// Generic lookup by type and id.
    async fn find_entity_display(&self, entity_type: &str, id: &str) -> Result<Option<String>>;
}

pub trait Store<E: Entity>: EntityStore<E> + RevisionStore<E> + ReferenceResolver + Send + Sync {}

impl<E: Entity, T> Store<E> for T where T: EntityStore<E> + RevisionStore<E> + ReferenceResolver {}
