use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;

use crate::model::{EntityId, EntitySchema};

/// A persistent record type the engine can operate on.
///
/// Entities travel through the engine as JSON: binding overlays request
/// values on the serialized form, filters and revision diffs read it by
/// property name. The serialized names must therefore match the schema's
/// field names.
pub trait Entity:
    Clone + Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Id: EntityId;

    fn schema() -> &'static EntitySchema;

    fn id(&self) -> Option<&Self::Id>;
    fn set_id(&mut self, id: Self::Id);

    fn version(&self) -> i32;
    fn set_version(&mut self, version: i32);

    /// Human readable label used in select lists, reference rendering and audit rows.
    fn display(&self) -> String;

    /// Business state recorded with every revision, if the entity has one.
    fn audit_state(&self) -> Option<String> {
        None
    }

    /// Called once, right before the first save.
    fn on_create(&mut self, _actor: &str, _at: DateTime<Utc>) {}

    fn is_new(&self) -> bool {
        self.id().map_or(true, |id| id.is_unset())
    }

    fn id_string(&self) -> Option<String> {
        self.id().map(|id| id.to_string())
    }
}

/// Serialized form of a to-one association: `{"id": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

impl EntityRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
