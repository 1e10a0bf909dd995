use crate::error::EngineError;
use crate::model::{Entity, GroupFilter, UserContext};

/// Per-entity hooks the generic engine consults.
///
/// Every method has a permissive default; an entity kind overrides only
/// what it restricts.
pub trait EntityPolicy<E: Entity>: Send + Sync {
    /// Runs before any request value is bound onto a working entity.
    fn check_permission(&self, _entity: &E, _user: &UserContext) -> Result<(), EngineError> {
        Ok(())
    }

    /// `Some(reason)` rejects the create.
    fn is_disallow_create(&self, _entity: &E, _user: &UserContext) -> Option<String> {
        None
    }

    fn is_disallow_update(&self, _entity: &E, _user: &UserContext) -> Option<String> {
        None
    }

    fn is_disallow_delete(&self, _entity: &E, _user: &UserContext) -> Option<String> {
        None
    }

    /// Add mandatory predicates with `GroupFilter::force_and`.
    fn append_scope_filter(&self, _filter: &mut GroupFilter, _user: &UserContext) {}

    /// Fill derived fields that request binding may not touch.
    fn prepare_save(&self, _entity: &mut E, _user: &UserContext) -> Result<(), EngineError> {
        Ok(())
    }

    /// Label shown for an audited business state value.
    fn convert_state_to_display(&self, state: &str) -> String {
        state.to_string()
    }
}

/// Policy with no restrictions.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenPolicy;

impl<E: Entity> EntityPolicy<E> for OpenPolicy {}
