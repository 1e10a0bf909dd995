use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::domain::{
    Department, DepartmentPolicy, DomainStore, Role, RolePolicy, User, UserPolicy,
};
use crate::error::EngineError;
use crate::logic::{EntityEngine, SharedServices};
use crate::model::Entity;
use crate::store::traits::Store;

/// The standard operation set for one entity type.
pub fn entity_router<E: Entity, S: Store<E> + 'static>(engine: Arc<EntityEngine<E, S>>) -> Router {
    Router::new()
        .route("/find-by-page", get(handlers::find_by_page::<E, S>))
        .route("/select-options", get(handlers::select_options::<E, S>))
        .route("/group-aggregate", get(handlers::group_aggregate::<E, S>))
        .route("/view", get(handlers::view::<E, S>))
        .route("/do-create", post(handlers::do_create::<E, S>))
        .route("/do-update", post(handlers::do_update::<E, S>))
        .route("/do-save", post(handlers::do_save::<E, S>))
        .route("/do-delete", post(handlers::do_delete::<E, S>))
        .route("/validate-rules", get(handlers::validate_rules::<E, S>))
        .route("/check-unique", get(handlers::check_unique::<E, S>))
        .route("/revisions", get(handlers::revisions::<E, S>))
        .route("/revisions/compare", get(handlers::revision_compare::<E, S>))
        .with_state(engine)
}

/// Build one engine per demo entity over the shared store and mount them
/// under `/admin/auth`.
pub fn create_router<S: DomainStore>(store: Arc<S>, shared: SharedServices) -> Result<Router, EngineError> {
    let departments = Arc::new(EntityEngine::<Department, S>::new(
        store.clone(),
        Arc::new(DepartmentPolicy),
        shared.clone(),
    )?);
    let roles = Arc::new(EntityEngine::<Role, S>::new(
        store.clone(),
        Arc::new(RolePolicy),
        shared.clone(),
    )?);
    let users = Arc::new(EntityEngine::<User, S>::new(store, Arc::new(UserPolicy), shared)?);

    let user_actions = Router::new()
        .route("/do-state", post(handlers::user_do_state::<S>))
        .with_state(users.clone());

    Ok(Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .nest("/admin/auth/department", entity_router(departments))
        .nest("/admin/auth/role", entity_router(roles))
        .nest("/admin/auth/user", entity_router(users).merge(user_actions)))
}
