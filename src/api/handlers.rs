use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::domain::user::{do_state, User};
use crate::error::EngineError;
use crate::logic::{EntityEngine, QueryOutcome, SelectOption, ValidationRuleSet};
use crate::model::{
    Entity, OperationResult, PagedResult, RequestParams, RevisionComparison, RevisionSnapshot,
    UserContext,
};
use crate::store::traits::Store;

pub type AppState<E, S> = Arc<EntityEngine<E, S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Paged rows, or a file download when `_format_` asks for an export.
pub async fn find_by_page<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Response, EngineError> {
    match engine.find_by_page(&params, &user).await? {
        QueryOutcome::Page(page) => Ok(Json(page).into_response()),
        QueryOutcome::Exported(file) => Ok((
            [
                (header::CONTENT_TYPE, file.content_type.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", file.filename),
                ),
            ],
            file.body,
        )
            .into_response()),
    }
}

pub async fn select_options<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<Vec<SelectOption>>, EngineError> {
    Ok(Json(engine.select_options(&params, &user).await?))
}

pub async fn view<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<E>, EngineError> {
    Ok(Json(engine.view(&params, &user).await?))
}

pub async fn do_create<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<OperationResult>, EngineError> {
    engine.verify_token(&params, &user)?;
    Ok(Json(engine.do_create(&params, &user).await?))
}

pub async fn do_update<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<OperationResult>, EngineError> {
    engine.verify_token(&params, &user)?;
    Ok(Json(engine.do_update(&params, &user).await?))
}

pub async fn do_save<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<OperationResult>, EngineError> {
    engine.verify_token(&params, &user)?;
    Ok(Json(engine.do_save(&params, &user).await?))
}

pub async fn do_delete<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<OperationResult>, EngineError> {
    engine.verify_token(&params, &user)?;
    Ok(Json(engine.do_delete(&params, &user).await?))
}

pub async fn validate_rules<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
) -> Json<ValidationRuleSet> {
    Json(engine.validation_rules().as_ref().clone())
}

pub async fn check_unique<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    params: RequestParams,
) -> Result<Json<bool>, EngineError> {
    Ok(Json(engine.check_unique(&params).await?))
}

pub async fn group_aggregate<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<PagedResult<Value>>, EngineError> {
    Ok(Json(engine.group_aggregate(&params, &user).await?))
}

pub async fn revisions<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<PagedResult<RevisionSnapshot>>, EngineError> {
    Ok(Json(engine.revision_list(&params, &user).await?))
}

pub async fn revision_compare<E: Entity, S: Store<E>>(
    State(engine): State<AppState<E, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<RevisionComparison>, EngineError> {
    Ok(Json(engine.revision_compare(&params, &user).await?))
}

/// `state=enable|disable` over the users named by `ids`.
pub async fn user_do_state<S: Store<User>>(
    State(engine): State<AppState<User, S>>,
    user: UserContext,
    params: RequestParams,
) -> Result<Json<OperationResult>, EngineError> {
    engine.verify_token(&params, &user)?;
    Ok(Json(do_state(&engine, &params, &user).await?))
}
