use chrono::Utc;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::EngineError;
use crate::logic::batch::{BatchExecutor, BatchTarget};
use crate::logic::property_filter::{extract, value_to_text};
use crate::logic::query::{QueryFacade, QueryOutcome, SelectOption};
use crate::logic::revision_diff::RevisionDiffEngine;
use crate::logic::token_guard::TokenGuard;
use crate::logic::validation_rules::{RuleCache, ValidationRuleCompiler, ValidationRuleSet};
use crate::logic::{BindingPipeline, EntityPolicy, IdentityResolver};
use crate::model::{
    AuditContext, Entity, EntityId, GroupFilter, OperationResult, PageRequest, PagedResult,
    PropertyFilter, RequestParams, RevisionComparison, RevisionSnapshot, UserContext, Verb,
};
use crate::store::traits::Store;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 500,
        }
    }
}

/// Components shared by every engine in the process.
#[derive(Debug, Clone, Default)]
pub struct SharedServices {
    pub rules: Arc<RuleCache>,
    pub tokens: Arc<TokenGuard>,
    pub settings: EngineSettings,
}

/// The generic entity operation engine for one entity type.
pub struct EntityEngine<E: Entity, S: Store<E>> {
    store: Arc<S>,
    policy: Arc<dyn EntityPolicy<E>>,
    shared: SharedServices,
}

impl<E: Entity, S: Store<E>> EntityEngine<E, S> {
    /// Fails with `Configuration` when the entity's schema and its
    /// serialized form disagree.
    pub fn new(
        store: Arc<S>,
        policy: Arc<dyn EntityPolicy<E>>,
        shared: SharedServices,
    ) -> Result<Self, EngineError> {
        Self::check_schema()?;
        info!(
            "Registered {} engine ({:?} ids)",
            E::schema().entity_type,
            <E::Id as EntityId>::KIND
        );
        Ok(Self {
            store,
            policy,
            shared,
        })
    }

    fn check_schema() -> Result<(), EngineError> {
        let schema = E::schema();
        let sample = serde_json::to_value(E::default())?;
        let Some(object) = sample.as_object() else {
            return Err(EngineError::Configuration(format!(
                "{} must serialize to a JSON object",
                schema.entity_type
            )));
        };

        let mut seen = HashSet::new();
        for field in schema.all_fields() {
            if !seen.insert(field.name) {
                return Err(EngineError::Configuration(format!(
                    "{} declares field '{}' more than once",
                    schema.entity_type, field.name
                )));
            }
            if !field.transient && !object.contains_key(field.name) {
                return Err(EngineError::Configuration(format!(
                    "{} field '{}' is missing from its serialized form",
                    schema.entity_type, field.name
                )));
            }
            if field.comparable && field.is_collection() {
                return Err(EngineError::Configuration(format!(
                    "{} collection '{}' cannot be comparable",
                    schema.entity_type, field.name
                )));
            }
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn page_request(&self, params: &RequestParams) -> PageRequest {
        PageRequest::from_params(
            params,
            self.shared.settings.default_page_size,
            self.shared.settings.max_page_size,
        )
    }

    fn audit(user: &UserContext, event: &str) -> AuditContext {
        AuditContext::new(user.user_id.clone(), event)
    }

    /// Reject replayed form submissions for this session.
    pub fn verify_token(&self, params: &RequestParams, user: &UserContext) -> Result<(), EngineError> {
        self.shared.tokens.verify(user.session_key(), params)
    }

    /// The request's working entity.
    pub async fn prepare(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<Option<E>, EngineError> {
        BindingPipeline::prepare(&*self.store, &*self.policy, params, user).await
    }

    pub async fn view(&self, params: &RequestParams, user: &UserContext) -> Result<E, EngineError> {
        let read = RequestParams::new(Verb::Read, params.pairs().to_vec());
        self.prepare(&read, user)
            .await?
            .ok_or_else(|| EngineError::validation("id is required"))
    }

    pub async fn do_create(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<OperationResult, EngineError> {
        let entity = self.working_entity(params, user).await?;
        if !entity.is_new() {
            return Err(EngineError::validation("do-create does not accept an existing record"));
        }
        let saved = self.create(entity, user, "do-create").await?;
        Ok(OperationResult::success("Created").with_data(serde_json::to_value(saved)?))
    }

    pub async fn do_update(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<OperationResult, EngineError> {
        let entity = self.working_entity(params, user).await?;
        if entity.is_new() {
            return Err(EngineError::validation("id is required for update"));
        }
        let saved = self.update(entity, user, "do-update").await?;
        Ok(OperationResult::success("Updated").with_data(serde_json::to_value(saved)?))
    }

    /// Create or update depending on whether the working entity is new.
    pub async fn do_save(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<OperationResult, EngineError> {
        let entity = self.working_entity(params, user).await?;
        let saved = if entity.is_new() {
            self.create(entity, user, "do-save").await?
        } else {
            self.update(entity, user, "do-save").await?
        };
        Ok(OperationResult::success("Saved").with_data(serde_json::to_value(saved)?))
    }

    async fn working_entity(&self, params: &RequestParams, user: &UserContext) -> Result<E, EngineError> {
        let mutation = RequestParams::new(Verb::Mutation, params.pairs().to_vec());
        self.prepare(&mutation, user)
            .await?
            .ok_or_else(|| EngineError::validation("nothing to save"))
    }

    async fn create(&self, mut entity: E, user: &UserContext, event: &str) -> Result<E, EngineError> {
        if let Some(reason) = self.policy.is_disallow_create(&entity, user) {
            return Err(EngineError::PreconditionRejected(reason));
        }
        self.policy.prepare_save(&mut entity, user)?;
        entity.on_create(&user.user_id, Utc::now());
        self.validate(&entity, true).await?;
        Ok(self.store.save(entity, &Self::audit(user, event)).await?)
    }

    async fn update(&self, mut entity: E, user: &UserContext, event: &str) -> Result<E, EngineError> {
        if let Some(reason) = self.policy.is_disallow_update(&entity, user) {
            return Err(EngineError::PreconditionRejected(reason));
        }
        self.policy.prepare_save(&mut entity, user)?;
        self.validate(&entity, false).await?;
        Ok(self.store.save(entity, &Self::audit(user, event)).await?)
    }

    /// Field constraints, then uniqueness of every unique column.
    /// `creating` is fixed before policy hooks run, as they may assign an id.
    async fn validate(&self, entity: &E, creating: bool) -> Result<(), EngineError> {
        ValidationRuleCompiler::validate(entity, &self.validation_rules())?;

        let value = serde_json::to_value(entity)?;
        for field in E::schema().declared_fields() {
            if !field.column.as_ref().map_or(false, |c| c.unique) {
                continue;
            }
            let Some(current) = extract(&value, field.name) else {
                continue;
            };
            let filter = GroupFilter::new().and(PropertyFilter::eq(field.name, current.clone()));
            let clash = self
                .store
                .find_all(&filter, &[])
                .await?
                .into_iter()
                .any(|other| creating || other.id() != entity.id());
            if clash {
                return Err(EngineError::validation(format!(
                    "{} '{}' already exists",
                    field.label,
                    value_to_text(current)
                )));
            }
        }
        Ok(())
    }

    /// Delete every entity named by `ids`, independently.
    pub async fn do_delete(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<OperationResult, EngineError> {
        let targets = self.resolve_targets(params).await?;
        Ok(BatchExecutor::execute("Delete", targets, move |entity| self.delete_one(entity, user)).await)
    }

    async fn delete_one(&self, entity: E, user: &UserContext) -> Result<(), EngineError> {
        self.policy.check_permission(&entity, user)?;
        if entity.is_new() {
            return Err(EngineError::PreconditionRejected(
                "unsaved record cannot be deleted".to_string(),
            ));
        }
        if let Some(reason) = self.policy.is_disallow_delete(&entity, user) {
            return Err(EngineError::PreconditionRejected(reason));
        }
        self.store.delete(&entity, &Self::audit(user, "do-delete")).await?;
        Ok(())
    }

    /// Apply `mutate` to every entity named by `ids` and save it. Each item
    /// passes the permission and update checks on its own.
    pub async fn batch_update<F>(
        &self,
        operation: &str,
        event: &str,
        params: &RequestParams,
        user: &UserContext,
        mutate: F,
    ) -> Result<OperationResult, EngineError>
    where
        F: Fn(&mut E) + Send + Sync,
    {
        let targets = self.resolve_targets(params).await?;
        let mutate = &mutate;
        Ok(BatchExecutor::execute(operation, targets, move |mut entity| async move {
            self.policy.check_permission(&entity, user)?;
            mutate(&mut entity);
            self.update(entity, user, event).await?;
            Ok::<(), EngineError>(())
        })
        .await)
    }

    /// Distinct ids from `ids`, each resolved to a detached copy or a
    /// not-found failure for that id.
    async fn resolve_targets(&self, params: &RequestParams) -> Result<Vec<BatchTarget<E>>, EngineError> {
        let ids = IdentityResolver::parse_ids::<E::Id>(params.get_all("ids"))?;
        let label = E::schema().label;
        let mut targets = Vec::with_capacity(ids.len());
        for id in ids {
            let key = id.to_string();
            match self.store.find_detached_one(&id).await? {
                Some(entity) => targets.push(BatchTarget::found(key, entity)),
                None => {
                    let message = format!("{} '{}' not found", label, key);
                    targets.push(BatchTarget::missing(key, EngineError::not_found(message)));
                }
            }
        }
        debug!("Resolved {} batch target(s) for {}", targets.len(), label);
        Ok(targets)
    }

    pub async fn find_by_page(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<QueryOutcome<E>, EngineError> {
        let export = QueryFacade::export_format(params)?;
        let filter = QueryFacade::build_filter::<E, _>(&*self.policy, params, user);
        let page = self.page_request(params);
        QueryFacade::find_by_page(&*self.store, &filter, &page, export).await
    }

    pub async fn select_options(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<Vec<SelectOption>, EngineError> {
        let filter = QueryFacade::build_filter::<E, _>(&*self.policy, params, user);
        let page = self.page_request(params);
        QueryFacade::select_options(&*self.store, &filter, &page).await
    }

    pub async fn check_unique(&self, params: &RequestParams) -> Result<bool, EngineError> {
        let id = IdentityResolver::resolve::<E::Id>(params.get("id"))?;
        QueryFacade::check_unique(&*self.store, params, id.as_ref()).await
    }

    pub async fn group_aggregate(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<PagedResult<serde_json::Value>, EngineError> {
        let group_by: Vec<String> = params
            .get_all("group_by")
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let filter = QueryFacade::build_filter::<E, _>(&*self.policy, params, user);
        let page = self.page_request(params);
        QueryFacade::group_aggregate(&*self.store, &filter, &group_by, &page).await
    }

    pub fn validation_rules(&self) -> Arc<ValidationRuleSet> {
        self.shared.rules.rules_for::<E>()
    }

    fn required_id(params: &RequestParams) -> Result<E::Id, EngineError> {
        IdentityResolver::resolve::<E::Id>(params.get("id"))?
            .ok_or_else(|| EngineError::validation("id is required"))
    }

    /// Revisions are visible only while the caller may see the live record;
    /// records already deleted are not checked.
    async fn check_history_access(&self, id: &E::Id, user: &UserContext) -> Result<(), EngineError> {
        if let Some(entity) = self.store.find_one(id).await? {
            self.policy.check_permission(&entity, user)?;
        }
        Ok(())
    }

    /// Revisions of one entity, newest first. With `property`, the tri-state
    /// `changed` keeps only revisions where that property did (or did not)
    /// change against the previous revision.
    pub async fn revision_list(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<PagedResult<RevisionSnapshot>, EngineError> {
        let id = Self::required_id(params)?;
        self.check_history_access(&id, user).await?;

        let snapshots = self.store.find_revisions(&id).await?;
        let changed = match params.get_non_blank("changed") {
            None => None,
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                return Err(EngineError::validation(format!("changed must be true or false, got '{}'", other)))
            }
        };

        let mut kept = Vec::with_capacity(snapshots.len());
        let mut previous: Option<serde_json::Value> = None;
        for mut snapshot in snapshots {
            let keep = match (params.get_non_blank("property"), changed) {
                (Some(property), Some(wanted)) => {
                    let current = extract(&snapshot.entity, property).cloned();
                    let did_change = match &previous {
                        Some(prev) => extract(prev, property).cloned() != current,
                        None => current.is_some(),
                    };
                    did_change == wanted
                }
                _ => true,
            };
            previous = Some(snapshot.entity.clone());
            if keep {
                snapshot.old_state_display = snapshot
                    .old_state
                    .as_deref()
                    .map(|s| self.policy.convert_state_to_display(s));
                snapshot.new_state_display = snapshot
                    .new_state
                    .as_deref()
                    .map(|s| self.policy.convert_state_to_display(s));
                kept.push(snapshot);
            }
        }
        kept.reverse();

        Ok(PagedResult::from_all(kept, &self.page_request(params)))
    }

    pub async fn revision_compare(
        &self,
        params: &RequestParams,
        user: &UserContext,
    ) -> Result<RevisionComparison, EngineError> {
        let id = Self::required_id(params)?;
        let rev_left = parse_rev(params, "revLeft")?;
        let rev_right = parse_rev(params, "revRight")?;
        self.check_history_access(&id, user).await?;

        let snapshots = self
            .store
            .find_revisions_at(&id, &[rev_left, rev_right])
            .await?;
        let rows =
            RevisionDiffEngine::diff(&*self.store, E::schema(), &snapshots, rev_left, rev_right).await;

        let pick = |rev: i64| snapshots.iter().find(|s| s.rev == rev).cloned();
        Ok(RevisionComparison {
            entity_id: id.to_string(),
            rev_left,
            rev_right,
            left: pick(rev_left),
            right: pick(rev_right),
            rows,
        })
    }
}

fn parse_rev(params: &RequestParams, key: &str) -> Result<i64, EngineError> {
    let raw = params
        .get_non_blank(key)
        .ok_or_else(|| EngineError::validation(format!("{} is required", key)))?;
    raw.parse::<i64>()
        .map_err(|_| EngineError::validation(format!("{} must be a revision number", key)))
}
