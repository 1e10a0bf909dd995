use itertools::Itertools;
use log::debug;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::logic::export::{ExportFile, GridExporter};
use crate::logic::property_filter::{extract, value_to_text, PropertyFilterEvaluator};
use crate::logic::EntityPolicy;
use crate::model::{
    Entity, ExportFormat, GroupFilter, PageRequest, PagedResult, PropertyFilter, RequestParams,
    UserContext,
};
use crate::store::traits::EntityStore;

/// Request parameter selecting a file export instead of paged JSON.
pub const EXPORT_FORMAT_PARAM: &str = "_format_";

/// What the paged query endpoint produced.
#[derive(Debug)]
pub enum QueryOutcome<E> {
    Page(PagedResult<E>),
    Exported(ExportFile),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SelectOption {
    pub id: String,
    pub display: String,
}

/// Filter-driven querying with policy-forced scope predicates.
pub struct QueryFacade;

impl QueryFacade {
    /// Client filter from the request, then the policy's forced predicates.
    pub fn build_filter<E: Entity, P: EntityPolicy<E> + ?Sized>(
        policy: &P,
        params: &RequestParams,
        user: &UserContext,
    ) -> GroupFilter {
        let mut filter = GroupFilter::from_params(params);
        policy.append_scope_filter(&mut filter, user);
        debug!(
            "{} query: {} client predicate(s), {} forced",
            E::schema().entity_type,
            filter.filters.len(),
            filter.forced().len()
        );
        filter
    }

    pub fn export_format(params: &RequestParams) -> Result<Option<ExportFormat>, EngineError> {
        match params.get_non_blank(EXPORT_FORMAT_PARAM) {
            None => Ok(None),
            Some(format) if format.eq_ignore_ascii_case("csv") => Ok(Some(ExportFormat::Csv)),
            Some(other) => Err(EngineError::unsupported(format!("export format '{}'", other))),
        }
    }

    /// Paged JSON, or, when an export format is requested, every matching
    /// row rendered as a file and no page at all.
    pub async fn find_by_page<E, S>(
        store: &S,
        filter: &GroupFilter,
        page: &PageRequest,
        export: Option<ExportFormat>,
    ) -> Result<QueryOutcome<E>, EngineError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        let all = store.find_all(filter, &page.sort).await?;

        if let Some(format) = export {
            let rows = all
                .iter()
                .map(serde_json::to_value)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(QueryOutcome::Exported(GridExporter::export(
                E::schema(),
                format,
                &rows,
            )));
        }

        Ok(QueryOutcome::Page(PagedResult::from_all(all, page)))
    }

    pub async fn select_options<E, S>(
        store: &S,
        filter: &GroupFilter,
        page: &PageRequest,
    ) -> Result<Vec<SelectOption>, EngineError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        let all = store.find_all(filter, &page.sort).await?;
        Ok(all
            .iter()
            .filter_map(|entity| {
                entity.id_string().map(|id| SelectOption {
                    id,
                    display: entity.display(),
                })
            })
            .collect())
    }

    /// True when no record other than `exclude_id` has the same values for
    /// `element` and the optional additional properties.
    pub async fn check_unique<E, S>(
        store: &S,
        params: &RequestParams,
        exclude_id: Option<&E::Id>,
    ) -> Result<bool, EngineError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        let Some(element) = params.get_non_blank("element") else {
            return Err(EngineError::validation("element is required"));
        };

        let mut filter = GroupFilter::new();
        for property in std::iter::once(element)
            .chain(params.get_non_blank("additional"))
            .chain(params.get_non_blank("additional2"))
        {
            match params.get(property) {
                Some(value) if !value.trim().is_empty() => {
                    filter = filter.and(PropertyFilter::eq(property, value.trim()));
                }
                _ => filter = filter.and(PropertyFilter::is_null(property)),
            }
        }

        let matches = store.find_all(&filter, &[]).await?;
        let conflict = matches
            .iter()
            .any(|entity| exclude_id.map_or(true, |id| entity.id() != Some(id)));
        Ok(!conflict)
    }

    /// Group matching rows by `group_by` (comma list) and count each group.
    pub async fn group_aggregate<E, S>(
        store: &S,
        filter: &GroupFilter,
        group_by: &[String],
        page: &PageRequest,
    ) -> Result<PagedResult<Value>, EngineError>
    where
        E: Entity,
        S: EntityStore<E> + ?Sized,
    {
        if group_by.is_empty() {
            return Err(EngineError::validation("group_by is required"));
        }

        let rows = store
            .find_all(filter, &[])
            .await?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: BTreeMap<Vec<String>, usize> = BTreeMap::new();
        for row in &rows {
            let key = group_by
                .iter()
                .map(|property| extract(row, property).map(value_to_text).unwrap_or_default())
                .collect_vec();
            *groups.entry(key).or_default() += 1;
        }

        let mut aggregated: Vec<Value> = groups
            .into_iter()
            .map(|(key, count)| {
                let mut object = Map::new();
                for (property, value) in group_by.iter().zip(key) {
                    object.insert(property.clone(), Value::String(value));
                }
                object.insert("count".to_string(), json!(count));
                Value::Object(object)
            })
            .collect();
        PropertyFilterEvaluator::sort_rows(&mut aggregated, &page.sort);

        Ok(PagedResult::from_all(aggregated, page))
    }
}
