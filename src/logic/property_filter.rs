use serde_json::Value;
use std::cmp::Ordering;

use crate::model::{GroupFilter, MatchType, PropertyFilter, SortDirection, SortOrder};

/// Dotted property path into a serialized entity, e.g. `parent.id`.
pub fn extract<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = row;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Text form used for comparison, CSV export and revision display.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(map) => match map.get("id") {
            Some(id) => value_to_text(id),
            None => value.to_string(),
        },
        Value::Array(_) => value.to_string(),
    }
}

/// Evaluates group filters against serialized entities.
pub struct PropertyFilterEvaluator;

impl PropertyFilterEvaluator {
    /// Keep the rows matching every client predicate and every forced predicate.
    pub fn filter_rows(rows: Vec<Value>, filter: &GroupFilter) -> Vec<Value> {
        rows.into_iter()
            .filter(|row| Self::matches(row, filter))
            .collect()
    }

    pub fn matches(row: &Value, filter: &GroupFilter) -> bool {
        filter
            .filters
            .iter()
            .chain(filter.forced().iter())
            .all(|predicate| Self::evaluate(row, predicate))
    }

    /// A predicate over several properties matches when any of them does.
    pub fn evaluate(row: &Value, predicate: &PropertyFilter) -> bool {
        predicate
            .properties
            .iter()
            .any(|property| Self::evaluate_property(extract(row, property), predicate))
    }

    fn evaluate_property(actual: Option<&Value>, predicate: &PropertyFilter) -> bool {
        let first = predicate.values.first();
        match predicate.match_type {
            MatchType::Nu => actual.is_none(),
            MatchType::Nn => actual.is_some(),
            MatchType::Eq => Self::compare(actual, first) == Some(Ordering::Equal),
            MatchType::Ne => Self::compare(actual, first) != Some(Ordering::Equal),
            MatchType::Lt => Self::compare(actual, first) == Some(Ordering::Less),
            MatchType::Le => matches!(
                Self::compare(actual, first),
                Some(Ordering::Less | Ordering::Equal)
            ),
            MatchType::Gt => Self::compare(actual, first) == Some(Ordering::Greater),
            MatchType::Ge => matches!(
                Self::compare(actual, first),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            MatchType::Cn => Self::text_test(actual, first, |a, b| a.contains(b)),
            MatchType::Bw => Self::text_test(actual, first, |a, b| a.starts_with(b)),
            MatchType::Ew => Self::text_test(actual, first, |a, b| a.ends_with(b)),
            MatchType::In => predicate
                .values
                .iter()
                .any(|v| Self::compare(actual, Some(v)) == Some(Ordering::Equal)),
            MatchType::Bt => match (predicate.values.first(), predicate.values.get(1)) {
                (Some(low), Some(high)) => {
                    matches!(
                        Self::compare(actual, Some(low)),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        Self::compare(actual, Some(high)),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
                _ => false,
            },
            MatchType::Aclprefixs => match actual {
                Some(actual) => {
                    let actual = value_to_text(actual);
                    predicate
                        .values
                        .iter()
                        .any(|prefix| actual.starts_with(&value_to_text(prefix)))
                }
                None => false,
            },
        }
    }

    fn text_test<F>(actual: Option<&Value>, expected: Option<&Value>, test: F) -> bool
    where
        F: Fn(&str, &str) -> bool,
    {
        match (actual, expected) {
            (Some(actual), Some(expected)) => test(
                &value_to_text(actual).to_lowercase(),
                &value_to_text(expected).to_lowercase(),
            ),
            _ => false,
        }
    }

    /// Numbers compare numerically (strings holding numbers included),
    /// everything else by text form. `None` when either side is missing.
    pub fn compare(left: Option<&Value>, right: Option<&Value>) -> Option<Ordering> {
        let (left, right) = (left?, right?);
        match (Self::as_number(left), Self::as_number(right)) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => Some(value_to_text(left).cmp(&value_to_text(right))),
        }
    }

    fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Stable multi-key sort; missing values sort first.
    pub fn sort_rows(rows: &mut [Value], sort: &[SortOrder]) {
        if sort.is_empty() {
            return;
        }
        rows.sort_by(|a, b| {
            for order in sort {
                let left = extract(a, &order.property);
                let right = extract(b, &order.property);
                let ordering = match (left, right) {
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                    (l, r) => Self::compare(l, r).unwrap_or(Ordering::Equal),
                };
                let ordering = match order.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![
            json!({"id": "D10", "code": "D10", "name": "Head Office", "parent": null, "level": 1}),
            json!({"id": "D1010", "code": "D1010", "name": "Finance", "parent": {"id": "D10"}, "level": 2}),
            json!({"id": "D20", "code": "D20", "name": "Plant", "parent": null, "level": 1}),
        ]
    }

    #[test]
    fn test_eq_and_nested_paths() {
        let filter = GroupFilter::new().and(PropertyFilter::eq("parent.id", "D10"));
        let matched = PropertyFilterEvaluator::filter_rows(rows(), &filter);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["name"], "Finance");
    }

    #[test]
    fn test_null_checks() {
        let filter = GroupFilter::new().and(PropertyFilter::is_null("parent"));
        assert_eq!(PropertyFilterEvaluator::filter_rows(rows(), &filter).len(), 2);
    }

    #[test]
    fn test_numeric_comparison_from_text() {
        let filter = GroupFilter::new().and(PropertyFilter::new(
            MatchType::Le,
            "level",
            vec![json!("1")],
        ));
        assert_eq!(PropertyFilterEvaluator::filter_rows(rows(), &filter).len(), 2);
    }

    #[test]
    fn test_contains_across_or_properties() {
        let filter = PropertyFilter::from_param("CN_code_OR_name", "fin").unwrap();
        let filter = GroupFilter::new().and(filter);
        assert_eq!(PropertyFilterEvaluator::filter_rows(rows(), &filter).len(), 1);
    }

    #[test]
    fn test_forced_predicates_cannot_be_widened() {
        let mut filter = GroupFilter::new().and(PropertyFilter::eq("code", "D20"));
        filter.force_and(PropertyFilter::new(
            MatchType::Aclprefixs,
            "code",
            vec![json!("D10")],
        ));
        assert!(PropertyFilterEvaluator::filter_rows(rows(), &filter).is_empty());
    }

    #[test]
    fn test_sort_rows() {
        let mut all = rows();
        PropertyFilterEvaluator::sort_rows(
            &mut all,
            &[SortOrder::desc("level"), SortOrder::asc("name")],
        );
        let names: Vec<_> = all.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Finance", "Head Office", "Plant"]);
    }
}
