use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::model::RequestParams;

/// Comparison applied by a property filter. The request form is
/// `<MATCH>_<property>` (for example `CN_name` or `EQ_parent.id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// contains
    Cn,
    /// begins with
    Bw,
    /// ends with
    Ew,
    In,
    /// not null
    Nn,
    /// null
    Nu,
    /// between, inclusive
    Bt,
    /// value starts with one of the given prefixes
    Aclprefixs,
}

impl MatchType {
    pub fn takes_value(&self) -> bool {
        !matches!(self, MatchType::Nn | MatchType::Nu)
    }
}

impl FromStr for MatchType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let match_type = match s {
            "EQ" => MatchType::Eq,
            "NE" => MatchType::Ne,
            "LT" => MatchType::Lt,
            "LE" => MatchType::Le,
            "GT" => MatchType::Gt,
            "GE" => MatchType::Ge,
            "CN" => MatchType::Cn,
            "BW" => MatchType::Bw,
            "EW" => MatchType::Ew,
            "IN" => MatchType::In,
            "NN" => MatchType::Nn,
            "NU" => MatchType::Nu,
            "BT" => MatchType::Bt,
            "ACLPREFIXS" => MatchType::Aclprefixs,
            _ => return Err(()),
        };
        Ok(match_type)
    }
}

/// One predicate. Several property names are OR-ed together
/// (`CN_code_OR_name=abc` matches either property).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub match_type: MatchType,
    pub properties: Vec<String>,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl PropertyFilter {
    pub fn new(match_type: MatchType, property: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            match_type,
            properties: vec![property.into()],
            values,
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(MatchType::Eq, property, vec![value.into()])
    }

    pub fn is_null(property: impl Into<String>) -> Self {
        Self::new(MatchType::Nu, property, Vec::new())
    }

    /// Parse a single `<MATCH>_<property>` request parameter.
    pub fn from_param(key: &str, raw: &str) -> Option<Self> {
        let (prefix, properties) = key.split_once('_')?;
        let match_type = prefix.parse::<MatchType>().ok()?;
        let properties: Vec<String> = properties
            .split("_OR_")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if properties.is_empty() {
            return None;
        }

        let raw = raw.trim();
        if match_type.takes_value() && raw.is_empty() {
            return None;
        }
        let values = match match_type {
            MatchType::Nn | MatchType::Nu => Vec::new(),
            MatchType::In | MatchType::Bt | MatchType::Aclprefixs => raw
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| Value::String(v.to_string()))
                .collect(),
            _ => vec![Value::String(raw.to_string())],
        };

        Some(Self {
            match_type,
            properties,
            values,
        })
    }
}

/// Client predicates plus the predicates the entity policy forces on top.
///
/// A row matches when every client predicate matches AND every forced one
/// matches; client parameters have no way to reach the forced list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupFilter {
    pub filters: Vec<PropertyFilter>,
    forced: Vec<PropertyFilter>,
}

impl GroupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &RequestParams) -> Self {
        let filters = params
            .pairs()
            .iter()
            .filter_map(|(key, value)| PropertyFilter::from_param(key, value))
            .collect();
        Self {
            filters,
            forced: Vec::new(),
        }
    }

    pub fn and(mut self, filter: PropertyFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn force_and(&mut self, filter: PropertyFilter) {
        self.forced.push(filter);
    }

    pub fn forced(&self) -> &[PropertyFilter] {
        &self.forced
    }

    /// True when the client supplied no search predicates at all.
    pub fn is_empty_search(&self) -> bool {
        self.filters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub property: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: SortDirection::Desc,
        }
    }

    /// `name` or `name,desc`.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(',').map(str::trim);
        let property = parts.next().filter(|p| !p.is_empty())?;
        let direction = match parts.next().map(|d| d.to_ascii_lowercase()) {
            Some(d) if d == "desc" => SortDirection::Desc,
            _ => SortDirection::Asc,
        };
        Some(Self {
            property: property.to_string(),
            direction,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: usize,
    pub size: usize,
    pub sort: Vec<SortOrder>,
}

impl PageRequest {
    pub fn from_params(params: &RequestParams, default_size: usize, max_size: usize) -> Self {
        let page = params
            .get("page")
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);
        let size = params
            .get("rows")
            .or_else(|| params.get("size"))
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(default_size)
            .min(max_size);
        let sort = params
            .get_all("sort")
            .into_iter()
            .filter_map(SortOrder::parse)
            .collect();

        Self { page, size, sort }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

/// Paged query envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub content: Vec<T>,
    pub total_elements: usize,
    pub total_pages: usize,
    /// 1-based page number.
    pub number: usize,
    pub size: usize,
}

impl<T> PagedResult<T> {
    /// Slice one page out of a fully materialized, already sorted list.
    pub fn from_all(all: Vec<T>, page: &PageRequest) -> Self {
        let total_elements = all.len();
        let total_pages = if page.size == 0 {
            0
        } else {
            (total_elements + page.size - 1) / page.size
        };
        let content = all
            .into_iter()
            .skip(page.offset())
            .take(page.size)
            .collect();
        Self {
            content,
            total_elements,
            total_pages,
            number: page.page,
            size: page.size,
        }
    }
}

/// Formats the query endpoint can divert into instead of paged JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Verb;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::new(
            Verb::Read,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn parses_match_prefixed_params() {
        let filter = GroupFilter::from_params(&params(&[
            ("CN_code_OR_name", "adm"),
            ("IN_aclType", "1, 2,,3"),
            ("NU_parent", ""),
            ("EQ_name", "  "),
            ("page", "2"),
            ("XX_name", "ignored"),
        ]));

        assert_eq!(filter.filters.len(), 3);
        assert_eq!(filter.filters[0].properties, vec!["code", "name"]);
        assert_eq!(filter.filters[1].values.len(), 3);
        assert_eq!(filter.filters[2].match_type, MatchType::Nu);
        assert!(!filter.is_empty_search());
    }

    #[test]
    fn page_request_clamps_size() {
        let page = PageRequest::from_params(
            &params(&[("page", "3"), ("rows", "1000"), ("sort", "name,desc")]),
            20,
            100,
        );
        assert_eq!(page.page, 3);
        assert_eq!(page.size, 100);
        assert_eq!(page.sort, vec![SortOrder::desc("name")]);
        assert_eq!(page.offset(), 200);
    }

    #[test]
    fn paged_result_slices() {
        let page = PageRequest {
            page: 2,
            size: 2,
            sort: Vec::new(),
        };
        let result = PagedResult::from_all(vec![1, 2, 3, 4, 5], &page);
        assert_eq!(result.content, vec![3, 4]);
        assert_eq!(result.total_elements, 5);
        assert_eq!(result.total_pages, 3);
    }

    #[test]
    fn huge_page_number_yields_empty_page() {
        let huge = usize::MAX.to_string();
        let page = PageRequest::from_params(&params(&[("page", huge.as_str())]), 20, 100);
        assert_eq!(page.offset(), usize::MAX);

        let result = PagedResult::from_all(vec![1, 2, 3], &page);
        assert!(result.content.is_empty());
        assert_eq!(result.total_elements, 3);
    }
}
