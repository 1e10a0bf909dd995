use anyhow::{anyhow, Result};
use log::{debug, error};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::EngineError;
use crate::logic::property_filter::value_to_text;
use crate::model::{DateDisplay, Entity, EntitySchema, FieldDef, FieldKind, ValueType};

fn is_false(value: &bool) -> bool {
    !*value
}

/// Client-side constraints derived for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxlength: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minlength: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub date: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub timestamp: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub number: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub integer: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub email: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltips: Option<String>,
    /// `regex`, anchored and compiled once when the rule set is derived.
    #[serde(skip)]
    pub matcher: Option<FullMatch>,
}

impl ConstraintSet {
    pub fn is_empty(&self) -> bool {
        self == &ConstraintSet::default()
    }
}

/// A pattern that must match the whole value.
#[derive(Debug, Clone)]
pub struct FullMatch(Regex);

impl FullMatch {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{})$", pattern)).map(Self)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for FullMatch {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for FullMatch {}

/// Field name to constraints, for one entity type.
pub type ValidationRuleSet = BTreeMap<String, ConstraintSet>;

/// Process-wide memo of compiled rule sets, keyed by entity type.
///
/// Lookups take the read lock only; a miss compiles outside any lock and
/// the first writer wins. Two threads racing on the first use of a type
/// may both compile, and both results are identical.
#[derive(Debug, Default)]
pub struct RuleCache {
    rules: RwLock<HashMap<&'static str, Arc<ValidationRuleSet>>>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules_for<E: Entity>(&self) -> Arc<ValidationRuleSet> {
        self.rules_for_schema(E::schema())
    }

    pub fn rules_for_schema(&self, schema: &'static EntitySchema) -> Arc<ValidationRuleSet> {
        if let Some(rules) = self.rules.read().get(schema.entity_type) {
            return rules.clone();
        }

        let compiled = Arc::new(ValidationRuleCompiler::compile_or_empty(schema));

        self.rules
            .write()
            .entry(schema.entity_type)
            .or_insert(compiled)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}

/// Derives constraint sets from declarative field metadata.
pub struct ValidationRuleCompiler;

impl ValidationRuleCompiler {
    /// Any derivation error is logged and yields an empty rule set.
    pub fn compile_or_empty(schema: &EntitySchema) -> ValidationRuleSet {
        match Self::compile(schema) {
            Ok(rules) => {
                debug!(
                    "Compiled {} validation rules for {}",
                    rules.len(),
                    schema.entity_type
                );
                rules
            }
            Err(e) => {
                error!(
                    "Failed to derive validation rules for {}: {:#}",
                    schema.entity_type, e
                );
                ValidationRuleSet::new()
            }
        }
    }

    pub fn compile(schema: &EntitySchema) -> Result<ValidationRuleSet> {
        let mut rules = ValidationRuleSet::new();

        for field in schema.declared_fields() {
            if field.name == "id" || field.transient || field.is_collection() {
                continue;
            }
            let constraints = Self::derive(field)?;
            if constraints.is_empty() {
                continue;
            }
            if matches!(field.kind, FieldKind::Reference { .. }) {
                rules.insert(format!("{}.id", field.name), constraints.clone());
            }
            rules.entry(field.name.to_string()).or_insert(constraints);
        }

        Ok(rules)
    }

    fn derive(field: &FieldDef) -> Result<ConstraintSet> {
        let mut rules = ConstraintSet {
            tooltips: field.tooltips.map(str::to_string),
            ..ConstraintSet::default()
        };
        let value_type = field.value_type();

        if let Some(column) = &field.column {
            if !column.nullable && value_type != Some(ValueType::Boolean) {
                rules.required = true;
            }
            if column.unique {
                rules.unique = true;
            }
            if !column.updatable {
                rules.readonly = true;
            }
            if column.length == 0 {
                return Err(anyhow!("{}: column length must be positive", field.name));
            }
            if value_type == Some(ValueType::Text) && !column.lob {
                rules.maxlength = Some(column.length);
            }
        }

        if field.join_column == Some(false) {
            rules.required = true;
        }

        match value_type {
            Some(ValueType::Date) => match field.date_display {
                Some(DateDisplay::DateTime) => rules.timestamp = true,
                Some(DateDisplay::DateOnly) | None => rules.date = true,
            },
            Some(ValueType::Decimal) => rules.number = true,
            Some(ValueType::Integer) => rules.integer = true,
            _ => {}
        }

        if let Some(size) = field.size {
            if size.min > size.max {
                return Err(anyhow!(
                    "{}: size bounds are inverted ({} > {})",
                    field.name,
                    size.min,
                    size.max
                ));
            }
            if size.min > 0 {
                rules.minlength = Some(size.min);
            }
            if size.max < u32::MAX {
                rules.maxlength = Some(size.max);
            }
        }

        if field.email {
            rules.email = true;
        }

        if let Some(pattern) = field.pattern {
            let matcher = FullMatch::new(pattern)
                .map_err(|e| anyhow!("{}: invalid pattern: {}", field.name, e))?;
            rules.regex = Some(pattern.to_string());
            rules.matcher = Some(matcher);
        }

        Ok(rules)
    }

    /// Check a bound entity against its rule set before it is saved.
    /// Uniqueness needs the store and is checked by the engine.
    pub fn validate<E: Entity>(entity: &E, rules: &ValidationRuleSet) -> Result<(), EngineError> {
        let schema = E::schema();
        let value = serde_json::to_value(entity)?;
        let mut problems = Vec::new();

        for (name, constraints) in rules {
            if name.ends_with(".id") {
                continue;
            }
            let label = schema.find_field(name).map_or(name.as_str(), |f| f.label);
            let text = value
                .get(name)
                .filter(|v| !v.is_null())
                .map(value_to_text)
                .unwrap_or_default();

            if text.trim().is_empty() {
                if constraints.required {
                    problems.push(format!("{} is required", label));
                }
                continue;
            }

            let length = text.chars().count() as u32;
            if let Some(max) = constraints.maxlength {
                if length > max {
                    problems.push(format!("{} must be at most {} characters", label, max));
                }
            }
            if let Some(min) = constraints.minlength {
                if length < min {
                    problems.push(format!("{} must be at least {} characters", label, min));
                }
            }
            if constraints.email && !looks_like_email(&text) {
                problems.push(format!("{} is not a valid email address", label));
            }
            if let Some(matcher) = &constraints.matcher {
                if !matcher.is_match(&text) {
                    problems.push(format!("{} has an invalid format", label));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(EngineError::validation(problems.join("; ")))
        }
    }
}

fn looks_like_email(text: &str) -> bool {
    match text.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::Role;
    use crate::domain::user::User;
    use crate::model::{ColumnDef, FieldDef};
    use std::sync::OnceLock;

    #[test]
    fn derives_constraints_from_metadata() {
        let rules = ValidationRuleCompiler::compile(User::schema()).unwrap();

        let signinid = &rules["signinid"];
        assert!(signinid.required);
        assert!(signinid.unique);
        assert!(signinid.readonly);
        assert_eq!(signinid.maxlength, Some(64));

        assert!(rules["email"].email);
        assert!(rules["aclType"].integer);
        assert!(rules["department"].required);
        assert_eq!(rules["department.id"], rules["department"]);
        assert!(rules["createdAt"].timestamp);

        // booleans never become required, ids and collections are skipped
        assert!(!rules.get("enabled").map_or(false, |r| r.required));
        assert!(!rules.contains_key("id"));
        assert!(!rules.contains_key("version"));
    }

    #[test]
    fn lob_text_has_no_max_length() {
        let rules = ValidationRuleCompiler::compile(Role::schema()).unwrap();
        assert!(!rules.contains_key("description"));
        assert_eq!(rules["code"].regex.as_deref(), Some("ROLE_[A-Z0-9_]+"));
    }

    #[test]
    fn patterns_are_compiled_with_the_rule_set() {
        let rules = ValidationRuleCompiler::compile(Role::schema()).unwrap();
        let matcher = rules["code"].matcher.as_ref().unwrap();
        assert_eq!(matcher.as_str(), "^(?:ROLE_[A-Z0-9_]+)$");
        assert!(matcher.is_match("ROLE_OPS"));
        assert!(!matcher.is_match("xROLE_OPS"));

        let role = Role {
            code: "role_ops".to_string(),
            name: "Ops".to_string(),
            ..Role::default()
        };
        let err = ValidationRuleCompiler::validate(&role, &rules).unwrap_err();
        assert!(err.to_string().contains("invalid format"));
    }

    fn broken() -> &'static EntitySchema {
        static BROKEN: OnceLock<EntitySchema> = OnceLock::new();
        BROKEN.get_or_init(|| {
            EntitySchema::new("broken", "Broken", EntitySchema::root())
                .field(FieldDef::text("code", "Code").column(ColumnDef::new().not_null()))
                .field(FieldDef::text("bad", "Bad").pattern("(unclosed"))
        })
    }

    #[test]
    fn derivation_failure_yields_empty_rules() {
        assert!(ValidationRuleCompiler::compile(broken()).is_err());
        let cache = RuleCache::new();
        assert!(cache.rules_for_schema(broken()).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_first_use_yields_identical_rules() {
        let cache = RuleCache::new();
        let results: Vec<Arc<ValidationRuleSet>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| cache.rules_for::<User>()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let first = &results[0];
        for rules in &results {
            assert_eq!(rules.keys().collect::<Vec<_>>(), first.keys().collect::<Vec<_>>());
            assert_eq!(**rules, **first);
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn validate_reports_missing_and_malformed_values() {
        let rules = ValidationRuleCompiler::compile(User::schema()).unwrap();
        let mut user = User::default();
        user.email = Some("not-an-email".to_string());

        let err = ValidationRuleCompiler::validate(&user, &rules).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Sign-in ID is required"));
        assert!(message.contains("not a valid email"));
    }
}
