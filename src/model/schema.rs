use serde::Serialize;
use std::sync::OnceLock;

/// Scalar value types a field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Boolean,
    Integer,
    Decimal,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum FieldKind {
    Value { value_type: ValueType },
    /// To-one association, serialized as `{"id": ...}`.
    Reference { target: &'static str },
    Collection,
}

/// How a date field is rendered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateDisplay {
    DateOnly,
    DateTime,
}

/// Column declaration of a persistent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub nullable: bool,
    pub unique: bool,
    pub updatable: bool,
    pub length: u32,
    pub lob: bool,
}

impl Default for ColumnDef {
    fn default() -> Self {
        Self {
            nullable: true,
            unique: false,
            updatable: true,
            length: 255,
            lob: false,
        }
    }
}

impl ColumnDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_updatable(mut self) -> Self {
        self.updatable = false;
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    pub fn lob(mut self) -> Self {
        self.lob = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeDef {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub column: Option<ColumnDef>,
    /// `Some(nullable)` when the association is mapped through a join column.
    pub join_column: Option<bool>,
    pub date_display: Option<DateDisplay>,
    pub size: Option<SizeDef>,
    pub email: bool,
    pub pattern: Option<&'static str>,
    pub comparable: bool,
    pub bind_exempt: bool,
    /// Computed accessors that are neither persisted nor validated.
    pub transient: bool,
    pub tooltips: Option<&'static str>,
}

impl FieldDef {
    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            column: None,
            join_column: None,
            date_display: None,
            size: None,
            email: false,
            pattern: None,
            comparable: false,
            bind_exempt: false,
            transient: false,
            tooltips: None,
        }
    }

    pub fn value(name: &'static str, label: &'static str, value_type: ValueType) -> Self {
        Self::new(name, label, FieldKind::Value { value_type })
    }

    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::value(name, label, ValueType::Text)
    }

    pub fn boolean(name: &'static str, label: &'static str) -> Self {
        Self::value(name, label, ValueType::Boolean)
    }

    pub fn integer(name: &'static str, label: &'static str) -> Self {
        Self::value(name, label, ValueType::Integer)
    }

    pub fn decimal(name: &'static str, label: &'static str) -> Self {
        Self::value(name, label, ValueType::Decimal)
    }

    pub fn date(name: &'static str, label: &'static str, display: DateDisplay) -> Self {
        let mut field = Self::value(name, label, ValueType::Date);
        field.date_display = Some(display);
        field
    }

    /// A date field with no display declaration.
    pub fn raw_date(name: &'static str, label: &'static str) -> Self {
        Self::value(name, label, ValueType::Date)
    }

    pub fn reference(name: &'static str, label: &'static str, target: &'static str) -> Self {
        Self::new(name, label, FieldKind::Reference { target })
    }

    pub fn collection(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Collection)
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.column = Some(column);
        self
    }

    pub fn join_column(mut self, nullable: bool) -> Self {
        self.join_column = Some(nullable);
        self
    }

    pub fn size(mut self, min: u32, max: u32) -> Self {
        self.size = Some(SizeDef { min, max });
        self
    }

    pub fn email(mut self) -> Self {
        self.email = true;
        self
    }

    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn comparable(mut self) -> Self {
        self.comparable = true;
        self
    }

    pub fn bind_exempt(mut self) -> Self {
        self.bind_exempt = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn tooltips(mut self, tooltips: &'static str) -> Self {
        self.tooltips = Some(tooltips);
        self
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self.kind {
            FieldKind::Value { value_type } => Some(value_type),
            _ => None,
        }
    }

    pub fn reference_target(&self) -> Option<&'static str> {
        match self.kind {
            FieldKind::Reference { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self.kind, FieldKind::Collection)
    }
}

/// Declarative description of one entity type and its ancestors.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySchema {
    pub entity_type: &'static str,
    pub label: &'static str,
    pub fields: Vec<FieldDef>,
    #[serde(skip)]
    pub parent: Option<&'static EntitySchema>,
}

impl EntitySchema {
    pub fn new(entity_type: &'static str, label: &'static str, parent: &'static EntitySchema) -> Self {
        Self {
            entity_type,
            label,
            fields: Vec::new(),
            parent: Some(parent),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// The framework base every entity schema chain ends at.
    pub fn root() -> &'static EntitySchema {
        static ROOT: OnceLock<EntitySchema> = OnceLock::new();
        ROOT.get_or_init(|| EntitySchema {
            entity_type: "persistable",
            label: "Persistable",
            fields: vec![
                FieldDef::text("id", "ID"),
                FieldDef::integer("version", "Version"),
            ],
            parent: None,
        })
    }

    /// Shared audit columns stamped on first save.
    pub fn auditable() -> &'static EntitySchema {
        static AUDITABLE: OnceLock<EntitySchema> = OnceLock::new();
        AUDITABLE.get_or_init(|| {
            EntitySchema::new("auditable", "Auditable", EntitySchema::root())
                .field(
                    FieldDef::text("createdBy", "Created by")
                        .column(ColumnDef::new().not_updatable().length(64))
                        .bind_exempt(),
                )
                .field(
                    FieldDef::date("createdAt", "Created at", DateDisplay::DateTime)
                        .column(ColumnDef::new().not_updatable())
                        .bind_exempt(),
                )
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// This schema followed by its ancestors, root last.
    pub fn lineage(&self) -> Vec<&EntitySchema> {
        let mut chain = vec![self];
        let mut current = self.parent;
        while let Some(schema) = current {
            chain.push(schema);
            current = schema.parent;
        }
        chain
    }

    /// Every field declared on this schema and its ancestors, own fields first.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.lineage().into_iter().flat_map(|schema| schema.fields.iter())
    }

    /// Fields declared below the framework root.
    pub fn declared_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.lineage()
            .into_iter()
            .filter(|schema| !schema.is_root())
            .flat_map(|schema| schema.fields.iter())
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.all_fields().find(|field| field.name == name)
    }

    pub fn bind_exempt_fields(&self) -> Vec<&'static str> {
        self.all_fields()
            .filter(|field| field.bind_exempt)
            .map(|field| field.name)
            .collect()
    }

    pub fn comparable_fields(&self) -> Vec<&FieldDef> {
        self.all_fields().filter(|field| field.comparable).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static EntitySchema {
        static SAMPLE: OnceLock<EntitySchema> = OnceLock::new();
        SAMPLE.get_or_init(|| {
            EntitySchema::new("sample", "Sample", EntitySchema::auditable())
                .field(FieldDef::text("code", "Code").comparable())
                .field(FieldDef::text("secret", "Secret").bind_exempt())
        })
    }

    #[test]
    fn lineage_ends_at_root() {
        let names: Vec<_> = sample().lineage().iter().map(|s| s.entity_type).collect();
        assert_eq!(names, vec!["sample", "auditable", "persistable"]);
    }

    #[test]
    fn bind_exempt_fields_include_ancestors() {
        let exempt = sample().bind_exempt_fields();
        assert!(exempt.contains(&"secret"));
        assert!(exempt.contains(&"createdBy"));
        assert!(exempt.contains(&"createdAt"));
        assert!(!exempt.contains(&"code"));
    }

    #[test]
    fn declared_fields_skip_root() {
        assert!(sample().declared_fields().all(|f| f.name != "id" && f.name != "version"));
        assert!(sample().find_field("version").is_some());
    }
}
