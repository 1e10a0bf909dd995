use itertools::Itertools;
use serde_json::Value;

use crate::logic::property_filter::{extract, value_to_text};
use crate::model::{EntitySchema, ExportFormat};

/// A rendered export, ready to be sent as a download.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

pub struct GridExporter;

impl GridExporter {
    pub fn export(schema: &EntitySchema, format: ExportFormat, rows: &[Value]) -> ExportFile {
        match format {
            ExportFormat::Csv => Self::csv(schema, rows),
        }
    }

    /// Header row of field labels, then one line per row. Collections and
    /// transient fields are left out; references export their id.
    fn csv(schema: &EntitySchema, rows: &[Value]) -> ExportFile {
        let fields: Vec<_> = schema
            .all_fields()
            .filter(|f| !f.is_collection() && !f.transient && f.name != "version")
            .collect();

        let mut out = String::new();
        out.push_str(&fields.iter().map(|f| escape(f.label)).join(","));
        out.push_str("\r\n");
        for row in rows {
            let line = fields
                .iter()
                .map(|f| escape(&extract(row, f.name).map(value_to_text).unwrap_or_default()))
                .join(",");
            out.push_str(&line);
            out.push_str("\r\n");
        }

        ExportFile {
            filename: format!("{}.csv", schema.entity_type),
            content_type: "text/csv; charset=utf-8",
            body: out.into_bytes(),
        }
    }
}

fn escape(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::Role;
    use crate::model::Entity;
    use serde_json::json;

    #[test]
    fn csv_uses_labels_and_escapes() {
        let rows = vec![json!({
            "id": "r1",
            "code": "ROLE_OPS",
            "name": "Ops, \"night\" shift",
            "aclType": 2
        })];
        let file = GridExporter::export(Role::schema(), ExportFormat::Csv, &rows);
        let text = String::from_utf8(file.body).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("Code,Name"));
        assert!(header.contains("ID"));
        let line = lines.next().unwrap();
        assert!(line.contains("\"Ops, \"\"night\"\" shift\""));
        assert_eq!(file.filename, "role.csv");
    }
}
