//! View schema definitions, and the YAML loader collaborator (SPEC_FULL.md §4.8).
//!
//! The loader is a deliberately thin binding against the document shape
//! spec.md §6 describes (`{sources: {...}, enums: {...}}`); a real
//! deployment's schema tooling lives outside this crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewstreamError};

/// Internal data types a declared column can have, mapped from the
/// upstream's wire types per spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int,
    Float,
    BigInt,
    Text,
    Uuid,
    Date,
    Time,
    Timestamp,
    Json,
    Array,
    /// An enum-typed column; ordinal comparisons resolve against the
    /// `EnumType` named here.
    Enum(String),
}

impl DataType {
    /// Parses the upstream's declared type name (spec.md §6's list).
    pub fn from_declared(name: &str, enums: &HashMap<String, EnumType>) -> Result<DataType> {
        let dt = match name {
            "bool" => DataType::Bool,
            "int2" | "int4" => DataType::Int,
            "int8" => DataType::BigInt,
            "float4" | "float8" | "numeric" => DataType::Float,
            "uuid" => DataType::Uuid,
            "text" | "varchar" => DataType::Text,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "timestamp" | "timestamptz" => DataType::Timestamp,
            "json" | "jsonb" => DataType::Json,
            other if enums.contains_key(other) => DataType::Enum(other.to_string()),
            other => {
                return Err(ViewstreamError::Schema(format!(
                    "unknown declared type '{other}'"
                )))
            }
        };
        Ok(dt)
    }
}

/// A named, ordered enum type. Ordering defines ordinal comparison semantics
/// (spec.md §3: "ordering defines ordinal comparison semantics").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}

impl EnumType {
    pub fn ordinal_of(&self, literal: &str) -> Option<usize> {
        self.values.iter().position(|v| v == literal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
}

/// `{name, primaryKeyField, fields}` from spec.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: String,
    pub primary_key_field: String,
    pub fields: Vec<FieldDef>,
}

impl ViewDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column names in declaration order, primary key first — the projection
    /// order the Protocol Parser's query issues and the line format expects
    /// (spec.md §4.1).
    pub fn column_order(&self) -> Vec<&str> {
        let mut cols = vec![self.primary_key_field.as_str()];
        cols.extend(
            self.fields
                .iter()
                .filter(|f| f.name != self.primary_key_field)
                .map(|f| f.name.as_str()),
        );
        cols
    }
}

/// All view definitions and enum types loaded from a schema document.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub views: HashMap<String, ViewDefinition>,
    pub enums: HashMap<String, EnumType>,
}

impl Schema {
    pub fn view(&self, name: &str) -> Result<&ViewDefinition> {
        self.views
            .get(name)
            .ok_or_else(|| ViewstreamError::UnknownView(name.to_string()))
    }
}

/// The on-disk YAML document shape: `{sources: {view -> {...}}, enums: {...}}`.
#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    enums: HashMap<String, Vec<String>>,
    sources: HashMap<String, SourceDocument>,
}

#[derive(Debug, Deserialize)]
struct SourceDocument {
    primary_key: String,
    columns: HashMap<String, String>,
}

/// Loads every view definition out of a YAML document matching spec.md §6's
/// schema shape.
pub fn load_from_yaml(yaml: &str) -> Result<Schema> {
    let doc: SchemaDocument = serde_yaml::from_str(yaml)
        .map_err(|e| ViewstreamError::Schema(format!("invalid schema document: {e}")))?;

    let enums: HashMap<String, EnumType> = doc
        .enums
        .into_iter()
        .map(|(name, values)| (name.clone(), EnumType { name, values }))
        .collect();

    let mut views = HashMap::new();
    for (view_name, source) in doc.sources {
        let mut fields = Vec::with_capacity(source.columns.len());
        for (col_name, declared) in &source.columns {
            let data_type = DataType::from_declared(declared, &enums)?;
            fields.push(FieldDef {
                name: col_name.clone(),
                data_type,
            });
        }
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        views.insert(
            view_name.clone(),
            ViewDefinition {
                name: view_name,
                primary_key_field: source.primary_key,
                fields,
            },
        );
    }
    Ok(Schema { views, enums })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
enums:
  priority:
    - low
    - medium
    - high
sources:
  trades:
    primary_key: id
    columns:
      id: int8
      px: float8
      priority: priority
"#;

    #[test]
    fn loads_sources_and_enums() {
        let schema = load_from_yaml(DOC).unwrap();
        let trades = schema.views.get("trades").unwrap();
        assert_eq!(trades.primary_key_field, "id");
        assert!(matches!(
            trades.field("priority").unwrap().data_type,
            DataType::Enum(ref n) if n == "priority"
        ));
        assert!(matches!(trades.field("id").unwrap().data_type, DataType::BigInt));
        assert_eq!(schema.enums["priority"].ordinal_of("high"), Some(2));
    }

    #[test]
    fn unknown_type_is_an_error() {
        let bad = "sources:\n  v:\n    primary_key: id\n    columns:\n      id: not_a_type\n";
        assert!(load_from_yaml(bad).is_err());
    }
}
