//! # Relational Schema
//!
//! The schema collaborator: declares tables, fields, primary keys, and
//! foreign keys, and answers the topology questions the fit/sample
//! orchestrators ask (parents, children, foreign keys between two tables).
//!
//! A foreign key is an `Id` field carrying a `reference` to the parent
//! table's primary key field. Tables therefore form a forest of
//! parent/child links and the whole schema round-trips through JSON.

pub mod validate;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::TableData;
use crate::error::{Result, SynthError};

/// Top-level schema: ordered map from table name to its declaration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: IndexMap<String, TableSchema>,
}

/// Declaration of a single table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub primary_key: Option<String>,
    pub fields: IndexMap<String, Field>,
}

/// Declared kind of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Field {
    Numerical { subtype: NumericalSubtype },
    Categorical,
    Boolean,
    Datetime,
    Id {
        subtype: IdSubtype,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<FieldRef>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericalSubtype {
    Integer,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSubtype {
    Integer,
    Text,
    Uuid,
}

/// Reference from a foreign-key field to a parent table's field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub table: String,
    pub field: String,
}

/// Concrete column type a finalized value must be cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
    Uuid,
}

impl Field {
    /// True for primary-key / foreign-key / other identifier fields, which
    /// are never modeled.
    pub fn is_id(&self) -> bool {
        matches!(self, Field::Id { .. })
    }

    /// The foreign-key reference, if this field is one.
    pub fn reference(&self) -> Option<&FieldRef> {
        match self {
            Field::Id {
                reference: Some(r), ..
            } => Some(r),
            _ => None,
        }
    }

    /// Declared output type of this field.
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Numerical {
                subtype: NumericalSubtype::Integer,
            } => FieldType::Integer,
            Field::Numerical {
                subtype: NumericalSubtype::Float,
            } => FieldType::Float,
            Field::Categorical => FieldType::Text,
            Field::Boolean => FieldType::Boolean,
            Field::Datetime => FieldType::Timestamp,
            Field::Id { subtype, .. } => match subtype {
                IdSubtype::Integer => FieldType::Integer,
                IdSubtype::Text => FieldType::Text,
                IdSubtype::Uuid => FieldType::Uuid,
            },
        }
    }
}

impl TableSchema {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// All declared table names, in declaration order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(|s| s.as_str()).collect()
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| SynthError::UnknownTable {
                table: name.to_string(),
            })
    }

    /// The primary key field name of a table, if declared.
    pub fn primary_key(&self, table: &str) -> Result<Option<&str>> {
        Ok(self.table(table)?.primary_key.as_deref())
    }

    /// Distinct parent tables referenced by `table`'s foreign keys,
    /// in field declaration order.
    pub fn parents(&self, table: &str) -> Result<Vec<&str>> {
        let mut parents: Vec<&str> = Vec::new();
        for field in self.table(table)?.fields.values() {
            if let Some(r) = field.reference() {
                if !parents.contains(&r.table.as_str()) {
                    parents.push(r.table.as_str());
                }
            }
        }
        Ok(parents)
    }

    /// Tables that declare a foreign key into `table`, in schema order.
    pub fn children(&self, table: &str) -> Vec<&str> {
        let mut children: Vec<&str> = Vec::new();
        for (name, decl) in &self.tables {
            let references_us = decl
                .fields
                .values()
                .any(|f| f.reference().is_some_and(|r| r.table == table));
            if references_us && !children.contains(&name.as_str()) {
                children.push(name.as_str());
            }
        }
        children
    }

    /// Foreign-key field names in `child` that reference `parent`,
    /// in field declaration order. A child may link to the same parent
    /// through more than one key.
    pub fn foreign_keys(&self, parent: &str, child: &str) -> Result<Vec<&str>> {
        let mut keys = Vec::new();
        for (name, field) in &self.table(child)?.fields {
            if field.reference().is_some_and(|r| r.table == parent) {
                keys.push(name.as_str());
            }
        }
        Ok(keys)
    }

    /// Declared output type of every field of a table (identifier fields
    /// included), in declaration order.
    pub fn field_types(&self, table: &str) -> Result<IndexMap<String, FieldType>> {
        Ok(self
            .table(table)?
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.field_type()))
            .collect())
    }

    /// Validate the schema itself and, where provided, the dataset against
    /// it. Fails fast before any fitting begins.
    pub fn validate(&self, tables: &crate::data::Tables) -> Result<()> {
        validate::validate(self, tables)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|source| SynthError::SchemaJson { source })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| SynthError::SchemaJson { source })
    }
}

/// Loader hook for callers that keep table data outside the fit call.
/// The fit orchestrator consults it for any table not already provided.
pub trait TableSource {
    fn load_table(&self, name: &str) -> Result<TableData>;
}
