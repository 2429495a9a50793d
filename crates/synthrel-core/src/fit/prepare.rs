//! Preparation of an extended table for modeling.
//!
//! Pulls out identifier columns (primary key, foreign keys, other ids) to
//! be reattached unchanged after fitting, derives the model metadata for
//! every remaining declared field, registers undeclared columns (the
//! extension columns, chiefly) as numeric fields, and imputes their
//! missing values.

use indexmap::IndexMap;

use crate::data::{column_names, take_column, TableData, Value};
use crate::error::Result;
use crate::model::{ColumnMeta, TableMeta};
use crate::schema::{Field, Schema};

/// Columns retained aside during modeling, keyed by column name.
pub type RetainedKeys = IndexMap<String, Vec<Value>>;

/// Prepare `table` in place for fitting. Returns the derived model metadata
/// and the identifier columns removed from the table.
pub fn prepare_for_modeling(
    schema: &Schema,
    table: &mut TableData,
    table_name: &str,
) -> Result<(TableMeta, RetainedKeys)> {
    let decl = schema.table(table_name)?;

    let mut keys = RetainedKeys::new();
    let mut meta = TableMeta::new(table_name);

    for (field_name, field) in &decl.fields {
        if field.is_id() {
            keys.insert(field_name.clone(), take_column(table, field_name));
            continue;
        }

        let column_meta = match field {
            Field::Numerical { .. } => ColumnMeta::Numeric,
            Field::Boolean => ColumnMeta::Boolean,
            Field::Datetime => ColumnMeta::Datetime,
            Field::Categorical => ColumnMeta::Categorical {
                categories: category_frequencies(table, field_name),
            },
            Field::Id { .. } => unreachable!("id fields are retained, not modeled"),
        };
        meta.columns.insert(field_name.clone(), column_meta);
    }

    // Anything left in the data but absent from the declaration (extension
    // columns from already-fitted children) becomes a numeric field, with
    // missing values imputed.
    for column in column_names(table) {
        if decl.fields.contains_key(&column) {
            continue;
        }
        meta.columns.insert(column.clone(), ColumnMeta::Numeric);
        impute_column(table, &column);
    }

    Ok((meta, keys))
}

/// Observed value frequencies of a column, in first-seen order.
fn category_frequencies(table: &[crate::data::Row], column: &str) -> Vec<(String, f64)> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    let mut total = 0usize;
    for row in table {
        let value = row.get(column).unwrap_or(&Value::Null);
        if !value.is_null() {
            *counts.entry(value.group_key()).or_default() += 1;
            total += 1;
        }
    }
    counts
        .into_iter()
        .map(|(category, count)| (category, count as f64 / total as f64))
        .collect()
}

/// Fill missing values: mean for numeric columns (0 when every value is
/// missing), most frequent value otherwise.
fn impute_column(table: &mut TableData, column: &str) {
    let mut numeric: Vec<f64> = Vec::new();
    let mut all_numeric = true;
    let mut counts: IndexMap<String, (usize, Value)> = IndexMap::new();

    for row in table.iter() {
        let value = row.get(column).unwrap_or(&Value::Null);
        if value.is_null() {
            continue;
        }
        match value.as_f64() {
            Some(v) => numeric.push(v),
            None => all_numeric = false,
        }
        let entry = counts
            .entry(value.group_key())
            .or_insert_with(|| (0, value.clone()));
        entry.0 += 1;
    }

    let fill = if all_numeric {
        if numeric.is_empty() {
            Value::Float(0.0)
        } else {
            Value::Float(numeric.iter().sum::<f64>() / numeric.len() as f64)
        }
    } else {
        counts
            .values()
            .max_by_key(|(count, _)| *count)
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)
    };

    for row in table.iter_mut() {
        let missing = row.get(column).map(Value::is_null).unwrap_or(true);
        if missing {
            row.insert(column.to_string(), fill.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Row;
    use crate::schema::{FieldRef, IdSubtype, NumericalSubtype, TableSchema};

    fn schema_one_table() -> Schema {
        let mut t = TableSchema::new();
        t.primary_key = Some("id".to_string());
        t.fields.insert(
            "id".to_string(),
            Field::Id {
                subtype: IdSubtype::Integer,
                reference: None,
            },
        );
        t.fields.insert(
            "owner_id".to_string(),
            Field::Id {
                subtype: IdSubtype::Integer,
                reference: Some(FieldRef {
                    table: "t".to_string(),
                    field: "id".to_string(),
                }),
            },
        );
        t.fields.insert(
            "x".to_string(),
            Field::Numerical {
                subtype: NumericalSubtype::Float,
            },
        );
        t.fields.insert("status".to_string(), Field::Categorical);

        let mut schema = Schema::new();
        schema.tables.insert("t".to_string(), t);
        schema
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_identifier_columns_are_pulled_out() {
        let schema = schema_one_table();
        let mut table = vec![
            row(&[
                ("id", Value::Int(0)),
                ("owner_id", Value::Int(9)),
                ("x", Value::Float(1.0)),
                ("status", Value::String("on".into())),
            ]),
            row(&[
                ("id", Value::Int(1)),
                ("owner_id", Value::Int(9)),
                ("x", Value::Float(2.0)),
                ("status", Value::String("off".into())),
            ]),
        ];

        let (meta, keys) = prepare_for_modeling(&schema, &mut table, "t").unwrap();

        assert_eq!(
            keys.keys().collect::<Vec<_>>(),
            vec!["id", "owner_id"],
            "both id-typed columns retained, in declaration order"
        );
        assert_eq!(keys["id"], vec![Value::Int(0), Value::Int(1)]);
        assert!(!table[0].contains_key("id"));
        assert!(!meta.columns.contains_key("owner_id"));
        assert!(meta.columns.contains_key("x"));
    }

    #[test]
    fn test_categorical_meta_carries_frequencies() {
        let schema = schema_one_table();
        let mut table = vec![
            row(&[
                ("id", Value::Int(0)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
            ]),
            row(&[
                ("id", Value::Int(1)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
            ]),
            row(&[
                ("id", Value::Int(2)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("off".into())),
            ]),
        ];

        let (meta, _) = prepare_for_modeling(&schema, &mut table, "t").unwrap();
        match &meta.columns["status"] {
            ColumnMeta::Categorical { categories } => {
                assert_eq!(categories.len(), 2);
                assert_eq!(categories[0].0, "on");
                assert!((categories[0].1 - 2.0 / 3.0).abs() < 1e-12);
            }
            other => panic!("expected categorical meta, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_columns_registered_and_mean_imputed() {
        let schema = schema_one_table();
        let mut table = vec![
            row(&[
                ("id", Value::Int(0)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("__c__fk__b__loc", Value::Float(2.0)),
            ]),
            row(&[
                ("id", Value::Int(1)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("__c__fk__b__loc", Value::Null),
            ]),
            row(&[
                ("id", Value::Int(2)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("__c__fk__b__loc", Value::Float(4.0)),
            ]),
        ];

        let (meta, _) = prepare_for_modeling(&schema, &mut table, "t").unwrap();
        assert_eq!(meta.columns["__c__fk__b__loc"], ColumnMeta::Numeric);
        assert_eq!(table[1]["__c__fk__b__loc"], Value::Float(3.0));
    }

    #[test]
    fn test_all_missing_numeric_column_imputes_to_zero() {
        let schema = schema_one_table();
        let mut table = vec![
            row(&[
                ("id", Value::Int(0)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("__c__fk__b__scale", Value::Null),
            ]),
            row(&[
                ("id", Value::Int(1)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("__c__fk__b__scale", Value::Null),
            ]),
        ];

        prepare_for_modeling(&schema, &mut table, "t").unwrap();
        assert_eq!(table[0]["__c__fk__b__scale"], Value::Float(0.0));
        assert_eq!(table[1]["__c__fk__b__scale"], Value::Float(0.0));
    }

    #[test]
    fn test_non_numeric_unknown_column_imputes_mode() {
        let schema = schema_one_table();
        let mut table = vec![
            row(&[
                ("id", Value::Int(0)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("note", Value::String("hi".into())),
            ]),
            row(&[
                ("id", Value::Int(1)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("note", Value::String("hi".into())),
            ]),
            row(&[
                ("id", Value::Int(2)),
                ("owner_id", Value::Null),
                ("x", Value::Float(0.0)),
                ("status", Value::String("on".into())),
                ("note", Value::Null),
            ]),
        ];

        prepare_for_modeling(&schema, &mut table, "t").unwrap();
        assert_eq!(table[2]["note"], Value::String("hi".into()));
    }
}
