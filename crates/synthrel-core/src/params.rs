//! # Parameter Codec
//!
//! Flattened model parameters are stored inside parent rows under
//! namespaced column names of the form `__{table}__{foreign_key}__{param}`.
//! `ExtensionKey` is the structured form; encoding and decoding go through
//! it rather than ad hoc string concatenation, so the prefix for a known
//! (table, foreign key) pair is built and matched in exactly one place.

use crate::data::{Row, Value};
use crate::error::{Result, SynthError};
use crate::model::{ParamMap, TableModel, NUM_ROWS_PARAM};

/// Structured name of one flattened parameter column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionKey {
    pub table: String,
    pub foreign_key: String,
    pub param: String,
}

impl ExtensionKey {
    pub fn new(
        table: impl Into<String>,
        foreign_key: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            foreign_key: foreign_key.into(),
            param: param.into(),
        }
    }

    /// Wire name of this key.
    pub fn encode(&self) -> String {
        format!("{}{}", prefix(&self.table, &self.foreign_key), self.param)
    }

    /// Inverse of `encode` for a known (table, foreign key) pair: strips the
    /// prefix and returns the parameter name, or `None` if the column does
    /// not belong to that pair. Matching against a known pair avoids any
    /// ambiguity when table or column names themselves contain `__`.
    pub fn decode(column: &str, table: &str, foreign_key: &str) -> Option<String> {
        column
            .strip_prefix(&prefix(table, foreign_key))
            .map(|param| param.to_string())
    }

    /// Wire name of the reserved row-count column for a (table, fk) pair.
    pub fn num_rows_column(table: &str, foreign_key: &str) -> String {
        ExtensionKey::new(table, foreign_key, NUM_ROWS_PARAM).encode()
    }
}

fn prefix(table: &str, foreign_key: &str) -> String {
    format!("__{}__{}__", table, foreign_key)
}

/// Serialize a fitted model's parameters into a namespaced row, ready to be
/// joined onto the parent table.
pub fn flatten_parameters(model: &dyn TableModel, table: &str, foreign_key: &str) -> Row {
    model
        .parameters()
        .into_iter()
        .map(|(param, value)| {
            (
                ExtensionKey::new(table, foreign_key, param).encode(),
                Value::Float(value),
            )
        })
        .collect()
}

/// Extract the parameter slice for (table, foreign_key) from an
/// already-sampled parent row. Null parameter cells (undefined variance of
/// singleton groups) are omitted from the result; the model treats missing
/// entries as zero. The `num_rows` entry is clipped to the fit-time maximum
/// so generated subtrees never outgrow anything observed in training data.
pub fn extract_parameters(
    parent_row: &Row,
    table: &str,
    foreign_key: &str,
    max_num_rows: Option<f64>,
) -> Result<ParamMap> {
    let mut params = ParamMap::new();
    let mut found_any = false;

    for (column, value) in parent_row {
        if let Some(param) = ExtensionKey::decode(column, table, foreign_key) {
            found_any = true;
            if let Some(v) = value.as_f64() {
                params.insert(param, v);
            }
        }
    }

    if !found_any {
        return Err(SynthError::MissingParameters {
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
        });
    }

    if let (Some(num_rows), Some(max)) = (params.get_mut(NUM_ROWS_PARAM), max_num_rows) {
        *num_rows = num_rows.min(max);
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_wire_format() {
        let key = ExtensionKey::new("orders", "user_id", "total__loc");
        assert_eq!(key.encode(), "__orders__user_id__total__loc");
    }

    #[test]
    fn test_decode_requires_matching_pair() {
        let column = "__orders__user_id__total__scale";
        assert_eq!(
            ExtensionKey::decode(column, "orders", "user_id").as_deref(),
            Some("total__scale")
        );
        assert_eq!(ExtensionKey::decode(column, "orders", "store_id"), None);
        assert_eq!(ExtensionKey::decode(column, "items", "user_id"), None);
    }

    #[test]
    fn test_decode_handles_separator_in_param_names() {
        // Parameter names may contain the separator; the prefix is anchored
        // so the remainder survives intact.
        let key = ExtensionKey::new("a__b", "c", "x__y__scale");
        assert_eq!(
            ExtensionKey::decode(&key.encode(), "a__b", "c").as_deref(),
            Some("x__y__scale")
        );
    }

    #[test]
    fn test_extract_strips_prefix_and_keeps_order() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(1));
        row.insert("__orders__user_id__x__loc".to_string(), Value::Float(3.0));
        row.insert("__orders__user_id__x__scale".to_string(), Value::Float(1.5));
        row.insert("__orders__user_id__num_rows".to_string(), Value::Float(4.0));
        row.insert("__other__user_id__x__loc".to_string(), Value::Float(9.0));

        let params = extract_parameters(&row, "orders", "user_id", None).unwrap();
        assert_eq!(
            params,
            ParamMap::from_iter([
                ("x__loc".to_string(), 3.0),
                ("x__scale".to_string(), 1.5),
                ("num_rows".to_string(), 4.0),
            ])
        );
    }

    #[test]
    fn test_extract_clips_num_rows() {
        let mut row = Row::new();
        row.insert("__c__fk__num_rows".to_string(), Value::Float(12.0));

        let params = extract_parameters(&row, "c", "fk", Some(5.0)).unwrap();
        assert_eq!(params["num_rows"], 5.0);

        let params = extract_parameters(&row, "c", "fk", Some(20.0)).unwrap();
        assert_eq!(params["num_rows"], 12.0);
    }

    #[test]
    fn test_extract_omits_null_cells() {
        let mut row = Row::new();
        row.insert("__c__fk__x__loc".to_string(), Value::Float(1.0));
        row.insert("__c__fk__x__scale".to_string(), Value::Null);

        let params = extract_parameters(&row, "c", "fk", None).unwrap();
        assert!(params.contains_key("x__loc"));
        assert!(!params.contains_key("x__scale"));
    }

    #[test]
    fn test_extract_missing_slice_is_fatal() {
        let row = Row::new();
        let err = extract_parameters(&row, "c", "fk", None).unwrap_err();
        assert!(matches!(err, SynthError::MissingParameters { .. }));
    }
}
