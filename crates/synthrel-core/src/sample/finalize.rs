//! Turns raw sampled tables into the declared output shape: missing
//! foreign keys are reconstructed, rows with nulls in declared columns
//! are dropped, values are cast to declared types, and columns are
//! emitted in declaration order with working columns stripped.

use tracing::debug;

use crate::data::{put_column, Row, Tables};
use crate::error::Result;
use crate::sample::Sampler;

impl Sampler<'_> {
    /// Finalize every sampled table. Reconstruction of a missing foreign
    /// key draws on the other sampled tables, so it runs against the raw
    /// data before any columns are stripped.
    pub(crate) fn finalize(&mut self, sampled: Tables) -> Result<Tables> {
        let fitted = self.fitted;
        let mut output = Tables::new();

        let names: Vec<String> = sampled.keys().cloned().collect();
        for name in &names {
            let mut rows = sampled.get(name).cloned().unwrap_or_default();

            let parents: Vec<String> = fitted
                .schema
                .parents(name)?
                .into_iter()
                .map(str::to_string)
                .collect();
            for parent in &parents {
                let foreign_keys: Vec<String> = fitted
                    .schema
                    .foreign_keys(parent, name)?
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                for foreign_key in &foreign_keys {
                    let missing = rows
                        .first()
                        .map(|row| !row.contains_key(foreign_key))
                        .unwrap_or(false);
                    if missing {
                        debug!(
                            table = %name,
                            foreign_key = %foreign_key,
                            "reconstructing foreign key by likelihood"
                        );
                        let ids = self.find_parent_ids(name, parent, foreign_key, &sampled)?;
                        put_column(&mut rows, foreign_key, ids);
                    }
                }
            }

            let field_types = fitted.schema.field_types(name)?;
            let mut final_rows = Vec::with_capacity(rows.len());
            'rows: for row in &rows {
                for column in field_types.keys() {
                    let null = row.get(column).map(|v| v.is_null()).unwrap_or(true);
                    if null {
                        continue 'rows;
                    }
                }
                let mut out = Row::new();
                for (column, ty) in &field_types {
                    out.insert(column.clone(), row[column.as_str()].cast_to(ty, name, column)?);
                }
                final_rows.push(out);
            }
            output.insert(name.clone(), final_rows);
        }

        Ok(output)
    }
}
