//! # Extension Builder
//!
//! For one (child table, foreign key) pair, produces one flattened
//! parameter row per distinct foreign-key value present in the data: the
//! child rows sharing that value are fit as their own group and the fitted
//! parameters become columns on the parent.
//!
//! Extension generation is a partial function of the foreign-key value:
//! parent keys with no matching children never appear in the result, and
//! neither do groups whose fit failed. Downstream joins surface both as
//! missing values, never as zero-weight rows.

use indexmap::IndexMap;
use tracing::debug;

use crate::data::{Row, Value};
use crate::model::{ModelFactory, TableMeta, SCALE_SUFFIX};
use crate::params::flatten_parameters;

/// Build extension rows for `child_table` grouped by `foreign_key`.
///
/// The result maps each foreign-key value (by its group key) to a namespaced
/// parameter row. Groups with exactly one row get every variance-marker
/// (`…scale`) parameter forced to null: a singleton's variance is undefined
/// and storing a degenerate zero would poison the parent fit.
pub fn build_extensions(
    child_name: &str,
    child_table: &[Row],
    foreign_key: &str,
    child_primary_key: Option<&str>,
    child_meta: &TableMeta,
    factory: &dyn ModelFactory,
) -> IndexMap<String, Row> {
    let mut extensions: IndexMap<String, Row> = IndexMap::new();

    for (key, group) in group_by_key(child_table, foreign_key) {
        // The group's own identifiers are not modelable.
        let rows: Vec<Row> = group
            .into_iter()
            .map(|row| {
                let mut row = row.clone();
                if let Some(pk) = child_primary_key {
                    row.shift_remove(pk);
                }
                row.shift_remove(foreign_key);
                row
            })
            .collect();

        let mut model = factory.build(child_meta);
        if let Err(e) = model.fit(&rows) {
            // Skip child row subsets that fail; the parent key simply gets
            // no extension row.
            debug!(
                child = child_name,
                foreign_key,
                key = %key,
                error = %e,
                "skipping extension group that failed to fit"
            );
            continue;
        }

        let mut row = flatten_parameters(model.as_ref(), child_name, foreign_key);
        if rows.len() == 1 {
            for (column, value) in row.iter_mut() {
                if column.ends_with(SCALE_SUFFIX) {
                    *value = Value::Null;
                }
            }
        }

        extensions.insert(key, row);
    }

    extensions
}

/// Group rows by a column's value, preserving first-seen key order.
fn group_by_key<'a>(rows: &'a [Row], column: &str) -> IndexMap<String, Vec<&'a Row>> {
    let mut groups: IndexMap<String, Vec<&Row>> = IndexMap::new();
    for row in rows {
        let key = row.get(column).unwrap_or(&Value::Null).group_key();
        groups.entry(key).or_default().push(row);
    }
    groups
}
