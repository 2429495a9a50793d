//! # Sample Orchestrator
//!
//! Reconstructs a full relational dataset top-down from a [`FittedModel`]:
//! root tables are drawn from their registered models, child rows are
//! regenerated per parent row from the parameter slice stored in that row,
//! and foreign keys are stamped directly. Tables sampled without their
//! parent get foreign keys reconstructed by likelihood (see [`assign`]).

pub mod assign;
pub mod finalize;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::data::{put_column, Row, TableData, Tables, Value};
use crate::error::{Result, SynthError};
use crate::fit::FittedModel;
use crate::model::TableModel;
use crate::params::{extract_parameters, ExtensionKey};
use crate::schema::{Field, IdSubtype};

/// Options for one sampling pass.
#[derive(Debug, Clone)]
pub struct SampleOptions {
    /// Rows to draw from each entry table. `None` uses the fit-time size.
    /// Only guaranteed to match on tables without parents; child tables
    /// grow to whatever their parents' stored parameters dictate.
    pub num_rows: Option<usize>,
    /// Seed for the sampling pass; equal seeds yield equal output.
    pub seed: u64,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            num_rows: None,
            seed: 42,
        }
    }
}

impl FittedModel {
    /// Sample the entire schema: every root table plus, recursively, all
    /// of its descendants, finalized to declared columns and types.
    pub fn sample(&self, options: &SampleOptions) -> Result<Tables> {
        let mut sampler = Sampler::new(self, options.seed);
        let mut sampled = Tables::new();

        let roots: Vec<String> = self
            .schema
            .tables
            .keys()
            .filter(|name| {
                self.schema
                    .parents(name)
                    .map(|p| p.is_empty())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        for root in roots {
            sampler.sample_table_into(&root, options.num_rows, true, &mut sampled)?;
        }
        sampler.finalize(sampled)
    }

    /// Sample a single named table, optionally with its descendants.
    /// Foreign keys of a table sampled without its parent are reconstructed
    /// by likelihood-weighted assignment during finalization.
    pub fn sample_table(
        &self,
        table: &str,
        sample_children: bool,
        options: &SampleOptions,
    ) -> Result<Tables> {
        let mut sampler = Sampler::new(self, options.seed);
        let mut sampled = Tables::new();
        sampler.sample_table_into(table, options.num_rows, sample_children, &mut sampled)?;
        sampler.finalize(sampled)
    }
}

/// Working state of one sampling pass.
pub(crate) struct Sampler<'a> {
    pub(crate) fitted: &'a FittedModel,
    pub(crate) rng: StdRng,
    key_counters: IndexMap<String, i64>,
}

impl<'a> Sampler<'a> {
    fn new(fitted: &'a FittedModel, seed: u64) -> Self {
        Self {
            fitted,
            rng: StdRng::seed_from_u64(seed),
            key_counters: IndexMap::new(),
        }
    }

    fn sample_table_into(
        &mut self,
        table_name: &str,
        num_rows: Option<usize>,
        sample_children: bool,
        sampled: &mut Tables,
    ) -> Result<()> {
        let fitted = self.fitted;
        let n = match num_rows {
            Some(n) => n,
            None => fitted.table_size(table_name)?,
        };
        info!(table = table_name, rows = n, "sampling table");

        let model = fitted.model(table_name)?;
        let rows = self.sample_rows(model, table_name, n)?;
        sampled.insert(table_name.to_string(), rows.clone());

        if sample_children {
            self.sample_children(table_name, sampled, &rows)?;
        }
        Ok(())
    }

    /// Draw rows from a model, then synthesize unique primary-key values
    /// for them if the table declares one.
    pub(crate) fn sample_rows(
        &mut self,
        model: &dyn TableModel,
        table_name: &str,
        n: usize,
    ) -> Result<TableData> {
        let fitted = self.fitted;
        let mut rows = model.sample(n, &mut self.rng);

        if let Some(pk) = fitted.schema.primary_key(table_name)? {
            let pk = pk.to_string();
            let field = fitted
                .schema
                .table(table_name)?
                .fields
                .get(&pk)
                .cloned()
                .ok_or_else(|| SynthError::SchemaValidation {
                    table: table_name.to_string(),
                    message: format!("primary key '{}' is not a field", pk),
                })?;
            let subtype = match field {
                Field::Id { subtype, .. } => subtype,
                _ => IdSubtype::Integer,
            };
            let keys = self.synthesize_keys(table_name, subtype, rows.len());
            put_column(&mut rows, &pk, keys);
        }

        Ok(rows)
    }

    /// Fresh, unique key values. Integer keys count up from 0 per table
    /// within a sampling pass; string and uuid keys are drawn from the
    /// pass's seeded generator, so equal seeds give equal keys.
    fn synthesize_keys(&mut self, table_name: &str, subtype: IdSubtype, n: usize) -> Vec<Value> {
        match subtype {
            IdSubtype::Integer => {
                let counter = self
                    .key_counters
                    .entry(table_name.to_string())
                    .or_insert(0);
                (0..n)
                    .map(|_| {
                        let value = *counter;
                        *counter += 1;
                        Value::Int(value)
                    })
                    .collect()
            }
            IdSubtype::Text => (0..n)
                .map(|_| {
                    let id = uuid::Builder::from_random_bytes(self.rng.random()).into_uuid();
                    Value::String(id.to_string())
                })
                .collect(),
            IdSubtype::Uuid => (0..n)
                .map(|_| {
                    Value::Uuid(uuid::Builder::from_random_bytes(self.rng.random()).into_uuid())
                })
                .collect(),
        }
    }

    /// Depth-first child sampling: one batch of child rows per sampled
    /// parent row, then recurse into the child's own children. A child
    /// already sampled through another path is left alone.
    fn sample_children(
        &mut self,
        table_name: &str,
        sampled: &mut Tables,
        table_rows: &TableData,
    ) -> Result<()> {
        let fitted = self.fitted;
        let children: Vec<String> = fitted
            .schema
            .children(table_name)
            .into_iter()
            .map(str::to_string)
            .collect();

        for child_name in children {
            if sampled.contains_key(&child_name) {
                continue;
            }
            info!(table = %child_name, "sampling rows from child table");
            for parent_row in table_rows {
                self.sample_child_rows(&child_name, table_name, parent_row, sampled)?;
            }

            let child_rows = sampled.entry(child_name.clone()).or_default().clone();
            self.sample_children(&child_name, sampled, &child_rows)?;
        }
        Ok(())
    }

    /// Sample the child rows belonging to one parent row: rebuild the child
    /// model from the parameter slice stored in the parent row, draw as
    /// many rows as the (clipped) stored `num_rows` dictates, and stamp
    /// each row with the parent's key.
    fn sample_child_rows(
        &mut self,
        table_name: &str,
        parent_name: &str,
        parent_row: &Row,
        sampled: &mut Tables,
    ) -> Result<()> {
        let fitted = self.fitted;
        let foreign_key = fitted
            .schema
            .foreign_keys(parent_name, table_name)?
            .first()
            .map(|fk| fk.to_string())
            .ok_or_else(|| SynthError::MissingParameters {
                table: table_name.to_string(),
                foreign_key: format!("<none declared to {}>", parent_name),
            })?;

        let num_rows_column = ExtensionKey::num_rows_column(table_name, &foreign_key);
        let params = extract_parameters(
            parent_row,
            table_name,
            &foreign_key,
            fitted.max_child_rows(&num_rows_column),
        )?;

        let meta = fitted.model(table_name)?.meta().clone();
        let mut model = fitted.factory.build(&meta);
        model.set_parameters(&params);

        let n = model.num_rows();
        let mut rows = self.sample_rows(model.as_ref(), table_name, n)?;
        if rows.is_empty() {
            return Ok(());
        }

        let parent_pk = fitted.schema.primary_key(parent_name)?.ok_or_else(|| {
            SynthError::SchemaValidation {
                table: parent_name.to_string(),
                message: "parent table has no primary key".to_string(),
            }
        })?;
        let parent_key = parent_row.get(parent_pk).cloned().unwrap_or(Value::Null);
        let count = rows.len();
        put_column(&mut rows, &foreign_key, vec![parent_key; count]);

        sampled
            .entry(table_name.to_string())
            .or_default()
            .extend(rows);
        Ok(())
    }

    /// Choose a parent id for every row of `table_name` by likelihood.
    /// Candidate parents come from the sampled data, or are synthesized at
    /// the fit-time parent/child size ratio when the parent table was never
    /// sampled.
    pub(crate) fn find_parent_ids(
        &mut self,
        table_name: &str,
        parent_name: &str,
        foreign_key: &str,
        sampled: &Tables,
    ) -> Result<Vec<Value>> {
        let fitted = self.fitted;
        let table_rows = sampled
            .get(table_name)
            .cloned()
            .ok_or_else(|| SynthError::UnknownTable {
                table: table_name.to_string(),
            })?;

        let parent_rows: TableData = match sampled.get(parent_name) {
            Some(rows) => rows.clone(),
            None => {
                let ratio = fitted.table_size(parent_name)? as f64
                    / fitted.table_size(table_name)?.max(1) as f64;
                let n = ((table_rows.len() as f64 * ratio).round() as usize).max(1);
                let model = fitted.model(parent_name)?;
                self.sample_rows(model, parent_name, n)?
            }
        };
        if parent_rows.is_empty() {
            return Ok(vec![Value::Null; table_rows.len()]);
        }

        let parent_pk = fitted.schema.primary_key(parent_name)?.ok_or_else(|| {
            SynthError::SchemaValidation {
                table: parent_name.to_string(),
                message: "parent table has no primary key".to_string(),
            }
        })?;

        let num_rows_column = ExtensionKey::num_rows_column(table_name, foreign_key);
        let parent_ids: Vec<Value> = parent_rows
            .iter()
            .map(|row| row.get(parent_pk).cloned().unwrap_or(Value::Null))
            .collect();
        let expected_rows: Vec<f64> = parent_rows
            .iter()
            .map(|row| {
                row.get(&num_rows_column)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0)
                    .max(0.0)
            })
            .collect();

        // One likelihood column per candidate parent; a singular
        // reconstructed distribution leaves the whole column undefined.
        let meta = fitted.model(table_name)?.meta().clone();
        let mut per_parent: Vec<Option<Vec<f64>>> = Vec::with_capacity(parent_rows.len());
        for parent_row in &parent_rows {
            let params = extract_parameters(
                parent_row,
                table_name,
                foreign_key,
                fitted.max_child_rows(&num_rows_column),
            )?;
            let mut model = fitted.factory.build(&meta);
            model.set_parameters(&params);
            per_parent.push(model.likelihood(&table_rows).ok());
        }

        let mut chosen = Vec::with_capacity(table_rows.len());
        for i in 0..table_rows.len() {
            let row_likelihoods: assign::RowLikelihoods = per_parent
                .iter()
                .map(|column| column.as_ref().map(|values| values[i]))
                .collect();
            let index = assign::choose_parent(&row_likelihoods, &expected_rows, &mut self.rng);
            chosen.push(parent_ids[index].clone());
        }
        Ok(chosen)
    }
}
