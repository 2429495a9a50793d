//! # Fit Orchestrator
//!
//! Fits one statistical model per table, bottom-up: before a parent table
//! is fit, every table beneath it is fit and its per-group parameter
//! summaries are joined onto the parent as extension columns. A single
//! per-table model therefore implicitly encodes the whole subtree below it.
//!
//! The working table map is threaded through the recursion as an exclusive
//! `FitContext`; extended child tables are written back into it so that
//! grandchild extensions roll up into their ancestors.

pub mod extension;
pub mod prepare;

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::data::{put_column, TableData, Tables, Value};
use crate::error::{Result, SynthError};
use crate::model::{GaussianFactory, ModelFactory, TableModel};
use crate::params::ExtensionKey;
use crate::schema::{Schema, TableSource};

/// Exclusive working state of one fit pass: the table map being read,
/// extended, and written back as the recursion proceeds.
pub struct FitContext<'a> {
    tables: Tables,
    source: Option<&'a dyn TableSource>,
}

impl<'a> FitContext<'a> {
    fn new(tables: Tables, source: Option<&'a dyn TableSource>) -> Self {
        Self { tables, source }
    }
}

/// Everything the fit phase produced: per-table models, fit-time table
/// sizes, and the fit-time maximum of every `num_rows` extension column.
/// Populated once, read-only during sampling.
pub struct FittedModel {
    pub(crate) schema: Schema,
    pub(crate) factory: Arc<dyn ModelFactory>,
    pub(crate) models: IndexMap<String, Box<dyn TableModel>>,
    pub(crate) table_sizes: IndexMap<String, usize>,
    pub(crate) max_child_rows: IndexMap<String, f64>,
}

impl FittedModel {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model(&self, table: &str) -> Result<&dyn TableModel> {
        self.models
            .get(table)
            .map(|m| m.as_ref())
            .ok_or_else(|| SynthError::UnknownTable {
                table: table.to_string(),
            })
    }

    /// Row count of a table at fit time.
    pub fn table_size(&self, table: &str) -> Result<usize> {
        self.table_sizes
            .get(table)
            .copied()
            .ok_or_else(|| SynthError::UnknownTable {
                table: table.to_string(),
            })
    }

    /// Fit-time maximum observed for a `num_rows` extension column.
    pub fn max_child_rows(&self, column: &str) -> Option<f64> {
        self.max_child_rows.get(column).copied()
    }
}

// Models and the factory are trait objects, so Debug is written by hand
// over the registry keys and the plain maps.
impl fmt::Debug for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FittedModel")
            .field("tables", &self.models.keys().collect::<Vec<_>>())
            .field("table_sizes", &self.table_sizes)
            .field("max_child_rows", &self.max_child_rows)
            .finish_non_exhaustive()
    }
}

/// Hierarchical modeling entry point: fit a relational dataset, then sample
/// new datasets of arbitrary size from the result.
///
/// The stateful facade mirrors the fit-then-sample object API; the
/// underlying [`FittedModel`] returned by [`Hma::fit`] can also be used
/// directly, which makes sampling-before-fitting unrepresentable.
pub struct Hma {
    schema: Schema,
    factory: Arc<dyn ModelFactory>,
    fitted: Option<FittedModel>,
}

impl Hma {
    pub fn new(schema: Schema) -> Self {
        Self::with_factory(schema, Arc::new(GaussianFactory))
    }

    pub fn with_factory(schema: Schema, factory: Arc<dyn ModelFactory>) -> Self {
        Self {
            schema,
            factory,
            fitted: None,
        }
    }

    /// Fit every table in the schema on the provided dataset.
    /// Validation failures abort before any fitting begins.
    pub fn fit(&mut self, tables: Tables) -> Result<&FittedModel> {
        self.fit_inner(tables, None)
    }

    /// Fit, pulling any table not present in `tables` from `source`.
    pub fn fit_with_source(
        &mut self,
        tables: Tables,
        source: &dyn TableSource,
    ) -> Result<&FittedModel> {
        self.fit_inner(tables, Some(source))
    }

    fn fit_inner(
        &mut self,
        tables: Tables,
        source: Option<&dyn TableSource>,
    ) -> Result<&FittedModel> {
        self.schema.validate(&tables)?;

        let mut fitter = Fitter {
            schema: &self.schema,
            factory: self.factory.as_ref(),
            models: IndexMap::new(),
            table_sizes: IndexMap::new(),
            max_child_rows: IndexMap::new(),
        };

        let mut ctx = FitContext::new(tables, source);
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
            fitter.model_table(&mut ctx, &root)?;
        }
        info!("modeling complete");

        Ok(self.fitted.insert(FittedModel {
            schema: self.schema.clone(),
            factory: Arc::clone(&self.factory),
            models: fitter.models,
            table_sizes: fitter.table_sizes,
            max_child_rows: fitter.max_child_rows,
        }))
    }

    pub fn fitted(&self) -> Result<&FittedModel> {
        self.fitted.as_ref().ok_or(SynthError::NotFitted)
    }

    /// Sample a full dataset. Fails with [`SynthError::NotFitted`] before
    /// [`Hma::fit`] has succeeded.
    pub fn sample(&self, options: &crate::sample::SampleOptions) -> Result<Tables> {
        self.fitted()?.sample(options)
    }

    /// Sample a single table, optionally with its descendants.
    pub fn sample_table(
        &self,
        table: &str,
        sample_children: bool,
        options: &crate::sample::SampleOptions,
    ) -> Result<Tables> {
        self.fitted()?.sample_table(table, sample_children, options)
    }
}

struct Fitter<'a> {
    schema: &'a Schema,
    factory: &'a dyn ModelFactory,
    models: IndexMap<String, Box<dyn TableModel>>,
    table_sizes: IndexMap<String, usize>,
    max_child_rows: IndexMap<String, f64>,
}

impl Fitter<'_> {
    /// Fit the given table and, transitively, everything beneath it.
    /// Returns the extended table, which is also written back to the
    /// context for use by ancestor extensions.
    fn model_table(&mut self, ctx: &mut FitContext<'_>, table_name: &str) -> Result<TableData> {
        info!(table = table_name, "modeling table");

        let mut table = self.load_table(ctx, table_name)?;
        self.table_sizes.insert(table_name.to_string(), table.len());

        let primary_key = self
            .schema
            .primary_key(table_name)?
            .map(|pk| pk.to_string());
        if let Some(pk) = &primary_key {
            table = self.extend_table(ctx, table, table_name, pk)?;
        }

        let (meta, keys) =
            prepare::prepare_for_modeling(self.schema, &mut table, table_name)?;

        info!(
            table = table_name,
            rows = table.len(),
            columns = meta.columns.len(),
            "fitting table model"
        );
        let mut model = self.factory.build(&meta);
        model
            .fit(&table)
            .map_err(|e| SynthError::Model {
                table: table_name.to_string(),
                message: e.to_string(),
            })?;
        self.models.insert(table_name.to_string(), model);

        // Identifier columns are never modeled; reattach them unchanged.
        for (column, values) in keys {
            put_column(&mut table, &column, values);
        }

        ctx.tables.insert(table_name.to_string(), table.clone());
        Ok(table)
    }

    /// Join every child's extension rows onto the parent table, one set of
    /// columns per (child, foreign key) pair, left-joined on the parent's
    /// primary key. Missing `num_rows` cells are zero-filled and the
    /// fit-time maximum of each `num_rows` column is recorded.
    fn extend_table(
        &mut self,
        ctx: &mut FitContext<'_>,
        mut table: TableData,
        table_name: &str,
        primary_key: &str,
    ) -> Result<TableData> {
        info!(table = table_name, "computing extensions");

        let children: Vec<String> = self
            .schema
            .children(table_name)
            .into_iter()
            .map(str::to_string)
            .collect();

        for child_name in children {
            let child_table = if self.models.contains_key(&child_name) {
                ctx.tables
                    .get(&child_name)
                    .cloned()
                    .ok_or_else(|| SynthError::MissingTable {
                        table: child_name.clone(),
                    })?
            } else {
                self.model_table(ctx, &child_name)?
            };

            let child_primary = self.schema.primary_key(&child_name)?.map(|s| s.to_string());
            let foreign_keys: Vec<String> = self
                .schema
                .foreign_keys(table_name, &child_name)?
                .into_iter()
                .map(str::to_string)
                .collect();

            for foreign_key in foreign_keys {
                let child_meta = self
                    .models
                    .get(&child_name)
                    .map(|m| m.meta().clone())
                    .ok_or_else(|| SynthError::UnknownTable {
                        table: child_name.clone(),
                    })?;

                let extensions = extension::build_extensions(
                    &child_name,
                    &child_table,
                    &foreign_key,
                    child_primary.as_deref(),
                    &child_meta,
                    self.factory,
                );

                // Stable column list for this pair, shared by all groups.
                let param_columns: Vec<String> = extensions
                    .values()
                    .next()
                    .map(|row| row.keys().cloned().collect())
                    .unwrap_or_default();

                for row in table.iter_mut() {
                    let key = row
                        .get(primary_key)
                        .unwrap_or(&Value::Null)
                        .group_key();
                    match extensions.get(&key) {
                        Some(ext_row) => {
                            for (column, value) in ext_row {
                                row.insert(column.clone(), value.clone());
                            }
                        }
                        None => {
                            for column in &param_columns {
                                row.insert(column.clone(), Value::Null);
                            }
                        }
                    }
                }

                // num_rows is always present and zero-filled, even when no
                // group fit succeeded.
                let num_rows_column = ExtensionKey::num_rows_column(&child_name, &foreign_key);
                let mut max_rows = 0.0_f64;
                for row in table.iter_mut() {
                    let value = row
                        .get(&num_rows_column)
                        .and_then(|v| v.as_f64())
                        .unwrap_or(0.0);
                    row.insert(num_rows_column.clone(), Value::Float(value));
                    max_rows = max_rows.max(value);
                }
                self.max_child_rows.insert(num_rows_column, max_rows);
            }
        }

        Ok(table)
    }

    fn load_table(&self, ctx: &mut FitContext<'_>, table_name: &str) -> Result<TableData> {
        if let Some(table) = ctx.tables.get(table_name) {
            return Ok(table.clone());
        }
        match ctx.source {
            Some(source) => {
                let table = source.load_table(table_name)?;
                ctx.tables.insert(table_name.to_string(), table.clone());
                Ok(table)
            }
            None => Err(SynthError::MissingTable {
                table: table_name.to_string(),
            }),
        }
    }
}
