//! Default table model: an independent Gaussian per encoded column.
//!
//! Each modeled column is encoded to a float (categoricals through
//! frequency intervals), fit as `loc`/`scale` moments, and sampled back
//! through the inverse encoding. Likelihood is the product of per-column
//! normal densities; a zero scale anywhere makes the model singular.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::Rng;

use crate::data::{Row, TableData, Value};
use crate::model::{
    ColumnMeta, LikelihoodError, ModelError, ModelFactory, ParamMap, TableMeta, TableModel,
    NUM_ROWS_PARAM,
};

/// Default factory producing `GaussianModel` instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianFactory;

impl ModelFactory for GaussianFactory {
    fn build(&self, meta: &TableMeta) -> Box<dyn TableModel> {
        Box::new(GaussianModel::new(meta.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    loc: f64,
    scale: f64,
}

/// Per-column diagonal Gaussian model.
#[derive(Debug, Clone)]
pub struct GaussianModel {
    meta: TableMeta,
    columns: IndexMap<String, Moments>,
    num_rows: usize,
}

impl GaussianModel {
    pub fn new(meta: TableMeta) -> Self {
        let columns = meta
            .columns
            .keys()
            .map(|name| (name.clone(), Moments::default()))
            .collect();
        Self {
            meta,
            columns,
            num_rows: 0,
        }
    }

    fn loc_param(column: &str) -> String {
        format!("{}__loc", column)
    }

    fn scale_param(column: &str) -> String {
        format!("{}__scale", column)
    }
}

impl TableModel for GaussianModel {
    fn meta(&self) -> &TableMeta {
        &self.meta
    }

    fn fit(&mut self, rows: &[Row]) -> Result<(), ModelError> {
        self.num_rows = rows.len();

        for (name, col_meta) in &self.meta.columns {
            let encoded: Vec<f64> = rows
                .iter()
                .filter_map(|row| encode(row.get(name).unwrap_or(&Value::Null), col_meta))
                .collect();

            if encoded.is_empty() && !rows.is_empty() {
                return Err(ModelError::UnencodableColumn {
                    column: name.clone(),
                });
            }

            let moments = if encoded.is_empty() {
                Moments::default()
            } else {
                let n = encoded.len() as f64;
                let loc = encoded.iter().sum::<f64>() / n;
                let variance = encoded.iter().map(|x| (x - loc).powi(2)).sum::<f64>() / n;
                Moments {
                    loc,
                    scale: variance.sqrt(),
                }
            };
            self.columns.insert(name.clone(), moments);
        }

        Ok(())
    }

    fn parameters(&self) -> ParamMap {
        let mut params = ParamMap::new();
        for (name, moments) in &self.columns {
            params.insert(Self::loc_param(name), moments.loc);
            params.insert(Self::scale_param(name), moments.scale);
        }
        params.insert(NUM_ROWS_PARAM.to_string(), self.num_rows as f64);
        params
    }

    fn set_parameters(&mut self, params: &ParamMap) {
        for name in self.meta.columns.keys().cloned().collect::<Vec<_>>() {
            let loc = params.get(&Self::loc_param(&name)).copied().unwrap_or(0.0);
            let scale = params
                .get(&Self::scale_param(&name))
                .copied()
                .unwrap_or(0.0);
            let scale = if scale.is_finite() { scale.max(0.0) } else { 0.0 };
            let loc = if loc.is_finite() { loc } else { 0.0 };
            self.columns.insert(name, Moments { loc, scale });
        }

        self.num_rows = params
            .get(NUM_ROWS_PARAM)
            .map(|v| if v.is_finite() { v.round().max(0.0) as usize } else { 0 })
            .unwrap_or(0);
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn sample(&self, n: usize, rng: &mut StdRng) -> TableData {
        let mut rows = Vec::with_capacity(n);
        for _ in 0..n {
            let mut row = Row::new();
            for (name, col_meta) in &self.meta.columns {
                let moments = self.columns[name];
                let x = moments.loc + moments.scale * standard_normal(rng);
                row.insert(name.clone(), decode(x, col_meta));
            }
            rows.push(row);
        }
        rows
    }

    fn likelihood(&self, rows: &[Row]) -> Result<Vec<f64>, LikelihoodError> {
        // A zero variance anywhere means the density is degenerate.
        if self.columns.values().any(|m| m.scale <= f64::EPSILON) {
            return Err(LikelihoodError::Singular);
        }

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let mut density = 1.0_f64;
            for (name, col_meta) in &self.meta.columns {
                let value = row.get(name).unwrap_or(&Value::Null);
                if let Some(x) = encode(value, col_meta) {
                    let m = self.columns[name];
                    let z = (x - m.loc) / m.scale;
                    density *= (-0.5 * z * z).exp() / (m.scale * (2.0 * std::f64::consts::PI).sqrt());
                }
            }
            result.push(density);
        }
        Ok(result)
    }
}

/// Encode one cell to its numeric model-space value. `None` means the cell
/// contributes nothing to a fit or likelihood (null, or an unseen category).
fn encode(value: &Value, meta: &ColumnMeta) -> Option<f64> {
    if value.is_null() {
        return None;
    }
    match meta {
        ColumnMeta::Numeric | ColumnMeta::Boolean | ColumnMeta::Datetime => value.as_f64(),
        ColumnMeta::Categorical { categories } => {
            let key = value.group_key();
            let mut start = 0.0;
            for (category, freq) in categories {
                if *category == key {
                    return Some(start + freq / 2.0);
                }
                start += freq;
            }
            None
        }
    }
}

/// Decode one model-space value back to a cell.
fn decode(x: f64, meta: &ColumnMeta) -> Value {
    match meta {
        ColumnMeta::Numeric => Value::Float(x),
        ColumnMeta::Boolean => Value::Bool(x >= 0.5),
        ColumnMeta::Datetime => chrono::DateTime::from_timestamp(x.round() as i64, 0)
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        ColumnMeta::Categorical { categories } => {
            if categories.is_empty() {
                return Value::Null;
            }
            // Clamp into [0, 1) and walk the cumulative intervals.
            let x = x.clamp(0.0, 1.0 - f64::EPSILON);
            let mut cumulative = 0.0;
            for (category, freq) in categories {
                cumulative += freq;
                if x < cumulative {
                    return Value::String(category.clone());
                }
            }
            Value::String(categories.last().map(|(c, _)| c.clone()).unwrap_or_default())
        }
    }
}

/// Box–Muller standard normal draw from two uniforms.
fn standard_normal(rng: &mut StdRng) -> f64 {
    // 1 - u keeps the log argument in (0, 1].
    let u1 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
