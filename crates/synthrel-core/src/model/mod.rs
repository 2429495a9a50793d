//! # Table Model Capability
//!
//! The pluggable single-table statistical model the orchestrators consume:
//! fit on rows, serialize parameters to a flat mapping, rebuild from such a
//! mapping, sample rows, and score rows by likelihood. The hierarchical
//! algorithm never looks inside a model; everything it needs crosses this
//! trait boundary.

pub mod gaussian;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::data::{Row, TableData};

pub use gaussian::{GaussianFactory, GaussianModel};

/// Flattened model parameters: a flat name -> value mapping suitable for
/// storage inside a parent table row. Always includes `num_rows`.
pub type ParamMap = IndexMap<String, f64>;

/// Reserved parameter name carrying the fitted row count.
pub const NUM_ROWS_PARAM: &str = "num_rows";

/// Suffix marking variance-like parameters, which are undefined for
/// singleton groups.
pub const SCALE_SUFFIX: &str = "scale";

/// Modeling metadata for one table: which columns to model and how each
/// one is encoded to numeric form.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    pub name: String,
    pub columns: IndexMap<String, ColumnMeta>,
}

/// Encoding declaration for one modeled column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnMeta {
    /// Modeled directly as a float.
    Numeric,
    /// Encoded 0/1.
    Boolean,
    /// Encoded as epoch seconds.
    Datetime,
    /// Frequency-interval encoded: each category owns a sub-interval of
    /// [0, 1) proportional to its observed frequency, in listed order.
    Categorical { categories: Vec<(String, f64)> },
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }
}

/// A fit attempt that failed. Consumed by the extension builder (the group
/// is skipped) or promoted to a fatal error by the fit orchestrator.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("column '{column}' has no encodable values")]
    UnencodableColumn { column: String },
}

/// A likelihood evaluation that failed. Never fatal: the sampler's fallback
/// ladder treats these as undefined, not zero.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LikelihoodError {
    #[error("singular distribution: zero variance in at least one column")]
    Singular,
}

/// One flat table's statistical model.
pub trait TableModel {
    /// The metadata this model was configured with. Fresh instances for
    /// per-group fits and parameter reconstruction are built from this.
    fn meta(&self) -> &TableMeta;

    /// Fit the model on the given rows. Columns not named in the metadata
    /// are ignored.
    fn fit(&mut self, rows: &[Row]) -> Result<(), ModelError>;

    /// Serialize parameters to a flat mapping, including `num_rows`.
    fn parameters(&self) -> ParamMap;

    /// Rebuild internal state from a flat mapping. Missing entries default
    /// to zero; negative scales are clamped to zero.
    fn set_parameters(&mut self, params: &ParamMap);

    /// Row count recorded at fit time (or carried by `set_parameters`).
    fn num_rows(&self) -> usize;

    /// Draw `n` rows from the fitted distribution.
    fn sample(&self, n: usize, rng: &mut StdRng) -> TableData;

    /// Per-row likelihood of the given rows under this model.
    fn likelihood(&self, rows: &[Row]) -> Result<Vec<f64>, LikelihoodError>;
}

/// Builds fresh model instances from table metadata.
pub trait ModelFactory {
    fn build(&self, meta: &TableMeta) -> Box<dyn TableModel>;
}
