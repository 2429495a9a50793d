pub mod data;
pub mod error;
pub mod fit;
pub mod model;
pub mod params;
pub mod sample;
pub mod schema;

// Re-export key types for convenience
pub use data::{Row, TableData, Tables, Value};
pub use error::{Result, SynthError};
pub use fit::{FittedModel, Hma};
pub use sample::SampleOptions;
pub use schema::{Field, Schema, TableSchema};
