//! # Error Types
//!
//! Defines `SynthError`, the unified error enum for every fatal failure mode
//! in the synthrel pipeline. Every variant includes enough context (table
//! name, column name, offending value) to debug immediately.
//!
//! Recoverable conditions, such as a per-group fit failure inside the
//! extension builder or a singular likelihood during parent assignment, are
//! *not* errors. They are ordinary values (`Option`/skipped entries)
//! consumed by the sampling fallback ladder.

use thiserror::Error;

/// All fatal errors that can occur in synthrel operations.
#[derive(Error, Debug)]
pub enum SynthError {
    #[error("Schema validation failed for table '{table}': {message}")]
    SchemaValidation { table: String, message: String },

    #[error("Schema contains a foreign-key cycle involving table '{table}'")]
    CyclicSchema { table: String },

    #[error("Model has not been fitted yet. Call fit() before sample()")]
    NotFitted,

    #[error("Unknown table '{table}': not declared in the schema")]
    UnknownTable { table: String },

    #[error("No table data provided for '{table}' and no table source configured")]
    MissingTable { table: String },

    #[error(
        "No flattened parameters found for child '{table}' via foreign key '{foreign_key}' \
         in the sampled parent row"
    )]
    MissingParameters { table: String, foreign_key: String },

    #[error("Cannot cast value '{value}' in {table}.{column} to its declared type")]
    TypeCast {
        table: String,
        column: String,
        value: String,
    },

    #[error("Model error on table '{table}': {message}")]
    Model { table: String, message: String },

    #[error("Invalid schema JSON: {source}")]
    SchemaJson {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SynthError>;
