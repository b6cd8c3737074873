//! Error types for the ELT runner.

use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum EltError {
    /// Missing or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The config file is not valid TOML or has the wrong shape.
    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A table, schema or procedure name that cannot be quoted safely.
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Reading a source table failed.
    #[error("Extract from {table} failed: {message}")]
    Extract { table: String, message: String },

    /// Replacing a staging table failed.
    #[error("Stage into {table} failed: {message}")]
    Stage { table: String, message: String },

    /// A source column has a type the staging area cannot hold.
    #[error("Unsupported type {type_name} for column {column} in {table}")]
    UnsupportedType {
        table: String,
        column: String,
        type_name: String,
    },

    /// The transformation procedure (or the fact count after it) failed.
    #[error("Transform error: {0}")]
    Transform(String),

    /// Writing to the pipeline log failed.
    #[error("Audit error: {0}")]
    Audit(String),

    /// Querying the pipeline log for the report failed.
    #[error("Report error: {0}")]
    Report(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EltError {
    /// Create an extract error for the given table.
    pub fn extract(table: impl ToString, message: impl ToString) -> Self {
        Self::Extract {
            table: table.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a stage error for the given table.
    pub fn stage(table: impl ToString, message: impl ToString) -> Self {
        Self::Stage {
            table: table.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for pipeline operations.
pub type EltResult<T> = Result<T, EltError>;
