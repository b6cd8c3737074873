//! # elt — batch ELT for the Northwind sales tables
//!
//! Pulls the source tables, lands them unchanged in a staging schema, then
//! hands over to a stored procedure in the warehouse for the actual
//! transformation. Runs can be recorded in a pipeline log, and that log can
//! be summarised as a Markdown report.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use elt::prelude::*;
//!
//! let config = EltConfig::load(None)?;
//! let url = config.database_url(None)?;
//! let warehouse = Warehouse::connect(&url, &config.database).await?;
//!
//! let pipeline = Pipeline::new(warehouse, config)?;
//! let summary = pipeline.run_audited(|phase| println!("{}...", phase)).await?;
//! ```
//!
//! ## Steps
//!
//! | Step      | SQL                                   |
//! |-----------|---------------------------------------|
//! | Extract   | `SELECT * FROM <source>`              |
//! | Load      | `DROP` / `CREATE` / `INSERT` staging  |
//! | Transform | `CALL <procedure>()`                  |
//! | Audit     | `INSERT` / `UPDATE` the pipeline log  |

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod sql;

pub mod prelude {
    pub use crate::audit::{AuditLog, AuditRun, RunStatus};
    pub use crate::config::EltConfig;
    pub use crate::engine::Warehouse;
    pub use crate::error::*;
    pub use crate::frame::{Cell, Column, ColumnKind, Frame};
    pub use crate::pipeline::{Phase, Pipeline, PlannedStatement, RunSummary, Scope, StagedTable, plan};
    pub use crate::report::Report;
    pub use crate::sql::QualifiedName;
}
