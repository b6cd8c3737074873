//! The extract, load, transform sequence.

use crate::audit::AuditLog;
use crate::config::{EltConfig, SourceTable};
use crate::engine::Warehouse;
use crate::error::EltResult;
use crate::sql;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Progress markers handed to the caller's observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Extract,
    Load,
    Transform,
}

impl Phase {
    /// 1-based position in a full run.
    pub fn step(&self) -> u8 {
        match self {
            Phase::Extract => 1,
            Phase::Load => 2,
            Phase::Transform => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Extract => write!(f, "Extracting raw data"),
            Phase::Load => write!(f, "Loading raw data into staging"),
            Phase::Transform => write!(f, "Triggering transformation"),
        }
    }
}

/// What a single source produced.
#[derive(Debug, Clone, Serialize)]
pub struct StagedTable {
    pub source: String,
    pub staging: String,
    pub rows: u64,
}

/// Outcome of `run` / `run_audited`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub pipeline: String,
    pub staged: Vec<StagedTable>,
    /// Fact table row count after the transform, when one is configured.
    pub rows_processed: Option<i64>,
    /// Pipeline log row, for audited runs.
    pub log_id: Option<i64>,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
}

pub struct Pipeline {
    warehouse: Warehouse,
    config: EltConfig,
    tables: Vec<SourceTable>,
}

impl Pipeline {
    pub fn new(warehouse: Warehouse, config: EltConfig) -> EltResult<Self> {
        config.validate()?;
        let tables = config.source_tables()?;
        Ok(Self {
            warehouse,
            config,
            tables,
        })
    }

    pub fn config(&self) -> &EltConfig {
        &self.config
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Extract every source, then replace every staging table.
    pub async fn load(&self, mut on_phase: impl FnMut(Phase)) -> EltResult<Vec<StagedTable>> {
        on_phase(Phase::Extract);
        let mut frames = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            frames.push(self.warehouse.extract(&table.source).await?);
        }

        on_phase(Phase::Load);
        let mut staged = Vec::with_capacity(frames.len());
        for (table, frame) in self.tables.iter().zip(&frames) {
            let rows = self
                .warehouse
                .stage(frame, &table.staging, self.config.staging.batch_size)
                .await?;
            staged.push(StagedTable {
                source: table.source.to_string(),
                staging: table.staging.to_string(),
                rows,
            });
        }
        Ok(staged)
    }

    /// Call the procedure and count the fact table if one is configured.
    pub async fn transform(&self, mut on_phase: impl FnMut(Phase)) -> EltResult<Option<i64>> {
        on_phase(Phase::Transform);
        self.warehouse
            .call_procedure(&self.config.procedure()?)
            .await?;

        match self.config.fact_table()? {
            Some(fact) => {
                let rows = self.warehouse.count_rows(&fact).await?;
                info!(table = %fact, rows, "fact table counted");
                Ok(Some(rows))
            }
            None => Ok(None),
        }
    }

    /// Load then transform.
    pub async fn run(&self, mut on_phase: impl FnMut(Phase)) -> EltResult<RunSummary> {
        let started_at = Local::now().naive_local();
        info!(pipeline = %self.config.pipeline.name, "run started");

        let staged = self.load(&mut on_phase).await?;
        let rows_processed = self.transform(&mut on_phase).await?;

        info!(pipeline = %self.config.pipeline.name, ?rows_processed, "run finished");
        Ok(RunSummary {
            pipeline: self.config.pipeline.name.clone(),
            staged,
            rows_processed,
            log_id: None,
            started_at,
            finished_at: Local::now().naive_local(),
        })
    }

    /// [`run`](Self::run) wrapped in a pipeline log row.
    ///
    /// If the log row cannot be opened nothing runs. If the run fails, or
    /// the row cannot be marked `Success`, the row is closed as `Error` and
    /// that error is returned, even when closing the row fails too.
    pub async fn run_audited(&self, on_phase: impl FnMut(Phase)) -> EltResult<RunSummary> {
        let log = AuditLog::new(&self.warehouse, self.config.audit_table()?);
        let audit = log.start(&self.config.pipeline.name).await?;
        let log_id = audit.log_id();
        let started_at = audit.started_at();

        let outcome = match self.run(on_phase).await {
            Ok(summary) => audit.succeed(summary.rows_processed).await.map(|()| summary),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(mut summary) => {
                summary.log_id = Some(log_id);
                summary.started_at = started_at;
                Ok(summary)
            }
            Err(e) => {
                if let Err(log_err) = audit.fail(&e.to_string()).await {
                    warn!(log_id, error = %log_err, "could not record run failure");
                }
                Err(e)
            }
        }
    }
}

/// One statement a run would send, labelled with its step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStatement {
    pub step: &'static str,
    pub sql: String,
}

impl PlannedStatement {
    fn new(step: &'static str, sql: String) -> Self {
        Self { step, sql }
    }
}

/// Which part of the pipeline a plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Load,
    Transform,
    Full,
}

/// The statements a run would issue, in order, without touching a database.
///
/// Column lists and batch counts depend on the data, so staging DDL and
/// inserts are shown in outline.
pub fn plan(config: &EltConfig, scope: Scope, audited: bool) -> EltResult<Vec<PlannedStatement>> {
    config.validate()?;
    let mut out = Vec::new();
    let audit_table = config.audit_table()?;

    if audited {
        out.push(PlannedStatement::new("audit", sql::audit_start(&audit_table)));
    }

    if matches!(scope, Scope::Load | Scope::Full) {
        let tables = config.source_tables()?;
        for t in &tables {
            out.push(PlannedStatement::new("extract", sql::select_all(&t.source)));
        }
        for t in &tables {
            out.push(PlannedStatement::new("load", "BEGIN".to_string()));
            out.push(PlannedStatement::new("load", sql::drop_table(&t.staging)));
            out.push(PlannedStatement::new(
                "load",
                format!(
                    "CREATE TABLE {} (<columns of {}>)",
                    t.staging.to_sql(),
                    t.source
                ),
            ));
            out.push(PlannedStatement::new(
                "load",
                format!(
                    "INSERT INTO {} (...) VALUES ... -- up to {} rows per statement",
                    t.staging.to_sql(),
                    config.staging.batch_size
                ),
            ));
            out.push(PlannedStatement::new("load", "COMMIT".to_string()));
        }
    }

    if matches!(scope, Scope::Transform | Scope::Full) {
        out.push(PlannedStatement::new(
            "transform",
            sql::call_procedure(&config.procedure()?),
        ));
        if let Some(fact) = config.fact_table()? {
            out.push(PlannedStatement::new("transform", sql::count_rows(&fact)));
        }
    }

    if audited {
        out.push(PlannedStatement::new("audit", sql::audit_success(&audit_table)));
    }
    Ok(out)
}
