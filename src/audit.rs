//! Pipeline run log.
//!
//! Each audited run owns one row in the log table:
//!
//! ```text
//! start()      -> INSERT ... status = 'Running'
//! succeed(n)   -> UPDATE ... status = 'Success', rows_processed = n
//! fail(msg)    -> UPDATE ... status = 'Error',   error_message = msg
//! ```
//!
//! `succeed` borrows the handle so a row whose `Success` update was
//! rejected can still be closed with `fail`.
//!
//! The table itself is expected to exist with the columns `log_id`,
//! `pipeline_name`, `start_time`, `end_time`, `status`, `rows_processed`
//! and `error_message`.

use crate::engine::Warehouse;
use crate::error::{EltError, EltResult};
use crate::sql::{self, QualifiedName};

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Status column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Success => "Success",
            RunStatus::Error => "Error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = EltError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(RunStatus::Running),
            "Success" => Ok(RunStatus::Success),
            "Error" => Ok(RunStatus::Error),
            other => Err(EltError::Audit(format!("unknown run status '{}'", other))),
        }
    }
}

/// Handle on the log table.
#[derive(Clone)]
pub struct AuditLog {
    pool: PgPool,
    table: QualifiedName,
}

impl AuditLog {
    pub fn new(warehouse: &Warehouse, table: QualifiedName) -> Self {
        Self {
            pool: warehouse.pool().clone(),
            table,
        }
    }

    pub fn table(&self) -> &QualifiedName {
        &self.table
    }

    /// Record a new run as `Running` and return its handle.
    pub async fn start(&self, pipeline_name: &str) -> EltResult<AuditRun<'_>> {
        let started_at = now();
        let log_id = sqlx::query_scalar::<_, i64>(&sql::audit_start(&self.table))
            .bind(pipeline_name)
            .bind(started_at)
            .bind(RunStatus::Running.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EltError::Audit(format!("opening log row: {}", e)))?;

        info!(log_id, pipeline = pipeline_name, "run logged as Running");
        Ok(AuditRun {
            log: self,
            log_id,
            started_at,
        })
    }
}

/// An open log row. `fail` consumes it.
#[must_use = "an audit run must be closed with succeed() or fail()"]
pub struct AuditRun<'a> {
    log: &'a AuditLog,
    log_id: i64,
    started_at: NaiveDateTime,
}

impl AuditRun<'_> {
    pub fn log_id(&self) -> i64 {
        self.log_id
    }

    pub fn started_at(&self) -> NaiveDateTime {
        self.started_at
    }

    /// Mark the run `Success` with the number of rows it produced.
    pub async fn succeed(&self, rows_processed: Option<i64>) -> EltResult<()> {
        let result = sqlx::query(&sql::audit_success(&self.log.table))
            .bind(now())
            .bind(RunStatus::Success.as_str())
            .bind(rows_processed)
            .bind(self.log_id)
            .execute(&self.log.pool)
            .await
            .map_err(|e| EltError::Audit(format!("closing log row {}: {}", self.log_id, e)))?;

        self.ensure_updated(result.rows_affected())?;
        info!(log_id = self.log_id, ?rows_processed, "run logged as Success");
        Ok(())
    }

    /// Mark the run `Error` with the failure message.
    pub async fn fail(self, message: &str) -> EltResult<()> {
        let result = sqlx::query(&sql::audit_failure(&self.log.table))
            .bind(now())
            .bind(RunStatus::Error.as_str())
            .bind(message)
            .bind(self.log_id)
            .execute(&self.log.pool)
            .await
            .map_err(|e| EltError::Audit(format!("closing log row {}: {}", self.log_id, e)))?;

        self.ensure_updated(result.rows_affected())?;
        info!(log_id = self.log_id, "run logged as Error");
        Ok(())
    }

    fn ensure_updated(&self, rows_affected: u64) -> EltResult<()> {
        if rows_affected == 0 {
            return Err(EltError::Audit(format!(
                "log row {} not found in {}",
                self.log_id, self.log.table
            )));
        }
        Ok(())
    }
}

/// Log timestamps are local wall-clock time, stored without a zone.
fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
