//! Warehouse access.
//!
//! This module owns the connection pool and the four things the pipeline
//! asks of the database: read a table, replace a staging table, call the
//! transformation procedure, count rows.

use crate::config::DatabaseConfig;
use crate::error::{EltError, EltResult};
use crate::frame::{Cell, Column, Frame};
use crate::sql::{self, QualifiedName};

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{Column as _, Executor, Postgres, QueryBuilder, Statement, TypeInfo};
use tracing::{debug, info};

/// A pooled connection to the warehouse.
#[derive(Clone)]
pub struct Warehouse {
    pool: PgPool,
}

impl Warehouse {
    /// Connect using a `postgres://` URL and the pool settings from config.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let wh = Warehouse::connect("postgres://localhost/northwind", &config.database).await?;
    /// ```
    pub async fn connect(url: &str, options: &DatabaseConfig) -> EltResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout())
            .connect(url)
            .await
            .map_err(|e| EltError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Read every row of `table`.
    ///
    /// The column list comes from the prepared statement, so an empty table
    /// still produces a frame that can recreate its staging copy.
    pub async fn extract(&self, table: &QualifiedName) -> EltResult<Frame> {
        let sql = sql::select_all(table);
        debug!(%sql, "extract");

        let statement = self
            .pool
            .prepare(&sql)
            .await
            .map_err(|e| EltError::extract(table, e))?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| Column::resolve(table, c.name(), c.type_info().name()))
            .collect::<EltResult<Vec<_>>>()?;

        let rows: Vec<PgRow> = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EltError::extract(table, e))?;

        let mut frame = Frame::new(table.clone(), columns);
        frame.push_rows(&rows)?;

        info!(table = %table, rows = frame.row_count(), "extracted");
        Ok(frame)
    }

    /// Replace `target` with the contents of `frame`.
    ///
    /// Drop, create and insert run in one transaction: readers see either
    /// the previous staging table or the complete new one.
    pub async fn stage(
        &self,
        frame: &Frame,
        target: &QualifiedName,
        batch_size: usize,
    ) -> EltResult<u64> {
        let stage_err = |e: sqlx::Error| EltError::stage(target, e);

        let mut tx = self.pool.begin().await.map_err(stage_err)?;

        let drop_sql = sql::drop_table(target);
        debug!(sql = %drop_sql, "stage");
        sqlx::query(&drop_sql)
            .execute(&mut *tx)
            .await
            .map_err(stage_err)?;

        let create_sql = sql::create_table(target, &frame.column_defs());
        debug!(sql = %create_sql, "stage");
        sqlx::query(&create_sql)
            .execute(&mut *tx)
            .await
            .map_err(stage_err)?;

        let mut inserted = 0u64;
        if !frame.columns.is_empty() {
            let prefix = sql::insert_prefix(target, &frame.column_names());
            let chunk = sql::rows_per_statement(batch_size, frame.columns.len());

            for rows in frame.rows.chunks(chunk) {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(prefix.as_str());
                builder.push_values(rows, |mut list, row| {
                    for cell in row {
                        push_cell(&mut list, cell.clone());
                    }
                });

                let result = builder
                    .build()
                    .execute(&mut *tx)
                    .await
                    .map_err(stage_err)?;
                inserted += result.rows_affected();
            }
        }

        tx.commit().await.map_err(stage_err)?;

        info!(table = %target, rows = inserted, "staged");
        Ok(inserted)
    }

    /// Run the transformation procedure.
    pub async fn call_procedure(&self, procedure: &QualifiedName) -> EltResult<()> {
        let sql = sql::call_procedure(procedure);
        debug!(%sql, "transform");

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| EltError::Transform(format!("{}: {}", procedure, e)))?;

        info!(procedure = %procedure, "transform finished");
        Ok(())
    }

    /// Count the rows currently in `table`.
    pub async fn count_rows(&self, table: &QualifiedName) -> EltResult<i64> {
        let sql = sql::count_rows(table);
        debug!(%sql, "count");

        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EltError::Transform(format!("counting {}: {}", table, e)))
    }
}

/// Bind one cell into a VALUES tuple. NULLs keep their column's type.
fn push_cell(list: &mut Separated<'_, '_, Postgres, &'static str>, cell: Cell) {
    match cell {
        Cell::Bool(v) => list.push_bind(v),
        Cell::SmallInt(v) => list.push_bind(v),
        Cell::Int(v) => list.push_bind(v),
        Cell::BigInt(v) => list.push_bind(v),
        Cell::Real(v) => list.push_bind(v),
        Cell::Double(v) => list.push_bind(v),
        Cell::Numeric(v) => list.push_bind(v),
        Cell::Text(v) => list.push_bind(v),
        Cell::Date(v) => list.push_bind(v),
        Cell::Timestamp(v) => list.push_bind(v),
        Cell::TimestampTz(v) => list.push_bind(v),
        Cell::Time(v) => list.push_bind(v),
        Cell::Bytes(v) => list.push_bind(v),
        Cell::Uuid(v) => list.push_bind(v),
        Cell::Json(v) => list.push_bind(v),
    };
}
