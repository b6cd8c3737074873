//! In-memory copy of an extracted table.
//!
//! A [`Frame`] is what travels between the extract and load steps: the
//! source column list with resolved kinds, and every row as typed cells.

use crate::error::{EltError, EltResult};
use crate::sql::QualifiedName;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

/// The column types the staging area can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric,
    Text,
    Date,
    Timestamp,
    TimestampTz,
    Time,
    Bytes,
    Uuid,
    Json,
}

impl ColumnKind {
    /// Resolve a Postgres type name as reported by the driver.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let kind = match type_name.to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Self::Bool,
            "INT2" | "SMALLINT" => Self::SmallInt,
            "INT4" | "INT" | "INTEGER" => Self::Int,
            "INT8" | "BIGINT" => Self::BigInt,
            "FLOAT4" | "REAL" => Self::Real,
            "FLOAT8" | "DOUBLE PRECISION" => Self::Double,
            "NUMERIC" | "DECIMAL" => Self::Numeric,
            // sqlx names bpchar "CHAR"
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => Self::Text,
            "DATE" => Self::Date,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "TIME" => Self::Time,
            "BYTEA" => Self::Bytes,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            _ => return None,
        };
        Some(kind)
    }

    /// The column type used when creating the staging table.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Bool => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Int => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE PRECISION",
            Self::Numeric => "NUMERIC",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Time => "TIME",
            Self::Bytes => "BYTEA",
            Self::Uuid => "UUID",
            Self::Json => "JSONB",
        }
    }
}

/// One nullable value. The variant always matches its column's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Bool(Option<bool>),
    SmallInt(Option<i16>),
    Int(Option<i32>),
    BigInt(Option<i64>),
    Real(Option<f32>),
    Double(Option<f64>),
    Numeric(Option<Decimal>),
    Text(Option<String>),
    Date(Option<NaiveDate>),
    Timestamp(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
    Time(Option<NaiveTime>),
    Bytes(Option<Vec<u8>>),
    Uuid(Option<Uuid>),
    Json(Option<serde_json::Value>),
}

impl Cell {
    /// Decode column `index` of `row` as `kind`.
    pub fn decode(row: &PgRow, index: usize, kind: ColumnKind) -> Result<Self, sqlx::Error> {
        let cell = match kind {
            ColumnKind::Bool => Cell::Bool(row.try_get(index)?),
            ColumnKind::SmallInt => Cell::SmallInt(row.try_get(index)?),
            ColumnKind::Int => Cell::Int(row.try_get(index)?),
            ColumnKind::BigInt => Cell::BigInt(row.try_get(index)?),
            ColumnKind::Real => Cell::Real(row.try_get(index)?),
            ColumnKind::Double => Cell::Double(row.try_get(index)?),
            ColumnKind::Numeric => Cell::Numeric(row.try_get(index)?),
            ColumnKind::Text => Cell::Text(row.try_get(index)?),
            ColumnKind::Date => Cell::Date(row.try_get(index)?),
            ColumnKind::Timestamp => Cell::Timestamp(row.try_get(index)?),
            ColumnKind::TimestampTz => Cell::TimestampTz(row.try_get(index)?),
            ColumnKind::Time => Cell::Time(row.try_get(index)?),
            ColumnKind::Bytes => Cell::Bytes(row.try_get(index)?),
            ColumnKind::Uuid => Cell::Uuid(row.try_get(index)?),
            ColumnKind::Json => Cell::Json(row.try_get(index)?),
        };
        Ok(cell)
    }

    pub fn is_null(&self) -> bool {
        match self {
            Cell::Bool(v) => v.is_none(),
            Cell::SmallInt(v) => v.is_none(),
            Cell::Int(v) => v.is_none(),
            Cell::BigInt(v) => v.is_none(),
            Cell::Real(v) => v.is_none(),
            Cell::Double(v) => v.is_none(),
            Cell::Numeric(v) => v.is_none(),
            Cell::Text(v) => v.is_none(),
            Cell::Date(v) => v.is_none(),
            Cell::Timestamp(v) => v.is_none(),
            Cell::TimestampTz(v) => v.is_none(),
            Cell::Time(v) => v.is_none(),
            Cell::Bytes(v) => v.is_none(),
            Cell::Uuid(v) => v.is_none(),
            Cell::Json(v) => v.is_none(),
        }
    }
}

/// A source column with its resolved kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    /// Resolve a driver-reported column, failing on types staging cannot hold.
    pub fn resolve(table: &QualifiedName, name: &str, type_name: &str) -> EltResult<Self> {
        let kind =
            ColumnKind::from_type_name(type_name).ok_or_else(|| EltError::UnsupportedType {
                table: table.to_string(),
                column: name.to_string(),
                type_name: type_name.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            kind,
        })
    }
}

/// Every row of one source table.
#[derive(Debug, Clone)]
pub struct Frame {
    pub source: QualifiedName,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new(source: QualifiedName, columns: Vec<Column>) -> Self {
        Self {
            source,
            columns,
            rows: Vec::new(),
        }
    }

    /// Decode and append fetched rows.
    pub fn push_rows(&mut self, rows: &[PgRow]) -> EltResult<()> {
        self.rows.reserve(rows.len());
        for row in rows {
            let cells = self
                .columns
                .iter()
                .enumerate()
                .map(|(i, col)| Cell::decode(row, i, col.kind))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| EltError::extract(&self.source, e))?;
            self.rows.push(cells);
        }
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `(name, sql_type)` pairs for the staging `CREATE TABLE`.
    pub fn column_defs(&self) -> Vec<(&str, &str)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.kind.sql_type()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> QualifiedName {
        "public.orders".parse().unwrap()
    }

    #[test]
    fn test_kind_from_driver_names() {
        assert_eq!(ColumnKind::from_type_name("INT2"), Some(ColumnKind::SmallInt));
        assert_eq!(ColumnKind::from_type_name("CHAR"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::from_type_name("BPCHAR"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::from_type_name("varchar"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::from_type_name("FLOAT4"), Some(ColumnKind::Real));
        assert_eq!(ColumnKind::from_type_name("TIMESTAMPTZ"), Some(ColumnKind::TimestampTz));
        assert_eq!(ColumnKind::from_type_name("JSON"), Some(ColumnKind::Json));
        assert_eq!(ColumnKind::from_type_name("POINT"), None);
        assert_eq!(ColumnKind::from_type_name("INT4[]"), None);
    }

    #[test]
    fn test_staging_types_round_trip_through_names() {
        for kind in [
            ColumnKind::Bool,
            ColumnKind::SmallInt,
            ColumnKind::Int,
            ColumnKind::BigInt,
            ColumnKind::Real,
            ColumnKind::Double,
            ColumnKind::Numeric,
            ColumnKind::Text,
            ColumnKind::Date,
            ColumnKind::Timestamp,
            ColumnKind::TimestampTz,
            ColumnKind::Time,
            ColumnKind::Bytes,
            ColumnKind::Uuid,
            ColumnKind::Json,
        ] {
            assert_eq!(ColumnKind::from_type_name(kind.sql_type()), Some(kind));
        }
    }

    #[test]
    fn test_resolve_unsupported_column() {
        let err = Column::resolve(&orders(), "ship_point", "POINT").unwrap_err();
        match err {
            EltError::UnsupportedType {
                table,
                column,
                type_name,
            } => {
                assert_eq!(table, "public.orders");
                assert_eq!(column, "ship_point");
                assert_eq!(type_name, "POINT");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_frame_column_defs() {
        let frame = Frame::new(
            orders(),
            vec![
                Column::resolve(&orders(), "order_id", "INT2").unwrap(),
                Column::resolve(&orders(), "customer_id", "BPCHAR").unwrap(),
                Column::resolve(&orders(), "freight", "FLOAT4").unwrap(),
            ],
        );
        assert_eq!(frame.row_count(), 0);
        assert_eq!(frame.column_names(), vec!["order_id", "customer_id", "freight"]);
        assert_eq!(
            frame.column_defs(),
            vec![
                ("order_id", "SMALLINT"),
                ("customer_id", "TEXT"),
                ("freight", "REAL")
            ]
        );
    }

    #[test]
    fn test_cell_null() {
        assert!(Cell::Text(None).is_null());
        assert!(!Cell::SmallInt(Some(10248)).is_null());
    }
}
