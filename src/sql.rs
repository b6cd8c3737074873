//! SQL generation for the pipeline.
//!
//! Every statement the runner sends to the warehouse is built here, so the
//! dry-run plan and the real run can never disagree. Values always travel as
//! bind parameters; only identifiers are spliced into the text, and those are
//! validated and quoted by [`QualifiedName`].

use crate::error::{EltError, EltResult};
use std::fmt;
use std::str::FromStr;

/// Postgres refuses statements with more bind parameters than this.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Words that must be quoted even when they are plain lowercase.
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "both", "case", "check", "column", "constraint", "create",
    "default", "desc", "distinct", "do", "else", "end", "false", "for", "foreign", "from",
    "grant", "group", "having", "in", "into", "is", "join", "limit", "not", "null", "offset",
    "on", "or", "order", "primary", "references", "select", "table", "then", "to", "true",
    "union", "unique", "user", "using", "when", "where", "with",
];

/// Quote a single identifier part for Postgres when it needs it.
///
/// Unquoted identifiers fold to lowercase, so anything with uppercase
/// letters, spaces or punctuation is wrapped in double quotes with embedded
/// quotes doubled.
pub fn quote_ident(name: &str) -> String {
    let needs_quoting = RESERVED_WORDS.contains(&name)
        || name
            .chars()
            .any(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'))
        || name.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(true);

    if needs_quoting {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        name.to_string()
    }
}

/// A table or procedure name with an optional schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(schema: Option<&str>, name: &str) -> EltResult<Self> {
        if name.trim().is_empty() || name.contains('\0') {
            return Err(EltError::InvalidIdentifier(name.to_string()));
        }
        if let Some(s) = schema {
            if s.trim().is_empty() || s.contains('\0') {
                return Err(EltError::InvalidIdentifier(format!("{}.{}", s, name)));
            }
        }
        Ok(Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// The same name moved into another schema.
    pub fn in_schema(&self, schema: &str) -> EltResult<Self> {
        Self::new(Some(schema), &self.name)
    }

    /// Render the name quoted for use in SQL text.
    pub fn to_sql(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name),
        }
    }
}

impl FromStr for QualifiedName {
    type Err = EltError;

    /// Parse `schema.name` or `name`. Only the first dot separates the
    /// schema, so `dbo.Order Details` keeps its space.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((schema, name)) => Self::new(Some(schema), name),
            None => Self::new(None, s),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// How many rows fit in one INSERT for a table with `columns` columns.
pub fn rows_per_statement(batch_size: usize, columns: usize) -> usize {
    if columns == 0 {
        return batch_size.max(1);
    }
    batch_size.min(MAX_BIND_PARAMS / columns).max(1)
}

pub fn select_all(table: &QualifiedName) -> String {
    format!("SELECT * FROM {}", table.to_sql())
}

pub fn drop_table(table: &QualifiedName) -> String {
    format!("DROP TABLE IF EXISTS {}", table.to_sql())
}

/// `CREATE TABLE` for a staging table from `(column, sql_type)` pairs.
pub fn create_table(table: &QualifiedName, columns: &[(&str, &str)]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty))
        .collect();
    format!("CREATE TABLE {} ({})", table.to_sql(), defs.join(", "))
}

/// The head of a multi-row INSERT; the VALUES list is pushed by the caller.
pub fn insert_prefix(table: &QualifiedName, columns: &[&str]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!("INSERT INTO {} ({}) ", table.to_sql(), cols.join(", "))
}

pub fn call_procedure(procedure: &QualifiedName) -> String {
    format!("CALL {}()", procedure.to_sql())
}

pub fn count_rows(table: &QualifiedName) -> String {
    format!("SELECT COUNT(*) FROM {}", table.to_sql())
}

/// Open a log row. Binds: pipeline name, start time, status.
pub fn audit_start(log: &QualifiedName) -> String {
    format!(
        "INSERT INTO {} (pipeline_name, start_time, status) VALUES ($1, $2, $3) \
         RETURNING CAST(log_id AS BIGINT)",
        log.to_sql()
    )
}

/// Close a log row successfully. Binds: end time, status, rows, log id.
pub fn audit_success(log: &QualifiedName) -> String {
    format!(
        "UPDATE {} SET end_time = $1, status = $2, rows_processed = $3 WHERE log_id = $4",
        log.to_sql()
    )
}

/// Close a log row with an error. Binds: end time, status, message, log id.
pub fn audit_failure(log: &QualifiedName) -> String {
    format!(
        "UPDATE {} SET end_time = $1, status = $2, error_message = $3 WHERE log_id = $4",
        log.to_sql()
    )
}

/// Per-day, per-status run totals over the last `$1` days, newest first.
pub fn report_summary(log: &QualifiedName) -> String {
    format!(
        "SELECT CAST(start_time AS DATE) AS run_date, \
         status, \
         COUNT(*) AS run_count, \
         CAST(SUM(COALESCE(rows_processed, 0)) AS BIGINT) AS total_rows \
         FROM {} \
         WHERE start_time >= LOCALTIMESTAMP - make_interval(days => $1) \
         GROUP BY CAST(start_time AS DATE), status \
         ORDER BY run_date DESC, status",
        log.to_sql()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("orders"), "orders");
        assert_eq!(quote_ident("stg_orders"), "stg_orders");
        assert_eq!(quote_ident("Orders"), "\"Orders\"");
        assert_eq!(quote_ident("Order Details"), "\"Order Details\"");
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("1st"), "\"1st\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_parse_qualified_name() {
        let name: QualifiedName = "dbo.Order Details".parse().unwrap();
        assert_eq!(name.schema.as_deref(), Some("dbo"));
        assert_eq!(name.name, "Order Details");
        assert_eq!(name.to_sql(), "dbo.\"Order Details\"");
        assert_eq!(name.to_string(), "dbo.Order Details");

        let bare: QualifiedName = "orders".parse().unwrap();
        assert_eq!(bare.schema, None);
        assert_eq!(bare.to_sql(), "orders");
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        assert!("".parse::<QualifiedName>().is_err());
        assert!(".orders".parse::<QualifiedName>().is_err());
        assert!("staging.".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn test_in_schema() {
        let name: QualifiedName = "stg_orders".parse().unwrap();
        let staged = name.in_schema("Staging").unwrap();
        assert_eq!(staged.to_sql(), "\"Staging\".stg_orders");
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(1000, 14), 1000);
        assert_eq!(rows_per_statement(10_000, 14), 4681);
        assert_eq!(rows_per_statement(0, 5), 1);
        assert_eq!(rows_per_statement(500, 0), 500);
        assert_eq!(rows_per_statement(1, MAX_BIND_PARAMS * 2), 1);
    }

    #[test]
    fn test_staging_ddl() {
        let table: QualifiedName = "staging.stg_order_details".parse().unwrap();
        assert_eq!(drop_table(&table), "DROP TABLE IF EXISTS staging.stg_order_details");
        assert_eq!(
            create_table(&table, &[("order_id", "SMALLINT"), ("UnitPrice", "REAL")]),
            "CREATE TABLE staging.stg_order_details (order_id SMALLINT, \"UnitPrice\" REAL)"
        );
        assert_eq!(
            insert_prefix(&table, &["order_id", "UnitPrice"]),
            "INSERT INTO staging.stg_order_details (order_id, \"UnitPrice\") "
        );
    }

    #[test]
    fn test_transform_statements() {
        let proc_name: QualifiedName = "dwh.transform_sales".parse().unwrap();
        assert_eq!(call_procedure(&proc_name), "CALL dwh.transform_sales()");

        let fact: QualifiedName = "DWH.Fact_Sales".parse().unwrap();
        assert_eq!(count_rows(&fact), "SELECT COUNT(*) FROM \"DWH\".\"Fact_Sales\"");
    }

    #[test]
    fn test_audit_statements_bind_values() {
        let log: QualifiedName = "audit.pipeline_log".parse().unwrap();
        let start = audit_start(&log);
        assert!(start.starts_with("INSERT INTO audit.pipeline_log"));
        assert!(start.contains("VALUES ($1, $2, $3)"));
        assert!(start.contains("RETURNING"));

        assert!(audit_success(&log).contains("rows_processed = $3 WHERE log_id = $4"));
        assert!(audit_failure(&log).contains("error_message = $3 WHERE log_id = $4"));
        assert!(report_summary(&log).contains("make_interval(days => $1)"));
    }
}
