//! Runner configuration.
//!
//! Settings come from an `elt.toml` file. Every section is optional and
//! falls back to the Northwind layout, so an empty file (or no file at all)
//! describes the stock pipeline.
//!
//! ```toml
//! [database]
//! url = "postgres://etl@localhost/northwind"
//!
//! [[sources]]
//! table = "public.orders"
//! staging = "stg_orders"
//!
//! [transform]
//! procedure = "dwh.transform_sales"
//! fact_table = "dwh.fact_sales"
//! ```

use crate::error::{EltError, EltResult};
use crate::sql::QualifiedName;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory and the user config dir.
pub const CONFIG_FILE: &str = "elt.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EltConfig {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub sources: Vec<SourceConfig>,
    pub staging: StagingConfig,
    pub transform: TransformConfig,
    pub audit: AuditConfig,
    pub report: ReportConfig,
}

impl Default for EltConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            pipeline: PipelineConfig::default(),
            sources: default_sources(),
            staging: StagingConfig::default(),
            transform: TransformConfig::default(),
            audit: AuditConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Name recorded in the pipeline log.
    pub name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "Northwind_Sales_ELT".to_string(),
        }
    }
}

/// One source table and the staging table it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub table: String,
    pub staging: String,
}

impl SourceConfig {
    fn new(table: &str, staging: &str) -> Self {
        Self {
            table: table.to_string(),
            staging: staging.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StagingConfig {
    pub schema: String,
    /// Upper bound on rows per INSERT statement.
    pub batch_size: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            schema: "staging".to_string(),
            batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    pub procedure: String,
    /// Counted after the procedure to report rows processed.
    pub fact_table: Option<String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            procedure: "dwh.transform_sales".to_string(),
            fact_table: Some("dwh.fact_sales".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub table: String,
    /// Audit every `run`, not just `run --audit`.
    pub enabled: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            table: "audit.pipeline_log".to_string(),
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub days: u32,
    pub output: PathBuf,
    pub title: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            days: 7,
            output: PathBuf::from("ELT_Report.md"),
            title: "Northwind ELT Performance Report".to_string(),
        }
    }
}

/// A source with its names parsed and the staging schema applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub source: QualifiedName,
    pub staging: QualifiedName,
}

impl EltConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `./elt.toml` is tried, then
    /// `<config dir>/elt/elt.toml`, then the built-in defaults.
    pub fn load(path: Option<&Path>) -> EltResult<Self> {
        let path = match path {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                return Err(EltError::Config(format!(
                    "config file {} not found",
                    p.display()
                )));
            }
            None => Self::discover(),
        };
        Self::load_found(path.as_deref())
    }

    /// Build from a config file already located, or from the defaults.
    fn load_found(path: Option<&Path>) -> EltResult<Self> {
        let config = match path {
            Some(p) => {
                tracing::debug!(path = %p.display(), "loading config");
                let content = std::fs::read_to_string(p)?;
                Self::from_toml(&content)?
            }
            None => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("elt").join(CONFIG_FILE))
            .filter(|p| p.exists())
    }

    /// Parse a TOML document, filling omitted sources with the defaults.
    pub fn from_toml(content: &str) -> EltResult<Self> {
        let mut config: Self = toml::from_str(content)?;
        if config.sources.is_empty() {
            config.sources = default_sources();
        }
        Ok(config)
    }

    /// Check names and limits before anything touches the database.
    pub fn validate(&self) -> EltResult<()> {
        if self.sources.is_empty() {
            return Err(EltError::Config("no [[sources]] configured".into()));
        }
        if self.staging.batch_size == 0 {
            return Err(EltError::Config("staging.batch_size must be at least 1".into()));
        }
        if self.report.days == 0 {
            return Err(EltError::Config("report.days must be at least 1".into()));
        }
        if self.database.max_connections == 0 {
            return Err(EltError::Config(
                "database.max_connections must be at least 1".into(),
            ));
        }
        if self.pipeline.name.trim().is_empty() {
            return Err(EltError::Config("pipeline.name must not be empty".into()));
        }

        let tables = self.source_tables()?;
        let mut seen = HashSet::new();
        for t in &tables {
            if !seen.insert(&t.staging) {
                return Err(EltError::Config(format!(
                    "staging table {} is used by more than one source",
                    t.staging
                )));
            }
        }

        self.procedure()?;
        self.fact_table()?;
        self.audit_table()?;
        Ok(())
    }

    /// Sources resolved against the staging schema.
    pub fn source_tables(&self) -> EltResult<Vec<SourceTable>> {
        self.sources
            .iter()
            .map(|s| {
                let staging: QualifiedName = s.staging.parse()?;
                if staging.schema.is_some() {
                    return Err(EltError::Config(format!(
                        "staging table '{}' must not name a schema; set staging.schema instead",
                        s.staging
                    )));
                }
                Ok(SourceTable {
                    source: s.table.parse()?,
                    staging: staging.in_schema(&self.staging.schema)?,
                })
            })
            .collect()
    }

    pub fn procedure(&self) -> EltResult<QualifiedName> {
        self.transform.procedure.parse()
    }

    pub fn fact_table(&self) -> EltResult<Option<QualifiedName>> {
        self.transform
            .fact_table
            .as_deref()
            .map(|t| t.parse::<QualifiedName>())
            .transpose()
    }

    pub fn audit_table(&self) -> EltResult<QualifiedName> {
        self.audit.table.parse()
    }

    /// Pick the connection URL: an explicit override (flag or
    /// `ELT_DATABASE_URL`) wins over `[database].url`.
    pub fn database_url(&self, override_url: Option<&str>) -> EltResult<String> {
        override_url
            .or(self.database.url.as_deref())
            .map(str::to_string)
            .ok_or_else(|| {
                EltError::Config(
                    "no database URL. Use --database-url, set ELT_DATABASE_URL, or add [database] url to elt.toml"
                        .into(),
                )
            })
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new("public.orders", "stg_orders"),
        SourceConfig::new("public.order_details", "stg_order_details"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EltConfig::from_toml("").unwrap();
        config.validate().unwrap();

        assert_eq!(config.pipeline.name, "Northwind_Sales_ELT");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.staging.batch_size, 1000);
        assert_eq!(config.report.days, 7);
        assert!(!config.audit.enabled);

        let tables = config.source_tables().unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].source.to_string(), "public.orders");
        assert_eq!(tables[0].staging.to_string(), "staging.stg_orders");
        assert_eq!(tables[1].staging.to_string(), "staging.stg_order_details");
        assert_eq!(
            config.fact_table().unwrap().map(|t| t.to_string()),
            Some("dwh.fact_sales".to_string())
        );
    }

    #[test]
    fn test_full_document() {
        let config = EltConfig::from_toml(
            r#"
            [database]
            url = "postgres://etl@localhost/northwind"
            max_connections = 2

            [pipeline]
            name = "Nightly"

            [[sources]]
            table = "dbo.Orders"
            staging = "stg_Orders"

            [[sources]]
            table = "dbo.Order Details"
            staging = "stg_OrderDetails"

            [staging]
            schema = "Staging"
            batch_size = 250

            [transform]
            procedure = "DWH.TransformSales"

            [audit]
            table = "Audit.PipelineLog"
            enabled = true
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.pipeline.name, "Nightly");
        assert!(config.audit.enabled);
        let tables = config.source_tables().unwrap();
        assert_eq!(tables[1].source.to_sql(), "dbo.\"Order Details\"");
        assert_eq!(tables[1].staging.to_sql(), "\"Staging\".\"stg_OrderDetails\"");
        assert_eq!(config.procedure().unwrap().to_sql(), "\"DWH\".\"TransformSales\"");
        // fact_table keeps its default when only the procedure is overridden
        assert!(config.fact_table().unwrap().is_some());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = EltConfig::from_toml("[staging]\nschmea = \"x\"\n").unwrap_err();
        assert!(matches!(err, EltError::ConfigParse(_)));
    }

    #[test]
    fn test_duplicate_staging_rejected() {
        let config = EltConfig::from_toml(
            r#"
            [[sources]]
            table = "public.orders"
            staging = "stg"

            [[sources]]
            table = "public.order_details"
            staging = "stg"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than one source"));
    }

    #[test]
    fn test_staging_with_schema_rejected() {
        let config = EltConfig::from_toml(
            "[[sources]]\ntable = \"public.orders\"\nstaging = \"other.stg_orders\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = EltConfig::from_toml("[staging]\nbatch_size = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = EltConfig::from_toml("[report]\ndays = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_precedence() {
        let config =
            EltConfig::from_toml("[database]\nurl = \"postgres://file/db\"\n").unwrap();
        assert_eq!(config.database_url(None).unwrap(), "postgres://file/db");
        assert_eq!(
            config.database_url(Some("postgres://flag/db")).unwrap(),
            "postgres://flag/db"
        );

        let bare = EltConfig::from_toml("").unwrap();
        assert!(matches!(bare.database_url(None), Err(EltError::Config(_))));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pipeline]\nname = \"FromFile\"").unwrap();

        let config = EltConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pipeline.name, "FromFile");
    }

    #[test]
    fn test_default_is_the_stock_pipeline() {
        let config = EltConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].table, "public.orders");
        assert_eq!(config.sources[1].staging, "stg_order_details");
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = EltConfig::load_found(None).unwrap();
        assert_eq!(config.pipeline.name, "Northwind_Sales_ELT");
        let tables = config.source_tables().unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].staging.to_string(), "staging.stg_orders");
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = EltConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, EltError::Config(_)));
    }
}
