//! Configuration management
//!
//! Settings come from an optional YAML file, then `.env`, then `FEEDSYNC_*`
//! environment variables. Anything unset keeps its default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::{ApiClient, Credentials, HttpOptions, DEFAULT_API_URL, DEFAULT_SHEQSY_URL, DEFAULT_TIMEOUT_SECS};
use crate::error::{Result, SyncError};
use crate::exporter::{Dialect, SqlConfig};
use crate::feed::{FeedOptions, DEFAULT_INSPECTION_LIMIT, MAX_FEED_LIMIT};
use crate::orchestrator::{SheqsyScope, DEFAULT_POOL_SIZE};
use crate::report::{poll_wait, FilenameConvention, ReportConfig, ReportFormat, DEFAULT_CONCURRENCY, DEFAULT_MAX_TRIES, DEFAULT_RETRY_TIMEOUT};
use crate::transport::RetryPolicy;
use feedsync_common::timestamp;

// ============================================================================
// Configuration Defaults
// ============================================================================

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "feedsync.yaml";

/// Default export directory for CSV files, reports and the staging database.
pub const DEFAULT_EXPORT_PATH: &str = "./export/";

/// SQLite file under the export path used when no connection string is set.
pub const DEFAULT_SQLITE_FILE: &str = "feedsync.db";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "FEEDSYNC_";

/// Full configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access_token: String,
    pub sheqsy_username: String,
    pub sheqsy_password: String,
    pub sheqsy_company_id: String,
    pub api: ApiSection,
    pub db: DbSection,
    pub csv: CsvSection,
    pub export: ExportSection,
    pub inspection: InspectionSection,
    pub actions: LimitSection,
    pub issues: LimitSection,
    pub assets: LimitSection,
    pub sites: SitesSection,
    pub report: ReportSection,
}

/// HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub url: String,
    pub sheqsy_url: String,
    pub proxy_url: String,
    pub tls_skip_verify: bool,
    pub tls_cert: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            sheqsy_url: DEFAULT_SHEQSY_URL.to_string(),
            proxy_url: String::new(),
            tls_skip_verify: false,
            tls_cert: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: RetryPolicy::default().max_attempts,
        }
    }
}

/// Relational destination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSection {
    pub dialect: String,
    pub connection_string: String,
    pub auto_migrate: bool,
    /// Overrides the dialect's parameter limit when set
    pub parameter_limit: Option<usize>,
    pub max_connections: u32,
}

impl Default for DbSection {
    fn default() -> Self {
        Self {
            dialect: "sqlite".to_string(),
            connection_string: String::new(),
            auto_migrate: true,
            parameter_limit: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSection {
    pub max_rows_per_file: usize,
}

impl Default for CsvSection {
    fn default() -> Self {
        Self {
            max_rows_per_file: crate::exporter::csv::DEFAULT_MAX_ROWS_PER_FILE,
        }
    }
}

/// Run-wide export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub path: PathBuf,
    pub incremental: bool,
    /// `YYYY-MM-DD` or RFC 3339; empty means no floor
    pub modified_after: String,
    /// Feeds to run; empty means all
    pub tables: Vec<String>,
    pub pool_size: usize,
    /// Download inspection item media
    pub media: bool,
    /// Empty means `media` under the export path
    pub media_path: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_EXPORT_PATH),
            incremental: true,
            modified_after: String::new(),
            tables: Vec::new(),
            pool_size: DEFAULT_POOL_SIZE,
            media: false,
            media_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectionSection {
    pub template_ids: Vec<String>,
    pub archived: String,
    pub completed: String,
    pub limit: u32,
    pub web_report_link: String,
    pub skip_ids: Vec<String>,
    pub include_inactive: bool,
}

impl Default for InspectionSection {
    fn default() -> Self {
        Self {
            template_ids: Vec::new(),
            archived: "false".to_string(),
            completed: "true".to_string(),
            limit: DEFAULT_INSPECTION_LIMIT,
            web_report_link: "private".to_string(),
            skip_ids: Vec::new(),
            include_inactive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSection {
    pub limit: u32,
}

impl Default for LimitSection {
    fn default() -> Self {
        Self {
            limit: MAX_FEED_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesSection {
    pub include_deleted: bool,
    /// Export every level of the site tree, not only the leaves
    pub include_full_hierarchy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    pub format: Vec<String>,
    pub preference_id: String,
    pub filename_convention: FilenameConvention,
    /// Seconds; sets the wait between status checks
    pub retry_timeout: u64,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            format: vec!["PDF".to_string()],
            preference_id: String::new(),
            filename_convention: FilenameConvention::InspectionTitle,
            retry_timeout: DEFAULT_RETRY_TIMEOUT,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl Config {
    /// Load from `path` (or [`DEFAULT_CONFIG_FILE`]) and the environment.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_yaml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            },
            Err(e) => return Err(e.into()),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.apply_guards();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| SyncError::config(format!("invalid config file: {}", e)))
    }

    /// Apply `FEEDSYNC_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(format!("{}{}", ENV_PREFIX, name).as_str()).and_then(|v| non_empty(&v));

        if let Some(v) = var("ACCESS_TOKEN") {
            self.access_token = v;
        }
        if let Some(v) = var("API_URL") {
            self.api.url = v;
        }
        if let Some(v) = var("DB_DIALECT") {
            self.db.dialect = v;
        }
        if let Some(v) = var("DB_CONNECTION_STRING") {
            self.db.connection_string = v;
        }
        if let Some(v) = var("EXPORT_PATH") {
            self.export.path = PathBuf::from(v);
        }
        if let Some(v) = var("SHEQSY_USERNAME") {
            self.sheqsy_username = v;
        }
        if let Some(v) = var("SHEQSY_PASSWORD") {
            self.sheqsy_password = v;
        }
        if let Some(v) = var("SHEQSY_COMPANY_ID") {
            self.sheqsy_company_id = v;
        }
    }

    /// Clamp page limits the API rejects above 100
    pub fn apply_guards(&mut self) {
        for (feed, section) in [("actions", &mut self.actions), ("issues", &mut self.issues)] {
            if section.limit > MAX_FEED_LIMIT {
                warn!(feed, configured = section.limit, max = MAX_FEED_LIMIT, "page limit clamped");
                section.limit = MAX_FEED_LIMIT;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.csv.max_rows_per_file == 0 {
            return Err(SyncError::config("csv.max_rows_per_file must be greater than 0"));
        }
        if self.export.pool_size == 0 {
            return Err(SyncError::config("export.pool_size must be greater than 0"));
        }
        self.dialect()?;
        self.modified_after()?;
        self.report_formats()?;
        Ok(())
    }

    pub fn dialect(&self) -> Result<Dialect> {
        self.db.dialect.parse()
    }

    pub fn modified_after(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        match non_empty(&self.export.modified_after) {
            Some(value) => timestamp::parse(&value).map(Some).map_err(|_| {
                SyncError::config(format!(
                    "export.modified_after '{}' is not YYYY-MM-DD or RFC 3339",
                    value
                ))
            }),
            None => Ok(None),
        }
    }

    pub fn report_formats(&self) -> Result<Vec<ReportFormat>> {
        self.report.format.iter().map(|f| f.parse()).collect()
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            timeout: Duration::from_secs(self.api.timeout_secs),
            proxy_url: non_empty(&self.api.proxy_url),
            tls_skip_verify: self.api.tls_skip_verify,
            tls_cert: non_empty(&self.api.tls_cert).map(PathBuf::from),
            retry: RetryPolicy {
                max_attempts: self.api.max_attempts,
                ..RetryPolicy::default()
            },
        }
    }

    /// Client for the primary API, if a token is configured
    pub fn api_client(&self) -> Result<Option<ApiClient>> {
        match non_empty(&self.access_token) {
            Some(token) => Ok(Some(ApiClient::new(
                &self.api.url,
                Credentials::Bearer(token),
                &self.http_options(),
            )?)),
            None => Ok(None),
        }
    }

    /// SHEQSY scope, if username, password and company are all configured
    pub fn sheqsy_scope(&self) -> Result<Option<SheqsyScope>> {
        let (Some(username), Some(password), Some(company_id)) = (
            non_empty(&self.sheqsy_username),
            non_empty(&self.sheqsy_password),
            non_empty(&self.sheqsy_company_id),
        ) else {
            return Ok(None);
        };

        let client = ApiClient::new(
            &self.api.sheqsy_url,
            Credentials::Basic { username, password },
            &self.http_options(),
        )?;
        Ok(Some(SheqsyScope { client, company_id }))
    }

    pub fn feed_options(&self) -> Result<FeedOptions> {
        Ok(FeedOptions {
            incremental: self.export.incremental,
            modified_after: self.modified_after()?,
            template_ids: self.inspection.template_ids.clone(),
            archived: self.inspection.archived.clone(),
            completed: self.inspection.completed.clone(),
            inspection_limit: self.inspection.limit,
            action_limit: self.actions.limit,
            issue_limit: self.issues.limit,
            asset_limit: self.assets.limit,
            web_report_link: self.inspection.web_report_link.clone(),
            skip_ids: self.inspection.skip_ids.clone(),
            include_deleted: self.sites.include_deleted,
            show_only_leaf_nodes: !self.sites.include_full_hierarchy,
            include_inactive: self.inspection.include_inactive,
            export_media: self.export.media,
            media_path: self.media_path(),
        })
    }

    pub fn media_path(&self) -> PathBuf {
        non_empty(&self.export.media_path)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.export.path.join("media"))
    }

    pub fn sql_config(&self) -> Result<SqlConfig> {
        let dialect = self.dialect()?;
        let mut config = match non_empty(&self.db.connection_string) {
            Some(connection_string) => SqlConfig::new(dialect, connection_string),
            None if dialect == Dialect::Sqlite => {
                SqlConfig::sqlite_file(&self.export.path.join(DEFAULT_SQLITE_FILE))
            },
            None => {
                return Err(SyncError::config(format!(
                    "db.connection_string is required for {}",
                    dialect
                )))
            },
        };
        config.auto_migrate = self.db.auto_migrate;
        config.parameter_limit = self.db.parameter_limit;
        config.max_connections = self.db.max_connections;
        Ok(config)
    }

    pub fn report_config(&self) -> Result<ReportConfig> {
        Ok(ReportConfig {
            formats: self.report_formats()?,
            preference_id: non_empty(&self.report.preference_id),
            filename_convention: self.report.filename_convention,
            poll_interval: poll_wait(self.report.retry_timeout),
            max_tries: DEFAULT_MAX_TRIES,
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: self.export.path.join("reports"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.url, "https://api.safetyculture.io");
        assert_eq!(config.api.sheqsy_url, "https://app.sheqsy.com");
        assert_eq!(config.dialect().unwrap(), Dialect::Sqlite);
        assert_eq!(config.csv.max_rows_per_file, 1_000_000);
        assert_eq!(config.export.path, PathBuf::from("./export/"));
        assert!(config.export.incremental);
        assert_eq!(config.inspection.limit, 100);
        assert_eq!(config.inspection.archived, "false");
        assert_eq!(config.inspection.completed, "true");
        assert_eq!(config.inspection.web_report_link, "private");
        assert_eq!(config.report_formats().unwrap(), vec![ReportFormat::Pdf]);
        assert_eq!(config.report.filename_convention, FilenameConvention::InspectionTitle);
        assert_eq!(config.report.retry_timeout, 15);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
access_token: abc
db:
  dialect: postgres
  connection_string: postgres://localhost/feeds
inspection:
  skip_ids: [audit_1]
report:
  format: [PDF, WORD]
  filename_convention: INSPECTION_ID
"#,
        )
        .unwrap();

        assert_eq!(config.access_token, "abc");
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
        assert!(config.db.auto_migrate);
        assert_eq!(config.inspection.limit, 100);
        assert_eq!(config.inspection.skip_ids, vec!["audit_1"]);
        assert_eq!(config.report.filename_convention, FilenameConvention::InspectionId);
        assert_eq!(
            config.report_formats().unwrap(),
            vec![ReportFormat::Pdf, ReportFormat::Word]
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FEEDSYNC_ACCESS_TOKEN", "from-env"),
            ("FEEDSYNC_DB_DIALECT", "mysql"),
            ("FEEDSYNC_EXPORT_PATH", "/data/out"),
            ("FEEDSYNC_SHEQSY_USERNAME", ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config {
            sheqsy_username: "kept".to_string(),
            ..Config::default()
        };
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.access_token, "from-env");
        assert_eq!(config.dialect().unwrap(), Dialect::Mysql);
        assert_eq!(config.export.path, PathBuf::from("/data/out"));
        assert_eq!(config.sheqsy_username, "kept");
    }

    #[test]
    fn test_guards_clamp_limits() {
        let mut config = Config::from_yaml("actions:\n  limit: 500\nissues:\n  limit: 20\n").unwrap();
        config.apply_guards();
        assert_eq!(config.actions.limit, 100);
        assert_eq!(config.issues.limit, 20);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = |yaml: &str| Config::from_yaml(yaml).unwrap().validate().unwrap_err();

        assert!(bad("csv:\n  max_rows_per_file: 0\n").to_string().contains("max_rows_per_file"));
        assert!(bad("export:\n  pool_size: 0\n").to_string().contains("pool_size"));
        assert!(bad("export:\n  modified_after: last week\n").to_string().contains("modified_after"));
        assert!(bad("db:\n  dialect: sqlserver\n").to_string().contains("sqlserver"));
        assert!(bad("db:\n  dialect: oracle\n").to_string().contains("oracle"));
        assert!(bad("report:\n  format: [XLS]\n").to_string().contains("XLS"));
    }

    #[test]
    fn test_modified_after_formats() {
        let config = Config::from_yaml("export:\n  modified_after: 2024-01-31\n").unwrap();
        let floor = config.modified_after().unwrap().unwrap();
        assert_eq!(floor.to_rfc3339(), "2024-01-31T00:00:00+00:00");

        let config = Config::from_yaml("export:\n  modified_after: \"2024-01-31T10:00:00Z\"\n").unwrap();
        assert!(config.modified_after().unwrap().is_some());
    }

    #[test]
    fn test_sql_config_defaults_to_sqlite_under_export_path() {
        let config = Config::from_yaml("export:\n  path: /data/out\n").unwrap();
        let sql = config.sql_config().unwrap();
        assert_eq!(sql.dialect, Dialect::Sqlite);
        assert_eq!(sql.connection_string, "sqlite:///data/out/feedsync.db?mode=rwc");

        let config = Config::from_yaml("db:\n  dialect: postgres\n").unwrap();
        assert!(config.sql_config().is_err());
    }

    #[test]
    fn test_media_and_feed_flags() {
        let config = Config::default();
        let options = config.feed_options().unwrap();
        assert!(!options.export_media);
        assert!(!options.include_inactive);
        assert_eq!(options.media_path, PathBuf::from("./export/media"));
        assert_eq!(options.asset_limit, 100);
        assert!(options.show_only_leaf_nodes);

        let config = Config::from_yaml(
            r#"
export:
  path: /data/out
  media: true
inspection:
  include_inactive: true
assets:
  limit: 25
sites:
  include_full_hierarchy: true
"#,
        )
        .unwrap();
        let options = config.feed_options().unwrap();
        assert!(options.export_media);
        assert!(options.include_inactive);
        assert_eq!(options.media_path, PathBuf::from("/data/out/media"));
        assert_eq!(options.asset_limit, 25);
        assert!(!options.show_only_leaf_nodes);

        let config = Config::from_yaml("export:\n  media_path: /srv/media\n").unwrap();
        assert_eq!(config.media_path(), PathBuf::from("/srv/media"));
    }

    #[test]
    fn test_scopes_need_credentials() {
        let config = Config::default();
        assert!(config.api_client().unwrap().is_none());
        assert!(config.sheqsy_scope().unwrap().is_none());

        let config = Config {
            sheqsy_username: "user".to_string(),
            sheqsy_password: "secret".to_string(),
            sheqsy_company_id: "company".to_string(),
            ..Config::default()
        };
        assert_eq!(config.sheqsy_scope().unwrap().unwrap().company_id, "company");
    }
}
