use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::export::{ExportFormat, ReportConfiguration};
use crate::retry::RetryConfig;

use super::ConfigError;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub powerbi: PowerBiConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Power BI tenant, app registration and report coordinates.
///
/// Identifier fields default to empty so that `validate_config` can report
/// every missing value at once instead of failing on the first one.
#[derive(Clone, Deserialize, Serialize)]
pub struct PowerBiConfig {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
    /// OAuth scope requested with the client-credentials grant.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Identity host; the tenant id is appended as the first path segment.
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    /// REST API base, e.g. `https://api.powerbi.com/v1.0/myorg`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub report_id: String,
    /// Per-request timeout in seconds (default: 100)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Reuse access tokens until shortly before they expire (default: true)
    #[serde(default = "default_true")]
    pub cache_tokens: bool,
}

impl PowerBiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for PowerBiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerBiConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("authority_host", &self.authority_host)
            .field("base_url", &self.base_url)
            .field("group_id", &self.group_id)
            .field("report_id", &self.report_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cache_tokens", &self.cache_tokens)
            .finish()
    }
}

fn default_scope() -> String {
    "https://analysis.windows.net/powerbi/api/.default".to_string()
}

fn default_authority_host() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_base_url() -> String {
    "https://api.powerbi.com/v1.0/myorg".to_string()
}

fn default_request_timeout() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

/// Export job configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Output format, case-insensitive (PDF, PPTX, PNG).
    #[serde(default = "default_format")]
    pub format: String,
    /// Seconds to wait between status polls (default: 5)
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    /// Give up on the job after this many minutes (default: 10)
    #[serde(default = "default_max_wait")]
    pub max_wait_minutes: u64,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    /// Filters, page selection and RLS identities sent with the export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_configuration: Option<ReportConfiguration>,
}

impl ExportConfig {
    /// Parse and normalize the configured format.
    pub fn export_format(&self) -> Result<ExportFormat, ConfigError> {
        ExportFormat::from_str(&self.format).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_minutes.saturating_mul(60))
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            polling_interval_secs: default_polling_interval(),
            max_wait_minutes: default_max_wait(),
            output_directory: default_output_directory(),
            report_configuration: None,
        }
    }
}

fn default_format() -> String {
    "PDF".to_string()
}

fn default_polling_interval() -> u64 {
    5
}

fn default_max_wait() -> u64 {
    10
}

fn default_output_directory() -> PathBuf {
    PathBuf::from("./exports")
}

/// Metrics output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Write the Prometheus text exposition here after each run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textfile_path: Option<PathBuf>,
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub powerbi: SanitizedPowerBiConfig,
    pub export: ExportConfig,
    pub retry: RetryConfig,
    pub metrics: MetricsConfig,
}

/// Power BI config with the client secret hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPowerBiConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret_configured: bool,
    pub scope: String,
    pub authority_host: String,
    pub base_url: String,
    pub group_id: String,
    pub report_id: String,
    pub request_timeout_secs: u64,
    pub cache_tokens: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let pbi = &config.powerbi;
        Self {
            powerbi: SanitizedPowerBiConfig {
                tenant_id: pbi.tenant_id.clone(),
                client_id: pbi.client_id.clone(),
                client_secret_configured: !pbi.client_secret.trim().is_empty(),
                scope: pbi.scope.clone(),
                authority_host: pbi.authority_host.clone(),
                base_url: pbi.base_url.clone(),
                group_id: pbi.group_id.clone(),
                report_id: pbi.report_id.clone(),
                request_timeout_secs: pbi.request_timeout_secs,
                cache_tokens: pbi.cache_tokens,
            },
            export: config.export.clone(),
            retry: config.retry.clone(),
            metrics: config.metrics.clone(),
        }
    }
}
