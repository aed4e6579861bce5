//! Wire types for the Power BI export API.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ============================================================================
// Request Types
// ============================================================================

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Pdf,
    Pptx,
    Png,
}

/// Returned when a format string is not one of the supported formats.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported export format '{0}'. Supported formats: PDF, PPTX, PNG")]
pub struct UnsupportedFormat(pub String);

impl ExportFormat {
    /// Wire representation (upper case).
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "PDF",
            ExportFormat::Pptx => "PPTX",
            ExportFormat::Png => "PNG",
        }
    }

    /// File extension for saved artifacts (lower case, no dot).
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Pptx => "pptx",
            ExportFormat::Png => "png",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PDF" => Ok(ExportFormat::Pdf),
            "PPTX" => Ok(ExportFormat::Pptx),
            "PNG" => Ok(ExportFormat::Png),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExportFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExportFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Body of the `ExportTo` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRequest {
    format: ExportFormat,
    #[serde(
        rename = "powerBIReportConfiguration",
        skip_serializing_if = "Option::is_none"
    )]
    report_configuration: Option<ReportConfiguration>,
}

impl ExportRequest {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            report_configuration: None,
        }
    }

    pub fn with_report_configuration(mut self, configuration: ReportConfiguration) -> Self {
        self.report_configuration = Some(configuration);
        self
    }

    pub fn format(&self) -> ExportFormat {
        self.format
    }

    pub fn report_configuration(&self) -> Option<&ReportConfiguration> {
        self.report_configuration.as_ref()
    }
}

/// Report-specific export settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfiguration {
    #[serde(
        default,
        alias = "report_level_filters",
        skip_serializing_if = "Option::is_none"
    )]
    pub report_level_filters: Option<Vec<ReportFilter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<ExportReportPage>>,
    /// Row-level-security identities to export as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<EffectiveIdentity>>,
}

/// A report-level filter expression, e.g. `Store/Territory eq 'NC'`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub filter: String,
}

/// A page (optionally a single visual on it) to include in the export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReportPage {
    #[serde(alias = "page_name")]
    pub page_name: String,
    #[serde(
        default,
        alias = "visual_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub visual_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<PageBookmark>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBookmark {
    pub name: String,
}

/// Effective identity used to apply row-level security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveIdentity {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasets: Option<Vec<String>>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Status of a server-side export job.
///
/// Decoding is case-insensitive; any other value is rejected so protocol
/// drift surfaces as an error instead of an endless poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::NotStarted => "NotStarted",
            ExportStatus::Running => "Running",
            ExportStatus::Succeeded => "Succeeded",
            ExportStatus::Failed => "Failed",
        }
    }

    /// No further state change happens after a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Succeeded | ExportStatus::Failed)
    }
}

impl FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notstarted" => Ok(ExportStatus::NotStarted),
            "running" => Ok(ExportStatus::Running),
            "succeeded" => Ok(ExportStatus::Succeeded),
            "failed" => Ok(ExportStatus::Failed),
            _ => Err(format!("unknown export status '{}'", s)),
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ExportStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ExportStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// Export job as returned by the submit and status calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Empty when the service did not return one.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub last_action_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub report_id: Option<String>,
    #[serde(default)]
    pub report_name: Option<String>,
    pub status: ExportStatus,
    #[serde(default)]
    pub percent_complete: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_location: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration_time: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Job timestamps are informational only: values without an offset
/// (e.g. the `0001-01-01T00:00:00` placeholder) are read as UTC and
/// anything unparseable becomes `None`.
fn lenient_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(parse_timestamp))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Downloaded export file. The payload is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    data: Bytes,
}

impl ExportArtifact {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorDetails {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ErrorDetail>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
