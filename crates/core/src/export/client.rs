//! Power BI REST client for the export endpoints.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, error};

use crate::auth::Credential;
use crate::config::PowerBiConfig;

use super::error::{decode_error_response, ExportError};
use super::types::{ExportArtifact, ExportJob, ExportRequest, ExportStatus};

/// Remote export operations.
///
/// Each call carries its own credential so a single implementation can be
/// shared by concurrent runs.
#[async_trait]
pub trait ExportApi: Send + Sync {
    /// Start an export job.
    async fn submit(
        &self,
        credential: &Credential,
        request: &ExportRequest,
    ) -> Result<ExportJob, ExportError>;

    /// Fetch the current state of an export job.
    async fn get_status(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<ExportJob, ExportError>;

    /// Fetch the finished export file.
    async fn download(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<ExportArtifact, ExportError>;
}

/// The report an export runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    base_url: String,
    group_id: String,
    report_id: String,
}

impl ReportTarget {
    pub fn new(
        base_url: impl Into<String>,
        group_id: impl Into<String>,
        report_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            group_id: group_id.into(),
            report_id: report_id.into(),
        }
    }

    pub fn from_config(config: &PowerBiConfig) -> Self {
        Self::new(&config.base_url, &config.group_id, &config.report_id)
    }

    fn report_url(&self) -> String {
        format!(
            "{}/groups/{}/reports/{}",
            self.base_url,
            urlencoding::encode(&self.group_id),
            urlencoding::encode(&self.report_id)
        )
    }

    /// `POST` target that starts an export.
    pub fn export_to_url(&self) -> String {
        format!("{}/ExportTo", self.report_url())
    }

    /// `GET` target for the status of an export.
    pub fn export_url(&self, job_id: &str) -> String {
        format!("{}/exports/{}", self.report_url(), urlencoding::encode(job_id))
    }

    /// `GET` target for the exported file.
    pub fn file_url(&self, job_id: &str) -> String {
        format!("{}/file", self.export_url(job_id))
    }
}

/// reqwest-backed implementation of [`ExportApi`].
#[derive(Debug, Clone)]
pub struct PowerBiClient {
    client: Client,
    target: ReportTarget,
}

impl PowerBiClient {
    /// Create a client with its own connection pool.
    pub fn new(config: &PowerBiConfig) -> Result<Self, ExportError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ExportError::Unexpected(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, ReportTarget::from_config(config)))
    }

    /// Create a client on top of an existing connection pool.
    pub fn with_client(client: Client, target: ReportTarget) -> Self {
        Self { client, target }
    }

    /// Send an authorized request and turn non-2xx answers into errors.
    async fn send(
        &self,
        operation: &str,
        credential: &Credential,
        request: RequestBuilder,
    ) -> Result<Response, ExportError> {
        let response = request
            .bearer_auth(credential.access_token())
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    ExportError::Unexpected(e.to_string())
                } else {
                    ExportError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        error!(
            "Export {} request failed with status {}: {}",
            operation,
            status.as_u16(),
            body
        );
        Err(decode_error_response(status.as_u16(), &body))
    }

    async fn read_job(response: Response, what: &str) -> Result<ExportJob, ExportError> {
        let body = response
            .text()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| ExportError::Protocol(format!("unable to decode {} response: {}", what, e)))
    }

    /// Like `read_job`, but only the id matters right after submission: a
    /// missing or null status is taken as `NotStarted`.
    async fn read_submitted_job(response: Response) -> Result<ExportJob, ExportError> {
        let body = response
            .text()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        let decode_error = |e: serde_json::Error| {
            ExportError::Protocol(format!("unable to decode export response: {}", e))
        };

        let mut value: Value = serde_json::from_str(&body).map_err(decode_error)?;
        if let Some(fields) = value.as_object_mut() {
            if fields.get("status").map_or(true, Value::is_null) {
                fields.insert(
                    "status".to_string(),
                    Value::from(ExportStatus::NotStarted.as_str()),
                );
            }
        }
        serde_json::from_value(value).map_err(decode_error)
    }
}

#[async_trait]
impl ExportApi for PowerBiClient {
    async fn submit(
        &self,
        credential: &Credential,
        request: &ExportRequest,
    ) -> Result<ExportJob, ExportError> {
        let url = self.target.export_to_url();
        debug!("Sending export request to: {}", url);
        if let Ok(payload) = serde_json::to_string(request) {
            debug!("Request payload: {}", payload);
        }

        let response = self
            .send("submit", credential, self.client.post(&url).json(request))
            .await?;
        Self::read_submitted_job(response).await
    }

    async fn get_status(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<ExportJob, ExportError> {
        let url = self.target.export_url(job_id);
        debug!("Checking export status at: {}", url);

        let response = self
            .send("status", credential, self.client.get(&url))
            .await?;
        Self::read_job(response, "export status").await
    }

    async fn download(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<ExportArtifact, ExportError> {
        let url = self.target.file_url(job_id);
        debug!("Downloading file from: {}", url);

        let response = self
            .send("download", credential, self.client.get(&url))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExportError::Transport(e.to_string()))?;
        Ok(ExportArtifact::new(bytes))
    }
}
