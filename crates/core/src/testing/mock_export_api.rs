//! Mock export API for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::auth::Credential;
use crate::export::{ExportApi, ExportArtifact, ExportError, ExportJob, ExportRequest, ExportStatus};

use super::fixtures;

/// A call made against the mock, with the token it carried.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Submit {
        token: String,
        request: ExportRequest,
    },
    GetStatus {
        token: String,
        job_id: String,
    },
    Download {
        token: String,
        job_id: String,
    },
}

impl RecordedCall {
    /// Bearer token sent with the call.
    pub fn token(&self) -> &str {
        match self {
            RecordedCall::Submit { token, .. }
            | RecordedCall::GetStatus { token, .. }
            | RecordedCall::Download { token, .. } => token,
        }
    }
}

/// Mock implementation of the ExportApi trait.
///
/// Status checks are answered from a script. Once the script runs dry the
/// last status served keeps being returned, `Running` if none was.
///
/// # Example
///
/// ```rust,ignore
/// let api = MockExportApi::new();
/// api.script_statuses([ExportStatus::Running, ExportStatus::Succeeded]).await;
/// api.set_artifact(b"%PDF".to_vec()).await;
///
/// // run an orchestrator against it...
///
/// assert_eq!(api.status_count().await, 2);
/// ```
#[derive(Debug)]
pub struct MockExportApi {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    /// Job returned by `submit`.
    submit_job: Arc<RwLock<ExportJob>>,
    submit_error: Arc<RwLock<Option<ExportError>>>,
    statuses: Arc<RwLock<VecDeque<Result<ExportStatus, ExportError>>>>,
    last_status: Arc<RwLock<ExportStatus>>,
    artifact: Arc<RwLock<Vec<u8>>>,
    download_error: Arc<RwLock<Option<ExportError>>>,
}

impl Default for MockExportApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExportApi {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            submit_job: Arc::new(RwLock::new(fixtures::export_job(
                fixtures::DEFAULT_JOB_ID,
                ExportStatus::NotStarted,
            ))),
            submit_error: Arc::new(RwLock::new(None)),
            statuses: Arc::new(RwLock::new(VecDeque::new())),
            last_status: Arc::new(RwLock::new(ExportStatus::Running)),
            artifact: Arc::new(RwLock::new(b"mock export".to_vec())),
            download_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue statuses for successive status checks.
    pub async fn script_statuses(&self, statuses: impl IntoIterator<Item = ExportStatus>) {
        self.script_status_results(statuses.into_iter().map(Ok)).await;
    }

    /// Queue statuses and failures for successive status checks.
    pub async fn script_status_results(
        &self,
        results: impl IntoIterator<Item = Result<ExportStatus, ExportError>>,
    ) {
        self.statuses.write().await.extend(results);
    }

    /// Change the id handed out by `submit`.
    pub async fn set_job_id(&self, job_id: &str) {
        self.submit_job.write().await.id = job_id.to_string();
    }

    pub async fn set_submit_error(&self, error: ExportError) {
        *self.submit_error.write().await = Some(error);
    }

    pub async fn set_artifact(&self, data: Vec<u8>) {
        *self.artifact.write().await = data;
    }

    pub async fn set_download_error(&self, error: ExportError) {
        *self.download_error.write().await = Some(error);
    }

    /// All calls in the order they were made.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    pub async fn submit_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Submit { .. })).await
    }

    pub async fn status_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::GetStatus { .. })).await
    }

    pub async fn download_count(&self) -> usize {
        self.count(|c| matches!(c, RecordedCall::Download { .. })).await
    }

    async fn count(&self, pred: impl Fn(&RecordedCall) -> bool) -> usize {
        self.calls.read().await.iter().filter(|c| pred(c)).count()
    }

    async fn record(&self, call: RecordedCall) {
        self.calls.write().await.push(call);
    }
}

#[async_trait]
impl ExportApi for MockExportApi {
    async fn submit(
        &self,
        credential: &Credential,
        request: &ExportRequest,
    ) -> Result<ExportJob, ExportError> {
        self.record(RecordedCall::Submit {
            token: credential.access_token().to_string(),
            request: request.clone(),
        })
        .await;

        if let Some(error) = self.submit_error.write().await.take() {
            return Err(error);
        }
        Ok(self.submit_job.read().await.clone())
    }

    async fn get_status(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<ExportJob, ExportError> {
        self.record(RecordedCall::GetStatus {
            token: credential.access_token().to_string(),
            job_id: job_id.to_string(),
        })
        .await;

        let next = self.statuses.write().await.pop_front();
        let status = match next {
            Some(Ok(status)) => {
                *self.last_status.write().await = status;
                status
            }
            Some(Err(error)) => return Err(error),
            None => *self.last_status.read().await,
        };

        let mut job = fixtures::export_job(job_id, status);
        job.percent_complete = match status {
            ExportStatus::NotStarted => 0,
            ExportStatus::Running => 50,
            ExportStatus::Succeeded | ExportStatus::Failed => 100,
        };
        Ok(job)
    }

    async fn download(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<ExportArtifact, ExportError> {
        self.record(RecordedCall::Download {
            token: credential.access_token().to_string(),
            job_id: job_id.to_string(),
        })
        .await;

        if let Some(error) = self.download_error.write().await.take() {
            return Err(error);
        }
        Ok(ExportArtifact::new(self.artifact.read().await.clone()))
    }
}
