//! Export orchestration: submit, poll until terminal, download.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::auth::TokenProvider;
use crate::config::ExportConfig;
use crate::metrics::{
    record_api_request, ARTIFACT_BYTES, EXPORT_RUNS, EXPORT_RUN_DURATION, STATUS_POLLS,
};
use crate::retry::{with_retry, RetryConfig};

use super::client::ExportApi;
use super::error::ExportError;
use super::types::{ExportArtifact, ExportJob, ExportRequest, ExportStatus};

/// Timing of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Wait between consecutive status checks.
    pub polling_interval: Duration,
    /// Give up once this much time has passed since submission.
    pub max_wait: Duration,
}

impl PollSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            polling_interval: config.polling_interval(),
            max_wait: config.max_wait(),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// Drives one export job from submission to downloaded file.
///
/// A fresh credential is requested from the token provider before every
/// remote call. Runs share nothing but the provider and the API client, so
/// one orchestrator can serve several concurrent runs.
pub struct ExportOrchestrator {
    tokens: Arc<dyn TokenProvider>,
    api: Arc<dyn ExportApi>,
    settings: PollSettings,
    retry: RetryConfig,
}

impl ExportOrchestrator {
    /// Create an orchestrator that polls with `settings` and retries status
    /// checks with the default backoff.
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        api: Arc<dyn ExportApi>,
        settings: PollSettings,
    ) -> Self {
        Self {
            tokens,
            api,
            settings,
            retry: RetryConfig::default(),
        }
    }

    /// Set the backoff used for status checks.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Start an export and return its job id.
    pub async fn submit(&self, request: &ExportRequest) -> Result<String, ExportError> {
        info!("Starting {} export", request.format());

        let credential = self.tokens.acquire().await?;
        let result = self.api.submit(&credential, request).await;
        record_api_request("submit", &result);

        let job = result?;
        if job.id.trim().is_empty() {
            return Err(ExportError::Protocol("export id not returned".to_string()));
        }

        info!("Export started successfully with ID: {}", job.id);
        Ok(job.id)
    }

    /// Fetch the current state of a job.
    pub async fn get_status(&self, job_id: &str) -> Result<ExportJob, ExportError> {
        let credential = self.tokens.acquire().await?;
        STATUS_POLLS.inc();
        let result = self.api.get_status(&credential, job_id).await;
        record_api_request("status", &result);

        let job = result?;
        debug!(
            "Export {} status: {} ({}% complete)",
            job_id, job.status, job.percent_complete
        );
        Ok(job)
    }

    /// Fetch the finished file of a job.
    pub async fn download(&self, job_id: &str) -> Result<ExportArtifact, ExportError> {
        info!("Downloading export file for {}", job_id);

        let credential = self.tokens.acquire().await?;
        let result = self.api.download(&credential, job_id).await;
        record_api_request("download", &result);

        let artifact = result?;
        ARTIFACT_BYTES.observe(artifact.len() as f64);
        info!(
            "Successfully downloaded {} bytes for export {}",
            artifact.len(),
            job_id
        );
        Ok(artifact)
    }

    /// Export a report end to end.
    ///
    /// Submits the job, then repeatedly sleeps one polling interval and
    /// checks the status until the job is terminal. Fails with `Timeout` once
    /// more than `max_wait` has passed before a sleep, with `JobFailed` when
    /// the job ends in any status but `Succeeded`, and with `Cancelled` as
    /// soon as `cancel` fires while waiting.
    pub async fn run(
        &self,
        request: &ExportRequest,
        cancel: &CancellationToken,
    ) -> Result<ExportArtifact, ExportError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("export_run", %run_id, format = %request.format());
        let started = Instant::now();

        let result = self.run_to_completion(request, cancel).instrument(span).await;

        let outcome = match &result {
            Ok(_) => "succeeded",
            Err(e) => e.outcome_label(),
        };
        EXPORT_RUNS.with_label_values(&[outcome]).inc();
        EXPORT_RUN_DURATION
            .with_label_values(&[outcome])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    async fn run_to_completion(
        &self,
        request: &ExportRequest,
        cancel: &CancellationToken,
    ) -> Result<ExportArtifact, ExportError> {
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled { job_id: None });
        }

        // Not raced against cancellation: once the request is out the job
        // exists remotely and its id must be reported.
        let job_id = self.submit(request).await?;
        let job = self.wait_for_terminal(&job_id, cancel).await?;

        if job.status != ExportStatus::Succeeded {
            warn!("Export {} ended with status {}", job_id, job.status);
            return Err(ExportError::JobFailed {
                job_id,
                status: job.status,
            });
        }

        self.download(&job_id).await
    }

    async fn wait_for_terminal(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExportJob, ExportError> {
        let started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            if elapsed > self.settings.max_wait {
                warn!(
                    "Export {} still not finished after {}s, giving up",
                    job_id,
                    elapsed.as_secs()
                );
                return Err(ExportError::Timeout {
                    job_id: job_id.to_string(),
                    elapsed,
                    max_wait: self.settings.max_wait,
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(job_id)),
                _ = tokio::time::sleep(self.settings.polling_interval) => {}
            }

            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(job_id)),
                result = with_retry(&self.retry, "get_status", move || self.get_status(job_id)) => result?,
            };

            info!(
                "Export {} progress: {} ({}%)",
                job_id, job.status, job.percent_complete
            );

            if job.status.is_terminal() {
                return Ok(job);
            }
        }
    }
}

fn cancelled(job_id: &str) -> ExportError {
    info!("Export {} cancelled while polling", job_id);
    ExportError::Cancelled {
        job_id: Some(job_id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use crate::export::ExportFormat;
    use crate::testing::{fixtures, MockExportApi, MockTokenProvider, RecordedCall};

    struct Harness {
        tokens: Arc<MockTokenProvider>,
        api: Arc<MockExportApi>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                tokens: Arc::new(MockTokenProvider::new()),
                api: Arc::new(MockExportApi::new()),
            }
        }

        fn orchestrator(&self, settings: PollSettings) -> ExportOrchestrator {
            ExportOrchestrator::new(
                Arc::clone(&self.tokens) as Arc<dyn TokenProvider>,
                Arc::clone(&self.api) as Arc<dyn ExportApi>,
                settings,
            )
            .with_retry(RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 100,
                max_delay_ms: 1000,
                backoff_multiplier: 2.0,
                jitter: false,
            })
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            polling_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
        }
    }

    fn pdf_request() -> ExportRequest {
        ExportRequest::new(ExportFormat::Pdf)
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_then_succeeded_downloads_artifact() {
        let harness = Harness::new();
        harness
            .api
            .script_statuses([
                ExportStatus::NotStarted,
                ExportStatus::Running,
                ExportStatus::Running,
                ExportStatus::Succeeded,
            ])
            .await;
        harness.api.set_artifact(b"%PDF-1.7 fake".to_vec()).await;

        let artifact = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(artifact.as_bytes(), b"%PDF-1.7 fake");
        assert_eq!(harness.api.submit_count().await, 1);
        assert_eq!(harness.api.status_count().await, 4);
        assert_eq!(harness.api.download_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_happens_after_one_interval() {
        let harness = Harness::new();
        harness.api.script_statuses([ExportStatus::Succeeded]).await;

        let started = Instant::now();
        harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(harness.api.status_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_poll_after_terminal_status() {
        let harness = Harness::new();
        harness
            .api
            .script_statuses([
                ExportStatus::Running,
                ExportStatus::Succeeded,
                ExportStatus::Running,
            ])
            .await;

        harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await
            .unwrap();

        let calls = harness.api.calls().await;
        let last_status = calls
            .iter()
            .rposition(|c| matches!(c, RecordedCall::GetStatus { .. }))
            .unwrap();
        let download = calls
            .iter()
            .position(|c| matches!(c, RecordedCall::Download { .. }))
            .unwrap();
        assert_eq!(harness.api.status_count().await, 2);
        assert!(last_status < download);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_finishing_job_times_out_without_download() {
        let harness = Harness::new();
        harness.api.script_statuses([ExportStatus::Running]).await;

        let result = harness
            .orchestrator(PollSettings {
                polling_interval: Duration::from_secs(5),
                max_wait: Duration::from_secs(20),
            })
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        match result {
            Err(ExportError::Timeout {
                job_id,
                elapsed,
                max_wait,
            }) => {
                assert_eq!(job_id, fixtures::DEFAULT_JOB_ID);
                assert_eq!(max_wait, Duration::from_secs(20));
                assert!(elapsed > max_wait);
                assert!(elapsed <= max_wait + Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(harness.api.download_count().await, 0);
        assert_eq!(harness.api.status_count().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_raises_job_failed_without_download() {
        let harness = Harness::new();
        harness.api.script_statuses([ExportStatus::Failed]).await;

        let result = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(ExportError::JobFailed { ref job_id, status: ExportStatus::Failed })
                if job_id == fixtures::DEFAULT_JOB_ID
        ));
        assert_eq!(harness.api.status_count().await, 1);
        assert_eq!(harness.api.download_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_job_id_is_protocol_error() {
        let harness = Harness::new();
        harness.api.set_job_id("").await;

        let result = harness.orchestrator(settings()).submit(&pdf_request()).await;

        assert!(matches!(result, Err(ExportError::Protocol(ref m)) if m == "export id not returned"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_error_is_propagated_and_nothing_polled() {
        let harness = Harness::new();
        harness
            .api
            .set_submit_error(ExportError::RequestFailed {
                status: 400,
                code: Some("X".to_string()),
                message: "Y".to_string(),
                details: vec![],
            })
            .await;

        let result = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(ExportError::RequestFailed { ref code, ref message, .. })
                if code.as_deref() == Some("X") && message == "Y"
        ));
        assert_eq!(harness.api.status_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_acquired_before_every_call() {
        let harness = Harness::new();
        harness
            .api
            .script_statuses([ExportStatus::Running, ExportStatus::Succeeded])
            .await;

        harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await
            .unwrap();

        // submit + 2 polls + download
        assert_eq!(harness.tokens.acquire_count(), 4);
        let tokens: Vec<String> = harness
            .api
            .calls()
            .await
            .iter()
            .map(|c| c.token().to_string())
            .collect();
        assert_eq!(
            tokens,
            vec!["mock-token-1", "mock-token-2", "mock-token-3", "mock-token-4"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_failure_stops_run() {
        let harness = Harness::new();
        harness
            .tokens
            .set_next_error(AuthError::Authentication("invalid_client".to_string()))
            .await;

        let result = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ExportError::Authentication(_))));
        assert_eq!(harness.api.submit_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_failure_is_retried() {
        let harness = Harness::new();
        harness
            .api
            .script_status_results([
                Err(ExportError::Transport("connection reset".to_string())),
                Ok(ExportStatus::Running),
                Err(ExportError::Transport("connection reset".to_string())),
                Ok(ExportStatus::Succeeded),
            ])
            .await;

        let artifact = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(artifact.is_ok());
        assert_eq!(harness.api.status_count().await, 4);
        assert_eq!(harness.api.download_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_exhaust_retries() {
        let harness = Harness::new();
        harness
            .api
            .script_status_results([
                Err(ExportError::Transport("reset".to_string())),
                Err(ExportError::Transport("reset".to_string())),
                Err(ExportError::Transport("reset".to_string())),
                Ok(ExportStatus::Succeeded),
            ])
            .await;

        let result = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ExportError::Transport(_))));
        assert_eq!(harness.api.status_count().await, 3);
        assert_eq!(harness.api.download_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_failure_on_status_is_not_retried() {
        let harness = Harness::new();
        harness
            .api
            .script_status_results([
                Err(ExportError::RequestFailed {
                    status: 404,
                    code: Some("ExportNotFound".to_string()),
                    message: "not found".to_string(),
                    details: vec![],
                }),
                Ok(ExportStatus::Succeeded),
            ])
            .await;

        let result = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ExportError::RequestFailed { status: 404, .. })));
        assert_eq!(harness.api.status_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_submit() {
        let harness = Harness::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = harness.orchestrator(settings()).run(&pdf_request(), &cancel).await;

        assert!(matches!(result, Err(ExportError::Cancelled { job_id: None })));
        assert_eq!(harness.api.submit_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_polling() {
        let harness = Harness::new();
        harness.api.script_statuses([ExportStatus::Running]).await;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let result = harness.orchestrator(settings()).run(&pdf_request(), &cancel).await;

        assert!(matches!(
            result,
            Err(ExportError::Cancelled { job_id: Some(ref id) }) if id == fixtures::DEFAULT_JOB_ID
        ));
        assert_eq!(harness.api.status_count().await, 2);
        assert_eq!(harness.api.download_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_error_is_propagated() {
        let harness = Harness::new();
        harness.api.script_statuses([ExportStatus::Succeeded]).await;
        harness
            .api
            .set_download_error(ExportError::RequestFailed {
                status: 500,
                code: None,
                message: "plain text".to_string(),
                details: vec![],
            })
            .await;

        let result = harness
            .orchestrator(settings())
            .run(&pdf_request(), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(ExportError::RequestFailed { ref message, .. }) if message == "plain text"
        ));
        assert_eq!(harness.api.download_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_runs_do_not_interfere() {
        let first = Harness::new();
        first
            .api
            .script_statuses([ExportStatus::Running, ExportStatus::Succeeded])
            .await;
        first.api.set_artifact(b"first".to_vec()).await;

        let second = Harness::new();
        second.api.script_statuses([ExportStatus::Failed]).await;

        let a = first.orchestrator(settings());
        let b = second.orchestrator(settings());
        let cancel = CancellationToken::new();
        let request = pdf_request();

        let (ra, rb) = tokio::join!(a.run(&request, &cancel), b.run(&request, &cancel));

        assert_eq!(ra.unwrap().as_bytes(), b"first");
        assert!(matches!(rb, Err(ExportError::JobFailed { .. })));
    }

    #[test]
    fn test_poll_settings_from_config() {
        let config = ExportConfig {
            polling_interval_secs: 2,
            max_wait_minutes: 3,
            ..Default::default()
        };
        let settings = PollSettings::from_config(&config);
        assert_eq!(settings.polling_interval, Duration::from_secs(2));
        assert_eq!(settings.max_wait, Duration::from_secs(180));
    }
}
