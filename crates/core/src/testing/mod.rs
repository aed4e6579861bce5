//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the identity provider and the Power BI export
//! endpoints so the orchestrator can be exercised without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use pbi_export_core::testing::{MockExportApi, MockTokenProvider};
//!
//! let tokens = Arc::new(MockTokenProvider::new());
//! let api = Arc::new(MockExportApi::new());
//! api.script_statuses([ExportStatus::Running, ExportStatus::Succeeded]).await;
//!
//! let orchestrator = ExportOrchestrator::new(tokens, api, PollSettings::default());
//! ```

mod mock_export_api;
mod mock_token_provider;

pub use mock_export_api::{MockExportApi, RecordedCall};
pub use mock_token_provider::MockTokenProvider;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::export::{ExportJob, ExportStatus};

    /// Id handed out by a fresh `MockExportApi`.
    pub const DEFAULT_JOB_ID: &str = "mock-export-1";

    /// Create an export job in the given status.
    pub fn export_job(id: &str, status: ExportStatus) -> ExportJob {
        ExportJob {
            id: id.to_string(),
            created_date_time: Some(Utc::now()),
            last_action_date_time: Some(Utc::now()),
            report_id: Some("mock-report".to_string()),
            report_name: Some("Mock Report".to_string()),
            status,
            percent_complete: 0,
            resource_location: None,
            expiration_time: None,
        }
    }
}
