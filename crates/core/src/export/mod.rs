//! Report export: wire types, the REST client and the polling orchestrator.
//!
//! An export is asynchronous on the service side. [`ExportOrchestrator::run`]
//! submits the job, polls its status at a fixed interval until it is
//! terminal, and downloads the file once it succeeded.

mod client;
mod error;
mod orchestrator;
mod types;

pub use client::{ExportApi, PowerBiClient, ReportTarget};
pub use error::{decode_error_response, ExportError};
pub use orchestrator::{ExportOrchestrator, PollSettings};
pub use types::*;
