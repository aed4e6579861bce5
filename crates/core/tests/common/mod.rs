//! In-process fake of the identity provider and the Power BI export API.
//!
//! The fake binds to an ephemeral port on localhost, answers from scripted
//! responses and records every request it receives so tests can assert on
//! paths, headers and bodies.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use pbi_export_core::config::PowerBiConfig;
use pbi_export_core::load_config_from_str;

pub const TENANT: &str = "contoso-tenant";
pub const GROUP: &str = "group-1";
pub const REPORT: &str = "report-1";
pub const JOB_ID: &str = "job-1";

/// A request received by the fake.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: String,
}

/// A canned answer.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl Canned {
    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.into().into_bytes(),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.into().into_bytes(),
        }
    }

    pub fn binary(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/octet-stream",
            body: body.into(),
        }
    }

    /// Status document as returned by `GET .../exports/{id}`.
    pub fn export_status(status: &str, percent_complete: u32) -> Self {
        Self::json(
            StatusCode::OK,
            format!(
                r#"{{"id":"{}","status":"{}","percentComplete":{},"reportId":"{}"}}"#,
                JOB_ID, status, percent_complete, REPORT
            ),
        )
    }

    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

#[derive(Debug, Default)]
struct FakeState {
    requests: Vec<RecordedRequest>,
    token_responses: VecDeque<Canned>,
    tokens_issued: usize,
    submit_response: Option<Canned>,
    statuses: VecDeque<Canned>,
    last_status: Option<Canned>,
    file_response: Option<Canned>,
}

/// Fake identity provider plus export API.
pub struct FakePowerBi {
    addr: SocketAddr,
    state: Arc<Mutex<FakeState>>,
}

impl FakePowerBi {
    /// Start the fake on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(FakeState::default()));
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake server");
        let addr = listener.local_addr().expect("Failed to read local address");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Fake server crashed");
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Configuration pointing both endpoints at the fake.
    pub fn powerbi_config(&self, cache_tokens: bool) -> PowerBiConfig {
        let toml = format!(
            r#"
[powerbi]
tenant_id = "{tenant}"
client_id = "app-id"
client_secret = "app-secret"
group_id = "{group}"
report_id = "{report}"
authority_host = "{url}"
base_url = "{url}/v1.0/myorg"
request_timeout_secs = 5
cache_tokens = {cache_tokens}
"#,
            tenant = TENANT,
            group = GROUP,
            report = REPORT,
            url = self.url(),
            cache_tokens = cache_tokens,
        );
        load_config_from_str(&toml)
            .expect("Failed to build test config")
            .powerbi
    }

    /// Answer the next token request with `response` instead of a fresh token.
    pub fn push_token_response(&self, response: Canned) {
        self.lock().token_responses.push_back(response);
    }

    pub fn set_submit_response(&self, response: Canned) {
        self.lock().submit_response = Some(response);
    }

    /// Queue answers for status requests; the last one repeats once drained.
    pub fn script_statuses(&self, responses: impl IntoIterator<Item = Canned>) {
        self.lock().statuses.extend(responses);
    }

    pub fn set_file_response(&self, response: Canned) {
        self.lock().file_response = Some(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    /// Requests whose path ends with `suffix`.
    pub fn requests_ending_with(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }

    pub fn token_requests(&self) -> Vec<RecordedRequest> {
        self.requests_ending_with("/oauth2/v2.0/token")
    }

    pub fn status_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.contains("/exports/") && !r.path.ends_with("/file"))
            .collect()
    }

    pub fn file_requests(&self) -> Vec<RecordedRequest> {
        self.requests_ending_with("/file")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("Fake state poisoned")
    }
}

async fn handle(
    State(state): State<Arc<Mutex<FakeState>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut state = state.lock().expect("Fake state poisoned");
    state.requests.push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        authorization: header_value(header::AUTHORIZATION),
        content_type: header_value(header::CONTENT_TYPE),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let canned = if method == Method::POST && path.ends_with("/oauth2/v2.0/token") {
        match state.token_responses.pop_front() {
            Some(canned) => canned,
            None => {
                state.tokens_issued += 1;
                Canned::json(
                    StatusCode::OK,
                    format!(
                        r#"{{"token_type":"Bearer","expires_in":3599,"access_token":"fake-token-{}"}}"#,
                        state.tokens_issued
                    ),
                )
            }
        }
    } else if method == Method::POST && path.ends_with("/ExportTo") {
        state.submit_response.clone().unwrap_or_else(|| {
            Canned::json(
                StatusCode::ACCEPTED,
                format!(
                    r#"{{"id":"{}","status":"NotStarted","percentComplete":0}}"#,
                    JOB_ID
                ),
            )
        })
    } else if method == Method::GET && path.ends_with("/file") {
        state
            .file_response
            .clone()
            .unwrap_or_else(|| Canned::binary(b"%PDF-1.7 fake".to_vec()))
    } else if method == Method::GET && path.contains("/exports/") {
        match state.statuses.pop_front() {
            Some(canned) => {
                state.last_status = Some(canned.clone());
                canned
            }
            None => state
                .last_status
                .clone()
                .unwrap_or_else(|| Canned::export_status("Running", 0)),
        }
    } else {
        Canned::text(StatusCode::NOT_FOUND, "no route")
    };

    canned.into_response()
}
