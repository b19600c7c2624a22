//! Supabase HTTP implementations of the backend contracts.
//!
//! # Responsibility
//! - Share one `reqwest::Client`, base URL and access-token slot across the
//!   auth, record and storage adapters.
//! - Map HTTP status codes and error bodies onto `BackendError`.
//!
//! # Invariants
//! - Every request carries the `apikey` header.
//! - Record/storage requests authorize with the signed-in access token when
//!   one is held, otherwise with the anon key.

use crate::backend::{BackendError, BackendResult};
use crate::config::BackendConfig;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use url::Url;

mod auth;
mod records;
mod session_file;
mod storage;

pub use auth::SupabaseAuth;
pub use records::SupabaseRecords;
pub use session_file::SessionFile;
pub use storage::SupabaseStorage;

/// Shared HTTP handle for all Supabase adapters.
#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: Url,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl SupabaseClient {
    pub fn new(config: &BackendConfig) -> Self {
        Self::with_http(config, reqwest::Client::new())
    }

    pub fn with_http(config: &BackendConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            anon_key: config.anon_key.clone(),
            access_token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> BackendResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| BackendError::InvalidResponse(format!("bad endpoint `{path}`: {err}")))
    }

    pub(crate) fn set_access_token(&self, token: Option<String>) {
        match self.access_token.write() {
            Ok(mut slot) => *slot = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn bearer(&self) -> String {
        let held = match self.access_token.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        held.unwrap_or_else(|| self.anon_key.clone())
    }

    /// Request authorized with the current bearer (session token or anon key).
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.bearer();
        self.request_with_bearer(method, url, &bearer)
    }

    pub(crate) fn request_with_bearer(
        &self,
        method: Method,
        url: Url,
        bearer: &str,
    ) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", self.anon_key.as_str())
            .bearer_auth(bearer)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::InvalidResponse(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// Sends a request and converts non-success statuses into `BackendError`.
pub(crate) async fn send(request: RequestBuilder) -> BackendResult<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Sends a request and decodes a JSON response body.
pub(crate) async fn send_json(request: RequestBuilder) -> BackendResult<Value> {
    let response = send(request).await?;
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&body)?)
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> BackendError {
    let message = error_message(body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    match status.as_u16() {
        400 | 401 | 403 | 409 | 422 => BackendError::Rejected {
            status: status.as_u16(),
            message,
        },
        404 => BackendError::NotFound(message),
        code => BackendError::Status {
            status: code,
            message,
        },
    }
}

/// Extracts the most specific message from a Supabase error body.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
