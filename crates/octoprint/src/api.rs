//! REST API client for the OctoPrint HTTP endpoints.
//!
//! Wraps login, job status and command dispatch using [`reqwest`]. Every
//! request carries the `X-Api-Key` header and a per-request timeout.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

/// Header OctoPrint reads the API key from.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// HTTP client for a single OctoPrint instance.
#[derive(Debug, Clone)]
pub struct OctoPrintApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `POST /api/login`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    /// Session token used to authenticate the push socket.
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response of `GET /api/job`.
#[derive(Debug, Deserialize)]
pub struct JobResponse {
    /// Human-readable state, e.g. `Operational` or `Printing from SD`.
    pub state: String,
    #[serde(default)]
    pub job: JobInfo,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobInfo {
    #[serde(default)]
    pub file: JobFile,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub name: Option<String>,
}

/// Errors from the OctoPrint REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum OctoPrintApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// OctoPrint returned a non-2xx status code.
    #[error("OctoPrint API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// A successful response lacked a required field.
    #[error("Response is missing `{0}`")]
    MissingField(&'static str),

    /// The API key cannot be sent as a header value.
    #[error("Invalid API key header: {0}")]
    InvalidApiKey(#[from] reqwest::header::InvalidHeaderValue),
}

impl OctoPrintApi {
    /// Create a client for the OctoPrint instance at `base_url`
    /// (e.g. `http://octopi.local`).
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, OctoPrintApiError> {
        let mut key = HeaderValue::from_str(api_key)?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: format!("{}/api", base_url.trim_end_matches('/')),
        })
    }

    /// REST root, e.g. `http://octopi.local/api`.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Log in and return the session token.
    ///
    /// Sends `POST /api/login` with `remember` set so the session
    /// survives push-socket reconnects.
    pub async fn login(&self, user: &str, password: &str) -> Result<String, OctoPrintApiError> {
        let body = serde_json::json!({
            "user": user,
            "pass": password,
            "remember": true,
        });

        let response = self
            .client
            .post(format!("{}/login", self.api_url))
            .json(&body)
            .send()
            .await?;

        let login: LoginResponse = Self::parse_response(response).await?;
        login
            .session
            .filter(|s| !s.is_empty())
            .ok_or(OctoPrintApiError::MissingField("session"))
    }

    /// Fetch the current job state and file (`GET /api/job`).
    pub async fn job(&self) -> Result<JobResponse, OctoPrintApiError> {
        let response = self
            .client
            .get(format!("{}/job", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Send a raw G-code command to the printer (`POST /api/printer/command`).
    pub async fn send_command(&self, command: &str) -> Result<(), OctoPrintApiError> {
        let body = serde_json::json!({ "command": command });

        let response = self
            .client
            .post(format!("{}/printer/command", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, OctoPrintApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(OctoPrintApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, OctoPrintApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Status check only; OctoPrint answers commands with `204 No Content`.
    async fn check_status(response: reqwest::Response) -> Result<(), OctoPrintApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
