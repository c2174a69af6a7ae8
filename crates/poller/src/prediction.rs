//! Client for the external prediction services.
//!
//! Both services take `{start_time, filename}` and answer with the
//! recognised piece type plus either a single `prediction` (quality) or
//! a list of `predictions` (dimensions, in millimetres). Calls run on
//! their own task with the shared retry policy; the control loop never
//! waits for them.

use std::time::Duration;

use printwatch_core::monitor::PredictionRequest;
use printwatch_core::trigger::PredictionTarget;
use printwatch_core::types::format_timestamp;
use printwatch_octoprint::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Dimension names for rectangular pieces (`QUADRADO`, `RETANGULO`).
const BOX_DIMENSIONS: [&str; 3] = ["length", "width", "height"];

/// Dimension names for L-shaped pieces.
const L_DIMENSIONS: [&str; 7] = [
    "outer_length",
    "outer_width",
    "inner_length_1",
    "inner_length_2",
    "inner_width_1",
    "inner_width_2",
    "height",
];

/// Request body for both services.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionPayload {
    /// `YYYY-MM-DD HH:MM:SS`, the first persisted row of the job.
    pub start_time: String,
    pub filename: String,
}

impl From<&PredictionRequest> for PredictionPayload {
    fn from(request: &PredictionRequest) -> Self {
        Self {
            start_time: format_timestamp(&request.start_time),
            filename: request.filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionResponse {
    #[serde(default)]
    pub piece_type: Option<String>,
    /// Quality verdict.
    #[serde(default)]
    pub prediction: Option<serde_json::Value>,
    /// Dimensional estimates.
    #[serde(default)]
    pub predictions: Vec<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Prediction service error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

/// HTTP client for one prediction endpoint.
#[derive(Debug, Clone)]
pub struct PredictionClient {
    client: reqwest::Client,
    url: String,
}

impl PredictionClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn predict(
        &self,
        payload: &PredictionPayload,
    ) -> Result<PredictionResponse, PredictionError> {
        let response = self.client.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PredictionError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Render a response for the log.
pub fn describe(target: PredictionTarget, response: &PredictionResponse) -> String {
    let piece = response.piece_type.as_deref().unwrap_or("unknown");
    match target {
        PredictionTarget::Quality => {
            let verdict = match &response.prediction {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "no prediction".to_string(),
            };
            format!("{piece}: {verdict}")
        }
        PredictionTarget::Dimensions => {
            let names: &[&str] = match piece {
                "QUADRADO" | "RETANGULO" => &BOX_DIMENSIONS,
                "L" => &L_DIMENSIONS,
                _ => &[],
            };
            if names.is_empty() || response.predictions.len() < names.len() {
                return format!("{piece}: {:?}", response.predictions);
            }
            let dims = names
                .iter()
                .zip(&response.predictions)
                .map(|(name, value)| format!("{name}={value:.2}mm"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{piece}: {dims}")
        }
    }
}

/// Fire-and-forget dispatcher for the configured prediction endpoints.
#[derive(Debug, Clone)]
pub struct PredictionService {
    endpoints: Vec<(PredictionTarget, PredictionClient)>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl PredictionService {
    pub fn new<I>(
        endpoints: I,
        timeout: Duration,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, PredictionError>
    where
        I: IntoIterator<Item = (PredictionTarget, String)>,
    {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoints = endpoints
            .into_iter()
            .map(|(target, url)| (target, PredictionClient::new(client.clone(), url)))
            .collect();
        Ok(Self {
            endpoints,
            retry,
            cancel,
        })
    }

    /// Call the service for `request.target` on a background task.
    ///
    /// Returns `None` when no endpoint is configured for that target.
    pub fn spawn(&self, request: PredictionRequest) -> Option<JoinHandle<()>> {
        let client = self
            .endpoints
            .iter()
            .find(|(target, _)| *target == request.target)
            .map(|(_, client)| client.clone())?;
        let retry = self.retry;
        let cancel = self.cancel.clone();

        Some(tokio::spawn(async move {
            let payload = PredictionPayload::from(&request);
            tracing::info!(
                target = %request.target,
                url = client.url(),
                start_time = %payload.start_time,
                filename = %payload.filename,
                "Requesting prediction",
            );

            match retry
                .run("prediction", &cancel, || client.predict(&payload))
                .await
            {
                Ok(response) => tracing::info!(
                    target = %request.target,
                    filename = %payload.filename,
                    result = %describe(request.target, &response),
                    "Prediction received",
                ),
                Err(e) => tracing::error!(
                    target = %request.target,
                    error = %e,
                    "Prediction request failed",
                ),
            }
        }))
    }
}
