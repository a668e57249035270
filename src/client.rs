//! HTTP client for the remote fraud-scoring service.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{CheckResult, FraudCheckError};
use crate::models::{
    Ack, CheckRequest, FeedbackRecord, HealthStatus, PredictionEnvelope, PredictionId,
    PredictionListEnvelope, PredictionSummary, ScorePayload, ScoreResult, Stats, TransactionRecord,
};

/// Sent as `X-API-Key`; header names are case-insensitive on the wire.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The calls the dashboard and feedback flows depend on. One request per
/// call, no retries; failures go straight back to the caller.
#[allow(async_fn_in_trait)]
pub trait ScoringApi {
    async fn check_fraud(&self, record: &TransactionRecord) -> CheckResult<ScoreResult>;

    async fn submit_feedback(&self, feedback: &FeedbackRecord) -> CheckResult<Ack>;

    async fn stats(&self) -> CheckResult<Stats>;

    /// A previously stored prediction, including its verdict.
    async fn prediction(&self, id: &PredictionId) -> CheckResult<PredictionSummary>;
}

pub struct HttpScoringClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpScoringClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> CheckResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key).map_err(|_| {
                FraudCheckError::local("api key", "contains characters not allowed in a header")
            })?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> CheckResult<HealthStatus> {
        self.send("GET /", self.http.get(self.url("/"))).await
    }

    pub async fn recent_predictions(&self, limit: u32) -> CheckResult<Vec<PredictionSummary>> {
        let request = self
            .http
            .get(self.url("/api/predictions"))
            .query(&[("limit", limit)]);
        let envelope: PredictionListEnvelope = self.send("GET /api/predictions", request).await?;
        Ok(envelope.predictions)
    }

    async fn send<T: DeserializeOwned>(&self, route: &str, request: RequestBuilder) -> CheckResult<T> {
        debug!(route, "sending request");

        let response = request.send().await.map_err(|err| {
            warn!(route, error = %err, "scoring service unreachable");
            FraudCheckError::from(err)
        })?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|err| {
                warn!(route, error = %err, "could not decode response body");
                FraudCheckError::InvalidResponse(format!("{route}: {err}"))
            });
        }

        warn!(route, status = status.as_u16(), "request failed");
        Err(classify_failure(status, body))
    }
}

impl ScoringApi for HttpScoringClient {
    async fn check_fraud(&self, record: &TransactionRecord) -> CheckResult<ScoreResult> {
        let mode = record.mode();
        let request = self
            .http
            .post(self.url("/api/check-fraud"))
            .json(&CheckRequest::from(record));
        let payload: ScorePayload = self.send("POST /api/check-fraud", request).await?;
        let result = ScoreResult::from_payload(payload, mode)?;

        debug!(
            %mode,
            is_fraud = result.is_fraud,
            probability = result.fraud_probability,
            saved = result.prediction_id.is_some(),
            "scored transaction"
        );
        Ok(result)
    }

    async fn submit_feedback(&self, feedback: &FeedbackRecord) -> CheckResult<Ack> {
        let path = format!("/api/predictions/{}/feedback", feedback.prediction_id().as_str());
        let request = self.http.post(self.url(&path)).json(feedback);
        self.send("POST /api/predictions/{id}/feedback", request).await
    }

    async fn stats(&self) -> CheckResult<Stats> {
        self.send("GET /api/stats", self.http.get(self.url("/api/stats"))).await
    }

    async fn prediction(&self, id: &PredictionId) -> CheckResult<PredictionSummary> {
        let path = format!("/api/predictions/{}", id.as_str());
        let envelope: PredictionEnvelope =
            self.send("GET /api/predictions/{id}", self.http.get(self.url(&path))).await?;
        Ok(envelope.prediction)
    }
}

fn classify_failure(status: StatusCode, body: String) -> FraudCheckError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => FraudCheckError::Validation {
            status: status.as_u16(),
            body,
        },
        _ => FraudCheckError::Network {
            status: Some(status.as_u16()),
            message: server_message(&body).unwrap_or(body),
        },
    }
}

/// The service wraps failures as `{"status": "error", "message": ...}`.
fn server_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
