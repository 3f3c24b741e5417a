use crate::circuit_breaker::create_analysis_circuit_breaker;
use crate::config::Config;
use crate::errors::{AppError, IntegrationFailure};
use crate::models::{ProjectType, SubmissionType};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use failsafe::CircuitBreaker;
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Analysis depth requested from the collaborator (free tier).
pub const ANALYSIS_LEVEL: &str = "high_level";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// What the collaborator is asked to analyze. Material and idea text are exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisContent {
    Material(Vec<u8>),
    Idea(String),
    Empty,
}

/// Normalized analysis request built by the orchestrator.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub lead_id: i64,
    pub submission_id: Option<i64>,
    pub submission_type: SubmissionType,
    pub content: AnalysisContent,
    pub project_type: ProjectType,
    pub genre: Option<String>,
    pub logline: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalysisPayload<'a> {
    lead_id: i64,
    submission_id: Option<i64>,
    submission_type: &'a str,
    project_type: &'a str,
    genre: Option<&'a str>,
    logline: Option<&'a str>,
    analysis_level: &'static str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    idea_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_content_base64: Option<String>,
}

/// Builds the JSON body sent to the analysis software.
pub fn build_payload(request: &AnalysisRequest, now: DateTime<Utc>) -> Value {
    let (idea_description, file_content_base64) = match &request.content {
        AnalysisContent::Material(bytes) => (None, Some(BASE64.encode(bytes))),
        AnalysisContent::Idea(text) => (Some(text.as_str()), None),
        AnalysisContent::Empty => (None, None),
    };

    let payload = AnalysisPayload {
        lead_id: request.lead_id,
        submission_id: request.submission_id,
        submission_type: request.submission_type.as_str(),
        project_type: request.project_type.as_str(),
        genre: request.genre.as_deref(),
        logline: request.logline.as_deref(),
        analysis_level: ANALYSIS_LEVEL,
        timestamp: now.to_rfc3339(),
        idea_description,
        file_content_base64,
    };

    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Response of the analysis software, normalized for every outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResponse {
    pub success: bool,
    pub analysis_type: String,
    pub raw_response: Value,
    pub summary: Option<String>,
    pub strengths: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub market_potential: Option<String>,
    pub error: Option<String>,
}

impl AnalysisResponse {
    pub fn failure(failure: &IntegrationFailure) -> Self {
        Self {
            success: false,
            analysis_type: ANALYSIS_LEVEL.to_string(),
            raw_response: Value::Object(Default::default()),
            summary: None,
            strengths: None,
            weaknesses: None,
            market_potential: None,
            error: Some(failure.to_string()),
        }
    }

    /// Parses a 2xx body. Missing or mistyped fields are treated as absent.
    pub fn parse(data: Value) -> Self {
        let success = data.get("success").and_then(Value::as_bool).unwrap_or(false);

        if !success {
            let error = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error from analysis software")
                .to_string();
            return Self {
                success: false,
                analysis_type: ANALYSIS_LEVEL.to_string(),
                raw_response: data,
                summary: None,
                strengths: None,
                weaknesses: None,
                market_potential: None,
                error: Some(error),
            };
        }

        let analysis = data.get("analysis");
        let text = |key: &str| {
            analysis
                .and_then(|a| a.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let list = |key: &str| {
            analysis
                .and_then(|a| a.get(key))
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
        };

        Self {
            success: true,
            analysis_type: ANALYSIS_LEVEL.to_string(),
            summary: text("summary"),
            strengths: list("strengths"),
            weaknesses: list("weaknesses"),
            market_potential: text("market_potential"),
            error: None,
            raw_response: data,
        }
    }
}

/// The external analysis collaborator.
///
/// `request_analysis` never fails: every failure class is folded into an
/// unsuccessful [`AnalysisResponse`].
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn request_analysis(&self, request: &AnalysisRequest) -> AnalysisResponse;

    /// GET on the health path; only HTTP 200 counts as healthy.
    async fn check_health(&self) -> bool;
}

/// HTTP client for the analysis software, guarded by a circuit breaker.
pub struct AnalysisClient<CB> {
    client: reqwest::Client,
    analyze_url: String,
    health_url: String,
    api_key: Option<String>,
    breaker: CB,
}

impl<CB: CircuitBreaker + Send + Sync> AnalysisClient<CB> {
    /// Creates a new `AnalysisClient`.
    ///
    /// # Arguments
    ///
    /// * `analyze_url` - Endpoint receiving analysis requests.
    /// * `health_url` - Endpoint probed by `check_health`.
    /// * `api_key` - Optional bearer token.
    /// * `timeout` - Upper bound for one analysis request.
    /// * `breaker` - Circuit breaker recording request outcomes.
    pub fn with_breaker(
        analyze_url: String,
        health_url: String,
        api_key: Option<String>,
        timeout: Duration,
        breaker: CB,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create analysis client: {}", e))
            })?;

        Ok(Self {
            client,
            analyze_url,
            health_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            breaker,
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(ACCEPT, "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, request: &AnalysisRequest) -> Result<Value, IntegrationFailure> {
        let payload = build_payload(request, Utc::now());

        let response = self
            .authorize(self.client.post(&self.analyze_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

/// Builds the production client from configuration.
pub fn analysis_client_from_config(
    config: &Config,
) -> Result<AnalysisClient<impl CircuitBreaker + Send + Sync>, AppError> {
    AnalysisClient::with_breaker(
        config.analysis_service_url.clone(),
        config.analysis_health_url.clone(),
        config.analysis_api_key.clone(),
        Duration::from_secs(config.analysis_timeout_secs),
        create_analysis_circuit_breaker(),
    )
}

#[async_trait]
impl<CB: CircuitBreaker + Send + Sync> AnalysisService for AnalysisClient<CB> {
    async fn request_analysis(&self, request: &AnalysisRequest) -> AnalysisResponse {
        if !self.breaker.is_call_permitted() {
            tracing::warn!(
                "Analysis circuit open, skipping request for lead {}",
                request.lead_id
            );
            return AnalysisResponse::failure(&IntegrationFailure::CircuitOpen);
        }

        tracing::info!(
            "Requesting analysis for lead {} (submission: {:?}, type: {})",
            request.lead_id,
            request.submission_id,
            request.submission_type
        );

        let outcome = self.send(request).await;

        // Record the outcome; a non-2xx, timeout or transport error counts as a failure.
        match self.breaker.call(|| outcome) {
            Ok(data) => {
                let response = AnalysisResponse::parse(data);
                if response.success {
                    tracing::info!("✓ Analysis received for lead {}", request.lead_id);
                } else {
                    tracing::warn!(
                        "Analysis software rejected lead {}: {:?}",
                        request.lead_id,
                        response.error
                    );
                }
                response
            }
            Err(failsafe::Error::Inner(failure)) => {
                tracing::error!(
                    "Analysis request failed for lead {}: {}",
                    request.lead_id,
                    failure
                );
                AnalysisResponse::failure(&failure)
            }
            Err(failsafe::Error::Rejected) => {
                AnalysisResponse::failure(&IntegrationFailure::CircuitOpen)
            }
        }
    }

    async fn check_health(&self) -> bool {
        let result = self
            .authorize(self.client.get(&self.health_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::warn!("Analysis health probe failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(content: AnalysisContent) -> AnalysisRequest {
        AnalysisRequest {
            lead_id: 7,
            submission_id: Some(3),
            submission_type: SubmissionType::Script,
            content,
            project_type: ProjectType::FeatureFilm,
            genre: Some("thriller".to_string()),
            logline: None,
        }
    }

    #[test]
    fn test_payload_for_material() {
        let payload = build_payload(&request(AnalysisContent::Material(b"FADE IN".to_vec())), Utc::now());
        assert_eq!(payload["file_content_base64"], "RkFERSBJTg==");
        assert!(payload.get("idea_description").is_none());
        assert_eq!(payload["analysis_level"], "high_level");
        assert_eq!(payload["submission_type"], "script");
        assert_eq!(payload["project_type"], "feature_film");
        assert_eq!(payload["logline"], Value::Null);
    }

    #[test]
    fn test_payload_for_idea() {
        let payload = build_payload(&request(AnalysisContent::Idea("A heist on Mars".to_string())), Utc::now());
        assert_eq!(payload["idea_description"], "A heist on Mars");
        assert!(payload.get("file_content_base64").is_none());
    }

    #[test]
    fn test_parse_success() {
        let response = AnalysisResponse::parse(json!({
            "success": true,
            "analysis": {
                "summary": "A compelling thriller",
                "strengths": ["Unique premise", 42, "Strong protagonist"],
                "weaknesses": ["Pacing in act 2"],
                "market_potential": "high",
                "recommendations": ["Tighten act 2"]
            }
        }));
        assert!(response.success);
        assert_eq!(response.summary.as_deref(), Some("A compelling thriller"));
        assert_eq!(
            response.strengths,
            Some(vec!["Unique premise".to_string(), "Strong protagonist".to_string()])
        );
        assert_eq!(response.market_potential.as_deref(), Some("high"));
        assert_eq!(response.raw_response["analysis"]["recommendations"][0], "Tighten act 2");
    }

    #[test]
    fn test_parse_success_without_analysis_block() {
        let response = AnalysisResponse::parse(json!({"success": true}));
        assert!(response.success);
        assert_eq!(response.summary, None);
        assert_eq!(response.strengths, None);
    }

    #[test]
    fn test_parse_failure_defaults_error() {
        let response = AnalysisResponse::parse(json!({"status": "queued"}));
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Unknown error from analysis software")
        );
    }

    #[test]
    fn test_client_creation() {
        let client = AnalysisClient::with_breaker(
            "https://example.com/analyze".to_string(),
            "https://example.com/health".to_string(),
            Some("  ".to_string()),
            Duration::from_secs(5),
            create_analysis_circuit_breaker(),
        )
        .unwrap();
        assert!(client.api_key.is_none());
    }
}
