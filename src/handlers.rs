use crate::analysis::{AnalysisOrchestrator, AnalysisStatusReport, TriggerAck};
use crate::config::Config;
use crate::db_storage::LeadStore;
use crate::errors::AppError;
use crate::intake::{
    self, MaterialUpload, QuestionnaireOptions, QuestionnaireReceipt, QuestionnaireSubmission,
};
use crate::material_store::MaterialStore;
use crate::models::*;
use crate::notifier::Notifier;
use crate::scoring::{LeadScoreResult, LeadScoringEngine, ScoringCriteria};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Lead, submission and analysis storage.
    pub store: Arc<dyn LeadStore>,
    /// Uploaded material storage.
    pub materials: Arc<dyn MaterialStore>,
    /// Welcome and results notifications.
    pub notifier: Arc<dyn Notifier>,
    pub scoring: LeadScoringEngine,
    /// Background analysis runs and their per-lead claims.
    pub orchestrator: AnalysisOrchestrator,
}

/// Routes subject to rate limiting.
pub fn api_routes(max_body_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        // Questionnaire
        .route("/api/questionnaire/options", get(questionnaire_options))
        .route("/api/questionnaire/submit", post(submit_questionnaire))
        .route("/api/questionnaire/scoring-criteria", get(scoring_criteria))
        // Submissions
        .route("/api/submissions/upload", post(upload_material))
        .route("/api/submissions/idea", post(submit_idea))
        .route("/api/submissions/:submission_id/status", get(submission_status))
        .route("/api/submissions/lead/:lead_id", get(lead_submissions))
        // Analysis
        .route("/api/analysis/trigger", post(trigger_analysis))
        .route("/api/analysis/lead/:lead_id", get(lead_analyses))
        .route("/api/analysis/status/:lead_id", get(analysis_status))
        .route("/api/analysis/:analysis_id", get(get_analysis))
        // Lead administration
        .route("/api/leads", get(list_leads).post(create_lead))
        .route("/api/leads/stats", get(lead_stats))
        .route("/api/leads/:lead_id", get(get_lead))
        .route("/api/leads/:lead_id/score", get(lead_score))
        .route("/api/leads/:lead_id/status", patch(update_lead_status))
        .route("/api/leads/:lead_id/full", get(lead_full_details))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

/// Health routes; mounted outside the rate limiter.
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "pitchdeck-leads-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

#[derive(Debug, Serialize)]
pub struct DetailedHealth {
    pub status: &'static str,
    pub components: BTreeMap<&'static str, String>,
}

/// GET /health/detailed
///
/// Pings the database and probes the analysis software. The service is
/// `healthy` only when every component is.
pub async fn detailed_health(State(state): State<Arc<AppState>>) -> Json<DetailedHealth> {
    let mut components = BTreeMap::new();
    components.insert("api", "healthy".to_string());

    let database = match state.store.ping().await {
        Ok(()) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {}", e),
    };
    components.insert("database", database);

    let analysis = if state.orchestrator.analysis_service().check_health().await {
        "healthy"
    } else {
        "unhealthy"
    };
    components.insert("analysis_software", analysis.to_string());

    let overall = components.values().all(|v| v == "healthy");
    Json(DetailedHealth {
        status: if overall { "healthy" } else { "degraded" },
        components,
    })
}

// ============ Questionnaire ============

pub async fn questionnaire_options() -> Json<QuestionnaireOptions> {
    Json(intake::questionnaire_options())
}

/// POST /api/questionnaire/submit
pub async fn submit_questionnaire(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<QuestionnaireSubmission>,
) -> Result<Json<QuestionnaireReceipt>, AppError> {
    tracing::info!("POST /questionnaire/submit - email: {}", submission.contact.email);

    let receipt = intake::submit_questionnaire(
        state.store.as_ref(),
        &state.scoring,
        state.notifier.as_ref(),
        submission,
    )
    .await?;

    Ok(Json(receipt))
}

pub async fn scoring_criteria(State(state): State<Arc<AppState>>) -> Json<ScoringCriteria> {
    Json(state.scoring.describe_criteria())
}

// ============ Submissions ============

/// Response after a material upload or idea submission.
#[derive(Debug, Serialize)]
pub struct SubmissionReceipt {
    pub id: i64,
    pub lead_id: i64,
    pub submission_type: SubmissionType,
    pub original_filename: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub is_processed: bool,
    pub uploaded_at: DateTime<Utc>,
    pub message: String,
}

fn field_error(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Invalid multipart form: {}", e))
}

/// POST /api/submissions/upload
///
/// Multipart form with `lead_id`, `submission_type` and `file`.
pub async fn upload_material(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SubmissionReceipt>, AppError> {
    let mut lead_id: Option<i64> = None;
    let mut submission_type: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("lead_id") => {
                let raw = field.text().await.map_err(field_error)?;
                lead_id = Some(raw.trim().parse().map_err(|_| {
                    AppError::Validation("lead_id must be an integer".to_string())
                })?);
            }
            Some("submission_type") => {
                submission_type = Some(field.text().await.map_err(field_error)?.trim().to_string());
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(field_error)?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (Some(lead_id), Some(submission_type), Some((original_filename, bytes))) =
        (lead_id, submission_type, file)
    else {
        return Err(AppError::Validation(
            "lead_id, submission_type and file are required".to_string(),
        ));
    };

    tracing::info!(
        "POST /submissions/upload - lead {} ({}, {} bytes)",
        lead_id,
        submission_type,
        bytes.len()
    );

    let submission = intake::accept_material(
        state.store.as_ref(),
        state.materials.as_ref(),
        &state.config,
        MaterialUpload {
            lead_id,
            submission_type,
            original_filename,
            bytes,
        },
    )
    .await?;

    Ok(Json(SubmissionReceipt {
        id: submission.id,
        lead_id: submission.lead_id,
        submission_type: submission.submission_type,
        original_filename: submission.original_filename,
        file_size_bytes: Some(submission.file_size_bytes),
        is_processed: submission.is_processed,
        uploaded_at: submission.uploaded_at,
        message: "File uploaded successfully. Your analysis will be ready soon.".to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct IdeaSubmission {
    pub lead_id: i64,
    pub idea_description: String,
}

/// POST /api/submissions/idea
pub async fn submit_idea(
    State(state): State<Arc<AppState>>,
    Json(idea): Json<IdeaSubmission>,
) -> Result<Json<SubmissionReceipt>, AppError> {
    let submission =
        intake::accept_idea(state.store.as_ref(), idea.lead_id, &idea.idea_description).await?;

    Ok(Json(SubmissionReceipt {
        id: submission.id,
        lead_id: submission.lead_id,
        submission_type: submission.submission_type,
        original_filename: None,
        file_size_bytes: None,
        is_processed: submission.is_processed,
        uploaded_at: submission.uploaded_at,
        message: "Idea submitted successfully. Your analysis will be ready soon.".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct SubmissionStatus {
    pub id: i64,
    pub is_processed: bool,
    pub processing_error: Option<String>,
    pub has_analysis: bool,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// GET /api/submissions/:submission_id/status
pub async fn submission_status(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<i64>,
) -> Result<Json<SubmissionStatus>, AppError> {
    let submission = state
        .store
        .find_submission(submission_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    let has_analysis = state.store.has_analysis_for_submission(submission.id).await?;

    Ok(Json(SubmissionStatus {
        id: submission.id,
        is_processed: submission.is_processed,
        processing_error: submission.processing_error,
        has_analysis,
        uploaded_at: submission.uploaded_at,
        processed_at: submission.processed_at,
    }))
}

/// GET /api/submissions/lead/:lead_id
pub async fn lead_submissions(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
) -> Result<Json<Vec<Submission>>, AppError> {
    Ok(Json(state.store.list_submissions(lead_id).await?))
}

// ============ Analysis ============

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub lead_id: i64,
    #[serde(default)]
    pub submission_id: Option<i64>,
}

/// POST /api/analysis/trigger
///
/// Returns immediately; poll the status endpoint for the result.
pub async fn trigger_analysis(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<TriggerAck>, AppError> {
    tracing::info!(
        "POST /analysis/trigger - lead {} (submission: {:?})",
        request.lead_id,
        request.submission_id
    );
    let ack = state
        .orchestrator
        .trigger(request.lead_id, request.submission_id)
        .await?;
    Ok(Json(ack))
}

/// GET /api/analysis/lead/:lead_id
pub async fn lead_analyses(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
) -> Result<Json<Vec<AnalysisResult>>, AppError> {
    Ok(Json(state.store.list_analyses(lead_id).await?))
}

/// GET /api/analysis/:analysis_id
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(analysis_id): Path<i64>,
) -> Result<Json<AnalysisResult>, AppError> {
    state
        .store
        .find_analysis(analysis_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))
}

/// GET /api/analysis/status/:lead_id
pub async fn analysis_status(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
) -> Result<Json<AnalysisStatusReport>, AppError> {
    Ok(Json(state.orchestrator.analysis_status(lead_id).await?))
}

// ============ Lead administration ============

/// POST /api/leads
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(mut contact): Json<LeadContact>,
) -> Result<(StatusCode, Json<Lead>), AppError> {
    intake::validate_contact(&mut contact)?;
    let lead = state.store.create_lead(&contact).await?;
    tracing::info!("Created lead {} ({})", lead.id, lead.email);
    Ok((StatusCode::CREATED, Json(lead)))
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LeadFilter>,
) -> Result<Json<LeadPage>, AppError> {
    if filter.page < 1 {
        return Err(AppError::Validation("page must be at least 1".to_string()));
    }
    if !(1..=100).contains(&filter.per_page) {
        return Err(AppError::Validation(
            "per_page must be between 1 and 100".to_string(),
        ));
    }
    if filter.tier.is_some_and(|t| !t.is_recognized()) {
        return Err(AppError::Validation("Invalid tier filter".to_string()));
    }
    if filter.status.is_some_and(|s| !s.is_recognized()) {
        return Err(AppError::Validation("Invalid status filter".to_string()));
    }

    Ok(Json(state.store.list_leads(&filter).await?))
}

/// GET /api/leads/stats
pub async fn lead_stats(State(state): State<Arc<AppState>>) -> Result<Json<LeadStats>, AppError> {
    Ok(Json(state.store.lead_stats(Utc::now()).await?))
}

async fn require_lead(state: &AppState, lead_id: i64) -> Result<Lead, AppError> {
    state
        .store
        .find_lead(lead_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))
}

/// GET /api/leads/:lead_id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
) -> Result<Json<Lead>, AppError> {
    Ok(Json(require_lead(&state, lead_id).await?))
}

/// GET /api/leads/:lead_id/score
///
/// Recomputes the breakdown from the stored questionnaire.
pub async fn lead_score(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
) -> Result<Json<LeadScoreResult>, AppError> {
    require_lead(&state, lead_id).await?;
    let questionnaire = state
        .store
        .find_questionnaire(lead_id)
        .await?
        .ok_or_else(|| AppError::Validation("Lead has not completed questionnaire".to_string()))?;

    Ok(Json(state.scoring.calculate_score(&questionnaire.answers)))
}

#[derive(Debug, Deserialize)]
pub struct LeadStatusUpdate {
    pub status: LeadStatus,
}

/// PATCH /api/leads/:lead_id/status
pub async fn update_lead_status(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
    Json(update): Json<LeadStatusUpdate>,
) -> Result<Json<Lead>, AppError> {
    if !update.status.is_recognized() {
        return Err(AppError::Validation("Invalid lead status".to_string()));
    }

    let lead = state
        .store
        .update_lead_status(lead_id, update.status, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;

    tracing::info!("Lead {} moved to {}", lead.id, lead.status);
    Ok(Json(lead))
}

/// Everything known about one lead.
#[derive(Debug, Serialize)]
pub struct LeadFullDetails {
    pub lead: Lead,
    pub questionnaire: Option<QuestionnaireResponse>,
    pub submissions: Vec<Submission>,
    pub analyses: Vec<AnalysisResult>,
}

/// GET /api/leads/:lead_id/full
pub async fn lead_full_details(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<i64>,
) -> Result<Json<LeadFullDetails>, AppError> {
    let lead = require_lead(&state, lead_id).await?;
    let questionnaire = state.store.find_questionnaire(lead_id).await?;
    let submissions = state.store.list_submissions(lead_id).await?;
    let analyses = state.store.list_analyses(lead_id).await?;

    Ok(Json(LeadFullDetails {
        lead,
        questionnaire,
        submissions,
        analyses,
    }))
}
