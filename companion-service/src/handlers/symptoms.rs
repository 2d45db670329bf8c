//! Symptom endpoints: AI analysis, follow-up questions, keyword triage and
//! the local severity averager.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use service_core::error::AppError;
use service_core::retry::retry_with_backoff;
use validator::Validate;

use super::extract::ValidatedJson;
use crate::models::{ConversationTurn, HealthAssessment, SeverityAnalysis, Symptom, TriageResult};
use crate::services::{analysis, triage};
use crate::startup::AppState;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeSymptomsRequest {
    #[validate(length(min = 1, message = "At least one symptom is required"))]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FollowUpRequest {
    pub conversation_history: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
pub struct FollowUpResponse {
    pub questions: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TriageRequest {
    #[validate(length(min = 1, message = "At least one symptom is required"))]
    pub symptoms: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PreliminaryAnalysisRequest {
    #[validate(length(min = 1, message = "At least one symptom is required"), nested)]
    pub symptoms: Vec<Symptom>,
}

// ============================================================================
// Handlers
// ============================================================================

#[tracing::instrument(skip(state, req), fields(symptom_count = req.symptoms.len()))]
pub async fn analyze_symptoms(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AnalyzeSymptomsRequest>,
) -> Result<Json<HealthAssessment>, AppError> {
    let assessment = retry_with_backoff(&state.retry, "analyze_symptoms", || {
        state
            .assistant
            .analyze_symptoms(&req.symptoms, req.context.as_ref())
    })
    .await?;

    tracing::info!(urgency = ?assessment.urgency_level, "Symptom analysis complete");
    Ok(Json(assessment))
}

#[tracing::instrument(skip(state, req), fields(turns = req.conversation_history.len()))]
pub async fn generate_followup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<FollowUpRequest>,
) -> Result<Json<FollowUpResponse>, AppError> {
    let questions = retry_with_backoff(&state.retry, "generate_follow_up", || {
        state.assistant.generate_follow_up(&req.conversation_history)
    })
    .await?;

    Ok(Json(FollowUpResponse { questions }))
}

#[tracing::instrument(skip(req), fields(symptom_count = req.symptoms.len()))]
pub async fn triage(ValidatedJson(req): ValidatedJson<TriageRequest>) -> Json<TriageResult> {
    Json(triage::classify(&req.symptoms))
}

#[tracing::instrument(skip(req), fields(symptom_count = req.symptoms.len()))]
pub async fn preliminary_analysis(
    ValidatedJson(req): ValidatedJson<PreliminaryAnalysisRequest>,
) -> Result<Json<SeverityAnalysis>, AppError> {
    Ok(Json(analysis::perform_analysis(&req.symptoms)?))
}
