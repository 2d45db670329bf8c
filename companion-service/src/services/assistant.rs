//! Health assistant: turns symptoms or a conversation into a prompt, sends it
//! to the text provider with a fixed decoding configuration, and parses the
//! reply.
//!
//! The assistant makes exactly one provider call per operation and never
//! retries; callers decide on retry policy.

use crate::models::{ConversationTurn, HealthAssessment};
use crate::services::metrics::record_upstream_call;
use crate::services::prompts::{
    build_analysis_prompt, build_follow_up_prompt, parse_analysis_response,
};
use crate::services::providers::{GenerationParams, ProviderError, TextProvider};
use serde_json::{Map, Value};
use service_core::error::AppError;
use service_core::retry::Retryable;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const TEMPERATURE: f32 = 0.3;
pub const TOP_P: f32 = 0.8;
pub const TOP_K: u32 = 40;

const PROVIDER_LABEL: &str = "gemini";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssistantError {
    #[error("At least one symptom is required")]
    NoSymptoms,

    #[error("AI provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("AI provider timed out")]
    UpstreamTimeout,

    #[error("AI provider rejected the request (HTTP {status}): {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Failed to parse AI provider response: {0}")]
    MalformedUpstreamResponse(String),

    #[error("AI provider misconfigured: {0}")]
    Misconfigured(String),
}

impl AssistantError {
    fn label(&self) -> &'static str {
        match self {
            AssistantError::NoSymptoms => "validation",
            AssistantError::UpstreamUnavailable(_) => "unavailable",
            AssistantError::UpstreamTimeout => "timeout",
            AssistantError::UpstreamRejected { .. } => "rejected",
            AssistantError::MalformedUpstreamResponse(_) => "malformed",
            AssistantError::Misconfigured(_) => "misconfigured",
        }
    }
}

impl From<ProviderError> for AssistantError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(msg) => AssistantError::Misconfigured(msg),
            ProviderError::NetworkError(msg) => AssistantError::UpstreamUnavailable(msg),
            ProviderError::Timeout => AssistantError::UpstreamTimeout,
            ProviderError::Rejected { status, body } => {
                AssistantError::UpstreamRejected { status, body }
            }
            ProviderError::ContentFiltered => AssistantError::MalformedUpstreamResponse(
                "Response blocked by provider safety filters".to_string(),
            ),
            ProviderError::MalformedResponse(msg) => {
                AssistantError::MalformedUpstreamResponse(msg)
            }
        }
    }
}

impl Retryable for AssistantError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            AssistantError::UpstreamUnavailable(_) | AssistantError::UpstreamTimeout
        )
    }
}

impl From<AssistantError> for AppError {
    fn from(err: AssistantError) -> Self {
        match err {
            AssistantError::NoSymptoms => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            AssistantError::UpstreamUnavailable(_) | AssistantError::UpstreamRejected { .. } => {
                AppError::BadGateway(err.to_string())
            }
            AssistantError::UpstreamTimeout => AppError::GatewayTimeout(err.to_string()),
            AssistantError::MalformedUpstreamResponse(_) => {
                AppError::MalformedUpstream(err.to_string())
            }
            AssistantError::Misconfigured(_) => {
                AppError::ConfigError(anyhow::anyhow!(err.to_string()))
            }
        }
    }
}

/// Stateless wrapper around a [`TextProvider`].
pub struct HealthAssistant {
    provider: Arc<dyn TextProvider>,
}

impl HealthAssistant {
    pub fn new(provider: Arc<dyn TextProvider>) -> Self {
        Self { provider }
    }

    /// Decoding configuration used for every call.
    pub fn generation_params(json_reply: bool) -> GenerationParams {
        GenerationParams {
            temperature: Some(TEMPERATURE),
            top_p: Some(TOP_P),
            top_k: Some(TOP_K),
            response_mime_type: json_reply.then(|| "application/json".to_string()),
        }
    }

    /// Ask the provider for a structured assessment of `symptoms`.
    pub async fn analyze_symptoms(
        &self,
        symptoms: &[String],
        context: Option<&Map<String, Value>>,
    ) -> Result<HealthAssessment, AssistantError> {
        if symptoms.is_empty() {
            return Err(AssistantError::NoSymptoms);
        }

        let prompt = build_analysis_prompt(symptoms, context);
        let reply = self
            .call("analyze_symptoms", &prompt, &Self::generation_params(true))
            .await?;

        parse_analysis_response(&reply).map_err(|e| {
            tracing::warn!(
                error = %e,
                reply_len = reply.len(),
                "AI reply did not match assessment schema"
            );
            AssistantError::MalformedUpstreamResponse(e.to_string())
        })
    }

    /// Ask the provider for follow-up questions. The reply is returned as-is;
    /// it usually, but not always, looks like a JSON array.
    pub async fn generate_follow_up(
        &self,
        history: &[ConversationTurn],
    ) -> Result<String, AssistantError> {
        let prompt = build_follow_up_prompt(history);
        self.call("generate_follow_up", &prompt, &Self::generation_params(false))
            .await
    }

    async fn call(
        &self,
        operation: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, AssistantError> {
        let start = Instant::now();
        let result = self
            .provider
            .generate(prompt, params)
            .await
            .map_err(AssistantError::from);
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(_) => record_upstream_call(PROVIDER_LABEL, operation, "ok", elapsed),
            Err(e) => {
                tracing::warn!(operation, error = %e, "AI provider call failed");
                record_upstream_call(PROVIDER_LABEL, operation, e.label(), elapsed);
            }
        }

        result
    }
}
