//! AI provider abstractions and implementations.
//!
//! This module provides a trait-based abstraction for text generation
//! providers, allowing the Gemini backend to be swapped for a mock in tests.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use service_core::retry::Retryable;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request to provider timed out")]
    Timeout,

    #[error("Provider returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::NetworkError(_) | ProviderError::Timeout)
    }
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Nucleus sampling probability.
    pub top_p: Option<f32>,

    /// Top-k sampling.
    pub top_k: Option<u32>,

    /// Ask the provider for a specific response MIME type
    /// (e.g. `application/json`).
    pub response_mime_type: Option<String>,
}

/// Trait for text/JSON generation providers (e.g., Gemini).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Generate a free-form text reply for a single-turn prompt.
    async fn generate(&self, prompt: &str, params: &GenerationParams)
        -> Result<String, ProviderError>;
}
