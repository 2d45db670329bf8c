//! Structured symptom assessment returned by the AI provider.

use serde::{Deserialize, Serialize};

/// Urgency classification the model is asked to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Emergency,
}

/// Parsed analysis reply. Every field is required; unknown extra fields in
/// the upstream reply are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub urgency_level: UrgencyLevel,
    pub initial_assessment: String,
    pub recommended_actions: Vec<String>,
    pub lifestyle_recommendations: Vec<String>,
    pub warning_signs: Vec<String>,
}
