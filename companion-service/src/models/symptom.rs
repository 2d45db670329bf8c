//! Symptom inputs and the results of the local (non-AI) helpers.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// A symptom with a self-reported severity, used by the severity averager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Symptom {
    #[validate(length(min = 1, message = "Symptom name is required"))]
    pub name: String,

    #[validate(range(max = 10, message = "Severity must be between 0 and 10"))]
    pub severity: u8,

    #[serde(default)]
    pub duration: Option<String>,
}

/// Keyword-based urgency produced by the triage helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageUrgency {
    Low,
    Medium,
    High,
}

impl TriageUrgency {
    /// Canned guidance line shown next to the urgency.
    pub fn guidance(self) -> &'static str {
        match self {
            TriageUrgency::Low => "Monitor and consult if symptoms persist",
            TriageUrgency::Medium => "Consult a healthcare provider if symptoms worsen",
            TriageUrgency::High => "Immediate attention required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageResult {
    pub urgency_level: TriageUrgency,
    pub guidance: &'static str,
    pub processed_symptoms: Vec<String>,
    pub clarifying_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityAnalysis {
    pub average_severity: f64,
    pub suggestions: &'static str,
}
