use crate::models::{SeverityAnalysis, Symptom};
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("At least one symptom is required")]
    NoSymptoms,
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::BadRequest(anyhow::anyhow!(err.to_string()))
    }
}

/// Average the reported severities and pick a lifestyle suggestion.
pub fn perform_analysis(symptoms: &[Symptom]) -> Result<SeverityAnalysis, AnalysisError> {
    if symptoms.is_empty() {
        return Err(AnalysisError::NoSymptoms);
    }

    let total: f64 = symptoms.iter().map(|s| f64::from(s.severity)).sum();
    let average_severity = total / symptoms.len() as f64;

    let suggestions = if average_severity < 3.0 {
        "Maintain a healthy lifestyle and stay hydrated."
    } else if average_severity < 6.0 {
        "Consider rest and monitor your symptoms."
    } else {
        "Seek medical attention if symptoms persist."
    };

    Ok(SeverityAnalysis {
        average_severity,
        suggestions,
    })
}
