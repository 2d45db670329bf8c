//! Keyword triage and canned clarifying questions.
//!
//! This is not medical logic: urgency comes from looking for the words
//! "severe" and "moderate" in the symptom text.

use crate::models::{TriageResult, TriageUrgency};

const FALLBACK_QUESTION: &str = "Can you provide more details about your symptom?";

/// Classify a list of symptoms.
///
/// Symptoms are scanned in order and each one containing "severe" sets the
/// urgency to high, otherwise one containing "moderate" sets it to medium.
/// A later match replaces an earlier one, so `["severe pain", "moderate
/// cough"]` ends up medium.
pub fn classify(symptoms: &[String]) -> TriageResult {
    let mut urgency = TriageUrgency::Low;
    let mut clarifying_questions: Vec<String> = Vec::new();

    for symptom in symptoms {
        let lowered = symptom.to_lowercase();

        if lowered.contains("severe") {
            urgency = TriageUrgency::High;
        } else if lowered.contains("moderate") {
            urgency = TriageUrgency::Medium;
        }

        if let Some(question) = known_question(&lowered) {
            if !clarifying_questions.iter().any(|q| q == question) {
                clarifying_questions.push(question.to_string());
            }
        }
    }

    TriageResult {
        urgency_level: urgency,
        guidance: urgency.guidance(),
        processed_symptoms: symptoms.to_vec(),
        clarifying_questions,
    }
}

/// Canned follow-up question for a single symptom keyword.
pub fn clarify(symptom: &str) -> &'static str {
    known_question(&symptom.trim().to_lowercase()).unwrap_or(FALLBACK_QUESTION)
}

fn known_question(key: &str) -> Option<&'static str> {
    match key {
        "headache" => Some("How long have you been experiencing the headache?"),
        "fever" => Some("What is your current temperature?"),
        "cough" => Some("Is the cough dry or productive?"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symptoms(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_keywords_is_low() {
        let result = classify(&symptoms(&["fever", "cough", "fatigue"]));
        assert_eq!(result.urgency_level, TriageUrgency::Low);
        assert_eq!(result.guidance, "Monitor and consult if symptoms persist");
    }

    #[test]
    fn severe_is_high_regardless_of_case() {
        let result = classify(&symptoms(&["fever", "SEVERE headache"]));
        assert_eq!(result.urgency_level, TriageUrgency::High);
        assert_eq!(result.guidance, "Immediate attention required");
    }

    #[test]
    fn moderate_is_medium() {
        let result = classify(&symptoms(&["Moderate back pain"]));
        assert_eq!(result.urgency_level, TriageUrgency::Medium);
    }

    #[test]
    fn later_moderate_downgrades_earlier_severe() {
        let result = classify(&symptoms(&["severe headache", "moderate cough"]));
        assert_eq!(result.urgency_level, TriageUrgency::Medium);
    }

    #[test]
    fn later_severe_upgrades_earlier_moderate() {
        let result = classify(&symptoms(&["moderate cough", "severe headache"]));
        assert_eq!(result.urgency_level, TriageUrgency::High);
    }

    #[test]
    fn symptom_with_both_keywords_counts_as_severe() {
        let result = classify(&symptoms(&["moderate to severe pain"]));
        assert_eq!(result.urgency_level, TriageUrgency::High);
    }

    #[test]
    fn symptoms_are_echoed_in_order() {
        let input = symptoms(&["fever", "cough"]);
        let result = classify(&input);
        assert_eq!(result.processed_symptoms, input);
        assert_eq!(
            result.clarifying_questions,
            vec![
                "What is your current temperature?".to_string(),
                "Is the cough dry or productive?".to_string(),
            ]
        );
    }

    #[test]
    fn clarify_known_and_unknown_symptoms() {
        assert_eq!(
            clarify("headache"),
            "How long have you been experiencing the headache?"
        );
        assert_eq!(clarify("Fever"), "What is your current temperature?");
        assert_eq!(
            clarify("unknown"),
            "Can you provide more details about your symptom?"
        );
    }
}
