//! Prompt construction and reply parsing for the health assistant.

use crate::models::{ConversationTurn, HealthAssessment};
use serde_json::{Map, Value};

/// Build the triage prompt. The output is deterministic for a given input.
pub fn build_analysis_prompt(symptoms: &[String], context: Option<&Map<String, Value>>) -> String {
    let mut lines = vec![
        "As a medical AI assistant, analyze these symptoms for triage:".to_string(),
        format!("Symptoms: {}", symptoms.join(", ")),
    ];

    if let Some(context) = context.filter(|c| !c.is_empty()) {
        lines.push(format!(
            "Additional Context: {}",
            Value::Object(context.clone())
        ));
    }

    lines.push(String::new());
    lines.extend(
        [
            "Please provide a JSON response with the following structure:",
            "{",
            r#"  "urgency_level": "(LOW/MEDIUM/HIGH/EMERGENCY)","#,
            r#"  "initial_assessment": "Brief analysis of symptoms","#,
            r#"  "recommended_actions": ["Action 1", "Action 2", ...],"#,
            r#"  "lifestyle_recommendations": ["Recommendation 1", "Recommendation 2", ...],"#,
            r#"  "warning_signs": ["Warning sign 1", "Warning sign 2", ...]"#,
            "}",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    lines.join("\n")
}

/// Build the prompt asking for follow-up questions about a conversation.
pub fn build_follow_up_prompt(history: &[ConversationTurn]) -> String {
    let conversation = history
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.user, turn.assistant))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Based on this medical conversation, generate 2-3 relevant follow-up \
         questions to better understand the patient's condition:\n\n\
         {}\n\n\
         Format the questions as a JSON array.",
        conversation
    )
}

/// Parse the model's reply as a [`HealthAssessment`]. The whole reply must be
/// one JSON object carrying all five fields with the right types.
pub fn parse_analysis_response(reply: &str) -> Result<HealthAssessment, serde_json::Error> {
    serde_json::from_str(reply.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UrgencyLevel;
    use serde_json::json;

    const WELL_FORMED: &str = r#"{
        "urgency_level": "MEDIUM",
        "initial_assessment": "Test assessment",
        "recommended_actions": ["Action 1", "Action 2"],
        "lifestyle_recommendations": ["Rec 1", "Rec 2"],
        "warning_signs": ["Warning 1", "Warning 2"]
    }"#;

    #[test]
    fn analysis_prompt_lists_symptoms_and_schema() {
        let prompt = build_analysis_prompt(
            &["severe headache".to_string(), "fever".to_string()],
            None,
        );

        assert!(
            prompt.starts_with("As a medical AI assistant, analyze these symptoms for triage:\n")
        );
        assert!(prompt.contains("Symptoms: severe headache, fever\n\n"));
        assert!(!prompt.contains("Additional Context"));
        for field in [
            "urgency_level",
            "initial_assessment",
            "recommended_actions",
            "lifestyle_recommendations",
            "warning_signs",
        ] {
            assert!(prompt.contains(field), "missing {}", field);
        }
    }

    #[test]
    fn analysis_prompt_includes_context_as_json() {
        let context = json!({"age": 35, "duration": "2 days"});
        let prompt = build_analysis_prompt(&["fever".to_string()], context.as_object());

        assert!(prompt.contains(r#"Additional Context: {"age":35,"duration":"2 days"}"#));
    }

    #[test]
    fn follow_up_prompt_renders_history_in_order() {
        let history = vec![
            ConversationTurn {
                user: "I have a severe headache".to_string(),
                assistant: "How long have you been experiencing the headache?".to_string(),
            },
            ConversationTurn {
                user: "About 2 days".to_string(),
                assistant: "Is the pain constant or does it come and go?".to_string(),
            },
        ];

        let prompt = build_follow_up_prompt(&history);
        assert!(prompt.contains(
            "User: I have a severe headache\nAssistant: How long have you been experiencing the headache?\nUser: About 2 days"
        ));
        assert!(prompt.ends_with("Format the questions as a JSON array."));
    }

    #[test]
    fn well_formed_reply_parses_field_for_field() {
        let assessment = parse_analysis_response(WELL_FORMED).unwrap();

        assert_eq!(assessment.urgency_level, UrgencyLevel::Medium);
        assert_eq!(assessment.initial_assessment, "Test assessment");
        assert_eq!(assessment.recommended_actions, vec!["Action 1", "Action 2"]);
        assert_eq!(assessment.lifestyle_recommendations, vec!["Rec 1", "Rec 2"]);
        assert_eq!(assessment.warning_signs, vec!["Warning 1", "Warning 2"]);

        let round_trip = serde_json::to_value(&assessment).unwrap();
        let original: Value = serde_json::from_str(WELL_FORMED).unwrap();
        assert_eq!(round_trip, original);
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut reply: Value = serde_json::from_str(WELL_FORMED).unwrap();
        reply.as_object_mut().unwrap().remove("warning_signs");
        assert!(parse_analysis_response(&reply.to_string()).is_err());
    }

    #[test]
    fn mistyped_field_is_rejected() {
        let mut reply: Value = serde_json::from_str(WELL_FORMED).unwrap();
        reply["recommended_actions"] = json!("rest");
        assert!(parse_analysis_response(&reply.to_string()).is_err());

        let mut reply: Value = serde_json::from_str(WELL_FORMED).unwrap();
        reply["warning_signs"] = json!([1, 2]);
        assert!(parse_analysis_response(&reply.to_string()).is_err());
    }

    #[test]
    fn unknown_urgency_and_prose_are_rejected() {
        let reply = WELL_FORMED.replace("MEDIUM", "SOMEWHAT");
        assert!(parse_analysis_response(&reply).is_err());
        assert!(parse_analysis_response("Here is my analysis: ...").is_err());
    }
}
