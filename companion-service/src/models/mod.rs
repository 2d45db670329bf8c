//! Domain models for the companion service.

pub mod assessment;
pub mod conversation;
pub mod fitness;
pub mod symptom;

pub use assessment::{HealthAssessment, UrgencyLevel};
pub use conversation::ConversationTurn;
pub use fitness::{merge_daily_records, DailyFitnessRecord};
pub use symptom::{SeverityAnalysis, Symptom, TriageResult, TriageUrgency};
