pub mod analysis;
pub mod assistant;
pub mod fitness;
pub mod metrics;
pub mod prompts;
pub mod providers;
pub mod triage;

pub use assistant::{AssistantError, HealthAssistant};
pub use fitness::{FitnessError, FitnessProvider, GoogleFitClient, UpstreamFailurePolicy};
