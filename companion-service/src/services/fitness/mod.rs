//! Fitness data access (Google Fit).

pub mod credentials;
pub mod google_fit;

use crate::models::DailyFitnessRecord;
use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

pub use credentials::{
    Authorizer, ConsentAuthorizer, Credential, CredentialError, CredentialManager,
    DisabledAuthorizer, OAuthSettings, TokenStore,
};
pub use google_fit::{GoogleFitClient, GoogleFitConfig};

/// What to do when the fitness provider cannot be reached or answers badly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamFailurePolicy {
    /// Log the failure and return no records.
    #[default]
    DegradeToEmpty,
    /// Surface the failure to the caller.
    Propagate,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitnessError {
    #[error("Fitness credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Fitness provider unavailable: {0}")]
    Unavailable(String),

    #[error("Fitness provider timed out")]
    Timeout,

    #[error("Fitness provider rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Malformed fitness provider response: {0}")]
    Malformed(String),
}

impl FitnessError {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            FitnessError::Credential(_) => "credential",
            FitnessError::Unavailable(_) => "unavailable",
            FitnessError::Timeout => "timeout",
            FitnessError::Rejected { .. } => "rejected",
            FitnessError::Malformed(_) => "malformed",
        }
    }
}

impl From<FitnessError> for AppError {
    fn from(err: FitnessError) -> Self {
        match err {
            FitnessError::Credential(_)
            | FitnessError::Unavailable(_)
            | FitnessError::Rejected { .. } => AppError::BadGateway(err.to_string()),
            FitnessError::Timeout => AppError::GatewayTimeout(err.to_string()),
            FitnessError::Malformed(_) => AppError::MalformedUpstream(err.to_string()),
        }
    }
}

/// Per-day fitness records for the last `days` days.
#[async_trait]
pub trait FitnessProvider: Send + Sync {
    /// Steps, active minutes and average heart rate per day.
    async fn get_activity_data(&self, days: u32) -> Result<Vec<DailyFitnessRecord>, FitnessError>;

    /// Sleep duration and deep-sleep share per day.
    async fn get_sleep_data(&self, days: u32) -> Result<Vec<DailyFitnessRecord>, FitnessError>;
}
