//! Nurse companion backend: symptom analysis through Gemini, health data
//! through Google Fit, and a few local symptom helpers.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
