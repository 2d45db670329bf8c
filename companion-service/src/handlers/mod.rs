//! HTTP handlers for the companion service.

pub mod extract;
pub mod health;
pub mod health_data;
pub mod metrics;
pub mod symptoms;
