use axum::{extract::State, Json};
use serde::Serialize;
use service_core::error::AppError;

use super::extract::DaysParam;
use crate::models::{merge_daily_records, DailyFitnessRecord};
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct HealthDataResponse {
    pub health_data: Vec<DailyFitnessRecord>,
}

/// Activity and sleep for the last `days` days, one record per date.
#[tracing::instrument(skip(state))]
pub async fn get_health_data(
    State(state): State<AppState>,
    DaysParam(days): DaysParam,
) -> Result<Json<HealthDataResponse>, AppError> {
    let (activity, sleep) = tokio::join!(
        state.fitness.get_activity_data(days),
        state.fitness.get_sleep_data(days)
    );

    // Sleep goes second so it wins on any shared field.
    let health_data = merge_daily_records([activity?, sleep?]);

    tracing::info!(records = health_data.len(), "Health data assembled");
    Ok(Json(HealthDataResponse { health_data }))
}
