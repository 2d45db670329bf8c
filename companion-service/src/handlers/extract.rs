//! Request extractors that turn every malformed input into a 400 `{detail}`.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

/// JSON body that must deserialize and pass its `Validate` rules.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(anyhow::anyhow!(rejection.body_text())))?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Number of days of history requested in the path, 1 to 365.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaysParam(pub u32);

pub const MAX_DAYS: u32 = 365;

#[async_trait]
impl<S> FromRequestParts<S> for DaysParam
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::BadRequest(anyhow::anyhow!(rejection.body_text())))?;

        parse_days(&raw).map(DaysParam)
    }
}

pub fn parse_days(raw: &str) -> Result<u32, AppError> {
    let days: u32 = raw.parse().map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!("days must be a positive integer, got '{}'", raw))
    })?;

    if !(1..=MAX_DAYS).contains(&days) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "days must be between 1 and {}, got {}",
            MAX_DAYS,
            days
        )));
    }

    Ok(days)
}
