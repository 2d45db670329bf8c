//! Google Fit aggregate queries and bucket reshaping.

use super::{CredentialManager, FitnessError, FitnessProvider, UpstreamFailurePolicy};
use crate::models::DailyFitnessRecord;
use crate::services::metrics::record_upstream_call;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const GOOGLE_FIT_API_BASE: &str = "https://www.googleapis.com/fitness/v1";

const DAY_MILLIS: i64 = 86_400_000;
const NANOS_PER_HOUR: f64 = 3_600_000_000_000.0;

const STEP_COUNT: &str = "com.google.step_count.delta";
const ACTIVE_MINUTES: &str = "com.google.active_minutes";
const HEART_RATE_BPM: &str = "com.google.heart_rate.bpm";
const HEART_RATE_SUMMARY: &str = "com.google.heart_rate.summary";
const SLEEP_SEGMENT: &str = "com.google.sleep.segment";

// Sleep segment stage codes. 1 (awake) and 3 (out of bed) are not sleep.
const STAGE_SLEEPING: i64 = 2;
const STAGE_LIGHT: i64 = 4;
const STAGE_DEEP: i64 = 5;
const STAGE_REM: i64 = 6;

const PROVIDER_LABEL: &str = "google_fit";

#[derive(Debug, Clone)]
pub struct GoogleFitConfig {
    pub api_base: String,
    pub timeout: Duration,
    pub failure_policy: UpstreamFailurePolicy,
}

impl Default for GoogleFitConfig {
    fn default() -> Self {
        Self {
            api_base: GOOGLE_FIT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            failure_policy: UpstreamFailurePolicy::default(),
        }
    }
}

pub struct GoogleFitClient {
    config: GoogleFitConfig,
    credentials: Arc<CredentialManager>,
    client: Client,
}

impl GoogleFitClient {
    pub fn new(
        config: GoogleFitConfig,
        credentials: Arc<CredentialManager>,
    ) -> Result<Self, FitnessError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FitnessError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            config,
            credentials,
            client,
        })
    }

    fn aggregate_url(&self) -> String {
        format!(
            "{}/users/me/dataset:aggregate",
            self.config.api_base.trim_end_matches('/')
        )
    }

    async fn aggregate(
        &self,
        data_types: &[&str],
        days: u32,
    ) -> Result<AggregateResponse, FitnessError> {
        let token = self.credentials.access_token().await?;
        let body = aggregate_request(data_types, Utc::now(), days);

        let response = self
            .client
            .post(self.aggregate_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if status == StatusCode::UNAUTHORIZED {
            self.credentials.invalidate().await;
        }
        if !status.is_success() {
            return Err(FitnessError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| FitnessError::Malformed(e.to_string()))
    }

    /// Run `fetch`, record the outcome and apply the failure policy.
    async fn guarded<F>(
        &self,
        operation: &str,
        fetch: F,
    ) -> Result<Vec<DailyFitnessRecord>, FitnessError>
    where
        F: std::future::Future<Output = Result<Vec<DailyFitnessRecord>, FitnessError>>,
    {
        let start = Instant::now();
        let result = fetch.await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(records) => {
                record_upstream_call(PROVIDER_LABEL, operation, "ok", elapsed);
                tracing::debug!(operation, records = records.len(), "Fetched fitness data");
                Ok(records)
            }
            Err(e) => {
                record_upstream_call(PROVIDER_LABEL, operation, e.label(), elapsed);
                match self.config.failure_policy {
                    UpstreamFailurePolicy::DegradeToEmpty => {
                        tracing::warn!(
                            operation,
                            error = %e,
                            "Fitness query failed; returning no records"
                        );
                        Ok(Vec::new())
                    }
                    UpstreamFailurePolicy::Propagate => {
                        tracing::error!(operation, error = %e, "Fitness query failed");
                        Err(e)
                    }
                }
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> FitnessError {
    if e.is_timeout() {
        FitnessError::Timeout
    } else {
        FitnessError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl FitnessProvider for GoogleFitClient {
    #[tracing::instrument(skip(self))]
    async fn get_activity_data(&self, days: u32) -> Result<Vec<DailyFitnessRecord>, FitnessError> {
        self.guarded("activity", async {
            let response = self
                .aggregate(&[STEP_COUNT, ACTIVE_MINUTES, HEART_RATE_BPM], days)
                .await?;
            parse_activity_buckets(&response)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_sleep_data(&self, days: u32) -> Result<Vec<DailyFitnessRecord>, FitnessError> {
        self.guarded("sleep", async {
            let response = self.aggregate(&[SLEEP_SEGMENT], days).await?;
            parse_sleep_buckets(&response)
        })
        .await
    }
}

// ============================================================================
// Aggregate API request/response types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregateRequest {
    aggregate_by: Vec<AggregateBy>,
    bucket_by_time: BucketByTime,
    start_time_millis: i64,
    end_time_millis: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AggregateBy {
    data_type_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BucketByTime {
    duration_millis: i64,
}

/// One-day buckets over `[end - days, end]`.
fn aggregate_request(data_types: &[&str], end: DateTime<Utc>, days: u32) -> AggregateRequest {
    let start = end - ChronoDuration::days(i64::from(days));
    AggregateRequest {
        aggregate_by: data_types
            .iter()
            .map(|t| AggregateBy {
                data_type_name: t.to_string(),
            })
            .collect(),
        bucket_by_time: BucketByTime {
            duration_millis: DAY_MILLIS,
        },
        start_time_millis: start.timestamp_millis(),
        end_time_millis: end.timestamp_millis(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AggregateResponse {
    #[serde(default)]
    bucket: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Bucket {
    #[serde(deserialize_with = "int64")]
    start_time_millis: i64,
    #[serde(default)]
    dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    point: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    data_type_name: String,
    #[serde(default, deserialize_with = "opt_int64")]
    start_time_nanos: Option<i64>,
    #[serde(default, deserialize_with = "opt_int64")]
    end_time_nanos: Option<i64>,
    #[serde(default)]
    value: Vec<PointValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointValue {
    #[serde(default)]
    int_val: Option<i64>,
    #[serde(default)]
    fp_val: Option<f64>,
}

/// The Fit API encodes int64 fields as JSON strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Number(i64),
    Text(String),
}

impl Int64Repr {
    fn value<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            Int64Repr::Number(n) => Ok(n),
            Int64Repr::Text(s) => s.parse().map_err(E::custom),
        }
    }
}

fn int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Int64Repr::deserialize(deserializer)?.value()
}

fn opt_int64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Option::<Int64Repr>::deserialize(deserializer)?
        .map(Int64Repr::value)
        .transpose()
}

fn bucket_date(bucket: &Bucket) -> Result<NaiveDate, FitnessError> {
    Utc.timestamp_millis_opt(bucket.start_time_millis)
        .single()
        .map(|dt| dt.date_naive())
        .ok_or_else(|| {
            FitnessError::Malformed(format!(
                "bucket start {} out of range",
                bucket.start_time_millis
            ))
        })
}

fn points<'a>(bucket: &'a Bucket) -> impl Iterator<Item = &'a DataPoint> {
    bucket.dataset.iter().flat_map(|d| d.point.iter())
}

/// Steps and active minutes are summed; heart rate is the truncated mean of
/// all samples, 0 when there are none. Every field is present.
pub(crate) fn parse_activity_buckets(
    response: &AggregateResponse,
) -> Result<Vec<DailyFitnessRecord>, FitnessError> {
    response
        .bucket
        .iter()
        .map(|bucket| {
            let mut steps = 0i64;
            let mut active_minutes = 0i64;
            let mut heart_rate_samples: Vec<f64> = Vec::new();

            for point in points(bucket) {
                match point.data_type_name.as_str() {
                    STEP_COUNT => {
                        steps += point.value.iter().filter_map(|v| v.int_val).sum::<i64>()
                    }
                    ACTIVE_MINUTES => {
                        active_minutes += point.value.iter().filter_map(|v| v.int_val).sum::<i64>()
                    }
                    HEART_RATE_BPM => {
                        heart_rate_samples.extend(point.value.iter().filter_map(|v| v.fp_val))
                    }
                    // Summary points carry [average, max, min].
                    HEART_RATE_SUMMARY => {
                        heart_rate_samples.extend(point.value.first().and_then(|v| v.fp_val))
                    }
                    _ => {}
                }
            }

            let heart_rate_avg = if heart_rate_samples.is_empty() {
                0
            } else {
                (heart_rate_samples.iter().sum::<f64>() / heart_rate_samples.len() as f64) as i64
            };

            Ok(DailyFitnessRecord {
                steps: Some(steps),
                active_minutes: Some(active_minutes),
                heart_rate_avg: Some(heart_rate_avg),
                ..DailyFitnessRecord::empty(bucket_date(bucket)?)
            })
        })
        .collect()
}

/// Hours asleep (light, deep, REM or generic sleep) and the deep-sleep share
/// of that time, per bucket.
pub(crate) fn parse_sleep_buckets(
    response: &AggregateResponse,
) -> Result<Vec<DailyFitnessRecord>, FitnessError> {
    response
        .bucket
        .iter()
        .map(|bucket| {
            let mut sleeping_nanos = 0i64;
            let mut deep_nanos = 0i64;

            for point in points(bucket).filter(|p| p.data_type_name == SLEEP_SEGMENT) {
                let (Some(start), Some(end)) = (point.start_time_nanos, point.end_time_nanos)
                else {
                    continue;
                };
                let duration = (end - start).max(0);

                match point.value.first().and_then(|v| v.int_val) {
                    Some(STAGE_DEEP) => {
                        sleeping_nanos += duration;
                        deep_nanos += duration;
                    }
                    Some(STAGE_SLEEPING | STAGE_LIGHT | STAGE_REM) => sleeping_nanos += duration,
                    _ => {}
                }
            }

            let deep_sleep_percentage = if sleeping_nanos > 0 {
                deep_nanos as f64 / sleeping_nanos as f64 * 100.0
            } else {
                0.0
            };

            Ok(DailyFitnessRecord {
                sleep_hours: Some(sleeping_nanos as f64 / NANOS_PER_HOUR),
                deep_sleep_percentage: Some(deep_sleep_percentage),
                ..DailyFitnessRecord::empty(bucket_date(bucket)?)
            })
        })
        .collect()
}
