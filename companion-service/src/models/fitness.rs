//! Per-day fitness records and the date-keyed merge used by the health data
//! endpoint.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One calendar day of fitness data. Activity and sleep queries each fill a
/// subset of the optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyFitnessRecord {
    pub date: NaiveDate,
    pub steps: Option<i64>,
    pub active_minutes: Option<i64>,
    pub heart_rate_avg: Option<i64>,
    pub sleep_hours: Option<f64>,
    pub deep_sleep_percentage: Option<f64>,
}

impl DailyFitnessRecord {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            steps: None,
            active_minutes: None,
            heart_rate_avg: None,
            sleep_hours: None,
            deep_sleep_percentage: None,
        }
    }

    /// Overlay `other` onto `self`: each field `other` supplies replaces ours,
    /// fields it leaves empty are kept.
    pub fn merge_from(&mut self, other: &DailyFitnessRecord) {
        fn overlay<T: Copy>(dst: &mut Option<T>, src: Option<T>) {
            if src.is_some() {
                *dst = src;
            }
        }

        overlay(&mut self.steps, other.steps);
        overlay(&mut self.active_minutes, other.active_minutes);
        overlay(&mut self.heart_rate_avg, other.heart_rate_avg);
        overlay(&mut self.sleep_hours, other.sleep_hours);
        overlay(&mut self.deep_sleep_percentage, other.deep_sleep_percentage);
    }
}

/// Merge record sets by date. Sets are applied in order, so a later set wins
/// on any field both supply. Output holds one record per date, sorted by date.
pub fn merge_daily_records<I>(sets: I) -> Vec<DailyFitnessRecord>
where
    I: IntoIterator<Item = Vec<DailyFitnessRecord>>,
{
    let mut by_date: BTreeMap<NaiveDate, DailyFitnessRecord> = BTreeMap::new();

    for record in sets.into_iter().flatten() {
        by_date
            .entry(record.date)
            .and_modify(|existing| existing.merge_from(&record))
            .or_insert(record);
    }

    by_date.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    fn activity(d: u32, steps: i64) -> DailyFitnessRecord {
        DailyFitnessRecord {
            steps: Some(steps),
            active_minutes: Some(30),
            heart_rate_avg: Some(70),
            ..DailyFitnessRecord::empty(day(d))
        }
    }

    fn sleep(d: u32, hours: f64) -> DailyFitnessRecord {
        DailyFitnessRecord {
            sleep_hours: Some(hours),
            deep_sleep_percentage: Some(20.0),
            ..DailyFitnessRecord::empty(day(d))
        }
    }

    #[test]
    fn activity_and_sleep_for_same_day_combine() {
        let merged = merge_daily_records([vec![activity(20, 8000)], vec![sleep(20, 7.5)]]);

        assert_eq!(merged.len(), 1);
        let record = &merged[0];
        assert_eq!(record.date, day(20));
        assert_eq!(record.steps, Some(8000));
        assert_eq!(record.active_minutes, Some(30));
        assert_eq!(record.heart_rate_avg, Some(70));
        assert_eq!(record.sleep_hours, Some(7.5));
        assert_eq!(record.deep_sleep_percentage, Some(20.0));
    }

    #[test]
    fn later_record_wins_on_overlapping_fields() {
        let merged = merge_daily_records([vec![activity(20, 8000)], vec![activity(20, 9500)]]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].steps, Some(9500));
    }

    #[test]
    fn missing_fields_do_not_erase_existing_values() {
        let merged = merge_daily_records([
            vec![activity(20, 8000)],
            vec![DailyFitnessRecord::empty(day(20))],
        ]);

        assert_eq!(merged[0].steps, Some(8000));
    }

    #[test]
    fn distinct_days_stay_separate() {
        let merged = merge_daily_records([
            vec![activity(21, 100), activity(20, 200)],
            vec![sleep(22, 6.0)],
        ]);

        let dates: Vec<_> = merged.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(20), day(21), day(22)]);
        assert_eq!(merged[2].steps, None);
    }

    #[test]
    fn serializes_date_as_calendar_day() {
        let json = serde_json::to_value(sleep(20, 7.5)).unwrap();
        assert_eq!(json["date"], "2025-09-20");
        assert!(json["steps"].is_null());
    }
}
