//! Upcoming execution times.
//!
//! Simulates forward one minute at a time from the minute after `from` until
//! enough matches are found or the iteration ceiling (`count * factor`
//! minutes) is reached.

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cache;
use super::zone::Zone;

/// Minutes simulated per requested execution.
pub const DEFAULT_ITERATION_FACTOR: usize = 1000;

/// Upper bound on the result buffer allocated before any match is found.
const PREALLOCATE_LIMIT: usize = 1024;

/// One upcoming execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTime {
    /// Unix milliseconds
    pub timestamp: i64,
    pub iso: String,
    /// Human distance from the start instant, e.g. `in 30 minutes`
    pub relative: String,
    pub cron_expression: String,
}

impl ScheduledTime {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Upcoming executions plus whether the search gave up early.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    pub executions: Vec<ScheduledTime>,
    /// The iteration ceiling was hit before `count` executions were found.
    pub horizon_reached: bool,
}

/// Next `count` UTC execution times after `from` (default now).
///
/// Returns fewer entries when the schedule rarely fires, and none when the
/// expression is invalid. Use [`forecast_executions`] to tell those apart.
pub fn get_next_execution_times(
    cron: &str,
    count: usize,
    from: Option<DateTime<Utc>>,
) -> Vec<ScheduledTime> {
    forecast_executions(cron, count, from.unwrap_or_else(Utc::now), DEFAULT_ITERATION_FACTOR)
        .executions
}

/// Next `count` executions evaluated in UTC.
pub fn forecast_executions(
    cron: &str,
    count: usize,
    from: DateTime<Utc>,
    iteration_factor: usize,
) -> Forecast {
    forecast_executions_in(&Zone::Utc, cron, count, from, iteration_factor)
}

/// Next `count` executions with fields matched against wall-clock time in
/// `zone`.
pub fn forecast_executions_in(
    zone: &Zone,
    cron: &str,
    count: usize,
    from: DateTime<Utc>,
    iteration_factor: usize,
) -> Forecast {
    let parsed = match cache::global().get_or_parse(cron) {
        Ok(parsed) => parsed,
        Err(errors) => {
            warn!(cron, errors = errors.len(), "Cannot forecast invalid cron expression");
            return Forecast::default();
        }
    };
    if count == 0 {
        return Forecast::default();
    }
    if !parsed.can_fire() {
        warn!(cron, "Cron expression never fires");
        return Forecast {
            executions: Vec::new(),
            horizon_reached: true,
        };
    }

    let step = TimeDelta::minutes(1);
    let mut candidate = from.duration_trunc(step).unwrap_or(from) + step;
    let max_iterations = count.saturating_mul(iteration_factor.max(1));
    let mut executions = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));

    for _ in 0..max_iterations {
        if parsed.matches(&zone.convert(&candidate)) {
            executions.push(scheduled_time(cron, candidate, from));
            if executions.len() == count {
                break;
            }
        }
        candidate += step;
    }

    let horizon_reached = executions.len() < count;
    if horizon_reached {
        warn!(
            cron,
            found = executions.len(),
            requested = count,
            minutes = max_iterations,
            "Forecast horizon exhausted"
        );
    } else {
        debug!(cron, count, zone = %zone.name(), "Forecast complete");
    }

    Forecast {
        executions,
        horizon_reached,
    }
}

fn scheduled_time(cron: &str, at: DateTime<Utc>, from: DateTime<Utc>) -> ScheduledTime {
    ScheduledTime {
        timestamp: at.timestamp_millis(),
        iso: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        relative: relative_time(at - from),
        cron_expression: cron.trim().to_string(),
    }
}

/// `in N minutes/hours/days`, floored to the largest whole unit.
pub fn relative_time(delta: TimeDelta) -> String {
    let minutes = delta.num_minutes();
    if minutes < 1 {
        return "in less than a minute".to_string();
    }
    let (amount, unit) = if minutes < 60 {
        (minutes, "minute")
    } else if minutes < 60 * 24 {
        (delta.num_hours(), "hour")
    } else {
        (delta.num_days(), "day")
    };
    if amount == 1 {
        format!("in 1 {}", unit)
    } else {
        format!("in {} {}s", amount, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::zone::parse_zone;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_hourly_from_half_past() {
        let times = get_next_execution_times("0 * * * *", 3, Some(at(2024, 1, 1, 10, 30)));
        let isos: Vec<&str> = times.iter().map(|t| t.iso.as_str()).collect();
        assert_eq!(
            isos,
            vec![
                "2024-01-01T11:00:00.000Z",
                "2024-01-01T12:00:00.000Z",
                "2024-01-01T13:00:00.000Z"
            ]
        );
        assert_eq!(times[0].relative, "in 30 minutes");
        assert_eq!(times[1].relative, "in 1 hour");
        assert_eq!(times[0].cron_expression, "0 * * * *");
        assert_eq!(times[0].timestamp, at(2024, 1, 1, 11, 0).timestamp_millis());
        assert_eq!(times[2].instant(), Some(at(2024, 1, 1, 13, 0)));
    }

    #[test]
    fn test_start_instant_is_excluded() {
        let from = at(2024, 1, 1, 11, 0) + TimeDelta::seconds(20);
        let times = get_next_execution_times("0 * * * *", 1, Some(from));
        assert_eq!(times[0].iso, "2024-01-01T12:00:00.000Z");
    }

    #[test]
    fn test_rare_schedule_reports_horizon() {
        let forecast = forecast_executions("0 0 30 2 *", 2, at(2024, 1, 1, 0, 0), 1000);
        assert!(forecast.executions.is_empty());
        assert!(forecast.horizon_reached);

        let forecast = forecast_executions("*/10 * * * *", 3, at(2024, 1, 1, 0, 0), 1000);
        assert_eq!(forecast.executions.len(), 3);
        assert!(!forecast.horizon_reached);
    }

    #[test]
    fn test_huge_count_is_bounded_by_horizon() {
        let forecast = forecast_executions("0 0 30 2 *", usize::MAX / 2, at(2024, 1, 1, 0, 0), 1000);
        assert!(forecast.executions.is_empty());
        assert!(forecast.horizon_reached);

        let times = get_next_execution_times("0 0 30 2 *", 1_000_000_000, Some(at(2024, 1, 1, 0, 0)));
        assert!(times.is_empty());

        let forecast = forecast_executions("* * * * *", 5000, at(2024, 1, 1, 0, 0), 1);
        assert_eq!(forecast.executions.len(), 5000);
        assert!(!forecast.horizon_reached);
    }

    #[test]
    fn test_invalid_cron_yields_nothing() {
        assert!(get_next_execution_times("99 * * * *", 5, None).is_empty());
        assert!(get_next_execution_times("0 * * * *", 0, None).is_empty());
    }

    #[test]
    fn test_forecast_in_named_zone() {
        let zone = parse_zone("Europe/Berlin").unwrap();
        let forecast = forecast_executions_in(&zone, "0 9 * * *", 2, at(2024, 1, 1, 0, 0), 1000);
        let isos: Vec<&str> = forecast.executions.iter().map(|t| t.iso.as_str()).collect();
        assert_eq!(isos, vec!["2024-01-01T08:00:00.000Z", "2024-01-02T08:00:00.000Z"]);
    }

    #[test]
    fn test_relative_time() {
        assert_eq!(relative_time(TimeDelta::seconds(20)), "in less than a minute");
        assert_eq!(relative_time(TimeDelta::minutes(1)), "in 1 minute");
        assert_eq!(relative_time(TimeDelta::minutes(150)), "in 2 hours");
        assert_eq!(relative_time(TimeDelta::days(3)), "in 3 days");
    }

    #[test]
    fn test_scheduled_time_serializes_camel_case() {
        let times = get_next_execution_times("0 0 * * *", 1, Some(at(2024, 3, 1, 12, 0)));
        let json = serde_json::to_value(&times[0]).unwrap();
        assert_eq!(json["cronExpression"], "0 0 * * *");
        assert_eq!(json["iso"], "2024-03-02T00:00:00.000Z");
    }
}
