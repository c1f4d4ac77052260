//! Schedule authoring modes.
//!
//! Trigger nodes persist [`ScheduleSettings`] in one of three modes. The
//! canonical `cronExpression` is always derived from the authoring fields by
//! [`convert_schedule_settings`], a pure function. Settings written before
//! `scheduleMode` existed carry only `cronExpression` and are read as cron
//! mode. Fields this crate does not know about are kept as-is.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::zone::{parse_zone, Zone};

/// Cron used when cron mode has no expression at all.
pub const DEFAULT_CRON: &str = "0 * * * *";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    Simple,
    Datetime,
    #[default]
    Cron,
}

/// Intervals offered by simple mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleInterval {
    /// Every minute
    Minute,
    /// Every N minutes
    Minutes,
    /// Every hour
    Hour,
    /// Every N hours
    Hours,
    Day,
    Week,
    Month,
}

/// How a datetime-mode schedule repeats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatCadence {
    /// Fire once at the given instant
    #[default]
    None,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

/// Persisted schedule configuration of a trigger node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_mode: Option<ScheduleMode>,

    /// Canonical cron, derived from the fields below except in cron mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,

    // Simple mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<SimpleInterval>,
    /// N for `minutes` and `hours`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_value: Option<u32>,
    /// `HH:MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// 0 (Sunday) to 6, for `week`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u32>,
    /// 1 to 31, for `month`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    /// Restrict `day` to Monday through Friday
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays_only: Option<bool>,

    // Datetime mode
    /// ISO-8601 source instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<RepeatCadence>,

    /// Zone the cron fields are read in (IANA name or offset). Datetime
    /// mode reads `datetime` in this zone; an unparsable value means UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScheduleSettings {
    /// Cron-mode settings holding only an expression.
    pub fn cron(expression: impl Into<String>) -> Self {
        Self {
            schedule_mode: Some(ScheduleMode::Cron),
            cron_expression: Some(expression.into()),
            ..Self::default()
        }
    }

    pub fn simple(interval: SimpleInterval) -> Self {
        Self {
            schedule_mode: Some(ScheduleMode::Simple),
            interval: Some(interval),
            ..Self::default()
        }
    }

    pub fn datetime(instant: impl Into<String>, repeat: RepeatCadence) -> Self {
        Self {
            schedule_mode: Some(ScheduleMode::Datetime),
            datetime: Some(instant.into()),
            repeat: Some(repeat),
            ..Self::default()
        }
    }

    /// Mode in effect. Settings without a mode predate it and are cron.
    pub fn effective_mode(&self) -> ScheduleMode {
        self.schedule_mode.unwrap_or_default()
    }

    /// Parsed `timezone`, if set and valid.
    pub fn zone(&self) -> Option<Zone> {
        self.timezone.as_deref().and_then(|tz| parse_zone(tz).ok())
    }
}

/// Copy of `settings` with `cronExpression` recomputed.
///
/// Identical inputs always produce an identical cron string.
pub fn convert_schedule_settings(settings: &ScheduleSettings) -> ScheduleSettings {
    convert_schedule_settings_with(settings, DEFAULT_CRON)
}

/// [`convert_schedule_settings`] with a configurable cron-mode default.
pub fn convert_schedule_settings_with(
    settings: &ScheduleSettings,
    default_cron: &str,
) -> ScheduleSettings {
    let cron = match settings.effective_mode() {
        ScheduleMode::Cron => settings
            .cron_expression
            .clone()
            .unwrap_or_else(|| default_cron.to_string()),
        ScheduleMode::Simple => convert_simple_to_cron(
            settings.interval.unwrap_or(SimpleInterval::Day),
            settings.interval_value,
            settings.time.as_deref(),
            settings.weekday,
            settings.day_of_month,
            settings.weekdays_only.unwrap_or(false),
        ),
        ScheduleMode::Datetime => settings
            .datetime
            .as_deref()
            .and_then(|raw| parse_instant(raw, settings.zone()))
            .map(|instant| {
                convert_datetime_to_cron(&instant, settings.repeat.unwrap_or_default())
            })
            .or_else(|| settings.cron_expression.clone())
            .unwrap_or_else(|| default_cron.to_string()),
    };

    ScheduleSettings {
        cron_expression: Some(cron),
        ..settings.clone()
    }
}

/// Canonical cron for a simple-mode interval.
///
/// `time` (`HH:MM`, default midnight) supplies the minute for hourly
/// intervals and the hour and minute for the rest. `interval_value` is the N
/// of `minutes`/`hours`; `weekday` defaults to Monday and `day_of_month` to
/// the 1st.
pub fn convert_simple_to_cron(
    interval: SimpleInterval,
    interval_value: Option<u32>,
    time: Option<&str>,
    weekday: Option<u32>,
    day_of_month: Option<u32>,
    weekdays_only: bool,
) -> String {
    let (hour, minute) = time.map(parse_time).unwrap_or((0, 0));

    match interval {
        SimpleInterval::Minute => "* * * * *".to_string(),
        SimpleInterval::Minutes => match interval_value.map(|n| n.min(59)) {
            None | Some(0) | Some(1) => "* * * * *".to_string(),
            Some(n) => format!("*/{} * * * *", n),
        },
        SimpleInterval::Hour => format!("{} * * * *", minute),
        SimpleInterval::Hours => match interval_value.map(|n| n.min(23)) {
            None | Some(0) | Some(1) => format!("{} * * * *", minute),
            Some(n) => format!("{} */{} * * *", minute, n),
        },
        SimpleInterval::Day if weekdays_only => format!("{} {} * * 1-5", minute, hour),
        SimpleInterval::Day => format!("{} {} * * *", minute, hour),
        SimpleInterval::Week => {
            format!("{} {} * * {}", minute, hour, weekday.unwrap_or(1).min(6))
        }
        SimpleInterval::Month => format!(
            "{} {} {} * *",
            minute,
            hour,
            day_of_month.unwrap_or(1).clamp(1, 31)
        ),
    }
}

/// Cron for a datetime-mode instant, read in its own wall-clock time.
///
/// Without a cadence the cron is pinned to the instant's minute, hour, day
/// and month.
pub fn convert_datetime_to_cron(instant: &DateTime<FixedOffset>, repeat: RepeatCadence) -> String {
    let (minute, hour) = (instant.minute(), instant.hour());
    match repeat {
        RepeatCadence::None => format!(
            "{} {} {} {} *",
            minute,
            hour,
            instant.day(),
            instant.month()
        ),
        RepeatCadence::Hourly => format!("{} * * * *", minute),
        RepeatCadence::Daily => format!("{} {} * * *", minute, hour),
        RepeatCadence::Weekly => format!(
            "{} {} * * {}",
            minute,
            hour,
            instant.weekday().num_days_from_sunday()
        ),
        RepeatCadence::Monthly => format!("{} {} {} * *", minute, hour, instant.day()),
    }
}

/// `HH:MM` to `(hour, minute)`. Unparsable parts read as 0, large ones clamp.
fn parse_time(time: &str) -> (u32, u32) {
    let mut parts = time.trim().splitn(2, ':');
    let mut next = |max: u32| {
        parts
            .next()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .map_or(0, |v| v.min(max))
    };
    let hour = next(23);
    let minute = next(59);
    (hour, minute)
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM[:SS]`.
///
/// With a zone, an RFC 3339 instant is shifted into it and naive text is
/// taken as wall-clock time there. Without one, RFC 3339 keeps its own
/// offset and naive text is UTC.
fn parse_instant(raw: &str, zone: Option<Zone>) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(match zone {
            Some(zone) => zone.convert(&dt.with_timezone(&Utc)),
            None => dt,
        });
    }
    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
    Some(zone.unwrap_or_default().from_local(&naive))
}
