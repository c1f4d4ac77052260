//! Schedule engine.
//!
//! Validates and matches five-field cron strings, forecasts upcoming
//! executions, describes schedules in English, and normalizes the three
//! trigger authoring modes into canonical cron. Nothing here performs I/O.

pub mod cache;
pub mod cron;
pub mod describe;
pub mod next;
pub mod settings;
pub mod zone;

pub use cache::CronCache;
pub use cron::{
    matches_cron_expression, validate_cron_expression, CronAtom, CronField, CronValidation,
    ParsedCron,
};
pub use describe::describe_cron_expression;
pub use next::{
    forecast_executions, forecast_executions_in, get_next_execution_times, Forecast,
    ScheduledTime,
};
pub use settings::{
    convert_datetime_to_cron, convert_schedule_settings, convert_schedule_settings_with,
    convert_simple_to_cron, RepeatCadence, ScheduleMode, ScheduleSettings, SimpleInterval,
};
pub use zone::{parse_zone, Zone};
