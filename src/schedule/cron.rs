//! Five-field cron grammar.
//!
//! `minute hour day-of-month month day-of-week`, each field one of:
//!
//! - `*` wildcard
//! - `n` exact value
//! - `a-b` inclusive range
//! - `base/step` with base `*`, `a-b` or `a` (meaning `a` to the field maximum)
//! - a comma list of the forms above
//!
//! Every field is checked against its domain and all problems are reported
//! together.

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{ValidationCode, ValidationError};

/// One of the five cron positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CronField {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl CronField {
    pub const ALL: [CronField; 5] = [
        CronField::Minute,
        CronField::Hour,
        CronField::DayOfMonth,
        CronField::Month,
        CronField::DayOfWeek,
    ];

    /// Field name used in validation errors.
    pub fn name(&self) -> &'static str {
        match self {
            CronField::Minute => "minute",
            CronField::Hour => "hour",
            CronField::DayOfMonth => "dayOfMonth",
            CronField::Month => "month",
            CronField::DayOfWeek => "dayOfWeek",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CronField::Minute => "Minute",
            CronField::Hour => "Hour",
            CronField::DayOfMonth => "Day of month",
            CronField::Month => "Month",
            CronField::DayOfWeek => "Day of week",
        }
    }

    /// Inclusive numeric domain.
    pub fn bounds(&self) -> (u32, u32) {
        match self {
            CronField::Minute => (0, 59),
            CronField::Hour => (0, 23),
            CronField::DayOfMonth => (1, 31),
            CronField::Month => (1, 12),
            CronField::DayOfWeek => (0, 6),
        }
    }

    /// This field's value for a wall-clock instant. Sunday is 0.
    pub fn value_of<Tz: TimeZone>(&self, date: &DateTime<Tz>) -> u32 {
        match self {
            CronField::Minute => date.minute(),
            CronField::Hour => date.hour(),
            CronField::DayOfMonth => date.day(),
            CronField::Month => date.month(),
            CronField::DayOfWeek => date.weekday().num_days_from_sunday(),
        }
    }
}

/// A parsed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CronAtom {
    Wildcard,
    /// `*/step` when `range` is `None`, otherwise `a-b/step`.
    Step {
        range: Option<(u32, u32)>,
        step: u32,
    },
    Range {
        start: u32,
        end: u32,
    },
    List {
        items: Vec<CronAtom>,
    },
    Value {
        value: u32,
    },
}

impl CronAtom {
    pub fn matches(&self, value: u32) -> bool {
        match self {
            CronAtom::Wildcard => true,
            CronAtom::Step { range: None, step } => value % step == 0,
            CronAtom::Step {
                range: Some((start, end)),
                step,
            } => value >= *start && value <= *end && (value - start) % step == 0,
            CronAtom::Range { start, end } => value >= *start && value <= *end,
            CronAtom::List { items } => items.iter().any(|item| item.matches(value)),
            CronAtom::Value { value: expected } => value == *expected,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, CronAtom::Wildcard)
    }
}

/// All five fields of a valid cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCron {
    pub minute: CronAtom,
    pub hour: CronAtom,
    pub day_of_month: CronAtom,
    pub month: CronAtom,
    pub day_of_week: CronAtom,
}

impl ParsedCron {
    /// Parse and bounds-check, collecting every error.
    pub fn parse(cron: &str) -> Result<Self, Vec<ValidationError>> {
        let parts: Vec<&str> = cron.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(vec![ValidationError::new(
                "expression",
                format!(
                    "Cron expression must have exactly 5 fields (minute hour day-of-month month day-of-week), got {}",
                    parts.len()
                ),
                ValidationCode::InvalidFieldCount,
            )]);
        }

        let mut errors = Vec::new();
        let mut take = |field: CronField, text: &str| {
            parse_field(field, text).unwrap_or_else(|mut field_errors| {
                errors.append(&mut field_errors);
                CronAtom::Wildcard
            })
        };
        let parsed = Self {
            minute: take(CronField::Minute, parts[0]),
            hour: take(CronField::Hour, parts[1]),
            day_of_month: take(CronField::DayOfMonth, parts[2]),
            month: take(CronField::Month, parts[3]),
            day_of_week: take(CronField::DayOfWeek, parts[4]),
        };

        if errors.is_empty() {
            Ok(parsed)
        } else {
            Err(errors)
        }
    }

    pub fn field(&self, field: CronField) -> &CronAtom {
        match field {
            CronField::Minute => &self.minute,
            CronField::Hour => &self.hour,
            CronField::DayOfMonth => &self.day_of_month,
            CronField::Month => &self.month,
            CronField::DayOfWeek => &self.day_of_week,
        }
    }

    /// Whether any calendar instant can match.
    ///
    /// False for day/month pairs that never exist (`30 2`) and for fields
    /// whose steps select nothing inside the domain (`*/40` days). Every other
    /// expression fires within one 400-year Gregorian cycle.
    pub fn can_fire(&self) -> bool {
        const LONGEST_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

        let any_in_domain = |field: CronField| {
            let (min, max) = field.bounds();
            (min..=max).any(|v| self.field(field).matches(v))
        };
        let date_exists = (1..=12u32).filter(|m| self.month.matches(*m)).any(|m| {
            (1..=LONGEST_MONTH[m as usize - 1]).any(|d| self.day_of_month.matches(d))
        });

        date_exists
            && any_in_domain(CronField::Minute)
            && any_in_domain(CronField::Hour)
            && any_in_domain(CronField::DayOfWeek)
    }

    /// Whether the wall-clock instant matches all five fields.
    pub fn matches<Tz: TimeZone>(&self, date: &DateTime<Tz>) -> bool {
        CronField::ALL
            .iter()
            .all(|field| self.field(*field).matches(field.value_of(date)))
    }
}

/// Outcome of [`validate_cron_expression`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronValidation {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedCron>,
}

/// Validate a cron string, reporting every field error at once.
pub fn validate_cron_expression(cron: &str) -> CronValidation {
    match ParsedCron::parse(cron) {
        Ok(parsed) => CronValidation {
            valid: true,
            errors: Vec::new(),
            parsed: Some(parsed),
        },
        Err(errors) => CronValidation {
            valid: false,
            errors,
            parsed: None,
        },
    }
}

/// Whether `date`, in its own zone, matches `cron`. Invalid cron never matches.
pub fn matches_cron_expression<Tz: TimeZone>(date: &DateTime<Tz>, cron: &str) -> bool {
    super::cache::global()
        .get_or_parse(cron)
        .map(|parsed| parsed.matches(date))
        .unwrap_or(false)
}

fn parse_field(field: CronField, text: &str) -> Result<CronAtom, Vec<ValidationError>> {
    if !text.contains(',') {
        return parse_single(field, text).map_err(|e| vec![e]);
    }

    let mut items = Vec::new();
    let mut errors = Vec::new();
    for part in text.split(',') {
        match parse_single(field, part) {
            Ok(atom) => items.push(atom),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(CronAtom::List { items })
    } else {
        Err(errors)
    }
}

fn parse_single(field: CronField, text: &str) -> Result<CronAtom, ValidationError> {
    if text == "*" {
        return Ok(CronAtom::Wildcard);
    }

    if let Some((base, step)) = text.split_once('/') {
        let step = match step.parse::<u32>() {
            Ok(0) | Err(_) => {
                return Err(error(
                    field,
                    format!("{} step '{}' must be a positive integer", field.label(), step),
                    ValidationCode::InvalidStep,
                ))
            }
            Ok(step) => step,
        };
        let range = match base {
            "*" => None,
            _ if base.contains('-') => Some(parse_range(field, base)?),
            _ => Some((parse_number(field, base)?, field.bounds().1)),
        };
        return Ok(CronAtom::Step { range, step });
    }

    if text.contains('-') {
        let (start, end) = parse_range(field, text)?;
        return Ok(CronAtom::Range { start, end });
    }

    parse_number(field, text).map(|value| CronAtom::Value { value })
}

fn parse_range(field: CronField, text: &str) -> Result<(u32, u32), ValidationError> {
    let Some((start, end)) = text.split_once('-') else {
        return Err(invalid_value(field, text));
    };
    let start = parse_number(field, start)?;
    let end = parse_number(field, end)?;
    if start > end {
        return Err(error(
            field,
            format!("{} range {}-{} starts after it ends", field.label(), start, end),
            ValidationCode::InvalidRange,
        ));
    }
    Ok((start, end))
}

fn parse_number(field: CronField, text: &str) -> Result<u32, ValidationError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid_value(field, text));
    }
    let value: u32 = text.parse().map_err(|_| invalid_value(field, text))?;
    let (min, max) = field.bounds();
    if value < min || value > max {
        return Err(error(
            field,
            format!(
                "{} value {} is out of range ({}-{})",
                field.label(),
                value,
                min,
                max
            ),
            ValidationCode::OutOfRange,
        ));
    }
    Ok(value)
}

fn invalid_value(field: CronField, text: &str) -> ValidationError {
    error(
        field,
        format!("{} '{}' is not a valid value", field.label(), text),
        ValidationCode::InvalidValue,
    )
}

fn error(field: CronField, message: String, code: ValidationCode) -> ValidationError {
    ValidationError::new(field.name(), message, code)
}
