//! Human-readable cron descriptions.

use super::cron::{CronAtom, CronField, ParsedCron};

pub const INVALID_DESCRIPTION: &str = "Invalid cron expression";

const COMMON_PATTERNS: &[(&str, &str)] = &[
    ("* * * * *", "Every minute"),
    ("*/5 * * * *", "Every 5 minutes"),
    ("*/10 * * * *", "Every 10 minutes"),
    ("*/15 * * * *", "Every 15 minutes"),
    ("*/30 * * * *", "Every 30 minutes"),
    ("0 * * * *", "Every hour"),
    ("0 */2 * * *", "Every 2 hours"),
    ("0 */6 * * *", "Every 6 hours"),
    ("0 */12 * * *", "Every 12 hours"),
    ("0 0 * * *", "Every day at midnight"),
    ("0 12 * * *", "Every day at noon"),
    ("0 9 * * *", "Every day at 9:00 AM"),
    ("0 9 * * 1-5", "Every weekday at 9:00 AM"),
    ("0 0 * * 0", "Every Sunday at midnight"),
    ("0 0 * * 1", "Every Monday at midnight"),
    ("0 0 1 * *", "On the first day of every month at midnight"),
    ("0 0 1 1 *", "Every year on January 1st at midnight"),
];

const MONTHS_SHORT: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKDAYS_SHORT: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Describe `cron` in English.
///
/// Well-known schedules get a fixed phrase; anything else is described
/// field by field. Invalid input yields [`INVALID_DESCRIPTION`].
pub fn describe_cron_expression(cron: &str) -> String {
    let normalized = cron.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some((_, text)) = COMMON_PATTERNS.iter().find(|(p, _)| *p == normalized) {
        return (*text).to_string();
    }

    match ParsedCron::parse(&normalized) {
        Ok(parsed) => compose(&parsed),
        Err(_) => INVALID_DESCRIPTION.to_string(),
    }
}

fn compose(parsed: &ParsedCron) -> String {
    let mut parts = vec![time_phrase(&parsed.minute, &parsed.hour)];
    parts.extend(day_of_month_phrase(&parsed.day_of_month));
    parts.extend(month_phrase(&parsed.month));
    parts.extend(day_of_week_phrase(&parsed.day_of_week));
    parts.join(", ")
}

fn time_phrase(minute: &CronAtom, hour: &CronAtom) -> String {
    match (minute, hour) {
        (CronAtom::Value { value: m }, CronAtom::Value { value: h }) => {
            format!("At {}", clock_time(*h, *m))
        }
        (CronAtom::Value { value: m }, CronAtom::List { items })
            if items.iter().all(|i| matches!(i, CronAtom::Value { .. })) =>
        {
            let times: Vec<String> = items
                .iter()
                .filter_map(|i| match i {
                    CronAtom::Value { value: h } => Some(clock_time(*h, *m)),
                    _ => None,
                })
                .collect();
            format!("At {}", times.join(", "))
        }
        _ => match hour_phrase(hour) {
            Some(hours) => format!("{}, {}", minute_phrase(minute), hours),
            None => minute_phrase(minute),
        },
    }
}

fn minute_phrase(atom: &CronAtom) -> String {
    match atom {
        CronAtom::Wildcard => "Every minute".to_string(),
        CronAtom::Step { range: None, step } => format!("Every {}", plural(*step, "minute")),
        CronAtom::Step {
            range: Some((a, b)),
            step,
        } => format!(
            "Every {} from minute {} through {} past the hour",
            plural(*step, "minute"),
            a,
            b
        ),
        CronAtom::Value { value: 0 } => "At the start of the hour".to_string(),
        CronAtom::Value { value } => format!("At {} past the hour", plural(*value, "minute")),
        CronAtom::Range { start, end } => {
            format!("Every minute from {} through {} past the hour", start, end)
        }
        CronAtom::List { .. } => format!(
            "At minutes {} past the hour",
            label(CronField::Minute, atom)
        ),
    }
}

fn hour_phrase(atom: &CronAtom) -> Option<String> {
    Some(match atom {
        CronAtom::Wildcard => return None,
        CronAtom::Step { range: None, step } => format!("every {}", plural(*step, "hour")),
        CronAtom::Step {
            range: Some((a, b)),
            step,
        } => format!(
            "every {} from {} through {}",
            plural(*step, "hour"),
            hour_label(*a),
            hour_label(*b)
        ),
        CronAtom::Range { start, end } => {
            format!("between {} and {}", hour_label(*start), hour_label(*end))
        }
        CronAtom::Value { value } => format!("during the {} hour", hour_label(*value)),
        CronAtom::List { .. } => format!("during {}", label(CronField::Hour, atom)),
    })
}

fn day_of_month_phrase(atom: &CronAtom) -> Option<String> {
    Some(match atom {
        CronAtom::Wildcard => return None,
        CronAtom::Value { value } => format!("on day {} of the month", value),
        CronAtom::Range { start, end } => {
            format!("on days {} through {} of the month", start, end)
        }
        CronAtom::List { .. } => format!(
            "on days {} of the month",
            label(CronField::DayOfMonth, atom)
        ),
        CronAtom::Step { range: None, step } => format!("every {}", plural(*step, "day")),
        CronAtom::Step {
            range: Some((a, b)),
            step,
        } => format!("every {} from day {} through {}", plural(*step, "day"), a, b),
    })
}

fn month_phrase(atom: &CronAtom) -> Option<String> {
    let field = CronField::Month;
    Some(match atom {
        CronAtom::Wildcard => return None,
        CronAtom::Value { .. } | CronAtom::List { .. } => format!("only in {}", label(field, atom)),
        CronAtom::Range { start, end } => {
            format!("{} through {}", name(field, *start), name(field, *end))
        }
        CronAtom::Step { range: None, step } => format!("every {}", plural(*step, "month")),
        CronAtom::Step {
            range: Some((a, b)),
            step,
        } => format!(
            "every {} from {} through {}",
            plural(*step, "month"),
            name(field, *a),
            name(field, *b)
        ),
    })
}

fn day_of_week_phrase(atom: &CronAtom) -> Option<String> {
    let field = CronField::DayOfWeek;
    Some(match atom {
        CronAtom::Wildcard => return None,
        CronAtom::Value { .. } | CronAtom::List { .. } => format!("only on {}", label(field, atom)),
        CronAtom::Range { start, end } => {
            format!("{} through {}", name(field, *start), name(field, *end))
        }
        CronAtom::Step { range: None, step } => {
            format!("every {} of the week", plural(*step, "day"))
        }
        CronAtom::Step {
            range: Some((a, b)),
            step,
        } => format!(
            "every {} of the week from {} through {}",
            plural(*step, "day"),
            name(field, *a),
            name(field, *b)
        ),
    })
}

/// Compact rendering of an atom using the field's value names.
fn label(field: CronField, atom: &CronAtom) -> String {
    match atom {
        CronAtom::Wildcard => "*".to_string(),
        CronAtom::Value { value } => name(field, *value),
        CronAtom::Range { start, end } => format!("{}-{}", name(field, *start), name(field, *end)),
        CronAtom::Step { range: None, step } => format!("*/{}", step),
        CronAtom::Step {
            range: Some((a, b)),
            step,
        } => format!("{}-{}/{}", name(field, *a), name(field, *b), step),
        CronAtom::List { items } => items
            .iter()
            .map(|item| label(field, item))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn name(field: CronField, value: u32) -> String {
    let index = value as usize;
    match field {
        CronField::Month => MONTHS_SHORT
            .get(index.wrapping_sub(1))
            .map_or_else(|| value.to_string(), |m| (*m).to_string()),
        CronField::DayOfWeek => WEEKDAYS_SHORT
            .get(index)
            .map_or_else(|| value.to_string(), |d| (*d).to_string()),
        CronField::Hour => hour_label(value),
        _ => value.to_string(),
    }
}

fn twelve_hour(hour: u32) -> (u32, &'static str) {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let h = match hour % 12 {
        0 => 12,
        h => h,
    };
    (h, suffix)
}

/// `9 AM`, `12 PM`
fn hour_label(hour: u32) -> String {
    let (h, suffix) = twelve_hour(hour);
    format!("{} {}", h, suffix)
}

/// `9:05 AM`
fn clock_time(hour: u32, minute: u32) -> String {
    let (h, suffix) = twelve_hour(hour);
    format!("{}:{:02} {}", h, minute, suffix)
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_patterns() {
        assert_eq!(describe_cron_expression("* * * * *"), "Every minute");
        assert_eq!(describe_cron_expression("0 9 * * 1-5"), "Every weekday at 9:00 AM");
        assert_eq!(describe_cron_expression("  0   0 * * * "), "Every day at midnight");
        assert_eq!(
            describe_cron_expression("0 0 1 * *"),
            "On the first day of every month at midnight"
        );
    }

    #[test]
    fn test_compositional_descriptions() {
        assert_eq!(describe_cron_expression("30 14 * * 1"), "At 2:30 PM, only on Mon");
        assert_eq!(
            describe_cron_expression("15 10 1 * *"),
            "At 10:15 AM, on day 1 of the month"
        );
        assert_eq!(
            describe_cron_expression("*/5 9-17 * * 1-5"),
            "Every 5 minutes, between 9 AM and 5 PM, Mon through Fri"
        );
        assert_eq!(
            describe_cron_expression("0 0,12 * 1,7 *"),
            "At 12:00 AM, 12:00 PM, only in Jan, Jul"
        );
        assert_eq!(
            describe_cron_expression("5 */3 * * *"),
            "At 5 minutes past the hour, every 3 hours"
        );
        assert_eq!(
            describe_cron_expression("0 22 * 12 0,6"),
            "At 10:00 PM, only in Dec, only on Sun, Sat"
        );
    }

    #[test]
    fn test_invalid_expression() {
        assert_eq!(describe_cron_expression("nonsense"), INVALID_DESCRIPTION);
        assert_eq!(describe_cron_expression("61 * * * *"), INVALID_DESCRIPTION);
    }

    #[test]
    fn test_twelve_hour_labels() {
        assert_eq!(hour_label(0), "12 AM");
        assert_eq!(hour_label(12), "12 PM");
        assert_eq!(hour_label(23), "11 PM");
        assert_eq!(clock_time(9, 5), "9:05 AM");
    }
}
