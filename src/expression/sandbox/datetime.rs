//! `DateTime` helper and JS-style `Date` values.
//!
//! `DateTime` values carry a fixed offset and follow Luxon naming
//! (`plus`, `toFormat`, `startOf`, ...). `Date` values are always UTC.

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeDelta, TimeZone,
    Timelike, Utc, Weekday,
};

use super::interp::type_error;
use super::value::{date_to_iso, datetime_to_iso, Val};
use super::SandboxError;
use crate::schedule::zone::parse_zone;

pub(super) const DATE_METHODS: &[&str] = &[
    "getTime",
    "valueOf",
    "getFullYear",
    "getMonth",
    "getDate",
    "getDay",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
    "getUTCFullYear",
    "getUTCMonth",
    "getUTCDate",
    "getUTCDay",
    "getUTCHours",
    "getUTCMinutes",
    "getUTCSeconds",
    "getTimezoneOffset",
    "toISOString",
    "toJSON",
    "toString",
];

pub(super) const DATETIME_METHODS: &[&str] = &[
    "plus",
    "minus",
    "toFormat",
    "toISO",
    "toISODate",
    "toISOTime",
    "toMillis",
    "toSeconds",
    "toUnixInteger",
    "startOf",
    "endOf",
    "setZone",
    "toUTC",
    "toJSDate",
    "toString",
    "toJSON",
    "valueOf",
];

/// Duration units in the order they are applied.
const UNITS: &[&str] = &[
    "year",
    "quarter",
    "month",
    "week",
    "day",
    "hour",
    "minute",
    "second",
    "millisecond",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

fn invalid(what: &str) -> SandboxError {
    SandboxError::Runtime(format!("RangeError: Invalid {}", what))
}

fn first_arg(args: &[Val]) -> Val {
    args.first().cloned().unwrap_or(Val::Undefined)
}

/// Parse ISO-8601 text. Values without an offset are taken as UTC.
pub fn parse_iso(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    let naive_text = text.strip_suffix(['Z', 'z']).unwrap_or(text);
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_text, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(naive_text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

fn from_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(ms as i64).single()
}

pub(super) fn start_of_day(dt: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    start_of(&dt, "day").unwrap_or(dt)
}

/// `Date(...)`, `Date.*` and `DateTime.*` static calls.
pub(super) fn call_static(
    now: DateTime<Utc>,
    name: &str,
    args: &[Val],
) -> Result<Val, SandboxError> {
    match name {
        "Date" => Ok(Val::str(date_to_iso(&now))),
        "Date.now" => Ok(Val::Num(now.timestamp_millis() as f64)),
        "Date.parse" => Ok(Val::Num(
            parse_iso(&first_arg(args).to_display_string())
                .map_or(f64::NAN, |dt| dt.timestamp_millis() as f64),
        )),
        "DateTime.now" => Ok(Val::DateTime(now.fixed_offset())),
        "DateTime.fromISO" => parse_iso(&first_arg(args).to_display_string())
            .map(Val::DateTime)
            .ok_or_else(|| invalid("DateTime")),
        "DateTime.fromMillis" => from_millis(first_arg(args).to_number())
            .map(|dt| Val::DateTime(dt.fixed_offset()))
            .ok_or_else(|| invalid("DateTime")),
        "DateTime.fromJSDate" => match first_arg(args) {
            Val::Date(dt) => Ok(Val::DateTime(dt.fixed_offset())),
            _ => Err(invalid("DateTime")),
        },
        "DateTime.utc" => {
            if args.is_empty() {
                return Ok(Val::DateTime(now.fixed_offset()));
            }
            from_parts(args, 1)
                .map(|dt| Val::DateTime(dt.fixed_offset()))
                .ok_or_else(|| invalid("DateTime"))
        }
        _ => Err(type_error(format!("{} is not a function", name))),
    }
}

/// Build a UTC instant from `(year, month, day?, hour?, minute?, second?, ms?)`.
/// `month_base` is 0 for `Date` and 1 for `DateTime`.
fn from_parts(args: &[Val], month_base: u32) -> Option<DateTime<Utc>> {
    let part = |i: usize, default: f64| -> Option<i64> {
        let n = args.get(i).map_or(default, Val::to_number);
        n.is_finite().then_some(n.trunc() as i64)
    };
    let year = i32::try_from(part(0, f64::NAN)?).ok()?;
    let month = u32::try_from(part(1, f64::from(month_base))?).ok()? + 1 - month_base;
    let day = u32::try_from(part(2, 1.0)?).ok()?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(
        u32::try_from(part(3, 0.0)?).ok()?,
        u32::try_from(part(4, 0.0)?).ok()?,
        u32::try_from(part(5, 0.0)?).ok()?,
        u32::try_from(part(6, 0.0)?).ok()?,
    )?;
    Some(naive.and_utc())
}

/// `new Date(...)`
pub(super) fn construct_date(now: DateTime<Utc>, args: &[Val]) -> Result<Val, SandboxError> {
    let dt = match args {
        [] => Some(now),
        [Val::Num(ms)] => from_millis(*ms),
        [Val::Str(text)] => parse_iso(text).map(|dt| dt.with_timezone(&Utc)),
        [Val::Date(dt)] => Some(*dt),
        [Val::DateTime(dt)] => Some(dt.with_timezone(&Utc)),
        [_] => None,
        _ => from_parts(args, 0),
    };
    dt.map(Val::Date).ok_or_else(|| invalid("Date"))
}

pub(super) fn date_method(dt: &DateTime<Utc>, method: &str) -> Result<Val, SandboxError> {
    let num = |n: u32| Ok(Val::Num(f64::from(n)));
    match method {
        "getTime" | "valueOf" => Ok(Val::Num(dt.timestamp_millis() as f64)),
        "getFullYear" | "getUTCFullYear" => Ok(Val::Num(f64::from(dt.year()))),
        "getMonth" | "getUTCMonth" => num(dt.month0()),
        "getDate" | "getUTCDate" => num(dt.day()),
        "getDay" | "getUTCDay" => num(dt.weekday().num_days_from_sunday()),
        "getHours" | "getUTCHours" => num(dt.hour()),
        "getMinutes" | "getUTCMinutes" => num(dt.minute()),
        "getSeconds" | "getUTCSeconds" => num(dt.second()),
        "getMilliseconds" => num(dt.timestamp_subsec_millis()),
        "getTimezoneOffset" => Ok(Val::Num(0.0)),
        _ => Ok(Val::str(date_to_iso(dt))),
    }
}

/// Luxon-style properties: `year`, `month`, `weekday`, ...
pub(super) fn datetime_property(dt: &DateTime<FixedOffset>, name: &str) -> Option<Val> {
    let num = |n: u32| Some(Val::Num(f64::from(n)));
    match name {
        "year" => Some(Val::Num(f64::from(dt.year()))),
        "quarter" => num(dt.month0() / 3 + 1),
        "month" => num(dt.month()),
        "day" => num(dt.day()),
        "hour" => num(dt.hour()),
        "minute" => num(dt.minute()),
        "second" => num(dt.second()),
        "millisecond" => num(dt.timestamp_subsec_millis()),
        "weekday" => num(dt.weekday().number_from_monday()),
        "ordinal" => num(dt.ordinal()),
        "offset" => Some(Val::Num(f64::from(dt.offset().local_minus_utc() / 60))),
        "zoneName" => Some(Val::str(zone_name(dt.offset()))),
        "monthLong" => Some(Val::str(MONTH_NAMES[dt.month0() as usize])),
        "monthShort" => Some(Val::str(&MONTH_NAMES[dt.month0() as usize][..3])),
        "weekdayLong" => Some(Val::str(weekday_name(dt.weekday()))),
        "weekdayShort" => Some(Val::str(&weekday_name(dt.weekday())[..3])),
        "isValid" => Some(Val::Bool(true)),
        _ => None,
    }
}

pub(super) fn datetime_method(
    dt: &DateTime<FixedOffset>,
    method: &str,
    args: &[Val],
) -> Result<Val, SandboxError> {
    let unit = || first_arg(args).to_display_string();
    Ok(match method {
        "plus" => Val::DateTime(shift(dt, &first_arg(args), 1.0)?),
        "minus" => Val::DateTime(shift(dt, &first_arg(args), -1.0)?),
        "toFormat" => Val::str(format_tokens(dt, &first_arg(args).to_display_string())),
        "toISODate" => Val::str(dt.format("%Y-%m-%d").to_string()),
        "toISOTime" => Val::str(
            datetime_to_iso(dt)
                .split_once('T')
                .map(|(_, time)| time.to_string())
                .unwrap_or_default(),
        ),
        "toMillis" | "valueOf" => Val::Num(dt.timestamp_millis() as f64),
        "toSeconds" => Val::Num(dt.timestamp_millis() as f64 / 1000.0),
        "toUnixInteger" => Val::Num(dt.timestamp() as f64),
        "startOf" => Val::DateTime(start_of(dt, &unit()).ok_or_else(|| invalid("unit"))?),
        "endOf" => Val::DateTime(end_of(dt, &unit()).ok_or_else(|| invalid("unit"))?),
        "setZone" => {
            let zone = parse_zone(&unit()).map_err(|_| invalid("zone"))?;
            Val::DateTime(zone.convert(&dt.with_timezone(&Utc)))
        }
        "toUTC" => Val::DateTime(dt.with_timezone(&Utc).fixed_offset()),
        "toJSDate" => Val::Date(dt.with_timezone(&Utc)),
        _ => Val::str(datetime_to_iso(dt)),
    })
}

fn normalize_unit(unit: &str) -> Option<&'static str> {
    let singular = unit.strip_suffix('s').unwrap_or(unit);
    UNITS.iter().copied().find(|u| *u == singular)
}

/// Apply a duration object (`{days: 1, hours: 2}`) or millisecond count.
fn shift(
    dt: &DateTime<FixedOffset>,
    amount: &Val,
    sign: f64,
) -> Result<DateTime<FixedOffset>, SandboxError> {
    let map = match amount {
        Val::Num(ms) => return add_millis(*dt, ms * sign).ok_or_else(|| invalid("DateTime")),
        Val::Object(map) => map,
        _ => return Err(invalid("duration")),
    };

    let mut amounts = [0.0; 9];
    for (key, value) in map.iter() {
        let unit = normalize_unit(key).ok_or_else(|| invalid("unit"))?;
        if let Some(slot) = UNITS.iter().position(|u| *u == unit) {
            amounts[slot] += value.to_number() * sign;
        }
    }

    let mut out = *dt;
    for (unit, amount) in UNITS.iter().zip(amounts) {
        if amount == 0.0 {
            continue;
        }
        if !amount.is_finite() {
            return Err(invalid("duration"));
        }
        let shifted = match *unit {
            "year" => add_months(out, amount * 12.0),
            "quarter" => add_months(out, amount * 3.0),
            "month" => add_months(out, amount),
            "week" => add_millis(out, amount * 604_800_000.0),
            "day" => add_millis(out, amount * 86_400_000.0),
            "hour" => add_millis(out, amount * 3_600_000.0),
            "minute" => add_millis(out, amount * 60_000.0),
            "second" => add_millis(out, amount * 1_000.0),
            _ => add_millis(out, amount),
        };
        out = shifted.ok_or_else(|| invalid("DateTime"))?;
    }
    Ok(out)
}

fn add_millis(dt: DateTime<FixedOffset>, ms: f64) -> Option<DateTime<FixedOffset>> {
    if !ms.is_finite() {
        return None;
    }
    dt.checked_add_signed(TimeDelta::try_milliseconds(ms.round() as i64)?)
}

fn add_months(dt: DateTime<FixedOffset>, months: f64) -> Option<DateTime<FixedOffset>> {
    let whole = months.trunc();
    let count = Months::new(u32::try_from(whole.abs() as i64).ok()?);
    if whole >= 0.0 {
        dt.checked_add_months(count)
    } else {
        dt.checked_sub_months(count)
    }
}

fn start_of(dt: &DateTime<FixedOffset>, unit: &str) -> Option<DateTime<FixedOffset>> {
    let date = dt.date_naive();
    let naive = match normalize_unit(unit)? {
        "year" => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
        "quarter" => {
            NaiveDate::from_ymd_opt(date.year(), date.month0() / 3 * 3 + 1, 1)?.and_hms_opt(0, 0, 0)?
        }
        "month" => NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.and_hms_opt(0, 0, 0)?,
        "week" => date
            .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))?
            .and_hms_opt(0, 0, 0)?,
        "day" => date.and_hms_opt(0, 0, 0)?,
        "hour" => date.and_hms_opt(dt.hour(), 0, 0)?,
        "minute" => date.and_hms_opt(dt.hour(), dt.minute(), 0)?,
        "second" => date.and_hms_opt(dt.hour(), dt.minute(), dt.second())?,
        _ => return Some(*dt),
    };
    dt.offset().from_local_datetime(&naive).single()
}

fn end_of(dt: &DateTime<FixedOffset>, unit: &str) -> Option<DateTime<FixedOffset>> {
    let unit = normalize_unit(unit)?;
    let start = start_of(dt, unit)?;
    let next = match unit {
        "year" => start.checked_add_months(Months::new(12))?,
        "quarter" => start.checked_add_months(Months::new(3))?,
        "month" => start.checked_add_months(Months::new(1))?,
        "week" => start.checked_add_days(Days::new(7))?,
        "day" => start.checked_add_days(Days::new(1))?,
        "hour" => start + TimeDelta::hours(1),
        "minute" => start + TimeDelta::minutes(1),
        "second" => start + TimeDelta::seconds(1),
        _ => return Some(*dt),
    };
    Some(next - TimeDelta::milliseconds(1))
}

fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAY_NAMES[day.num_days_from_monday() as usize]
}

fn zone_name(offset: &FixedOffset) -> String {
    let seconds = offset.local_minus_utc();
    if seconds == 0 {
        return "UTC".to_string();
    }
    let sign = if seconds < 0 { '-' } else { '+' };
    let (hours, minutes) = (seconds.abs() / 3600, seconds.abs() % 3600 / 60);
    if minutes == 0 {
        format!("UTC{}{}", sign, hours)
    } else {
        format!("UTC{}{}:{:02}", sign, hours, minutes)
    }
}

fn offset_string(offset: &FixedOffset, colon: bool, short: bool) -> String {
    let seconds = offset.local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let (hours, minutes) = (seconds.abs() / 3600, seconds.abs() % 3600 / 60);
    match (short, colon) {
        (true, _) if minutes == 0 => format!("{}{}", sign, hours),
        (true, _) => format!("{}{}:{:02}", sign, hours, minutes),
        (false, true) => format!("{}{:02}:{:02}", sign, hours, minutes),
        (false, false) => format!("{}{:02}{:02}", sign, hours, minutes),
    }
}

/// Render Luxon format tokens (`yyyy-MM-dd HH:mm`, `'quoted'` literals).
pub fn format_tokens(dt: &DateTime<FixedOffset>, pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            let mut j = i + 1;
            while j < chars.len() && chars[j] != '\'' {
                out.push(chars[j]);
                j += 1;
            }
            if j == i + 1 && j < chars.len() {
                // '' is an escaped quote
                out.push('\'');
            }
            i = j + 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            out.push(c);
            i += 1;
            continue;
        }
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        out.push_str(&format_token(dt, c, run));
        i += run;
    }
    out
}

fn format_token(dt: &DateTime<FixedOffset>, token: char, run: usize) -> String {
    let hour12 = match dt.hour() % 12 {
        0 => 12,
        h => h,
    };
    let month = dt.month0() as usize;
    match (token, run) {
        ('y', 2) => format!("{:02}", dt.year().rem_euclid(100)),
        ('y', n) if n >= 4 => format!("{:04}", dt.year()),
        ('y', _) => dt.year().to_string(),
        ('M' | 'L', 1) => dt.month().to_string(),
        ('M' | 'L', 2) => format!("{:02}", dt.month()),
        ('M' | 'L', 3) => MONTH_NAMES[month][..3].to_string(),
        ('M' | 'L', _) => MONTH_NAMES[month].to_string(),
        ('d', 1) => dt.day().to_string(),
        ('d', _) => format!("{:02}", dt.day()),
        ('E' | 'c', 1) => dt.weekday().number_from_monday().to_string(),
        ('E' | 'c', 3) => weekday_name(dt.weekday())[..3].to_string(),
        ('E' | 'c', _) => weekday_name(dt.weekday()).to_string(),
        ('H', 1) => dt.hour().to_string(),
        ('H', _) => format!("{:02}", dt.hour()),
        ('h', 1) => hour12.to_string(),
        ('h', _) => format!("{:02}", hour12),
        ('m', 1) => dt.minute().to_string(),
        ('m', _) => format!("{:02}", dt.minute()),
        ('s', 1) => dt.second().to_string(),
        ('s', _) => format!("{:02}", dt.second()),
        ('S', 1) => dt.timestamp_subsec_millis().to_string(),
        ('S', _) => format!("{:03}", dt.timestamp_subsec_millis()),
        ('a', _) => if dt.hour() < 12 { "AM" } else { "PM" }.to_string(),
        ('Z', 1) => offset_string(dt.offset(), true, true),
        ('Z', 2) => offset_string(dt.offset(), true, false),
        ('Z', _) => offset_string(dt.offset(), false, false),
        ('z', _) => zone_name(dt.offset()),
        ('q', _) => (dt.month0() / 3 + 1).to_string(),
        ('o', 1) => dt.ordinal().to_string(),
        ('o', _) => format!("{:03}", dt.ordinal()),
        ('X', _) => dt.timestamp().to_string(),
        ('x', _) => dt.timestamp_millis().to_string(),
        (other, n) => other.to_string().repeat(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> DateTime<FixedOffset> {
        parse_iso(text).unwrap()
    }

    fn shifted(dt: &DateTime<FixedOffset>, method: &str, amount: Val) -> String {
        match datetime_method(dt, method, &[amount]).unwrap() {
            Val::DateTime(out) => datetime_to_iso(&out),
            other => panic!("unexpected {:?}", other),
        }
    }

    fn duration(unit: &str, n: f64) -> Val {
        let mut map = std::collections::BTreeMap::new();
        map.insert(unit.to_string(), Val::Num(n));
        Val::object(map)
    }

    #[test]
    fn test_parse_iso_variants() {
        assert_eq!(datetime_to_iso(&at("2024-01-01T10:00:00Z")), "2024-01-01T10:00:00.000Z");
        assert_eq!(datetime_to_iso(&at("2024-01-01T10:00Z")), "2024-01-01T10:00:00.000Z");
        assert_eq!(datetime_to_iso(&at("2024-01-01")), "2024-01-01T00:00:00.000Z");
        assert_eq!(
            datetime_to_iso(&at("2024-01-01T10:00:00+02:00")),
            "2024-01-01T10:00:00.000+02:00"
        );
        assert!(parse_iso("not a date").is_none());
    }

    #[test]
    fn test_plus_and_minus() {
        let dt = at("2024-01-31T12:00:00Z");
        assert_eq!(shifted(&dt, "plus", duration("days", 1.0)), "2024-02-01T12:00:00.000Z");
        assert_eq!(shifted(&dt, "plus", duration("month", 1.0)), "2024-02-29T12:00:00.000Z");
        assert_eq!(shifted(&dt, "minus", duration("hours", 13.0)), "2024-01-30T23:00:00.000Z");
        assert_eq!(shifted(&dt, "plus", Val::Num(1500.0)), "2024-01-31T12:00:01.500Z");
        assert!(datetime_method(&dt, "plus", &[duration("fortnights", 1.0)]).is_err());
    }

    #[test]
    fn test_to_format_tokens() {
        let dt = at("2024-03-05T14:07:09.042Z");
        assert_eq!(format_tokens(&dt, "yyyy-MM-dd HH:mm:ss"), "2024-03-05 14:07:09");
        assert_eq!(format_tokens(&dt, "d MMM yy, h:mm a"), "5 Mar 24, 2:07 PM");
        assert_eq!(format_tokens(&dt, "EEEE, MMMM d"), "Tuesday, March 5");
        assert_eq!(format_tokens(&dt, "yyyy'T'HH"), "2024T14");
        assert_eq!(format_tokens(&dt, "h''mm"), "2'07");
        assert_eq!(format_tokens(&dt, "SSS ZZ"), "042 +00:00");
    }

    #[test]
    fn test_start_and_end_of() {
        let dt = at("2024-05-15T13:45:30Z");
        assert_eq!(datetime_to_iso(&start_of(&dt, "month").unwrap()), "2024-05-01T00:00:00.000Z");
        assert_eq!(datetime_to_iso(&start_of(&dt, "week").unwrap()), "2024-05-13T00:00:00.000Z");
        assert_eq!(datetime_to_iso(&end_of(&dt, "day").unwrap()), "2024-05-15T23:59:59.999Z");
        assert!(start_of(&dt, "eon").is_none());
    }

    #[test]
    fn test_set_zone_and_properties() {
        let dt = at("2024-01-01T10:00:00Z");
        let Val::DateTime(tokyo) =
            datetime_method(&dt, "setZone", &[Val::str("Asia/Tokyo")]).unwrap()
        else {
            panic!("expected DateTime");
        };
        assert_eq!(datetime_to_iso(&tokyo), "2024-01-01T19:00:00.000+09:00");
        assert!(matches!(datetime_property(&tokyo, "hour"), Some(Val::Num(h)) if h == 19.0));
        assert!(matches!(datetime_property(&dt, "weekday"), Some(Val::Num(d)) if d == 1.0));
        assert!(datetime_method(&dt, "setZone", &[Val::str("Mars/Base")]).is_err());
    }

    #[test]
    fn test_js_date() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let Val::Date(dt) = construct_date(now, &[Val::Num(0.0)]).unwrap() else {
            panic!("expected Date");
        };
        assert_eq!(date_to_iso(&dt), "1970-01-01T00:00:00.000Z");

        let Val::Date(dt) = construct_date(now, &[Val::Num(2024.0), Val::Num(1.0), Val::Num(15.0)]).unwrap() else {
            panic!("expected Date");
        };
        assert!(matches!(date_method(&dt, "getMonth").unwrap(), Val::Num(m) if m == 1.0));
        assert!(matches!(date_method(&dt, "getDay").unwrap(), Val::Num(d) if d == 4.0));
        assert!(construct_date(now, &[Val::str("garbage")]).is_err());
    }
}
