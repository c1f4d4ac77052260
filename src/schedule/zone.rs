//! Time zones for schedule matching and `DateTime.setZone`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// A zone a schedule is evaluated in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Zone {
    #[default]
    Utc,
    Fixed(FixedOffset),
    Named(Tz),
}

impl Zone {
    /// Wall-clock time of `instant` in this zone.
    pub fn convert(&self, instant: &DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            Zone::Utc => instant.fixed_offset(),
            Zone::Fixed(offset) => instant.with_timezone(offset),
            Zone::Named(tz) => {
                let local = instant.with_timezone(tz);
                local.with_timezone(&local.offset().fix())
            }
        }
    }

    /// `local` read as wall-clock time in this zone.
    ///
    /// Ambiguous times take the earlier offset. Times skipped by a DST jump
    /// keep their wall-clock fields with the offset in force just before.
    pub fn from_local(&self, local: &NaiveDateTime) -> DateTime<FixedOffset> {
        let offset = match self {
            Zone::Utc => return local.and_utc().fixed_offset(),
            Zone::Fixed(offset) => *offset,
            Zone::Named(tz) => match tz.offset_from_local_datetime(local).earliest() {
                Some(offset) => offset.fix(),
                None => tz.offset_from_utc_datetime(local).fix(),
            },
        };
        local
            .and_local_timezone(offset)
            .single()
            .unwrap_or_else(|| local.and_utc().fixed_offset())
    }

    pub fn name(&self) -> String {
        match self {
            Zone::Utc => "UTC".to_string(),
            Zone::Fixed(offset) => offset.to_string(),
            Zone::Named(tz) => tz.name().to_string(),
        }
    }
}

/// Parse `UTC`, an IANA name, or a `+HH:MM`/`+HHMM` offset.
pub fn parse_zone(raw: &str) -> Result<Zone> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(Zone::Utc);
    }

    if let Ok(tz) = trimmed.parse::<Tz>() {
        return Ok(Zone::Named(tz));
    }

    if let Some(offset) = parse_fixed_offset(trimmed) {
        return Ok(Zone::Fixed(offset));
    }

    Err(Error::Parse(format!(
        "Invalid timezone '{}'. Use IANA name (e.g. 'Europe/Berlin') or UTC offset (e.g. '+02:00')",
        raw
    )))
}

fn parse_fixed_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = if let Some(rest) = raw.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = raw.strip_prefix('-') {
        (-1, rest)
    } else {
        return None;
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if rest.len() == 4 && rest.is_ascii() => {
            (rest[0..2].parse::<i32>().ok()?, rest[2..4].parse::<i32>().ok()?)
        }
        None if rest.len() <= 2 => (rest.parse::<i32>().ok()?, 0),
        None => return None,
    };

    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_parse_zone_forms() {
        assert_eq!(parse_zone("utc").unwrap(), Zone::Utc);
        assert_eq!(parse_zone(" UTC ").unwrap(), Zone::Utc);
        assert!(matches!(parse_zone("Asia/Kuala_Lumpur").unwrap(), Zone::Named(_)));
        assert_eq!(
            parse_zone("+08:00").unwrap(),
            Zone::Fixed(FixedOffset::east_opt(8 * 3600).unwrap())
        );
        assert_eq!(
            parse_zone("-0530").unwrap(),
            Zone::Fixed(FixedOffset::west_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert!(parse_zone("Mars/Olympus").is_err());
        assert!(parse_zone("+25:00").is_err());
    }

    #[test]
    fn test_convert_named_zone_tracks_dst() {
        let zone = parse_zone("Europe/Berlin").unwrap();
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();

        assert_eq!(zone.convert(&winter).hour(), 13);
        assert_eq!(zone.convert(&summer).hour(), 14);
        assert_eq!(zone.convert(&summer).timestamp(), summer.timestamp());
    }

    #[test]
    fn test_from_local_keeps_wall_clock() {
        let berlin = parse_zone("Europe/Berlin").unwrap();
        let noon = NaiveDateTime::parse_from_str("2024-07-15 12:00", "%Y-%m-%d %H:%M").unwrap();
        let local = berlin.from_local(&noon);
        assert_eq!(local.hour(), 12);
        assert_eq!(local.offset().local_minus_utc(), 2 * 3600);

        // 02:30 does not exist on 2024-03-31 in Berlin
        let skipped = NaiveDateTime::parse_from_str("2024-03-31 02:30", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(berlin.from_local(&skipped).hour(), 2);

        assert_eq!(Zone::Utc.from_local(&noon).offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_zone_name() {
        assert_eq!(Zone::Utc.name(), "UTC");
        assert_eq!(parse_zone("America/New_York").unwrap().name(), "America/New_York");
    }
}
