//! Observation date parsing.
//!
//! Accepted forms, tried in order:
//!
//! | Form | Example | Full datetime |
//! |------|---------|---------------|
//! | Calendar date | `2020-11-21` | no |
//! | Offset datetime | `2020-11-21T11:12:00.123+01:00`, `...Z`, `...+0100` | yes |
//! | Local datetime | `2020-11-21T11:12:00` | yes |
//!
//! Forms without an explicit offset are interpreted in the configured
//! default offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%:z"];
const LOCAL_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"];

/// A parsed observation date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    /// The instant, normalised to UTC
    pub instant: DateTime<Utc>,
    /// The offset the date was expressed in
    pub offset: FixedOffset,
    /// Whether the source text carried a time component
    pub is_datetime: bool,
}

impl ParsedDate {
    /// Offset in its storage form (`Z` or `+HH:MM`)
    pub fn offset_string(&self) -> String {
        format_offset(self.offset)
    }
}

/// Parse an observation date, returning `None` when no accepted form matches
pub fn parse_date(value: &str, default_offset: FixedOffset) -> Option<ParsedDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let local = date.and_hms_opt(0, 0, 0)?;
        let zoned = default_offset.from_local_datetime(&local).single()?;
        return Some(ParsedDate {
            instant: zoned.with_timezone(&Utc),
            offset: default_offset,
            is_datetime: false,
        });
    }

    if let Some(zoned) = parse_offset_datetime(value) {
        return Some(ParsedDate {
            instant: zoned.with_timezone(&Utc),
            offset: *zoned.offset(),
            is_datetime: true,
        });
    }

    LOCAL_FORMATS.iter().find_map(|format| {
        let local = NaiveDateTime::parse_from_str(value, format).ok()?;
        let zoned = default_offset.from_local_datetime(&local).single()?;
        Some(ParsedDate {
            instant: zoned.with_timezone(&Utc),
            offset: default_offset,
            is_datetime: true,
        })
    })
}

fn parse_offset_datetime(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(value, format).ok())
}

/// Parse a UTC offset such as `Z`, `UTC`, `+01:00`, `-0530` or `+02`
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, digits) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 18 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Storage form of an offset: `Z` for UTC, `+HH:MM` otherwise
pub fn format_offset(offset: FixedOffset) -> String {
    if offset.local_minus_utc() == 0 {
        "Z".to_string()
    } else {
        offset.to_string()
    }
}
