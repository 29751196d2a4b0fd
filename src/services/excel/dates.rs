//! Date normalisation and whole-month arithmetic.
//!
//! Parsing never fails loudly: anything that cannot be read as a calendar
//! date comes back as `None`, and it is up to the caller to log it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime};

use super::types::{CanonicalDate, CellValue};

/// Formats tried, in order, for strings containing `-`.
const ISO_DATE_FORMATS: [&str; 1] = ["%Y-%m-%d"];
const ISO_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Serial dates count from this day, shifted by [`SERIAL_OFFSET_DAYS`].
const SERIAL_EPOCH: (i32, u32, u32) = (1900, 1, 1);
/// Covers the phantom 1900-02-29 and the 1-based day count.
const SERIAL_OFFSET_DAYS: f64 = 2.0;
const MAX_SERIAL_DAYS: f64 = 100_000_000.0;

pub fn parse(raw: &CellValue) -> Option<CanonicalDate> {
    match raw {
        CellValue::Empty | CellValue::Bool(_) => None,
        CellValue::DateTime(serial) => from_serial(*serial),
        CellValue::Duration(_) => None,
        CellValue::Text(s) => parse_text(s),
        CellValue::Number(serial) => from_serial(*serial),
    }
}

fn parse_text(raw: &str) -> Option<CanonicalDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for sep in ['.', '/'] {
        if s.contains(sep) {
            let parts: Vec<&str> = s.split(sep).collect();
            if parts.len() == 3 {
                return day_month_year(&parts);
            }
        }
    }

    if s.contains('-') {
        return parse_iso(s);
    }

    None
}

/// Day, month and year must name a real calendar day: `31.02.2025` is
/// `None`, it does not roll over into March.
fn day_month_year(parts: &[&str]) -> Option<CanonicalDate> {
    let day: u32 = parts[0].trim().parse().ok()?;
    let month: u32 = parts[1].trim().parse().ok()?;
    let year: i32 = parts[2].trim().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_iso(s: &str) -> Option<CanonicalDate> {
    for format in ISO_DATE_FORMATS.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for format in ISO_DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    None
}

/// Converts a spreadsheet serial number: `1900-01-01 + (serial - 2)` days,
/// dropping any time-of-day fraction.
pub fn from_serial(serial: f64) -> Option<CanonicalDate> {
    if !serial.is_finite() {
        return None;
    }
    let offset = (serial - SERIAL_OFFSET_DAYS).floor();
    if offset.abs() > MAX_SERIAL_DAYS {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)?.checked_add_signed(Duration::days(offset as i64))
}

/// Date and time of day of a serial, on the same day count as
/// [`from_serial`]. The fraction is rounded to the nearest second.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let midnight = from_serial(serial)?.and_hms_opt(0, 0, 0)?;
    let seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    midnight.checked_add_signed(Duration::seconds(seconds))
}

/// Whole months from `start` to `end`. The last month only counts once
/// `end` has reached `start`'s day of month. Negative results are kept.
pub fn months_between(start: Option<CanonicalDate>, end: Option<CanonicalDate>) -> Option<i32> {
    let (start, end) = (start?, end?);
    let months = (end.year() - start.year()) * 12 + (end.month() as i32 - start.month() as i32);
    if end.day() < start.day() {
        Some(months - 1)
    } else {
        Some(months)
    }
}
