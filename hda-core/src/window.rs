//! Time window resolution from free-form date/time tokens.
//!
//! A window is specified as 1–4 whitespace/comma-separated tokens in the
//! shape `[date] [time] [date] [time]`. A date token with no following time
//! token defaults to `0000` in the start position and `2400` (end of day)
//! in the end position, so `resolve(&["01Jan2020", "02Jan2020"])` spans
//! midnight of January 1 through the end of January 2.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;

use crate::error::{DataAccessError, Result};

/// Date formats accepted for window and version-date tokens.
const DATE_FORMATS: &[&str] = &["%d%b%Y", "%Y-%m-%d", "%Y/%m/%d"];

/// A resolved `(start, end)` pair. Both bounds are zone-naive; the zone is
/// applied at the moment a read or write resolves its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(DataAccessError::invalid(format!(
                "time window end {end} precedes start {start}"
            )));
        }
        Ok(TimeWindow { start, end })
    }
}

fn parse_date(token: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}

/// A parsed time-of-day token. `2400` is legal in the end position and
/// resolves to the start of the following day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeToken {
    At(NaiveTime),
    EndOfDay,
}

fn parse_time(token: &str) -> Option<TimeToken> {
    let compact = token.replace(':', "");
    if compact.len() != 4 || !compact.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if compact == "2400" {
        return Some(TimeToken::EndOfDay);
    }
    let hour: u32 = compact[..2].parse().ok()?;
    let minute: u32 = compact[2..].parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0).map(TimeToken::At)
}

fn apply(date: NaiveDate, time: TimeToken) -> NaiveDateTime {
    match time {
        TimeToken::At(t) => date.and_time(t),
        TimeToken::EndOfDay => (date + chrono::Duration::days(1)).and_time(NaiveTime::MIN),
    }
}

/// Resolve a token sequence into a [`TimeWindow`].
///
/// Fails with `InvalidArgument` when the token count or shape does not
/// resolve to exactly two complete date-times.
pub fn resolve<S: AsRef<str>>(tokens: &[S]) -> Result<TimeWindow> {
    let joined = tokens
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    resolve_str(&joined)
}

/// Resolve a single whitespace/comma-separated string into a [`TimeWindow`].
pub fn resolve_str(input: &str) -> Result<TimeWindow> {
    let bad = || DataAccessError::invalid(format!("not a valid time window: \"{input}\""));
    let cleaned = input.replace(',', " ");
    let fields: Vec<&str> = cleaned.split_whitespace().collect();

    let mut i = 0;
    let start_date = fields.get(i).and_then(|t| parse_date(t)).ok_or_else(bad)?;
    i += 1;
    let start_time = match fields.get(i).and_then(|t| parse_time(t)) {
        Some(TimeToken::EndOfDay) => return Err(bad()),
        Some(t) => {
            i += 1;
            t
        }
        None => TimeToken::At(NaiveTime::MIN),
    };
    let end_date = fields.get(i).and_then(|t| parse_date(t)).ok_or_else(bad)?;
    i += 1;
    let end_time = match fields.get(i).and_then(|t| parse_time(t)) {
        Some(t) => {
            i += 1;
            t
        }
        None => TimeToken::EndOfDay,
    };
    if i != fields.len() {
        return Err(bad());
    }
    TimeWindow::new(apply(start_date, start_time), apply(end_date, end_time))
}

/// Parse a date-with-optional-time string (`01Jan2020`, `01Jan2020 0615`,
/// `2020-01-01 06:15`) into a naive date-time. A missing time means midnight.
pub fn parse_date_time(input: &str) -> Result<NaiveDateTime> {
    let bad = || DataAccessError::invalid(format!("not a valid date/time: \"{input}\""));
    let cleaned = input.replace(',', " ");
    let mut fields = cleaned.split_whitespace();
    let date = fields.next().and_then(parse_date).ok_or_else(bad)?;
    let time = match fields.next() {
        Some(tok) => parse_time(tok).ok_or_else(bad)?,
        None => TimeToken::At(NaiveTime::MIN),
    };
    if fields.next().is_some() {
        return Err(bad());
    }
    Ok(apply(date, time))
}

/// Format a naive date-time in the `ddMonyyyy HHMM` style used for window
/// echo-back and diagnostics.
pub fn format_date_time(t: &NaiveDateTime) -> String {
    format!(
        "{:02}{}{:04} {:02}{:02}",
        t.day(),
        match t.month() {
            1 => "Jan", 2 => "Feb", 3 => "Mar", 4 => "Apr", 5 => "May", 6 => "Jun",
            7 => "Jul", 8 => "Aug", 9 => "Sep", 10 => "Oct", 11 => "Nov", _ => "Dec",
        },
        t.year(),
        t.hour(),
        t.minute()
    )
}

/// Interpret a zone-naive time as local time in `tz` and express it in UTC.
/// An ambiguous local time (fall-back transition) takes the earlier mapping;
/// a nonexistent local time (spring-forward gap) is an error.
pub fn to_utc(tz: Tz, local: NaiveDateTime) -> Result<NaiveDateTime> {
    match tz.from_local_datetime(&local) {
        chrono::LocalResult::Single(t) => Ok(t.naive_utc()),
        chrono::LocalResult::Ambiguous(earlier, _) => Ok(earlier.naive_utc()),
        chrono::LocalResult::None => Err(DataAccessError::invalid(format!(
            "{local} does not exist in time zone {}",
            tz.name()
        ))),
    }
}

/// Express a UTC time as zone-naive local time in `tz`.
pub fn from_utc(tz: Tz, utc: NaiveDateTime) -> NaiveDateTime {
    tz.from_utc_datetime(&utc).naive_local()
}
