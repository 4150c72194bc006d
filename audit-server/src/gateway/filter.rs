//! Per-connection filter matching
//!
//! Logs arrive as opaque JSON objects. Every populated filter field must hold.
//! A time bound that cannot be read as a point in time does not constrain.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::Value;
use shared::LogFilter;

/// Fields searched by the free-text term, in order
const SEARCH_FIELDS: [&str; 5] = ["message", "actorName", "action", "module", "service"];

/// No filter matches everything.
pub fn matches(filter: Option<&LogFilter>, log: &Value) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    if let Some(event_type) = &filter.event_type {
        let actual = str_field(log, "action").or_else(|| str_field(log, "type"));
        if actual != Some(event_type.as_str()) {
            return false;
        }
    }

    if let Some(level) = &filter.level
        && str_field(log, "level") != Some(level.as_str())
    {
        return false;
    }

    if let Some(term) = &filter.search
        && !search_matches(log, term)
    {
        return false;
    }

    let start = filter.start_date.as_ref().and_then(|v| parse_instant(v, Bound::Start));
    let end = filter.end_date.as_ref().and_then(|v| parse_instant(v, Bound::End));
    if start.is_some() || end.is_some() {
        let Some(at) = log_timestamp(log) else {
            return false;
        };
        if start.is_some_and(|start| at < start) {
            return false;
        }
        if end.is_some_and(|end| at > end) {
            return false;
        }
    }

    true
}

fn str_field<'a>(log: &'a Value, key: &str) -> Option<&'a str> {
    log.get(key).and_then(Value::as_str)
}

fn search_matches(log: &Value, term: &str) -> bool {
    let needle = term.to_lowercase();
    SEARCH_FIELDS
        .iter()
        .filter_map(|key| str_field(log, key))
        .any(|value| value.to_lowercase().contains(&needle))
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// `timestamp`, falling back to `createdAt`
fn log_timestamp(log: &Value) -> Option<DateTime<Utc>> {
    let raw = log.get("timestamp").or_else(|| log.get("createdAt"))?;
    parse_instant(raw, Bound::Start)
}

/// RFC 3339 text, a plain `YYYY-MM-DD` date or epoch millis.
///
/// A plain date covers the whole UTC day: it opens at midnight as a start
/// bound and closes at the last millisecond as an end bound.
fn parse_instant(raw: &Value, bound: Bound) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            let day = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            let time = match bound {
                Bound::Start => NaiveTime::from_hms_opt(0, 0, 0)?,
                Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?,
            };
            Some(day.and_time(time).and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
