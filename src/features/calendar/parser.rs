//! # Calendar Parser
//!
//! Line-oriented reader for iCalendar feeds. Produces one [`CalendarEvent`]
//! per well-formed `VEVENT`; malformed events are dropped and parsing
//! continues with the next one.
//!
//! - **Version**: 1.3.0
//! - **Since**: 0.4.0
//!
//! ## Changelog
//! - 1.3.0: Empty values count as present; only a missing required key drops an event
//! - 1.2.0: Single-pass unescaping
//! - 1.1.0: Properties of nested components (VALARM) no longer leak into the event
//! - 1.0.0: Initial release

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::debug;
use std::collections::HashMap;

/// An event as read from a remote feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    /// The event's UID
    pub origin_key: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub recurrence_rule: Option<String>,

    /// DTSTART carried no time of day
    pub all_day: bool,
}

/// Parse the full text of a feed
pub fn parse(text: &str) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    let mut nested_depth = 0usize;

    for line in unfold(text) {
        let Some((key, value)) = split_property(&line) else {
            continue;
        };

        match (key, value) {
            ("BEGIN", "VEVENT") if current.is_none() => {
                current = Some(HashMap::new());
                nested_depth = 0;
            }
            ("END", "VEVENT") if nested_depth == 0 => {
                if let Some(properties) = current.take() {
                    match build_event(&properties) {
                        Some(event) => events.push(event),
                        None => debug!("Dropping VEVENT missing UID, SUMMARY or a valid DTSTART"),
                    }
                }
            }
            ("BEGIN", _) if current.is_some() => nested_depth += 1,
            ("END", _) if current.is_some() && nested_depth > 0 => nested_depth -= 1,
            _ => {
                if let Some(properties) = current.as_mut() {
                    if nested_depth == 0 {
                        properties.insert(key.to_string(), value.to_string());
                    }
                }
            }
        }
    }

    events
}

/// Join folded lines: a line starting with a space or tab continues the
/// previous one, with its leading whitespace run removed.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if raw.starts_with([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(raw.trim_start_matches([' ', '\t']));
            }
            continue;
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }

    lines
}

/// Split a logical line into its bare key and value, dropping parameters
fn split_property(line: &str) -> Option<(&str, &str)> {
    let (lhs, value) = line.split_once(':')?;
    let key = lhs.split(';').next().unwrap_or(lhs);
    Some((key, value))
}

fn build_event(properties: &HashMap<String, String>) -> Option<CalendarEvent> {
    let origin_key = properties.get("UID")?.clone();
    let title = unescape(properties.get("SUMMARY")?);
    let (start, all_day) = parse_date(properties.get("DTSTART")?)?;

    Some(CalendarEvent {
        origin_key,
        title,
        description: properties.get("DESCRIPTION").map(|d| unescape(d)),
        start,
        end: properties
            .get("DTEND")
            .and_then(|value| parse_date(value))
            .map(|(end, _)| end),
        recurrence_rule: properties.get("RRULE").cloned(),
        all_day,
    })
}

/// Timed values (with or without a trailing `Z`) are read as UTC; date-only
/// values are UTC midnight and flagged all-day.
pub fn parse_date(value: &str) -> Option<(DateTime<Utc>, bool)> {
    let value = value.trim();
    let timed = value.strip_suffix('Z').unwrap_or(value);

    if let Ok(naive) = NaiveDateTime::parse_from_str(timed, "%Y%m%dT%H%M%S") {
        return Some((naive.and_utc(), false));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
        return Some((date.and_hms_opt(0, 0, 0)?.and_utc(), true));
    }
    None
}

/// Decode `\n`, `\,`, `\;` and `\\` in one left-to-right scan. Unknown
/// escapes are kept as written.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
