//! Calendar export. Emits reminders as an iCalendar document that
//! [`parse`](super::parser::parse) reads back.

use crate::features::escalation::ReminderRecord;
use chrono::{DateTime, Utc};

pub const PRODID: &str = "-//Nudge//Nudge Reminders//EN";

const LINE_ENDING: &str = "\r\n";
const TIMED_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const DATE_FORMAT: &str = "%Y%m%d";

/// A calendar holding a single reminder
pub fn serialize_one(reminder: &ReminderRecord, now: DateTime<Utc>) -> String {
    serialize(std::slice::from_ref(reminder), now)
}

/// One calendar with a `VEVENT` per reminder; `now` is written as DTSTAMP
pub fn serialize(reminders: &[ReminderRecord], now: DateTime<Utc>) -> String {
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODID}"),
    ];

    for reminder in reminders {
        push_event(&mut lines, reminder, now);
    }

    lines.push("END:VCALENDAR".to_string());
    lines.join(LINE_ENDING)
}

fn push_event(lines: &mut Vec<String>, reminder: &ReminderRecord, now: DateTime<Utc>) {
    lines.push("BEGIN:VEVENT".to_string());
    lines.push(format!("UID:{}", reminder.id));
    lines.push(format!("DTSTAMP:{}", now.format(TIMED_FORMAT)));
    lines.push(format!("SUMMARY:{}", escape(&reminder.title)));

    if reminder.has_time() {
        lines.push(format!("DTSTART:{}", reminder.trigger_date().format(TIMED_FORMAT)));
    } else {
        lines.push(format!(
            "DTSTART;VALUE=DATE:{}",
            reminder.reminder_date.format(DATE_FORMAT)
        ));
    }

    if let Some(description) = &reminder.description {
        lines.push(format!("DESCRIPTION:{}", escape(description)));
    }
    if let Some(rule) = &reminder.recurrence_rule {
        lines.push(format!("RRULE:{rule}"));
    }

    lines.push("END:VEVENT".to_string());
}

/// Inverse of [`unescape`](super::parser::unescape)
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::calendar::parser::{parse, unescape};
    use chrono::{Local, NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 20, 9, 15, 0).unwrap()
    }

    fn timed_reminder() -> ReminderRecord {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 16, 45, 30).unwrap();
        let mut reminder = ReminderRecord::new("Call mom; then dad", start.date_naive(), None, now())
            .with_description("Line one\nLine two, with \\ slash")
            .with_recurrence("FREQ=WEEKLY;BYDAY=MO");
        reminder.set_schedule_from(start, false, &Local);
        reminder
    }

    #[test]
    fn test_escape_order() {
        assert_eq!(escape(r"a\b;c,d"), r"a\\b\;c\,d");
        assert_eq!(escape("x\ny"), r"x\ny");
        assert_eq!(escape(r"\n"), r"\\n");
    }

    #[test]
    fn test_escape_unescape_roundtrip() {
        let samples = [
            "",
            "plain",
            r"\n literal",
            "mixed \\; \\, ;,\n\\\\",
            "trailing backslash \\",
            "unicode ✓ 日本",
        ];
        for sample in samples {
            assert_eq!(unescape(&escape(sample)), sample);
        }
    }

    #[test]
    fn test_document_shape() {
        let text = serialize_one(&timed_reminder(), now());
        let lines: Vec<&str> = text.split("\r\n").collect();

        assert_eq!(lines[0], "BEGIN:VCALENDAR");
        assert_eq!(lines[1], "VERSION:2.0");
        assert_eq!(lines[2], "PRODID:-//Nudge//Nudge Reminders//EN");
        assert_eq!(lines[3], "BEGIN:VEVENT");
        assert!(lines.contains(&"DTSTAMP:20260820T091500Z"));
        assert!(lines.contains(&"DTSTART:20260901T164530Z"));
        assert!(lines.contains(&"SUMMARY:Call mom\\; then dad"));
        assert!(lines.contains(&"RRULE:FREQ=WEEKLY;BYDAY=MO"));
        assert_eq!(lines.last(), Some(&"END:VCALENDAR"));
        assert_eq!(text.matches('\n').count(), text.matches("\r\n").count());
    }

    #[test]
    fn test_all_day_uses_value_date() {
        let reminder = ReminderRecord::new(
            "Holiday",
            NaiveDate::from_ymd_opt(2026, 12, 25).unwrap(),
            None,
            now(),
        );
        let text = serialize(&[reminder], now());
        assert!(text.contains("DTSTART;VALUE=DATE:20261225\r\n"));
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let reminder = timed_reminder();
        let events = parse(&serialize_one(&reminder, now()));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.origin_key, reminder.id.to_string());
        assert_eq!(event.title, reminder.title);
        assert_eq!(event.description, reminder.description);
        assert_eq!(event.recurrence_rule, reminder.recurrence_rule);
        assert_eq!(event.start, reminder.trigger_date());
        assert!(!event.all_day);
    }

    #[test]
    fn test_empty_title_survives_roundtrip() {
        let mut reminder = timed_reminder();
        reminder.title = String::new();
        let text = serialize_one(&reminder, now());
        assert!(text.contains("\r\nSUMMARY:\r\n"));

        let events = parse(&text);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin_key, reminder.id.to_string());
        assert_eq!(events[0].title, "");
    }

    #[test]
    fn test_all_day_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2026, 12, 25).unwrap();
        let reminder = ReminderRecord::new("Holiday, family", date, None, now());
        let events = parse(&serialize_one(&reminder, now()));

        assert_eq!(events.len(), 1);
        assert!(events[0].all_day);
        assert_eq!(events[0].title, "Holiday, family");
        assert_eq!(events[0].start.date_naive(), date);
        assert!(events[0].description.is_none());
    }

    #[test]
    fn test_many_reminders_in_one_calendar() {
        let reminders = vec![timed_reminder(), timed_reminder(), timed_reminder()];
        let events = parse(&serialize(&reminders, now()));
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].origin_key, reminders[2].id.to_string());
    }
}
