//! Named snooze options and their resolution to absolute instants.

use crate::features::escalation::reminder::local_instant;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

const EVENING_HOUR: u32 = 17;
const MORNING_HOUR: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnoozeOption {
    OneHour,
    ThreeHours,
    /// 17:00 today, or tomorrow if that has already passed
    UntilEvening,
    /// 09:00 on the next calendar day
    UntilTomorrow,
}

impl SnoozeOption {
    pub const ALL: [SnoozeOption; 4] = [
        SnoozeOption::OneHour,
        SnoozeOption::ThreeHours,
        SnoozeOption::UntilEvening,
        SnoozeOption::UntilTomorrow,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            SnoozeOption::OneHour => "1 hour",
            SnoozeOption::ThreeHours => "3 hours",
            SnoozeOption::UntilEvening => "Until 5:00 PM",
            SnoozeOption::UntilTomorrow => "Until tomorrow 9:00 AM",
        }
    }

    /// Resolve against `now`, reading wall-clock times in `now`'s zone
    pub fn resolve<Tz: TimeZone>(&self, now: DateTime<Tz>) -> DateTime<Utc> {
        let tz = now.timezone();
        let now_utc = now.with_timezone(&Utc);
        let today = now.naive_local().date();

        match self {
            SnoozeOption::OneHour => now_utc + Duration::hours(1),
            SnoozeOption::ThreeHours => now_utc + Duration::hours(3),
            SnoozeOption::UntilEvening => {
                let evening = at_hour(&tz, today, EVENING_HOUR);
                if evening > now_utc {
                    evening
                } else {
                    at_hour(&tz, next_day(today), EVENING_HOUR)
                }
            }
            SnoozeOption::UntilTomorrow => at_hour(&tz, next_day(today), MORNING_HOUR),
        }
    }
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

fn at_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
    local_instant(tz, date.and_time(time))
}

impl std::fmt::Display for SnoozeOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 14, h, m, 0).unwrap()
    }

    #[test]
    fn test_relative_options() {
        assert_eq!(SnoozeOption::OneHour.resolve(at(14, 0)), at(15, 0));
        assert_eq!(SnoozeOption::ThreeHours.resolve(at(14, 0)), at(17, 0));
    }

    #[test]
    fn test_until_evening_same_day() {
        assert_eq!(SnoozeOption::UntilEvening.resolve(at(14, 0)), at(17, 0));
    }

    #[test]
    fn test_until_evening_rolls_to_tomorrow() {
        let expected = Utc.with_ymd_and_hms(2026, 4, 15, 17, 0, 0).unwrap();
        assert_eq!(SnoozeOption::UntilEvening.resolve(at(18, 0)), expected);
        // Exactly 17:00 is no longer in the future
        assert_eq!(SnoozeOption::UntilEvening.resolve(at(17, 0)), expected);
    }

    #[test]
    fn test_until_tomorrow_ignores_time_of_day() {
        let expected = Utc.with_ymd_and_hms(2026, 4, 15, 9, 0, 0).unwrap();
        assert_eq!(SnoozeOption::UntilTomorrow.resolve(at(0, 5)), expected);
        assert_eq!(SnoozeOption::UntilTomorrow.resolve(at(23, 55)), expected);
    }

    #[test]
    fn test_resolution_uses_local_wall_clock() {
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2026, 4, 14, 14, 0, 0).unwrap();
        // 17:00 at UTC-5 is 22:00 UTC
        assert_eq!(SnoozeOption::UntilEvening.resolve(now), at(22, 0));
    }

    #[test]
    fn test_display_names() {
        let names: Vec<String> = SnoozeOption::ALL.iter().map(|o| o.to_string()).collect();
        assert_eq!(names[2], "Until 5:00 PM");
    }
}
