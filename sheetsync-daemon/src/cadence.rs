//! Cadence rules: when a repeating job is due.
//!
//! Values come straight from the configuration and are parsed at evaluation
//! time:
//!
//! | interval | value              | example       |
//! |----------|--------------------|---------------|
//! | `hour`   | `MM`               | `15`          |
//! | `day`    | `HH:MM`            | `18:01`       |
//! | `week`   | `HH:MM-weekday`    | `00:01-Monday`|
//! | `month`  | `HH:MM-day`        | `11:59-31`    |
//! | `year`   | `HH:MM-day-month`  | `00:01-31-12` |
//!
//! Every rule needs the poll to land inside the matching minute, and a
//! `last_run` guard keeps one matching window from firing twice.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

use sheetsync_core::{Cadence, SyncJob};

use crate::error::ScheduleError;

/// A parsed cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleRule {
    Hourly {
        minute: u32,
    },
    Daily {
        hour: u32,
        minute: u32,
    },
    Weekly {
        hour: u32,
        minute: u32,
        weekday: Weekday,
    },
    /// `day_of_month` is clamped to the last day of shorter months.
    Monthly {
        hour: u32,
        minute: u32,
        day_of_month: u32,
    },
    Yearly {
        hour: u32,
        minute: u32,
        day: u32,
        month: u32,
    },
}

impl ScheduleRule {
    pub fn from_cadence(cadence: &Cadence) -> Result<Self, ScheduleError> {
        let interval = cadence
            .interval
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ScheduleError::MissingInterval)?;
        let value = cadence
            .value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let require = || {
            value.ok_or_else(|| ScheduleError::MissingValue {
                interval: interval.to_owned(),
            })
        };

        match interval {
            "hour" => Ok(ScheduleRule::Hourly {
                minute: bounded(require()?, "minute", 0, 59, "MM")?,
            }),
            "day" => {
                let (hour, minute) = parse_time(require()?)?;
                Ok(ScheduleRule::Daily { hour, minute })
            }
            "week" => {
                let raw = require()?;
                let (time, day) = raw.split_once('-').ok_or_else(|| malformed(raw, "HH:MM-weekday"))?;
                let (hour, minute) = parse_time(time)?;
                Ok(ScheduleRule::Weekly {
                    hour,
                    minute,
                    weekday: parse_weekday(day)?,
                })
            }
            "month" => {
                let raw = require()?;
                let (time, day) = raw.split_once('-').ok_or_else(|| malformed(raw, "HH:MM-day"))?;
                let (hour, minute) = parse_time(time)?;
                Ok(ScheduleRule::Monthly {
                    hour,
                    minute,
                    day_of_month: bounded(day, "day", 1, 31, "HH:MM-day")?,
                })
            }
            "year" => {
                let raw = require()?;
                let parts: Vec<&str> = raw.split('-').collect();
                let [time, day, month] = parts.as_slice() else {
                    return Err(malformed(raw, "HH:MM-day-month"));
                };
                let (hour, minute) = parse_time(time)?;
                Ok(ScheduleRule::Yearly {
                    hour,
                    minute,
                    day: bounded(day, "day", 1, 31, "HH:MM-day-month")?,
                    month: bounded(month, "month", 1, 12, "HH:MM-day-month")?,
                })
            }
            other => Err(ScheduleError::UnknownInterval(other.to_owned())),
        }
    }

    /// Whether the rule fires at `now`, given the last successful run.
    pub fn is_due(&self, now: NaiveDateTime, last_run: Option<NaiveDateTime>) -> bool {
        let at = |hour: u32, minute: u32| now.hour() == hour && now.minute() == minute;
        match *self {
            ScheduleRule::Hourly { minute } => {
                now.minute() == minute
                    && last_run.map_or(true, |last| (now - last).num_seconds() > 60)
            }
            ScheduleRule::Daily { hour, minute } => {
                at(hour, minute) && last_run.map_or(true, |last| (now - last).num_days() >= 1)
            }
            ScheduleRule::Weekly {
                hour,
                minute,
                weekday,
            } => {
                now.weekday() == weekday
                    && at(hour, minute)
                    && last_run.map_or(true, |last| (now - last).num_days() >= 7)
            }
            ScheduleRule::Monthly {
                hour,
                minute,
                day_of_month,
            } => {
                let target = day_of_month.min(days_in_month(now.year(), now.month()));
                now.day() == target
                    && at(hour, minute)
                    && last_run.map_or(true, |last| {
                        last.month() != now.month() || last.year() != now.year()
                    })
            }
            ScheduleRule::Yearly {
                hour,
                minute,
                day,
                month,
            } => {
                now.month() == month
                    && now.day() == day
                    && at(hour, minute)
                    && last_run.map_or(true, |last| last.year() != now.year())
            }
        }
    }
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleRule::Hourly { minute } => write!(f, "hourly at :{minute:02}"),
            ScheduleRule::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02}"),
            ScheduleRule::Weekly {
                hour,
                minute,
                weekday,
            } => write!(f, "weekly on {weekday} at {hour:02}:{minute:02}"),
            ScheduleRule::Monthly {
                hour,
                minute,
                day_of_month,
            } => write!(f, "monthly on day {day_of_month} at {hour:02}:{minute:02}"),
            ScheduleRule::Yearly {
                hour,
                minute,
                day,
                month,
            } => write!(f, "yearly on {day:02}/{month:02} at {hour:02}:{minute:02}"),
        }
    }
}

/// Evaluate a job's cadence. Jobs without one are never due; malformed
/// cadences log a diagnostic and are not due.
pub fn job_is_due(job: &SyncJob, now: NaiveDateTime, last_run: Option<NaiveDateTime>) -> bool {
    let Some(cadence) = &job.cadence else {
        return false;
    };
    match ScheduleRule::from_cadence(cadence) {
        Ok(rule) => rule.is_due(now, last_run),
        Err(err) => {
            tracing::warn!(job = %job.display_name(), error = %err, "error parsing schedule");
            false
        }
    }
}

/// Number of days in `month` of `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}

fn malformed(value: &str, expected: &'static str) -> ScheduleError {
    ScheduleError::Malformed {
        value: value.to_owned(),
        expected,
    }
}

fn bounded(
    raw: &str,
    what: &'static str,
    min: u32,
    max: u32,
    expected: &'static str,
) -> Result<u32, ScheduleError> {
    let value: u32 = raw.trim().parse().map_err(|_| malformed(raw, expected))?;
    if value < min || value > max {
        return Err(ScheduleError::OutOfRange { what, value });
    }
    Ok(value)
}

fn parse_time(raw: &str) -> Result<(u32, u32), ScheduleError> {
    let (hour, minute) = raw.split_once(':').ok_or_else(|| malformed(raw, "HH:MM"))?;
    Ok((
        bounded(hour, "hour", 0, 23, "HH:MM")?,
        bounded(minute, "minute", 0, 59, "HH:MM")?,
    ))
}

fn parse_weekday(raw: &str) -> Result<Weekday, ScheduleError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" => Ok(Weekday::Mon),
        "tuesday" => Ok(Weekday::Tue),
        "wednesday" => Ok(Weekday::Wed),
        "thursday" => Ok(Weekday::Thu),
        "friday" => Ok(Weekday::Fri),
        "saturday" => Ok(Weekday::Sat),
        "sunday" => Ok(Weekday::Sun),
        _ => Err(ScheduleError::UnknownWeekday(raw.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn cadence(interval: &str, value: &str) -> Cadence {
        Cadence {
            interval: Some(interval.into()),
            value: Some(value.into()),
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid datetime")
    }

    #[rstest]
    #[case("hour", "15", ScheduleRule::Hourly { minute: 15 })]
    #[case("day", "18:01", ScheduleRule::Daily { hour: 18, minute: 1 })]
    #[case("week", "00:01-Monday", ScheduleRule::Weekly { hour: 0, minute: 1, weekday: Weekday::Mon })]
    #[case("month", "11:59-31", ScheduleRule::Monthly { hour: 11, minute: 59, day_of_month: 31 })]
    #[case("year", "00:01-31-12", ScheduleRule::Yearly { hour: 0, minute: 1, day: 31, month: 12 })]
    fn parses_every_interval(#[case] interval: &str, #[case] value: &str, #[case] expected: ScheduleRule) {
        assert_eq!(ScheduleRule::from_cadence(&cadence(interval, value)), Ok(expected));
    }

    #[rstest]
    #[case("day", "1801")]
    #[case("day", "25:00")]
    #[case("week", "00:01-Funday")]
    #[case("month", "11:59")]
    #[case("year", "00:01-31")]
    #[case("fortnight", "00:01")]
    #[case("hour", "")]
    fn malformed_values_are_errors(#[case] interval: &str, #[case] value: &str) {
        assert!(ScheduleRule::from_cadence(&cadence(interval, value)).is_err());
    }

    #[test]
    fn hourly_fires_once_per_matching_minute() {
        let rule = ScheduleRule::Hourly { minute: 15 };
        let now = at(2024, 3, 4, 10, 15);
        assert!(rule.is_due(now, None));
        assert!(!rule.is_due(now, Some(now)));
        assert!(rule.is_due(now, Some(at(2024, 3, 4, 9, 15))));
        assert!(!rule.is_due(at(2024, 3, 4, 10, 16), None));
    }

    #[test]
    fn daily_needs_a_full_day_since_last_run() {
        let rule = ScheduleRule::Daily { hour: 18, minute: 1 };
        let now = at(2024, 3, 4, 18, 1);
        assert!(rule.is_due(now, Some(at(2024, 3, 3, 18, 1))));
        assert!(!rule.is_due(now, Some(at(2024, 3, 4, 0, 0))));
    }

    #[test]
    fn weekly_matches_weekday() {
        let rule = ScheduleRule::Weekly {
            hour: 0,
            minute: 1,
            weekday: Weekday::Mon,
        };
        // 2024-03-04 is a Monday.
        assert!(rule.is_due(at(2024, 3, 4, 0, 1), None));
        assert!(!rule.is_due(at(2024, 3, 5, 0, 1), None));
        assert!(!rule.is_due(at(2024, 3, 11, 0, 1), Some(at(2024, 3, 5, 0, 1))));
    }

    #[test]
    fn monthly_clamps_to_short_months() {
        let rule = ScheduleRule::Monthly {
            hour: 11,
            minute: 59,
            day_of_month: 31,
        };
        assert!(rule.is_due(at(2023, 2, 28, 11, 59), None));
        assert!(rule.is_due(at(2024, 2, 29, 11, 59), None));
        assert!(!rule.is_due(at(2024, 2, 28, 11, 59), None));
        assert!(rule.is_due(at(2024, 4, 30, 11, 59), Some(at(2024, 3, 31, 11, 59))));
        assert!(!rule.is_due(at(2024, 4, 30, 11, 59), Some(at(2024, 4, 1, 0, 0))));
    }

    #[test]
    fn yearly_fires_once_a_year() {
        let rule = ScheduleRule::Yearly {
            hour: 0,
            minute: 1,
            day: 31,
            month: 12,
        };
        assert!(rule.is_due(at(2024, 12, 31, 0, 1), Some(at(2023, 12, 31, 0, 1))));
        assert!(!rule.is_due(at(2024, 12, 31, 0, 1), Some(at(2024, 1, 1, 0, 0))));
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2024, 12), 31);
        assert_eq!(days_in_month(2024, 4), 30);
    }

    #[test]
    fn jobs_without_or_with_broken_cadence_are_never_due() {
        let mut job = SyncJob {
            range: "A!A:B".into(),
            database_id: "db".into(),
            priority: sheetsync_core::Priority::GridAuthoritative,
            name: None,
            cadence: None,
        };
        let now = at(2024, 3, 4, 18, 1);
        assert!(!job_is_due(&job, now, None));
        job.cadence = Some(cadence("day", "six pm"));
        assert!(!job_is_due(&job, now, None));
        job.cadence = Some(cadence("day", "18:01"));
        assert!(job_is_due(&job, now, None));
    }
}
