//! Declarative schedules
//!
//! A [`ScheduleConfig`] lists periodic entries and exact times of day. It
//! deserializes from TOML or JSON so modules can carry schedules in their
//! configuration.

use super::schedule::{Schedule, TimeWindow};
use crate::error::{Result, RuntimeError};
use chrono::{Duration as TimeDelta, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub periodic: Vec<PeriodicEntry>,
    pub exact: Vec<ExactTimeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicEntry {
    pub interval_ms: u64,
    /// Daily time of the first execution; defaults to one interval from now
    #[serde(default)]
    pub first_execution: Option<NaiveTime>,
    #[serde(default)]
    pub window: Option<WindowEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEntry {
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactTimeEntry {
    pub time_of_day: NaiveTime,
    #[serde(default)]
    pub repeat_daily: bool,
}

/// Next occurrence of `time` strictly after `now`
pub fn next_time_of_day(now: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

impl ScheduleConfig {
    pub fn is_empty(&self) -> bool {
        self.periodic.is_empty() && self.exact.is_empty()
    }

    /// Concrete schedules relative to `now`, periodic entries first
    pub fn schedules(&self, now: NaiveDateTime) -> Result<Vec<Schedule>> {
        let mut schedules = Vec::with_capacity(self.periodic.len() + self.exact.len());

        for entry in &self.periodic {
            let interval = Duration::from_millis(entry.interval_ms);
            let window = entry
                .window
                .map(|w| TimeWindow::new(w.start, w.stop))
                .transpose()?;
            let first = match entry.first_execution {
                Some(time) => next_time_of_day(now, time),
                None => {
                    let offset = TimeDelta::from_std(interval)
                        .map_err(|_| RuntimeError::invalid_schedule("interval is out of range"))?;
                    now.checked_add_signed(offset)
                        .ok_or_else(|| RuntimeError::invalid_schedule("first execution is out of range"))?
                }
            };
            schedules.push(Schedule::repeating(first, interval, window)?);
        }

        for entry in &self.exact {
            let at = next_time_of_day(now, entry.time_of_day);
            if entry.repeat_daily {
                schedules.push(Schedule::repeating(at, Duration::from_secs(24 * 3600), None)?);
            } else {
                schedules.push(Schedule::once(at));
            }
        }

        Ok(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_from_toml() {
        let config: ScheduleConfig = toml::from_str(
            r#"
[[periodic]]
interval_ms = 60000
window = { start = "09:00:00", stop = "17:00:00" }

[[exact]]
time_of_day = "07:30:00"
repeat_daily = true
"#,
        )
        .unwrap();
        assert_eq!(config.periodic.len(), 1);
        assert_eq!(config.exact[0].time_of_day, NaiveTime::from_hms_opt(7, 30, 0).unwrap());
    }

    #[test]
    fn test_schedules_relative_to_now() {
        let config = ScheduleConfig {
            periodic: vec![PeriodicEntry {
                interval_ms: 1_000,
                first_execution: None,
                window: None,
            }],
            exact: vec![ExactTimeEntry {
                time_of_day: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                repeat_daily: false,
            }],
        };
        let schedules = config.schedules(now()).unwrap();
        assert_eq!(schedules.len(), 2);
        assert_eq!(schedules[0].next_execution(), now() + TimeDelta::seconds(1));
        assert_eq!(
            schedules[1],
            Schedule::once(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_entry_rejected() {
        let config = ScheduleConfig {
            periodic: vec![PeriodicEntry {
                interval_ms: 0,
                first_execution: None,
                window: None,
            }],
            exact: Vec::new(),
        };
        assert!(config.schedules(now()).is_err());
    }

    #[test]
    fn test_huge_interval_rejected() {
        let config: ScheduleConfig = toml::from_str(
            r#"
[[periodic]]
interval_ms = 9000000000000000000
"#,
        )
        .unwrap();
        let err = config.schedules(now()).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidSchedule { .. }), "{err}");
    }
}
