//! Execution time arithmetic for scheduled functions.
//!
//! Times are local wall-clock [`NaiveDateTime`]s. A [`TimeWindow`] is a
//! half-open daily interval `[start, stop)` and may cross midnight.

use crate::error::{Result, RuntimeError};
use chrono::{Duration as TimeDelta, NaiveDate, NaiveDateTime, NaiveTime};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: NaiveTime,
    stop: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, stop: NaiveTime) -> Result<Self> {
        if start == stop {
            return Err(RuntimeError::invalid_schedule(format!(
                "time window start and stop are both {start}"
            )));
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn stop(&self) -> NaiveTime {
        self.stop
    }

    pub fn crosses_midnight(&self) -> bool {
        self.stop < self.start
    }

    /// Window opened on `date`
    fn bounds_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let start = date.and_time(self.start);
        let stop_date = if self.crosses_midnight() {
            date + TimeDelta::days(1)
        } else {
            date
        };
        (start, stop_date.and_time(self.stop))
    }

    /// Bounds of the window occurrence containing `at`.
    ///
    /// An occurrence opened the previous day is still active after midnight
    /// when the window crosses it.
    pub fn occurrence_containing(&self, at: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let today = at.date();
        today
            .pred_opt()
            .into_iter()
            .chain(std::iter::once(today))
            .map(|date| self.bounds_on(date))
            .find(|(start, stop)| *start <= at && at < *stop)
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.occurrence_containing(at).is_some()
    }

    /// First window opening strictly after `at`
    pub fn next_start_after(&self, at: NaiveDateTime) -> NaiveDateTime {
        let today = at.date().and_time(self.start);
        if today > at {
            today
        } else {
            today + TimeDelta::days(1)
        }
    }
}

/// Repeating execution times, optionally restricted to a daily window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatingSchedule {
    next: NaiveDateTime,
    interval: TimeDelta,
    window: Option<TimeWindow>,
}

impl RepeatingSchedule {
    /// `first` is moved to the next window opening when it falls outside
    pub fn new(first: NaiveDateTime, interval: Duration, window: Option<TimeWindow>) -> Result<Self> {
        if interval.is_zero() {
            return Err(RuntimeError::invalid_schedule("interval must be greater than zero"));
        }
        let interval = TimeDelta::from_std(interval)
            .map_err(|_| RuntimeError::invalid_schedule("interval is out of range"))?;

        let next = match window {
            Some(window) if !window.contains(first) => window.next_start_after(first),
            _ => first,
        };
        Ok(Self {
            next,
            interval,
            window,
        })
    }

    pub fn next_execution(&self) -> NaiveDateTime {
        self.next
    }

    pub fn interval(&self) -> TimeDelta {
        self.interval
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    /// Execution time following `current`, `None` once the calendar runs out
    pub fn following(&self, current: NaiveDateTime) -> Option<NaiveDateTime> {
        let candidate = current.checked_add_signed(self.interval);
        let Some(window) = self.window else {
            return candidate;
        };
        match (window.occurrence_containing(current), candidate) {
            (Some((_, stop)), Some(candidate)) if candidate < stop => Some(candidate),
            (Some((start, _)), _) => start.checked_add_signed(TimeDelta::days(1)),
            (None, _) => Some(window.next_start_after(current)),
        }
    }

    /// Advance until the next execution is strictly after `now`.
    ///
    /// Returns `None` when no representable execution time remains.
    pub fn advance_past(&mut self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        if self.window.is_none() && self.next <= now {
            // Skip missed executions in one step
            if let (Some(behind), Some(step)) = (
                (now - self.next).num_nanoseconds(),
                self.interval.num_nanoseconds(),
            ) {
                if step > 0 {
                    self.next += TimeDelta::nanoseconds((behind / step) * step);
                }
            }
        }
        while self.next <= now {
            self.next = self.following(self.next)?;
        }
        Some(self.next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Once { at: NaiveDateTime },
    Repeating(RepeatingSchedule),
}

impl Schedule {
    pub fn once(at: NaiveDateTime) -> Self {
        Schedule::Once { at }
    }

    pub fn repeating(first: NaiveDateTime, interval: Duration, window: Option<TimeWindow>) -> Result<Self> {
        RepeatingSchedule::new(first, interval, window).map(Schedule::Repeating)
    }

    pub fn is_repeating(&self) -> bool {
        matches!(self, Schedule::Repeating(_))
    }

    pub fn next_execution(&self) -> NaiveDateTime {
        match self {
            Schedule::Once { at } => *at,
            Schedule::Repeating(schedule) => schedule.next_execution(),
        }
    }
}
