//! Periodic and scheduled function execution
//!
//! - [`schedule`]: execution time arithmetic, including daily time windows
//! - [`task`]: the tokio tasks that sleep until each execution
//! - [`config`]: declarative schedules

pub mod config;
pub mod schedule;
pub mod task;

pub use config::{next_time_of_day, ExactTimeEntry, PeriodicEntry, ScheduleConfig, WindowEntry};
pub use schedule::{RepeatingSchedule, Schedule, TimeWindow};
pub use task::{ScheduledTask, Scheduler, TaskCallback, TaskRegistry};
