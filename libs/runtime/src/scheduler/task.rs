//! Scheduled task execution
//!
//! Each scheduled function runs on its own tokio task that sleeps until the
//! next execution time. The callback only enqueues work; a module's functions
//! still run on that module's mailbox.

use super::schedule::Schedule;
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Invoked at every execution time with the task's cancellation token
pub type TaskCallback = Arc<dyn Fn(&CancellationToken) + Send + Sync>;

/// Wall clock derived from tokio's monotonic clock.
///
/// The wall time is sampled once; later readings add the elapsed tokio time,
/// so paused-time tests see a consistent clock.
#[derive(Debug, Clone, Copy)]
struct WallClock {
    wall: NaiveDateTime,
    instant: Instant,
}

impl WallClock {
    fn anchored_at(wall: NaiveDateTime) -> Self {
        Self {
            wall,
            instant: Instant::now(),
        }
    }

    fn now(&self) -> NaiveDateTime {
        let elapsed = Instant::now().saturating_duration_since(self.instant);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.wall + elapsed,
            Err(_) => self.wall,
        }
    }

    fn delay_until(&self, due: NaiveDateTime) -> std::time::Duration {
        (due - self.now()).to_std().unwrap_or_default()
    }
}

/// Spawns scheduled tasks
#[derive(Debug, Clone)]
pub struct Scheduler {
    clock: WallClock,
}

impl Scheduler {
    /// Must be called inside a tokio runtime
    pub fn new() -> Self {
        Self::anchored_at(Local::now().naive_local())
    }

    /// Scheduler whose clock reads `wall` at the current tokio instant
    pub fn anchored_at(wall: NaiveDateTime) -> Self {
        Self {
            clock: WallClock::anchored_at(wall),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn schedule(&self, name: &str, schedule: Schedule, callback: TaskCallback) -> ScheduledTask {
        let token = CancellationToken::new();
        let join = tokio::spawn(run_task(
            name.to_string(),
            schedule,
            callback,
            self.clock,
            token.clone(),
        ));
        ScheduledTask {
            name: name.to_string(),
            token,
            join,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_task(
    name: String,
    mut schedule: Schedule,
    callback: TaskCallback,
    clock: WallClock,
    token: CancellationToken,
) {
    let first = match &mut schedule {
        Schedule::Once { at } => Some(*at),
        Schedule::Repeating(repeating) if repeating.next_execution() > clock.now() => {
            Some(repeating.next_execution())
        }
        Schedule::Repeating(repeating) => repeating.advance_past(clock.now()),
    };
    let Some(mut due) = first else {
        warn!(task = %name, "No execution time left in schedule");
        return;
    };

    loop {
        trace!(task = %name, due = %due, "Waiting for next execution");
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(clock.delay_until(due)) => {}
        }
        if token.is_cancelled() {
            break;
        }

        callback(&token);

        match &mut schedule {
            Schedule::Once { .. } => break,
            Schedule::Repeating(repeating) => {
                if token.is_cancelled() {
                    break;
                }
                match repeating.advance_past(clock.now()) {
                    Some(next) => due = next,
                    None => {
                        warn!(task = %name, "No execution time left in schedule");
                        break;
                    }
                }
            }
        }
    }
    debug!(task = %name, cancelled = token.is_cancelled(), "Scheduled task finished");
}

/// A spawned scheduled function
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Still waiting for a future execution
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.join.is_finished()
    }
}

/// Named tasks owned by one module, cancelled together on termination
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, ScheduledTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.get(name).is_some_and(ScheduledTask::is_active)
    }

    /// Insert `task`, returning a task it replaced
    pub fn insert(&mut self, task: ScheduledTask) -> Option<ScheduledTask> {
        self.tasks.insert(task.name.clone(), task)
    }

    pub fn cancel(&mut self, name: &str) -> bool {
        match self.tasks.remove(name) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, task) in self.tasks.drain() {
            task.cancel();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
