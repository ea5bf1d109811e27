//! Module abstraction
//!
//! A [`Module`] is user code hosted by the runtime. Every module runs on its
//! own task and owns a mailbox; channel callbacks, remote function calls and
//! scheduled functions are all delivered as jobs through that mailbox, so at
//! most one of them mutates the module at a time.
//!
//! Modules talk to the runtime through their [`ModuleContext`]:
//!
//! ```text
//! initialize ─▶ publish / subscribe / register_remote_function
//! any time   ─▶ post on channels, call remote functions, schedule functions
//! ```

use crate::channel::{Channel, ChannelAccess, Subscriber};
use crate::error::{Result, RuntimeError};
use crate::properties::Properties;
use crate::rpc::{ParameterList, RemoteFunction, RemoteFunctionRunnable, RunnableHandler};
use crate::scheduler::{Schedule, ScheduleConfig, TaskCallback, TaskRegistry, TimeWindow};
use crate::services::RuntimeServices;
use chrono::NaiveDateTime;
use codec::WireType;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::{Package, RemoteFunctionIdentifier, MIDDLEWARE_RUNTIME_NAME};

/// How long [`ModuleContext::is_connected_to_remote_server`] waits for the
/// middleware
pub const CONNECTION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the middleware function answering connection queries
pub const IS_CONNECTED_FUNCTION: &str = "is_connected_to_remote_server";

pub trait Module: Send + Sized + 'static {
    /// Declare channels and remote functions. Registration is rejected once
    /// this returns.
    fn initialize(&mut self, ctx: &ModuleContext<Self>, properties: &Properties) -> anyhow::Result<()>;

    /// Called once during shutdown, after scheduled functions are cancelled
    fn terminate(&mut self, _ctx: &ModuleContext<Self>) {}

    fn on_connected_to_remote_server(&mut self, _ctx: &ModuleContext<Self>) {}

    fn on_disconnected_from_remote_server(&mut self, _ctx: &ModuleContext<Self>) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModuleState {
    Uninitialized = 0,
    Initializing = 1,
    Running = 2,
    Terminated = 3,
}

impl ModuleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ModuleState::Initializing,
            2 => ModuleState::Running,
            3 => ModuleState::Terminated,
            _ => ModuleState::Uninitialized,
        }
    }
}

/// A value received on a channel, with its envelope metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData<T> {
    value: T,
    timestamp_ms: u64,
    source_module: String,
    user_token: String,
}

impl<T> ChannelData<T> {
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Timestamp set by the publisher when the value was posted
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn source_module(&self) -> &str {
        &self.source_module
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }
}

pub(crate) type Job<M> = Box<dyn FnOnce(&mut M, &ModuleContext<M>) + Send>;

type ModuleCallback<M> = Arc<dyn Fn(&mut M, &ModuleContext<M>) + Send + Sync>;

pub(crate) enum Envelope<M: Module> {
    Run(Job<M>),
    Terminate {
        run_hook: bool,
        done: oneshot::Sender<()>,
    },
}

pub(crate) struct ModuleCore<M: Module> {
    pub(crate) id: String,
    pub(crate) class: String,
    pub(crate) services: RuntimeServices,
    pub(crate) mailbox: mpsc::UnboundedSender<Envelope<M>>,
    state: AtomicU8,
    pub(crate) runnables: RwLock<RunnableHandler<M>>,
    pub(crate) tasks: Mutex<TaskRegistry>,
}

impl<M: Module> ModuleCore<M> {
    pub(crate) fn new(
        id: &str,
        class: &str,
        services: RuntimeServices,
        mailbox: mpsc::UnboundedSender<Envelope<M>>,
    ) -> Self {
        Self {
            id: id.to_string(),
            class: class.to_string(),
            services,
            mailbox,
            state: AtomicU8::new(ModuleState::Uninitialized as u8),
            runnables: RwLock::new(RunnableHandler::new(format!("module '{id}'"))),
            tasks: Mutex::new(TaskRegistry::new()),
        }
    }

    pub(crate) fn state(&self) -> ModuleState {
        ModuleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ModuleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn post(&self, job: Job<M>) -> bool {
        self.mailbox.send(Envelope::Run(job)).is_ok()
    }
}

/// A module's handle to the runtime
pub struct ModuleContext<M: Module> {
    pub(crate) core: Arc<ModuleCore<M>>,
}

impl<M: Module> Clone for ModuleContext<M> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<M: Module> std::fmt::Debug for ModuleContext<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.core.id)
            .field("class", &self.core.class)
            .field("state", &self.core.state())
            .finish()
    }
}

impl<M: Module> ModuleContext<M> {
    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn class(&self) -> &str {
        &self.core.class
    }

    pub fn state(&self) -> ModuleState {
        self.core.state()
    }

    pub fn runtime_name(&self) -> &str {
        self.core.services.runtime_name()
    }

    pub fn services(&self) -> &RuntimeServices {
        &self.core.services
    }

    /// Log on behalf of the module, tagged with its id and class
    pub fn log_error(&self, message: impl std::fmt::Display) {
        error!(module_id = %self.core.id, class = %self.core.class, "{message}");
    }

    pub fn log_warning(&self, message: impl std::fmt::Display) {
        warn!(module_id = %self.core.id, class = %self.core.class, "{message}");
    }

    pub fn log_info(&self, message: impl std::fmt::Display) {
        info!(module_id = %self.core.id, class = %self.core.class, "{message}");
    }

    pub fn log_debug(&self, message: impl std::fmt::Display) {
        debug!(module_id = %self.core.id, class = %self.core.class, "{message}");
    }

    fn require_initializing(&self, operation: &'static str) -> Result<()> {
        if self.core.state() == ModuleState::Initializing {
            return Ok(());
        }
        Err(RuntimeError::RegistrationClosed {
            module_id: self.core.id.clone(),
            operation,
        })
    }

    /// Run `job` on the module's task
    pub fn run_in_module<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut M, &ModuleContext<M>) + Send + 'static,
    {
        if self.core.post(Box::new(job)) {
            Ok(())
        } else {
            Err(RuntimeError::invalid_state(format!(
                "module '{}' is no longer running",
                self.core.id
            )))
        }
    }

    // ---- channels ----

    /// Declare an outbound channel typed after `example`
    pub fn publish<T: WireType>(&self, channel: &str, example: &T) -> Result<Channel<T>> {
        self.require_initializing("publish")?;
        self.core.services.channels.publish(&self.core.id, channel, example)?;
        Ok(Channel::new(
            channel,
            &self.core.id,
            ChannelAccess::Publish,
            self.core.services.outbound.clone(),
        ))
    }

    /// Declare an inbound channel; `callback` runs on the module's task for
    /// every delivered value
    pub fn subscribe<T, F>(&self, channel: &str, example: &T, callback: F) -> Result<Channel<T>>
    where
        T: WireType,
        F: Fn(&mut M, ChannelData<T>, &ModuleContext<M>) + Send + Sync + 'static,
    {
        self.require_initializing("subscribe")?;

        let callback = Arc::new(callback);
        let mailbox = self.core.mailbox.clone();
        let module_id = self.core.id.clone();
        let subscriber: Subscriber = Arc::new(move |package: &Package| {
            let Some(payload) = package.payload() else {
                return;
            };
            let value = match T::decode(payload) {
                Ok(value) => value,
                Err(e) => {
                    warn!(module_id = %module_id, channel = %package.channel, error = %e, "Dropping undecodable channel data");
                    return;
                }
            };
            let data = ChannelData {
                value,
                timestamp_ms: package.unix_timestamp_ms,
                source_module: package.source_module.clone(),
                user_token: package.source_user_token.clone(),
            };
            let callback = callback.clone();
            let job: Job<M> = Box::new(move |module, ctx| callback(module, data, ctx));
            if mailbox.send(Envelope::Run(job)).is_err() {
                debug!(module_id = %module_id, channel = %package.channel, "Module mailbox closed; dropping channel data");
            }
        });

        self.core
            .services
            .channels
            .subscribe(&self.core.id, channel, example, subscriber)?;
        Ok(Channel::new(
            channel,
            &self.core.id,
            ChannelAccess::Subscribe,
            self.core.services.outbound.clone(),
        ))
    }

    // ---- remote functions ----

    /// Expose `function` to other runtimes as `name`
    pub fn register_remote_function<R, A, F>(&self, name: &str, function: F) -> Result<()>
    where
        R: WireType,
        A: ParameterList,
        F: Fn(&mut M, A) -> R + Send + Sync + 'static,
    {
        self.require_initializing("register_remote_function")?;
        let runnable = RemoteFunctionRunnable::new(name, &self.core.services.codecs, function)?;
        self.core.runnables.write().register(runnable)
    }

    /// Typed handle to a remote function of another module
    pub fn map_remote_function_of_module<R, A>(&self, module_id: &str, function: &str) -> Result<RemoteFunction<R, A>>
    where
        R: WireType,
        A: ParameterList,
    {
        if module_id == self.core.id {
            return Err(RuntimeError::SelfMapping {
                module_id: module_id.to_string(),
                function: function.to_string(),
            });
        }
        self.core
            .services
            .remote_functions
            .map_function(RemoteFunctionIdentifier::module(module_id, function), &self.core.id)
    }

    /// Typed handle to a function served by a runtime, e.g. the middleware
    pub fn map_remote_function_of_runtime<R, A>(&self, runtime: &str, function: &str) -> Result<RemoteFunction<R, A>>
    where
        R: WireType,
        A: ParameterList,
    {
        self.core
            .services
            .remote_functions
            .map_function(RemoteFunctionIdentifier::runtime(runtime, function), &self.core.id)
    }

    /// Ask the middleware whether it is connected to a remote server.
    ///
    /// Every failure, including a timeout, reads as not connected.
    pub async fn is_connected_to_remote_server(&self) -> bool {
        let future = self
            .map_remote_function_of_runtime::<bool, ()>(MIDDLEWARE_RUNTIME_NAME, IS_CONNECTED_FUNCTION)
            .and_then(|function| function.execute(()));
        let future = match future {
            Ok(future) => future.with_timeout(CONNECTION_QUERY_TIMEOUT),
            Err(e) => {
                warn!(module_id = %self.core.id, error = %e, "Connection query could not be sent");
                return false;
            }
        };

        match future.await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(module_id = %self.core.id, error = %e, "Connection query failed");
                false
            }
        }
    }

    // ---- scheduling ----

    fn task_callback(&self, callback: ModuleCallback<M>) -> TaskCallback {
        let mailbox = self.core.mailbox.clone();
        let module_id = self.core.id.clone();
        Arc::new(move |token: &CancellationToken| {
            let callback = callback.clone();
            let token = token.clone();
            // Cancellation may land while the job waits in the mailbox
            let job: Job<M> = Box::new(move |module, ctx| {
                if !token.is_cancelled() {
                    callback(module, ctx);
                }
            });
            if mailbox.send(Envelope::Run(job)).is_err() {
                debug!(module_id = %module_id, "Module mailbox closed; skipping scheduled execution");
            }
        })
    }

    fn schedule_task(&self, name: &str, schedule: Schedule, callback: ModuleCallback<M>, replace: bool) -> Result<()> {
        let mut tasks = self.core.tasks.lock();
        if !replace && tasks.is_scheduled(name) {
            return Err(RuntimeError::DuplicateTask {
                module_id: self.core.id.clone(),
                name: name.to_string(),
            });
        }
        debug!(module_id = %self.core.id, task = name, next = %schedule.next_execution(), "Scheduling function");
        let task = self
            .core
            .services
            .scheduler
            .schedule(name, schedule, self.task_callback(callback));
        if let Some(previous) = tasks.insert(task) {
            previous.cancel();
        }
        Ok(())
    }

    /// Call `callback` every `interval`, starting one interval from now
    pub fn register_periodic_function<F>(&self, name: &str, interval: Duration, callback: F) -> Result<()>
    where
        F: Fn(&mut M, &ModuleContext<M>) + Send + Sync + 'static,
    {
        let offset = chrono::Duration::from_std(interval)
            .map_err(|_| RuntimeError::invalid_schedule("interval is out of range"))?;
        let first = self
            .core
            .services
            .scheduler
            .now()
            .checked_add_signed(offset)
            .ok_or_else(|| RuntimeError::invalid_schedule("first execution is out of range"))?;
        self.register_periodic_function_at(name, interval, first, None, callback)
    }

    /// Call `callback` every `interval` from `first`, optionally only inside
    /// a daily time window
    pub fn register_periodic_function_at<F>(
        &self,
        name: &str,
        interval: Duration,
        first: NaiveDateTime,
        window: Option<TimeWindow>,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(&mut M, &ModuleContext<M>) + Send + Sync + 'static,
    {
        let schedule = Schedule::repeating(first, interval, window)?;
        self.schedule_task(name, schedule, Arc::new(callback), false)
    }

    /// Call `callback` once at `at`, replacing a function of the same name
    pub fn register_scheduled_function<F>(&self, name: &str, at: NaiveDateTime, callback: F) -> Result<()>
    where
        F: Fn(&mut M, &ModuleContext<M>) + Send + Sync + 'static,
    {
        if at <= self.core.services.scheduler.now() {
            warn!(module_id = %self.core.id, task = name, at = %at, "Scheduled time is in the past; running as soon as possible");
        }
        self.schedule_task(name, Schedule::once(at), Arc::new(callback), true)
    }

    /// Register one task per entry of `config`, named `{name}/{index}`.
    /// Returns the task names.
    pub fn register_function_based_on_schedule<F>(
        &self,
        name: &str,
        config: &ScheduleConfig,
        callback: F,
    ) -> Result<Vec<String>>
    where
        F: Fn(&mut M, &ModuleContext<M>) + Send + Sync + 'static,
    {
        let schedules = config.schedules(self.core.services.scheduler.now())?;
        let callback: ModuleCallback<M> = Arc::new(callback);

        let mut names = Vec::with_capacity(schedules.len());
        for (index, schedule) in schedules.into_iter().enumerate() {
            let task_name = format!("{name}/{index}");
            let replace = !schedule.is_repeating();
            self.schedule_task(&task_name, schedule, callback.clone(), replace)?;
            names.push(task_name);
        }
        Ok(names)
    }

    pub fn unregister_periodic_function(&self, name: &str) -> bool {
        self.core.tasks.lock().cancel(name)
    }

    pub fn is_function_scheduled(&self, name: &str) -> bool {
        self.core.tasks.lock().is_scheduled(name)
    }
}
