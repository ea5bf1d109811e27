//! Module Manager
//!
//! Drives the runtime lifecycle:
//!
//! ```text
//! created ─▶ discovering ─▶ instantiating ─▶ initializing ─▶ running ─▶ stopping ─▶ stopped
//! ```
//!
//! - **discovering**: handshake done, ask the middleware which modules to host
//! - **instantiating**: every class is checked before any module is built
//! - **initializing**: modules run `initialize` one at a time
//! - **running**: the init-runtime request has been sent and the dispatch
//!   loop routes inbound packages
//!
//! A failure before `running` tears down whatever was started and returns
//! the error from [`ModuleManager::start`].

use crate::error::{Result, RuntimeError};
use crate::factory::ModuleFactory;
use crate::instance::ModuleInstance;
use crate::properties::Properties;
use crate::rpc::{ParameterList, RemoteFunctionRunnable, RunnableHandler};
use crate::scheduler::Scheduler;
use crate::services::RuntimeServices;
use codec::{CodecRegistry, WireType};
use network::{outbound_queue, Connection, ConnectionSettings, Dispatcher, StreamAddress};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::{ControlValue, FunctionTarget, ModuleChannels, ModuleDescriptor, Package, PackageBody, RemoteFunctionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    Created,
    Discovering,
    Instantiating,
    Initializing,
    Running,
    Stopping,
    Stopped,
}

pub struct ModuleManager {
    factory: ModuleFactory,
    settings: ConnectionSettings,
    codecs: Arc<CodecRegistry>,
    runtime_functions: RunnableHandler<()>,
    scheduler: Option<Scheduler>,
    state: watch::Sender<LifecycleState>,
}

impl ModuleManager {
    pub fn new(factory: ModuleFactory, settings: ConnectionSettings) -> Self {
        let owner = format!("runtime '{}'", settings.runtime_name);
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            factory,
            settings,
            codecs: Arc::new(CodecRegistry::with_builtins()),
            runtime_functions: RunnableHandler::new(owner),
            scheduler: None,
            state,
        }
    }

    /// Codec registry shared by every module; register structured types
    /// here before starting
    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Use `scheduler` instead of one anchored at the local time on start
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Serve `function` as `name` at runtime scope
    pub fn register_runtime_function<R, A, F>(&mut self, name: &str, function: F) -> Result<()>
    where
        R: WireType,
        A: ParameterList,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let runnable = RemoteFunctionRunnable::new(name, &self.codecs, move |_: &mut (), args: A| function(args))?;
        self.runtime_functions.register(runnable)
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "Runtime state changed");
    }

    /// Connect to the middleware at `address` and bring up the hosted modules
    pub async fn start(self, address: &StreamAddress) -> Result<RuntimeHandle> {
        let (outbound, drain) = outbound_queue();
        let dispatcher = Dispatcher::new(self.settings.clone());
        match dispatcher.connect(address, outbound, drain).await {
            Ok(connection) => self.run_startup(connection).await,
            Err(e) => {
                self.transition(LifecycleState::Stopped);
                Err(e.into())
            }
        }
    }

    /// Like [`ModuleManager::start`] over an already-open stream
    pub async fn start_with_stream<S>(self, stream: S) -> Result<RuntimeHandle>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (outbound, drain) = outbound_queue();
        let dispatcher = Dispatcher::new(self.settings.clone());
        match dispatcher.attach(stream, outbound, drain).await {
            Ok(connection) => self.run_startup(connection).await,
            Err(e) => {
                self.transition(LifecycleState::Stopped);
                Err(e.into())
            }
        }
    }

    async fn run_startup(mut self, mut connection: Connection) -> Result<RuntimeHandle> {
        self.transition(LifecycleState::Discovering);
        let descriptors = match connection.fetch_module_list(self.factory.registered_classes()).await {
            Ok(descriptors) => descriptors,
            Err(e) => return Err(self.abort_startup(connection, Vec::new(), e.into()).await),
        };

        self.transition(LifecycleState::Instantiating);
        let mut modules = match self.instantiate(&descriptors) {
            Ok(modules) => modules,
            Err(e) => return Err(self.abort_startup(connection, Vec::new(), e).await),
        };

        let scheduler = self.scheduler.take().unwrap_or_default();
        let services = RuntimeServices::new(
            &self.settings.runtime_name,
            self.codecs.clone(),
            connection.outbound().clone(),
            scheduler,
        );

        self.transition(LifecycleState::Initializing);
        for (position, descriptor) in descriptors.iter().enumerate() {
            let properties = Properties::new(descriptor.properties.clone());
            let initialized = modules[position].initialize(services.clone(), properties).await;
            if let Err(e) = initialized {
                error!(module_id = %descriptor.module_id, error = %e, "Module initialization failed");
                services.channels.clear();
                return Err(self.abort_startup(connection, modules, e).await);
            }
        }

        let channels = modules
            .iter()
            .map(|module| ModuleChannels {
                module_id: module.id().to_string(),
                channel_packets: services.channels.example_packages(module.id()),
            })
            .collect();
        if let Err(e) = connection.send_init_runtime(channels) {
            return Err(self.abort_startup(connection, modules, e.into()).await);
        }

        self.transition(LifecycleState::Running);
        info!(runtime = %self.settings.runtime_name, modules = modules.len(), "Runtime running");

        let shutdown = CancellationToken::new();
        let state = self.state.subscribe();
        let index = modules
            .iter()
            .enumerate()
            .map(|(position, module)| (module.id().to_string(), position))
            .collect();

        let dispatch = DispatchLoop {
            connection: Some(connection),
            modules,
            index,
            services,
            runtime_functions: self.runtime_functions,
            state: self.state,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(dispatch.run());

        Ok(RuntimeHandle { state, shutdown, task })
    }

    /// Check every class and id before building anything
    fn instantiate(&self, descriptors: &[ModuleDescriptor]) -> Result<Vec<Box<dyn ModuleInstance>>> {
        let mut seen = HashSet::new();
        for descriptor in descriptors {
            if !self.factory.is_module_class_registered(&descriptor.module_class) {
                return Err(RuntimeError::UnknownModuleClass {
                    class: descriptor.module_class.clone(),
                });
            }
            if !seen.insert(descriptor.module_id.as_str()) {
                return Err(RuntimeError::DuplicateModuleId {
                    module_id: descriptor.module_id.clone(),
                });
            }
        }

        descriptors
            .iter()
            .map(|descriptor| {
                debug!(module_id = %descriptor.module_id, class = %descriptor.module_class, "Instantiating module");
                self.factory.get_instance(&descriptor.module_class, &descriptor.module_id)
            })
            .collect()
    }

    async fn abort_startup(
        &self,
        connection: Connection,
        mut modules: Vec<Box<dyn ModuleInstance>>,
        error: RuntimeError,
    ) -> RuntimeError {
        error!(error = %error, "Runtime startup failed");
        self.transition(LifecycleState::Stopping);
        for module in modules.iter_mut() {
            module.terminate().await;
        }
        connection.close().await;
        self.transition(LifecycleState::Stopped);
        error
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("runtime", &self.settings.runtime_name)
            .field("state", &self.state())
            .field("factory", &self.factory)
            .field("runtime_functions", &self.runtime_functions)
            .finish()
    }
}

/// Routes inbound packages while the runtime is running
struct DispatchLoop {
    connection: Option<Connection>,
    modules: Vec<Box<dyn ModuleInstance>>,
    index: HashMap<String, usize>,
    services: RuntimeServices,
    runtime_functions: RunnableHandler<()>,
    state: watch::Sender<LifecycleState>,
    shutdown: CancellationToken,
}

impl DispatchLoop {
    async fn run(mut self) -> Result<()> {
        loop {
            let Some(connection) = self.connection.as_mut() else {
                break;
            };
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Runtime shutdown requested");
                    break;
                }
                next = connection.recv() => next,
            };
            match next {
                Some(package) => self.route(package),
                None => {
                    warn!("Middleware connection ended");
                    break;
                }
            }
        }

        self.stop().await;
        Ok(())
    }

    fn route(&mut self, package: Package) {
        match &package.body {
            PackageBody::Control(control) => self.handle_control(&package, control),
            PackageBody::Payload(_) => {
                if let Err(e) = self.services.channels.dispatch(&package) {
                    warn!(
                        package_id = %package.id,
                        channel = %package.channel,
                        target_module = %package.target_module,
                        error = %e,
                        "Dropping data package"
                    );
                }
            }
        }
    }

    fn handle_control(&mut self, package: &Package, control: &ControlValue) {
        match control {
            ControlValue::RpcRequest(request) => self.handle_rpc_request(package, request),
            ControlValue::RpcResponse(_) => self.services.remote_functions.handle_response(package),
            ControlValue::ConnectedToRemoteServer => {
                info!("Middleware connected to remote server");
                self.modules.iter().for_each(|module| module.notify_connected());
            }
            ControlValue::DisconnectedFromRemoteServer => {
                info!("Middleware disconnected from remote server");
                self.modules.iter().for_each(|module| module.notify_disconnected());
            }
            other if other.is_reserved() => {
                warn!(control = other.name(), package_id = %package.id, "Reserved control operation is not supported; ignoring");
            }
            other => {
                warn!(control = other.name(), package_id = %package.id, "Unexpected control package while running; ignoring");
            }
        }
    }

    fn handle_rpc_request(&mut self, package: &Package, request: &RemoteFunctionRequest) {
        match &request.identifier.target {
            FunctionTarget::Runtime(runtime) if *runtime == *self.services.runtime_name => {
                if let Some(response) = self.runtime_functions.execute(&mut (), package) {
                    if let Err(e) = self.services.outbound.enqueue(response) {
                        warn!(error = %e, "Failed to enqueue runtime function response");
                    }
                }
            }
            FunctionTarget::Runtime(runtime) => {
                warn!(runtime = %runtime, function = %request.identifier, "Remote function request for another runtime; dropping");
            }
            FunctionTarget::Module(module_id) => match self.index.get(module_id) {
                Some(&position) => self.modules[position].handle_rpc_request(package.clone()),
                None => {
                    warn!(module_id = %module_id, function = %request.identifier, "Remote function request for unknown module; dropping");
                }
            },
        }
    }

    async fn stop(&mut self) {
        self.state.send_replace(LifecycleState::Stopping);
        for module in self.modules.iter_mut() {
            module.terminate().await;
        }
        self.services.channels.clear();
        let abandoned = self.services.remote_functions.futures().abandon_all();
        if abandoned > 0 {
            debug!(abandoned, "Abandoned pending remote function calls");
        }
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.state.send_replace(LifecycleState::Stopped);
        info!("Runtime stopped");
    }
}

/// Handle to a running runtime
#[derive(Debug)]
pub struct RuntimeHandle {
    state: watch::Receiver<LifecycleState>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl RuntimeHandle {
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Wait until the runtime reaches `target` or a later state
    pub async fn wait_for_state(&mut self, target: LifecycleState) -> LifecycleState {
        let reached = self.state.wait_for(|state| *state >= target).await.map(|state| *state);
        match reached {
            Ok(state) => state,
            // Sender gone: the runtime task has ended
            Err(_) => *self.state.borrow(),
        }
    }

    /// Request shutdown; returns immediately
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the dispatch loop to stop
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| RuntimeError::invalid_state(format!("runtime task failed: {e}")))?
    }

    /// Request shutdown and wait for it to finish
    pub async fn stop(self) -> Result<()> {
        self.shutdown();
        self.join().await
    }
}
