//! Module instances as seen by the manager
//!
//! [`ModuleInstance`] erases the module type so the manager can hold modules
//! of different classes side by side. [`ModuleActor`] is the only
//! implementation: it owns the module value until `initialize` moves it onto
//! its own task.

use crate::error::{Result, RuntimeError};
use crate::module::{Envelope, Module, ModuleContext, ModuleCore, ModuleState};
use crate::properties::Properties;
use crate::services::RuntimeServices;
use async_trait::async_trait;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::Package;

#[async_trait]
pub trait ModuleInstance: Send {
    fn id(&self) -> &str;

    fn class(&self) -> &str;

    fn state(&self) -> ModuleState;

    /// Start the module task and run the module's `initialize` on it
    async fn initialize(&mut self, services: RuntimeServices, properties: Properties) -> Result<()>;

    fn notify_connected(&self);

    fn notify_disconnected(&self);

    /// Execute an rpc-request on the module task and enqueue the response
    fn handle_rpc_request(&self, request: Package);

    /// Cancel scheduled functions, run `terminate` and stop the module task
    async fn terminate(&mut self);
}

pub struct ModuleActor<M: Module> {
    id: String,
    class: String,
    module: Option<M>,
    context: Option<ModuleContext<M>>,
    task: Option<JoinHandle<()>>,
    initialized: bool,
}

impl<M: Module> ModuleActor<M> {
    pub fn new(id: &str, class: &str, module: M) -> Self {
        Self {
            id: id.to_string(),
            class: class.to_string(),
            module: Some(module),
            context: None,
            task: None,
            initialized: false,
        }
    }

    fn post_hook(&self, hook: fn(&mut M, &ModuleContext<M>)) {
        let Some(ctx) = &self.context else {
            return;
        };
        if ctx.state() != ModuleState::Running {
            return;
        }
        if !ctx.core.post(Box::new(move |module, ctx| hook(module, ctx))) {
            debug!(module_id = %self.id, "Module mailbox closed; dropping notification");
        }
    }
}

/// Module lifecycle events, logged under the `module_events` target
fn module_event(event: &str, module_id: &str, class: &str) {
    info!(target: "module_events", event, module_id, class, "Module {event}");
}

async fn run_module<M: Module>(
    mut module: M,
    ctx: ModuleContext<M>,
    mut mailbox: mpsc::UnboundedReceiver<Envelope<M>>,
) {
    while let Some(envelope) = mailbox.recv().await {
        match envelope {
            Envelope::Run(job) => {
                if catch_unwind(AssertUnwindSafe(|| job(&mut module, &ctx))).is_err() {
                    error!(module_id = %ctx.id(), "Module job panicked; module keeps running");
                }
            }
            Envelope::Terminate { run_hook, done } => {
                if run_hook && catch_unwind(AssertUnwindSafe(|| module.terminate(&ctx))).is_err() {
                    error!(module_id = %ctx.id(), "Module terminate panicked");
                }
                ctx.core.set_state(ModuleState::Terminated);
                let _ = done.send(());
                break;
            }
        }
    }
    debug!(module_id = %ctx.id(), "Module task finished");
}

#[async_trait]
impl<M: Module> ModuleInstance for ModuleActor<M> {
    fn id(&self) -> &str {
        &self.id
    }

    fn class(&self) -> &str {
        &self.class
    }

    fn state(&self) -> ModuleState {
        self.context
            .as_ref()
            .map_or(ModuleState::Uninitialized, ModuleContext::state)
    }

    async fn initialize(&mut self, services: RuntimeServices, properties: Properties) -> Result<()> {
        let module = self
            .module
            .take()
            .ok_or_else(|| RuntimeError::invalid_state(format!("module '{}' was already initialized", self.id)))?;

        let (mailbox, receiver) = mpsc::unbounded_channel();
        let ctx = ModuleContext {
            core: Arc::new(ModuleCore::new(&self.id, &self.class, services, mailbox)),
        };
        ctx.core.set_state(ModuleState::Initializing);
        self.task = Some(tokio::spawn(run_module(module, ctx.clone(), receiver)));
        self.context = Some(ctx.clone());

        let (done_tx, done_rx) = oneshot::channel();
        let posted = ctx.core.post(Box::new(move |module, ctx| {
            let result = module.initialize(ctx, &properties);
            let unknown = properties.unknown_properties();
            if !unknown.is_empty() {
                warn!(module_id = %ctx.id(), ?unknown, "Module asked for properties it was not given");
            }
            let _ = done_tx.send(result);
        }));
        if !posted {
            return Err(RuntimeError::invalid_state(format!("module '{}' task is not running", self.id)));
        }

        let result = done_rx.await.map_err(|_| RuntimeError::ModuleInitialization {
            module_id: self.id.clone(),
            message: "initialize panicked".to_string(),
        })?;

        match result {
            Ok(()) => {
                ctx.core.set_state(ModuleState::Running);
                self.initialized = true;
                info!(module_id = %self.id, class = %self.class, "Module initialized");
                module_event("started", &self.id, &self.class);
                Ok(())
            }
            Err(e) => Err(RuntimeError::ModuleInitialization {
                module_id: self.id.clone(),
                message: format!("{e:#}"),
            }),
        }
    }

    fn notify_connected(&self) {
        self.post_hook(M::on_connected_to_remote_server);
    }

    fn notify_disconnected(&self) {
        self.post_hook(M::on_disconnected_from_remote_server);
    }

    fn handle_rpc_request(&self, request: Package) {
        let Some(ctx) = &self.context else {
            warn!(module_id = %self.id, "Remote function request for a module that never started");
            return;
        };
        let posted = ctx.core.post(Box::new(move |module, ctx| {
            let resolved = ctx.core.runnables.read().resolve(&request).map(|(runnable, rpc)| (runnable, rpc.clone()));
            let Some((runnable, rpc)) = resolved else {
                return;
            };
            let response = runnable.respond(module, &request, &rpc);
            if let Err(e) = ctx.core.services.outbound.enqueue(response) {
                warn!(module_id = %ctx.id(), error = %e, "Failed to enqueue remote function response");
            }
        }));
        if !posted {
            warn!(module_id = %self.id, "Module mailbox closed; dropping remote function request");
        }
    }

    async fn terminate(&mut self) {
        let Some(ctx) = self.context.take() else {
            return;
        };
        let cancelled = ctx.core.tasks.lock().cancel_all();

        let (done, finished) = oneshot::channel();
        let envelope = Envelope::Terminate {
            run_hook: self.initialized,
            done,
        };
        if ctx.core.mailbox.send(envelope).is_ok() {
            let _ = finished.await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(module_id = %self.id, error = %e, "Module task failed");
            }
        }
        ctx.core.set_state(ModuleState::Terminated);
        info!(module_id = %self.id, cancelled_tasks = cancelled, "Module terminated");
        module_event("stopped", &self.id, &self.class);
    }
}
