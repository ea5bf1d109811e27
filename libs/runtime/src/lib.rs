//! # Module Runtime
//!
//! Hosts user modules inside a process and connects them to the middleware
//! core over a single stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                ModuleManager                 │
//! │  lifecycle · factory · dispatch loop         │
//! │                                              │
//! │  ┌──────────┐  ┌──────────┐  ┌────────────┐  │      ┌────────────┐
//! │  │ Module A │  │ Module B │  │ runtime    │  │      │ middleware │
//! │  │ mailbox  │  │ mailbox  │  │ functions  │  │◀────▶│    core    │
//! │  └──────────┘  └──────────┘  └────────────┘  │      └────────────┘
//! │  ChannelRegistry · FutureTable · Scheduler   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Each module runs on its own task. Channel data, remote function requests
//! and scheduled functions reach a module as jobs on its mailbox, so module
//! code never needs its own locking.
//!
//! ## Example
//!
//! ```rust,no_run
//! use module_runtime::{Module, ModuleContext, ModuleFactory, ModuleManager, Properties};
//! use network::ConnectionSettings;
//!
//! #[derive(Default)]
//! struct Echo;
//!
//! impl Module for Echo {
//!     fn initialize(&mut self, ctx: &ModuleContext<Self>, _props: &Properties) -> anyhow::Result<()> {
//!         let out = ctx.publish("echo_out", &String::new())?;
//!         ctx.subscribe("echo_in", &String::new(), move |_echo: &mut Echo, data, _ctx| {
//!             let _ = out.post(data.value());
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut factory = ModuleFactory::new();
//! factory.register::<Echo>("Echo")?;
//! let manager = ModuleManager::new(factory, ConnectionSettings::default());
//! let handle = manager.start(&"unix:///tmp/middleware.sock".parse()?).await?;
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod error;
pub mod factory;
pub mod host;
pub mod instance;
pub mod manager;
pub mod module;
pub mod modules;
pub mod properties;
pub mod rpc;
pub mod scheduler;
pub mod services;

// Re-export commonly used types
pub use channel::{Channel, ChannelAccess, ChannelRegistry};
pub use error::{CallError, Result, RoutingError, RuntimeError};
pub use factory::ModuleFactory;
pub use instance::ModuleInstance;
pub use manager::{LifecycleState, ModuleManager, RuntimeHandle};
pub use module::{ChannelData, Module, ModuleContext, ModuleState};
pub use properties::Properties;
pub use rpc::{CallOutcome, FutureState, ParameterList, RemoteFunction, RemoteFuture};
pub use scheduler::{ScheduleConfig, Scheduler, TimeWindow};
pub use services::RuntimeServices;
