//! Remote function calls
//!
//! ```text
//! caller                                   callee
//! RemoteFunction::execute ─ rpc-request ─▶ RunnableHandler::execute
//!        │                                        │
//! RemoteFuture ◀─ FutureTable::resolve ◀─ rpc-response
//! ```

pub mod client;
pub mod future;
pub mod params;
pub mod server;

pub use client::{RemoteFunction, RemoteFunctionHandler};
pub use future::{CallOutcome, FutureState, FutureTable, RemoteFuture};
pub use params::ParameterList;
pub use server::{RemoteFunctionRunnable, RunnableHandler};
