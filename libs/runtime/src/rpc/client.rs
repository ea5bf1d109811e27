//! Calling remote functions
//!
//! [`RemoteFunctionHandler`] hands out typed [`RemoteFunction`] handles and
//! resolves their futures when `rpc-response` packages arrive.

use super::future::{CallOutcome, FutureTable, RemoteFuture};
use super::params::ParameterList;
use crate::error::{CallError, Result};
use codec::{CodecRegistry, ErasedCodec, WireType};
use network::OutboundQueue;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};
use types::{
    ControlValue, FunctionTarget, Package, RemoteFunctionIdentifier, RemoteFunctionRequest,
};

#[derive(Debug, Clone)]
pub struct RemoteFunctionHandler {
    futures: Arc<FutureTable>,
    outbound: OutboundQueue,
    codecs: Arc<CodecRegistry>,
}

impl RemoteFunctionHandler {
    pub fn new(runtime_name: &str, outbound: OutboundQueue, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            futures: FutureTable::new(runtime_name),
            outbound,
            codecs,
        }
    }

    pub fn futures(&self) -> &Arc<FutureTable> {
        &self.futures
    }

    /// Typed handle for `identifier`, called on behalf of `source_module`.
    ///
    /// Fails when a return or parameter type has no registered codec.
    pub fn map_function<R, A>(
        &self,
        identifier: RemoteFunctionIdentifier,
        source_module: &str,
    ) -> Result<RemoteFunction<R, A>>
    where
        R: WireType,
        A: ParameterList,
    {
        self.codecs.codec::<R>()?;
        let parameter_codecs = A::codecs(&self.codecs)?;
        debug!(function = %identifier, arity = A::ARITY, source_module, "Mapped remote function");

        Ok(RemoteFunction {
            identifier,
            source_module: source_module.to_string(),
            parameter_codecs,
            futures: self.futures.clone(),
            outbound: self.outbound.clone(),
            _marker: PhantomData,
        })
    }

    /// Resolve the future named by an `rpc-response` package
    pub fn handle_response(&self, package: &Package) {
        let Some(ControlValue::RpcResponse(response)) = package.control() else {
            warn!(package_id = %package.id, "Expected an rpc-response package");
            return;
        };

        let outcome: CallOutcome = if response.status.is_ok() {
            Ok(response.payload.clone())
        } else {
            Err(CallError::Failed {
                identifier: response.identifier.to_string(),
                status: response.status,
            })
        };

        if !self.futures.resolve(&response.future_id, outcome) {
            warn!(
                future_id = %response.future_id,
                function = %response.identifier,
                "Response for an unknown or already resolved future"
            );
        }
    }
}

/// Typed caller for one remote function
pub struct RemoteFunction<R, A> {
    identifier: RemoteFunctionIdentifier,
    source_module: String,
    parameter_codecs: Vec<Arc<dyn ErasedCodec>>,
    futures: Arc<FutureTable>,
    outbound: OutboundQueue,
    _marker: PhantomData<fn(A) -> R>,
}

impl<R: WireType, A: ParameterList> RemoteFunction<R, A> {
    pub fn identifier(&self) -> &RemoteFunctionIdentifier {
        &self.identifier
    }

    /// Send the request and return the future for its response
    pub fn execute(&self, args: A) -> Result<RemoteFuture<R>> {
        let parameters = args.encode(&self.parameter_codecs)?;
        let future = self.futures.register::<R>(self.identifier.clone());

        let mut package = Package::with_control(ControlValue::RpcRequest(RemoteFunctionRequest {
            identifier: self.identifier.clone(),
            future_id: future.id().to_string(),
            parameters,
        }))
        .from_module(&self.source_module);
        if let FunctionTarget::Module(module_id) = &self.identifier.target {
            package.target_module = module_id.clone();
        }

        // The future's drop removes its table entry if the enqueue fails
        self.outbound.enqueue(package)?;
        Ok(future)
    }
}

impl<R, A> Clone for RemoteFunction<R, A> {
    fn clone(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            source_module: self.source_module.clone(),
            parameter_codecs: self.parameter_codecs.clone(),
            futures: self.futures.clone(),
            outbound: self.outbound.clone(),
            _marker: PhantomData,
        }
    }
}

impl<R, A> std::fmt::Debug for RemoteFunction<R, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFunction")
            .field("identifier", &self.identifier)
            .field("source_module", &self.source_module)
            .finish()
    }
}
