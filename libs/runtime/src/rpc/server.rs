//! Serving remote functions
//!
//! A [`RemoteFunctionRunnable`] wraps a typed function behind a uniform
//! payload-in, payload-out interface. [`RunnableHandler`] owns the runnables
//! of one scope (a module or the runtime) and turns `rpc-request` packages
//! into `rpc-response` packages.

use super::params::ParameterList;
use crate::error::{Result, RuntimeError};
use codec::{CodecRegistry, ErasedCodec, WireType};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};
use types::{
    ControlValue, ExecutionStatus, Package, PackageBody, Payload, RemoteFunctionRequest,
    RemoteFunctionReturn, TypeTag,
};

type Invoker<S> =
    Box<dyn Fn(&mut S, Vec<Box<dyn Any + Send>>) -> std::result::Result<Payload, ExecutionStatus> + Send + Sync>;

pub struct RemoteFunctionRunnable<S> {
    name: String,
    return_tag: TypeTag,
    parameter_codecs: Vec<Arc<dyn ErasedCodec>>,
    invoke: Invoker<S>,
}

impl<S: 'static> RemoteFunctionRunnable<S> {
    /// Fails when a return or parameter type has no registered codec
    pub fn new<R, A, F>(name: &str, codecs: &CodecRegistry, function: F) -> Result<Self>
    where
        R: WireType,
        A: ParameterList,
        F: Fn(&mut S, A) -> R + Send + Sync + 'static,
    {
        let return_tag = codecs.codec::<R>()?.type_tag().clone();
        let parameter_codecs = A::codecs(codecs)?;

        let invoke: Invoker<S> = Box::new(move |target, values| {
            let args = A::from_values(values).ok_or(ExecutionStatus::FailedMismatchingParameters)?;
            function(target, args).encode().map_err(|e| {
                error!(error = %e, "Failed to encode remote function result");
                ExecutionStatus::FailedFunctionNotFoundOrFailedToExecute
            })
        });

        Ok(Self {
            name: name.to_string(),
            return_tag,
            parameter_codecs,
            invoke,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.parameter_codecs.len()
    }

    pub fn return_tag(&self) -> &TypeTag {
        &self.return_tag
    }

    /// Decode `parameters`, call the function and encode its result
    pub fn run(&self, target: &mut S, parameters: &[Payload]) -> std::result::Result<Payload, ExecutionStatus> {
        if parameters.len() != self.parameter_codecs.len() {
            warn!(
                function = %self.name,
                expected = self.parameter_codecs.len(),
                received = parameters.len(),
                "Remote function called with wrong number of parameters"
            );
            return Err(ExecutionStatus::FailedInvalidNumberOfParameters);
        }

        let mut values = Vec::with_capacity(parameters.len());
        for (position, (codec, payload)) in self.parameter_codecs.iter().zip(parameters).enumerate() {
            match codec.decode_any(payload) {
                Ok(value) => values.push(value),
                Err(e) => {
                    warn!(function = %self.name, position, error = %e, "Mismatching remote function parameter");
                    return Err(ExecutionStatus::FailedMismatchingParameters);
                }
            }
        }

        match catch_unwind(AssertUnwindSafe(|| (self.invoke)(target, values))) {
            Ok(result) => result,
            Err(_) => {
                error!(function = %self.name, "Remote function panicked");
                Err(ExecutionStatus::FailedFunctionNotFoundOrFailedToExecute)
            }
        }
    }

    /// Execute `rpc` and build the response addressed back to `request`
    pub fn respond(&self, target: &mut S, request: &Package, rpc: &RemoteFunctionRequest) -> Package {
        let (status, payload) = match self.run(target, &rpc.parameters) {
            Ok(payload) => (ExecutionStatus::Ok, Some(payload)),
            Err(status) => (status, None),
        };
        debug!(function = %rpc.identifier, future_id = %rpc.future_id, %status, "Executed remote function");

        request.reply(PackageBody::Control(ControlValue::RpcResponse(RemoteFunctionReturn {
            identifier: rpc.identifier.clone(),
            future_id: rpc.future_id.clone(),
            status,
            payload,
        })))
    }
}

impl<S> std::fmt::Debug for RemoteFunctionRunnable<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFunctionRunnable")
            .field("name", &self.name)
            .field("return_tag", &self.return_tag)
            .field("arity", &self.parameter_codecs.len())
            .finish()
    }
}

/// Runnables of one scope, keyed by function name
pub struct RunnableHandler<S> {
    owner: String,
    runnables: HashMap<String, Arc<RemoteFunctionRunnable<S>>>,
}

impl<S: 'static> RunnableHandler<S> {
    /// `owner` names the scope in errors and logs
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            runnables: HashMap::new(),
        }
    }

    pub fn register(&mut self, runnable: RemoteFunctionRunnable<S>) -> Result<()> {
        if self.runnables.contains_key(runnable.name()) {
            return Err(RuntimeError::DuplicateFunction {
                name: runnable.name().to_string(),
                owner: self.owner.clone(),
            });
        }
        debug!(owner = %self.owner, function = runnable.name(), arity = runnable.arity(), "Registered remote function");
        self.runnables.insert(runnable.name().to_string(), Arc::new(runnable));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runnables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.runnables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnables.is_empty()
    }

    /// Runnable that should serve `request`.
    ///
    /// `None` when the package is not an rpc-request or names an unknown
    /// function; no response is sent for either.
    pub fn resolve<'p>(
        &self,
        request: &'p Package,
    ) -> Option<(Arc<RemoteFunctionRunnable<S>>, &'p RemoteFunctionRequest)> {
        let Some(ControlValue::RpcRequest(rpc)) = request.control() else {
            warn!(package_id = %request.id, owner = %self.owner, "Expected an rpc-request package");
            return None;
        };
        match self.runnables.get(&rpc.identifier.function_name) {
            Some(runnable) => Some((runnable.clone(), rpc)),
            None => {
                warn!(owner = %self.owner, function = %rpc.identifier, "Remote function not registered; dropping request");
                None
            }
        }
    }

    pub fn execute(&self, target: &mut S, request: &Package) -> Option<Package> {
        let (runnable, rpc) = self.resolve(request)?;
        Some(runnable.respond(target, request, rpc))
    }
}

impl<S> std::fmt::Debug for RunnableHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableHandler")
            .field("owner", &self.owner)
            .field("functions", &self.runnables.keys().collect::<Vec<_>>())
            .finish()
    }
}
