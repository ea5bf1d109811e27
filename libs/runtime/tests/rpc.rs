//! Remote function calls in both directions

mod common;

use codec::WireType;
use common::{boot_manager, boot_runtime, descriptor, settings};
use module_runtime::module::IS_CONNECTED_FUNCTION;
use module_runtime::{CallError, Module, ModuleContext, ModuleFactory, ModuleManager, Properties, RuntimeError};
use std::time::Duration;
use tokio::sync::mpsc;
use types::{
    ControlValue, ExecutionStatus, FunctionTarget, RemoteFunctionIdentifier, DEFAULT_RUNTIME_NAME,
    MIDDLEWARE_RUNTIME_NAME,
};

#[derive(Default)]
struct Calculator {
    calls: u32,
}

impl Module for Calculator {
    fn initialize(&mut self, ctx: &ModuleContext<Self>, _properties: &Properties) -> anyhow::Result<()> {
        ctx.register_remote_function("add", |calc: &mut Calculator, (a, b): (i64, i64)| {
            calc.calls += 1;
            a + b
        })?;
        ctx.register_remote_function("calls", |calc: &mut Calculator, (): ()| calc.calls)?;
        ctx.register_remote_function("explode", |_: &mut Calculator, (): ()| -> i64 {
            panic!("calculator exploded")
        })?;
        Ok(())
    }
}

/// Hands its context to the test so calls can be made from outside
struct Caller {
    contexts: mpsc::UnboundedSender<ModuleContext<Caller>>,
}

impl Module for Caller {
    fn initialize(&mut self, ctx: &ModuleContext<Self>, _properties: &Properties) -> anyhow::Result<()> {
        let _ = self.contexts.send(ctx.clone());
        Ok(())
    }
}

fn calculator_factory() -> ModuleFactory {
    let mut factory = ModuleFactory::new();
    factory.register::<Calculator>("Calculator").unwrap();
    factory
}

fn caller_factory(contexts: mpsc::UnboundedSender<ModuleContext<Caller>>) -> ModuleFactory {
    let mut factory = ModuleFactory::new();
    factory
        .register_with("Caller", move || Caller {
            contexts: contexts.clone(),
        })
        .unwrap();
    factory
}

#[tokio::test]
async fn test_module_function_replies_with_result() {
    let (handle, mut middleware, _) =
        boot_runtime(calculator_factory(), vec![descriptor("calc", "Calculator", &[])]).await;

    let add = RemoteFunctionIdentifier::module("calc", "add");
    middleware
        .call(add.clone(), "call-1", vec![2i64.encode().unwrap(), 3i64.encode().unwrap()])
        .await;
    let response = middleware.expect_response("call-1").await;
    assert_eq!(response.status, ExecutionStatus::Ok);
    assert_eq!(response.identifier, add);
    assert_eq!(i64::decode(&response.payload.unwrap()).unwrap(), 5);

    // State persists between calls on the module
    middleware
        .call(RemoteFunctionIdentifier::module("calc", "calls"), "call-2", vec![])
        .await;
    let response = middleware.expect_response("call-2").await;
    assert_eq!(u32::decode(&response.payload.unwrap()).unwrap(), 1);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_bad_requests_report_their_status() {
    let (handle, mut middleware, _) =
        boot_runtime(calculator_factory(), vec![descriptor("calc", "Calculator", &[])]).await;
    let add = RemoteFunctionIdentifier::module("calc", "add");

    middleware.call(add.clone(), "arity", vec![2i64.encode().unwrap()]).await;
    let response = middleware.expect_response("arity").await;
    assert_eq!(response.status, ExecutionStatus::FailedInvalidNumberOfParameters);
    assert!(response.payload.is_none());

    middleware
        .call(add, "types", vec![2i64.encode().unwrap(), "3".to_string().encode().unwrap()])
        .await;
    let response = middleware.expect_response("types").await;
    assert_eq!(response.status, ExecutionStatus::FailedMismatchingParameters);

    middleware
        .call(RemoteFunctionIdentifier::module("calc", "explode"), "panic", vec![])
        .await;
    let response = middleware.expect_response("panic").await;
    assert_eq!(response.status, ExecutionStatus::FailedFunctionNotFoundOrFailedToExecute);

    // The module survives the panic
    middleware
        .call(RemoteFunctionIdentifier::module("calc", "calls"), "after", vec![])
        .await;
    assert_eq!(middleware.expect_response("after").await.status, ExecutionStatus::Ok);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_targets_get_no_response() {
    let (handle, mut middleware, _) =
        boot_runtime(calculator_factory(), vec![descriptor("calc", "Calculator", &[])]).await;

    middleware
        .call(RemoteFunctionIdentifier::module("calc", "multiply"), "unknown-fn", vec![])
        .await;
    middleware
        .call(RemoteFunctionIdentifier::module("abacus", "add"), "unknown-module", vec![])
        .await;
    middleware
        .call(RemoteFunctionIdentifier::runtime("RUNTIME_PY", "version"), "other-runtime", vec![])
        .await;

    assert!(middleware.try_recv(Duration::from_millis(200)).await.is_none());
    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_runtime_function_served_by_manager() {
    let mut manager = ModuleManager::new(calculator_factory(), settings());
    manager
        .register_runtime_function("version", |_: ()| "1.2.3".to_string())
        .unwrap();
    manager
        .register_runtime_function("scale", |(value, factor): (f64, f64)| value * factor)
        .unwrap();
    let err = manager
        .register_runtime_function("version", |_: ()| 0u8)
        .unwrap_err();
    assert!(matches!(err, RuntimeError::DuplicateFunction { .. }));

    let (handle, mut middleware, _) = boot_manager(manager, vec![]).await;

    middleware
        .call(RemoteFunctionIdentifier::runtime(DEFAULT_RUNTIME_NAME, "version"), "v", vec![])
        .await;
    let response = middleware.expect_response("v").await;
    assert_eq!(String::decode(&response.payload.unwrap()).unwrap(), "1.2.3");

    middleware
        .call(
            RemoteFunctionIdentifier::runtime(DEFAULT_RUNTIME_NAME, "scale"),
            "s",
            vec![1.5f64.encode().unwrap(), 4.0f64.encode().unwrap()],
        )
        .await;
    let response = middleware.expect_response("s").await;
    assert_eq!(f64::decode(&response.payload.unwrap()).unwrap(), 6.0);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_connection_query_reads_middleware_answer() {
    let (tx, mut contexts) = mpsc::unbounded_channel();
    let (handle, mut middleware, _) =
        boot_runtime(caller_factory(tx), vec![descriptor("caller", "Caller", &[])]).await;
    let ctx = contexts.recv().await.unwrap();

    for (status, payload, expected) in [
        (ExecutionStatus::Ok, Some(true.encode().unwrap()), true),
        (ExecutionStatus::Ok, Some(false.encode().unwrap()), false),
        (ExecutionStatus::FailedFunctionNotFoundOrFailedToExecute, None, false),
    ] {
        let query = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.is_connected_to_remote_server().await })
        };

        let request = middleware.recv_matching(|p| p.control().is_some()).await;
        let Some(ControlValue::RpcRequest(rpc)) = request.control() else {
            panic!("expected rpc-request, got {request:?}");
        };
        assert_eq!(rpc.identifier.target, FunctionTarget::Runtime(MIDDLEWARE_RUNTIME_NAME.to_string()));
        assert_eq!(rpc.identifier.function_name, IS_CONNECTED_FUNCTION);
        assert!(rpc.parameters.is_empty());
        assert_eq!(request.source_module, "caller");

        middleware.respond(&request, status, payload).await;
        assert_eq!(query.await.unwrap(), expected);
    }

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_module_calls_another_module() {
    let (tx, mut contexts) = mpsc::unbounded_channel();
    let (handle, mut middleware, _) =
        boot_runtime(caller_factory(tx), vec![descriptor("caller", "Caller", &[])]).await;
    let ctx = contexts.recv().await.unwrap();

    let err = ctx
        .map_remote_function_of_module::<i64, (i64, i64)>("caller", "add")
        .unwrap_err();
    assert!(matches!(err, RuntimeError::SelfMapping { .. }));

    let add = ctx
        .map_remote_function_of_module::<i64, (i64, i64)>("calc", "add")
        .unwrap();
    let pending = add.execute((20, 22)).unwrap();
    let rejected = add.execute((1, 1)).unwrap();

    let first = middleware.recv_matching(|p| p.control().is_some()).await;
    assert_eq!(first.target_module, "calc");
    assert_eq!(first.source_module, "caller");
    let second = middleware.recv_matching(|p| p.control().is_some()).await;

    // Answer out of order
    middleware
        .respond(&second, ExecutionStatus::FailedMismatchingParameters, None)
        .await;
    middleware
        .respond(&first, ExecutionStatus::Ok, Some(42i64.encode().unwrap()))
        .await;

    assert_eq!(pending.await.unwrap(), 42);
    match rejected.await.unwrap_err() {
        CallError::Failed { status, .. } => assert_eq!(status, ExecutionStatus::FailedMismatchingParameters),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(ctx.services().remote_functions().futures().is_empty());

    handle.stop().await.unwrap();
}
