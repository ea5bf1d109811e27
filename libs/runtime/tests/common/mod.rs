//! Scripted middleware peer for runtime integration tests
#![allow(dead_code)]

use module_runtime::{ModuleFactory, ModuleManager, RuntimeHandle};
use network::{ConnectionSettings, FrameReader, FrameWriter, DEFAULT_MAX_MESSAGE_SIZE};
use std::time::Duration;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use types::{
    ControlValue, ExecutionStatus, ModuleChannels, ModuleDescriptor, Package, PackageBody, Payload,
    PropertyMap, PropertyValue, RemoteFunctionIdentifier, RemoteFunctionRequest, RemoteFunctionReturn,
};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn settings() -> ConnectionSettings {
    ConnectionSettings {
        host_id: "test-host".to_string(),
        user_id: "test-user".to_string(),
        device_id: "test-device".to_string(),
        ..ConnectionSettings::default()
    }
}

pub fn descriptor(module_id: &str, class: &str, properties: &[(&str, PropertyValue)]) -> ModuleDescriptor {
    ModuleDescriptor {
        module_id: module_id.to_string(),
        module_class: class.to_string(),
        properties: properties
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect::<PropertyMap>(),
    }
}

pub struct FakeMiddleware {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
}

impl FakeMiddleware {
    /// Runtime end and middleware end of an in-memory stream
    pub fn pair() -> (DuplexStream, FakeMiddleware) {
        let (runtime_end, middleware_end) = tokio::io::duplex(1024 * 1024);
        let (read_half, write_half) = tokio::io::split(middleware_end);
        (
            runtime_end,
            FakeMiddleware {
                reader: FrameReader::new(read_half, DEFAULT_MAX_MESSAGE_SIZE),
                writer: FrameWriter::new(write_half, DEFAULT_MAX_MESSAGE_SIZE),
            },
        )
    }

    pub async fn send(&mut self, package: Package) {
        self.writer.write_package(&package).await.unwrap();
    }

    pub async fn recv(&mut self) -> Package {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_package())
            .await
            .expect("timed out waiting for the runtime")
            .unwrap()
            .expect("runtime closed the stream")
    }

    /// Next package, or `None` if nothing arrives within `wait`
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Package> {
        match tokio::time::timeout(wait, self.reader.read_package()).await {
            Ok(result) => result.unwrap(),
            Err(_) => None,
        }
    }

    /// Skip packages until one satisfies `predicate`
    pub async fn recv_matching(&mut self, predicate: impl Fn(&Package) -> bool) -> Package {
        loop {
            let package = self.recv().await;
            if predicate(&package) {
                return package;
            }
        }
    }

    pub async fn accept_handshake(&mut self) {
        let ping = self.recv().await;
        let runtime = match ping.control() {
            Some(ControlValue::Ping { runtime }) => runtime.clone(),
            other => panic!("expected ping, got {other:?}"),
        };
        self.send(Package::with_control(ControlValue::Ping { runtime })).await;
    }

    /// Answer the module-list request, returning the advertised classes
    pub async fn serve_module_list(&mut self, descriptors: Vec<ModuleDescriptor>) -> Vec<String> {
        let request = self.recv().await;
        let classes = match request.control() {
            Some(ControlValue::ModuleListRequest { supported_classes, .. }) => supported_classes.clone(),
            other => panic!("expected module list request, got {other:?}"),
        };
        self.send(Package::with_control(ControlValue::ModuleListResponse { descriptors }))
            .await;
        classes
    }

    pub async fn expect_init_runtime(&mut self) -> Vec<ModuleChannels> {
        let package = self.recv().await;
        match package.body {
            PackageBody::Control(ControlValue::InitRuntimeRequest { modules, .. }) => modules,
            other => panic!("expected init-runtime request, got {other:?}"),
        }
    }

    /// Full startup script: handshake, module list, init-runtime
    pub async fn boot(&mut self, descriptors: Vec<ModuleDescriptor>) -> Vec<ModuleChannels> {
        self.accept_handshake().await;
        self.serve_module_list(descriptors).await;
        self.expect_init_runtime().await
    }

    /// Send an rpc-request as if another runtime called `identifier`
    pub async fn call(&mut self, identifier: RemoteFunctionIdentifier, future_id: &str, parameters: Vec<Payload>) {
        let mut package = Package::with_control(ControlValue::RpcRequest(RemoteFunctionRequest {
            identifier: identifier.clone(),
            future_id: future_id.to_string(),
            parameters,
        }))
        .from_module("remote-caller");
        if let types::FunctionTarget::Module(module_id) = &identifier.target {
            package.target_module = module_id.clone();
        }
        self.send(package).await;
    }

    /// Wait for the rpc-response carrying `future_id`
    pub async fn expect_response(&mut self, future_id: &str) -> RemoteFunctionReturn {
        let package = self
            .recv_matching(|p| matches!(p.control(), Some(ControlValue::RpcResponse(r)) if r.future_id == future_id))
            .await;
        match package.body {
            PackageBody::Control(ControlValue::RpcResponse(response)) => response,
            _ => unreachable!(),
        }
    }

    /// Answer an outbound rpc-request
    pub async fn respond(&mut self, request: &Package, status: ExecutionStatus, payload: Option<Payload>) {
        let rpc = match request.control() {
            Some(ControlValue::RpcRequest(rpc)) => rpc,
            other => panic!("expected rpc-request, got {other:?}"),
        };
        let response = request.reply(PackageBody::Control(ControlValue::RpcResponse(RemoteFunctionReturn {
            identifier: rpc.identifier.clone(),
            future_id: rpc.future_id.clone(),
            status,
            payload,
        })));
        self.send(response).await;
    }
}

/// Start `factory` against a fake middleware hosting `descriptors`
pub async fn boot_runtime(
    factory: ModuleFactory,
    descriptors: Vec<ModuleDescriptor>,
) -> (RuntimeHandle, FakeMiddleware, Vec<ModuleChannels>) {
    boot_manager(ModuleManager::new(factory, settings()), descriptors).await
}

/// Start a prepared `manager` against a fake middleware
pub async fn boot_manager(
    manager: ModuleManager,
    descriptors: Vec<ModuleDescriptor>,
) -> (RuntimeHandle, FakeMiddleware, Vec<ModuleChannels>) {
    init_tracing();
    let (stream, mut middleware) = FakeMiddleware::pair();

    let script = async move {
        let channels = middleware.boot(descriptors).await;
        (middleware, channels)
    };
    let (started, (middleware, channels)) = tokio::join!(manager.start_with_stream(stream), script);
    (started.unwrap(), middleware, channels)
}
