//! Connection Manager
//!
//! Owns the single bidirectional stream to the middleware. A connection is
//! only handed out after the ping/pong handshake; from then on two lanes run
//! concurrently:
//!
//! - **outbound lane**: drains the [`OutboundQueue`] to the stream writer in
//!   enqueue order
//! - **inbound lane**: reads frames and forwards each package to the
//!   [`Connection`] owner
//!
//! Either lane failing ends both. There is no reconnect; the owner observes
//! the end of the inbound lane as `recv() == None`.

use crate::address::StreamAddress;
use crate::framing::{FrameReader, FrameWriter, DEFAULT_MAX_MESSAGE_SIZE};
use crate::{Result, TransportError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use types::{ControlValue, ModuleChannels, ModuleDescriptor, Package, PackageBody};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for the outbound lane to flush on close
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Startup parameters handed through to the middleware
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub runtime_name: String,
    pub host_id: String,
    pub user_id: String,
    pub device_id: String,
    pub handshake_timeout: Duration,
    pub discovery_timeout: Duration,
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            runtime_name: types::DEFAULT_RUNTIME_NAME.to_string(),
            host_id: String::new(),
            user_id: String::new(),
            device_id: String::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ConnectionSettings {
    /// Fill unset source addressing with this runtime's identity
    fn stamp(&self, mut package: Package) -> Package {
        if package.source_host.is_empty() {
            package.source_host = self.host_id.clone();
        }
        if package.source_user_token.is_empty() {
            package.source_user_token = self.user_id.clone();
        }
        if package.device_id.is_empty() {
            package.device_id = self.device_id.clone();
        }
        package
    }
}

/// Many-producer handle into the outbound lane
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<Package>,
}

/// Single-consumer end of the outbound queue, consumed by the outbound lane
#[derive(Debug)]
pub struct OutboundDrain {
    rx: mpsc::UnboundedReceiver<Package>,
}

/// Create the outbound queue.
///
/// Packages enqueued before a connection exists are held until the
/// handshake completes and the outbound lane starts.
pub fn outbound_queue() -> (OutboundQueue, OutboundDrain) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutboundQueue { tx }, OutboundDrain { rx })
}

impl OutboundQueue {
    /// Fire-and-forget enqueue
    pub fn enqueue(&self, package: Package) -> Result<()> {
        self.tx
            .send(package)
            .map_err(|_| TransportError::closed("outbound queue closed"))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl OutboundDrain {
    /// Next queued package, used by tests that stand in for the stream
    pub async fn recv(&mut self) -> Option<Package> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Package> {
        self.rx.try_recv().ok()
    }
}

/// Opens middleware connections and performs the handshake
pub struct Dispatcher {
    settings: ConnectionSettings,
}

impl Dispatcher {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Open the stream at `address` and run the handshake
    pub async fn connect(
        &self,
        address: &StreamAddress,
        outbound: OutboundQueue,
        drain: OutboundDrain,
    ) -> Result<Connection> {
        info!(address = %address, runtime = %self.settings.runtime_name, "Connecting to middleware");
        match address {
            StreamAddress::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(|e| {
                    TransportError::connection_with_source(
                        "Failed to connect to middleware socket",
                        address.to_string(),
                        e,
                    )
                })?;
                self.attach(stream, outbound, drain).await
            }
            StreamAddress::Tcp(host_port) => {
                let stream = TcpStream::connect(host_port.as_str()).await.map_err(|e| {
                    TransportError::connection_with_source(
                        "Failed to connect to middleware",
                        address.to_string(),
                        e,
                    )
                })?;
                stream
                    .set_nodelay(true)
                    .map_err(|e| TransportError::network_with_source("Failed to set TCP_NODELAY", e))?;
                self.attach(stream, outbound, drain).await
            }
        }
    }

    /// Run the handshake on an already-open stream and start both lanes
    pub async fn attach<S>(
        &self,
        stream: S,
        outbound: OutboundQueue,
        drain: OutboundDrain,
    ) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, self.settings.max_message_size);
        let mut writer = FrameWriter::new(write_half, self.settings.max_message_size);

        self.handshake(&mut reader, &mut writer).await?;
        info!(runtime = %self.settings.runtime_name, "Handshake with middleware complete");

        let shutdown = CancellationToken::new();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let outbound_lane = tokio::spawn(run_outbound_lane(
            writer,
            drain,
            self.settings.clone(),
            shutdown.clone(),
        ));
        let inbound_lane = tokio::spawn(run_inbound_lane(reader, inbound_tx, shutdown.clone()));

        Ok(Connection {
            inbound: inbound_rx,
            outbound,
            settings: self.settings.clone(),
            shutdown,
            lanes: vec![outbound_lane, inbound_lane],
        })
    }

    async fn handshake<R, W>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let ping = self.settings.stamp(Package::with_control(ControlValue::Ping {
            runtime: self.settings.runtime_name.clone(),
        }));
        writer.write_package(&ping).await?;
        debug!(runtime = %self.settings.runtime_name, "Sent handshake ping");

        let timeout_ms = self.settings.handshake_timeout.as_millis() as u64;
        let reply = tokio::time::timeout(self.settings.handshake_timeout, reader.read_package())
            .await
            .map_err(|_| TransportError::timeout("handshake", timeout_ms))??
            .ok_or_else(|| TransportError::closed("stream closed during handshake"))?;

        match reply.control() {
            Some(ControlValue::Ping { runtime }) if *runtime == self.settings.runtime_name => Ok(()),
            Some(ControlValue::Ping { runtime }) => Err(TransportError::handshake(format!(
                "ping names runtime '{}', expected '{}'",
                runtime, self.settings.runtime_name
            ))),
            Some(other) => Err(TransportError::handshake(format!(
                "expected ping, received control '{}'",
                other.name()
            ))),
            None => Err(TransportError::handshake(format!(
                "expected ping, received data package on channel '{}'",
                reply.channel
            ))),
        }
    }
}

async fn run_outbound_lane<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut drain: OutboundDrain,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) {
    loop {
        let package = tokio::select! {
            biased;
            package = drain.rx.recv() => match package {
                Some(package) => package,
                None => break,
            },
            _ = shutdown.cancelled() => {
                // Flush whatever was queued before the close
                while let Ok(package) = drain.rx.try_recv() {
                    if !write_one(&mut writer, package, &settings).await {
                        break;
                    }
                }
                break;
            }
        };

        if !write_one(&mut writer, package, &settings).await {
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "Stream writer shutdown failed");
    }
    shutdown.cancel();
    debug!("Outbound lane finished");
}

/// Returns false once the stream is unusable
async fn write_one<W: AsyncWrite + Unpin>(
    writer: &mut FrameWriter<W>,
    package: Package,
    settings: &ConnectionSettings,
) -> bool {
    let package = settings.stamp(package);
    match writer.write_package(&package).await {
        Ok(()) => true,
        Err(e) if !e.is_fatal_to_connection() => {
            warn!(package_id = %package.id, channel = %package.channel, error = %e, "Dropping outbound package");
            true
        }
        Err(e) => {
            error!(error = %e, category = e.category(), "Outbound lane failed");
            false
        }
    }
}

async fn run_inbound_lane<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    inbound: mpsc::UnboundedSender<Package>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = reader.read_package() => next,
        };

        match next {
            Ok(Some(package)) => {
                if inbound.send(package).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Middleware closed the stream");
                break;
            }
            Err(e @ TransportError::Protocol { .. }) => {
                // Frame boundary is intact, only this body was unreadable
                warn!(error = %e, "Dropping malformed inbound frame");
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "Inbound lane failed");
                break;
            }
        }
    }

    shutdown.cancel();
    debug!("Inbound lane finished");
}

/// An established, handshaken middleware connection
pub struct Connection {
    inbound: mpsc::UnboundedReceiver<Package>,
    outbound: OutboundQueue,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
    lanes: Vec<JoinHandle<()>>,
}

impl Connection {
    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Next inbound package; `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Package> {
        self.inbound.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when either lane ends
    pub fn closed_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Ask the middleware which of `supported_classes` to instantiate.
    ///
    /// Packages arriving before the response are logged and dropped; no
    /// module exists yet that could receive them.
    pub async fn fetch_module_list(
        &mut self,
        supported_classes: Vec<String>,
    ) -> Result<Vec<ModuleDescriptor>> {
        let request = Package::with_control(ControlValue::ModuleListRequest {
            runtime: self.settings.runtime_name.clone(),
            supported_classes,
        });
        self.outbound.enqueue(request)?;

        let timeout_ms = self.settings.discovery_timeout.as_millis() as u64;
        let deadline = tokio::time::Instant::now() + self.settings.discovery_timeout;
        loop {
            let package = tokio::time::timeout_at(deadline, self.inbound.recv())
                .await
                .map_err(|_| TransportError::timeout("module discovery", timeout_ms))?
                .ok_or_else(|| TransportError::closed("stream closed during module discovery"))?;

            match package.body {
                PackageBody::Control(ControlValue::ModuleListResponse { descriptors }) => {
                    info!(modules = descriptors.len(), "Received module list");
                    return Ok(descriptors);
                }
                PackageBody::Control(ref control) => {
                    warn!(package_id = %package.id, control = control.name(), "Dropping control package received before module list");
                }
                PackageBody::Payload(_) => {
                    warn!(package_id = %package.id, channel = %package.channel, "Dropping data package received before module list");
                }
            }
        }
    }

    /// Advertise every module's channel examples to the middleware
    pub fn send_init_runtime(&self, modules: Vec<ModuleChannels>) -> Result<()> {
        debug!(modules = modules.len(), "Sending init-runtime request");
        self.outbound
            .enqueue(Package::with_control(ControlValue::InitRuntimeRequest {
                runtime: self.settings.runtime_name.clone(),
                modules,
            }))
    }

    /// Stop both lanes, flushing queued outbound packages first
    pub async fn close(mut self) {
        self.shutdown.cancel();
        for mut lane in self.lanes.drain(..) {
            if tokio::time::timeout(CLOSE_GRACE, &mut lane).await.is_err() {
                warn!("Connection lane did not stop in time; aborting");
                lane.abort();
            }
        }
        info!("Middleware connection closed");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
