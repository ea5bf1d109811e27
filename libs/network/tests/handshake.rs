//! Handshake and lane behaviour against a scripted middleware peer

use network::{
    outbound_queue, ConnectionSettings, Dispatcher, FrameReader, FrameWriter, StreamAddress,
    TransportError, DEFAULT_MAX_MESSAGE_SIZE,
};
use std::time::Duration;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use types::{ControlValue, ModuleDescriptor, Package, Payload, PropertyMap};

type PeerReader = FrameReader<ReadHalf<DuplexStream>>;
type PeerWriter = FrameWriter<WriteHalf<DuplexStream>>;

fn peer(stream: DuplexStream) -> (PeerReader, PeerWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (
        FrameReader::new(read_half, DEFAULT_MAX_MESSAGE_SIZE),
        FrameWriter::new(write_half, DEFAULT_MAX_MESSAGE_SIZE),
    )
}

fn settings() -> ConnectionSettings {
    ConnectionSettings {
        host_id: "test-host".to_string(),
        user_id: "test-user".to_string(),
        device_id: "test-device".to_string(),
        ..ConnectionSettings::default()
    }
}

fn pong(runtime: &str) -> Package {
    Package::with_control(ControlValue::Ping {
        runtime: runtime.to_string(),
    })
}

#[tokio::test]
async fn handshake_then_packages_flow_in_order() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (queue, drain) = outbound_queue();

    // Queued before the connection exists; must follow the ping on the wire
    queue
        .enqueue(Package::with_payload(Payload::new("int64".into(), vec![1; 8])).on_channel("early"))
        .unwrap();

    let middleware = tokio::spawn(async move {
        let (mut reader, mut writer) = peer(server);
        let ping = reader.read_package().await.unwrap().unwrap();
        assert!(matches!(ping.control(), Some(ControlValue::Ping { runtime }) if runtime == "RUNTIME_RUST"));
        assert_eq!(ping.source_host, "test-host");
        writer.write_package(&pong("RUNTIME_RUST")).await.unwrap();

        let mut channels = Vec::new();
        for _ in 0..3 {
            let package = reader.read_package().await.unwrap().unwrap();
            assert_eq!(package.device_id, "test-device");
            channels.push(package.channel);
        }
        channels
    });

    let dispatcher = Dispatcher::new(settings());
    let connection = dispatcher.attach(client, queue.clone(), drain).await.unwrap();
    for channel in ["second", "third"] {
        queue
            .enqueue(Package::with_payload(Payload::new("bool".into(), vec![0])).on_channel(channel))
            .unwrap();
    }

    let channels = middleware.await.unwrap();
    assert_eq!(channels, vec!["early", "second", "third"]);
    connection.close().await;
}

#[tokio::test]
async fn non_ping_during_handshake_fails_connection() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (queue, drain) = outbound_queue();

    tokio::spawn(async move {
        let (mut reader, mut writer) = peer(server);
        let _ping = reader.read_package().await.unwrap();
        writer
            .write_package(&Package::with_control(ControlValue::ConnectedToRemoteServer))
            .await
            .unwrap();
        // keep the stream open until the client gives up
        let _ = reader.read_package().await;
    });

    let err = Dispatcher::new(settings())
        .attach(client, queue, drain)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::Handshake { .. }), "{err}");
}

#[tokio::test]
async fn ping_for_other_runtime_fails_connection() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (queue, drain) = outbound_queue();

    tokio::spawn(async move {
        let (mut reader, mut writer) = peer(server);
        let _ping = reader.read_package().await.unwrap();
        writer.write_package(&pong("RUNTIME_JAVA")).await.unwrap();
        let _ = reader.read_package().await;
    });

    let err = Dispatcher::new(settings())
        .attach(client, queue, drain)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::Handshake { .. }));
}

#[tokio::test(start_paused = true)]
async fn silent_middleware_times_out_handshake() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (queue, drain) = outbound_queue();

    let settings = ConnectionSettings {
        handshake_timeout: Duration::from_millis(250),
        ..settings()
    };
    let err = Dispatcher::new(settings)
        .attach(client, queue, drain)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::Timeout { timeout_ms: 250, .. }));
    drop(server);
}

#[tokio::test]
async fn module_list_discovery_skips_early_packages() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (queue, drain) = outbound_queue();

    tokio::spawn(async move {
        let (mut reader, mut writer) = peer(server);
        let _ping = reader.read_package().await.unwrap();
        writer.write_package(&pong("RUNTIME_RUST")).await.unwrap();

        let request = reader.read_package().await.unwrap().unwrap();
        let classes = match request.control() {
            Some(ControlValue::ModuleListRequest { supported_classes, .. }) => supported_classes.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(classes, vec!["Logger".to_string()]);

        writer
            .write_package(&Package::with_control(ControlValue::ConnectedToRemoteServer))
            .await
            .unwrap();
        writer
            .write_package(&Package::with_control(ControlValue::ModuleListResponse {
                descriptors: vec![ModuleDescriptor {
                    module_id: "logger-1".to_string(),
                    module_class: "Logger".to_string(),
                    properties: PropertyMap::new(),
                }],
            }))
            .await
            .unwrap();
        let _ = reader.read_package().await;
    });

    let mut connection = Dispatcher::new(settings())
        .attach(client, queue, drain)
        .await
        .unwrap();
    let descriptors = connection
        .fetch_module_list(vec!["Logger".to_string()])
        .await
        .unwrap();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].module_id, "logger-1");
}

#[tokio::test]
async fn stream_close_ends_inbound_lane() {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (queue, drain) = outbound_queue();

    tokio::spawn(async move {
        let (mut reader, mut writer) = peer(server);
        let _ping = reader.read_package().await.unwrap();
        writer.write_package(&pong("RUNTIME_RUST")).await.unwrap();
        writer
            .write_package(&Package::with_control(ControlValue::DisconnectedFromRemoteServer))
            .await
            .unwrap();
        // dropping both halves closes the stream
    });

    let mut connection = Dispatcher::new(settings())
        .attach(client, queue, drain)
        .await
        .unwrap();

    let first = connection.recv().await.unwrap();
    assert!(matches!(
        first.control(),
        Some(ControlValue::DisconnectedFromRemoteServer)
    ));
    assert!(connection.recv().await.is_none());
    assert!(connection.is_closed());
}

#[tokio::test]
async fn connects_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("middleware.sock");
    let listener = tokio::net::UnixListener::bind(&path).unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FrameReader::new(read_half, DEFAULT_MAX_MESSAGE_SIZE);
        let mut writer = FrameWriter::new(write_half, DEFAULT_MAX_MESSAGE_SIZE);
        let _ping = reader.read_package().await.unwrap();
        writer.write_package(&pong("RUNTIME_RUST")).await.unwrap();
        let _ = reader.read_package().await;
    });

    let address: StreamAddress = format!("unix://{}", path.display()).parse().unwrap();
    let (queue, drain) = outbound_queue();
    let connection = Dispatcher::new(settings())
        .connect(&address, queue, drain)
        .await
        .unwrap();
    assert!(!connection.is_closed());
    connection.close().await;
}
