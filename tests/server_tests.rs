use std::sync::Arc;
use std::time::Duration;

use solarstream::config::ServerConfig;
use solarstream::core::{Waypoint, CONNECTION_STATUS_METRIC};
use solarstream::hub::MetricFilter;
use solarstream::protocol::FrameLayout;
use solarstream::service::TelemetryServer;
use solarstream::storage::{DatapointStore, MemoryStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const BUS_CONFIGS: &str = r#"[
    {"can_id": 256, "datatype": "float32", "name": "Left_Bus_Voltage", "offset": 0},
    {"can_id": 256, "datatype": "float32", "name": "Left_Bus_Current", "offset": 4},
    {"can_id": 257, "datatype": "float32", "name": "Right_Bus_Voltage", "offset": 0},
    {"can_id": 257, "datatype": "float32", "name": "Right_Bus_Current", "offset": 4},
    {"can_id": 768, "datatype": "uint8", "name": "Track_Info_Control_Begin_ACK", "offset": 0}
]"#;

fn float_frame(can_id: u16, a: f32, b: f32) -> Vec<u8> {
    let mut payload = a.to_le_bytes().to_vec();
    payload.extend_from_slice(&b.to_le_bytes());
    FrameLayout::default().encode(can_id, &payload)
}

fn server_config(configs: &tempfile::TempDir, track: &tempfile::TempDir) -> ServerConfig {
    std::fs::write(configs.path().join("bus.json"), BUS_CONFIGS).unwrap();
    ServerConfig {
        tcp_addr: "127.0.0.1:0".to_string(),
        udp_addr: "127.0.0.1:0".to_string(),
        metric_config_dir: configs.path().to_path_buf(),
        track_dir: track.path().to_path_buf(),
        ..ServerConfig::default()
    }
}

async fn start_server(configs: &tempfile::TempDir, track: &tempfile::TempDir) -> TelemetryServer {
    TelemetryServer::start(server_config(configs, track)).await.unwrap()
}

#[tokio::test]
async fn test_uplink_to_derived_metric_and_storage() {
    let (configs, track) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let server = start_server(&configs, &track).await;
    let mut derived = server
        .hub()
        .subscribe(MetricFilter::only(["Bus_Power", CONNECTION_STATUS_METRIC]))
        .unwrap();

    let mut car = TcpStream::connect(server.tcp_addr()).await.unwrap();
    let mut bytes = float_frame(256, 100.0, 2.0);
    bytes.extend(float_frame(257, 100.0, 3.0));
    car.write_all(&bytes).await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let point = timeout(Duration::from_secs(2), derived.recv()).await.unwrap().unwrap();
        seen.push((point.metric, point.value));
    }
    assert!(seen.contains(&(CONNECTION_STATUS_METRIC.to_string(), 1.0)));
    assert!(seen.contains(&("Bus_Power".to_string(), 500.0)));

    // the recorder flushes once per second
    let store = server.store().clone();
    timeout(Duration::from_secs(3), async {
        while store.latest("Bus_Power").await.unwrap().is_none() {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("Bus_Power never reached the store");
    assert!(store.list_metrics().await.unwrap().contains(&"Left_Bus_Voltage".to_string()));

    server.shutdown().await;
}

#[tokio::test]
async fn test_route_upload_over_tcp() {
    let (configs, track) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let server = start_server(&configs, &track).await;

    let mut car = TcpStream::connect(server.tcp_addr()).await.unwrap();
    // any car data marks the car connected
    car.write_all(&float_frame(256, 90.0, 1.0)).await.unwrap();

    let route = vec![Waypoint {
        distance: 0.0,
        latitude: 1.5,
        longitude: -2.5,
        speed: 10.0,
        critical: true,
    }];
    server.uploader().submit_route(route).await.unwrap();

    let mut header = [0u8; 4];
    timeout(Duration::from_secs(2), car.read_exact(&mut header)).await.unwrap().unwrap();
    assert_eq!(&header, b"GTt\x01");

    // the car acknowledges through a regular uplink frame
    let mut ack = FrameLayout::default().encode(768, &[1]);
    ack.extend(float_frame(256, 90.0, 1.0));
    car.write_all(&ack).await.unwrap();

    let mut waypoint = [0u8; 16];
    loop {
        timeout(Duration::from_secs(2), car.read_exact(&mut waypoint[..4])).await.unwrap().unwrap();
        if &waypoint[..3] == b"GTd" {
            break;
        }
        // header resend
        assert_eq!(&waypoint[..4], b"GTt\x01");
    }
    car.read_exact(&mut waypoint[4..]).await.unwrap();
    assert_eq!(waypoint[3], 0);
    assert_eq!(f32::from_le_bytes([waypoint[4], waypoint[5], waypoint[6], waypoint[7]]), 1.5);
    assert_eq!(f32::from_le_bytes([waypoint[8], waypoint[9], waypoint[10], waypoint[11]]), -2.5);
    assert_eq!(f32::from_le_bytes([waypoint[12], waypoint[13], waypoint[14], waypoint[15]]), 10.0);

    assert!(server.uploader().status().connected);
    assert!(server.hub().stats().published > 0);
    server.shutdown().await;
}

#[tokio::test]
async fn test_missing_metric_config_dir_fails_startup() {
    let track = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        tcp_addr: "127.0.0.1:0".to_string(),
        udp_addr: "127.0.0.1:0".to_string(),
        metric_config_dir: track.path().join("does-not-exist"),
        track_dir: track.path().to_path_buf(),
        ..ServerConfig::default()
    };
    assert!(TelemetryServer::start(config).await.is_err());
}

#[tokio::test]
async fn test_records_into_injected_store() {
    let (configs, track) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let mut config = server_config(&configs, &track);
    config.storage.flush_interval_ms = 50;
    let store = Arc::new(MemoryStore::with_retention(2));
    let server = TelemetryServer::start_with_store(config, store.clone()).await.unwrap();

    let mut car = TcpStream::connect(server.tcp_addr()).await.unwrap();
    for voltage in [90.0, 91.0, 92.0, 93.0] {
        car.write_all(&float_frame(256, voltage, 1.0)).await.unwrap();
    }

    timeout(Duration::from_secs(3), async {
        while store.latest("Left_Bus_Voltage").await.unwrap().map(|p| p.value) != Some(93.0) {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("last voltage never reached the injected store");

    let start = chrono::Utc::now() - chrono::Duration::minutes(1);
    let kept = store.query("Left_Bus_Voltage", start, chrono::Utc::now()).await.unwrap();
    assert_eq!(kept.iter().map(|p| p.value).collect::<Vec<_>>(), vec![92.0, 93.0]);

    server.shutdown().await;
}
