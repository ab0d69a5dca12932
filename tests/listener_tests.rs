use std::sync::Arc;
use std::time::Duration;

use solarstream::config::{HubConfig, MetricConfig, MetricTable};
use solarstream::core::{Datapoint, CONNECTION_STATUS_METRIC};
use solarstream::hub::{DatapointHub, MetricFilter, Subscription};
use solarstream::listener::{
    serve_tcp, serve_udp, ConnectionMonitor, ConnectionRegistry, DownlinkBroadcaster, Ingest,
};
use solarstream::protocol::{CarMessenger, DownlinkSink, FrameLayout};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

fn metric(can_id: u16, datatype: &str, name: &str, offset: usize) -> MetricConfig {
    MetricConfig {
        can_id,
        datatype: datatype.to_string(),
        name: name.to_string(),
        offset,
        check_bounds: false,
        min_value: 0.0,
        max_value: 0.0,
        description: String::new(),
    }
}

fn ingest(hub: &DatapointHub) -> Ingest {
    let table = MetricTable::from_configs(vec![
        metric(0x100, "uint16", "Left_Bus_Voltage", 0),
        metric(0x100, "float32", "Left_Bus_Current", 2),
        metric(0x200, "bit", "Horn", 9),
    ])
    .unwrap();
    Ingest::new(Arc::new(table), hub.clone(), FrameLayout::default())
}

fn bus_frame(voltage: u16, current: f32) -> Vec<u8> {
    let mut payload = voltage.to_le_bytes().to_vec();
    payload.extend_from_slice(&current.to_le_bytes());
    FrameLayout::default().encode(0x100, &payload)
}

async fn next(sub: &mut Subscription) -> Datapoint {
    timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("timed out waiting for datapoint")
        .expect("hub closed")
}

async fn wait_for_connections(registry: &ConnectionRegistry, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while registry.len() != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count never reached the expected value");
}

async fn start_tcp(hub: &DatapointHub) -> (std::net::SocketAddr, Arc<ConnectionRegistry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(ConnectionRegistry::new());
    tokio::spawn(serve_tcp(listener, ingest(hub), registry.clone(), 10));
    (addr, registry)
}

#[tokio::test]
async fn test_tcp_stream_with_noise_is_decoded() {
    let hub = DatapointHub::start(&HubConfig::default());
    let mut sub = hub.subscribe(MetricFilter::only(["Left_Bus_Voltage", "Left_Bus_Current", "Horn"])).unwrap();
    let (addr, registry) = start_tcp(&hub).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut bytes = vec![0xAA, b'G', 0x00, 0x13];
    bytes.extend(bus_frame(96, 4.5));
    // id 0x300 is not configured and decodes to nothing
    bytes.extend(FrameLayout::default().encode(0x300, &[1, 2, 3]));
    bytes.extend(FrameLayout::default().encode(0x200, &[0x00, 0b0000_0010]));
    client.write_all(&bytes[..7]).await.unwrap();
    client.flush().await.unwrap();
    sleep(Duration::from_millis(20)).await;
    client.write_all(&bytes[7..]).await.unwrap();

    let voltage = next(&mut sub).await;
    assert_eq!((voltage.metric.as_str(), voltage.value), ("Left_Bus_Voltage", 96.0));
    let current = next(&mut sub).await;
    assert_eq!((current.metric.as_str(), current.value), ("Left_Bus_Current", 4.5));
    let horn = next(&mut sub).await;
    assert_eq!((horn.metric.as_str(), horn.value), ("Horn", 1.0));

    wait_for_connections(&registry, 1).await;
    drop(client);
    wait_for_connections(&registry, 0).await;
    hub.close().await;
}

#[tokio::test]
async fn test_each_connection_decodes_independently() {
    let hub = DatapointHub::start(&HubConfig::default());
    let mut sub = hub.subscribe(MetricFilter::only(["Left_Bus_Voltage"])).unwrap();
    let (addr, registry) = start_tcp(&hub).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    wait_for_connections(&registry, 2).await;

    // a half frame on one connection must not corrupt the other
    let frame = bus_frame(50, 1.0);
    first.write_all(&frame[..5]).await.unwrap();
    first.flush().await.unwrap();
    second.write_all(&bus_frame(70, 1.0)).await.unwrap();
    assert_eq!(next(&mut sub).await.value, 70.0);

    first.write_all(&frame[5..]).await.unwrap();
    assert_eq!(next(&mut sub).await.value, 50.0);

    hub.close().await;
}

#[tokio::test]
async fn test_downlink_broadcast_reaches_every_connection() {
    let hub = DatapointHub::start(&HubConfig::default());
    let (addr, registry) = start_tcp(&hub).await;
    let (broadcaster, _writer) = DownlinkBroadcaster::start(registry.clone(), 16);
    let messenger = CarMessenger::new(b"GT".to_vec(), Arc::new(broadcaster) as Arc<dyn DownlinkSink>);

    let mut first = TcpStream::connect(addr).await.unwrap();
    let mut second = TcpStream::connect(addr).await.unwrap();
    wait_for_connections(&registry, 2).await;

    messenger.send_chat("hi").await.unwrap();

    for client in [&mut first, &mut second] {
        let mut buf = [0u8; 6];
        timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for downlink")
            .unwrap();
        assert_eq!(&buf, b"GTc\x02hi");
    }

    hub.close().await;
}

#[tokio::test]
async fn test_udp_datagram_with_several_frames() {
    let hub = DatapointHub::start(&HubConfig::default());
    let mut sub = hub.subscribe(MetricFilter::only(["Left_Bus_Voltage"])).unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(serve_udp(socket, ingest(&hub)));

    let mut datagram = bus_frame(10, 0.0);
    datagram.extend(bus_frame(20, 0.0));
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&datagram, addr).await.unwrap();

    assert_eq!(next(&mut sub).await.value, 10.0);
    assert_eq!(next(&mut sub).await.value, 20.0);

    // a truncated trailing frame is not carried into the next datagram
    let partial = bus_frame(30, 0.0);
    client.send_to(&partial[..6], addr).await.unwrap();
    client.send_to(&bus_frame(40, 0.0), addr).await.unwrap();
    assert_eq!(next(&mut sub).await.value, 40.0);

    hub.close().await;
}

#[tokio::test]
async fn test_monitor_reports_connect_and_timeout() {
    let hub = DatapointHub::start(&HubConfig::default());
    let mut status = hub.subscribe(MetricFilter::only([CONNECTION_STATUS_METRIC])).unwrap();
    let monitor = ConnectionMonitor::new(hub.clone(), Duration::from_millis(100)).unwrap();
    let handle = tokio::spawn(monitor.run());

    hub.publish(Datapoint::now("Left_Bus_Voltage", 1.0)).await.unwrap();
    assert_eq!(next(&mut status).await.value, 1.0);

    // further traffic does not repeat the status
    hub.publish(Datapoint::now("Left_Bus_Voltage", 2.0)).await.unwrap();
    assert_eq!(next(&mut status).await.value, 0.0);

    hub.publish(Datapoint::now("Left_Bus_Voltage", 3.0)).await.unwrap();
    assert_eq!(next(&mut status).await.value, 1.0);

    hub.close().await;
    timeout(Duration::from_secs(2), handle).await.unwrap().unwrap().unwrap();
}
