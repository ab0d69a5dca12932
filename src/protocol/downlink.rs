use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::core::Waypoint;

pub const CHAT_CLASSIFIER: u8 = b'c';
pub const WAYPOINT_CLASSIFIER: u8 = b'd';
pub const ROUTE_BEGIN_CLASSIFIER: u8 = b't';

/// Destination for encoded downlink packets (the connection broadcaster in production).
#[async_trait]
pub trait DownlinkSink: Send + Sync {
    async fn write(&self, packet: Vec<u8>) -> Result<()>;
}

/// Encodes and sends `prefix | classifier | body` packets to the car
#[derive(Clone)]
pub struct CarMessenger {
    prefix: Vec<u8>,
    sink: Arc<dyn DownlinkSink>,
}

impl CarMessenger {
    pub fn new(prefix: impl Into<Vec<u8>>, sink: Arc<dyn DownlinkSink>) -> Self {
        Self {
            prefix: prefix.into(),
            sink,
        }
    }

    fn packet(&self, classifier: u8, body_len: usize) -> Vec<u8> {
        let mut packet = Vec::with_capacity(self.prefix.len() + 1 + body_len);
        packet.extend_from_slice(&self.prefix);
        packet.push(classifier);
        packet
    }

    pub fn encode_chat(&self, text: &str) -> Result<Vec<u8>> {
        let len = u8::try_from(text.len())
            .map_err(|_| anyhow!("chat message is {} bytes, limit is 255", text.len()))?;
        let mut packet = self.packet(CHAT_CLASSIFIER, 1 + text.len());
        packet.push(len);
        packet.extend_from_slice(text.as_bytes());
        Ok(packet)
    }

    pub fn encode_route_begin(&self, point_count: usize) -> Result<Vec<u8>> {
        let count = u8::try_from(point_count)
            .map_err(|_| anyhow!("route has {} critical points, limit is 255", point_count))?;
        let mut packet = self.packet(ROUTE_BEGIN_CLASSIFIER, 1);
        packet.push(count);
        Ok(packet)
    }

    pub fn encode_waypoint(&self, index: usize, point: &Waypoint) -> Result<Vec<u8>> {
        let index = u8::try_from(index)
            .map_err(|_| anyhow!("waypoint index {} does not fit in one byte", index))?;
        let mut packet = self.packet(WAYPOINT_CLASSIFIER, 13);
        packet.push(index);
        packet.extend_from_slice(&(point.latitude as f32).to_le_bytes());
        packet.extend_from_slice(&(point.longitude as f32).to_le_bytes());
        packet.extend_from_slice(&(point.speed as f32).to_le_bytes());
        Ok(packet)
    }

    pub async fn send_chat(&self, text: &str) -> Result<()> {
        let packet = self.encode_chat(text)?;
        self.sink.write(packet).await
    }

    pub async fn send_route_begin(&self, point_count: usize) -> Result<()> {
        let packet = self.encode_route_begin(point_count)?;
        self.sink.write(packet).await
    }

    pub async fn send_waypoint(&self, index: usize, point: &Waypoint) -> Result<()> {
        let packet = self.encode_waypoint(index, point)?;
        self.sink.write(packet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        packets: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl DownlinkSink for CapturingSink {
        async fn write(&self, packet: Vec<u8>) -> Result<()> {
            self.packets.lock().await.push(packet);
            Ok(())
        }
    }

    fn messenger() -> (CarMessenger, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::default());
        (CarMessenger::new("GT", sink.clone()), sink)
    }

    #[test]
    fn test_chat_encoding() {
        let (m, _) = messenger();
        assert_eq!(
            m.encode_chat("Go 40").unwrap(),
            vec![b'G', b'T', b'c', 5, b'G', b'o', b' ', b'4', b'0']
        );
        assert_eq!(m.encode_chat("").unwrap(), vec![b'G', b'T', b'c', 0]);
        assert!(m.encode_chat(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_waypoint_encoding() {
        let (m, _) = messenger();
        let point = Waypoint {
            distance: 10.0,
            latitude: 24.24,
            longitude: 25.25,
            speed: 88.0,
            critical: true,
        };
        let mut expected = vec![b'G', b'T', b'd', 42];
        expected.extend_from_slice(&24.24f32.to_le_bytes());
        expected.extend_from_slice(&25.25f32.to_le_bytes());
        expected.extend_from_slice(&88f32.to_le_bytes());
        assert_eq!(m.encode_waypoint(42, &point).unwrap(), expected);
        assert!(m.encode_waypoint(256, &point).is_err());
    }

    #[test]
    fn test_route_begin_encoding() {
        let (m, _) = messenger();
        assert_eq!(m.encode_route_begin(2).unwrap(), vec![b'G', b'T', b't', 2]);
        assert!(m.encode_route_begin(300).is_err());
    }

    #[tokio::test]
    async fn test_send_writes_to_sink() {
        let (m, sink) = messenger();
        m.send_chat("hi").await.unwrap();
        m.send_route_begin(1).await.unwrap();
        let packets = sink.packets.lock().await;
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1], vec![b'G', b'T', b't', 1]);
    }
}
