use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::Datapoint;

pub const BEGIN_ACK_METRIC: &str = "Track_Info_Control_Begin_ACK";
/// Value is the index of the acknowledged waypoint
pub const PACKET_ACK_METRIC: &str = "Track_Info_Control_Packet_ACK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    /// No route has ever been submitted
    Idle,
    SendingHeader,
    SendingPoint(usize),
    Complete,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::SendingHeader => write!(f, "SendingHeader"),
            Self::SendingPoint(i) => write!(f, "SendingPoint({})", i),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// Persisted position of one upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub header_pending: bool,
    pub point_index: usize,
    pub complete: bool,
}

impl UploadProgress {
    pub fn new_job() -> Self {
        Self {
            header_pending: true,
            point_index: 0,
            complete: false,
        }
    }

    pub fn state(&self) -> UploadState {
        if self.complete {
            UploadState::Complete
        } else if self.header_pending {
            UploadState::SendingHeader
        } else {
            UploadState::SendingPoint(self.point_index)
        }
    }

    /// Advance on an ACK for the packet currently outstanding. Returns false
    /// (and changes nothing) for any other ACK.
    pub fn apply_ack(&mut self, ack: &Datapoint, total: usize) -> bool {
        match (self.state(), ack.metric.as_str()) {
            (UploadState::SendingHeader, BEGIN_ACK_METRIC) => {
                self.header_pending = false;
                self.complete = total == 0;
                true
            }
            (UploadState::SendingPoint(i), PACKET_ACK_METRIC) if ack.value == i as f64 => {
                self.point_index = i + 1;
                self.complete = self.point_index >= total;
                true
            }
            _ => false,
        }
    }

    /// Clamp a progress record read from disk against the route it belongs to.
    pub fn normalize(mut self, total: usize) -> Self {
        if !self.header_pending && self.point_index >= total {
            self.complete = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(metric: &str, value: f64) -> Datapoint {
        Datapoint::now(metric, value)
    }

    #[test]
    fn test_full_sequence() {
        let mut p = UploadProgress::new_job();
        assert_eq!(p.state(), UploadState::SendingHeader);

        assert!(p.apply_ack(&ack(BEGIN_ACK_METRIC, 0.0), 2));
        assert_eq!(p.state(), UploadState::SendingPoint(0));
        assert!(p.apply_ack(&ack(PACKET_ACK_METRIC, 0.0), 2));
        assert_eq!(p.state(), UploadState::SendingPoint(1));
        assert!(p.apply_ack(&ack(PACKET_ACK_METRIC, 1.0), 2));
        assert_eq!(p.state(), UploadState::Complete);
    }

    #[test]
    fn test_mismatched_acks_ignored() {
        let mut p = UploadProgress::new_job();
        assert!(!p.apply_ack(&ack(PACKET_ACK_METRIC, 0.0), 2));
        assert!(p.apply_ack(&ack(BEGIN_ACK_METRIC, 0.0), 2));
        // duplicate header ACK
        assert!(!p.apply_ack(&ack(BEGIN_ACK_METRIC, 0.0), 2));
        assert!(!p.apply_ack(&ack(PACKET_ACK_METRIC, 1.0), 2));
        assert!(!p.apply_ack(&ack("Other", 0.0), 2));
        assert_eq!(p.state(), UploadState::SendingPoint(0));
    }

    #[test]
    fn test_empty_route_completes_after_header() {
        let mut p = UploadProgress::new_job();
        assert!(p.apply_ack(&ack(BEGIN_ACK_METRIC, 0.0), 0));
        assert_eq!(p.state(), UploadState::Complete);
    }

    #[test]
    fn test_normalize_past_end() {
        let p = UploadProgress {
            header_pending: false,
            point_index: 5,
            complete: false,
        };
        assert_eq!(p.normalize(3).state(), UploadState::Complete);
        assert_eq!(p.normalize(6).state(), UploadState::SendingPoint(5));
    }
}
