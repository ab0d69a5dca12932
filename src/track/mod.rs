pub mod progress;
pub mod store;
pub mod uploader;

pub use progress::{UploadProgress, UploadState, BEGIN_ACK_METRIC, PACKET_ACK_METRIC};
pub use store::TrackStore;
pub use uploader::{TrackUploader, UploadStatus, MAX_CRITICAL_POINTS};
