pub mod downlink;
pub mod frame;
pub mod payload;

pub use downlink::{CarMessenger, DownlinkSink};
pub use frame::{DecoderState, Frame, FrameDecoder, FrameLayout};
pub use payload::{decode_value, Datatype, PayloadError};
