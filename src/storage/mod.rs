pub mod memory;
pub mod recorder;
pub mod traits;

pub use memory::MemoryStore;
pub use recorder::Recorder;
pub use traits::DatapointStore;
