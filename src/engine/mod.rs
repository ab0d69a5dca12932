pub mod computation_engine;
pub mod graph;
pub mod state;

pub use computation_engine::{ComputationEngine, EngineBuilder};
pub use graph::{GraphError, RoutingTable};
pub use state::EngineState;
