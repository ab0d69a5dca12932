pub mod policy;
pub mod resilient_computable;

pub use policy::ErrorPolicy;
pub use resilient_computable::{ComputeError, ResilientComputable};
