pub mod acceleration;
pub mod formulas;
pub mod integral;
pub mod pack_resistance;
pub mod physics;
pub mod soc;
pub mod standard;

pub use acceleration::Acceleration;
pub use integral::CumulativeIntegral;
pub use pack_resistance::PackResistance;
pub use soc::{lookup_soc, StateOfCharge};
pub use standard::{StandardComputation, Values};

use crate::core::Computable;

/// Every computable the server runs, in registration order. The engine
/// validates the resulting graph at startup.
pub fn default_computables() -> Vec<Box<dyn Computable>> {
    vec![
        Box::new(formulas::left_right_average("Bus_Voltage")),
        Box::new(formulas::left_right_sum("Bus_Current")),
        Box::new(formulas::left_bus_power()),
        Box::new(formulas::right_bus_power()),
        Box::new(formulas::bus_power()),
        Box::new(formulas::array_power()),
        Box::new(formulas::left_right_average("Wavesculptor_RPM")),
        Box::new(formulas::velocity()),
        Box::new(Acceleration::rpm_derived()),
        Box::new(CumulativeIntegral::distance()),
        Box::new(StateOfCharge::new()),
        Box::new(PackResistance::new()),
        Box::new(formulas::pack_efficiency_computation()),
        Box::new(CumulativeIntegral::charge_consumed("BMS")),
        Box::new(CumulativeIntegral::charge_consumed("Bus")),
    ]
}
