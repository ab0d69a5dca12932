use super::physics::{pack_efficiency, velocity_from_rpm, MOTOR_RADIUS_M};
use super::standard::StandardComputation;

/// `<base>` = `Left_<base>` + `Right_<base>`
pub fn left_right_sum(base: &str) -> StandardComputation {
    let (left, right) = (format!("Left_{base}"), format!("Right_{base}"));
    let fields = [left.as_str(), right.as_str()];
    let (l, r) = (left.clone(), right.clone());
    StandardComputation::new(base, &fields, move |v| v.get(&l) + v.get(&r))
}

/// `Average_<base>` = mean of `Left_<base>` and `Right_<base>`
pub fn left_right_average(base: &str) -> StandardComputation {
    let (left, right) = (format!("Left_{base}"), format!("Right_{base}"));
    let fields = [left.as_str(), right.as_str()];
    let (l, r) = (left.clone(), right.clone());
    StandardComputation::new(format!("Average_{base}"), &fields, move |v| (v.get(&l) + v.get(&r)) / 2.0)
}

pub fn left_bus_power() -> StandardComputation {
    StandardComputation::new("Left_Bus_Power", &["Left_Bus_Voltage", "Left_Bus_Current"], |v| {
        v.get("Left_Bus_Voltage") * v.get("Left_Bus_Current")
    })
}

pub fn right_bus_power() -> StandardComputation {
    StandardComputation::new("Right_Bus_Power", &["Right_Bus_Voltage", "Right_Bus_Current"], |v| {
        v.get("Right_Bus_Voltage") * v.get("Right_Bus_Current")
    })
}

/// Total high-voltage bus power
pub fn bus_power() -> StandardComputation {
    StandardComputation::new("Bus_Power", &["Left_Bus_Power", "Right_Bus_Power"], |v| {
        v.get("Left_Bus_Power") + v.get("Right_Bus_Power")
    })
}

/// Solar array power: MPPT input (reported in mW) plus both photon channels.
pub fn array_power() -> StandardComputation {
    StandardComputation::new(
        "Array_Power",
        &[
            "MG_0_Input_Power",
            "Photon_Channel_0_Array_Voltage",
            "Photon_Channel_0_Array_Current",
            "Photon_Channel_1_Array_Voltage",
            "Photon_Channel_1_Array_Current",
        ],
        |v| {
            v.get("MG_0_Input_Power") / 1000.0
                + v.get("Photon_Channel_0_Array_Voltage") * v.get("Photon_Channel_0_Array_Current")
                + v.get("Photon_Channel_1_Array_Voltage") * v.get("Photon_Channel_1_Array_Current")
        },
    )
}

pub fn velocity() -> StandardComputation {
    StandardComputation::new("RPM_Derived_Velocity", &["Average_Wavesculptor_RPM"], |v| {
        velocity_from_rpm(v.get("Average_Wavesculptor_RPM"), MOTOR_RADIUS_M)
    })
}

/// Depends on the derived `Pack_Resistance`, `Bus_Current` and `Bus_Power`.
pub fn pack_efficiency_computation() -> StandardComputation {
    StandardComputation::new("Pack_Efficiency", &["Bus_Current", "Bus_Power", "Pack_Resistance"], |v| {
        pack_efficiency(v.get("Bus_Current"), v.get("Bus_Power"), v.get("Pack_Resistance"))
    })
}
