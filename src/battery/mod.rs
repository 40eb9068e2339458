//! Battery physics: capacity, voltage, lifetime, thermal and loss models
//! composed by the [`Battery`] orchestrator.

/// Charge-capacity models.
pub mod capacity;
/// Lookup curves and linear interpolation.
pub mod curve;
/// Cycle-life degradation via rainflow counting.
pub mod lifetime;
/// Lifetime and thermal feedback onto capacity.
pub mod losses;
/// Per-step composition of the sub-models.
pub mod orchestrator;
/// Lumped-mass battery thermal model.
pub mod thermal;
/// Terminal-voltage models.
pub mod voltage;

pub use capacity::{Capacity, CapacityModel, KibamCapacity, LithiumIonCapacity};
pub use lifetime::{DegradationTable, Lifetime, ReplacementPolicy};
pub use losses::Losses;
pub use orchestrator::Battery;
pub use thermal::Thermal;
pub use voltage::{BasicVoltage, DischargeCurve, DynamicVoltage, Voltage, VoltageModel};

/// Direction of current flow through the battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeMode {
    /// Negative current.
    Charge,
    /// Positive current.
    Discharge,
    Idle,
}

impl ChargeMode {
    /// Classifies a signed current (negative = charging).
    pub fn from_current(current: f64) -> Self {
        if current < 0.0 {
            Self::Charge
        } else if current > 0.0 {
            Self::Discharge
        } else {
            Self::Idle
        }
    }
}
