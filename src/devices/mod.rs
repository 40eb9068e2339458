//! Synthetic input generators for demo scenarios: household load, PV and
//! ambient temperature.

/// Ambient temperature profile.
pub mod ambient;
/// Residential base-load profile generator.
pub mod baseload;
/// Solar photovoltaic generation model.
pub mod solar;
pub mod types;

pub use ambient::AmbientTemperature;
pub use baseload::BaseLoad;
pub use solar::SolarPv;
pub use types::Device;
