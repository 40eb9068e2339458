//! Battery storage simulator: capacity, voltage, lifetime and thermal
//! models behind a battery bank, driven by manual or automated
//! peak-shaving dispatch.

pub mod battery;
/// TOML scenarios, presets and model builders.
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod io;
/// Simulation engine, clock and KPI modules.
pub mod sim;
pub mod telemetry;
