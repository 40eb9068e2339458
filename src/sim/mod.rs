//! Time-series driver: calendar clock, engine and post-run KPIs.

/// Simulation clock for timestep management.
pub mod clock;
pub mod engine;
pub mod kpi;
pub mod types;

pub use engine::{DispatchMode, DispatchSetup, Engine};
pub use kpi::KpiReport;
pub use types::{SimConfig, StepResult};
