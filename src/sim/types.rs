//! Core simulation types: run configuration and per-step records.

use std::fmt;

use crate::dispatch::schedule::{HOURS_PER_DAY, HOURS_PER_YEAR};

/// Centralized simulation configuration.
///
/// The battery, the dispatcher and the input generators all take their step
/// length from here.
///
/// # Examples
///
/// ```
/// use batt_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(1, 1, 42);
/// assert_eq!(cfg.dt_hour, 1.0);
/// assert_eq!(cfg.total_steps(), 8760);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Number of simulation steps per hour.
    pub steps_per_hour: usize,
    /// Number of 8760-hour years to simulate.
    pub years: usize,
    /// Duration of one timestep in hours, derived as `1.0 / steps_per_hour`.
    pub dt_hour: f64,
    /// Master random seed for the input generators.
    pub seed: u64,
}

impl SimConfig {
    /// Creates a new simulation configuration.
    ///
    /// # Arguments
    ///
    /// * `steps_per_hour` - Number of timesteps per hour (must be > 0)
    /// * `years` - Number of years to simulate (must be > 0)
    /// * `seed` - Master random seed
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_hour` or `years` is zero.
    pub fn new(steps_per_hour: usize, years: usize, seed: u64) -> Self {
        assert!(steps_per_hour > 0, "steps_per_hour must be > 0");
        assert!(years > 0, "years must be > 0");
        Self {
            steps_per_hour,
            years,
            dt_hour: 1.0 / steps_per_hour as f64,
            seed,
        }
    }

    pub fn steps_per_day(&self) -> usize {
        HOURS_PER_DAY * self.steps_per_hour
    }

    pub fn steps_per_year(&self) -> usize {
        HOURS_PER_YEAR * self.steps_per_hour
    }

    /// Total number of simulation steps across all years.
    pub fn total_steps(&self) -> usize {
        self.steps_per_year() * self.years
    }
}

/// Complete record of one simulation timestep.
///
/// Energies are kWh for the step; battery energy is positive when
/// discharging and grid energy positive when exporting.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Timestep index from the start of the run.
    pub timestep: usize,
    /// Zero-based simulation year.
    pub year: usize,
    pub hour_of_year: usize,
    /// Sub-step within the hour.
    pub step: usize,
    pub pv_kwh: f64,
    pub load_kwh: f64,
    pub battery_kwh: f64,
    pub grid_kwh: f64,
    pub pv_to_load_kwh: f64,
    pub battery_to_load_kwh: f64,
    pub grid_to_load_kwh: f64,
    pub pv_to_battery_kwh: f64,
    pub grid_to_battery_kwh: f64,
    /// State of charge after the step (%).
    pub soc: f64,
    /// Realized battery current (A, negative charging).
    pub current_a: f64,
    pub battery_voltage: f64,
    pub temperature_c: f64,
    /// Lifetime capacity retention (%).
    pub capacity_percent: f64,
    /// Effective maximum charge (Ah).
    pub qmax_ah: f64,
    /// Half-cycles counted since the last replacement.
    pub cycles: usize,
    /// Replacements since the start of the run.
    pub replacements: usize,
    /// Round-trip efficiency so far (%).
    pub average_efficiency: f64,
    /// Whether the day-ahead scheduler wrote a new plan this step.
    pub replanned: bool,
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>6} (y{} h{:>4}.{}) | pv={:>6.2} load={:>6.2} bat={:>7.2} grid={:>7.2} kWh \
             | SoC={:>5.1}% V={:>6.1} T={:>5.1}C cap={:>5.1}% cycles={}",
            self.timestep,
            self.year,
            self.hour_of_year,
            self.step,
            self.pv_kwh,
            self.load_kwh,
            self.battery_kwh,
            self.grid_kwh,
            self.soc,
            self.battery_voltage,
            self.temperature_c,
            self.capacity_percent,
            self.cycles,
        )
    }
}

#[cfg(test)]
pub(crate) fn sample_step(timestep: usize) -> StepResult {
    StepResult {
        timestep,
        year: 0,
        hour_of_year: timestep,
        step: 0,
        pv_kwh: 2.5,
        load_kwh: 1.0,
        battery_kwh: -1.0,
        grid_kwh: 0.5,
        pv_to_load_kwh: 1.0,
        battery_to_load_kwh: 0.0,
        grid_to_load_kwh: 0.0,
        pv_to_battery_kwh: 1.0,
        grid_to_battery_kwh: 0.0,
        soc: 48.0,
        current_a: -2.5,
        battery_voltage: 400.0,
        temperature_c: 25.0,
        capacity_percent: 100.0,
        qmax_ah: 50.0,
        cycles: 0,
        replacements: 0,
        average_efficiency: 100.0,
        replanned: false,
    }
}
