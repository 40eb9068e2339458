//! Post-hoc KPI computation from simulation results.

use std::fmt;

use super::types::StepResult;

/// Aggregate key performance indicators derived from a complete simulation run.
///
/// Computed post-hoc from `Vec<StepResult>` to ensure consistency between
/// step data and reported metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiReport {
    /// Total PV energy (kWh).
    pub pv_kwh: f64,
    /// Total load energy (kWh).
    pub load_kwh: f64,
    /// Energy delivered by the battery (kWh).
    pub battery_discharge_kwh: f64,
    /// Energy taken in by the battery (kWh).
    pub battery_charge_kwh: f64,
    pub grid_import_kwh: f64,
    pub grid_export_kwh: f64,
    /// Highest grid import power with the battery (kW).
    pub peak_import_kw: f64,
    /// Highest grid import power load minus PV alone would have caused (kW).
    pub peak_import_no_battery_kw: f64,
    /// Round-trip efficiency reported by the dispatcher at the end (%).
    pub final_efficiency_pct: f64,
    pub min_soc: f64,
    pub max_soc: f64,
    /// Battery replacements during the run.
    pub replacements: usize,
    /// Lifetime capacity retention at the end (%).
    pub final_capacity_percent: f64,
}

impl KpiReport {
    /// Computes all KPIs from the complete step record vector.
    ///
    /// # Arguments
    ///
    /// * `results` - Complete simulation step results
    /// * `dt_hour` - Timestep duration in hours
    ///
    /// # Returns
    ///
    /// A `KpiReport` with all fields populated; all zero for an empty run.
    pub fn from_results(results: &[StepResult], dt_hour: f64) -> Self {
        let Some(last) = results.last() else {
            return Self {
                pv_kwh: 0.0,
                load_kwh: 0.0,
                battery_discharge_kwh: 0.0,
                battery_charge_kwh: 0.0,
                grid_import_kwh: 0.0,
                grid_export_kwh: 0.0,
                peak_import_kw: 0.0,
                peak_import_no_battery_kw: 0.0,
                final_efficiency_pct: 0.0,
                min_soc: 0.0,
                max_soc: 0.0,
                replacements: 0,
                final_capacity_percent: 0.0,
            };
        };

        let mut pv = 0.0_f64;
        let mut load = 0.0_f64;
        let mut discharge = 0.0_f64;
        let mut charge = 0.0_f64;
        let mut import = 0.0_f64;
        let mut export = 0.0_f64;
        let mut peak_import = 0.0_f64;
        let mut peak_no_battery = 0.0_f64;
        let mut min_soc = f64::INFINITY;
        let mut max_soc = f64::NEG_INFINITY;

        for r in results {
            pv += r.pv_kwh;
            load += r.load_kwh;
            if r.battery_kwh > 0.0 {
                discharge += r.battery_kwh;
            } else {
                charge -= r.battery_kwh;
            }
            if r.grid_kwh > 0.0 {
                export += r.grid_kwh;
            } else {
                import -= r.grid_kwh;
            }
            peak_import = peak_import.max(-r.grid_kwh / dt_hour);
            peak_no_battery = peak_no_battery.max((r.load_kwh - r.pv_kwh) / dt_hour);
            min_soc = min_soc.min(r.soc);
            max_soc = max_soc.max(r.soc);
        }

        Self {
            pv_kwh: pv,
            load_kwh: load,
            battery_discharge_kwh: discharge,
            battery_charge_kwh: charge,
            grid_import_kwh: import,
            grid_export_kwh: export,
            peak_import_kw: peak_import,
            peak_import_no_battery_kw: peak_no_battery,
            final_efficiency_pct: last.average_efficiency,
            min_soc,
            max_soc,
            replacements: last.replacements,
            final_capacity_percent: last.capacity_percent,
        }
    }
}

impl fmt::Display for KpiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- KPI Report ---")?;
        writeln!(f, "PV energy:             {:.1} kWh", self.pv_kwh)?;
        writeln!(f, "Load energy:           {:.1} kWh", self.load_kwh)?;
        writeln!(
            f,
            "Battery charge/disch.: {:.1} / {:.1} kWh",
            self.battery_charge_kwh, self.battery_discharge_kwh
        )?;
        writeln!(
            f,
            "Grid import/export:    {:.1} / {:.1} kWh",
            self.grid_import_kwh, self.grid_export_kwh
        )?;
        writeln!(
            f,
            "Peak import:           {:.2} kW ({:.2} kW without battery)",
            self.peak_import_kw, self.peak_import_no_battery_kw
        )?;
        writeln!(f, "Round-trip efficiency: {:.1}%", self.final_efficiency_pct)?;
        writeln!(f, "SoC range:             {:.1}% - {:.1}%", self.min_soc, self.max_soc)?;
        writeln!(f, "Replacements:          {}", self.replacements)?;
        write!(f, "Capacity retention:    {:.1}%", self.final_capacity_percent)
    }
}
