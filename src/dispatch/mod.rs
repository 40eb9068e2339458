//! Energy dispatch: shared controllers, the manual rule evaluator and the
//! automated day-ahead peak-shaving scheduler.
//!
//! Energies are in kWh per step. Positive battery energy means discharging;
//! positive grid energy means export.

/// Automated look-ahead peak shaving.
pub mod automated;
/// Schedule-driven rule evaluator.
pub mod manual;
/// Month x time-of-day profile table.
pub mod schedule;

pub use automated::{AutomatedDispatch, DayPlan};
pub use manual::ManualDispatch;
pub use schedule::{DispatchProfile, Schedule, month_hour};

use crate::battery::Battery;
use crate::error::{ModelError, Result};

const WATT_TO_KILOWATT: f64 = 0.001;
const KILOWATT_TO_WATT: f64 = 1000.0;
const HOUR_TO_MIN: f64 = 60.0;
/// Dwell time the switch controller starts with, so the first flip is free (min).
const INITIAL_TIME_AT_MODE: f64 = 1000.0;

/// Where the battery connects to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    /// Behind its own inverter on the AC bus.
    Ac,
    /// On the PV array's DC bus.
    Dc,
}

/// Controller limits and conversion efficiencies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchParams {
    /// Step length (h).
    pub dt_hour: f64,
    /// Lower SOC bound (%).
    pub soc_min: f64,
    /// Upper SOC bound (%).
    pub soc_max: f64,
    /// Maximum charge current magnitude (A).
    pub current_charge_max: f64,
    /// Maximum discharge current (A).
    pub current_discharge_max: f64,
    /// Minimum time between charge/discharge flips (min).
    pub t_min: f64,
    pub coupling: Coupling,
    /// DC/DC converter efficiency (%).
    pub dc_dc_efficiency: f64,
    /// AC/DC (charging) conversion efficiency (%).
    pub ac_dc_efficiency: f64,
    /// DC/AC (discharging) conversion efficiency (%).
    pub dc_ac_efficiency: f64,
}

impl DispatchParams {
    /// Checks ranges of every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt_hour > 0.0) {
            return Err(ModelError::invalid("dt_hour", "must be > 0"));
        }
        if !(0.0 <= self.soc_min && self.soc_min < self.soc_max && self.soc_max <= 100.0) {
            return Err(ModelError::invalid(
                "soc_min/soc_max",
                format!(
                    "need 0 <= soc_min < soc_max <= 100, got {} and {}",
                    self.soc_min, self.soc_max
                ),
            ));
        }
        if !(self.current_charge_max >= 0.0 && self.current_discharge_max >= 0.0) {
            return Err(ModelError::invalid("current limits", "must be >= 0"));
        }
        if !(self.t_min >= 0.0) {
            return Err(ModelError::invalid("t_min", "must be >= 0"));
        }
        for (name, eff) in [
            ("dc_dc_efficiency", self.dc_dc_efficiency),
            ("ac_dc_efficiency", self.ac_dc_efficiency),
            ("dc_ac_efficiency", self.dc_ac_efficiency),
        ] {
            if !(eff > 0.0 && eff <= 100.0) {
                return Err(ModelError::invalid(name, format!("must be in (0, 100], got {eff}")));
            }
        }
        Ok(())
    }

    /// Steps per hour implied by `dt_hour`, at least one.
    pub fn steps_per_hour(&self) -> usize {
        ((1.0 / self.dt_hour).round() as usize).max(1)
    }
}

/// Energy flows of the last dispatched step (kWh).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyFlows {
    /// Net battery energy, positive discharging.
    pub battery: f64,
    /// Net grid energy, positive exporting.
    pub grid: f64,
    /// PV plus battery generation.
    pub generation: f64,
    pub pv_to_load: f64,
    pub battery_to_load: f64,
    pub grid_to_load: f64,
    pub pv_to_battery: f64,
    pub grid_to_battery: f64,
}

/// Annual energy totals (kWh), cleared by [`DispatchCore::new_year`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnnualTotals {
    pub charge: f64,
    pub discharge: f64,
    pub grid_import: f64,
    pub grid_export: f64,
    /// Reported as `charge - discharge`, one step behind the totals above.
    pub loss: f64,
}

/// State and controllers shared by every dispatch strategy.
#[derive(Debug, Clone)]
pub struct DispatchCore {
    params: DispatchParams,

    pub(crate) flows: EnergyFlows,
    pv_fraction: f64,
    battery_fraction: f64,

    t_at_mode: f64,
    pub(crate) charging: bool,
    prev_charging: bool,
    e_max_discharge: f64,
    e_max_charge: f64,
    pub(crate) percent_discharge: f64,
    pub(crate) percent_charge: f64,
    pub(crate) grid_recharge: bool,
    i_loss: f64,

    charge_accumulated: f64,
    discharge_accumulated: f64,
    annual: AnnualTotals,
    average_efficiency: f64,
}

impl DispatchCore {
    /// Creates controller state for `battery`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] if `params` fail validation.
    pub fn new(params: DispatchParams, battery: &Battery) -> Result<Self> {
        params.validate()?;
        let v = battery.battery_voltage();
        let q = battery.battery_charge_total();
        let qmax = battery.battery_charge_maximum();
        Ok(Self {
            params,
            flows: EnergyFlows::default(),
            pv_fraction: 0.0,
            battery_fraction: 0.0,
            t_at_mode: INITIAL_TIME_AT_MODE,
            charging: false,
            prev_charging: false,
            e_max_discharge: v * (q - qmax * params.soc_min * 0.01) * WATT_TO_KILOWATT,
            e_max_charge: v * (q - qmax * params.soc_max * 0.01) * WATT_TO_KILOWATT,
            percent_discharge: 0.0,
            percent_charge: 0.0,
            grid_recharge: false,
            i_loss: 0.0,
            charge_accumulated: q * v * WATT_TO_KILOWATT,
            discharge_accumulated: 0.0,
            annual: AnnualTotals::default(),
            average_efficiency: 100.0,
        })
    }

    /// Clears per-step flows and loss current before a new decision.
    pub(crate) fn begin_step(&mut self) {
        self.flows = EnergyFlows::default();
        self.i_loss = 0.0;
        self.charging = true;
    }

    /// Clamps the requested battery energy to the SOC window and the active
    /// profile's throttle.
    ///
    /// The throttle references the energy window latched at the last change of
    /// direction, not the window of this step.
    pub(crate) fn soc_controller(&mut self, battery_voltage: f64, charge_total: f64, charge_max: f64) {
        let e = self.flows.battery;
        if e > 0.0 {
            self.charging = false;
            let e_max = (battery_voltage
                * (charge_total - charge_max * self.params.soc_min * 0.01)
                * WATT_TO_KILOWATT)
                .max(0.0);
            let mut e = e.min(e_max);
            if self.charging != self.prev_charging {
                self.e_max_discharge = e_max;
            }
            e = e.min(self.e_max_discharge * self.percent_discharge * 0.01);
            self.flows.battery = e;
        } else if e < 0.0 {
            self.charging = true;
            let e_max = (battery_voltage
                * (charge_total - charge_max * self.params.soc_max * 0.01)
                * WATT_TO_KILOWATT)
                .min(0.0);
            let mut e = e.max(e_max);
            if self.charging != self.prev_charging {
                self.e_max_charge = e_max;
            }
            let e_percent = self.e_max_charge * self.percent_charge * 0.01;
            if e.abs() > e_percent.abs() {
                e = e_percent;
            }
            self.flows.battery = e;
        } else {
            self.charging = self.prev_charging;
        }
    }

    /// Suppresses a change of direction until `t_min` minutes have passed in
    /// the current mode.
    pub(crate) fn switch_controller(&mut self) {
        let step_minutes = (self.params.dt_hour * HOUR_TO_MIN).round();
        if self.charging != self.prev_charging {
            if self.t_at_mode <= self.params.t_min {
                self.flows.battery = 0.0;
                self.charging = self.prev_charging;
                self.t_at_mode += step_minutes;
            } else {
                self.t_at_mode = 0.0;
            }
        }
        self.t_at_mode += step_minutes;
    }

    /// Converts the battery energy to a current limited by the charge or
    /// discharge maximum (A, negative charging).
    pub(crate) fn current_controller(&self, battery_voltage: f64) -> f64 {
        let power = KILOWATT_TO_WATT * self.flows.battery / self.params.dt_hour;
        let current = if battery_voltage > 0.0 {
            power / battery_voltage
        } else {
            0.0
        };
        if self.charging {
            if current.abs() > self.params.current_charge_max {
                -self.params.current_charge_max
            } else {
                current
            }
        } else {
            current.min(self.params.current_discharge_max)
        }
    }

    /// Applies the charging-side converter efficiency, booking the lost current.
    pub fn conversion_loss_in(&mut self, current: f64) -> f64 {
        let eff = match self.params.coupling {
            Coupling::Dc => self.params.dc_dc_efficiency,
            Coupling::Ac => self.params.ac_dc_efficiency,
        };
        let out = current * eff * 0.01;
        self.i_loss += (current - out).abs();
        out
    }

    /// Applies the discharging-side converter efficiency, booking the lost
    /// current.
    pub fn conversion_loss_out(&mut self, current: f64) -> f64 {
        let eff = match self.params.coupling {
            Coupling::Dc => self.params.dc_dc_efficiency,
            Coupling::Ac => self.params.dc_ac_efficiency,
        };
        let out = current * eff * 0.01;
        self.i_loss += (current - out).abs();
        out
    }

    /// Removes conversion losses from the battery energy.
    ///
    /// The annual loss is taken as `charge - discharge` before this step's
    /// efficiency accounting runs, so it trails the annual totals by one step.
    pub(crate) fn total_loss(&mut self, current: f64, battery_voltage: f64, battery_voltage_new: f64) {
        let multiplier =
            0.5 * (battery_voltage + battery_voltage_new) * self.params.dt_hour * WATT_TO_KILOWATT;
        if self.charging {
            self.conversion_loss_in(current);
        } else {
            self.conversion_loss_out(current);
        }
        self.flows.battery -= self.i_loss * multiplier;
        self.annual.loss = self.annual.charge - self.annual.discharge;
    }

    /// Accumulates charge/discharge energy and updates round-trip efficiency.
    pub(crate) fn compute_efficiency(&mut self) {
        let e = self.flows.battery;
        if e > 0.0 {
            self.discharge_accumulated += e;
            self.annual.discharge += e;
        } else if e < 0.0 {
            self.charge_accumulated -= e;
            self.annual.charge -= e;
        }
        if self.charge_accumulated > 0.0 {
            self.average_efficiency = 100.0 * self.discharge_accumulated / self.charge_accumulated;
        }
        self.prev_charging = self.charging;
    }

    /// Records PV plus battery generation and its PV/battery split.
    pub(crate) fn set_generation(&mut self, e_pv: f64) {
        let generation = e_pv + self.flows.battery;
        self.flows.generation = generation;
        if generation.abs() > 0.0 {
            self.battery_fraction = self.flows.battery / generation;
            self.pv_fraction = e_pv / generation;
        } else {
            self.battery_fraction = 0.0;
            self.pv_fraction = 0.0;
        }
    }

    /// Allocates generation against load, PV first, and splits battery
    /// charging between PV and grid.
    pub(crate) fn compute_grid_net(&mut self, e_gen: f64, e_load: f64) {
        let e_pv = e_gen * self.pv_fraction;
        let e_battery = e_gen * self.battery_fraction;
        let f = &mut self.flows;
        f.grid = e_gen - e_load;

        if f.grid > 0.0 {
            self.annual.grid_export += f.grid;
        } else {
            self.annual.grid_import -= f.grid;
        }

        if e_pv > e_load {
            f.pv_to_load = e_load;
        } else {
            f.pv_to_load = e_pv;
            if f.battery > 0.0 {
                f.battery_to_load = e_battery;
            }
            if f.battery_to_load > e_load || f.battery_to_load + f.pv_to_load > e_load {
                f.battery_to_load = e_load - f.pv_to_load;
            }
            f.grid_to_load = e_load - (f.pv_to_load + f.battery_to_load);
        }

        // Battery charging sources only exist while the battery charges.
        if f.battery < 0.0 {
            let charged = -f.battery;
            f.pv_to_battery = f.pv_to_battery.min(charged);
            f.grid_to_battery = charged - f.pv_to_battery;
        } else {
            f.pv_to_battery = 0.0;
            f.grid_to_battery = 0.0;
        }
    }

    /// Clears the annual totals.
    pub fn new_year(&mut self) {
        self.annual = AnnualTotals::default();
    }

    pub fn params(&self) -> &DispatchParams {
        &self.params
    }

    pub fn flows(&self) -> &EnergyFlows {
        &self.flows
    }

    pub fn annual(&self) -> &AnnualTotals {
        &self.annual
    }

    /// Round-trip efficiency since the start of the run (%).
    pub fn average_efficiency(&self) -> f64 {
        self.average_efficiency
    }

    /// Conversion loss current of the last step (A).
    pub fn loss_current(&self) -> f64 {
        self.i_loss
    }

    /// Whether the last step was charging (after the switch controller).
    pub fn charging(&self) -> bool {
        self.charging
    }

    /// Whether a grid recharge from the SOC floor is in progress.
    pub fn grid_recharge(&self) -> bool {
        self.grid_recharge
    }

    /// Minutes spent in the current mode.
    pub fn time_at_mode(&self) -> f64 {
        self.t_at_mode
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::battery::{
        BasicVoltage, DegradationTable, Lifetime, LithiumIonCapacity, Losses, ReplacementPolicy,
        Thermal, thermal::ThermalParams,
    };

    /// Lithium-ion bank of `qmax` Ah at a fixed 400 V with no thermal derate.
    pub(crate) fn battery(qmax: f64, soc_max: f64, dt_hour: f64) -> Battery {
        let table = DegradationTable::new(&[
            (20.0, 0.0, 100.0),
            (20.0, 5000.0, 90.0),
            (80.0, 0.0, 100.0),
            (80.0, 1000.0, 80.0),
        ])
        .unwrap();
        let thermal = Thermal::new(
            ThermalParams {
                mass: 500.0,
                length: 1.0,
                width: 1.0,
                height: 1.0,
                cp: 1000.0,
                h: 10.0,
                t_room_c: 25.0,
            },
            &[(0.0, 100.0), (50.0, 100.0)],
        )
        .unwrap();
        Battery::initialize(
            dt_hour,
            LithiumIonCapacity::new(qmax, soc_max).unwrap(),
            BasicVoltage::new(100, 1, 4.0).unwrap(),
            Lifetime::new(table, ReplacementPolicy::None),
            thermal,
            Losses::new(),
        )
        .unwrap()
    }

    pub(crate) fn params(dt_hour: f64) -> DispatchParams {
        DispatchParams {
            dt_hour,
            soc_min: 10.0,
            soc_max: 100.0,
            current_charge_max: 100.0,
            current_discharge_max: 100.0,
            t_min: 0.0,
            coupling: Coupling::Ac,
            dc_dc_efficiency: 100.0,
            ac_dc_efficiency: 100.0,
            dc_ac_efficiency: 100.0,
        }
    }
}
