use tracing::trace;

use super::schedule::{DispatchProfile, Schedule, month_hour};
use super::{Coupling, DispatchCore, DispatchParams, EnergyFlows, WATT_TO_KILOWATT};
use crate::battery::{Battery, CapacityModel, VoltageModel};
use crate::error::{ModelError, Result};

/// Maximum number of user-defined profiles.
pub const MAX_USER_PROFILES: usize = 6;
/// Band around an SOC bound treated as "at the bound" (%).
const SOC_TOLERANCE: f64 = 0.001;

/// Schedule-driven dispatch over a borrowed battery.
///
/// Each step looks up the active [`DispatchProfile`] for the month and time
/// of day, decides a target battery energy from PV and load, and passes it
/// through the SOC, switch and current controllers before running the
/// battery.
#[derive(Debug)]
pub struct ManualDispatch<'b> {
    battery: &'b mut Battery,
    core: DispatchCore,
    schedule: Schedule,
    profiles: Vec<DispatchProfile>,
}

impl<'b> ManualDispatch<'b> {
    /// Creates a manual dispatcher.
    ///
    /// # Arguments
    ///
    /// * `battery` - Battery operated by this dispatcher
    /// * `params` - Controller limits and efficiencies
    /// * `schedule` - Month x time-of-day profile numbers (1-based)
    /// * `profiles` - Up to six profiles referenced by `schedule`
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Schedule`] if no profile or more than six are
    /// given, a percentage is out of range, the schedule references a missing
    /// profile, or its resolution matches neither hourly nor the step
    /// length. Invalid `params` give [`ModelError::InvalidParameter`].
    pub fn new(
        battery: &'b mut Battery,
        params: DispatchParams,
        schedule: Schedule,
        profiles: Vec<DispatchProfile>,
    ) -> Result<Self> {
        if profiles.is_empty() || profiles.len() > MAX_USER_PROFILES {
            return Err(ModelError::Schedule(format!(
                "expected 1 to {MAX_USER_PROFILES} profiles, got {}",
                profiles.len()
            )));
        }
        for profile in &profiles {
            profile.validate()?;
        }
        if schedule.max_profile() > profiles.len() {
            return Err(ModelError::Schedule(format!(
                "schedule references profile {} but only {} are defined",
                schedule.max_profile(),
                profiles.len()
            )));
        }
        let cph = schedule.columns_per_hour();
        if cph != 1 && cph != params.steps_per_hour() {
            return Err(ModelError::Schedule(format!(
                "schedule has {cph} columns per hour; expected 1 or {}",
                params.steps_per_hour()
            )));
        }

        let core = DispatchCore::new(params, battery)?;
        Ok(Self {
            battery,
            core,
            schedule,
            profiles,
        })
    }

    /// Dispatches one step.
    ///
    /// # Arguments
    ///
    /// * `hour_of_year` - Hour index, wrapped to a 8760-hour year
    /// * `step` - Sub-step within the hour (0 for hourly runs)
    /// * `e_pv` - PV energy this step (kWh)
    /// * `e_load` - Load energy this step (kWh)
    pub fn dispatch(&mut self, hour_of_year: usize, step: usize, e_pv: f64, e_load: f64) {
        let (month, hour) = month_hour(hour_of_year);
        let column = self.schedule.column(hour, step);
        let profile = self
            .schedule
            .get(month - 1, column)
            .and_then(|id| self.profiles.get(id.wrapping_sub(1)))
            .copied()
            .unwrap_or_else(DispatchProfile::idle);

        let core = &mut self.core;
        core.percent_discharge = if profile.discharge {
            profile.percent_discharge
        } else {
            0.0
        };
        core.percent_charge = 0.0;
        if profile.charge {
            core.percent_charge = 100.0;
        }
        if profile.grid_charge {
            core.percent_charge = profile.percent_grid_charge;
        }

        let battery_voltage = self.battery.battery_voltage();
        let energy_needed =
            self.battery.battery_charge_needed() * battery_voltage * WATT_TO_KILOWATT;
        let charge_total = self.battery.battery_charge_total();
        let charge_max = self.battery.battery_charge_maximum();
        let soc_min = core.params().soc_min;
        let soc_max = core.params().soc_max;

        core.begin_step();

        if e_pv > e_load {
            if profile.charge {
                // Offer the whole surplus; the controllers trim what cannot be taken.
                let surplus = e_pv - e_load;
                core.flows.pv_to_battery = surplus;
                core.flows.battery = -surplus;
                if surplus < energy_needed && profile.grid_charge {
                    core.flows.battery = -energy_needed;
                }
            } else if profile.grid_charge {
                core.flows.battery = -energy_needed;
            }
        } else if profile.discharge {
            core.flows.battery = e_load - e_pv;
            let soc = self.battery.capacity_model().soc();
            let at_floor = (soc - soc_min).abs() < SOC_TOLERANCE;
            if (at_floor || core.grid_recharge) && profile.grid_charge {
                core.grid_recharge = true;
                core.flows.battery = -energy_needed;
                if (soc - soc_max).abs() < SOC_TOLERANCE {
                    core.grid_recharge = false;
                }
            }
        } else if profile.grid_charge {
            core.flows.battery = -energy_needed;
        } else {
            core.grid_recharge = false;
        }

        core.soc_controller(battery_voltage, charge_total, charge_max);
        core.switch_controller();
        let current = core.current_controller(battery_voltage);

        self.battery.run(current);

        let current = self.battery.capacity_model().current();
        let battery_voltage_new = self.battery.voltage_model().battery_voltage();
        let core = &mut self.core;
        core.flows.battery = current
            * 0.5
            * (battery_voltage + battery_voltage_new)
            * core.params().dt_hour
            * WATT_TO_KILOWATT;

        core.total_loss(current, battery_voltage, battery_voltage_new);
        core.compute_efficiency();
        core.set_generation(e_pv);

        if core.params().coupling == Coupling::Ac {
            let generation = core.flows.generation;
            core.compute_grid_net(generation, e_load);
        }

        trace!(
            hour_of_year,
            step,
            battery_kwh = core.flows.battery,
            grid_kwh = core.flows.grid,
            "dispatched step"
        );
    }

    /// Clears the annual totals.
    pub fn new_year(&mut self) {
        self.core.new_year();
    }

    pub fn core(&self) -> &DispatchCore {
        &self.core
    }

    pub fn flows(&self) -> &EnergyFlows {
        self.core.flows()
    }

    pub fn battery(&self) -> &Battery {
        &*self.battery
    }

    /// Battery, e.g. to update the ambient temperature between steps.
    pub fn battery_mut(&mut self) -> &mut Battery {
        &mut *self.battery
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn profiles(&self) -> &[DispatchProfile] {
        &self.profiles
    }

    /// Replaces profiles and schedule in one go (used by the day-ahead
    /// scheduler, which may define more than six profiles).
    pub(crate) fn replace_plan(&mut self, profiles: Vec<DispatchProfile>, schedule: Schedule) {
        self.profiles = profiles;
        self.schedule = schedule;
    }

    /// Energy between the present charge and the SOC floor (kWh).
    pub(crate) fn useful_energy(&self) -> f64 {
        self.battery.battery_voltage()
            * (self.battery.battery_charge_total()
                - self.battery.battery_charge_maximum() * self.core.params().soc_min * 0.01)
            * WATT_TO_KILOWATT
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures;
    use super::*;

    fn always(profile: DispatchProfile) -> (Schedule, Vec<DispatchProfile>) {
        (Schedule::uniform(1, 1), vec![profile])
    }

    #[test]
    fn rejects_bad_profile_sets() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let p = fixtures::params(1.0);
        assert!(ManualDispatch::new(&mut b, p, Schedule::uniform(1, 1), vec![]).is_err());
        assert!(
            ManualDispatch::new(&mut b, p, Schedule::uniform(1, 2), vec![DispatchProfile::idle()])
                .is_err()
        );
        let seven = vec![DispatchProfile::idle(); 7];
        assert!(ManualDispatch::new(&mut b, p, Schedule::uniform(1, 1), seven).is_err());
        let idle = vec![DispatchProfile::idle()];
        assert!(ManualDispatch::new(&mut b, p, Schedule::uniform(3, 1), idle).is_err());
    }

    #[test]
    fn surplus_pv_charges_battery() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let (s, profiles) = always(DispatchProfile::discharge(100.0));
        let mut d = ManualDispatch::new(&mut b, fixtures::params(1.0), s, profiles).unwrap();

        // Make room first: 4 kWh of load at night.
        d.dispatch(0, 0, 0.0, 4.0);
        assert!((d.flows().battery - 4.0).abs() < 1e-9);
        assert!((d.flows().battery_to_load - 4.0).abs() < 1e-9);
        assert_eq!(d.flows().grid_to_battery, 0.0);
        assert_eq!(d.flows().pv_to_battery, 0.0);

        // 3 kWh of surplus PV goes into the battery.
        d.dispatch(12, 0, 5.0, 2.0);
        let f = *d.flows();
        assert!((f.battery + 3.0).abs() < 1e-9);
        assert!((f.pv_to_battery - 3.0).abs() < 1e-9);
        assert!(f.grid_to_battery.abs() < 1e-9);
        assert!(f.grid.abs() < 1e-9);
    }

    #[test]
    fn discharge_reports_no_grid_to_battery_flow() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let (s, profiles) = always(DispatchProfile::discharge(100.0));
        let mut d = ManualDispatch::new(&mut b, fixtures::params(1.0), s, profiles).unwrap();
        for hour in 0..3 {
            d.dispatch(hour, 0, 0.0, 4.0);
            let f = *d.flows();
            assert!(f.battery > 0.0);
            assert_eq!(f.grid_to_battery, 0.0, "hour {hour}");
            assert_eq!(f.pv_to_battery, 0.0, "hour {hour}");
            assert!((f.battery_to_load + f.grid_to_load - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn charge_only_profile_never_discharges() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let (s, profiles) = always(DispatchProfile::pv_charge_only());
        let mut d = ManualDispatch::new(&mut b, fixtures::params(1.0), s, profiles).unwrap();
        d.dispatch(0, 0, 0.0, 5.0);
        assert_eq!(d.flows().battery, 0.0);
        assert!((d.flows().grid + 5.0).abs() < 1e-9);
        assert!((d.flows().grid_to_load - 5.0).abs() < 1e-9);
    }

    #[test]
    fn direction_flip_inside_dwell_time_is_suppressed() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let mut p = fixtures::params(1.0);
        p.t_min = 120.0;
        let (s, profiles) = always(DispatchProfile::discharge(100.0));
        let mut d = ManualDispatch::new(&mut b, p, s, profiles).unwrap();

        d.dispatch(0, 0, 0.0, 3.0);
        assert!(d.flows().battery > 0.0);
        d.dispatch(1, 0, 4.0, 1.0);
        assert!(d.flows().battery < 0.0);
        // Back to discharging after only 60 minutes of charging.
        d.dispatch(2, 0, 0.0, 3.0);
        assert_eq!(d.flows().battery, 0.0);
        assert!(d.core().charging());
        // Another hour later the dwell time has elapsed.
        d.dispatch(3, 0, 0.0, 3.0);
        assert!(d.flows().battery > 0.0);
    }

    #[test]
    fn grid_recharge_latches_until_full() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let mut profile = DispatchProfile::discharge(100.0);
        profile.grid_charge = true;
        profile.percent_grid_charge = 100.0;
        let (s, profiles) = always(profile);
        let mut d = ManualDispatch::new(&mut b, fixtures::params(1.0), s, profiles).unwrap();

        // Drain to the SOC floor (10 %): 18 kWh usable.
        d.dispatch(0, 0, 0.0, 30.0);
        assert!((d.battery().capacity_model().soc() - 10.0).abs() < 1e-9);
        assert!(!d.core().grid_recharge());

        // At the floor with load still present the battery recharges from grid.
        d.dispatch(1, 0, 0.0, 1.0);
        assert!(d.core().grid_recharge());
        assert!(d.flows().battery < 0.0);
        assert!(d.flows().grid_to_battery > 0.0);
        assert!((d.battery().capacity_model().soc() - 100.0).abs() < 1e-6);

        // Full again: the latch clears and discharge resumes.
        d.dispatch(2, 0, 0.0, 1.0);
        assert!(!d.core().grid_recharge());
    }

    #[test]
    fn loss_total_trails_annual_accumulators() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let (s, profiles) = always(DispatchProfile::discharge(100.0));
        let mut d = ManualDispatch::new(&mut b, fixtures::params(1.0), s, profiles).unwrap();

        d.dispatch(0, 0, 0.0, 2.0);
        let annual = *d.core().annual();
        assert!((annual.discharge - 2.0).abs() < 1e-9);
        // Computed before this step's discharge was added.
        assert_eq!(annual.loss, 0.0);

        d.dispatch(1, 0, 0.0, 2.0);
        let annual = *d.core().annual();
        assert!((annual.loss + 2.0).abs() < 1e-9);
        assert!((annual.discharge - 4.0).abs() < 1e-9);
    }

    #[test]
    fn dc_coupling_skips_grid_allocation() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let mut p = fixtures::params(1.0);
        p.coupling = Coupling::Dc;
        let (s, profiles) = always(DispatchProfile::discharge(100.0));
        let mut d = ManualDispatch::new(&mut b, p, s, profiles).unwrap();
        d.dispatch(0, 0, 0.0, 2.0);
        assert!(d.flows().battery > 0.0);
        assert_eq!(d.flows().grid, 0.0);
        assert_eq!(d.flows().battery_to_load, 0.0);
    }

    #[test]
    fn conversion_losses_reduce_delivered_energy() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let mut p = fixtures::params(1.0);
        p.dc_ac_efficiency = 90.0;
        let (s, profiles) = always(DispatchProfile::discharge(100.0));
        let mut d = ManualDispatch::new(&mut b, p, s, profiles).unwrap();
        d.dispatch(0, 0, 0.0, 4.0);
        // 10 A drawn at 400 V, 1 A lost in conversion.
        assert!((d.flows().battery - 3.6).abs() < 1e-9);
        assert!((d.core().loss_current() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn soc_stays_within_dispatch_window() {
        let mut b = fixtures::battery(50.0, 100.0, 1.0);
        let mut profile = DispatchProfile::discharge(100.0);
        profile.grid_charge = true;
        profile.percent_grid_charge = 50.0;
        let mut d = ManualDispatch::new(
            &mut b,
            fixtures::params(1.0),
            Schedule::from_daily(&[1; 24]).unwrap(),
            vec![profile],
        )
        .unwrap();
        for h in 0..24 * 14 {
            let pv = if (h % 24) > 8 && (h % 24) < 16 { 6.0 } else { 0.0 };
            d.dispatch(h, 0, pv, 2.5);
            let soc = d.battery().capacity_model().soc();
            assert!(soc >= 10.0 - 1e-6 && soc <= 100.0, "soc {soc} at hour {h}");
        }
    }
}
