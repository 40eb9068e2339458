//! Time-series driver running a battery and its dispatcher over PV and load
//! series.

use tracing::info;

use crate::battery::{Battery, CapacityModel};
use crate::dispatch::{
    AutomatedDispatch, DispatchParams, DispatchProfile, ManualDispatch, Schedule,
};
use crate::error::{ModelError, Result};

use super::clock::{Clock, Tick};
use super::types::{SimConfig, StepResult};

/// How the schedule is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// The given schedule and profiles are used as-is.
    Manual,
    /// A day-ahead peak-shaving plan replaces them every day, using the
    /// input series as a perfect forecast.
    PeakShaving,
}

/// Dispatch parameters, the initial plan and the planning mode.
#[derive(Debug, Clone)]
pub struct DispatchSetup {
    pub params: DispatchParams,
    pub schedule: Schedule,
    pub profiles: Vec<DispatchProfile>,
    pub mode: DispatchMode,
}

/// Simulation engine owning the battery, its dispatch setup and input
/// series.
///
/// Series shorter than the run repeat from their start; ambient temperature
/// is hourly.
#[derive(Debug, Clone)]
pub struct Engine {
    config: SimConfig,
    battery: Battery,
    setup: DispatchSetup,
    pv: Vec<f64>,
    load: Vec<f64>,
    ambient_c: Option<Vec<f64>>,
}

impl Engine {
    /// Creates a new simulation engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Simulation configuration
    /// * `battery` - Battery bank, stepped at `config.dt_hour`
    /// * `setup` - Dispatch parameters and plan
    /// * `pv` - PV energy per step (kWh)
    /// * `load` - Load energy per step (kWh)
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] if the step lengths of
    /// `config`, `battery` and `setup.params` disagree or the series lengths
    /// differ, [`ModelError::SeriesTooShort`] if the series cover less than
    /// a day, and any error the dispatchers raise for the setup.
    pub fn new(
        config: SimConfig,
        mut battery: Battery,
        setup: DispatchSetup,
        pv: Vec<f64>,
        load: Vec<f64>,
    ) -> Result<Self> {
        for (name, dt) in [
            ("battery.dt_hour", battery.dt_hour()),
            ("dispatch.dt_hour", setup.params.dt_hour),
        ] {
            if (dt - config.dt_hour).abs() > 1e-9 {
                return Err(ModelError::invalid(
                    name,
                    format!("{dt} does not match simulation step {}", config.dt_hour),
                ));
            }
        }
        if pv.len() != load.len() {
            return Err(ModelError::invalid(
                "series",
                format!("pv has {} steps but load has {}", pv.len(), load.len()),
            ));
        }
        if pv.len() < config.steps_per_day() {
            return Err(ModelError::SeriesTooShort {
                name: "pv/load",
                len: pv.len(),
                needed: config.steps_per_day(),
            });
        }

        ManualDispatch::new(
            &mut battery,
            setup.params,
            setup.schedule.clone(),
            setup.profiles.clone(),
        )?;
        if setup.mode == DispatchMode::PeakShaving {
            AutomatedDispatch::new(&pv, &load, config.dt_hour)?;
        }

        Ok(Self {
            config,
            battery,
            setup,
            pv,
            load,
            ambient_c: None,
        })
    }

    /// Feeds an hourly ambient temperature series (°C) to the thermal model.
    ///
    /// An empty series leaves the configured room temperature in place.
    pub fn with_ambient_temperature(mut self, hourly_c: Vec<f64>) -> Self {
        self.ambient_c = (!hourly_c.is_empty()).then_some(hourly_c);
        self
    }

    /// Executes all timesteps and returns the complete step record vector.
    ///
    /// The battery keeps its state afterwards; a second call continues from
    /// where the first one stopped.
    ///
    /// # Errors
    ///
    /// Propagates dispatcher construction errors.
    pub fn run(&mut self) -> Result<Vec<StepResult>> {
        let pv = self.pv.as_slice();
        let load = self.load.as_slice();
        let ambient = self.ambient_c.as_deref();
        let setup = &self.setup;

        let mut dispatch = ManualDispatch::new(
            &mut self.battery,
            setup.params,
            setup.schedule.clone(),
            setup.profiles.clone(),
        )?;
        let mut automated = match setup.mode {
            DispatchMode::PeakShaving => Some(AutomatedDispatch::new(pv, load, self.config.dt_hour)?),
            DispatchMode::Manual => None,
        };

        let mut results = Vec::with_capacity(self.config.total_steps());
        let mut clock = Clock::new(self.config.steps_per_hour, self.config.total_steps());
        while let Some(tick) = clock.tick() {
            if tick.starts_year() {
                let annual = *dispatch.core().annual();
                info!(
                    year = tick.year,
                    charge_kwh = annual.charge,
                    discharge_kwh = annual.discharge,
                    grid_import_kwh = annual.grid_import,
                    "starting simulation year"
                );
                dispatch.new_year();
            }
            if let Some(temps) = ambient {
                let t = temps[tick.hour_index() % temps.len()];
                dispatch
                    .battery_mut()
                    .thermal_model_mut()
                    .set_ambient_temperature_c(t);
            }

            let i = tick.index % pv.len();
            let replanned = automated
                .as_mut()
                .is_some_and(|a| a.update_dispatch(&mut dispatch, tick.hour_of_year, i));
            dispatch.dispatch(tick.hour_of_year, tick.step, pv[i], load[i]);
            results.push(record(&tick, &dispatch, pv[i], load[i], replanned));
        }
        Ok(results)
    }

    /// Returns a reference to the battery (for post-run capacity queries).
    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    /// Returns a reference to the simulation configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn setup(&self) -> &DispatchSetup {
        &self.setup
    }
}

fn record(
    tick: &Tick,
    dispatch: &ManualDispatch<'_>,
    pv_kwh: f64,
    load_kwh: f64,
    replanned: bool,
) -> StepResult {
    let flows = *dispatch.flows();
    let battery = dispatch.battery();
    let capacity = battery.capacity_model();
    let lifetime = battery.lifetime_model();
    StepResult {
        timestep: tick.index,
        year: tick.year,
        hour_of_year: tick.hour_of_year,
        step: tick.step,
        pv_kwh,
        load_kwh,
        battery_kwh: flows.battery,
        grid_kwh: flows.grid,
        pv_to_load_kwh: flows.pv_to_load,
        battery_to_load_kwh: flows.battery_to_load,
        grid_to_load_kwh: flows.grid_to_load,
        pv_to_battery_kwh: flows.pv_to_battery,
        grid_to_battery_kwh: flows.grid_to_battery,
        soc: capacity.soc(),
        current_a: capacity.current(),
        battery_voltage: battery.battery_voltage(),
        temperature_c: battery.thermal_model().temperature_c(),
        capacity_percent: lifetime.capacity_percent(),
        qmax_ah: capacity.qmax(),
        cycles: lifetime.cycles_elapsed(),
        replacements: lifetime.replacements(),
        average_efficiency: dispatch.core().average_efficiency(),
        replanned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::fixtures;

    fn day_series() -> (Vec<f64>, Vec<f64>) {
        let pv = (0..24).map(|h| if (9..15).contains(&h) { 4.0 } else { 0.0 }).collect();
        let load = (0..24).map(|h| if h == 19 { 6.0 } else { 1.5 }).collect();
        (pv, load)
    }

    fn manual_setup(profile: DispatchProfile) -> DispatchSetup {
        DispatchSetup {
            params: fixtures::params(1.0),
            schedule: Schedule::uniform(1, 1),
            profiles: vec![profile],
            mode: DispatchMode::Manual,
        }
    }

    #[test]
    fn rejects_mismatched_timesteps() {
        let (pv, load) = day_series();
        let battery = fixtures::battery(50.0, 100.0, 0.5);
        let r = Engine::new(
            SimConfig::new(1, 1, 0),
            battery,
            manual_setup(DispatchProfile::discharge(100.0)),
            pv,
            load,
        );
        assert!(matches!(r, Err(ModelError::InvalidParameter { .. })));
    }

    #[test]
    fn rejects_short_series() {
        let r = Engine::new(
            SimConfig::new(1, 1, 0),
            fixtures::battery(50.0, 100.0, 1.0),
            manual_setup(DispatchProfile::discharge(100.0)),
            vec![0.0; 12],
            vec![1.0; 12],
        );
        assert!(matches!(r, Err(ModelError::SeriesTooShort { .. })));
    }

    #[test]
    fn full_year_keeps_soc_in_window() {
        let (pv, load) = day_series();
        let mut engine = Engine::new(
            SimConfig::new(1, 1, 0),
            fixtures::battery(50.0, 100.0, 1.0),
            manual_setup(DispatchProfile::discharge(100.0)),
            pv,
            load,
        )
        .unwrap();
        let results = engine.run().unwrap();
        assert_eq!(results.len(), 8760);
        for r in &results {
            assert!(r.soc >= 10.0 - 1e-6 && r.soc <= 100.0);
            // Energy balance of the AC bus.
            let balance = r.pv_kwh + r.battery_kwh - r.load_kwh - r.grid_kwh;
            assert!(balance.abs() < 1e-9, "unbalanced at {}", r.timestep);
        }
        assert!(results.iter().any(|r| r.battery_kwh > 0.0));
        assert!(results.iter().any(|r| r.battery_kwh < 0.0));
        assert!(!results.iter().any(|r| r.replanned));
    }

    #[test]
    fn peak_shaving_replans_daily() {
        let (pv, load) = day_series();
        let setup = DispatchSetup {
            params: fixtures::params(1.0),
            schedule: Schedule::uniform(1, 1),
            profiles: vec![DispatchProfile::pv_charge_only()],
            mode: DispatchMode::PeakShaving,
        };
        let mut engine = Engine::new(
            SimConfig::new(1, 1, 0),
            fixtures::battery(50.0, 100.0, 1.0),
            setup,
            pv,
            load,
        )
        .unwrap();
        let results = engine.run().unwrap();
        let plans = results.iter().filter(|r| r.replanned).count();
        assert_eq!(plans, 365);
        assert!(results.iter().all(|r| !r.replanned || r.hour_of_year % 24 == 0));
        // The evening peak is the only discharge hour of the plan.
        assert!(
            results
                .iter()
                .filter(|r| r.battery_kwh > 1e-9)
                .all(|r| r.hour_of_year % 24 == 19)
        );
    }

    #[test]
    fn ambient_series_drives_battery_temperature() {
        let (pv, load) = day_series();
        let mut engine = Engine::new(
            SimConfig::new(1, 1, 0),
            fixtures::battery(50.0, 100.0, 1.0),
            manual_setup(DispatchProfile::idle()),
            pv,
            load,
        )
        .unwrap()
        .with_ambient_temperature(vec![5.0]);
        let results = engine.run().unwrap();
        let last = results.last().unwrap();
        assert!((last.temperature_c - 5.0).abs() < 0.1);
    }
}
