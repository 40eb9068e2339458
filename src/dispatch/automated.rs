use tracing::debug;

use super::manual::ManualDispatch;
use super::schedule::{DispatchProfile, HOURS_PER_DAY, Schedule, month_hour};
use crate::error::{ModelError, Result};

/// Share of usable energy the battery must be able to recharge below the
/// target before a shaving level is accepted.
const PEAK_SHAVE_FRACTION: f64 = 0.7;
/// Headroom added to the target for voltage differences.
const TARGET_MARGIN: f64 = 0.01;

/// Forecast net grid load (load minus PV) of one sub-step of the day.
#[derive(Debug, Clone, Copy, PartialEq)]
struct GridPoint {
    grid: f64,
    hour: usize,
    step: usize,
}

/// Summary of the last schedule synthesized by [`AutomatedDispatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct DayPlan {
    /// First hour of the planned day.
    pub hour_of_year: usize,
    /// Net load the plan shaves down to (kW).
    pub p_target: f64,
    /// Lowest threshold that still lets the battery recharge, if one was
    /// evaluated.
    pub p_target_min: Option<f64>,
    /// Energy available above the SOC floor when planning (kWh).
    pub e_useful: f64,
    /// Day-relative `(hour, step)` of each discharge profile, profile 2 first.
    pub discharge_steps: Vec<(usize, usize)>,
    /// Day-relative `(hour, step)` of each grid-charge profile, in assignment
    /// order.
    pub grid_charge_steps: Vec<(usize, usize)>,
}

/// Day-ahead peak shaving on top of a [`ManualDispatch`].
///
/// Once per day the scheduler sorts the next 24 hours of forecast net load,
/// picks a target power, and rewrites the dispatcher's profiles and schedule:
/// profile 1 charges from PV only, one discharge profile follows for every
/// sub-step above the target, then one grid-charge profile for each of the
/// lowest sub-steps until the battery could be refilled.
#[derive(Debug, Clone)]
pub struct AutomatedDispatch<'f> {
    pv: &'f [f64],
    load: &'f [f64],
    dt_hour: f64,
    steps_per_hour: usize,
    hour_last_updated: Option<usize>,
    last_plan: Option<DayPlan>,
}

impl<'f> AutomatedDispatch<'f> {
    /// Creates a scheduler over PV and load energy forecasts.
    ///
    /// Forecast indices wrap around the end of the series.
    ///
    /// # Arguments
    ///
    /// * `pv` - PV energy per step (kWh)
    /// * `load` - Load energy per step (kWh)
    /// * `dt_hour` - Step length (h)
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] for a non-positive timestep,
    /// series of different lengths or non-finite values, and
    /// [`ModelError::SeriesTooShort`] if the series cover less than a day.
    pub fn new(pv: &'f [f64], load: &'f [f64], dt_hour: f64) -> Result<Self> {
        if !(dt_hour > 0.0) {
            return Err(ModelError::invalid(
                "dt_hour",
                format!("must be > 0, got {dt_hour}"),
            ));
        }
        let steps_per_hour = ((1.0 / dt_hour).round() as usize).max(1);
        let mut scheduler = Self {
            pv: &[],
            load: &[],
            dt_hour,
            steps_per_hour,
            hour_last_updated: None,
            last_plan: None,
        };
        scheduler.update_pv_load_data(pv, load)?;
        Ok(scheduler)
    }

    /// Swaps in new forecast series.
    ///
    /// # Errors
    ///
    /// Same checks as [`AutomatedDispatch::new`].
    pub fn update_pv_load_data(&mut self, pv: &'f [f64], load: &'f [f64]) -> Result<()> {
        if pv.len() != load.len() {
            return Err(ModelError::invalid(
                "forecast",
                format!("pv has {} steps but load has {}", pv.len(), load.len()),
            ));
        }
        let needed = HOURS_PER_DAY * self.steps_per_hour;
        if pv.len() < needed {
            return Err(ModelError::SeriesTooShort {
                name: "forecast",
                len: pv.len(),
                needed,
            });
        }
        if pv.iter().chain(load).any(|v| !v.is_finite()) {
            return Err(ModelError::invalid("forecast", "contains non-finite values"));
        }
        self.pv = pv;
        self.load = load;
        Ok(())
    }

    /// Rewrites the dispatcher's plan at the start of each day.
    ///
    /// Does nothing unless `hour_of_year` starts a day and differs from the
    /// last planned hour. Call before [`ManualDispatch::dispatch`].
    ///
    /// # Arguments
    ///
    /// * `dispatch` - Dispatcher whose profiles and schedule are replaced
    /// * `hour_of_year` - Current hour of the year
    /// * `idx` - Forecast index of the first step of the day
    ///
    /// Returns `true` if a new plan was written.
    pub fn update_dispatch(
        &mut self,
        dispatch: &mut ManualDispatch<'_>,
        hour_of_year: usize,
        idx: usize,
    ) -> bool {
        if hour_of_year % HOURS_PER_DAY != 0 || self.hour_last_updated == Some(hour_of_year) {
            return false;
        }
        self.hour_last_updated = Some(hour_of_year);

        let grid = self.sorted_grid(idx);
        let mut profiles = vec![DispatchProfile::pv_charge_only()];
        let mut schedule = Schedule::uniform(self.steps_per_hour, 1);

        let e_useful = dispatch.useful_energy();
        let e_max = e_useful;
        let (p_target, p_target_min) = target_power(&grid, self.dt_hour, e_useful);

        let mut plan = DayPlan {
            hour_of_year,
            p_target,
            p_target_min,
            e_useful,
            discharge_steps: Vec::new(),
            grid_charge_steps: Vec::new(),
        };

        if e_max > 0.0 {
            for point in &grid {
                let energy_required = (point.grid - p_target) * self.dt_hour;
                if energy_required <= 0.0 {
                    break;
                }
                profiles.push(DispatchProfile::discharge(100.0 * energy_required / e_max));
                place(&mut schedule, hour_of_year, point, profiles.len());
                plan.discharge_steps.push((point.hour, point.step));
            }

            let mut charge_energy: f64 = grid
                .iter()
                .filter(|p| p.grid < 0.0)
                .map(|p| -p.grid * self.dt_hour)
                .sum();
            if charge_energy < e_max {
                for point in grid.iter().rev() {
                    if point.grid > p_target {
                        break;
                    }
                    let energy = (p_target - point.grid) * self.dt_hour;
                    charge_energy += energy;
                    profiles.push(DispatchProfile::grid_charge(100.0 * energy / e_max));
                    place(&mut schedule, hour_of_year, point, profiles.len());
                    plan.grid_charge_steps.push((point.hour, point.step));
                    if charge_energy >= e_max {
                        break;
                    }
                }
            }
        }

        debug!(
            hour_of_year,
            p_target,
            e_useful,
            discharge_steps = plan.discharge_steps.len(),
            grid_charge_steps = plan.grid_charge_steps.len(),
            "synthesized day-ahead dispatch plan"
        );

        dispatch.replace_plan(profiles, schedule);
        self.last_plan = Some(plan);
        true
    }

    /// Net load for the 24 hours starting at forecast index `idx`, highest
    /// first. Equal values keep their chronological order.
    fn sorted_grid(&self, idx: usize) -> Vec<GridPoint> {
        let len = self.load.len();
        let mut grid = Vec::with_capacity(HOURS_PER_DAY * self.steps_per_hour);
        let mut i = idx;
        for hour in 0..HOURS_PER_DAY {
            for step in 0..self.steps_per_hour {
                let k = i % len;
                grid.push(GridPoint {
                    grid: self.load[k] - self.pv[k],
                    hour,
                    step,
                });
                i += 1;
            }
        }
        grid.sort_by(|a, b| b.grid.total_cmp(&a.grid));
        grid
    }

    pub fn last_plan(&self) -> Option<&DayPlan> {
        self.last_plan.as_ref()
    }

    pub fn hour_last_updated(&self) -> Option<usize> {
        self.hour_last_updated
    }

    pub fn steps_per_hour(&self) -> usize {
        self.steps_per_hour
    }
}

fn place(schedule: &mut Schedule, hour_of_year: usize, point: &GridPoint, profile: usize) {
    let (month, hour) = month_hour(hour_of_year + point.hour);
    let column = schedule.column(hour, point.step);
    schedule.set(month - 1, column, profile);
}

/// Shaving target for a descending net-load curve.
///
/// Returns the target and the minimum-recharge threshold it was floored at.
fn target_power(grid: &[GridPoint], dt_hour: f64, e_useful: f64) -> (f64, Option<f64>) {
    let Some(peak) = grid.first() else {
        return (0.0, None);
    };
    let wanted = PEAK_SHAVE_FRACTION * e_useful;

    // Lowest threshold under which the battery can take back `wanted`.
    let mut p_target_min = None;
    let mut e_charge = 0.0;
    let mut index = grid.len();
    while e_charge < wanted && index > 0 {
        index -= 1;
        let threshold = grid[index].grid;
        e_charge = grid
            .iter()
            .rev()
            .take_while(|p| p.grid <= threshold)
            .map(|p| (threshold - p.grid) * dt_hour)
            .sum();
        p_target_min = Some(threshold);
    }

    if e_charge < wanted {
        return (PEAK_SHAVE_FRACTION * peak.grid, p_target_min);
    }

    let mut p_target = peak.grid;
    let mut shaved = 0.0;
    for (ii, pair) in grid.windows(2).enumerate() {
        let next = pair[1].grid;
        if next < 0.0 {
            break;
        }
        p_target = next;
        let diff = pair[0].grid - next;
        if diff == 0.0 {
            continue;
        }
        let width = (ii + 1) as f64 * dt_hour;
        shaved += diff * width;
        if shaved >= e_useful {
            p_target += (shaved - e_useful) / width;
            break;
        }
    }

    p_target += TARGET_MARGIN * p_target;
    if let Some(min) = p_target_min {
        if p_target < min {
            p_target = min;
        }
    }
    (p_target, p_target_min)
}
