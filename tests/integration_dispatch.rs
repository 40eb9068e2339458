//! Integration tests for manual and automated dispatch over a shared battery.

mod common;

use batt_sim::battery::{CapacityModel, ReplacementPolicy};
use batt_sim::dispatch::{AutomatedDispatch, DispatchProfile, ManualDispatch, Schedule};
use batt_sim::error::ModelError;

const DAYS: usize = 3;

fn evening_schedule() -> Schedule {
    let mut day = vec![1; 24];
    for cell in &mut day[17..21] {
        *cell = 2;
    }
    Schedule::from_daily(&day).expect("valid schedule")
}

fn pv_kwh(hour: usize) -> f64 {
    if (10..15).contains(&(hour % 24)) { 5.0 } else { 0.0 }
}

#[test]
fn manual_dispatch_follows_the_schedule() {
    let mut battery =
        common::li_ion_battery(50.0, 1.0, common::no_wear_table(), ReplacementPolicy::None);
    let mut dispatch = ManualDispatch::new(
        &mut battery,
        common::params(1.0),
        evening_schedule(),
        vec![DispatchProfile::pv_charge_only(), DispatchProfile::discharge(100.0)],
    )
    .expect("valid dispatcher");

    let load = 2.0;
    for hour in 0..24 * DAYS {
        let pv = pv_kwh(hour);
        dispatch.dispatch(hour, 0, pv, load);
        let flows = *dispatch.flows();
        let soc = dispatch.battery().capacity_model().soc();

        assert!(soc >= 10.0 - 1e-6, "soc {soc} below floor at hour {hour}");
        let balance = pv + flows.battery - load - flows.grid;
        assert!(balance.abs() < 1e-9, "unbalanced at hour {hour}");
        assert!(flows.battery <= load + 1e-9, "discharge beyond load at hour {hour}");
        if !(17..21).contains(&(hour % 24)) {
            assert!(flows.battery <= 1e-9, "discharged outside the window at hour {hour}");
        }
        if hour == 17 {
            assert!(flows.battery > 1.9, "full battery should cover the evening load");
        }
    }

    let annual = *dispatch.core().annual();
    assert!(annual.discharge > 0.0);
    assert!(annual.charge > 0.0);
    assert!(annual.grid_import > 0.0);
}

#[test]
fn manual_dispatch_rejects_bad_profile_sets() {
    let mut battery =
        common::li_ion_battery(50.0, 1.0, common::no_wear_table(), ReplacementPolicy::None);
    let seven = vec![DispatchProfile::idle(); 7];
    assert!(matches!(
        ManualDispatch::new(&mut battery, common::params(1.0), Schedule::uniform(1, 1), seven),
        Err(ModelError::Schedule(_))
    ));

    // Profile 2 is referenced but never defined.
    assert!(matches!(
        ManualDispatch::new(
            &mut battery,
            common::params(1.0),
            evening_schedule(),
            vec![DispatchProfile::idle()],
        ),
        Err(ModelError::Schedule(_))
    ));
}

#[test]
fn peak_shaving_plan_flattens_an_evening_peak() {
    let pv = vec![0.0; 24];
    let load: Vec<f64> = (0..24).map(|h| if h == 18 { 8.0 } else { 2.0 }).collect();

    let mut battery =
        common::li_ion_battery(50.0, 1.0, common::no_wear_table(), ReplacementPolicy::None);
    let mut manual = ManualDispatch::new(
        &mut battery,
        common::params(1.0),
        Schedule::uniform(1, 1),
        vec![DispatchProfile::pv_charge_only()],
    )
    .expect("valid dispatcher");
    let mut automated = AutomatedDispatch::new(&pv, &load, 1.0).expect("valid forecast");

    let mut peak_import = 0.0_f64;
    let mut discharge_at_peak = 0.0;
    for hour in 0..24 {
        let replanned = automated.update_dispatch(&mut manual, hour, hour);
        assert_eq!(replanned, hour == 0);
        manual.dispatch(hour, 0, pv[hour], load[hour]);
        let flows = *manual.flows();
        peak_import = peak_import.max(-flows.grid);
        if hour == 18 {
            discharge_at_peak = flows.battery;
        }
    }

    let plan = automated.last_plan().expect("plan at midnight");
    assert!(plan.p_target < 8.0);
    assert!(plan.discharge_steps.contains(&(18, 0)));
    assert!(discharge_at_peak > 5.0);
    assert!(peak_import < 3.0, "peak import {peak_import} not shaved");
    assert!(peak_import >= 2.0 - 1e-9);
    assert_eq!(automated.hour_last_updated(), Some(0));
}

#[test]
fn automated_dispatch_requires_a_full_day_of_forecast() {
    let short = vec![1.0; 23];
    assert!(matches!(
        AutomatedDispatch::new(&short, &short, 1.0),
        Err(ModelError::SeriesTooShort { .. })
    ));
    let bad = vec![f64::NAN; 24];
    let ok = vec![1.0; 24];
    assert!(matches!(
        AutomatedDispatch::new(&bad, &ok, 1.0),
        Err(ModelError::InvalidParameter { .. })
    ));
}
