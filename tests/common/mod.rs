//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use batt_sim::battery::thermal::ThermalParams;
use batt_sim::battery::{
    BasicVoltage, Battery, DegradationTable, Lifetime, LithiumIonCapacity, Losses,
    ReplacementPolicy, Thermal,
};
use batt_sim::config::ScenarioConfig;
use batt_sim::dispatch::{Coupling, DispatchParams};

/// Room-temperature enclosure with a flat capacity-vs-temperature curve.
pub fn flat_thermal() -> Thermal {
    let params = ThermalParams {
        mass: 500.0,
        length: 0.6,
        width: 0.6,
        height: 0.6,
        cp: 1000.0,
        h: 20.0,
        t_room_c: 20.0,
    };
    Thermal::new(params, &[(0.0, 100.0), (40.0, 100.0)]).expect("valid thermal fixture")
}

/// Cycle-life table losing 5 points of retention per full cycle.
pub fn fast_wear_table() -> DegradationTable {
    DegradationTable::new(&[(100.0, 0.0, 100.0), (100.0, 10.0, 50.0)])
        .expect("valid degradation fixture")
}

/// Table that never degrades.
pub fn no_wear_table() -> DegradationTable {
    DegradationTable::new(&[(100.0, 0.0, 100.0), (100.0, 1.0e6, 100.0)])
        .expect("valid degradation fixture")
}

/// Lithium-ion bank at 400 V (100 cells x 4 V) charged to 100 %.
pub fn li_ion_battery(qmax_ah: f64, dt_hour: f64, table: DegradationTable, policy: ReplacementPolicy) -> Battery {
    Battery::initialize(
        dt_hour,
        LithiumIonCapacity::new(qmax_ah, 100.0).expect("valid capacity"),
        BasicVoltage::new(100, 1, 4.0).expect("valid voltage"),
        Lifetime::new(table, policy),
        flat_thermal(),
        Losses::new(),
    )
    .expect("valid battery")
}

/// Dispatch limits: SOC 10-100 %, 100 A each way, lossless AC coupling.
pub fn params(dt_hour: f64) -> DispatchParams {
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

/// Loads a preset and panics with the validation errors if it is invalid.
pub fn preset(name: &str) -> ScenarioConfig {
    let cfg = ScenarioConfig::from_preset(name).expect("known preset");
    let errors = cfg.validate();
    assert!(errors.is_empty(), "preset {name} invalid: {errors:?}");
    cfg
}
