//! TOML-based scenario configuration, preset definitions and model builders.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::battery::thermal::ThermalParams;
use crate::battery::{
    BasicVoltage, Battery, Capacity, DegradationTable, DischargeCurve, DynamicVoltage,
    KibamCapacity, Lifetime, LithiumIonCapacity, Losses, ReplacementPolicy, Thermal, Voltage,
};
use crate::devices::{AmbientTemperature, BaseLoad, Device, SolarPv};
use crate::dispatch::schedule::{HOURS_PER_DAY, MONTHS};
use crate::dispatch::{Coupling, DispatchParams, DispatchProfile, Schedule};
use crate::error::ModelError;
use crate::sim::{DispatchMode, DispatchSetup, Engine, SimConfig};

/// Seed offset for the PV RNG to avoid correlation with the load.
const SOLAR_SEED_OFFSET: u64 = 31;
const MAX_PROFILES: usize = 6;

/// Top-level scenario configuration parsed from TOML.
///
/// All fields have defaults matching the baseline scenario. Load from
/// TOML with [`ScenarioConfig::from_toml_file`] or use
/// [`ScenarioConfig::baseline`] for the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation timing and global parameters.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Battery bank chemistry, geometry and voltage curve.
    #[serde(default)]
    pub battery: BatteryConfig,
    /// Thermal model parameters.
    #[serde(default)]
    pub thermal: ThermalConfig,
    /// Degradation table and replacement policy.
    #[serde(default)]
    pub lifetime: LifetimeConfig,
    /// Dispatch limits, profiles and schedule.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Baseload generator parameters.
    #[serde(default)]
    pub baseload: BaseloadConfig,
    /// Solar PV generator parameters.
    #[serde(default)]
    pub solar: SolarConfig,
}

/// Simulation timing and global parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of timesteps per hour (must be > 0).
    pub steps_per_hour: usize,
    /// Number of years to simulate (must be > 0).
    pub years: usize,
    /// Master random seed.
    pub seed: u64,
    /// `"manual"` or `"peak_shaving"`.
    pub dispatch_mode: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps_per_hour: 1,
            years: 1,
            seed: 42,
            dispatch_mode: "manual".to_string(),
        }
    }
}

/// Battery bank parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    /// `"lithium_ion"` or `"kibam"`.
    pub chemistry: String,
    /// Bank capacity (Ah); the 20-hour capacity for KiBaM.
    pub qmax_ah: f64,
    /// KiBaM: duration of the fast discharge test (h).
    pub kibam_t1_hour: f64,
    /// KiBaM: capacity delivered over `kibam_t1_hour` (Ah).
    pub kibam_q1_ah: f64,
    /// KiBaM: capacity delivered over a 10-hour discharge (Ah).
    pub kibam_q10_ah: f64,
    /// `"dynamic"` or `"basic"`.
    pub voltage_model: String,
    pub num_cells_series: usize,
    pub num_strings: usize,
    /// Fixed cell voltage of the basic model (V).
    pub cell_voltage: f64,
    /// Discharge curve of one cell (dynamic model).
    pub v_full: f64,
    pub v_exp: f64,
    pub v_nom: f64,
    pub q_full: f64,
    pub q_exp: f64,
    pub q_nom: f64,
    pub c_rate: f64,
    /// Cell internal resistance (Ohm).
    pub resistance: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            chemistry: "lithium_ion".to_string(),
            qmax_ah: 58.5,
            kibam_t1_hour: 1.0,
            kibam_q1_ah: 0.0,
            kibam_q10_ah: 0.0,
            voltage_model: "dynamic".to_string(),
            num_cells_series: 96,
            num_strings: 26,
            cell_voltage: 3.6,
            v_full: 4.1,
            v_exp: 4.05,
            v_nom: 3.4,
            q_full: 2.25,
            q_exp: 0.04,
            q_nom: 2.0,
            c_rate: 0.2,
            resistance: 0.2,
        }
    }
}

/// Thermal model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThermalConfig {
    /// Battery mass (kg).
    pub mass: f64,
    /// Enclosure length, width and height (m).
    pub length: f64,
    pub width: f64,
    pub height: f64,
    /// Specific heat (J/kg·K).
    pub cp: f64,
    /// Heat transfer coefficient (W/m²·K).
    pub h: f64,
    /// Mean room temperature (°C).
    pub t_room_c: f64,
    /// Daily swing of the room temperature around its mean (°C).
    pub ambient_swing_c: f64,
    /// Rows of (temperature °C, capacity %).
    pub capacity_vs_temperature: Vec<[f64; 2]>,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            mass: 507.0,
            length: 0.58,
            width: 0.58,
            height: 0.58,
            cp: 1004.0,
            h: 20.0,
            t_room_c: 20.0,
            ambient_swing_c: 0.0,
            capacity_vs_temperature: vec![
                [-10.0, 60.0],
                [0.0, 80.0],
                [25.0, 100.0],
                [40.0, 100.0],
            ],
        }
    }
}

/// Degradation table and replacement policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LifetimeConfig {
    /// Rows of (DOD %, cycles, retention %).
    pub degradation: Vec<[f64; 3]>,
    /// `"none"` or `"capacity"`.
    pub replacement: String,
    /// Retention that triggers a replacement (%).
    pub replacement_capacity_pct: f64,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            degradation: vec![
                [20.0, 0.0, 100.0],
                [20.0, 5000.0, 80.0],
                [20.0, 10000.0, 60.0],
                [80.0, 0.0, 100.0],
                [80.0, 1000.0, 80.0],
                [80.0, 2000.0, 60.0],
            ],
            replacement: "none".to_string(),
            replacement_capacity_pct: 50.0,
        }
    }
}

/// One dispatch profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileConfig {
    pub charge: bool,
    pub discharge: bool,
    pub grid_charge: bool,
    pub percent_discharge: f64,
    pub percent_grid_charge: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            charge: true,
            discharge: false,
            grid_charge: false,
            percent_discharge: 0.0,
            percent_grid_charge: 0.0,
        }
    }
}

impl From<&ProfileConfig> for DispatchProfile {
    fn from(p: &ProfileConfig) -> Self {
        Self {
            charge: p.charge,
            discharge: p.discharge,
            grid_charge: p.grid_charge,
            percent_discharge: p.percent_discharge,
            percent_grid_charge: p.percent_grid_charge,
        }
    }
}

/// Dispatch limits, profiles and schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// SOC window (%); the battery starts at `soc_max`.
    pub soc_min: f64,
    pub soc_max: f64,
    /// Current limits (A).
    pub current_charge_max: f64,
    pub current_discharge_max: f64,
    /// Minimum time between charge/discharge flips (min).
    pub t_min_minutes: f64,
    /// `"ac"` or `"dc"`.
    pub coupling: String,
    /// Conversion efficiencies (%).
    pub dc_dc_efficiency: f64,
    pub ac_dc_efficiency: f64,
    pub dc_ac_efficiency: f64,
    /// Up to six profiles, referenced 1-based by the schedule.
    pub profiles: Vec<ProfileConfig>,
    /// 24 hourly profile numbers shared by every month.
    pub daily_schedule: Vec<usize>,
    /// Optional 12 x 24 table overriding `daily_schedule`.
    pub monthly_schedule: Vec<Vec<usize>>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let mut daily_schedule = vec![1; HOURS_PER_DAY];
        for cell in &mut daily_schedule[16..22] {
            *cell = 2;
        }
        Self {
            soc_min: 10.0,
            soc_max: 95.0,
            current_charge_max: 30.0,
            current_discharge_max: 30.0,
            t_min_minutes: 10.0,
            coupling: "ac".to_string(),
            dc_dc_efficiency: 99.0,
            ac_dc_efficiency: 96.0,
            dc_ac_efficiency: 96.0,
            profiles: vec![
                ProfileConfig::default(),
                ProfileConfig {
                    discharge: true,
                    percent_discharge: 100.0,
                    percent_grid_charge: 100.0,
                    ..ProfileConfig::default()
                },
            ],
            daily_schedule,
            monthly_schedule: Vec::new(),
        }
    }
}

/// Baseload generator parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseloadConfig {
    /// Baseline consumption (kW).
    pub base_kw: f64,
    /// Sinusoidal amplitude (kW).
    pub amp_kw: f64,
    /// Phase offset (radians).
    pub phase_rad: f64,
    /// Gaussian noise standard deviation (kW).
    pub noise_std: f64,
}

impl Default for BaseloadConfig {
    fn default() -> Self {
        Self {
            base_kw: 1.2,
            amp_kw: 0.8,
            phase_rad: 4.2,
            noise_std: 0.1,
        }
    }
}

/// Solar PV generator parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolarConfig {
    /// Peak generation (kW).
    pub kw_peak: f64,
    /// Sunrise hour (inclusive).
    pub sunrise_hour: usize,
    /// Sunset hour (exclusive).
    pub sunset_hour: usize,
    /// Fractional summer/winter change of peak output.
    pub seasonal_swing: f64,
    /// Noise standard deviation as a fraction of output.
    pub noise_std: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            kw_peak: 5.0,
            sunrise_hour: 6,
            sunset_hour: 19,
            seasonal_swing: 0.3,
            noise_std: 0.1,
        }
    }
}

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"simulation.steps_per_hour"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn one_of(errors: &mut Vec<ConfigError>, field: &str, value: &str, allowed: &[&str]) {
    if !allowed.contains(&value) {
        let allowed: Vec<String> = allowed.iter().map(|a| format!("\"{a}\"")).collect();
        errors.push(ConfigError::new(
            field,
            format!("must be one of {}, got \"{value}\"", allowed.join(", ")),
        ));
    }
}

fn positive(errors: &mut Vec<ConfigError>, field: &str, value: f64) {
    if !(value > 0.0) {
        errors.push(ConfigError::new(field, format!("must be > 0, got {value}")));
    }
}

impl ScenarioConfig {
    /// Returns the baseline scenario: lithium-ion bank, evening discharge
    /// schedule.
    pub fn baseline() -> Self {
        Self::default()
    }

    /// Returns the lead-acid preset: KiBaM capacity with a lead-acid voltage
    /// curve and capacity-based replacement.
    pub fn lead_acid() -> Self {
        Self {
            battery: BatteryConfig {
                chemistry: "kibam".to_string(),
                qmax_ah: 100.0,
                kibam_t1_hour: 1.0,
                kibam_q1_ah: 58.5,
                kibam_q10_ah: 93.2,
                num_cells_series: 96,
                num_strings: 1,
                cell_voltage: 2.0,
                v_full: 2.2,
                v_exp: 2.06,
                v_nom: 2.03,
                q_full: 100.0,
                q_exp: 2.5,
                q_nom: 90.0,
                c_rate: 0.05,
                resistance: 0.002,
                ..BatteryConfig::default()
            },
            thermal: ThermalConfig {
                capacity_vs_temperature: vec![
                    [-15.0, 65.0],
                    [0.0, 85.0],
                    [25.0, 100.0],
                    [40.0, 100.0],
                ],
                ambient_swing_c: 5.0,
                ..ThermalConfig::default()
            },
            lifetime: LifetimeConfig {
                degradation: vec![
                    [30.0, 0.0, 100.0],
                    [30.0, 1100.0, 90.0],
                    [30.0, 1200.0, 50.0],
                    [50.0, 0.0, 100.0],
                    [50.0, 400.0, 90.0],
                    [50.0, 500.0, 50.0],
                    [100.0, 0.0, 100.0],
                    [100.0, 100.0, 90.0],
                    [100.0, 150.0, 50.0],
                ],
                replacement: "capacity".to_string(),
                replacement_capacity_pct: 60.0,
            },
            dispatch: DispatchConfig {
                soc_min: 40.0,
                soc_max: 100.0,
                current_charge_max: 20.0,
                current_discharge_max: 20.0,
                ..DispatchConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the peak-shaving preset: day-ahead automated dispatch against
    /// a peaky evening load.
    pub fn peak_shaving() -> Self {
        Self {
            simulation: SimulationConfig {
                dispatch_mode: "peak_shaving".to_string(),
                ..SimulationConfig::default()
            },
            baseload: BaseloadConfig {
                base_kw: 2.0,
                amp_kw: 1.5,
                ..BaseloadConfig::default()
            },
            dispatch: DispatchConfig {
                profiles: vec![ProfileConfig::default()],
                daily_schedule: vec![1; HOURS_PER_DAY],
                ..DispatchConfig::default()
            },
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "lead_acid", "peak_shaving"];

    /// Loads a scenario from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "lead_acid" => Ok(Self::lead_acid()),
            "peak_shaving" => Ok(Self::peak_shaving()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid or contains unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        let s = &self.simulation;
        if s.steps_per_hour == 0 {
            errors.push(ConfigError::new("simulation.steps_per_hour", "must be > 0"));
        }
        if s.years == 0 {
            errors.push(ConfigError::new("simulation.years", "must be > 0"));
        }
        one_of(
            &mut errors,
            "simulation.dispatch_mode",
            &s.dispatch_mode,
            &["manual", "peak_shaving"],
        );

        let b = &self.battery;
        one_of(&mut errors, "battery.chemistry", &b.chemistry, &["lithium_ion", "kibam"]);
        one_of(&mut errors, "battery.voltage_model", &b.voltage_model, &["dynamic", "basic"]);
        positive(&mut errors, "battery.qmax_ah", b.qmax_ah);
        if b.chemistry == "kibam" {
            positive(&mut errors, "battery.kibam_t1_hour", b.kibam_t1_hour);
            positive(&mut errors, "battery.kibam_q1_ah", b.kibam_q1_ah);
            positive(&mut errors, "battery.kibam_q10_ah", b.kibam_q10_ah);
        }
        if b.num_cells_series == 0 {
            errors.push(ConfigError::new("battery.num_cells_series", "must be > 0"));
        }
        if b.num_strings == 0 {
            errors.push(ConfigError::new("battery.num_strings", "must be > 0"));
        }
        if b.voltage_model == "basic" {
            positive(&mut errors, "battery.cell_voltage", b.cell_voltage);
        } else {
            if !(b.q_exp > 0.0 && b.q_exp < b.q_nom && b.q_nom < b.q_full) {
                errors.push(ConfigError::new(
                    "battery.q_exp",
                    "need 0 < q_exp < q_nom < q_full",
                ));
            }
            if !(b.v_nom > 0.0 && b.v_nom <= b.v_exp && b.v_exp <= b.v_full) {
                errors.push(ConfigError::new(
                    "battery.v_nom",
                    "need 0 < v_nom <= v_exp <= v_full",
                ));
            }
            positive(&mut errors, "battery.c_rate", b.c_rate);
        }
        if !(b.resistance >= 0.0) {
            errors.push(ConfigError::new("battery.resistance", "must be >= 0"));
        }

        let t = &self.thermal;
        for (field, value) in [
            ("thermal.mass", t.mass),
            ("thermal.length", t.length),
            ("thermal.width", t.width),
            ("thermal.height", t.height),
            ("thermal.cp", t.cp),
            ("thermal.h", t.h),
        ] {
            positive(&mut errors, field, value);
        }
        if t.capacity_vs_temperature.is_empty() {
            errors.push(ConfigError::new(
                "thermal.capacity_vs_temperature",
                "must have at least one row",
            ));
        }

        let l = &self.lifetime;
        if l.degradation.is_empty() {
            errors.push(ConfigError::new(
                "lifetime.degradation",
                "must have at least one row",
            ));
        }
        one_of(&mut errors, "lifetime.replacement", &l.replacement, &["none", "capacity"]);
        if !(0.0..=100.0).contains(&l.replacement_capacity_pct) {
            errors.push(ConfigError::new(
                "lifetime.replacement_capacity_pct",
                "must be in [0, 100]",
            ));
        }

        self.validate_dispatch(&mut errors);

        let sol = &self.solar;
        if sol.sunrise_hour >= sol.sunset_hour {
            errors.push(ConfigError::new("solar.sunrise_hour", "must be < solar.sunset_hour"));
        }
        if sol.sunset_hour > HOURS_PER_DAY {
            errors.push(ConfigError::new("solar.sunset_hour", "must be <= 24"));
        }

        errors
    }

    fn validate_dispatch(&self, errors: &mut Vec<ConfigError>) {
        let d = &self.dispatch;
        if !(0.0 <= d.soc_min && d.soc_min < d.soc_max && d.soc_max <= 100.0) {
            errors.push(ConfigError::new(
                "dispatch.soc_min",
                "need 0 <= soc_min < soc_max <= 100",
            ));
        }
        if !(d.current_charge_max >= 0.0 && d.current_discharge_max >= 0.0) {
            errors.push(ConfigError::new("dispatch.current_charge_max", "must be >= 0"));
        }
        if !(d.t_min_minutes >= 0.0) {
            errors.push(ConfigError::new("dispatch.t_min_minutes", "must be >= 0"));
        }
        one_of(errors, "dispatch.coupling", &d.coupling, &["ac", "dc"]);
        for (field, eff) in [
            ("dispatch.dc_dc_efficiency", d.dc_dc_efficiency),
            ("dispatch.ac_dc_efficiency", d.ac_dc_efficiency),
            ("dispatch.dc_ac_efficiency", d.dc_ac_efficiency),
        ] {
            if !(eff > 0.0 && eff <= 100.0) {
                errors.push(ConfigError::new(field, "must be in (0, 100]"));
            }
        }

        if d.profiles.is_empty() || d.profiles.len() > MAX_PROFILES {
            errors.push(ConfigError::new(
                "dispatch.profiles",
                format!("must define 1 to {MAX_PROFILES} profiles"),
            ));
        }
        for (i, p) in d.profiles.iter().enumerate() {
            if !(0.0..=100.0).contains(&p.percent_discharge)
                || !(0.0..=100.0).contains(&p.percent_grid_charge)
            {
                errors.push(ConfigError::new(
                    format!("dispatch.profiles[{i}]"),
                    "percentages must be in [0, 100]",
                ));
            }
        }

        let n = d.profiles.len();
        let valid_id = |id: &usize| (1..=n).contains(id);
        if d.monthly_schedule.is_empty() {
            if d.daily_schedule.len() != HOURS_PER_DAY {
                errors.push(ConfigError::new(
                    "dispatch.daily_schedule",
                    format!("must have {HOURS_PER_DAY} entries"),
                ));
            }
            if !d.daily_schedule.iter().all(valid_id) {
                errors.push(ConfigError::new(
                    "dispatch.daily_schedule",
                    format!("entries must be profile numbers 1..={n}"),
                ));
            }
        } else {
            let shape_ok = d.monthly_schedule.len() == MONTHS
                && d.monthly_schedule.iter().all(|r| r.len() == HOURS_PER_DAY);
            if !shape_ok {
                errors.push(ConfigError::new(
                    "dispatch.monthly_schedule",
                    format!("must be {MONTHS} rows of {HOURS_PER_DAY} entries"),
                ));
            }
            if !d.monthly_schedule.iter().flatten().all(valid_id) {
                errors.push(ConfigError::new(
                    "dispatch.monthly_schedule",
                    format!("entries must be profile numbers 1..={n}"),
                ));
            }
        }
    }

    /// Simulation timing. Call on a validated config.
    ///
    /// # Panics
    ///
    /// Panics if `steps_per_hour` or `years` is zero.
    pub fn build_sim_config(&self) -> SimConfig {
        let s = &self.simulation;
        SimConfig::new(s.steps_per_hour, s.years, s.seed)
    }

    fn dt_hour(&self) -> f64 {
        1.0 / self.simulation.steps_per_hour.max(1) as f64
    }

    /// Assembles the battery bank.
    ///
    /// # Errors
    ///
    /// Returns the [`ModelError`] of the first sub-model that rejects its
    /// parameters.
    pub fn build_battery(&self) -> Result<Battery, ModelError> {
        let b = &self.battery;
        let soc_max = self.dispatch.soc_max;
        let capacity: Capacity = match b.chemistry.as_str() {
            "kibam" => KibamCapacity::new(
                b.qmax_ah,
                b.kibam_t1_hour,
                b.kibam_q1_ah,
                b.kibam_q10_ah,
                soc_max,
            )?
            .into(),
            _ => LithiumIonCapacity::new(b.qmax_ah, soc_max)?.into(),
        };
        let voltage: Voltage = match b.voltage_model.as_str() {
            "basic" => BasicVoltage::new(b.num_cells_series, b.num_strings, b.cell_voltage)?.into(),
            _ => DynamicVoltage::new(
                b.num_cells_series,
                b.num_strings,
                DischargeCurve {
                    v_full: b.v_full,
                    v_exp: b.v_exp,
                    v_nom: b.v_nom,
                    q_full: b.q_full,
                    q_exp: b.q_exp,
                    q_nom: b.q_nom,
                    c_rate: b.c_rate,
                    resistance: b.resistance,
                },
            )?
            .into(),
        };

        let rows: Vec<(f64, f64, f64)> = self
            .lifetime
            .degradation
            .iter()
            .map(|&[dod, cycles, retention]| (dod, cycles, retention))
            .collect();
        let policy = match self.lifetime.replacement.as_str() {
            "capacity" => ReplacementPolicy::AtCapacity(self.lifetime.replacement_capacity_pct),
            _ => ReplacementPolicy::None,
        };
        let lifetime = Lifetime::new(DegradationTable::new(&rows)?, policy);

        let t = &self.thermal;
        let curve: Vec<(f64, f64)> = t
            .capacity_vs_temperature
            .iter()
            .map(|&[temp, pct]| (temp, pct))
            .collect();
        let thermal = Thermal::new(
            ThermalParams {
                mass: t.mass,
                length: t.length,
                width: t.width,
                height: t.height,
                cp: t.cp,
                h: t.h,
                t_room_c: t.t_room_c,
            },
            &curve,
        )?;

        Battery::initialize(
            self.dt_hour(),
            capacity,
            voltage,
            lifetime,
            thermal,
            Losses::new(),
        )
    }

    /// Controller limits for the dispatchers.
    pub fn build_dispatch_params(&self) -> DispatchParams {
        let d = &self.dispatch;
        DispatchParams {
            dt_hour: self.dt_hour(),
            soc_min: d.soc_min,
            soc_max: d.soc_max,
            current_charge_max: d.current_charge_max,
            current_discharge_max: d.current_discharge_max,
            t_min: d.t_min_minutes,
            coupling: match d.coupling.as_str() {
                "dc" => Coupling::Dc,
                _ => Coupling::Ac,
            },
            dc_dc_efficiency: d.dc_dc_efficiency,
            ac_dc_efficiency: d.ac_dc_efficiency,
            dc_ac_efficiency: d.dc_ac_efficiency,
        }
    }

    pub fn build_profiles(&self) -> Vec<DispatchProfile> {
        self.dispatch.profiles.iter().map(DispatchProfile::from).collect()
    }

    /// Hourly schedule from `monthly_schedule`, or `daily_schedule` when no
    /// monthly table is given.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Schedule`] for a malformed table.
    pub fn build_schedule(&self) -> Result<Schedule, ModelError> {
        let d = &self.dispatch;
        if d.monthly_schedule.is_empty() {
            Schedule::from_daily(&d.daily_schedule)
        } else {
            Schedule::new(1, &d.monthly_schedule)
        }
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        match self.simulation.dispatch_mode.as_str() {
            "peak_shaving" => DispatchMode::PeakShaving,
            _ => DispatchMode::Manual,
        }
    }

    /// One year of synthetic PV and load energy (kWh per step) plus hourly
    /// ambient temperature (°C).
    pub fn build_series(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let cfg = self.build_sim_config();
        let spd = cfg.steps_per_day();
        let sph = cfg.steps_per_hour;
        let steps = cfg.steps_per_year();

        let bl = &self.baseload;
        let mut load = BaseLoad::new(bl.base_kw, bl.amp_kw, bl.phase_rad, bl.noise_std, spd, cfg.seed);
        let sol = &self.solar;
        let mut pv = SolarPv::new(
            sol.kw_peak,
            sol.sunrise_hour * sph,
            sol.sunset_hour * sph,
            sol.seasonal_swing,
            sol.noise_std,
            spd,
            cfg.seed.wrapping_add(SOLAR_SEED_OFFSET),
        );
        let ambient = AmbientTemperature::new(
            self.thermal.t_room_c,
            self.thermal.ambient_swing_c,
            HOURS_PER_DAY,
        );

        (
            pv.energy_series(steps, cfg.dt_hour),
            load.energy_series(steps, cfg.dt_hour),
            ambient.series(steps / sph),
        )
    }

    /// Builds the engine for a validated config.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError`] raised by a model or dispatcher.
    pub fn build_engine(&self) -> Result<Engine, ModelError> {
        let (pv, load, ambient) = self.build_series();
        let setup = DispatchSetup {
            params: self.build_dispatch_params(),
            schedule: self.build_schedule()?,
            profiles: self.build_profiles(),
            mode: self.dispatch_mode(),
        };
        let engine = Engine::new(self.build_sim_config(), self.build_battery()?, setup, pv, load)?;
        Ok(engine.with_ambient_temperature(ambient))
    }
}
