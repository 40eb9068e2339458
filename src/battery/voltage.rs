//! Terminal-voltage models.

use super::capacity::CapacityModel;
use crate::error::{ModelError, Result};

/// Default internal resistance for models that do not specify one (Ω).
const DEFAULT_RESISTANCE: f64 = 0.004;

/// State shared by all voltage models.
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageState {
    /// Cells connected in series per string.
    pub num_cells_series: usize,
    /// Strings connected in parallel.
    pub num_strings: usize,
    /// Present cell voltage (V).
    pub cell_voltage: f64,
    /// Cell internal resistance (Ω).
    pub resistance: f64,
}

impl VoltageState {
    fn new(num_cells_series: usize, num_strings: usize, cell_voltage: f64) -> Result<Self> {
        if num_cells_series == 0 {
            return Err(ModelError::invalid("num_cells_series", "must be > 0"));
        }
        if num_strings == 0 {
            return Err(ModelError::invalid("num_strings", "must be > 0"));
        }
        if !(cell_voltage > 0.0) {
            return Err(ModelError::invalid(
                "cell_voltage",
                format!("must be > 0, got {cell_voltage}"),
            ));
        }
        Ok(Self {
            num_cells_series,
            num_strings,
            cell_voltage,
            resistance: DEFAULT_RESISTANCE,
        })
    }
}

/// Contract every voltage model offers to the battery orchestrator.
pub trait VoltageModel {
    /// Recomputes the cell voltage from the capacity state after a step.
    fn update_voltage(&mut self, capacity: &impl CapacityModel, dt_hour: f64);

    /// Shared state.
    fn state(&self) -> &VoltageState;

    /// Cell voltage (V).
    fn cell_voltage(&self) -> f64 {
        self.state().cell_voltage
    }

    /// Pack voltage: cells in series times cell voltage (V).
    fn battery_voltage(&self) -> f64 {
        self.state().num_cells_series as f64 * self.state().cell_voltage
    }

    /// Cell internal resistance (Ω).
    fn resistance(&self) -> f64 {
        self.state().resistance
    }
}

/// Nameplate points of a cell discharge curve used to fit [`DynamicVoltage`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DischargeCurve {
    /// Fully charged voltage (V).
    pub v_full: f64,
    /// Voltage at the end of the exponential zone (V).
    pub v_exp: f64,
    /// Voltage at the end of the nominal zone (V).
    pub v_nom: f64,
    /// Fully charged capacity (Ah).
    pub q_full: f64,
    /// Charge removed at the end of the exponential zone (Ah).
    pub q_exp: f64,
    /// Charge removed at the end of the nominal zone (Ah).
    pub q_nom: f64,
    /// Discharge rate the curve was measured at (1/h).
    pub c_rate: f64,
    /// Internal resistance (Ω).
    pub resistance: f64,
}

/// Electrochemical curve constants of the hybrid exponential/polarization model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveConstants {
    /// Battery constant voltage (V).
    pub e0: f64,
    /// Polarization voltage (V).
    pub k: f64,
    /// Exponential zone amplitude (V).
    pub a: f64,
    /// Exponential zone inverse time constant (1/Ah).
    pub b: f64,
}

impl CurveConstants {
    /// Fits the constants to a nameplate discharge curve.
    pub fn fit(curve: &DischargeCurve) -> Self {
        let i_rated = curve.q_full * curve.c_rate;
        let a = curve.v_full - curve.v_exp;
        let b = 3.0 / curve.q_exp;
        let k = ((curve.v_full - curve.v_nom + a * ((-b * curve.q_nom).exp() - 1.0))
            * (curve.q_full - curve.q_nom))
            / curve.q_nom;
        let e0 = curve.v_full + k + curve.resistance * i_rated - a;
        Self { e0, k, a, b }
    }
}

/// Voltage that tracks the charge state through a fitted discharge curve.
#[derive(Debug, Clone)]
pub struct DynamicVoltage {
    state: VoltageState,
    curve: DischargeCurve,
    constants: CurveConstants,
}

impl DynamicVoltage {
    /// Creates a dynamic model starting at the fully charged voltage.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] for zero cell/string counts or
    /// curve points that cannot be fitted (non-positive charges, `v_exp`
    /// above `v_full`, `q_nom` beyond `q_full`).
    pub fn new(num_cells_series: usize, num_strings: usize, curve: DischargeCurve) -> Result<Self> {
        if !(curve.q_exp > 0.0 && curve.q_nom > 0.0 && curve.q_full > 0.0) {
            return Err(ModelError::invalid("q_exp/q_nom/q_full", "must all be > 0"));
        }
        if curve.q_nom >= curve.q_full {
            return Err(ModelError::invalid("q_nom", "must be < q_full"));
        }
        if curve.v_exp > curve.v_full || curve.v_nom > curve.v_exp {
            return Err(ModelError::invalid("v_full/v_exp/v_nom", "must be descending"));
        }
        let mut state = VoltageState::new(num_cells_series, num_strings, curve.v_full)?;
        state.resistance = curve.resistance;
        Ok(Self {
            state,
            curve,
            constants: CurveConstants::fit(&curve),
        })
    }

    /// Fitted curve constants.
    pub fn constants(&self) -> CurveConstants {
        self.constants
    }

    /// Evaluates the cell voltage on a per-cell, per-string basis.
    ///
    /// * `q` - Maximum charge per string (Ah)
    /// * `current` - Current per string (A, positive discharging)
    /// * `q0` - Present charge per string (Ah)
    pub fn voltage_model(&self, q: f64, current: f64, q0: f64) -> f64 {
        let CurveConstants { e0, k, a, b } = self.constants;
        let it = q - q0;
        let e = e0 - k * (q / (q - it)) + a * (-b * it).exp();
        let v = e - self.state.resistance * current;

        // Below ~1% SOC the curve diverges.
        if v < 0.0 || !v.is_finite() {
            0.5 * self.curve.v_nom
        } else if v > self.curve.v_full * 1.25 {
            self.curve.v_full
        } else {
            v
        }
    }
}

impl VoltageModel for DynamicVoltage {
    fn update_voltage(&mut self, capacity: &impl CapacityModel, _dt_hour: f64) {
        let strings = self.state.num_strings as f64;
        self.state.cell_voltage = self.voltage_model(
            capacity.qmax() / strings,
            capacity.current() / strings,
            capacity.q0() / strings,
        );
    }

    fn state(&self) -> &VoltageState {
        &self.state
    }
}

/// Voltage held at its initial value.
#[derive(Debug, Clone)]
pub struct BasicVoltage {
    state: VoltageState,
}

impl BasicVoltage {
    /// Creates a fixed-voltage model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] for zero counts or a
    /// non-positive cell voltage.
    pub fn new(num_cells_series: usize, num_strings: usize, cell_voltage: f64) -> Result<Self> {
        Ok(Self {
            state: VoltageState::new(num_cells_series, num_strings, cell_voltage)?,
        })
    }
}

impl VoltageModel for BasicVoltage {
    fn update_voltage(&mut self, _capacity: &impl CapacityModel, _dt_hour: f64) {}

    fn state(&self) -> &VoltageState {
        &self.state
    }
}

/// The voltage model selected for a battery.
#[derive(Debug, Clone)]
pub enum Voltage {
    Dynamic(DynamicVoltage),
    Basic(BasicVoltage),
}

impl VoltageModel for Voltage {
    fn update_voltage(&mut self, capacity: &impl CapacityModel, dt_hour: f64) {
        match self {
            Self::Dynamic(v) => v.update_voltage(capacity, dt_hour),
            Self::Basic(v) => v.update_voltage(capacity, dt_hour),
        }
    }

    fn state(&self) -> &VoltageState {
        match self {
            Self::Dynamic(v) => v.state(),
            Self::Basic(v) => v.state(),
        }
    }
}

impl From<DynamicVoltage> for Voltage {
    fn from(v: DynamicVoltage) -> Self {
        Self::Dynamic(v)
    }
}

impl From<BasicVoltage> for Voltage {
    fn from(v: BasicVoltage) -> Self {
        Self::Basic(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::capacity::LithiumIonCapacity;

    /// Lithium-ion cell curve (2.25 Ah, 4.1 V full).
    fn li_ion_curve() -> DischargeCurve {
        DischargeCurve {
            v_full: 4.1,
            v_exp: 4.05,
            v_nom: 3.4,
            q_full: 2.25,
            q_exp: 0.04,
            q_nom: 2.0,
            c_rate: 0.2,
            resistance: 0.002,
        }
    }

    #[test]
    fn full_charge_at_rest_matches_full_voltage() {
        let curve = li_ion_curve();
        let v = DynamicVoltage::new(1, 1, curve).unwrap();
        let full = v.voltage_model(curve.q_full, 0.0, curve.q_full);
        // At it = 0 the fit reduces to v_full plus the rated-current IR term.
        let ir = curve.resistance * curve.q_full * curve.c_rate;
        assert!((full - (curve.v_full + ir)).abs() < 1e-9);
        assert!((full - curve.v_full).abs() < 1e-3);
    }

    #[test]
    fn voltage_drops_as_charge_is_removed() {
        let curve = li_ion_curve();
        let v = DynamicVoltage::new(1, 1, curve).unwrap();
        let high = v.voltage_model(2.25, 0.0, 2.0);
        let low = v.voltage_model(2.25, 0.0, 0.5);
        assert!(high > low);
    }

    #[test]
    fn deep_discharge_clamps_to_half_nominal() {
        let curve = li_ion_curve();
        let v = DynamicVoltage::new(1, 1, curve).unwrap();
        assert_eq!(v.voltage_model(2.25, 0.0, 0.0), 0.5 * curve.v_nom);
    }

    #[test]
    fn overshoot_clamps_to_full_voltage() {
        let curve = li_ion_curve();
        let v = DynamicVoltage::new(1, 1, curve).unwrap();
        // Large charging current drives the IR term far above v_full.
        assert_eq!(v.voltage_model(2.25, -1000.0, 2.25), curve.v_full);
    }

    #[test]
    fn update_uses_per_string_quantities() {
        let curve = li_ion_curve();
        let mut v = DynamicVoltage::new(10, 4, curve).unwrap();
        let mut cap = LithiumIonCapacity::new(4.0 * 2.25, 100.0).unwrap();
        cap.update_capacity(1.0, 1.0);
        v.update_voltage(&cap, 1.0);
        let expected = v.voltage_model(2.25, 0.25, 2.0);
        assert!((v.cell_voltage() - expected).abs() < 1e-12);
        assert!((v.battery_voltage() - 10.0 * expected).abs() < 1e-9);
    }

    #[test]
    fn basic_voltage_never_changes() {
        let mut v = Voltage::from(BasicVoltage::new(100, 1, 3.6).unwrap());
        let mut cap = LithiumIonCapacity::new(100.0, 100.0).unwrap();
        cap.update_capacity(90.0, 1.0);
        v.update_voltage(&cap, 1.0);
        assert_eq!(v.cell_voltage(), 3.6);
        assert!((v.battery_voltage() - 360.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert!(BasicVoltage::new(0, 1, 3.6).is_err());
        assert!(BasicVoltage::new(1, 0, 3.6).is_err());
        let mut curve = li_ion_curve();
        curve.q_nom = 3.0;
        assert!(DynamicVoltage::new(1, 1, curve).is_err());
    }
}
