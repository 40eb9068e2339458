//! Lumped-mass heat balance for the battery bank.

use super::curve::Curve;
use crate::error::{ModelError, Result};

const HOURS_TO_SECONDS: f64 = 3600.0;
const CELSIUS_TO_KELVIN: f64 = 273.15;
/// Resistance assumed until the voltage model reports one (Ω).
const INITIAL_RESISTANCE: f64 = 0.004;

/// Physical parameters of the thermal model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalParams {
    /// Battery mass (kg).
    pub mass: f64,
    /// Enclosure length (m).
    pub length: f64,
    /// Enclosure width (m).
    pub width: f64,
    /// Enclosure height (m).
    pub height: f64,
    /// Specific heat capacity (J/kg·K).
    pub cp: f64,
    /// Heat transfer coefficient to ambient (W/m²·K).
    pub h: f64,
    /// Ambient temperature (°C).
    pub t_room_c: f64,
}

/// Battery temperature driven by ambient exchange and resistive heating:
///
/// `dT/dt = (h·A·(T_room − T) + I²·R) / (m·Cp)`
#[derive(Debug, Clone)]
pub struct Thermal {
    params: ThermalParams,
    /// Exposed area, all six faces (m²).
    area: f64,
    resistance: f64,
    t_room: f64,
    t_battery: f64,
    /// Retention (%) by temperature (K).
    cap_vs_temp: Curve,
}

impl Thermal {
    /// Creates a thermal model at ambient temperature.
    ///
    /// # Arguments
    ///
    /// * `params` - Mass, dimensions and heat-transfer parameters
    /// * `cap_vs_temp_c` - `(temperature °C, retention %)` rows
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyTable`] if the curve has no finite rows, or
    /// [`ModelError::InvalidParameter`] for a non-positive mass, heat
    /// capacity, dimension or heat-transfer coefficient.
    pub fn new(params: ThermalParams, cap_vs_temp_c: &[(f64, f64)]) -> Result<Self> {
        for (name, value) in [
            ("thermal.mass", params.mass),
            ("thermal.length", params.length),
            ("thermal.width", params.width),
            ("thermal.height", params.height),
            ("thermal.cp", params.cp),
            ("thermal.h", params.h),
        ] {
            if !(value > 0.0) {
                return Err(ModelError::invalid(name, format!("must be > 0, got {value}")));
            }
        }

        let kelvin: Vec<(f64, f64)> = cap_vs_temp_c
            .iter()
            .map(|&(t, c)| (t + CELSIUS_TO_KELVIN, c))
            .collect();
        let cap_vs_temp = Curve::new("capacity_vs_temperature", &kelvin)?;

        let ThermalParams {
            length,
            width,
            height,
            ..
        } = params;
        let t_room = params.t_room_c + CELSIUS_TO_KELVIN;
        Ok(Self {
            params,
            area: 2.0 * (length * width + length * height + width * height),
            resistance: INITIAL_RESISTANCE,
            t_room,
            t_battery: t_room,
            cap_vs_temp,
        })
    }

    /// Advances the temperature one step with a semi-implicit trapezoidal
    /// update.
    ///
    /// # Arguments
    ///
    /// * `current` - Battery current (A)
    /// * `resistance` - Internal resistance from the previous step (Ω)
    /// * `dt_hour` - Step length (h)
    pub fn update_temperature(&mut self, current: f64, resistance: f64, dt_hour: f64) {
        self.resistance = resistance;
        let dt = dt_hour * HOURS_TO_SECONDS;

        let b = 1.0 / (self.params.mass * self.params.cp);
        let c = self.params.h * self.area;
        let d = current * current * self.resistance;
        let t_prime = self.derivative(self.t_battery, current);

        self.t_battery = (self.t_battery + 0.5 * dt * (t_prime + b * (c * self.t_room + d)))
            / (1.0 + 0.5 * dt * b * c);
    }

    fn derivative(&self, t_battery: f64, current: f64) -> f64 {
        (1.0 / (self.params.mass * self.params.cp))
            * (self.params.h * (self.t_room - t_battery) * self.area
                + current * current * self.resistance)
    }

    /// Capacity retention at the present temperature (%), within `[0, 100]`.
    pub fn capacity_percent(&self) -> f64 {
        self.cap_vs_temp.eval(self.t_battery).clamp(0.0, 100.0)
    }

    /// Updates the ambient temperature (°C) for subsequent steps.
    pub fn set_ambient_temperature_c(&mut self, t_room_c: f64) {
        self.params.t_room_c = t_room_c;
        self.t_room = t_room_c + CELSIUS_TO_KELVIN;
    }

    /// Resets the battery to ambient temperature.
    pub fn replace_battery(&mut self) {
        self.t_battery = self.t_room;
    }

    /// Battery temperature (K).
    pub fn temperature_k(&self) -> f64 {
        self.t_battery
    }

    /// Battery temperature (°C).
    pub fn temperature_c(&self) -> f64 {
        self.t_battery - CELSIUS_TO_KELVIN
    }

    /// Ambient temperature (K).
    pub fn ambient_k(&self) -> f64 {
        self.t_room
    }

    /// Exposed surface area (m²).
    pub fn area(&self) -> f64 {
        self.area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ThermalParams {
        ThermalParams {
            mass: 40.0,
            length: 0.5,
            width: 0.5,
            height: 0.25,
            cp: 1000.0,
            h: 20.0,
            t_room_c: 20.0,
        }
    }

    fn curve() -> Vec<(f64, f64)> {
        vec![(-10.0, 60.0), (0.0, 80.0), (25.0, 100.0), (40.0, 100.0)]
    }

    #[test]
    fn starts_at_ambient() {
        let t = Thermal::new(params(), &curve()).unwrap();
        assert!((t.temperature_c() - 20.0).abs() < 1e-12);
        assert!((t.area() - 1.0).abs() < 1e-12);
        // 20 °C lies between 0 °C (80 %) and 25 °C (100 %).
        assert!((t.capacity_percent() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn converges_to_ambient_without_current() {
        let mut t = Thermal::new(params(), &curve()).unwrap();
        t.set_ambient_temperature_c(35.0);
        for _ in 0..500 {
            t.update_temperature(0.0, 0.004, 1.0);
        }
        assert!((t.temperature_k() - t.ambient_k()).abs() < 1e-6);
    }

    #[test]
    fn large_steps_remain_stable() {
        let mut t = Thermal::new(params(), &curve()).unwrap();
        t.set_ambient_temperature_c(-10.0);
        let mut error = (t.temperature_k() - t.ambient_k()).abs();
        for _ in 0..50 {
            t.update_temperature(0.0, 0.004, 24.0);
            let next = (t.temperature_k() - t.ambient_k()).abs();
            assert!(next < error);
            error = next;
        }
    }

    #[test]
    fn resistive_heating_settles_above_ambient() {
        let mut t = Thermal::new(params(), &curve()).unwrap();
        for _ in 0..500 {
            t.update_temperature(100.0, 0.01, 1.0);
        }
        // Steady state: h·A·ΔT = I²·R.
        let expected = t.ambient_k() + 100.0 * 100.0 * 0.01 / (20.0 * 1.0);
        assert!((t.temperature_k() - expected).abs() < 1e-6);
    }

    #[test]
    fn replace_resets_to_ambient() {
        let mut t = Thermal::new(params(), &curve()).unwrap();
        t.update_temperature(200.0, 0.05, 1.0);
        assert!(t.temperature_k() > t.ambient_k());
        t.replace_battery();
        assert_eq!(t.temperature_k(), t.ambient_k());
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(Thermal::new(params(), &[]).is_err());
        let mut p = params();
        p.mass = 0.0;
        assert!(Thermal::new(p, &curve()).is_err());
    }
}
