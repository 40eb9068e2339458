use tracing::{info, trace};

use super::capacity::{Capacity, CapacityModel};
use super::lifetime::Lifetime;
use super::losses::Losses;
use super::thermal::Thermal;
use super::voltage::{Voltage, VoltageModel};
use crate::error::{ModelError, Result};

/// A battery bank: one capacity, voltage, lifetime, thermal and loss model
/// advanced together each step.
///
/// # Step order
///
/// [`Battery::run`] always executes, in order:
/// 1. thermal update using the internal resistance of the previous step,
/// 2. capacity update with the requested current,
/// 3. voltage update from the new capacity state,
/// 4. lifetime update on a charge/discharge reversal (with the DOD before the
///    step) or on the very first step (with the current DOD),
/// 5. lifetime and thermal derating of capacity.
///
/// A replacement signalled by the lifetime model resets capacity, thermal and
/// loss state before step 5.
#[derive(Debug, Clone)]
pub struct Battery {
    dt_hour: f64,
    capacity: Capacity,
    voltage: Voltage,
    lifetime: Lifetime,
    thermal: Thermal,
    losses: Losses,
    first_step: bool,
}

impl Battery {
    /// Assembles a battery from its sub-models.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] if `dt_hour` is not positive.
    pub fn initialize(
        dt_hour: f64,
        capacity: impl Into<Capacity>,
        voltage: impl Into<Voltage>,
        lifetime: Lifetime,
        thermal: Thermal,
        losses: Losses,
    ) -> Result<Self> {
        if !(dt_hour > 0.0) {
            return Err(ModelError::invalid(
                "dt_hour",
                format!("must be > 0, got {dt_hour}"),
            ));
        }
        Ok(Self {
            dt_hour,
            capacity: capacity.into(),
            voltage: voltage.into(),
            lifetime,
            thermal,
            losses,
            first_step: true,
        })
    }

    /// Advances every sub-model one step at `current` amps (negative charges).
    ///
    /// The realized current may be smaller than requested; read it back from
    /// [`CapacityModel::current`].
    pub fn run(&mut self, current: f64) {
        self.thermal
            .update_temperature(current, self.voltage.resistance(), self.dt_hour);
        self.capacity.update_capacity(current, self.dt_hour);
        self.voltage.update_voltage(&self.capacity, self.dt_hour);

        if self.capacity.charge_changed() {
            self.run_lifetime(self.capacity.prev_dod());
        } else if self.first_step {
            self.run_lifetime(self.capacity.dod());
        }
        self.first_step = false;

        self.losses
            .run_losses(&self.lifetime, &self.thermal, &mut self.capacity);

        trace!(
            current = self.capacity.current(),
            soc = self.capacity.soc(),
            voltage = self.voltage.battery_voltage(),
            temperature_c = self.thermal.temperature_c(),
            "battery step"
        );
    }

    fn run_lifetime(&mut self, dod: f64) {
        self.lifetime.rainflow(dod);
        if self.lifetime.check_replaced() {
            self.capacity.replace_battery();
            self.thermal.replace_battery();
            self.losses.replace_battery();
            info!(
                replacements = self.lifetime.replacements(),
                "battery bank replaced"
            );
        }
    }

    /// Schedules a replacement, applied the next time the lifetime model runs.
    pub fn force_replacement(&mut self) {
        self.lifetime.force_replacement();
    }

    /// Clears the replacement counter (e.g. at the start of a reporting year).
    pub fn reset_replacements(&mut self) {
        self.lifetime.reset_replacements();
    }

    pub fn replacements(&self) -> usize {
        self.lifetime.replacements()
    }

    pub fn capacity_model(&self) -> &Capacity {
        &self.capacity
    }

    pub fn voltage_model(&self) -> &Voltage {
        &self.voltage
    }

    pub fn lifetime_model(&self) -> &Lifetime {
        &self.lifetime
    }

    pub fn thermal_model(&self) -> &Thermal {
        &self.thermal
    }

    /// Thermal model, e.g. to feed hourly ambient temperature.
    pub fn thermal_model_mut(&mut self) -> &mut Thermal {
        &mut self.thermal
    }

    pub fn losses_model(&self) -> &Losses {
        &self.losses
    }

    /// Charge required to fill the battery (Ah), never negative.
    pub fn battery_charge_needed(&self) -> f64 {
        (self.capacity.qmax() - self.capacity.q0()).max(0.0)
    }

    /// Present charge (Ah).
    pub fn battery_charge_total(&self) -> f64 {
        self.capacity.q0()
    }

    /// Effective maximum charge (Ah).
    pub fn battery_charge_maximum(&self) -> f64 {
        self.capacity.qmax()
    }

    pub fn cell_voltage(&self) -> f64 {
        self.voltage.cell_voltage()
    }

    pub fn battery_voltage(&self) -> f64 {
        self.voltage.battery_voltage()
    }

    pub fn dt_hour(&self) -> f64 {
        self.dt_hour
    }
}
