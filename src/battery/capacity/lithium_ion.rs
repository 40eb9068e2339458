use super::{CapacityModel, CapacityState};
use crate::error::{ModelError, Result};

/// Linear lithium-ion capacity model: `q0 -= I * dt`, bounded by `[0, qmax]`.
#[derive(Debug, Clone)]
pub struct LithiumIonCapacity {
    state: CapacityState,
}

impl LithiumIonCapacity {
    /// Creates a model with `qmax` amp-hours, charged to `soc_max` percent.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParameter`] if `qmax` is not positive or
    /// `soc_max` is outside `(0, 100]`.
    pub fn new(qmax: f64, soc_max: f64) -> Result<Self> {
        if !(qmax > 0.0) {
            return Err(ModelError::invalid("qmax", format!("must be > 0, got {qmax}")));
        }
        if !(soc_max > 0.0 && soc_max <= 100.0) {
            return Err(ModelError::invalid(
                "soc_max",
                format!("must be in (0, 100], got {soc_max}"),
            ));
        }
        Ok(Self {
            state: CapacityState::new(qmax, soc_max),
        })
    }

    fn clamp_to_qmax(&mut self, p: f64) {
        if p < 1.0 {
            let q_before = self.state.q0;
            self.state.q0 = self.state.qmax;
            self.state.record_shed(q_before);
        }
        self.state.update_soc();
    }
}

impl CapacityModel for LithiumIonCapacity {
    fn update_capacity(&mut self, current: f64, dt_hour: f64) {
        self.state.begin_step(current, dt_hour);
        let q0_old = self.state.q0;

        self.state.q0 -= current * dt_hour;

        // Overcharged: only the current that exactly fills the battery flows.
        if self.state.q0 > self.state.qmax {
            self.state.current = -(self.state.qmax - q0_old) / dt_hour;
            self.state.q0 = self.state.qmax;
        }

        // Undercharged: only the current that exactly empties it flows.
        if self.state.q0 < 0.0 {
            self.state.current = q0_old / dt_hour;
            self.state.q0 = 0.0;
        }

        self.state.update_soc();
        self.state.check_charge_change();
    }

    fn update_capacity_for_thermal(&mut self, capacity_percent: f64) {
        let p = self.state.apply_thermal_cap(capacity_percent);
        self.clamp_to_qmax(p);
    }

    fn update_capacity_for_lifetime(&mut self, capacity_percent: f64) {
        let p = self.state.apply_lifetime_cap(capacity_percent);
        self.clamp_to_qmax(p);
    }

    fn replace_battery(&mut self) {
        self.state.reset();
    }

    fn available_charge(&self) -> f64 {
        self.state.q0
    }

    fn state(&self) -> &CapacityState {
        &self.state
    }
}
