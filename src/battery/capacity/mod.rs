//! Charge-capacity models: shared state, the model contract, and variants.

/// Kinetic battery model (two-tank available/bound charge).
pub mod kibam;
/// Linear lithium-ion capacity model.
pub mod lithium_ion;

pub use kibam::KibamCapacity;
pub use lithium_ion::LithiumIonCapacity;

use super::ChargeMode;

/// State common to every capacity model.
///
/// Charges are in amp-hours, currents in amps (positive = discharging,
/// negative = charging), SOC and DOD in percent.
///
/// Invariant after every mutation: `0 <= q0 <= qmax <= qmax_lifetime <= qmax0`
/// and `dod == 100 - soc`.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityState {
    /// Present charge (Ah).
    pub q0: f64,
    /// Effective maximum charge after lifetime and thermal derating (Ah).
    pub qmax: f64,
    /// Maximum charge after lifetime degradation only (Ah).
    pub qmax_lifetime: f64,
    /// Original maximum charge (Ah).
    pub qmax0: f64,
    /// Current drawn over the last step (A).
    pub current: f64,
    /// Charge shed by derating, expressed as a current over the last step (A).
    pub loss_current: f64,
    /// Length of the last step (h).
    pub dt_hour: f64,
    /// State of charge (%).
    pub soc: f64,
    /// Upper SOC bound (%).
    pub soc_max: f64,
    /// Depth of discharge (%).
    pub dod: f64,
    /// Depth of discharge before the last update (%).
    pub dod_prev: f64,
    /// Thermal retention last applied (%).
    pub thermal_percent: f64,
    prev_charge: ChargeMode,
    charge_changed: bool,
}

impl CapacityState {
    /// Creates a state charged to `soc_max` percent of `qmax`.
    pub fn new(qmax: f64, soc_max: f64) -> Self {
        let mut state = Self {
            q0: 0.01 * soc_max * qmax,
            qmax,
            qmax_lifetime: qmax,
            qmax0: qmax,
            current: 0.0,
            loss_current: 0.0,
            dt_hour: 0.0,
            soc: soc_max,
            soc_max,
            dod: 0.0,
            dod_prev: 0.0,
            thermal_percent: 100.0,
            prev_charge: ChargeMode::Discharge,
            charge_changed: false,
        };
        state.update_soc();
        state
    }

    /// Starts a new step: remembers DOD, clears losses and records `current`.
    pub(crate) fn begin_step(&mut self, current: f64, dt_hour: f64) {
        self.dod_prev = self.dod;
        self.loss_current = 0.0;
        self.current = current;
        self.dt_hour = dt_hour;
    }

    /// Recomputes SOC and DOD from `q0 / qmax`, clamped to `[0, soc_max]`.
    pub fn update_soc(&mut self) {
        self.soc = if self.qmax > 0.0 {
            100.0 * self.q0 / self.qmax
        } else {
            0.0
        };
        self.soc = self.soc.clamp(0.0, self.soc_max);
        self.dod = 100.0 - self.soc;
    }

    /// Latches a charge/discharge reversal based on the sign of `current`.
    ///
    /// Idle steps never flag a change nor clear the latched previous mode.
    pub fn check_charge_change(&mut self) {
        let charging = ChargeMode::from_current(self.current);
        self.charge_changed = false;
        if charging != self.prev_charge
            && charging != ChargeMode::Idle
            && self.prev_charge != ChargeMode::Idle
        {
            self.charge_changed = true;
            self.prev_charge = charging;
        }
    }

    /// Whether the last update reversed the charge direction.
    pub fn charge_changed(&self) -> bool {
        self.charge_changed
    }

    /// Records charge shed from `q_before` to the current `q0` as loss current.
    pub(crate) fn record_shed(&mut self, q_before: f64) {
        if self.dt_hour > 0.0 {
            self.loss_current += (q_before - self.q0) / self.dt_hour;
        }
    }

    /// Applies a lifetime retention percentage to the ratchet cap.
    ///
    /// Returns the scale factor `q0` must be multiplied by (1.0 if no change).
    pub(crate) fn apply_lifetime_cap(&mut self, capacity_percent: f64) -> f64 {
        let capped = self.qmax0 * capacity_percent * 0.01;
        if capped <= self.qmax_lifetime {
            self.qmax_lifetime = capped.max(0.0);
        }
        self.derate()
    }

    /// Applies a thermal retention percentage to the lifetime cap.
    ///
    /// Returns the scale factor `q0` must be multiplied by (1.0 if no change).
    pub(crate) fn apply_thermal_cap(&mut self, capacity_percent: f64) -> f64 {
        self.thermal_percent = capacity_percent.clamp(0.0, 100.0);
        self.derate()
    }

    fn derate(&mut self) -> f64 {
        self.qmax = self.qmax_lifetime * self.thermal_percent * 0.01;
        if self.q0 > self.qmax && self.q0 > 0.0 {
            self.qmax / self.q0
        } else {
            1.0
        }
    }

    /// Restores the undegraded capacity, charged to `soc_max`.
    pub(crate) fn reset(&mut self) {
        self.qmax = self.qmax0;
        self.qmax_lifetime = self.qmax0;
        self.thermal_percent = 100.0;
        self.q0 = 0.01 * self.soc_max * self.qmax0;
        self.update_soc();
    }
}

/// Contract every capacity model offers to the battery orchestrator.
pub trait CapacityModel {
    /// Advances the charge state by one step of `dt_hour` at `current` amps.
    ///
    /// The requested current may be reduced to what the model can deliver or
    /// absorb; the realized value is available from [`CapacityModel::current`].
    fn update_capacity(&mut self, current: f64, dt_hour: f64);

    /// Derates the usable capacity by a temperature-driven retention (%).
    fn update_capacity_for_thermal(&mut self, capacity_percent: f64);

    /// Ratchets the maximum capacity down to a lifetime retention (%).
    fn update_capacity_for_lifetime(&mut self, capacity_percent: f64);

    /// Resets to a fresh, fully charged battery.
    fn replace_battery(&mut self);

    /// Charge that can be drawn immediately (Ah).
    fn available_charge(&self) -> f64;

    /// Shared state.
    fn state(&self) -> &CapacityState;

    fn q0(&self) -> f64 {
        self.state().q0
    }

    fn qmax(&self) -> f64 {
        self.state().qmax
    }

    fn qmax0(&self) -> f64 {
        self.state().qmax0
    }

    fn soc(&self) -> f64 {
        self.state().soc
    }

    fn dod(&self) -> f64 {
        self.state().dod
    }

    fn prev_dod(&self) -> f64 {
        self.state().dod_prev
    }

    fn current(&self) -> f64 {
        self.state().current
    }

    fn loss_current(&self) -> f64 {
        self.state().loss_current
    }

    fn charge_changed(&self) -> bool {
        self.state().charge_changed()
    }
}

/// The capacity model selected for a battery.
#[derive(Debug, Clone)]
pub enum Capacity {
    Kibam(KibamCapacity),
    LithiumIon(LithiumIonCapacity),
}

impl CapacityModel for Capacity {
    fn update_capacity(&mut self, current: f64, dt_hour: f64) {
        match self {
            Self::Kibam(c) => c.update_capacity(current, dt_hour),
            Self::LithiumIon(c) => c.update_capacity(current, dt_hour),
        }
    }

    fn update_capacity_for_thermal(&mut self, capacity_percent: f64) {
        match self {
            Self::Kibam(c) => c.update_capacity_for_thermal(capacity_percent),
            Self::LithiumIon(c) => c.update_capacity_for_thermal(capacity_percent),
        }
    }

    fn update_capacity_for_lifetime(&mut self, capacity_percent: f64) {
        match self {
            Self::Kibam(c) => c.update_capacity_for_lifetime(capacity_percent),
            Self::LithiumIon(c) => c.update_capacity_for_lifetime(capacity_percent),
        }
    }

    fn replace_battery(&mut self) {
        match self {
            Self::Kibam(c) => c.replace_battery(),
            Self::LithiumIon(c) => c.replace_battery(),
        }
    }

    fn available_charge(&self) -> f64 {
        match self {
            Self::Kibam(c) => c.available_charge(),
            Self::LithiumIon(c) => c.available_charge(),
        }
    }

    fn state(&self) -> &CapacityState {
        match self {
            Self::Kibam(c) => c.state(),
            Self::LithiumIon(c) => c.state(),
        }
    }
}

impl From<KibamCapacity> for Capacity {
    fn from(c: KibamCapacity) -> Self {
        Self::Kibam(c)
    }
}

impl From<LithiumIonCapacity> for Capacity {
    fn from(c: LithiumIonCapacity) -> Self {
        Self::LithiumIon(c)
    }
}
