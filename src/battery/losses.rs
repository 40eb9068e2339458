use super::capacity::CapacityModel;
use super::lifetime::Lifetime;
use super::thermal::Thermal;

/// Pushes lifetime and thermal retention back onto the capacity model.
///
/// Lifetime derating only ever shrinks capacity and is applied when new
/// half-cycles have been counted. Thermal derating is reapplied every step so
/// capacity recovers when the battery warms up again.
#[derive(Debug, Clone, Default)]
pub struct Losses {
    cycles_seen: usize,
}

impl Losses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies both derating passes for the step just taken.
    pub fn run_losses(
        &mut self,
        lifetime: &Lifetime,
        thermal: &Thermal,
        capacity: &mut impl CapacityModel,
    ) {
        if lifetime.cycles_elapsed() > self.cycles_seen {
            self.cycles_seen = lifetime.cycles_elapsed();
            capacity.update_capacity_for_lifetime(lifetime.capacity_percent());
        }
        capacity.update_capacity_for_thermal(thermal.capacity_percent());
    }

    /// Half-cycles already pushed to the capacity model.
    pub fn cycles_seen(&self) -> usize {
        self.cycles_seen
    }

    pub fn replace_battery(&mut self) {
        self.cycles_seen = 0;
    }
}
