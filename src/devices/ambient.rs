/// Daily sinusoidal ambient temperature, coolest at 04:00 and warmest at
/// 16:00.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientTemperature {
    /// Daily mean (°C).
    pub mean_c: f64,
    /// Half the peak-to-trough swing (°C).
    pub swing_c: f64,
    steps_per_day: usize,
}

impl AmbientTemperature {
    pub fn new(mean_c: f64, swing_c: f64, steps_per_day: usize) -> Self {
        Self {
            mean_c,
            swing_c: swing_c.abs(),
            steps_per_day: steps_per_day.max(1),
        }
    }

    /// Temperature at `timestep` (°C).
    pub fn temperature_c(&self, timestep: usize) -> f64 {
        let day_pos = (timestep % self.steps_per_day) as f64 / self.steps_per_day as f64;
        let angle = 2.0 * std::f64::consts::PI * (day_pos - 16.0 / 24.0);
        self.mean_c + self.swing_c * angle.cos()
    }

    /// Temperatures for `steps` consecutive steps (°C).
    pub fn series(&self, steps: usize) -> Vec<f64> {
        (0..steps).map(|t| self.temperature_c(t)).collect()
    }
}
