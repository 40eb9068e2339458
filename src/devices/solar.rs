use rand::{SeedableRng, rngs::StdRng};

use super::types::{Device, daylight_frac, gaussian_noise};

const DAYS_PER_YEAR: f64 = 365.0;
/// Day of year with the longest daylight (northern hemisphere).
const SUMMER_SOLSTICE_DAY: f64 = 172.0;

/// A solar PV generator that models power generation based on daylight hours.
///
/// `SolarPv` creates a half-sine generation profile between sunrise and
/// sunset with configurable peak output, an optional seasonal swing in peak
/// output and random noise for weather variation.
#[derive(Debug, Clone)]
pub struct SolarPv {
    /// Maximum power output in kilowatts under ideal conditions.
    pub kw_peak: f64,

    /// Number of time steps per simulated day.
    steps_per_day: usize,

    /// Time step index when sunrise occurs (inclusive).
    pub sunrise_idx: usize,

    /// Time step index when sunset occurs (exclusive).
    pub sunset_idx: usize,

    /// Fractional change of peak output between solstices (0 = none).
    pub seasonal_swing: f64,

    /// Standard deviation of the Gaussian noise as a fraction of output.
    pub noise_std: f64,

    /// Random number generator for noise generation.
    rng: StdRng,
}

impl SolarPv {
    /// Creates a new solar PV generator with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `kw_peak` - Maximum power output in kilowatts under ideal conditions
    /// * `sunrise_idx` - Time step index when sunrise occurs (inclusive)
    /// * `sunset_idx` - Time step index when sunset occurs (exclusive)
    /// * `seasonal_swing` - Peak output varies by `1 ± seasonal_swing` over the year
    /// * `noise_std` - Standard deviation of noise (e.g., 0.05 for +/-5% variation)
    /// * `steps_per_day` - Timesteps per simulated day
    /// * `seed` - Random seed for reproducible noise generation
    ///
    /// # Panics
    ///
    /// Panics if `sunrise_idx >= sunset_idx` or `sunset_idx > steps_per_day`.
    pub fn new(
        kw_peak: f64,
        sunrise_idx: usize,
        sunset_idx: usize,
        seasonal_swing: f64,
        noise_std: f64,
        steps_per_day: usize,
        seed: u64,
    ) -> Self {
        assert!(sunrise_idx < sunset_idx && sunset_idx <= steps_per_day);
        Self {
            kw_peak: kw_peak.max(0.0),
            steps_per_day,
            sunrise_idx,
            sunset_idx,
            seasonal_swing: seasonal_swing.clamp(0.0, 1.0),
            noise_std: noise_std.max(0.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn seasonal_factor(&self, t: usize) -> f64 {
        let day = (t / self.steps_per_day) as f64 % DAYS_PER_YEAR;
        let angle = 2.0 * std::f64::consts::PI * (day - SUMMER_SOLSTICE_DAY) / DAYS_PER_YEAR;
        1.0 + self.seasonal_swing * angle.cos()
    }
}

impl Device for SolarPv {
    /// Generation at a timestep (kW, positive); 0.0 at night.
    fn power_kw(&mut self, timestep: usize) -> f64 {
        let frac = daylight_frac(
            timestep,
            self.steps_per_day,
            self.sunrise_idx,
            self.sunset_idx,
        );
        if frac <= 0.0 {
            return 0.0;
        }

        let noise_mult = 1.0 + gaussian_noise(&mut self.rng, self.noise_std);
        let kw = self.kw_peak * self.seasonal_factor(timestep) * frac * noise_mult;
        kw.max(0.0)
    }

    fn device_type(&self) -> &'static str {
        "SolarPV"
    }
}
