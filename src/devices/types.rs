//! Common trait and helpers for the input generators.

use rand::{Rng, rngs::StdRng};

/// A generator producing one value per timestep.
///
/// Load and PV report magnitudes (kW, never negative); the sign convention
/// of the dispatch layer is applied by the caller.
pub trait Device {
    /// Returns the power at the specified time step (kW).
    ///
    /// # Arguments
    ///
    /// * `timestep` - Current simulation time step
    fn power_kw(&mut self, timestep: usize) -> f64;

    /// Returns a human-readable type name for the device.
    fn device_type(&self) -> &'static str;

    /// Energy per step for `steps` consecutive steps (kWh).
    ///
    /// # Arguments
    ///
    /// * `steps` - Number of steps to generate
    /// * `dt_hour` - Step length in hours
    fn energy_series(&mut self, steps: usize, dt_hour: f64) -> Vec<f64> {
        (0..steps).map(|t| self.power_kw(t) * dt_hour).collect()
    }
}

/// Utility function to generate Gaussian noise using Box-Muller transform.
///
/// # Arguments
///
/// * `rng` - Random number generator
/// * `std_dev` - Standard deviation of the noise
///
/// # Returns
///
/// Random value from a Gaussian distribution with mean 0 and specified standard deviation
pub fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f64 = rng.random::<f64>().clamp(1e-9, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Half-sine daylight shape in `[0, 1]`, zero outside sunrise..sunset.
///
/// # Arguments
///
/// * `t` - Timestep index (wraps per day)
/// * `steps_per_day` - Steps in one day
/// * `sunrise_idx` - First daylight step (inclusive)
/// * `sunset_idx` - Last daylight step (exclusive)
pub fn daylight_frac(t: usize, steps_per_day: usize, sunrise_idx: usize, sunset_idx: usize) -> f64 {
    let tod = t % steps_per_day.max(1);
    if tod < sunrise_idx || tod >= sunset_idx {
        return 0.0;
    }
    let span = (sunset_idx - sunrise_idx) as f64;
    let x = (tod - sunrise_idx) as f64 + 0.5;
    (std::f64::consts::PI * x / span).sin().max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn noise_is_zero_without_spread() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
        assert_eq!(gaussian_noise(&mut rng, -1.0), 0.0);
    }

    #[test]
    fn noise_has_roughly_requested_spread() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| gaussian_noise(&mut rng, 2.0)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.1);
        assert!((var.sqrt() - 2.0).abs() < 0.1);
    }

    #[test]
    fn daylight_is_symmetric_and_bounded() {
        assert_eq!(daylight_frac(5, 24, 6, 18), 0.0);
        assert_eq!(daylight_frac(18, 24, 6, 18), 0.0);
        assert!(daylight_frac(11, 24, 6, 18) > 0.95);
        assert!((daylight_frac(8, 24, 6, 18) - daylight_frac(15, 24, 6, 18)).abs() < 1e-12);
        // Next day repeats.
        assert_eq!(daylight_frac(12, 24, 6, 18), daylight_frac(36, 24, 6, 18));
    }
}
