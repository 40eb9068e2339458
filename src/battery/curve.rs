//! Piecewise-linear lookup curves shared by the lifetime and thermal models.

use crate::error::{ModelError, Result};

/// Linear interpolation between `(x0, y0)` and `(x1, y1)` evaluated at `x`.
///
/// Returns `y0` when the two abscissae coincide.
pub fn interpolate(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Interpolates `y(x)` over points sorted by `x`.
///
/// Outside the covered range the first or last segment is extended. A single
/// point yields a constant. An empty slice yields `NaN`.
pub fn linterp(points: &[(f64, f64)], x: f64) -> f64 {
    match points {
        [] => f64::NAN,
        [(_, y)] => *y,
        _ => {
            let last = points.len() - 2;
            let i = points[..=last]
                .iter()
                .skip(1)
                .position(|&(px, _)| x < px)
                .unwrap_or(last);
            let (x0, y0) = points[i];
            let (x1, y1) = points[i + 1];
            interpolate(x0, y0, x1, y1, x)
        }
    }
}

/// A validated `y = f(x)` lookup curve, sorted by `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: Vec<(f64, f64)>,
}

impl Curve {
    /// Builds a curve from `(x, y)` rows, dropping non-finite rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyTable`] if no finite row remains.
    pub fn new(table: &'static str, rows: &[(f64, f64)]) -> Result<Self> {
        let mut points: Vec<(f64, f64)> = rows
            .iter()
            .copied()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        if points.is_empty() {
            return Err(ModelError::EmptyTable { table });
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { points })
    }

    /// Evaluates the curve at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        linterp(&self.points, x)
    }

    /// Returns the sorted points.
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}
