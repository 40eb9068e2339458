use crate::error::{ModelError, Result};

pub const MONTHS: usize = 12;
pub const HOURS_PER_DAY: usize = 24;
pub const HOURS_PER_YEAR: usize = 8760;

const DAYS_IN_MONTH: [usize; MONTHS] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Calendar month (1-12) and hour of day (1-24) of an hour of the year.
///
/// Uses a 365-day year; hours past the end of the year wrap around.
///
/// # Examples
///
/// ```
/// use batt_sim::dispatch::month_hour;
///
/// assert_eq!(month_hour(0), (1, 1));
/// assert_eq!(month_hour(31 * 24), (2, 1));
/// assert_eq!(month_hour(8759), (12, 24));
/// ```
pub fn month_hour(hour_of_year: usize) -> (usize, usize) {
    let hour_of_year = hour_of_year % HOURS_PER_YEAR;
    let day = hour_of_year / HOURS_PER_DAY;
    let mut first_day = 0;
    let mut month = MONTHS;
    for (m, days) in DAYS_IN_MONTH.iter().enumerate() {
        if day < first_day + days {
            month = m + 1;
            break;
        }
        first_day += days;
    }
    (month, hour_of_year % HOURS_PER_DAY + 1)
}

/// Behaviour the manual dispatcher follows while a profile is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchProfile {
    /// Battery may charge from PV surplus.
    pub charge: bool,
    /// Battery may discharge to serve load.
    pub discharge: bool,
    /// Battery may charge from the grid.
    pub grid_charge: bool,
    /// Share of the discharge window that may be used (%).
    pub percent_discharge: f64,
    /// Share of the charge window that may be drawn from the grid (%).
    pub percent_grid_charge: f64,
}

impl DispatchProfile {
    /// Charge from PV only; never discharge.
    pub fn pv_charge_only() -> Self {
        Self {
            charge: true,
            discharge: false,
            grid_charge: false,
            percent_discharge: 0.0,
            percent_grid_charge: 0.0,
        }
    }

    /// Charge from PV and discharge up to `percent_discharge`.
    pub fn discharge(percent_discharge: f64) -> Self {
        Self {
            charge: true,
            discharge: true,
            grid_charge: false,
            percent_discharge,
            percent_grid_charge: 100.0,
        }
    }

    /// Charge from PV and the grid, up to `percent_grid_charge`.
    pub fn grid_charge(percent_grid_charge: f64) -> Self {
        Self {
            charge: true,
            discharge: false,
            grid_charge: true,
            percent_discharge: 0.0,
            percent_grid_charge,
        }
    }

    /// Neither charges nor discharges.
    pub fn idle() -> Self {
        Self {
            charge: false,
            discharge: false,
            grid_charge: false,
            percent_discharge: 0.0,
            percent_grid_charge: 0.0,
        }
    }

    /// Checks that both percentages lie in `[0, 100]`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Schedule`] otherwise.
    pub fn validate(&self) -> Result<()> {
        for (name, pct) in [
            ("percent_discharge", self.percent_discharge),
            ("percent_grid_charge", self.percent_grid_charge),
        ] {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ModelError::Schedule(format!(
                    "{name} must be in [0, 100], got {pct}"
                )));
            }
        }
        Ok(())
    }
}

/// Month x time-of-day table of 1-based profile numbers.
///
/// Each month row has `24 * columns_per_hour` columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    columns_per_hour: usize,
    cells: Vec<usize>,
}

impl Schedule {
    /// Builds a schedule from twelve month rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Schedule`] for a wrong row count or width, or a
    /// profile number of 0.
    pub fn new(columns_per_hour: usize, rows: &[Vec<usize>]) -> Result<Self> {
        if columns_per_hour == 0 {
            return Err(ModelError::Schedule("columns_per_hour must be > 0".into()));
        }
        if rows.len() != MONTHS {
            return Err(ModelError::Schedule(format!(
                "expected {MONTHS} month rows, got {}",
                rows.len()
            )));
        }
        let width = HOURS_PER_DAY * columns_per_hour;
        let mut cells = Vec::with_capacity(MONTHS * width);
        for (m, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(ModelError::Schedule(format!(
                    "month {} has {} columns, expected {width}",
                    m + 1,
                    row.len()
                )));
            }
            if row.contains(&0) {
                return Err(ModelError::Schedule(format!(
                    "month {} uses profile 0; profiles are numbered from 1",
                    m + 1
                )));
            }
            cells.extend_from_slice(row);
        }
        Ok(Self {
            columns_per_hour,
            cells,
        })
    }

    /// A schedule using `profile` everywhere.
    pub fn uniform(columns_per_hour: usize, profile: usize) -> Self {
        let columns_per_hour = columns_per_hour.max(1);
        Self {
            columns_per_hour,
            cells: vec![profile.max(1); MONTHS * HOURS_PER_DAY * columns_per_hour],
        }
    }

    /// Hourly schedule from one 24-entry day shared by every month.
    ///
    /// # Errors
    ///
    /// Same as [`Schedule::new`].
    pub fn from_daily(day: &[usize]) -> Result<Self> {
        let rows = vec![day.to_vec(); MONTHS];
        Self::new(1, &rows)
    }

    pub fn columns_per_hour(&self) -> usize {
        self.columns_per_hour
    }

    pub fn width(&self) -> usize {
        HOURS_PER_DAY * self.columns_per_hour
    }

    /// Profile at 0-based `month` and `column`, if in range.
    pub fn get(&self, month: usize, column: usize) -> Option<usize> {
        if month >= MONTHS || column >= self.width() {
            return None;
        }
        self.cells.get(month * self.width() + column).copied()
    }

    /// Sets the profile at 0-based `month` and `column`; out-of-range cells
    /// are ignored.
    pub fn set(&mut self, month: usize, column: usize, profile: usize) {
        if month < MONTHS && column < self.width() {
            let width = self.width();
            self.cells[month * width + column] = profile;
        }
    }

    /// Sets every cell to `profile`.
    pub fn fill(&mut self, profile: usize) {
        self.cells.fill(profile);
    }

    /// Column of sub-step `step` within `hour` (1-24).
    pub fn column(&self, hour: usize, step: usize) -> usize {
        (hour.saturating_sub(1)) * self.columns_per_hour
            + if self.columns_per_hour > 1 { step } else { 0 }
    }

    /// Largest profile number referenced.
    pub fn max_profile(&self) -> usize {
        self.cells.iter().copied().max().unwrap_or(0)
    }
}
