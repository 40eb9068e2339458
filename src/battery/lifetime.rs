//! Cycle-life degradation: rainflow half-cycle counting over the depth of
//! discharge history, with retention looked up from a DOD x cycles table.

use super::curve::{interpolate, linterp};
use crate::error::{ModelError, Result};

/// Retention threshold substituted for a configured 0 % (the lookup is
/// unreliable as capacity approaches zero).
const MIN_REPLACEMENT_CAPACITY: f64 = 2.0;

/// Cycle spacing of the synthetic fallback columns.
const SYNTHETIC_CYCLE_STEP: f64 = 500.0;

/// One row of the degradation table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegradationRow {
    /// Depth of discharge of the test (%).
    pub dod: f64,
    /// Cycles elapsed.
    pub cycles: f64,
    /// Capacity retention after `cycles` at `dod` (%).
    pub retention: f64,
}

/// Capacity retention as a function of depth of discharge and cycle count.
///
/// Rows are kept in input order; DOD values need not be unique.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradationTable {
    rows: Vec<DegradationRow>,
}

impl DegradationTable {
    /// Builds a table from `(dod %, cycles, retention %)` rows, dropping
    /// non-finite rows.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyTable`] if no usable row remains.
    pub fn new(rows: &[(f64, f64, f64)]) -> Result<Self> {
        let rows: Vec<DegradationRow> = rows
            .iter()
            .filter(|(d, n, c)| d.is_finite() && n.is_finite() && c.is_finite())
            .map(|&(dod, cycles, retention)| DegradationRow {
                dod,
                cycles,
                retention,
            })
            .collect();
        if rows.is_empty() {
            return Err(ModelError::EmptyTable {
                table: "degradation",
            });
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[DegradationRow] {
        &self.rows
    }

    /// Bilinear retention lookup at `dod` percent after `cycles` cycles.
    ///
    /// Interpolates retention against cycle count in the two DOD columns
    /// bracketing `dod`, then across DOD. A missing low column is replaced by a
    /// synthetic 0 % DOD column holding 100 %; a missing high column by a
    /// synthetic 100 % DOD column fading from 80 %. A table with a single DOD
    /// value is a plain cycles-vs-retention curve. A row at exactly `dod` is
    /// the low column of the bracket.
    pub fn retention(&self, dod: f64, cycles: f64) -> f64 {
        let first = self.rows[0].dod;
        if self.rows.iter().all(|r| r.dod == first) {
            let curve = self.column(first);
            return linterp(&curve, cycles);
        }

        let mut d_lo = 0.0;
        let mut d_hi = 100.0;
        for r in &self.rows {
            if r.dod <= dod && r.dod > d_lo {
                d_lo = r.dod;
            } else if r.dod > dod && r.dod < d_hi {
                d_hi = r.dod;
            }
        }

        let mut low = self.column(d_lo);
        let mut high = if d_hi == d_lo {
            Vec::new()
        } else {
            self.column(d_hi)
        };

        if low.is_empty() {
            low = (0..high.len().max(1))
                .map(|i| (i as f64 * SYNTHETIC_CYCLE_STEP, 100.0))
                .collect();
        }
        if high.is_empty() {
            high = (0..low.len())
                .map(|i| {
                    (
                        100.0 + i as f64 * SYNTHETIC_CYCLE_STEP,
                        80.0 - i as f64 * 10.0,
                    )
                })
                .collect();
        }

        let c_lo = linterp(&low, cycles).clamp(0.0, 100.0);
        let c_hi = linterp(&high, cycles).clamp(0.0, 100.0);
        interpolate(d_lo, c_lo, d_hi, c_hi, dod)
    }

    /// `(cycles, retention)` points of every row at exactly `dod`, by cycles.
    fn column(&self, dod: f64) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = self
            .rows
            .iter()
            .filter(|r| r.dod == dod)
            .map(|r| (r.cycles, r.retention))
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        points
    }
}

/// When the battery bank is swapped for a new one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplacementPolicy {
    /// Never replace on capacity; only [`Lifetime::force_replacement`] applies.
    None,
    /// Replace once retention falls at or below this percentage.
    AtCapacity(f64),
}

/// Rainflow cycle counter and retention tracker for one battery bank.
#[derive(Debug, Clone)]
pub struct Lifetime {
    table: DegradationTable,
    policy: ReplacementPolicy,
    peaks: Vec<f64>,
    cycles: usize,
    range: f64,
    average_range: f64,
    retention: f64,
    replacements: usize,
    replacement_scheduled: bool,
}

impl Lifetime {
    /// Creates a lifetime model at the table's zero-cycle retention.
    ///
    /// A `AtCapacity(0.0)` policy is promoted to 2 %.
    pub fn new(table: DegradationTable, policy: ReplacementPolicy) -> Self {
        let policy = match policy {
            ReplacementPolicy::AtCapacity(pct) if pct == 0.0 => {
                ReplacementPolicy::AtCapacity(MIN_REPLACEMENT_CAPACITY)
            }
            other => other,
        };
        let retention = table.retention(0.0, 0.0);
        Self {
            table,
            policy,
            peaks: Vec::new(),
            cycles: 0,
            range: 0.0,
            average_range: 0.0,
            retention,
            replacements: 0,
            replacement_scheduled: false,
        }
    }

    /// Feeds a depth-of-discharge sample (%) into the rainflow counter.
    ///
    /// Only turning points are buffered: a repeated sample is ignored and a
    /// sample continuing the last direction moves the last peak. With three or
    /// more peaks the latest range `X` is compared to the previous range `Y`;
    /// when `X >= Y`, `Y` is counted as a half-cycle, its two points are
    /// dropped and the comparison repeats.
    ///
    /// Non-turning samples fold into the last peak, so a flat or monotone
    /// sequence never closes a range and counts no cycles.
    pub fn rainflow(&mut self, dod: f64) {
        let extends_last = match self.peaks.as_slice() {
            [.., last] if *last == dod => return,
            [.., prev, last] => (last - prev) * (dod - last) > 0.0,
            _ => false,
        };
        match self.peaks.last_mut() {
            Some(last) if extends_last => *last = dod,
            _ => self.peaks.push(dod),
        }

        while self.peaks.len() >= 3 {
            let n = self.peaks.len();
            let y = (self.peaks[n - 2] - self.peaks[n - 3]).abs();
            let x = (self.peaks[n - 1] - self.peaks[n - 2]).abs();
            if x < y {
                break;
            }
            self.count_half_cycle(y);
            self.peaks.drain(n - 3..n - 1);
        }
    }

    fn count_half_cycle(&mut self, range: f64) {
        self.range = range;
        let n = self.cycles as f64;
        self.average_range = (self.average_range * n + range) / (n + 1.0);
        self.cycles += 1;

        let c = self.table.retention(self.average_range, self.cycles as f64);
        if c <= self.retention {
            self.retention = c;
        }
        self.retention = self.retention.max(0.0);
    }

    /// Replaces the bank if the policy threshold is reached or a replacement
    /// was forced. Returns `true` if a replacement took place.
    pub fn check_replaced(&mut self) -> bool {
        let worn_out = matches!(
            self.policy,
            ReplacementPolicy::AtCapacity(threshold) if self.retention <= threshold
        );
        if !(worn_out || self.replacement_scheduled) {
            return false;
        }
        self.replacements += 1;
        self.retention = self.table.retention(0.0, 0.0);
        self.cycles = 0;
        self.range = 0.0;
        self.average_range = 0.0;
        self.peaks.clear();
        self.replacement_scheduled = false;
        true
    }

    /// Schedules a replacement for the next [`Lifetime::check_replaced`].
    pub fn force_replacement(&mut self) {
        self.replacement_scheduled = true;
    }

    pub fn reset_replacements(&mut self) {
        self.replacements = 0;
    }

    pub fn replacements(&self) -> usize {
        self.replacements
    }

    /// Half-cycles counted since the last replacement.
    pub fn cycles_elapsed(&self) -> usize {
        self.cycles
    }

    /// Current capacity retention (%).
    pub fn capacity_percent(&self) -> f64 {
        self.retention
    }

    /// Range of the last counted half-cycle (% DOD).
    pub fn cycle_range(&self) -> f64 {
        self.range
    }

    /// Mean range of all counted half-cycles (% DOD).
    pub fn average_range(&self) -> f64 {
        self.average_range
    }

    /// Buffered turning points awaiting collapse.
    pub fn peaks(&self) -> &[f64] {
        &self.peaks
    }

    pub fn policy(&self) -> ReplacementPolicy {
        self.policy
    }

    pub fn table(&self) -> &DegradationTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DegradationTable {
        DegradationTable::new(&[
            (20.0, 0.0, 100.0),
            (20.0, 5000.0, 80.0),
            (80.0, 0.0, 100.0),
            (80.0, 1000.0, 80.0),
            (100.0, 0.0, 100.0),
            (100.0, 500.0, 80.0),
        ])
        .unwrap()
    }

    fn lifetime(policy: ReplacementPolicy) -> Lifetime {
        Lifetime::new(table(), policy)
    }

    #[test]
    fn empty_table_is_rejected() {
        assert_eq!(
            DegradationTable::new(&[]),
            Err(ModelError::EmptyTable {
                table: "degradation"
            })
        );
        assert!(DegradationTable::new(&[(f64::NAN, 0.0, 100.0)]).is_err());
    }

    #[test]
    fn bilinear_between_columns() {
        let t = table();
        // 50 % DOD at 500 cycles: 98 % at 20 % DOD, 90 % at 80 % DOD.
        let c = t.retention(50.0, 500.0);
        assert!((c - 94.0).abs() < 1e-9);
    }

    #[test]
    fn bilinear_on_exact_column() {
        let t = table();
        assert!((t.retention(80.0, 500.0) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn exact_dod_row_is_the_low_bracket() {
        let t = table();
        // Each exact column answers alone, including the top 100 % column.
        assert!((t.retention(20.0, 2500.0) - 90.0).abs() < 1e-9);
        assert!((t.retention(80.0, 500.0) - 90.0).abs() < 1e-9);
        assert!((t.retention(100.0, 250.0) - 90.0).abs() < 1e-9);
        // Just below a column the lower neighbour still contributes.
        assert!(t.retention(79.0, 500.0) > 90.0);
    }

    #[test]
    fn bilinear_uses_synthetic_zero_dod_column() {
        let t = table();
        // Between synthetic (0 % -> 100 %) and 20 % DOD at 5000 cycles (80 %).
        assert!((t.retention(10.0, 5000.0) - 90.0).abs() < 1e-9);
        assert!((t.retention(0.0, 0.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn bilinear_uses_synthetic_full_dod_column() {
        let t = DegradationTable::new(&[
            (20.0, 0.0, 100.0),
            (20.0, 1000.0, 90.0),
            (50.0, 0.0, 100.0),
            (50.0, 1000.0, 80.0),
        ])
        .unwrap();
        // Synthetic 100 % column: (100, 80), (600, 70).
        // At 600 cycles: 50 % column -> 88 %, synthetic -> 70 %.
        let c = t.retention(75.0, 600.0);
        assert!((c - 79.0).abs() < 1e-9);
    }

    #[test]
    fn single_dod_table_is_a_cycle_curve() {
        let t = DegradationTable::new(&[(50.0, 0.0, 100.0), (50.0, 1000.0, 70.0)]).unwrap();
        assert!((t.retention(90.0, 500.0) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn flat_sequence_counts_nothing() {
        let mut lt = lifetime(ReplacementPolicy::None);
        for _ in 0..100 {
            lt.rainflow(50.0);
        }
        assert_eq!(lt.cycles_elapsed(), 0);
        assert_eq!(lt.peaks(), &[50.0]);
    }

    #[test]
    fn monotone_sequence_counts_nothing() {
        let mut lt = lifetime(ReplacementPolicy::None);
        for d in [10.0, 20.0, 30.0, 40.0] {
            lt.rainflow(d);
        }
        assert_eq!(lt.cycles_elapsed(), 0);
        assert_eq!(lt.peaks(), &[10.0, 40.0]);
    }

    #[test]
    fn damped_sequence_waits_for_larger_range() {
        // Each new range is smaller than the one before it (70 < 80, 60 < 70,
        // 50 < 60), so nothing is counted yet.
        let mut lt = lifetime(ReplacementPolicy::None);
        for d in [10.0, 90.0, 20.0, 80.0, 30.0] {
            lt.rainflow(d);
        }
        assert_eq!(lt.cycles_elapsed(), 0);
        assert_eq!(lt.peaks(), &[10.0, 90.0, 20.0, 80.0, 30.0]);
        assert_eq!(lt.capacity_percent(), 100.0);

        // A swing to 100 closes 80-30 (50), which drops 80 and 30, then
        // 90-20 (70).
        lt.rainflow(100.0);
        assert_eq!(lt.cycles_elapsed(), 2);
        assert_eq!(lt.cycle_range(), 70.0);
        assert!((lt.average_range() - 60.0).abs() < 1e-12);
        assert_eq!(lt.peaks(), &[10.0, 100.0]);
    }

    #[test]
    fn larger_range_collapses_previous_half_cycle() {
        let mut lt = lifetime(ReplacementPolicy::None);
        for d in [10.0, 90.0, 20.0, 95.0] {
            lt.rainflow(d);
        }
        assert_eq!(lt.cycles_elapsed(), 1);
        assert_eq!(lt.cycle_range(), 70.0);
        assert_eq!(lt.peaks(), &[10.0, 95.0]);

        // 70 % DOD after one cycle: between the 20 % and 80 % columns.
        let c_lo = 100.0 - 20.0 / 5000.0;
        let c_hi = 100.0 - 20.0 / 1000.0;
        let expected = c_lo + (70.0 - 20.0) * (c_hi - c_lo) / 60.0;
        assert!((lt.capacity_percent() - expected).abs() < 1e-9);
    }

    #[test]
    fn retention_never_increases() {
        let mut lt = lifetime(ReplacementPolicy::None);
        let mut last = lt.capacity_percent();
        // Deep cycles first, then shallow ones that alone would retain more.
        for i in 0..200 {
            let dod = if i < 100 {
                if i % 2 == 0 { 0.0 } else { 100.0 }
            } else if i % 2 == 0 {
                40.0
            } else {
                60.0
            };
            lt.rainflow(dod);
            assert!(lt.capacity_percent() <= last);
            assert!(lt.capacity_percent() >= 0.0);
            last = lt.capacity_percent();
        }
        assert!(lt.cycles_elapsed() > 0);
    }

    #[test]
    fn replacement_at_capacity_resets_counters() {
        let mut lt = lifetime(ReplacementPolicy::AtCapacity(99.0));
        let mut replaced = false;
        for i in 0..200 {
            lt.rainflow(if i % 2 == 0 { 0.0 } else { 100.0 });
            if lt.check_replaced() {
                replaced = true;
                break;
            }
        }
        assert!(replaced);
        assert_eq!(lt.replacements(), 1);
        assert_eq!(lt.cycles_elapsed(), 0);
        assert!(lt.peaks().is_empty());
        assert_eq!(lt.capacity_percent(), lt.table().retention(0.0, 0.0));
    }

    #[test]
    fn forced_replacement_fires_once() {
        let mut lt = lifetime(ReplacementPolicy::None);
        assert!(!lt.check_replaced());
        lt.force_replacement();
        assert!(lt.check_replaced());
        assert!(!lt.check_replaced());
        assert_eq!(lt.replacements(), 1);
        lt.reset_replacements();
        assert_eq!(lt.replacements(), 0);
    }

    #[test]
    fn zero_threshold_is_promoted() {
        let lt = lifetime(ReplacementPolicy::AtCapacity(0.0));
        assert_eq!(lt.policy(), ReplacementPolicy::AtCapacity(2.0));
    }
}
