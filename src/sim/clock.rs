use crate::dispatch::schedule::HOURS_PER_YEAR;

/// Calendar position of one simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Step index from the start of the run.
    pub index: usize,
    /// Zero-based year.
    pub year: usize,
    /// Hour within the 8760-hour year.
    pub hour_of_year: usize,
    /// Sub-step within the hour.
    pub step: usize,
}

impl Tick {
    /// True for the first step of every year after the first.
    pub fn starts_year(&self) -> bool {
        self.index > 0 && self.hour_of_year == 0 && self.step == 0
    }

    /// Hours elapsed since the start of the run.
    pub fn hour_index(&self) -> usize {
        self.year * HOURS_PER_YEAR + self.hour_of_year
    }
}

/// A simulation clock that walks a fixed number of sub-hourly steps and
/// reports each one's place in the year.
///
/// # Examples
///
/// ```
/// use batt_sim::sim::clock::Clock;
///
/// let mut clock = Clock::new(2, 3);
/// let mut hours = Vec::new();
///
/// clock.run(|tick| hours.push((tick.hour_of_year, tick.step)));
/// assert_eq!(hours, vec![(0, 0), (0, 1), (1, 0)]);
/// ```
pub struct Clock {
    /// Current step of the simulation
    current: usize,
    /// Total steps to run in the simulation
    total: usize,
    steps_per_hour: usize,
}

impl Clock {
    /// Creates a new clock.
    ///
    /// # Arguments
    ///
    /// * `steps_per_hour` - Steps per hour (values below 1 are treated as 1)
    /// * `total` - The total number of steps the clock will run
    pub fn new(steps_per_hour: usize, total: usize) -> Self {
        Self {
            current: 0,
            total,
            steps_per_hour: steps_per_hour.max(1),
        }
    }

    /// Advances the clock by one step.
    ///
    /// # Returns
    ///
    /// * `Some(tick)` - The step before advancing
    /// * `None` - If the clock has reached its total steps
    pub fn tick(&mut self) -> Option<Tick> {
        if self.current >= self.total {
            return None;
        }
        let index = self.current;
        self.current += 1;
        let hours = index / self.steps_per_hour;
        Some(Tick {
            index,
            year: hours / HOURS_PER_YEAR,
            hour_of_year: hours % HOURS_PER_YEAR,
            step: index % self.steps_per_hour,
        })
    }

    /// Runs a function for each remaining step in the clock.
    pub fn run(&mut self, mut f: impl FnMut(Tick)) {
        while let Some(tick) = self.tick() {
            f(tick);
        }
    }
}
