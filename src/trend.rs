//! Moving-average tracking of rewards.
//!
//! A fixed window of recent rewards drives the tuner: when the newer half of
//! the window scores better than the older half, commands grow longer.

use std::fmt;

/// Direction of recent rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trend {
    /// Recent rewards are higher.
    Improving,
    /// No meaningful change.
    Flat,
    /// Recent rewards are lower.
    Declining,
}

impl Trend {
    /// `+1`, `0`, or `-1`.
    #[must_use]
    pub const fn signum(self) -> i8 {
        match self {
            Self::Improving => 1,
            Self::Flat => 0,
            Self::Declining => -1,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Improving => "up",
            Self::Flat => "flat",
            Self::Declining => "down",
        })
    }
}

/// Circular buffer of recent rewards with a cached mean.
#[derive(Debug, Clone)]
pub struct TrendTracker {
    window: Vec<i64>,
    cursor: usize,
    count: usize,
    average: f64,
    epsilon: f64,
}

impl TrendTracker {
    /// Creates a tracker holding up to `window` rewards. A window below one is
    /// raised to one.
    #[must_use]
    pub fn new(window: usize, epsilon: f64) -> Self {
        Self {
            window: vec![0; window.max(1)],
            cursor: 0,
            count: 0,
            average: 0.0,
            epsilon,
        }
    }

    /// Number of valid entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Returns true before the first update.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean of the valid entries, zero when empty.
    #[must_use]
    pub const fn moving_average(&self) -> f64 {
        self.average
    }

    /// Records a reward, overwriting the oldest slot once full.
    pub fn update(&mut self, reward: i64) {
        self.window[self.cursor] = reward;
        self.cursor = (self.cursor + 1) % self.window.len();
        if self.count < self.window.len() {
            self.count += 1;
        }
        self.average = self.mean_of(0, self.count);
    }

    /// Compares the newest half of the window with the older half.
    #[must_use]
    pub fn trend(&self) -> Trend {
        if self.count < 2 {
            return Trend::Flat;
        }
        let recent_len = self.count / 2;
        let recent = self.mean_of(0, recent_len);
        let prior = self.mean_of(recent_len, self.count);
        let delta = recent - prior;

        if delta > self.epsilon {
            Trend::Improving
        } else if delta < -self.epsilon {
            Trend::Declining
        } else {
            Trend::Flat
        }
    }

    /// Mean over entries `[from, to)` counted backwards from the newest.
    #[allow(clippy::cast_precision_loss)]
    fn mean_of(&self, from: usize, to: usize) -> f64 {
        if to <= from {
            return 0.0;
        }
        let cap = self.window.len();
        let sum: i64 = (from..to)
            .map(|age| self.window[(self.cursor + cap - 1 - age) % cap])
            .sum();
        sum as f64 / (to - from) as f64
    }
}
