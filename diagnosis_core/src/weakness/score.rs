//! Weakness scores with lazy temporal decay.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Decaying counter of how strongly and recently a node was implicated in mistakes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaknessScore {
    /// Never negative.
    pub value: f64,
    pub last_touched: DateTime<Utc>,
}

impl WeaknessScore {
    pub fn new(value: f64, last_touched: DateTime<Utc>) -> Self {
        Self {
            value: sanitize(value),
            last_touched,
        }
    }

    /// A zero score touched at `now`.
    pub fn zero(now: DateTime<Utc>) -> Self {
        Self::new(0.0, now)
    }

    /// Multiplier applied to the stored value when read at `now`.
    ///
    /// `1.0` for the first `half_life` after the last touch, then halving once
    /// per further `half_life`: `0.5^((elapsed - half_life) / half_life)`.
    /// Continuous in `now`. A `last_touched` in the future counts as no elapsed time.
    pub fn decay_factor(&self, now: DateTime<Utc>, half_life: Duration) -> f64 {
        let elapsed = now - self.last_touched;
        if elapsed <= half_life || half_life <= Duration::zero() {
            return 1.0;
        }
        let overdue = (elapsed - half_life).num_seconds() as f64;
        0.5f64.powf(overdue / half_life.num_seconds().max(1) as f64)
    }

    /// The value as seen at `now`, without mutating the stored score.
    pub fn value_at(&self, now: DateTime<Utc>, half_life: Duration) -> f64 {
        sanitize(self.value * self.decay_factor(now, half_life))
    }

    /// Apply decay up to `now` and add `amount`, touching the score.
    pub fn bump(&self, amount: f64, now: DateTime<Utc>, half_life: Duration) -> Self {
        let base = self.value_at(now, half_life);
        Self::new(base + amount.max(0.0), now.max(self.last_touched))
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
