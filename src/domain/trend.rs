// Local trend calculation from a short glucose history
use super::sample::Direction;

/// Number of samples needed to compute a trend (five intervals).
pub const TREND_WINDOW: usize = 6;

/// Minutes between two consecutive CGM samples.
pub const SAMPLE_INTERVAL_MINUTES: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Magnitude {
    Double,
    Single,
    FortyFive,
}

impl Magnitude {
    fn direction(self, rising: bool) -> Direction {
        match (self, rising) {
            (Magnitude::Double, true) => Direction::DoubleUp,
            (Magnitude::Double, false) => Direction::DoubleDown,
            (Magnitude::Single, true) => Direction::SingleUp,
            (Magnitude::Single, false) => Direction::SingleDown,
            (Magnitude::FortyFive, true) => Direction::FortyFiveUp,
            (Magnitude::FortyFive, false) => Direction::FortyFiveDown,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tier {
    magnitude: Magnitude,
    /// mg/dL per minute over the last interval.
    rate: f64,
    /// mg/dL over the whole window.
    total: f64,
}

/// Evaluated in order, first match wins.
const TIERS: [Tier; 3] = [
    Tier {
        magnitude: Magnitude::Double,
        rate: 4.0,
        total: 90.0,
    },
    Tier {
        magnitude: Magnitude::Single,
        rate: 2.0,
        total: 60.0,
    },
    Tier {
        magnitude: Magnitude::FortyFive,
        rate: 1.0,
        total: 30.0,
    },
];

/// Classify the trend of mg/dL values ordered newest first.
///
/// Within a tier the last-interval rate is checked before the window total,
/// and the sign of whichever quantity crossed the threshold picks Up or Down.
pub fn classify_trend(values: &[f64]) -> Direction {
    if values.len() < TREND_WINDOW || values.iter().any(|v| !v.is_finite()) {
        return Direction::NotComputable;
    }

    let diffs: Vec<f64> = values[..TREND_WINDOW]
        .windows(2)
        .map(|pair| pair[0] - pair[1])
        .collect();

    let rate = diffs[0] / SAMPLE_INTERVAL_MINUTES;
    let total: f64 = diffs.iter().sum();

    for tier in TIERS {
        if rate.abs() > tier.rate {
            return tier.magnitude.direction(rate > 0.0);
        }
        if total.abs() > tier.total {
            return tier.magnitude.direction(total > 0.0);
        }
    }

    Direction::Flat
}
