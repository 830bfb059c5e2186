// Glucose sample domain models
use std::fmt;

/// One sensor glucose reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Sensor glucose value in mg/dL.
    pub sgv: f64,
    /// Direction label as reported upstream, if any.
    pub direction: Option<String>,
    /// Creation time in epoch milliseconds.
    pub created_ms: i64,
}

impl Sample {
    pub fn new(sgv: f64, direction: Option<String>, created_ms: i64) -> Self {
        Self {
            sgv,
            direction,
            created_ms,
        }
    }
}

/// Samples ordered newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    samples: Vec<Sample>,
}

impl SampleSeries {
    pub fn new(mut samples: Vec<Sample>) -> Self {
        // Stable sort keeps server order for equal timestamps
        samples.sort_by(|a, b| b.created_ms.cmp(&a.created_ms));
        Self { samples }
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn previous(&self) -> Option<&Sample> {
        self.samples.get(1)
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.sgv).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Trend direction labels used by Nightscout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    None,
    TripleUp,
    DoubleUp,
    SingleUp,
    FortyFiveUp,
    Flat,
    FortyFiveDown,
    SingleDown,
    DoubleDown,
    TripleDown,
    NotComputable,
    RateOutOfRange,
}

impl Direction {
    pub const ALL: [Direction; 12] = [
        Direction::None,
        Direction::TripleUp,
        Direction::DoubleUp,
        Direction::SingleUp,
        Direction::FortyFiveUp,
        Direction::Flat,
        Direction::FortyFiveDown,
        Direction::SingleDown,
        Direction::DoubleDown,
        Direction::TripleDown,
        Direction::NotComputable,
        Direction::RateOutOfRange,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Direction::None => "NONE",
            Direction::TripleUp => "TripleUp",
            Direction::DoubleUp => "DoubleUp",
            Direction::SingleUp => "SingleUp",
            Direction::FortyFiveUp => "FortyFiveUp",
            Direction::Flat => "Flat",
            Direction::FortyFiveDown => "FortyFiveDown",
            Direction::SingleDown => "SingleDown",
            Direction::DoubleDown => "DoubleDown",
            Direction::TripleDown => "TripleDown",
            Direction::NotComputable => "NOT COMPUTABLE",
            Direction::RateOutOfRange => "RATE OUT OF RANGE",
        }
    }

    pub fn from_label(label: &str) -> Option<Direction> {
        Self::ALL.iter().copied().find(|d| d.label() == label)
    }

    pub fn glyph(self) -> char {
        match self {
            Direction::None => '⇼',
            Direction::TripleUp => '⤊',
            Direction::DoubleUp => '⇈',
            Direction::SingleUp => '↑',
            Direction::FortyFiveUp => '↗',
            Direction::Flat => '→',
            Direction::FortyFiveDown => '↘',
            Direction::SingleDown => '↓',
            Direction::DoubleDown => '⇊',
            Direction::TripleDown => '⤋',
            Direction::NotComputable => '-',
            Direction::RateOutOfRange => '⇕',
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Glyph for an upstream label, `-` when the label is absent or unknown.
pub fn direction_to_glyph(label: Option<&str>) -> char {
    label
        .and_then(Direction::from_label)
        .map(Direction::glyph)
        .unwrap_or('-')
}

/// Numeric character reference for safe HTML injection.
pub fn char_to_entity(c: char) -> String {
    format!("&#{};", c as u32)
}
