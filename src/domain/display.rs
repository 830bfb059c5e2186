// Display-ready values derived from a sample series
use super::sample::{char_to_entity, direction_to_glyph, Direction, SampleSeries};
use super::trend::classify_trend;

/// mg/dL per mmol/L.
pub const MMOL_TO_MGDL: f64 = 18.0;

const MILLIS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayOptions {
    pub units_in_mmol: bool,
    pub calc_trend: bool,
    /// Readings older than this many minutes are shown as stale.
    pub age_limit: i64,
}

/// Glucose thresholds, expressed in the display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
    pub target_top: f64,
    pub target_bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlucoseLevel {
    Critical,
    Warning,
    Ok,
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayResult {
    pub last: String,
    /// Absent when fewer than two samples are available.
    pub delta: Option<String>,
    pub trend: Option<Direction>,
    /// Trend glyph as a numeric character reference.
    pub direction: String,
    /// Minutes since the latest reading.
    pub age: i64,
    pub level: GlucoseLevel,
}

// Half-up rounding to an integer, -0.0 normalised away
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor() + 0.0
}

fn mgdl_to_mmol(mgdl: f64) -> f64 {
    round_half_up(mgdl / MMOL_TO_MGDL * 10.0) / 10.0
}

/// Convert mg/dL to a one-decimal mmol/L string.
pub fn convert_units(mgdl: f64) -> String {
    format!("{:.1}", mgdl_to_mmol(mgdl))
}

fn format_mgdl(mgdl: f64) -> String {
    format!("{}", mgdl + 0.0)
}

/// Whole minutes elapsed between a sample and `now_ms`.
pub fn compute_age(created_ms: i64, now_ms: i64) -> i64 {
    (now_ms - created_ms).div_euclid(MILLIS_PER_MINUTE)
}

/// Signed delta between the two newest readings.
///
/// The mmol/L delta converts the rounded mg/dL delta rather than
/// subtracting converted values.
///
/// The sign follows the unrounded difference, so a small drop renders as
/// `-0` or `-0.0` instead of `+0`.
pub fn compute_delta(latest: f64, previous: f64, units_in_mmol: bool) -> String {
    let diff = latest - previous;
    let mgdl = round_half_up(diff.abs() * 100.0) / 100.0;

    let magnitude = if units_in_mmol {
        format!("{:.1}", mgdl_to_mmol(mgdl))
    } else {
        format_mgdl(mgdl)
    };

    if diff < 0.0 {
        format!("-{}", magnitude)
    } else {
        format!("+{}", magnitude)
    }
}

pub fn classify_level(value: f64, age: i64, options: &DisplayOptions, thresholds: &Thresholds) -> GlucoseLevel {
    if age > options.age_limit {
        GlucoseLevel::Stale
    } else if value >= thresholds.high || value <= thresholds.low {
        GlucoseLevel::Critical
    } else if value >= thresholds.target_top || value <= thresholds.target_bottom {
        GlucoseLevel::Warning
    } else {
        GlucoseLevel::Ok
    }
}

/// Build the widget values from a series. Returns `None` for an empty series.
pub fn prepare_data(
    series: &SampleSeries,
    options: &DisplayOptions,
    thresholds: &Thresholds,
    now_ms: i64,
) -> Option<DisplayResult> {
    let latest = series.latest()?;

    let (last, value) = if options.units_in_mmol {
        (convert_units(latest.sgv), mgdl_to_mmol(latest.sgv))
    } else {
        (format_mgdl(latest.sgv), latest.sgv)
    };

    let delta = series
        .previous()
        .map(|previous| compute_delta(latest.sgv, previous.sgv, options.units_in_mmol));

    let (trend, glyph) = if options.calc_trend {
        let trend = classify_trend(&series.values());
        (Some(trend), trend.glyph())
    } else {
        let label = latest.direction.as_deref();
        (label.and_then(Direction::from_label), direction_to_glyph(label))
    };

    let age = compute_age(latest.created_ms, now_ms);

    Some(DisplayResult {
        last,
        delta,
        trend,
        direction: char_to_entity(glyph),
        age,
        level: classify_level(value, age, options, thresholds),
    })
}
