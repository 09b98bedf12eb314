//! Percentile and tier placement.
//!
//! Two tables exist. [`RANK_TIERS`] is the 25-band table used when a server
//! has enough scored characters. [`RELAXED_TIERS`] is the coarser table the
//! batch falls back to for small servers; it places by list position rather
//! than by score percentile, and its sub-levels count the other way round.

/// A half-open percentile band `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierBand {
    pub label: &'static str,
    pub min: f64,
    pub max: f64,
}

const fn band(label: &'static str, min: f64, max: f64) -> TierBand {
    TierBand { label, min, max }
}

/// Best (S5) to worst (D1).
pub const RANK_TIERS: [TierBand; 25] = [
    band("S5", 0.0, 0.06),
    band("S4", 0.06, 0.12),
    band("S3", 0.12, 0.18),
    band("S2", 0.18, 0.24),
    band("S1", 0.24, 0.3),
    band("A5", 0.3, 1.24),
    band("A4", 1.24, 2.18),
    band("A3", 2.18, 3.12),
    band("A2", 3.12, 4.06),
    band("A1", 4.06, 5.0),
    band("B5", 5.0, 9.0),
    band("B4", 9.0, 13.0),
    band("B3", 13.0, 17.0),
    band("B2", 17.0, 21.0),
    band("B1", 21.0, 25.0),
    band("C5", 25.0, 30.0),
    band("C4", 30.0, 35.0),
    band("C3", 35.0, 40.0),
    band("C2", 40.0, 45.0),
    band("C1", 45.0, 50.0),
    band("D5", 50.0, 60.0),
    band("D4", 60.0, 70.0),
    band("D3", 70.0, 80.0),
    band("D2", 80.0, 90.0),
    band("D1", 90.0, 100.0),
];

/// Coarse letter bands of the relaxed table: a letter applies below its bound.
pub const RELAXED_TIERS: [(char, f64); 5] = [
    ('S', 5.0),
    ('A', 25.0),
    ('B', 50.0),
    ('C', 75.0),
    ('D', f64::INFINITY),
];

/// Percentile assumed when there is no population to compare against.
pub const EMPTY_POPULATION_PERCENTILE: f64 = 50.0;

/// Share of the population scoring strictly higher, in percent with two
/// decimals. Lower is better.
pub fn percentile(score: i64, population: &[i64]) -> f64 {
    if population.is_empty() {
        return EMPTY_POPULATION_PERCENTILE;
    }
    let higher = population.iter().filter(|&&s| s > score).count();
    round2(higher as f64 / population.len() as f64 * 100.0)
}

/// Tier label for a percentile in the 25-band table.
pub fn tier_for_percentile(percentile: f64) -> &'static str {
    RANK_TIERS
        .iter()
        .find(|b| b.min <= percentile && percentile < b.max)
        .map(|b| b.label)
        .unwrap_or(if percentile < 0.3 { "S5" } else { "D1" })
}

/// Points needed to reach the next better band, or `None` at the top or
/// when the target position falls outside the population.
pub fn next_rank_gap(tier: &str, score: i64, population: &[i64]) -> Option<i64> {
    let idx = RANK_TIERS.iter().position(|b| b.label == tier)?;
    if idx == 0 || population.is_empty() {
        return None;
    }
    let next = RANK_TIERS[idx - 1];

    let mut sorted = population.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let target = (next.min / 100.0 * sorted.len() as f64) as usize;
    let threshold = *sorted.get(target)?;
    Some((threshold - score).max(0))
}

/// Relaxed placement of the character at `position` (0 = best) among `total`.
///
/// Returns the label and the positional percentile.
pub fn relaxed_tier(position: usize, total: usize) -> (String, f64) {
    let percentile = if total == 0 {
        EMPTY_POPULATION_PERCENTILE
    } else {
        position as f64 / total as f64 * 100.0
    };
    let letter = RELAXED_TIERS
        .iter()
        .find(|(_, bound)| percentile < *bound)
        .map(|(letter, _)| *letter)
        .unwrap_or('D');
    let sub = (((percentile % 25.0) / 25.0 * 5.0) as i64 + 1).clamp(1, 5);
    (format!("{letter}{sub}"), percentile)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}
