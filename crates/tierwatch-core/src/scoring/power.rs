use crate::models::{Contributions, StatBundle};

/// Category weights of the power index. They sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub attack: f64,
    pub damage_amp: f64,
    pub crit: f64,
    pub attack_speed: f64,
    pub survive: f64,
}

pub const WEIGHTS: Weights = Weights {
    attack: 0.30,
    damage_amp: 0.20,
    crit: 0.30,
    attack_speed: 0.10,
    survive: 0.10,
};

/// Result of scoring one stat bundle against a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerIndex {
    pub score: i64,
    pub contributions: Contributions,
}

/// Ratio of a stat to its baseline; a zero baseline counts as parity.
pub fn normalize(value: i64, average: i64) -> f64 {
    if average == 0 {
        1.0
    } else {
        value as f64 / average as f64
    }
}

/// Weighted, baseline-relative power index.
///
/// A character exactly on the baseline scores 1000. Contributions are each
/// category's share of the weighted total, in whole percent.
pub fn compute(stats: &StatBundle, averages: &StatBundle) -> PowerIndex {
    let n = |key: &str| normalize(stats.get(key).unwrap_or(0), averages.get(key).unwrap_or(1));

    let attack = n("attack") * WEIGHTS.attack;
    let damage_amp = n("damage_amp") * WEIGHTS.damage_amp;
    let crit = (n("crit_rate") + n("crit_damage")) / 2.0 * WEIGHTS.crit;
    let attack_speed = n("attack_speed") * WEIGHTS.attack_speed;
    let survive =
        (n("defense") + n("damage_reduction") + n("hp")) / 3.0 * WEIGHTS.survive;

    let total = attack + damage_amp + crit + attack_speed + survive;
    let score = (total * 1000.0).round_ties_even() as i64;

    let share = |term: f64| {
        if total == 0.0 {
            0
        } else {
            (term / total * 100.0).round_ties_even() as i64
        }
    };

    PowerIndex {
        score,
        contributions: Contributions {
            attack: share(attack),
            damage_amp: share(damage_amp),
            crit: share(crit),
            attack_speed: share(attack_speed),
            survive: share(survive),
        },
    }
}
