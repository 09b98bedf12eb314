use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope name of the ranking snapshot that spans every server.
pub const GLOBAL_SCOPE: &str = "all";

/// Normalized combat stats of a character.
///
/// The eight named stats feed the power index. Anything else the upstream
/// reports is kept verbatim in `extra` so history stays lossless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatBundle {
    pub attack: i64,
    pub damage_amp: i64,
    pub crit_rate: i64,
    pub crit_damage: i64,
    pub attack_speed: i64,
    pub defense: i64,
    pub damage_reduction: i64,
    pub hp: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, i64>,
}

impl StatBundle {
    /// Canonical stat names, in the order they are reported.
    pub const KEYS: [&'static str; 8] = [
        "attack",
        "damage_amp",
        "crit_rate",
        "crit_damage",
        "attack_speed",
        "defense",
        "damage_reduction",
        "hp",
    ];

    /// Baseline used when no population data exists at all.
    pub fn population_defaults() -> Self {
        Self {
            attack: 500,
            damage_amp: 100,
            crit_rate: 50,
            crit_damage: 200,
            attack_speed: 100,
            defense: 500,
            damage_reduction: 50,
            hp: 10000,
            extra: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        match key {
            "attack" => Some(self.attack),
            "damage_amp" => Some(self.damage_amp),
            "crit_rate" => Some(self.crit_rate),
            "crit_damage" => Some(self.crit_damage),
            "attack_speed" => Some(self.attack_speed),
            "defense" => Some(self.defense),
            "damage_reduction" => Some(self.damage_reduction),
            "hp" => Some(self.hp),
            other => self.extra.get(other).copied(),
        }
    }

    /// Set a stat by name. Unknown names land in `extra`.
    pub fn set(&mut self, key: &str, value: i64) {
        match key {
            "attack" => self.attack = value,
            "damage_amp" => self.damage_amp = value,
            "crit_rate" => self.crit_rate = value,
            "crit_damage" => self.crit_damage = value,
            "attack_speed" => self.attack_speed = value,
            "defense" => self.defense = value,
            "damage_reduction" => self.damage_reduction = value,
            "hp" => self.hp = value,
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    /// Integer (floor) mean of the named stats over `bundles`.
    ///
    /// Returns `None` for an empty slice.
    pub fn mean<'a, I>(bundles: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a StatBundle>,
    {
        // i128 so upstream values near i64::MAX cannot overflow the sum.
        let mut sums = [0i128; 8];
        let mut count = 0i128;
        for bundle in bundles {
            for (sum, key) in sums.iter_mut().zip(Self::KEYS) {
                *sum += i128::from(bundle.get(key).unwrap_or(0));
            }
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let mut mean = Self::default();
        for (sum, key) in sums.iter().zip(Self::KEYS) {
            mean.set(key, narrow(sum.div_euclid(count)));
        }
        Some(mean)
    }
}

/// Clamp a wide intermediate back into `i64`.
pub(crate) fn narrow(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// One piece of equipment shown on the detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub name: String,
    pub enhance_level: i32,
}

/// Presentation data that only the detail page provides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterProfile {
    pub image_url: Option<String>,
    pub equipment: Vec<EquipmentItem>,
}

/// A character as produced by a source, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedCharacter {
    pub server: String,
    pub name: String,
    pub class_name: String,
    pub race: Option<String>,
    pub level: i32,
    pub power: i64,
    pub stats: Option<StatBundle>,
    /// What the upstream actually said, kept for diagnosis.
    pub raw_payload: Option<serde_json::Value>,
    pub profile: CharacterProfile,
    pub is_synthetic: bool,
}

/// Power contribution percentages, keyed the way API consumers expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contributions {
    pub attack: i64,
    pub damage_amp: i64,
    pub crit: i64,
    pub attack_speed: i64,
    pub survive: i64,
}

/// Score fields written by inline scoring or the batch orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterScore {
    pub power_index: i64,
    pub contributions: Contributions,
    pub tier_rank: String,
    pub percentile: f64,
    pub scored_at: DateTime<Utc>,
}

/// A persisted character, unique on `(server, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: i64,
    pub server: String,
    pub name: String,
    pub class_name: String,
    pub race: Option<String>,
    pub level: i32,
    pub power: i64,
    pub stats: Option<StatBundle>,
    pub raw_payload: Option<serde_json::Value>,
    pub profile: CharacterProfile,
    pub is_synthetic: bool,
    pub score: Option<CharacterScore>,
    pub fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CharacterRecord {
    /// Record for a character that could not be persisted (id 0).
    pub fn unsaved(character: FetchedCharacter, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            server: character.server,
            name: character.name,
            class_name: character.class_name,
            race: character.race,
            level: character.level,
            power: character.power,
            stats: character.stats,
            raw_payload: character.raw_payload,
            profile: character.profile,
            is_synthetic: character.is_synthetic,
            score: None,
            fetched_at: now,
            created_at: now,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Minutes elapsed since the record was last fetched.
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_minutes().max(0)
    }
}

/// Immutable, timestamped copy of a character's stats at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub character_id: i64,
    pub stats: StatBundle,
    pub power: i64,
    pub level: i32,
    pub captured_at: DateTime<Utc>,
}

/// Per-server stat means computed by the batch orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerAverageStats {
    pub server: String,
    pub averages: StatBundle,
    pub sample_size: i64,
    pub updated_at: DateTime<Utc>,
}

/// Minimal view of a character the batch orchestrator scores.
#[derive(Debug, Clone, PartialEq)]
pub struct ScorableCharacter {
    pub id: i64,
    pub server: String,
    pub name: String,
    pub stats: StatBundle,
}

/// Score assignment for one character, written in a per-server batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub character_id: i64,
    pub power_index: i64,
    pub contributions: Contributions,
    pub tier_rank: String,
    pub percentile: f64,
}

/// One line of a ranking snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: u32,
    pub name: String,
    pub server: String,
    pub class_name: String,
    pub level: i32,
    pub power: i64,
    pub power_index: i64,
    pub tier_rank: String,
}

/// Precomputed ordered list for one scope (a server or [`GLOBAL_SCOPE`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub scope: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<RankingEntry>,
    pub top: Vec<RankingEntry>,
}

impl RankingSnapshot {
    /// Build a snapshot from entries already ordered by power index.
    pub fn from_ordered(
        scope: impl Into<String>,
        mut entries: Vec<RankingEntry>,
        top_n: usize,
    ) -> Self {
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i as u32 + 1;
        }
        let top = entries.iter().take(top_n).cloned().collect();
        Self {
            scope: scope.into(),
            generated_at: Utc::now(),
            entries,
            top,
        }
    }
}

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Live,
    Stored,
    Synthetic,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Cache => "cache",
            Origin::Live => "live",
            Origin::Stored => "stored",
            Origin::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable note attached to a non-live resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Stored record is inside the freshness window.
    Recent { age_minutes: i64 },
    /// Live fetch failed and a stored record was returned instead.
    LiveUnavailable,
    /// Nothing stored and live failed; the record is a generated placeholder.
    SyntheticPlaceholder,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::Recent { age_minutes } => {
                write!(f, "data collected {age_minutes} minutes ago")
            }
            Advisory::LiveUnavailable => {
                f.write_str("external source unavailable; showing stored data")
            }
            Advisory::SyntheticPlaceholder => {
                f.write_str("no stored data; showing temporary data")
            }
        }
    }
}

/// Outcome of `resolveCharacter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved {
    pub record: CharacterRecord,
    pub origin: Origin,
    pub advisory: Option<Advisory>,
    /// Change against the previously stored values, when a record was overwritten.
    pub power_change: Option<i64>,
    pub level_change: Option<i32>,
    /// Additional power-index points needed to reach the next better band.
    pub next_rank_gap: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_floors_each_stat() {
        let a = StatBundle {
            attack: 10,
            hp: 3,
            ..Default::default()
        };
        let b = StatBundle {
            attack: 11,
            hp: 4,
            ..Default::default()
        };
        let mean = StatBundle::mean([&a, &b]).unwrap();
        assert_eq!(mean.attack, 10);
        assert_eq!(mean.hp, 3);
        assert!(StatBundle::mean(std::iter::empty()).is_none());
    }

    #[test]
    fn mean_of_huge_values_does_not_overflow() {
        let huge = StatBundle {
            hp: i64::MAX / 2 + 1,
            attack: i64::MAX,
            ..Default::default()
        };
        let mean = StatBundle::mean([&huge, &huge]).unwrap();
        assert_eq!(mean.hp, i64::MAX / 2 + 1);
        assert_eq!(mean.attack, i64::MAX);
    }

    #[test]
    fn unknown_stats_survive_serde() {
        let mut stats = StatBundle::default();
        stats.set("magic_boost", 1200);
        stats.set("attack", 700);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["magic_boost"], 1200);
        let back: StatBundle = serde_json::from_value(json).unwrap();
        assert_eq!(back.get("magic_boost"), Some(1200));
        assert_eq!(back.attack, 700);
    }

    #[test]
    fn snapshot_assigns_ranks_and_slices_top() {
        let entries = (0..5)
            .map(|i| RankingEntry {
                rank: 0,
                name: format!("c{i}"),
                server: "Siel".into(),
                class_name: "Mage".into(),
                level: 60,
                power: 1000 - i,
                power_index: 1000 - i,
                tier_rank: "S1".into(),
            })
            .collect();
        let snapshot = RankingSnapshot::from_ordered("Siel", entries, 3);
        assert_eq!(snapshot.entries.len(), 5);
        assert_eq!(snapshot.top.len(), 3);
        assert_eq!(snapshot.entries[4].rank, 5);
        assert_eq!(snapshot.top[0].name, "c0");
    }

    #[test]
    fn advisory_messages() {
        assert_eq!(
            Advisory::Recent { age_minutes: 12 }.to_string(),
            "data collected 12 minutes ago"
        );
        assert!(Advisory::SyntheticPlaceholder.to_string().contains("temporary"));
    }
}
