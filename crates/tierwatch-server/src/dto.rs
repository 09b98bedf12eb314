use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tierwatch_core::models::{
    CharacterScore, RankingEntry, RankingSnapshot, Resolved, StatSnapshot,
};

// ---------------------------------------------------------------------------
// Characters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CharacterQuery {
    /// Bypass the fresh stored record and ask the upstream again
    pub refresh: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScoreResponse {
    pub power_index: i64,
    /// Percentage of the index contributed by each stat group
    pub contributions: serde_json::Value,
    pub tier_rank: String,
    pub percentile: f64,
    pub scored_at: DateTime<Utc>,
}

impl From<CharacterScore> for ScoreResponse {
    fn from(score: CharacterScore) -> Self {
        Self {
            power_index: score.power_index,
            contributions: serde_json::to_value(score.contributions).unwrap_or_default(),
            tier_rank: score.tier_rank,
            percentile: score.percentile,
            scored_at: score.scored_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CharacterResponse {
    pub server: String,
    pub name: String,
    pub class_name: String,
    pub race: Option<String>,
    pub level: i32,
    pub power: i64,
    pub stats: Option<serde_json::Value>,
    pub profile: serde_json::Value,
    pub is_synthetic: bool,
    pub score: Option<ScoreResponse>,
    pub fetched_at: DateTime<Utc>,
    /// One of `live`, `cache`, `stored`, `synthetic`
    pub origin: String,
    /// Human-readable note when the data is not fresh from the upstream
    pub advisory: Option<String>,
    pub power_change: Option<i64>,
    pub level_change: Option<i32>,
    /// Power-index points needed to reach the next better tier
    pub next_rank_gap: Option<i64>,
}

impl From<Resolved> for CharacterResponse {
    fn from(resolved: Resolved) -> Self {
        let record = resolved.record;
        Self {
            server: record.server,
            name: record.name,
            class_name: record.class_name,
            race: record.race,
            level: record.level,
            power: record.power,
            stats: record.stats.and_then(|s| serde_json::to_value(s).ok()),
            profile: serde_json::to_value(record.profile).unwrap_or_default(),
            is_synthetic: record.is_synthetic,
            score: record.score.map(Into::into),
            fetched_at: record.fetched_at,
            origin: resolved.origin.to_string(),
            advisory: resolved.advisory.map(|a| a.to_string()),
            power_change: resolved.power_change,
            level_change: resolved.level_change,
            next_rank_gap: resolved.next_rank_gap,
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatSnapshotResponse {
    pub stats: serde_json::Value,
    pub power: i64,
    pub level: i32,
    pub captured_at: DateTime<Utc>,
}

impl From<StatSnapshot> for StatSnapshotResponse {
    fn from(snapshot: StatSnapshot) -> Self {
        Self {
            stats: serde_json::to_value(snapshot.stats).unwrap_or_default(),
            power: snapshot.power,
            level: snapshot.level,
            captured_at: snapshot.captured_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HistoryResponse {
    pub snapshots: Vec<StatSnapshotResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Rankings
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RankingQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RankingEntryResponse {
    pub rank: u32,
    pub name: String,
    pub server: String,
    pub class_name: String,
    pub level: i32,
    pub power: i64,
    pub power_index: i64,
    pub tier_rank: String,
}

impl From<RankingEntry> for RankingEntryResponse {
    fn from(e: RankingEntry) -> Self {
        Self {
            rank: e.rank,
            name: e.name,
            server: e.server,
            class_name: e.class_name,
            level: e.level,
            power: e.power,
            power_index: e.power_index,
            tier_rank: e.tier_rank,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RankingResponse {
    pub scope: String,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<RankingEntryResponse>,
    /// Size of the whole snapshot, before `limit`
    pub total: usize,
}

impl RankingResponse {
    pub fn from_snapshot(snapshot: RankingSnapshot, limit: usize) -> Self {
        let total = snapshot.entries.len();
        Self {
            scope: snapshot.scope,
            generated_at: snapshot.generated_at,
            entries: snapshot
                .entries
                .into_iter()
                .take(limit)
                .map(Into::into)
                .collect(),
            total,
        }
    }
}

// ---------------------------------------------------------------------------
// Servers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ServerResponse {
    pub name: String,
    pub upstream_id: String,
    pub local_label: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ServerListResponse {
    pub servers: Vec<ServerResponse>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
