use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::listing::{ListingOutcome, ListingQuery, ListingRow};
use crate::models::{
    CharacterRecord, FetchedCharacter, RankingEntry, RankingSnapshot, ScorableCharacter,
    ScoreUpdate, ServerAverageStats, StatSnapshot,
};

/// Fetches a raw upstream page body.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns upstream page bodies into character data.
///
/// `parse_listing` errors with `NotFound` when no row matches and with a
/// generic `ParseError` on structural surprises. `parse_detail` returns
/// `None` whenever the page cannot be trusted, so callers fall back to the
/// listing row.
pub trait CharacterParser: Send + Sync + Clone {
    fn parse_listing(
        &self,
        body: &str,
        query: &ListingQuery<'_>,
    ) -> Result<ListingOutcome, AppError>;

    fn parse_detail(
        &self,
        body: &str,
        row: &ListingRow,
        server: &str,
    ) -> Option<FetchedCharacter>;
}

/// Anything that can produce a character for `(server, name)`.
pub trait CharacterSource: Send + Sync + Clone {
    fn fetch_character(
        &self,
        server: &str,
        name: &str,
    ) -> impl Future<Output = Result<FetchedCharacter, AppError>> + Send;
}

/// Raw key/value store with per-entry expiry backing the response cache.
pub trait CacheBackend: Send + Sync + Clone {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Remembers when each identity was last allowed through.
pub trait RateLimitStore: Send + Sync + Clone {
    fn last_request(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<DateTime<Utc>>, AppError>> + Send;

    /// Record an accepted request. The entry may be dropped after `window`.
    fn record_request(
        &self,
        key: &str,
        at: DateTime<Utc>,
        window: Duration,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Persistence used on the request path.
pub trait CharacterStore: Send + Sync + Clone {
    fn get_character(
        &self,
        server: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<CharacterRecord>, AppError>> + Send;

    /// Upsert on `(server, name)` and, when the character carries stats,
    /// append a [`StatSnapshot`] in the same transaction. A character
    /// without stats keeps the stats already stored.
    fn save_character(
        &self,
        character: &FetchedCharacter,
    ) -> impl Future<Output = Result<CharacterRecord, AppError>> + Send;

    fn save_score(&self, update: &ScoreUpdate)
    -> impl Future<Output = Result<(), AppError>> + Send;

    /// Stat history for a character, newest first.
    fn stat_history(
        &self,
        server: &str,
        name: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<StatSnapshot>, AppError>> + Send;

    fn server_averages(
        &self,
    ) -> impl Future<Output = Result<Vec<ServerAverageStats>, AppError>> + Send;

    /// Power indices of every scored character on `server`.
    fn power_indices(
        &self,
        server: &str,
    ) -> impl Future<Output = Result<Vec<i64>, AppError>> + Send;

    fn ranking_snapshot(
        &self,
        scope: &str,
    ) -> impl Future<Output = Result<Option<RankingSnapshot>, AppError>> + Send;

    /// Delete every synthetic record. Returns the number removed.
    fn purge_synthetic(&self) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Persistence used by the batch orchestrator.
pub trait ScoringStore: Send + Sync + Clone {
    /// Every character that has a stat bundle.
    fn scorable_characters(
        &self,
    ) -> impl Future<Output = Result<Vec<ScorableCharacter>, AppError>> + Send;

    fn replace_server_averages(
        &self,
        averages: &ServerAverageStats,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Write all updates atomically.
    fn apply_scores(
        &self,
        updates: &[ScoreUpdate],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Scored characters in `server` (or everywhere for `None`), best first.
    fn ranked_entries(
        &self,
        server: Option<&str>,
    ) -> impl Future<Output = Result<Vec<RankingEntry>, AppError>> + Send;

    /// Atomically swap the snapshot for its scope.
    fn replace_ranking_snapshot(
        &self,
        snapshot: &RankingSnapshot,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
