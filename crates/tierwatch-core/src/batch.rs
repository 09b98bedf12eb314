//! Periodic population scoring.
//!
//! One run loads every character with stats, groups them by server,
//! refreshes each server's averages, scores and ranks its characters, then
//! rebuilds the per-server and global ranking snapshots. A failure on one
//! server is logged and counted; the others still complete.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::BatchConfig;
use crate::error::AppError;
use crate::models::{
    GLOBAL_SCOPE, RankingSnapshot, ScorableCharacter, ScoreUpdate, ServerAverageStats, StatBundle,
};
use crate::scoring;
use crate::traits::ScoringStore;

/// Summary of one batch run, stored as the job report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub servers: usize,
    pub snapshots: usize,
}

/// Scores the whole population against a [`ScoringStore`].
pub struct BatchScorer<S: ScoringStore> {
    store: S,
    config: BatchConfig,
}

impl<S: ScoringStore> BatchScorer<S> {
    pub fn new(store: S, config: BatchConfig) -> Self {
        Self { store, config }
    }

    /// Run one batch. Only a failure to load the population fails the run.
    pub async fn run(&self) -> Result<BatchReport, AppError> {
        let population = self.store.scorable_characters().await?;
        if population.is_empty() {
            tracing::warn!("No characters with stats to score");
            return Ok(BatchReport::default());
        }
        tracing::info!(characters = population.len(), "Starting scoring batch");

        let mut by_server: BTreeMap<String, Vec<ScorableCharacter>> = BTreeMap::new();
        for character in population {
            by_server
                .entry(character.server.clone())
                .or_default()
                .push(character);
        }

        let mut report = BatchReport {
            servers: by_server.len(),
            ..Default::default()
        };

        for (server, members) in &by_server {
            match self.score_server(server, members).await {
                Ok(processed) => {
                    tracing::info!(%server, processed, "Server scored");
                    report.processed += processed;
                }
                Err(e) => {
                    tracing::error!(%server, error = %e, "Failed to score server");
                    report.failed += members.len();
                }
            }
        }

        let scopes = by_server
            .keys()
            .map(|s| Some(s.as_str()))
            .chain(std::iter::once(None));
        for scope in scopes {
            match self.rebuild_snapshot(scope).await {
                Ok(true) => report.snapshots += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(scope = scope.unwrap_or(GLOBAL_SCOPE), error = %e, "Failed to rebuild snapshot");
                }
            }
        }

        tracing::info!(?report, "Scoring batch complete");
        Ok(report)
    }

    async fn score_server(
        &self,
        server: &str,
        members: &[ScorableCharacter],
    ) -> Result<usize, AppError> {
        let averages = StatBundle::mean(members.iter().map(|c| &c.stats))
            .ok_or_else(|| AppError::Generic(format!("no stats for server {server}")))?;
        self.store
            .replace_server_averages(&ServerAverageStats {
                server: server.to_string(),
                averages: averages.clone(),
                sample_size: members.len() as i64,
                updated_at: Utc::now(),
            })
            .await?;

        let updates = rank_server(members, &averages, self.config.min_sample_size);
        self.store.apply_scores(&updates).await?;
        Ok(updates.len())
    }

    async fn rebuild_snapshot(&self, server: Option<&str>) -> Result<bool, AppError> {
        let entries = self.store.ranked_entries(server).await?;
        let scope = server.unwrap_or(GLOBAL_SCOPE);
        if entries.is_empty() {
            tracing::warn!(%scope, "No scored characters for snapshot");
            return Ok(false);
        }
        let snapshot = RankingSnapshot::from_ordered(scope, entries, self.config.top_n);
        self.store.replace_ranking_snapshot(&snapshot).await?;
        Ok(true)
    }
}

/// Score and rank one server's characters against its averages.
///
/// Servers with fewer than `min_sample_size` members get the relaxed,
/// position-based table.
pub fn rank_server(
    members: &[ScorableCharacter],
    averages: &StatBundle,
    min_sample_size: usize,
) -> Vec<ScoreUpdate> {
    let scored: Vec<_> = members
        .iter()
        .map(|c| (c.id, scoring::compute(&c.stats, averages)))
        .collect();

    if scored.len() < min_sample_size {
        let mut ordered = scored;
        ordered.sort_by(|a, b| b.1.score.cmp(&a.1.score));
        let total = ordered.len();
        return ordered
            .into_iter()
            .enumerate()
            .map(|(position, (id, index))| {
                let (tier_rank, percentile) = scoring::relaxed_tier(position, total);
                ScoreUpdate {
                    character_id: id,
                    power_index: index.score,
                    contributions: index.contributions,
                    tier_rank,
                    percentile,
                }
            })
            .collect();
    }

    let population: Vec<i64> = scored.iter().map(|(_, index)| index.score).collect();
    scored
        .into_iter()
        .map(|(id, index)| {
            let percentile = scoring::percentile(index.score, &population);
            ScoreUpdate {
                character_id: id,
                power_index: index.score,
                contributions: index.contributions,
                tier_rank: scoring::tier_for_percentile(percentile).to_string(),
                percentile,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryStore, sample_fetched};

    fn member(id: i64, server: &str, attack: i64) -> ScorableCharacter {
        ScorableCharacter {
            id,
            server: server.into(),
            name: format!("c{id}"),
            stats: StatBundle {
                attack,
                ..StatBundle::population_defaults()
            },
        }
    }

    #[test]
    fn small_servers_use_relaxed_ranking() {
        let members = vec![member(1, "Ex", 400), member(2, "Ex", 900), member(3, "Ex", 500)];
        let averages = StatBundle::mean(members.iter().map(|m| &m.stats)).unwrap();
        let updates = rank_server(&members, &averages, 10);

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].character_id, 2);
        assert_eq!(updates[0].tier_rank, "S1");
        assert_eq!(updates[0].percentile, 0.0);
        assert!(updates[0].power_index > updates[2].power_index);
    }

    #[test]
    fn large_servers_use_the_full_table() {
        let members: Vec<_> = (0..20).map(|i| member(i, "Siel", 300 + i * 50)).collect();
        let averages = StatBundle::mean(members.iter().map(|m| &m.stats)).unwrap();
        let updates = rank_server(&members, &averages, 10);

        let best = updates.iter().find(|u| u.character_id == 19).unwrap();
        assert_eq!(best.percentile, 0.0);
        assert_eq!(best.tier_rank, "S5");
        let worst = updates.iter().find(|u| u.character_id == 0).unwrap();
        assert_eq!(worst.percentile, 95.0);
        assert_eq!(worst.tier_rank, "D1");
    }

    #[tokio::test]
    async fn run_scores_every_server_and_builds_snapshots() {
        let store = MemoryStore::new();
        for i in 0..12 {
            let mut c = sample_fetched("Siel", &format!("s{i}"));
            c.stats.as_mut().unwrap().attack = 400 + i * 10;
            store.seed(c, Utc::now());
        }
        for i in 0..3 {
            store.seed(sample_fetched("Ex", &format!("e{i}")), Utc::now());
        }

        let report = BatchScorer::new(store.clone(), BatchConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.servers, 2);
        assert_eq!(report.processed, 15);
        assert_eq!(report.failed, 0);
        assert_eq!(report.snapshots, 3);

        let global = store.snapshot("all").unwrap();
        assert_eq!(global.entries.len(), 15);
        assert_eq!(global.entries[0].rank, 1);
        assert!(global.entries[0].power_index >= global.entries[14].power_index);
        assert_eq!(store.snapshot("Ex").unwrap().entries.len(), 3);
        assert_eq!(store.averages_for("Siel").unwrap().sample_size, 12);
    }

    #[tokio::test]
    async fn one_failing_server_does_not_stop_the_others() {
        let store = MemoryStore::new();
        store.seed(sample_fetched("Siel", "a"), Utc::now());
        store.seed(sample_fetched("Ex", "b"), Utc::now());
        store.fail_scores_for("Ex");

        let report = BatchScorer::new(store.clone(), BatchConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert!(store.get("Siel", "a").unwrap().score.is_some());
        assert!(store.get("Ex", "b").unwrap().score.is_none());
    }

    #[tokio::test]
    async fn empty_population_is_a_no_op() {
        let report = BatchScorer::new(MemoryStore::new(), BatchConfig::default())
            .run()
            .await
            .unwrap();
        assert_eq!(report, BatchReport::default());
    }

    #[tokio::test]
    async fn population_load_failure_fails_the_run() {
        let err = BatchScorer::new(MemoryStore::failing(), BatchConfig::default())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
    }
}
