//! `resolveCharacter`: the tiered resolution policy.
//!
//! Tiers, in order: fresh stored record, rate-limit gate, response cache,
//! live source, stale stored record, synthetic placeholder. Only the
//! rate-limit gate can make a call fail; every other tier either answers
//! or hands over to the next one.

use chrono::{DateTime, Utc};

use crate::cache::ResponseCache;
use crate::config::ResolverConfig;
use crate::error::AppError;
use crate::models::{
    Advisory, CharacterRecord, CharacterScore, FetchedCharacter, Origin, Resolved, ScoreUpdate,
};
use crate::rate_limit::RateLimiter;
use crate::scoring;
use crate::synthetic::synthesize;
use crate::traits::{CacheBackend, CharacterSource, CharacterStore, RateLimitStore};

/// Result of the live tier.
enum LiveTier {
    Fetched(FetchedCharacter),
    Failed(AppError),
}

/// Orchestrates character resolution across the store, cache and source.
///
/// Generic over every collaborator so the policy can be exercised without
/// network or database.
pub struct ResolutionService<S, St, B, R>
where
    S: CharacterSource,
    St: CharacterStore,
    B: CacheBackend,
    R: RateLimitStore,
{
    source: S,
    store: St,
    cache: ResponseCache<B>,
    limiter: RateLimiter<R>,
    config: ResolverConfig,
}

impl<S, St, B, R> ResolutionService<S, St, B, R>
where
    S: CharacterSource,
    St: CharacterStore,
    B: CacheBackend,
    R: RateLimitStore,
{
    pub fn new(source: S, store: St, cache_backend: B, limit_store: R, config: ResolverConfig) -> Self {
        let cache = if config.cache_enabled {
            ResponseCache::new(cache_backend, config.cache_ttl)
        } else {
            ResponseCache::disabled(cache_backend)
        };
        let limiter = if config.rate_limit_enabled {
            RateLimiter::new(limit_store, config.rate_limit_window)
        } else {
            RateLimiter::disabled(limit_store)
        };
        Self {
            source,
            store,
            cache,
            limiter,
            config,
        }
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Resolve a character, always producing a record unless rate limited.
    pub async fn resolve(
        &self,
        server: &str,
        name: &str,
        force_refresh: bool,
    ) -> Result<Resolved, AppError> {
        let now = Utc::now();

        let stored = match self.store.get_character(server, name).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%server, %name, error = %e, "Store lookup failed, continuing without it");
                None
            }
        };

        if !force_refresh
            && let Some(record) = &stored
            && self.is_fresh(record, now)
        {
            let age_minutes = record.age_minutes(now);
            tracing::info!(%server, %name, age_minutes, "Serving fresh stored record");
            return Ok(Resolved {
                record: record.clone(),
                origin: Origin::Stored,
                advisory: Some(Advisory::Recent { age_minutes }),
                power_change: None,
                level_change: None,
                next_rank_gap: None,
            });
        }

        self.limiter.check(server, name).await?;

        if let Some(record) = self.cache.get(server, name).await {
            tracing::info!(%server, %name, "Cache hit");
            return Ok(Resolved {
                record,
                origin: Origin::Cache,
                advisory: None,
                power_change: None,
                level_change: None,
                next_rank_gap: None,
            });
        }

        match self.live(server, name).await {
            LiveTier::Fetched(character) => {
                let resolved = self
                    .accept(character, stored.as_ref(), Origin::Live, None)
                    .await;
                self.cache.set(&resolved.record).await;
                return Ok(resolved);
            }
            LiveTier::Failed(e) => {
                tracing::warn!(%server, %name, error = %e, "Live source failed");
            }
        }

        if let Some(record) = stored {
            tracing::info!(%server, %name, "Falling back to stale stored record");
            return Ok(Resolved {
                record,
                origin: Origin::Stored,
                advisory: Some(Advisory::LiveUnavailable),
                power_change: None,
                level_change: None,
                next_rank_gap: None,
            });
        }

        tracing::info!(%server, %name, "No data anywhere, serving synthetic placeholder");
        Ok(self
            .accept(
                synthesize(server, name),
                None,
                Origin::Synthetic,
                Some(Advisory::SyntheticPlaceholder),
            )
            .await)
    }

    fn is_fresh(&self, record: &CharacterRecord, now: DateTime<Utc>) -> bool {
        (now - record.fetched_at)
            .to_std()
            .map(|age| age < self.config.freshness_window)
            .unwrap_or(true)
    }

    async fn live(&self, server: &str, name: &str) -> LiveTier {
        match self.source.fetch_character(server, name).await {
            Ok(character) => LiveTier::Fetched(character),
            Err(e) => LiveTier::Failed(e),
        }
    }

    /// Persist, diff against the previous record and score inline.
    async fn accept(
        &self,
        character: FetchedCharacter,
        previous: Option<&CharacterRecord>,
        origin: Origin,
        advisory: Option<Advisory>,
    ) -> Resolved {
        let record = match self.store.save_character(&character).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    server = %character.server,
                    name = %character.name,
                    error = %e,
                    "Failed to persist character, returning it unsaved"
                );
                CharacterRecord::unsaved(character, Utc::now())
            }
        };

        let power_change = previous.map(|p| record.power - p.power);
        let level_change = previous.map(|p| record.level - p.level);

        let (record, next_rank_gap) = self.score_inline(record).await;
        tracing::info!(
            server = %record.server,
            name = %record.name,
            %origin,
            power = record.power,
            power_index = ?record.score.as_ref().map(|s| s.power_index),
            "Character resolved"
        );

        Resolved {
            record,
            origin,
            advisory,
            power_change,
            level_change,
            next_rank_gap,
        }
    }

    /// Score one record against its server. Failures leave it unscored.
    async fn score_inline(&self, mut record: CharacterRecord) -> (CharacterRecord, Option<i64>) {
        let Some(stats) = &record.stats else {
            return (record, None);
        };

        let averages = self.store.server_averages().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Server averages unavailable, using fallback baseline");
            Vec::new()
        });
        let baseline = scoring::baseline_for(&record.server, &averages);
        let index = scoring::compute(stats, &baseline);

        let mut population = self
            .store
            .power_indices(&record.server)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Population unavailable for percentile");
                Vec::new()
            });
        let previous_score = record.score.as_ref().map(|s| s.power_index);
        match previous_score.and_then(|old| population.iter().position(|&p| p == old)) {
            Some(pos) => population[pos] = index.score,
            None => population.push(index.score),
        }

        let percentile = scoring::percentile(index.score, &population);
        let tier = scoring::tier_for_percentile(percentile);
        let gap = scoring::next_rank_gap(tier, index.score, &population);

        if record.is_persisted() {
            let update = ScoreUpdate {
                character_id: record.id,
                power_index: index.score,
                contributions: index.contributions,
                tier_rank: tier.to_string(),
                percentile,
            };
            if let Err(e) = self.store.save_score(&update).await {
                tracing::warn!(character_id = record.id, error = %e, "Failed to persist inline score");
            }
        }

        record.score = Some(CharacterScore {
            power_index: index.score,
            contributions: index.contributions,
            tier_rank: tier.to_string(),
            percentile,
            scored_at: Utc::now(),
        });
        (record, gap)
    }
}
