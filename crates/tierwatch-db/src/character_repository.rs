use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Pool, Postgres};
use tierwatch_core::error::AppError;
use tierwatch_core::models::{
    CharacterProfile, CharacterRecord, CharacterScore, Contributions, FetchedCharacter,
    RankingEntry, RankingSnapshot, ScorableCharacter, ScoreUpdate, ServerAverageStats,
    StatBundle, StatSnapshot,
};
use tierwatch_core::traits::{CharacterStore, ScoringStore};

/// PostgreSQL persistence for characters, stat history, server baselines
/// and ranking snapshots.
#[derive(Clone)]
pub struct CharacterRepository {
    pool: Pool<Postgres>,
}

impl CharacterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct CharacterRow {
    id: i64,
    server: String,
    name: String,
    class_name: String,
    race: Option<String>,
    level: i32,
    power: i64,
    stats: Option<Json<StatBundle>>,
    raw_payload: Option<serde_json::Value>,
    profile: Json<CharacterProfile>,
    is_synthetic: bool,
    power_index: Option<i64>,
    contributions: Option<Json<Contributions>>,
    tier_rank: Option<String>,
    percentile: Option<f64>,
    scored_at: Option<DateTime<Utc>>,
    fetched_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<CharacterRow> for CharacterRecord {
    fn from(row: CharacterRow) -> Self {
        let score = match (row.power_index, row.tier_rank, row.percentile, row.scored_at) {
            (Some(power_index), Some(tier_rank), Some(percentile), Some(scored_at)) => {
                Some(CharacterScore {
                    power_index,
                    contributions: row.contributions.map(|c| c.0).unwrap_or_default(),
                    tier_rank,
                    percentile,
                    scored_at,
                })
            }
            _ => None,
        };
        CharacterRecord {
            id: row.id,
            server: row.server,
            name: row.name,
            class_name: row.class_name,
            race: row.race,
            level: row.level,
            power: row.power,
            stats: row.stats.map(|s| s.0),
            raw_payload: row.raw_payload,
            profile: row.profile.0,
            is_synthetic: row.is_synthetic,
            score,
            fetched_at: row.fetched_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatSnapshotRow {
    character_id: i64,
    stats: Json<StatBundle>,
    power: i64,
    level: i32,
    captured_at: DateTime<Utc>,
}

impl From<StatSnapshotRow> for StatSnapshot {
    fn from(row: StatSnapshotRow) -> Self {
        StatSnapshot {
            character_id: row.character_id,
            stats: row.stats.0,
            power: row.power,
            level: row.level,
            captured_at: row.captured_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AverageRow {
    server: String,
    averages: Json<StatBundle>,
    sample_size: i64,
    updated_at: DateTime<Utc>,
}

impl From<AverageRow> for ServerAverageStats {
    fn from(row: AverageRow) -> Self {
        ServerAverageStats {
            server: row.server,
            averages: row.averages.0,
            sample_size: row.sample_size,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    scope: String,
    entries: Json<Vec<RankingEntry>>,
    top: Json<Vec<RankingEntry>>,
    generated_at: DateTime<Utc>,
}

impl From<SnapshotRow> for RankingSnapshot {
    fn from(row: SnapshotRow) -> Self {
        RankingSnapshot {
            scope: row.scope,
            generated_at: row.generated_at,
            entries: row.entries.0,
            top: row.top.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScorableRow {
    id: i64,
    server: String,
    name: String,
    stats: Json<StatBundle>,
}

#[derive(sqlx::FromRow)]
struct RankedRow {
    name: String,
    server: String,
    class_name: String,
    level: i32,
    power: i64,
    power_index: i64,
    tier_rank: Option<String>,
}

impl From<RankedRow> for RankingEntry {
    fn from(row: RankedRow) -> Self {
        RankingEntry {
            rank: 0,
            name: row.name,
            server: row.server,
            class_name: row.class_name,
            level: row.level,
            power: row.power,
            power_index: row.power_index,
            tier_rank: row.tier_rank.unwrap_or_default(),
        }
    }
}

impl CharacterStore for CharacterRepository {
    async fn get_character(
        &self,
        server: &str,
        name: &str,
    ) -> Result<Option<CharacterRecord>, AppError> {
        let row = sqlx::query_as::<_, CharacterRow>(
            r#"SELECT * FROM characters WHERE server = $1 AND name = $2"#,
        )
        .bind(server)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn save_character(
        &self,
        character: &FetchedCharacter,
    ) -> Result<CharacterRecord, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let row = sqlx::query_as::<_, CharacterRow>(
            r#"
            INSERT INTO characters
                (server, name, class_name, race, level, power, stats, raw_payload, profile, is_synthetic, fetched_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (server, name) DO UPDATE SET
                class_name = EXCLUDED.class_name,
                race = EXCLUDED.race,
                level = EXCLUDED.level,
                power = EXCLUDED.power,
                stats = COALESCE(EXCLUDED.stats, characters.stats),
                raw_payload = EXCLUDED.raw_payload,
                profile = EXCLUDED.profile,
                is_synthetic = EXCLUDED.is_synthetic,
                fetched_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&character.server)
        .bind(&character.name)
        .bind(&character.class_name)
        .bind(&character.race)
        .bind(character.level.max(0))
        .bind(character.power.max(0))
        .bind(character.stats.as_ref().map(Json))
        .bind(&character.raw_payload)
        .bind(Json(&character.profile))
        .bind(character.is_synthetic)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if let Some(stats) = &character.stats {
            sqlx::query(
                r#"
                INSERT INTO character_stats (character_id, stats, power, level, captured_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(row.id)
            .bind(Json(stats))
            .bind(row.power)
            .bind(row.level)
            .bind(row.fetched_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(id = row.id, server = %row.server, name = %row.name, "Character saved");
        Ok(row.into())
    }

    async fn save_score(&self, update: &ScoreUpdate) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE characters
            SET power_index = $2, contributions = $3, tier_rank = $4, percentile = $5, scored_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(update.character_id)
        .bind(update.power_index)
        .bind(Json(update.contributions))
        .bind(&update.tier_rank)
        .bind(update.percentile)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn stat_history(
        &self,
        server: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<StatSnapshot>, AppError> {
        let rows = sqlx::query_as::<_, StatSnapshotRow>(
            r#"
            SELECT s.character_id, s.stats, s.power, s.level, s.captured_at
            FROM character_stats s
            JOIN characters c ON c.id = s.character_id
            WHERE c.server = $1 AND c.name = $2
            ORDER BY s.captured_at DESC, s.id DESC
            LIMIT $3
            "#,
        )
        .bind(server)
        .bind(name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn server_averages(&self) -> Result<Vec<ServerAverageStats>, AppError> {
        let rows = sqlx::query_as::<_, AverageRow>(
            r#"SELECT * FROM server_average_stats ORDER BY server"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn power_indices(&self, server: &str) -> Result<Vec<i64>, AppError> {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT power_index FROM characters WHERE server = $1 AND power_index IS NOT NULL"#,
        )
        .bind(server)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))
    }

    async fn ranking_snapshot(&self, scope: &str) -> Result<Option<RankingSnapshot>, AppError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"SELECT * FROM ranking_snapshots WHERE scope = $1"#,
        )
        .bind(scope)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn purge_synthetic(&self) -> Result<u64, AppError> {
        let result = sqlx::query(r#"DELETE FROM characters WHERE is_synthetic"#)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::info!(deleted = result.rows_affected(), "Purged synthetic characters");
        Ok(result.rows_affected())
    }
}

impl ScoringStore for CharacterRepository {
    async fn scorable_characters(&self) -> Result<Vec<ScorableCharacter>, AppError> {
        let rows = sqlx::query_as::<_, ScorableRow>(
            r#"SELECT id, server, name, stats FROM characters WHERE stats IS NOT NULL ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ScorableCharacter {
                id: row.id,
                server: row.server,
                name: row.name,
                stats: row.stats.0,
            })
            .collect())
    }

    async fn replace_server_averages(&self, averages: &ServerAverageStats) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO server_average_stats (server, averages, sample_size, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (server) DO UPDATE SET
                averages = EXCLUDED.averages,
                sample_size = EXCLUDED.sample_size,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&averages.server)
        .bind(Json(&averages.averages))
        .bind(averages.sample_size)
        .bind(averages.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn apply_scores(&self, updates: &[ScoreUpdate]) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        for update in updates {
            sqlx::query(
                r#"
                UPDATE characters
                SET power_index = $2, contributions = $3, tier_rank = $4, percentile = $5, scored_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(update.character_id)
            .bind(update.power_index)
            .bind(Json(update.contributions))
            .bind(&update.tier_rank)
            .bind(update.percentile)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn ranked_entries(&self, server: Option<&str>) -> Result<Vec<RankingEntry>, AppError> {
        let rows = sqlx::query_as::<_, RankedRow>(
            r#"
            SELECT name, server, class_name, level, power, power_index, tier_rank
            FROM characters
            WHERE power_index IS NOT NULL
              AND ($1::text IS NULL OR server = $1)
            ORDER BY power_index DESC, id ASC
            "#,
        )
        .bind(server)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn replace_ranking_snapshot(&self, snapshot: &RankingSnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO ranking_snapshots (scope, entries, top, generated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (scope) DO UPDATE SET
                entries = EXCLUDED.entries,
                top = EXCLUDED.top,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(&snapshot.scope)
        .bind(Json(&snapshot.entries))
        .bind(Json(&snapshot.top))
        .bind(snapshot.generated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
