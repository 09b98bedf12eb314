//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CreateJobRequest, JobStatus, ScoringJob};
use crate::job_queue::JobQueue;
use crate::listing::{ListingOutcome, ListingQuery, ListingRow};
use crate::models::{
    CharacterProfile, CharacterRecord, CharacterScore, FetchedCharacter, RankingEntry,
    RankingSnapshot, ScorableCharacter, ScoreUpdate, ServerAverageStats, StatBundle,
    StatSnapshot,
};
use crate::traits::{
    CacheBackend, CharacterParser, CharacterSource, CharacterStore, Fetcher, RateLimitStore,
    ScoringStore,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A fully populated live-looking character.
pub fn sample_fetched(server: &str, name: &str) -> FetchedCharacter {
    FetchedCharacter {
        server: server.to_string(),
        name: name.to_string(),
        class_name: "Mage".to_string(),
        race: Some("Elyos".to_string()),
        level: 45,
        power: 120_000,
        stats: Some(StatBundle {
            attack: 650,
            damage_amp: 120,
            crit_rate: 55,
            crit_damage: 210,
            attack_speed: 110,
            defense: 480,
            damage_reduction: 60,
            hp: 11_000,
            ..Default::default()
        }),
        raw_payload: Some(serde_json::json!({"name": name})),
        profile: CharacterProfile::default(),
        is_synthetic: false,
    }
}

pub fn sample_record(server: &str, name: &str) -> CharacterRecord {
    let mut record = CharacterRecord::unsaved(sample_fetched(server, name), Utc::now());
    record.id = 1;
    record
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns queued responses and records requested URLs.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    /// Sleep before answering calls at or after this index.
    delay: Option<(usize, Duration)>,
}

impl MockFetcher {
    pub fn new(body: &str) -> Self {
        Self::with_responses(vec![Ok(body.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn with_delay_after(mut self, call_index: usize, delay: Duration) -> Self {
        self.delay = Some((call_index, delay));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(url.to_string());
            calls.len() - 1
        };
        if let Some((from, delay)) = self.delay
            && index >= from
        {
            tokio::time::sleep(delay).await;
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("<html><body>default</body></html>".to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

/// Mock parser with a fixed listing outcome and detail result.
#[derive(Clone)]
pub struct MockParser {
    listing: Arc<Mutex<Option<Result<ListingOutcome, AppError>>>>,
    detail: Option<FetchedCharacter>,
}

impl MockParser {
    pub fn complete(character: FetchedCharacter) -> Self {
        Self {
            listing: Arc::new(Mutex::new(Some(Ok(ListingOutcome::Complete(character))))),
            detail: None,
        }
    }

    pub fn row(row: ListingRow) -> Self {
        Self {
            listing: Arc::new(Mutex::new(Some(Ok(ListingOutcome::Row(row))))),
            detail: None,
        }
    }

    pub fn listing_error(error: AppError) -> Self {
        Self {
            listing: Arc::new(Mutex::new(Some(Err(error)))),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Option<FetchedCharacter>) -> Self {
        self.detail = detail;
        self
    }
}

impl CharacterParser for MockParser {
    fn parse_listing(
        &self,
        _body: &str,
        query: &ListingQuery<'_>,
    ) -> Result<ListingOutcome, AppError> {
        self.listing
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(AppError::NotFound(query.name.to_string())))
    }

    fn parse_detail(
        &self,
        _body: &str,
        _row: &ListingRow,
        _server: &str,
    ) -> Option<FetchedCharacter> {
        self.detail.clone()
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// Mock character source with queued results.
#[derive(Clone)]
pub struct MockSource {
    responses: Arc<Mutex<Vec<Result<FetchedCharacter, AppError>>>>,
    calls: Arc<Mutex<usize>>,
}

impl MockSource {
    /// A source that answers `NotFound` to everything.
    pub fn empty() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<Result<FetchedCharacter, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl CharacterSource for MockSource {
    async fn fetch_character(
        &self,
        server: &str,
        name: &str,
    ) -> Result<FetchedCharacter, AppError> {
        *self.calls.lock().unwrap() += 1;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(AppError::NotFound(format!("{server}/{name}")))
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// Failing cache / rate-limit backends
// ---------------------------------------------------------------------------

/// Cache backend whose every operation fails.
#[derive(Clone, Copy)]
pub struct FailingCacheBackend;

impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, AppError> {
        Err(AppError::CacheError("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), AppError> {
        Err(AppError::CacheError("connection refused".into()))
    }
}

/// Rate-limit store whose every operation fails.
#[derive(Clone, Copy)]
pub struct FailingRateLimitStore;

impl RateLimitStore for FailingRateLimitStore {
    async fn last_request(&self, _key: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        Err(AppError::CacheError("connection refused".into()))
    }

    async fn record_request(
        &self,
        _key: &str,
        _at: DateTime<Utc>,
        _window: Duration,
    ) -> Result<(), AppError> {
        Err(AppError::CacheError("connection refused".into()))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    records: Vec<CharacterRecord>,
    snapshots: Vec<StatSnapshot>,
    averages: Vec<ServerAverageStats>,
    rankings: HashMap<String, RankingSnapshot>,
    failing_servers: HashSet<String>,
    next_id: i64,
}

impl MemoryState {
    fn upsert(&mut self, character: &FetchedCharacter, at: DateTime<Utc>) -> CharacterRecord {
        let existing = self
            .records
            .iter()
            .position(|r| r.server == character.server && r.name == character.name);
        let record = match existing {
            Some(pos) => {
                let old = &self.records[pos];
                let mut record = CharacterRecord::unsaved(character.clone(), at);
                record.id = old.id;
                record.created_at = old.created_at;
                record.score = old.score.clone();
                if record.stats.is_none() {
                    record.stats = old.stats.clone();
                }
                self.records[pos] = record.clone();
                record
            }
            None => {
                self.next_id += 1;
                let mut record = CharacterRecord::unsaved(character.clone(), at);
                record.id = self.next_id;
                self.records.push(record.clone());
                record
            }
        };
        if let Some(stats) = &character.stats {
            self.snapshots.push(StatSnapshot {
                character_id: record.id,
                stats: stats.clone(),
                power: character.power,
                level: character.level,
                captured_at: at,
            });
        }
        record
    }

    fn set_score(&mut self, update: &ScoreUpdate) {
        if let Some(record) = self.records.iter_mut().find(|r| r.id == update.character_id) {
            record.score = Some(CharacterScore {
                power_index: update.power_index,
                contributions: update.contributions,
                tier_rank: update.tier_rank.clone(),
                percentile: update.percentile,
                scored_at: Utc::now(),
            });
        }
    }
}

/// In-memory [`CharacterStore`] + [`ScoringStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation returns a database error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Insert a character as if it had been fetched at `fetched_at`.
    pub fn seed(&self, character: FetchedCharacter, fetched_at: DateTime<Utc>) -> CharacterRecord {
        self.state.lock().unwrap().upsert(&character, fetched_at)
    }

    pub fn get(&self, server: &str, name: &str) -> Option<CharacterRecord> {
        let state = self.state.lock().unwrap();
        state
            .records
            .iter()
            .find(|r| r.server == server && r.name == name)
            .cloned()
    }

    pub fn snapshot_count(&self) -> usize {
        self.state.lock().unwrap().snapshots.len()
    }

    pub fn snapshot(&self, scope: &str) -> Option<RankingSnapshot> {
        self.state.lock().unwrap().rankings.get(scope).cloned()
    }

    pub fn averages_for(&self, server: &str) -> Option<ServerAverageStats> {
        let state = self.state.lock().unwrap();
        state.averages.iter().find(|a| a.server == server).cloned()
    }

    /// Make `apply_scores` fail for characters on `server`.
    pub fn fail_scores_for(&self, server: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_servers
            .insert(server.to_string());
    }

    fn check(&self) -> Result<(), AppError> {
        if self.failing {
            Err(AppError::DatabaseError("store unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl CharacterStore for MemoryStore {
    async fn get_character(
        &self,
        server: &str,
        name: &str,
    ) -> Result<Option<CharacterRecord>, AppError> {
        self.check()?;
        Ok(self.get(server, name))
    }

    async fn save_character(
        &self,
        character: &FetchedCharacter,
    ) -> Result<CharacterRecord, AppError> {
        self.check()?;
        Ok(self.state.lock().unwrap().upsert(character, Utc::now()))
    }

    async fn save_score(&self, update: &ScoreUpdate) -> Result<(), AppError> {
        self.check()?;
        self.state.lock().unwrap().set_score(update);
        Ok(())
    }

    async fn stat_history(
        &self,
        server: &str,
        name: &str,
        limit: usize,
    ) -> Result<Vec<StatSnapshot>, AppError> {
        self.check()?;
        let Some(record) = self.get(server, name) else {
            return Ok(Vec::new());
        };
        let state = self.state.lock().unwrap();
        Ok(state
            .snapshots
            .iter()
            .rev()
            .filter(|s| s.character_id == record.id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn server_averages(&self) -> Result<Vec<ServerAverageStats>, AppError> {
        self.check()?;
        Ok(self.state.lock().unwrap().averages.clone())
    }

    async fn power_indices(&self, server: &str) -> Result<Vec<i64>, AppError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.server == server)
            .filter_map(|r| r.score.as_ref().map(|s| s.power_index))
            .collect())
    }

    async fn ranking_snapshot(&self, scope: &str) -> Result<Option<RankingSnapshot>, AppError> {
        self.check()?;
        Ok(self.snapshot(scope))
    }

    async fn purge_synthetic(&self) -> Result<u64, AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let before = state.records.len();
        let removed: HashSet<i64> = state
            .records
            .iter()
            .filter(|r| r.is_synthetic)
            .map(|r| r.id)
            .collect();
        state.records.retain(|r| !r.is_synthetic);
        state.snapshots.retain(|s| !removed.contains(&s.character_id));
        Ok((before - state.records.len()) as u64)
    }
}

impl ScoringStore for MemoryStore {
    async fn scorable_characters(&self) -> Result<Vec<ScorableCharacter>, AppError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter_map(|r| {
                r.stats.as_ref().map(|stats| ScorableCharacter {
                    id: r.id,
                    server: r.server.clone(),
                    name: r.name.clone(),
                    stats: stats.clone(),
                })
            })
            .collect())
    }

    async fn replace_server_averages(&self, averages: &ServerAverageStats) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        state.averages.retain(|a| a.server != averages.server);
        state.averages.push(averages.clone());
        Ok(())
    }

    async fn apply_scores(&self, updates: &[ScoreUpdate]) -> Result<(), AppError> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        let blocked = updates.iter().any(|u| {
            state
                .records
                .iter()
                .any(|r| r.id == u.character_id && state.failing_servers.contains(&r.server))
        });
        if blocked {
            return Err(AppError::DatabaseError("deadlock detected".into()));
        }
        for update in updates {
            state.set_score(update);
        }
        Ok(())
    }

    async fn ranked_entries(&self, server: Option<&str>) -> Result<Vec<RankingEntry>, AppError> {
        self.check()?;
        let state = self.state.lock().unwrap();
        let mut entries: Vec<RankingEntry> = state
            .records
            .iter()
            .filter(|r| server.is_none_or(|s| r.server == s))
            .filter_map(|r| {
                r.score.as_ref().map(|score| RankingEntry {
                    rank: 0,
                    name: r.name.clone(),
                    server: r.server.clone(),
                    class_name: r.class_name.clone(),
                    level: r.level,
                    power: r.power,
                    power_index: score.power_index,
                    tier_rank: score.tier_rank.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| b.power_index.cmp(&a.power_index));
        Ok(entries)
    }

    async fn replace_ranking_snapshot(&self, snapshot: &RankingSnapshot) -> Result<(), AppError> {
        self.check()?;
        self.state
            .lock()
            .unwrap()
            .rankings
            .insert(snapshot.scope.clone(), snapshot.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockJobQueue
// ---------------------------------------------------------------------------

/// In-memory job queue that mirrors the database semantics.
#[derive(Clone, Default)]
pub struct MockJobQueue {
    jobs: Arc<Mutex<Vec<ScoringJob>>>,
    failed_jobs: Arc<Mutex<Vec<(Uuid, String, Option<DateTime<Utc>>)>>>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed_jobs(&self) -> Vec<(Uuid, String, Option<DateTime<Utc>>)> {
        self.failed_jobs.lock().unwrap().clone()
    }
}

impl JobQueue for MockJobQueue {
    async fn create_job(&self, request: CreateJobRequest) -> Result<ScoringJob, AppError> {
        let job = ScoringJob {
            id: Uuid::new_v4(),
            kind: request.kind,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(3),
            next_retry_at: None,
            error_message: None,
            report: None,
            worker_id: None,
        };
        self.jobs.lock().unwrap().push(job.clone());
        Ok(job)
    }

    async fn create_job_if_idle(
        &self,
        request: CreateJobRequest,
    ) -> Result<Option<ScoringJob>, AppError> {
        let active = self.jobs.lock().unwrap().iter().any(|j| {
            j.kind == request.kind && matches!(j.status, JobStatus::Pending | JobStatus::Running)
        });
        if active {
            return Ok(None);
        }
        self.create_job(request).await.map(Some)
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<ScoringJob>, AppError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(pos) = jobs.iter().position(|j| {
            j.status == JobStatus::Pending && j.next_retry_at.is_none_or(|at| at <= now)
        }) {
            jobs[pos].status = JobStatus::Running;
            jobs[pos].worker_id = Some(worker_id.to_string());
            jobs[pos].started_at = Some(now);
            Ok(Some(jobs[pos].clone()))
        } else {
            Ok(None)
        }
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        report: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            job.status = JobStatus::Completed;
            job.report = report;
            job.completed_at = Some(Utc::now());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.failed_jobs
            .lock()
            .unwrap()
            .push((job_id, error.to_string(), next_retry_at));

        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if next_retry_at.is_some() {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.next_retry_at = next_retry_at;
            } else {
                job.status = JobStatus::Failed;
            }
            job.error_message = Some(error.to_string());
            job.worker_id = None;
        }
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ScoringJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs.iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ScoringJob>, AppError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut released = 0;
        for job in jobs.iter_mut() {
            if job.worker_id.as_deref() == Some(worker_id) && job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.started_at = None;
                released += 1;
            }
        }
        Ok(released)
    }
}
