use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of the periodic power/rank batch.
pub const SCORING_BATCH_KIND: &str = "power_rank_batch";

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Backoff for failed batch runs: 1min, 2min, 4min, ... capped.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: TimeDelta,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: TimeDelta::minutes(1),
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0 for the first retry).
    pub fn delay_for_retry(&self, retry: u32) -> TimeDelta {
        let factor = 2i32.saturating_pow(retry.min(30));
        let delay = self.base_delay.checked_mul(factor).unwrap_or(self.max_delay);
        std::cmp::min(delay, self.max_delay)
    }
}

/// A queued batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringJob {
    pub id: Uuid,
    pub kind: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub report: Option<serde_json::Value>,
    pub worker_id: Option<String>,
}

impl ScoringJob {
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn calculate_next_retry(&self, config: &RetryConfig) -> DateTime<Utc> {
        Utc::now() + config.delay_for_retry(self.retry_count)
    }
}

/// Request to enqueue a job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub kind: String,
    pub max_retries: Option<u32>,
}

impl CreateJobRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            max_retries: None,
        }
    }

    pub fn scoring_batch() -> Self {
        Self::new(SCORING_BATCH_KIND)
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = Some(max);
        self
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub retry_config: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval: Duration::from_secs(5),
            retry_config: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(retry_count: u32, max_retries: u32) -> ScoringJob {
        ScoringJob {
            id: Uuid::new_v4(),
            kind: SCORING_BATCH_KIND.into(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count,
            max_retries,
            next_retry_at: None,
            error_message: None,
            report: None,
            worker_id: None,
        }
    }

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_backoff_doubles_from_one_minute() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_retry(0), TimeDelta::minutes(1));
        assert_eq!(config.delay_for_retry(1), TimeDelta::minutes(2));
        assert_eq!(config.delay_for_retry(2), TimeDelta::minutes(4));
        assert_eq!(config.delay_for_retry(10), TimeDelta::minutes(60));
        assert_eq!(config.delay_for_retry(u32::MAX), TimeDelta::minutes(60));
    }

    #[test]
    fn test_can_retry() {
        assert!(job(0, 3).can_retry());
        assert!(job(2, 3).can_retry());
        assert!(!job(3, 3).can_retry());
    }

    #[test]
    fn test_next_retry_is_in_the_future() {
        let next = job(1, 3).calculate_next_retry(&RetryConfig::default());
        let delta = next - Utc::now();
        assert!(delta > TimeDelta::seconds(100) && delta <= TimeDelta::minutes(2));
    }
}
