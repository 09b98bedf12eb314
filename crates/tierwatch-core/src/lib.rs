pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod job;
pub mod job_queue;
pub mod listing;
pub mod models;
pub mod rate_limit;
pub mod resolver;
pub mod retry;
pub mod scoring;
pub mod source;
pub mod synthetic;
pub mod traits;
pub mod worker;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use batch::{BatchReport, BatchScorer};
pub use cache::{MokaCacheBackend, ResponseCache};
pub use config::{BatchConfig, ResolverConfig, ServerDirectory, SourceKind, UpstreamConfig};
pub use error::AppError;
pub use job::{CreateJobRequest, JobStatus, ScoringJob, WorkerConfig};
pub use job_queue::JobQueue;
pub use listing::{ListingOutcome, ListingQuery, ListingRow};
pub use models::{
    Advisory, CharacterRecord, FetchedCharacter, Origin, RankingEntry, RankingSnapshot, Resolved,
    StatBundle, StatSnapshot,
};
pub use rate_limit::{MemoryRateLimitStore, RateLimiter};
pub use resolver::ResolutionService;
pub use retry::{RetryPolicy, RetryingFetcher};
pub use source::{Endpoints, LiveSource, SelectedSource};
pub use synthetic::SyntheticSource;
pub use traits::{
    CacheBackend, CharacterParser, CharacterSource, CharacterStore, Fetcher, RateLimitStore,
    ScoringStore,
};
pub use worker::{BatchScheduler, TracingWorkerReporter, WorkerReporter, WorkerService};
