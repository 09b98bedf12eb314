use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::batch::{BatchReport, BatchScorer};
use crate::config::BatchConfig;
use crate::error::AppError;
use crate::job::{CreateJobRequest, ScoringJob, WorkerConfig};
use crate::job_queue::JobQueue;
use crate::traits::ScoringStore;

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a ScoringJob,
    },
    JobCompleted {
        job_id: Uuid,
        report: &'a BatchReport,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, kind = %job.kind, retry = job.retry_count, "Job claimed");
            }
            WorkerEvent::JobCompleted { job_id, report } => {
                tracing::info!(
                    %job_id,
                    processed = report.processed,
                    failed = report.failed,
                    servers = report.servers,
                    "Job completed"
                );
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, %error, %will_retry, "Job failed");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(%worker_id, %jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker that polls the job queue and runs scoring batches.
pub struct WorkerService<Q, S>
where
    Q: JobQueue,
    S: ScoringStore,
{
    queue: Q,
    scorer: BatchScorer<S>,
    config: WorkerConfig,
}

impl<Q, S> WorkerService<Q, S>
where
    Q: JobQueue,
    S: ScoringStore,
{
    pub fn new(queue: Q, store: S, batch: BatchConfig, config: WorkerConfig) -> Self {
        Self {
            queue,
            scorer: BatchScorer::new(store, batch),
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AppError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.queue.claim_job(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        let released = self
            .queue
            .release_worker_jobs(&self.config.worker_id)
            .await
            .unwrap_or(0);

        reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released: released,
        });
        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    async fn process_job<WR: WorkerReporter>(&self, job: &ScoringJob, reporter: &WR) {
        match self.scorer.run().await {
            Ok(report) => {
                reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    report: &report,
                });
                let report_json = serde_json::to_value(&report).ok();
                if let Err(e) = self.queue.complete_job(job.id, report_json).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
            }
            Err(e) => {
                let error_msg = e.to_string();
                let can_retry = job.can_retry();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error_msg,
                    will_retry: can_retry,
                });

                let next_retry = if can_retry {
                    Some(job.calculate_next_retry(&self.config.retry_config))
                } else {
                    None
                };

                if let Err(e) = self.queue.fail_job(job.id, &error_msg, next_retry).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to mark job as failed");
                }
            }
        }
    }
}

/// Enqueues a scoring batch on a fixed cadence.
///
/// Enqueueing is idempotent: a tick is skipped while a batch is still
/// pending or running.
pub struct BatchScheduler<Q: JobQueue> {
    queue: Q,
    interval: Duration,
}

impl<Q: JobQueue> BatchScheduler<Q> {
    pub fn new(queue: Q, interval: Duration) -> Self {
        Self { queue, interval }
    }

    /// Enqueue now if idle. Returns whether a job was created.
    pub async fn tick(&self) -> Result<bool, AppError> {
        match self
            .queue
            .create_job_if_idle(CreateJobRequest::scoring_batch())
            .await?
        {
            Some(job) => {
                tracing::info!(job_id = %job.id, "Scheduled scoring batch");
                Ok(true)
            }
            None => {
                tracing::debug!("Scoring batch already queued, skipping tick");
                Ok(false)
            }
        }
    }

    /// Tick immediately, then every `interval`, until cancelled.
    pub async fn run(&self, cancel_token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Failed to schedule scoring batch");
                    }
                }
                () = cancel_token.cancelled() => break,
            }
        }
        tracing::info!("Batch scheduler stopped");
    }
}
