use chrono::{TimeDelta, Utc};
use tierwatch_core::job::{CreateJobRequest, JobStatus, SCORING_BATCH_KIND};
use tierwatch_core::job_queue::JobQueue;
use tierwatch_db::ScoringJobRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn create_job_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let job = repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();

    assert_eq!(job.kind, SCORING_BATCH_KIND);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 3);
    assert!(job.worker_id.is_none());
    assert!(job.report.is_none());
}

#[tokio::test]
async fn create_job_with_custom_max_retries() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let job = repo
        .create_job(CreateJobRequest::scoring_batch().with_max_retries(7))
        .await
        .unwrap();

    assert_eq!(job.max_retries, 7);
}

#[tokio::test]
async fn create_if_idle_skips_while_a_run_is_active() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let first = repo
        .create_job_if_idle(CreateJobRequest::scoring_batch())
        .await
        .unwrap();
    assert!(first.is_some());

    let second = repo
        .create_job_if_idle(CreateJobRequest::scoring_batch())
        .await
        .unwrap();
    assert!(second.is_none());

    let other_kind = repo
        .create_job_if_idle(CreateJobRequest::new("other"))
        .await
        .unwrap();
    assert!(other_kind.is_some());

    let job = repo.claim_job("worker-1").await.unwrap().unwrap();
    assert_eq!(job.kind, SCORING_BATCH_KIND);
    repo.complete_job(job.id, None).await.unwrap();

    let third = repo
        .create_job_if_idle(CreateJobRequest::scoring_batch())
        .await
        .unwrap();
    assert!(third.is_some());
}

#[tokio::test]
async fn concurrent_schedulers_create_one_job() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let (a, b) = tokio::join!(
        repo.create_job_if_idle(CreateJobRequest::scoring_batch()),
        repo.create_job_if_idle(CreateJobRequest::scoring_batch()),
    );

    let created = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn claim_job_sets_running_and_worker() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();

    let claimed = repo
        .claim_job("worker-1")
        .await
        .unwrap()
        .expect("Should claim the job");

    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());
    assert!(repo.claim_job("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn complete_job_stores_report() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let job = repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();

    let report = serde_json::json!({"scored": 12, "servers": 2});
    repo.complete_job(job.id, Some(report.clone())).await.unwrap();

    let done = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.completed_at.is_some());
    assert!(done.worker_id.is_none());
    assert_eq!(done.report, Some(report));
}

#[tokio::test]
async fn fail_job_with_retry_returns_to_pending() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let job = repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();

    let retry_at = Utc::now() + TimeDelta::minutes(5);
    repo.fail_job(job.id, "database unavailable", Some(retry_at))
        .await
        .unwrap();

    let failed = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Pending);
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.error_message.as_deref(), Some("database unavailable"));
    assert!(failed.next_retry_at.is_some());
    assert!(failed.worker_id.is_none());

    // Not claimable until the backoff elapses.
    assert!(repo.claim_job("worker-2").await.unwrap().is_none());
}

#[tokio::test]
async fn fail_job_without_retry_is_terminal() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let job = repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.fail_job(job.id, "gave up", None).await.unwrap();

    let failed = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.retry_count, 0);
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn list_jobs_filters_by_status() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let a = repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();
    repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();
    repo.complete_job(a.id, None).await.unwrap();

    assert_eq!(repo.list_jobs(None, 10).await.unwrap().len(), 2);
    let pending = repo.list_jobs(Some(JobStatus::Pending), 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(repo.list_jobs(None, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn release_worker_jobs_returns_them_to_the_queue() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    let job = repo.create_job(CreateJobRequest::scoring_batch()).await.unwrap();
    repo.claim_job("worker-1").await.unwrap();

    assert_eq!(repo.release_worker_jobs("worker-2").await.unwrap(), 0);
    assert_eq!(repo.release_worker_jobs("worker-1").await.unwrap(), 1);

    let released = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(released.status, JobStatus::Pending);
    assert!(released.worker_id.is_none());
    assert!(repo.claim_job("worker-2").await.unwrap().is_some());
}

#[tokio::test]
async fn get_unknown_job_returns_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScoringJobRepository::new(pool);

    assert!(repo.get_job(uuid::Uuid::new_v4()).await.unwrap().is_none());
}
