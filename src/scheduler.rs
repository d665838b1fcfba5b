use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::error::EngineError;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Handler = Arc<dyn Fn() -> BoxFuture + Send + Sync>;

/// A snapshot of one job's bookkeeping, returned by `GetJobs`/exposed over
/// `/admin/api/scheduler/jobs`.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cron: String,
    pub enabled: bool,
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<Result<(), String>>,
    pub next_run: Option<DateTime<Utc>>,
}

struct RegisteredJob {
    uuid: uuid::Uuid,
    name: String,
    description: String,
    cron: String,
    singleton: bool,
    enabled: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    last_run: Arc<Mutex<Option<DateTime<Utc>>>>,
    last_status: Arc<Mutex<Option<Result<(), String>>>>,
    handler: Handler,
}

/// Wraps `tokio_cron_scheduler::JobScheduler` with the bookkeeping it doesn't
/// provide out of the box: per-job enabled flags, singleton (no
/// overlapping-run) semantics, last-run/last-status tracking and a manual
/// trigger path that reuses the exact same handler the cron tick would run.
pub struct Scheduler {
    inner: JobScheduler,
    jobs: Arc<Mutex<HashMap<String, RegisteredJob>>>,
}

impl Scheduler {
    pub async fn new() -> anyhow::Result<Self> {
        let inner = JobScheduler::new().await?;
        Ok(Self {
            inner,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Registers a job under `id`, scheduling it on `cron` once `start()` is
    /// called. `singleton` jobs refuse to run concurrently with themselves;
    /// a cron tick or manual trigger arriving while one is in flight is
    /// dropped and logged rather than queued.
    pub async fn add_singleton_job<F, Fut>(
        &self,
        id: &str,
        name: &str,
        description: &str,
        cron: &str,
        singleton: bool,
        handler: F,
    ) -> anyhow::Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move || Box::pin(handler()));
        let enabled = Arc::new(AtomicBool::new(true));
        let running = Arc::new(AtomicBool::new(false));
        let last_run = Arc::new(Mutex::new(None));
        let last_status = Arc::new(Mutex::new(None));

        let job_enabled = enabled.clone();
        let job_running = running.clone();
        let job_last_run = last_run.clone();
        let job_last_status = last_status.clone();
        let job_handler = handler.clone();
        let job_id = id.to_string();

        let job = Job::new_async(cron, move |_uuid, _lock| {
            let enabled = job_enabled.clone();
            let running = job_running.clone();
            let last_run = job_last_run.clone();
            let last_status = job_last_status.clone();
            let handler = job_handler.clone();
            let job_id = job_id.clone();
            Box::pin(async move {
                run_once(&job_id, singleton, &enabled, &running, &last_run, &last_status, &handler).await;
            })
        })
        .map_err(map_scheduler_error)?;

        let uuid = self.inner.add(job).await.map_err(map_scheduler_error)?;

        self.jobs.lock().await.insert(
            id.to_string(),
            RegisteredJob {
                uuid,
                name: name.to_string(),
                description: description.to_string(),
                cron: cron.to_string(),
                singleton,
                enabled,
                running,
                last_run,
                last_status,
                handler,
            },
        );
        Ok(())
    }

    pub async fn run_job_now(&self, id: &str) -> anyhow::Result<()> {
        let jobs = self.jobs.lock().await;
        let job = jobs
            .get(id)
            .ok_or_else(|| EngineError::ValidationFailed(format!("unknown job: {id}")))?;

        if job.running.load(Ordering::SeqCst) && job.singleton {
            return Err(EngineError::ValidationFailed(format!("job {id} is already running")).into());
        }
        run_once(
            id,
            job.singleton,
            &job.enabled,
            &job.running,
            &job.last_run,
            &job.last_status,
            &job.handler,
        )
        .await;
        Ok(())
    }

    pub async fn enable(&self, id: &str) -> anyhow::Result<()> {
        let jobs = self.jobs.lock().await;
        let job = jobs
            .get(id)
            .ok_or_else(|| EngineError::ValidationFailed(format!("unknown job: {id}")))?;
        job.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn disable(&self, id: &str) -> anyhow::Result<()> {
        let jobs = self.jobs.lock().await;
        let job = jobs
            .get(id)
            .ok_or_else(|| EngineError::ValidationFailed(format!("unknown job: {id}")))?;
        job.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn get_jobs(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.lock().await;
        let mut statuses = Vec::with_capacity(jobs.len());
        for (id, job) in jobs.iter() {
            let next_run = self.inner.next_tick_for_job(job.uuid).await.ok().flatten();
            statuses.push(JobStatus {
                id: id.clone(),
                name: job.name.clone(),
                description: job.description.clone(),
                cron: job.cron.clone(),
                enabled: job.enabled.load(Ordering::SeqCst),
                running: job.running.load(Ordering::SeqCst),
                last_run: *job.last_run.lock().await,
                last_status: job.last_status.lock().await.clone(),
                next_run,
            });
        }
        statuses
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.inner.start().await.map_err(map_scheduler_error)?;
        Ok(())
    }

    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.map_err(map_scheduler_error)?;
        Ok(())
    }
}

async fn run_once(
    id: &str,
    singleton: bool,
    enabled: &AtomicBool,
    running: &AtomicBool,
    last_run: &Mutex<Option<DateTime<Utc>>>,
    last_status: &Mutex<Option<Result<(), String>>>,
    handler: &Handler,
) {
    if !enabled.load(Ordering::SeqCst) {
        info!("job {id} is disabled, skipping tick");
        return;
    }
    if singleton && running.swap(true, Ordering::SeqCst) {
        warn!("job {id} is already running, dropping this trigger");
        return;
    }
    if !singleton {
        running.store(true, Ordering::SeqCst);
    }

    info!("job {id} starting");
    *last_run.lock().await = Some(Utc::now());
    handler().await;
    *last_status.lock().await = Some(Ok(()));
    info!("job {id} finished");

    running.store(false, Ordering::SeqCst);
}

fn map_scheduler_error(err: JobSchedulerError) -> anyhow::Error {
    EngineError::Fatal(format!("scheduler error: {err}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn singleton_job_drops_overlapping_manual_trigger() {
        let scheduler = Scheduler::new().await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        scheduler
            .add_singleton_job("test", "test", "test job", "0 0 0 1 1 * 2099", true, move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        scheduler.run_job_now("test").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let statuses = scheduler.get_jobs().await;
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].last_run.is_some());
        assert!(!statuses[0].running);
    }

    #[tokio::test]
    async fn disabled_job_does_not_run_on_manual_trigger_skip() {
        let scheduler = Scheduler::new().await.unwrap();
        scheduler
            .add_singleton_job("noop", "noop", "noop job", "0 0 0 1 1 * 2099", false, || async {})
            .await
            .unwrap();
        scheduler.disable("noop").await.unwrap();
        let statuses = scheduler.get_jobs().await;
        assert!(!statuses[0].enabled);
    }

    #[tokio::test]
    async fn unknown_job_errors() {
        let scheduler = Scheduler::new().await.unwrap();
        assert!(scheduler.run_job_now("missing").await.is_err());
    }
}
