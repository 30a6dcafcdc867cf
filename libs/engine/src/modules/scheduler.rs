//! `scheduler.cron` - cron job scheduler module
//!
//! Jobs register during workflow wiring; each job gets its own task that
//! sleeps until the next cron fire time.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use weft_core::{Application, LifecycleError, Module};

use crate::plugin::ModuleFactoryRegistry;

pub(crate) fn register(registry: &mut ModuleFactoryRegistry) {
    registry.register("scheduler.cron", |config| {
        Ok(Arc::new(SchedulerModule {
            name: config.name.clone(),
            scheduler: Arc::new(CronScheduler::default()),
        }))
    });
}

/// A schedulable unit of work
#[async_trait]
pub trait Job: Send + Sync {
    /// Run one firing
    async fn execute(&self) -> Result<(), String>;
}

struct ScheduledJob {
    schedule: Schedule,
    spec: String,
    job: Arc<dyn Job>,
}

/// Scheduler service registered under the module's name
#[derive(Default)]
pub struct CronScheduler {
    jobs: Mutex<Vec<Arc<ScheduledJob>>>,
}

impl CronScheduler {
    /// Register a job under a cron spec
    ///
    /// Specs use the 6/7-field cron syntax with seconds, e.g.
    /// `"0 */5 * * * *"`.
    pub fn add_job(&self, spec: &str, job: Arc<dyn Job>) -> Result<(), String> {
        let schedule =
            Schedule::from_str(spec).map_err(|err| format!("bad cron spec '{spec}': {err}"))?;
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.push(Arc::new(ScheduledJob {
            schedule,
            spec: spec.to_string(),
            job,
        }));
        Ok(())
    }

    /// Number of registered jobs
    #[must_use]
    pub fn job_count(&self) -> usize {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.len()
    }

    fn spawn_all(&self, shutdown: &CancellationToken) {
        let jobs = {
            let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            jobs.clone()
        };
        for entry in jobs {
            let shutdown = shutdown.clone();
            tokio::spawn(run_job(entry, shutdown));
        }
    }
}

async fn run_job(entry: Arc<ScheduledJob>, shutdown: CancellationToken) {
    loop {
        let Some(next) = entry.schedule.upcoming(Utc).next() else {
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(wait) => {}
        }

        if let Err(err) = entry.job.execute().await {
            tracing::warn!(spec = %entry.spec, error = %err, "scheduled job failed");
        }
    }
}

/// Scheduler module
pub struct SchedulerModule {
    name: String,
    scheduler: Arc<CronScheduler>,
}

#[async_trait]
impl Module for SchedulerModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&self, app: &Application) -> Result<(), LifecycleError> {
        app.registry()
            .register(&self.name, self.scheduler.clone())
            .map_err(LifecycleError::Registry)?;
        Ok(())
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), LifecycleError> {
        self.scheduler.spawn_all(&shutdown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingJob(Arc<AtomicU32>);

    #[async_trait]
    impl Job for CountingJob {
        async fn execute(&self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_bad_cron_spec_rejected() {
        let scheduler = CronScheduler::default();
        let err = scheduler
            .add_job("whenever", Arc::new(CountingJob(Arc::new(AtomicU32::new(0)))))
            .unwrap_err();
        assert!(err.contains("whenever"));
    }

    #[tokio::test]
    async fn test_every_second_job_fires() {
        let scheduler = CronScheduler::default();
        let count = Arc::new(AtomicU32::new(0));
        scheduler
            .add_job("* * * * * *", Arc::new(CountingJob(count.clone())))
            .unwrap();

        let shutdown = CancellationToken::new();
        scheduler.spawn_all(&shutdown);

        let mut fired = false;
        for _ in 0..30 {
            if count.load(Ordering::SeqCst) > 0 {
                fired = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        shutdown.cancel();
        assert!(fired, "job never fired");
    }
}
