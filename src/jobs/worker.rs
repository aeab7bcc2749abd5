//! Bounded worker pool dispatching claimed jobs to the notification/event
//! registries (§4.9, §5).
//!
//! Grounded on the teacher's `kernel/jobs/worker.rs` (`JobWorker` +
//! `running_jobs: Arc<RwLock<HashMap<…>>>`, graceful-shutdown drain) and
//! `manager.rs`'s `TriggerJobs`-style wakeup, adapted from OS threads + a bounded
//! channel to `tokio` tasks + a shared `Notify` — the async analogue of the same
//! backpressure property (§5: "at most `concurrency` jobs are in flight").

use super::event_registry::EventRegistry;
use super::model::JobKind;
use super::store::PostgresJobStore;
use crate::notification::NotificationRegistry;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct JobWorkerPoolConfig {
    /// `pipelineConcurrency` (§4.9): at most this many jobs in flight at once.
    pub concurrency: usize,
    /// Heartbeat period for scheduled jobs becoming due with no explicit trigger.
    pub heartbeat: Duration,
}

impl Default for JobWorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            heartbeat: Duration::from_secs(5),
        }
    }
}

pub struct JobWorkerPool {
    store: Arc<PostgresJobStore>,
    notifications: Arc<NotificationRegistry>,
    events: Arc<EventRegistry>,
    config: JobWorkerPoolConfig,
    trigger: Arc<Notify>,
}

impl JobWorkerPool {
    pub fn new(
        store: Arc<PostgresJobStore>,
        notifications: Arc<NotificationRegistry>,
        events: Arc<EventRegistry>,
        config: JobWorkerPoolConfig,
    ) -> Self {
        Self {
            store,
            notifications,
            events,
            config,
            trigger: Arc::new(Notify::new()),
        }
    }

    /// `TriggerJobs()` (§4.9): invoked automatically by every successful mutation
    /// that has a registered notification handler, to wake a worker immediately
    /// rather than waiting for the next heartbeat.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Spawn `concurrency` worker tasks, each independently polling `claim_next`
    /// in a tight loop while jobs are available, and otherwise waiting on either
    /// the shared trigger or the heartbeat timer.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.concurrency.max(1))
            .map(|worker_index| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_worker(worker_index, shutdown).await })
            })
            .collect()
    }

    async fn run_worker(&self, worker_index: usize, shutdown: CancellationToken) {
        tracing::info!(worker_index, "job worker starting");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.store.claim_next().await {
                Ok(Some(job)) => {
                    self.process_job(job).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "failed to claim job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.trigger.notified() => {}
                _ = tokio::time::sleep(self.config.heartbeat) => {}
            }
        }
        tracing::info!(worker_index, "job worker stopped");
    }

    async fn dispatch(&self, job: &super::model::Job) -> Result<(), crate::error::KurbisioError> {
        match job.job {
            JobKind::Notification => match crate::model::config_doc::Operation::from_str(&job.r#type) {
                Ok(op) => {
                    self.notifications
                        .dispatch(&job.resource, op, job.payload.clone())
                        .await
                }
                Err(e) => Err(crate::error::KurbisioError::JobHandler(e.to_string())),
            },
            JobKind::Event | JobKind::QueuedEvent => {
                self.events.dispatch(&job.r#type, job.payload.clone()).await
            }
        }
    }

    /// A handler isn't forcibly cancelled on a timeout (§5), but a watchdog logs once
    /// it has run past 20s -- `tokio::time::timeout` racing a no-op future never
    /// resolving is what actually ticks the clock here.
    async fn process_job(&self, job: super::model::Job) {
        let serial = job.serial;
        let dispatch = self.dispatch(&job);
        tokio::pin!(dispatch);

        let result = tokio::select! {
            result = &mut dispatch => result,
            _ = tokio::time::timeout(Duration::from_secs(20), std::future::pending::<()>()) => {
                tracing::warn!(serial, "job {serial} taking a long time");
                dispatch.await
            }
        };

        match result {
            Ok(()) => {
                if let Err(e) = self.store.mark_succeeded(serial).await {
                    tracing::error!(serial, error = %e, "failed to mark job succeeded");
                }
            }
            Err(e) => {
                tracing::warn!(serial, error = %e, "job handler failed, retry scheduled by backoff");
                if let Err(e) = self.store.mark_failed(serial).await {
                    tracing::error!(serial, error = %e, "failed to record job failure");
                }
            }
        }
    }
}
