//! Bounded-concurrency job runner.
//!
//! The job table is the single source of truth. A drain task claims pending
//! jobs in FIFO order whenever a concurrency slot is free and no other job
//! of the same repository is processing, and runs each on its own task.
//! Wakeups come from enqueue and job completion; nothing polls.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, watch, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::errors::{SondeError, SondeResult};
use crate::jobs::handler::{JobContext, JobHandler};
use crate::jobs::{merge_payload, JobEvent, JobSnapshot, JobSpec, JobStatus};

const EVENT_CAPACITY: usize = 1024;

/// In-flight progress never reaches 100; only completion writes it.
const MAX_IN_FLIGHT_PROGRESS: i64 = 99;

struct Inner {
    config: OrchestratorConfig,
    jobs: RwLock<IndexMap<String, JobSnapshot>>,
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
    slots: Arc<Semaphore>,
    wake: Notify,
    events: broadcast::Sender<JobEvent>,
    shutdown: watch::Sender<bool>,
    started: AtomicBool,
}

impl Inner {
    fn publish(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Move the oldest eligible pending job to `processing`.
    fn claim_next(&self) -> Option<JobSnapshot> {
        let mut jobs = self.jobs.write();
        let busy: Vec<String> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| j.repository_id.clone())
            .collect();
        let job = jobs
            .values_mut()
            .find(|j| j.status == JobStatus::Pending && !busy.contains(&j.repository_id))?;
        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        job.progress = 0;
        let claimed = job.clone();
        drop(jobs);
        self.publish(JobEvent::Started {
            job_id: claimed.id.clone(),
        });
        Some(claimed)
    }

    fn finish(&self, job_id: &str, outcome: SondeResult<()>) {
        let event = {
            let mut jobs = self.jobs.write();
            let job = match jobs.get_mut(job_id) {
                Some(job) if job.status == JobStatus::Processing => job,
                _ => return,
            };
            job.completed_at = Some(Utc::now());
            match outcome {
                Ok(()) => {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    info!(job_id, repository_id = %job.repository_id, "job completed");
                    JobEvent::Completed {
                        job_id: job_id.to_string(),
                    }
                }
                Err(err) => {
                    let message = err.to_string();
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    error!(job_id, repository_id = %job.repository_id, error = %message, "job failed");
                    JobEvent::Failed {
                        job_id: job_id.to_string(),
                        error: message,
                    }
                }
            }
        };
        self.publish(event);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Cheap to clone; all clones share one job table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                jobs: RwLock::new(IndexMap::new()),
                handlers: RwLock::new(HashMap::new()),
                slots: Arc::new(Semaphore::new(concurrency)),
                wake: Notify::new(),
                events,
                shutdown,
                started: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Spawn the drain and sweep tasks on the current tokio runtime.
    /// Calling it again is a no-op.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = self.inner.clone();
        let shutdown = self.inner.shutdown.subscribe();
        tokio::spawn(drain_loop(inner, shutdown));

        let this = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let period = self
            .inner
            .config
            .sweep_interval
            .max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = this.sweep_expired();
                        if evicted > 0 {
                            debug!(evicted, "swept expired jobs");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });
        info!(
            concurrency = self.inner.config.concurrency,
            "orchestrator started"
        );
    }

    /// Stop draining. Jobs already processing run to completion; pending
    /// jobs stay pending.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    /// One handler per job type; a later registration replaces the earlier one.
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        if self
            .inner
            .handlers
            .write()
            .insert(job_type.clone(), handler)
            .is_some()
        {
            debug!(job_type = %job_type, "replaced job handler");
        }
    }

    pub fn enqueue(&self, spec: JobSpec) -> String {
        let id = Uuid::new_v4().to_string();
        let job = JobSnapshot {
            id: id.clone(),
            job_type: spec.job_type,
            repository_id: spec.repository_id,
            status: JobStatus::Pending,
            progress: 0,
            data: spec.payload,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let repository_id = job.repository_id.clone();
        debug!(job_id = %id, job_type = %job.job_type, repository_id = %repository_id, "job enqueued");
        self.inner.jobs.write().insert(id.clone(), job);
        self.inner.publish(JobEvent::Enqueued {
            job_id: id.clone(),
            repository_id,
        });
        self.inner.wake.notify_one();
        id
    }

    /// Record progress for a processing job, clamped into [0, 99] and never
    /// below the current value. `extra` is merged into the job's data.
    /// Returns `false` if the job is unknown or not processing.
    pub fn update_progress(&self, job_id: &str, value: i64, extra: Option<Value>) -> bool {
        let changed = {
            let mut jobs = self.inner.jobs.write();
            let job = match jobs.get_mut(job_id) {
                Some(job) if job.status == JobStatus::Processing => job,
                _ => return false,
            };
            let clamped = value.clamp(0, MAX_IN_FLIGHT_PROGRESS) as u8;
            let next = clamped.max(job.progress);
            let changed = next != job.progress;
            job.progress = next;
            if let Some(extra) = extra {
                merge_payload(&mut job.data, extra);
            }
            changed.then_some(next)
        };
        if let Some(progress) = changed {
            self.inner.publish(JobEvent::Progress {
                job_id: job_id.to_string(),
                progress,
            });
        }
        true
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobSnapshot> {
        self.inner.jobs.read().get(job_id).cloned()
    }

    pub fn jobs_for_repository(&self, repository_id: &str) -> Vec<JobSnapshot> {
        self.inner
            .jobs
            .read()
            .values()
            .filter(|j| j.repository_id == repository_id)
            .cloned()
            .collect()
    }

    pub fn processing_count(&self) -> usize {
        self.inner
            .jobs
            .read()
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .count()
    }

    /// Fail a job that has not started yet. Returns `false` otherwise.
    pub fn cancel(&self, job_id: &str) -> bool {
        {
            let mut jobs = self.inner.jobs.write();
            let job = match jobs.get_mut(job_id) {
                Some(job) if job.status == JobStatus::Pending => job,
                _ => return false,
            };
            job.status = JobStatus::Failed;
            job.error = Some(SondeError::Cancelled.to_string());
            job.completed_at = Some(Utc::now());
        }
        info!(job_id, "job cancelled");
        self.inner.publish(JobEvent::Failed {
            job_id: job_id.to_string(),
            error: SondeError::Cancelled.to_string(),
        });
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Resolve once the job is terminal.
    pub async fn wait(&self, job_id: &str) -> SondeResult<JobSnapshot> {
        let mut events = self.subscribe();
        loop {
            match self.get_job(job_id) {
                Some(job) if job.status.is_terminal() => return Ok(job),
                Some(_) => {}
                None => return Err(SondeError::UnknownJob(job_id.to_string())),
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SondeError::Task("event channel closed".to_string()))
                }
            }
        }
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    /// Evict terminal jobs that completed more than the retention window
    /// before `now`. Candidates are picked from a read snapshot and
    /// re-checked under the write lock.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let retention = match chrono::Duration::from_std(self.inner.config.retention) {
            Ok(d) => d,
            Err(_) => return 0,
        };
        let is_expired = |job: &JobSnapshot| {
            job.status.is_terminal()
                && job
                    .completed_at
                    .is_some_and(|done| now.signed_duration_since(done) > retention)
        };
        let candidates: Vec<String> = self
            .inner
            .jobs
            .read()
            .values()
            .filter(|j| is_expired(j))
            .map(|j| j.id.clone())
            .collect();
        if candidates.is_empty() {
            return 0;
        }
        let mut jobs = self.inner.jobs.write();
        let mut evicted = 0;
        for id in candidates {
            if jobs.get(&id).is_some_and(|j| is_expired(j)) {
                jobs.shift_remove(&id);
                evicted += 1;
            }
        }
        evicted
    }
}

async fn drain_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let permit = tokio::select! {
            permit = inner.slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown.changed() => break,
        };
        let job = loop {
            if let Some(job) = inner.claim_next() {
                break Some(job);
            }
            tokio::select! {
                _ = inner.wake.notified() => {}
                _ = shutdown.changed() => break None,
            }
        };
        match job {
            Some(job) => dispatch(inner.clone(), job, permit),
            None => break,
        }
    }
    debug!("drain loop stopped");
}

fn dispatch(inner: Arc<Inner>, job: JobSnapshot, permit: OwnedSemaphorePermit) {
    tokio::spawn(async move {
        let handler = inner.handlers.read().get(&job.job_type).cloned();
        let job_id = job.id.clone();
        let outcome = match handler {
            None => {
                warn!(job_id = %job_id, job_type = %job.job_type, "no handler registered");
                Err(SondeError::NoHandler(job.job_type.clone()))
            }
            Some(handler) => {
                let ctx = JobContext::new(
                    job_id.clone(),
                    Orchestrator {
                        inner: inner.clone(),
                    },
                );
                // A separate task so a panicking handler surfaces as a JoinError.
                let run = tokio::spawn(async move { handler.handle(job, ctx).await });
                match run.await {
                    Ok(result) => result,
                    Err(err) if err.is_panic() => {
                        Err(SondeError::Task(panic_message(err.into_panic())))
                    }
                    Err(err) => Err(SondeError::from(err)),
                }
            }
        };
        inner.finish(&job_id, outcome);
        drop(permit);
        // A job of the same repository may now be claimable.
        inner.wake.notify_one();
    });
}
