//! The contract between the orchestrator and the work it dispatches.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SondeResult;
use crate::jobs::orchestrator::Orchestrator;
use crate::jobs::JobSnapshot;

/// Executes one job type. An `Err` (or a panic) fails the job with the
/// error's message; `Ok` completes it.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: JobSnapshot, ctx: JobContext) -> SondeResult<()>;
}

/// Handle given to a running job for reporting back to the orchestrator.
#[derive(Clone)]
pub struct JobContext {
    job_id: String,
    orchestrator: Orchestrator,
}

impl JobContext {
    pub(crate) fn new(job_id: String, orchestrator: Orchestrator) -> Self {
        Self {
            job_id,
            orchestrator,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn progress(&self, value: i64) {
        self.orchestrator.update_progress(&self.job_id, value, None);
    }

    pub fn progress_with(&self, value: i64, extra: Value) {
        self.orchestrator
            .update_progress(&self.job_id, value, Some(extra));
    }
}

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobSnapshot, JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = SondeResult<()>> + Send + 'static,
{
    async fn handle(&self, job: JobSnapshot, ctx: JobContext) -> SondeResult<()> {
        (self.0)(job, ctx).await
    }
}

pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobSnapshot, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SondeResult<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
