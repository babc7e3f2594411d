//! Background job execution for `_async` calls
//!
//! `submit` spawns the handler on the runtime and returns a handle at once.
//! Jobs get their own cancellation token; they are never tied to the
//! request that started them. Finished jobs are dropped from the table
//! once their expiry interval has passed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{RcError, Result};
use crate::metrics;
use crate::rc::registry::{CallContext, Handler};
use crate::rc::Params;

/// Accepts work to run in the background
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start `handler` with `params` and return the job handle without waiting
    async fn submit(&self, path: &str, handler: Arc<dyn Handler>, params: Params) -> Result<Params>;
}

/// State of one background job
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: u64,
    pub path: String,
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub finished: bool,
    pub success: bool,
    pub error: String,
    /// Seconds from start to end
    pub duration: f64,
    pub output: Option<Params>,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl Job {
    fn finish(&mut self, result: Result<Option<Params>>) {
        let end = Utc::now();
        self.end_time = Some(end);
        self.duration = (end - self.start_time).num_milliseconds() as f64 / 1000.0;
        self.finished = true;
        match result {
            Ok(out) => {
                self.success = true;
                self.output = Some(out.unwrap_or_default());
            }
            Err(e) => {
                self.success = false;
                self.error = e.to_string();
            }
        }
    }
}

/// How long a finished job stays queryable unless configured otherwise
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(60);

/// In-process job table backed by tokio tasks
///
/// Cheap to clone; clones share the same table.
#[derive(Debug, Clone)]
pub struct JobQueue {
    next_id: Arc<AtomicU64>,
    jobs: Arc<RwLock<BTreeMap<u64, Job>>>,
    max_running: Option<usize>,
    expire: Duration,
}

impl JobQueue {
    pub fn new(max_running: Option<usize>) -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            jobs: Arc::new(RwLock::new(BTreeMap::new())),
            max_running,
            expire: DEFAULT_EXPIRE,
        }
    }

    /// Keep finished jobs for `expire` before removing them
    pub fn with_expiry(mut self, expire: Duration) -> Self {
        self.expire = expire;
        self
    }

    /// Snapshot of a job's state
    pub async fn status(&self, id: u64) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RcError::Job(format!("job {} not found", id)))
    }

    /// Ids of all known jobs, ascending
    pub async fn ids(&self) -> Vec<u64> {
        self.jobs.read().await.keys().copied().collect()
    }

    /// Request cancellation of a running job
    pub async fn stop(&self, id: u64) -> Result<()> {
        let jobs = self.jobs.read().await;
        let job = jobs
            .get(&id)
            .ok_or_else(|| RcError::Job(format!("job {} not found", id)))?;
        info!(jobid = id, "rc: stopping job");
        job.cancel.cancel();
        Ok(())
    }
}

#[async_trait]
impl Scheduler for JobQueue {
    async fn submit(&self, path: &str, handler: Arc<dyn Handler>, params: Params) -> Result<Params> {
        let mut jobs = self.jobs.write().await;
        if let Some(max) = self.max_running {
            if jobs.values().filter(|j| !j.finished).count() >= max {
                return Err(RcError::Job(format!("too many running jobs (max {})", max)));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let job = Job {
            id,
            path: path.to_string(),
            start_time: Utc::now(),
            end_time: None,
            finished: false,
            success: false,
            error: String::new(),
            duration: 0.0,
            output: None,
            cancel: cancel.clone(),
        };
        jobs.insert(id, job);
        drop(jobs);
        metrics::JOBS_STARTED.inc();
        debug!(jobid = id, path, "rc: job started");

        let jobs = Arc::clone(&self.jobs);
        let expire = self.expire;
        let ctx = CallContext::new(path, cancel.clone());
        tokio::spawn(async move {
            let result = tokio::select! {
                r = handler.call(ctx, params) => r,
                _ = cancel.cancelled() => Err(RcError::Job("job cancelled".to_string())),
            };
            if let Err(e) = &result {
                warn!(jobid = id, error = %e, "rc: job failed");
            }
            if let Some(job) = jobs.write().await.get_mut(&id) {
                job.finish(result);
            }

            tokio::time::sleep(expire).await;
            if jobs.write().await.remove(&id).is_some() {
                debug!(jobid = id, "rc: job expired");
            }
        });

        Ok([("jobid", json!(id)), ("finished", json!(false))]
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rc::registry::FnHandler;

    fn handler<F, Fut>(f: F) -> Arc<dyn Handler>
    where
        F: Fn(CallContext, Params) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Option<Params>>> + Send + 'static,
    {
        Arc::new(FnHandler::new(f))
    }

    async fn wait_finished(queue: &JobQueue, id: u64) -> Job {
        for _ in 0..100 {
            let job = queue.status(id).await.unwrap();
            if job.finished {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[tokio::test]
    async fn test_submit_returns_before_completion() {
        let queue = JobQueue::new(None);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = Arc::new(tokio::sync::Mutex::new(Some(rx)));
        let h = handler(move |_ctx, params| {
            let rx = rx.clone();
            async move {
                if let Some(rx) = rx.lock().await.take() {
                    let _ = rx.await;
                }
                Ok(Some(params))
            }
        });

        let input: Params = [("a", "b")].into_iter().collect();
        let handle = queue.submit("test/slow", h, input.clone()).await.unwrap();
        let id = handle.get_i64("jobid").unwrap() as u64;
        assert!(!queue.status(id).await.unwrap().finished);

        tx.send(()).unwrap();
        let job = wait_finished(&queue, id).await;
        assert!(job.success);
        assert_eq!(job.output, Some(input));
    }

    #[tokio::test]
    async fn test_failed_job_records_error() {
        let queue = JobQueue::new(None);
        let h = handler(|_, _| async { Err(RcError::Operation("boom".into())) });
        let handle = queue.submit("test/fail", h, Params::new()).await.unwrap();
        let job = wait_finished(&queue, handle.get_i64("jobid").unwrap() as u64).await;
        assert!(!job.success);
        assert_eq!(job.error, "boom");
    }

    #[tokio::test]
    async fn test_stop_cancels_job() {
        let queue = JobQueue::new(None);
        let h = handler(|ctx: CallContext, _| async move {
            ctx.cancel.cancelled().await;
            Ok(None)
        });
        let handle = queue.submit("test/wait", h, Params::new()).await.unwrap();
        let id = handle.get_i64("jobid").unwrap() as u64;
        queue.stop(id).await.unwrap();
        let job = wait_finished(&queue, id).await;
        assert!(job.finished);
        assert!(queue.stop(999).await.is_err());
    }

    #[tokio::test]
    async fn test_max_running_rejects_submission() {
        let queue = JobQueue::new(Some(1));
        let h = handler(|ctx: CallContext, _| async move {
            ctx.cancel.cancelled().await;
            Ok(None)
        });
        let first = queue.submit("test/wait", h.clone(), Params::new()).await.unwrap();
        let err = queue.submit("test/wait", h, Params::new()).await.unwrap_err();
        assert!(matches!(err, RcError::Job(_)));

        queue.stop(first.get_i64("jobid").unwrap() as u64).await.unwrap();
        assert_eq!(queue.ids().await, vec![1]);
    }

    #[tokio::test]
    async fn test_finished_jobs_expire() {
        let queue = JobQueue::new(None).with_expiry(Duration::from_millis(50));
        let h = handler(|_, params| async move { Ok(Some(params)) });
        let handle = queue.submit("test/quick", h, Params::new()).await.unwrap();
        let id = handle.get_i64("jobid").unwrap() as u64;
        assert!(queue.ids().await.contains(&id));

        for _ in 0..100 {
            if queue.ids().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.ids().await.is_empty());
        assert!(matches!(queue.status(id).await, Err(RcError::Job(_))));
    }

    #[tokio::test]
    async fn test_running_jobs_do_not_expire() {
        let queue = JobQueue::new(None).with_expiry(Duration::from_millis(10));
        let h = handler(|ctx: CallContext, _| async move {
            ctx.cancel.cancelled().await;
            Ok(None)
        });
        let handle = queue.submit("test/wait", h, Params::new()).await.unwrap();
        let id = handle.get_i64("jobid").unwrap() as u64;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(queue.ids().await, vec![id]);
        queue.stop(id).await.unwrap();
    }
}
