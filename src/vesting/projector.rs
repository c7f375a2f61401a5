//! Off-thread timeline projection
//!
//! The projector owns a dedicated worker thread fed through a request channel.
//! Each submission names its caller and gets a request id and a
//! [`SupersedeToken`]; a newer request from the same caller supersedes that
//! caller's older ones, while other callers' work is left alone. Superseded
//! work is abandoned between days and its reply is dropped, so callers
//! awaiting it observe `None`. The newest request always receives exactly one reply, either a
//! timeline or an error message. Panics inside a projection are caught and
//! turned into error replies.

use super::timeline::{project_until, Timeline};
use super::types::{GlobalState, ProjectConfig};
use crate::config::ProjectorConfig;
use crate::core::{PreviewError, PreviewResult};
use crate::logger::{self, LogTag};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionRequest {
    pub max_token_amount: f64,
    pub config: Option<ProjectConfig>,
    pub global_state: Option<GlobalState>,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionReply {
    Success { request_id: u64, timeline: Timeline },
    Error { request_id: u64, message: String },
}

impl ProjectionReply {
    pub fn request_id(&self) -> u64 {
        match self {
            ProjectionReply::Success { request_id, .. } => *request_id,
            ProjectionReply::Error { request_id, .. } => *request_id,
        }
    }

    pub fn into_result(self) -> PreviewResult<Timeline> {
        match self {
            ProjectionReply::Success { timeline, .. } => Ok(timeline),
            ProjectionReply::Error { message, .. } => Err(PreviewError::Projection(message)),
        }
    }
}

/// Marks a request as stale once a newer one has been submitted
#[derive(Debug, Clone)]
pub struct SupersedeToken {
    request_id: u64,
    latest: Arc<AtomicU64>,
}

impl SupersedeToken {
    pub fn is_superseded(&self) -> bool {
        self.latest.load(Ordering::Acquire) != self.request_id
    }
}

struct ProjectionJob {
    request_id: u64,
    request: ProjectionRequest,
    token: SupersedeToken,
    reply: oneshot::Sender<ProjectionReply>,
}

/// Handle to a submitted projection
#[derive(Debug)]
pub struct PendingProjection {
    request_id: u64,
    token: SupersedeToken,
    reply: oneshot::Receiver<ProjectionReply>,
}

impl PendingProjection {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn is_superseded(&self) -> bool {
        self.token.is_superseded()
    }

    /// Wait for the reply; `None` when the request was superseded and dropped
    pub async fn outcome(self) -> Option<ProjectionReply> {
        self.reply.await.ok()
    }

    /// Blocking variant for callers outside an async runtime
    pub fn blocking_outcome(self) -> Option<ProjectionReply> {
        self.reply.blocking_recv().ok()
    }
}

pub struct TimelineProjector {
    jobs: Mutex<Option<Sender<ProjectionJob>>>,
    next_id: AtomicU64,
    /// Newest request id per caller
    scopes: Mutex<HashMap<String, Arc<AtomicU64>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TimelineProjector {
    /// Start the worker thread
    pub fn spawn(config: &ProjectorConfig) -> PreviewResult<Self> {
        let (tx, rx) = mpsc::channel::<ProjectionJob>();
        let worker = std::thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || run_worker(rx))
            .map_err(|e| PreviewError::Projection(format!("Failed to start worker: {}", e)))?;

        logger::debug(
            LogTag::Projector,
            &format!("Projection worker '{}' started", config.worker_name),
        );

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            next_id: AtomicU64::new(0),
            scopes: Mutex::new(HashMap::new()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Queue a projection for `caller`, superseding that caller's earlier
    /// submissions. Other callers are unaffected.
    pub fn submit(&self, caller: &str, request: ProjectionRequest) -> PreviewResult<PendingProjection> {
        // Ids are assigned under the channel lock so queue order matches id order
        let jobs = self.jobs.lock();
        let sender = jobs
            .as_ref()
            .ok_or_else(|| PreviewError::Projection("Projection worker stopped".to_string()))?;

        let request_id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = {
            let mut scopes = self.scopes.lock();
            // Scopes nobody holds a token for are finished
            scopes.retain(|key, scope| key == caller || Arc::strong_count(scope) > 1);
            let scope = scopes
                .entry(caller.to_string())
                .or_insert_with(|| Arc::new(AtomicU64::new(0)))
                .clone();
            scope.store(request_id, Ordering::Release);
            scope
        };

        let token = SupersedeToken { request_id, latest };
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(ProjectionJob {
                request_id,
                request,
                token: token.clone(),
                reply: reply_tx,
            })
            .map_err(|_| PreviewError::Projection("Projection worker stopped".to_string()))?;

        Ok(PendingProjection {
            request_id,
            token,
            reply: reply_rx,
        })
    }

    /// Submit and wait; `None` if a newer submission from the same caller
    /// overtook this one
    pub async fn project(
        &self,
        caller: &str,
        request: ProjectionRequest,
    ) -> PreviewResult<Option<Timeline>> {
        let pending = self.submit(caller, request)?;
        match pending.outcome().await {
            Some(reply) => reply.into_result().map(Some),
            None => Ok(None),
        }
    }

    /// Id of `caller`'s newest submitted request, 0 if it never submitted
    pub fn latest_request_id(&self, caller: &str) -> u64 {
        self.scopes
            .lock()
            .get(caller)
            .map(|scope| scope.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl Drop for TimelineProjector {
    fn drop(&mut self) {
        // Cancel in-progress work, then close the channel to end the worker loop
        for scope in self.scopes.lock().values() {
            scope.store(u64::MAX, Ordering::Release);
        }
        self.jobs.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                logger::error(LogTag::Projector, "Projection worker terminated abnormally");
            }
        }
    }
}

fn run_worker(jobs: Receiver<ProjectionJob>) {
    while let Ok(first) = jobs.recv() {
        let mut batch = vec![first];
        batch.extend(jobs.try_iter());

        // Only each caller's newest queued request is still live
        batch.retain(|job| {
            if job.token.is_superseded() {
                logger::debug(
                    LogTag::Projector,
                    &format!("Request {} superseded before it started", job.request_id),
                );
                false
            } else {
                true
            }
        });
        batch.sort_by_key(|job| job.request_id);

        for job in batch {
            run_job(job);
        }
    }
}

fn run_job(job: ProjectionJob) {
    if job.token.is_superseded() {
        return;
    }

    logger::verbose(
        LogTag::Projector,
        &format!(
            "Projecting request {} over {} days",
            job.request_id,
            job.request
                .config
                .as_ref()
                .map(|c| c.unlock_duration_days)
                .unwrap_or(0)
        ),
    );

    let token = job.token.clone();
    let request = &job.request;
    let reply = reply_for(job.request_id, || {
        project_until(
            request.max_token_amount,
            request.config.as_ref(),
            request.global_state.as_ref(),
            request.start_date,
            || token.is_superseded(),
        )
    });

    match reply {
        Some(reply) if !job.token.is_superseded() => {
            // Receiver may be gone if the caller stopped waiting
            let _ = job.reply.send(reply);
        }
        _ => {
            logger::debug(
                LogTag::Projector,
                &format!("Discarded superseded projection {}", job.request_id),
            );
        }
    }
}

/// Run `work`, mapping a panic to an error reply. `None` means cancelled.
fn reply_for<F>(request_id: u64, work: F) -> Option<ProjectionReply>
where
    F: FnOnce() -> Option<Timeline>,
{
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(Some(timeline)) => Some(ProjectionReply::Success {
            request_id,
            timeline,
        }),
        Ok(None) => None,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "projection panicked".to_string());
            logger::error(
                LogTag::Projector,
                &format!("Projection {} failed: {}", request_id, message),
            );
            Some(ProjectionReply::Error {
                request_id,
                message,
            })
        }
    }
}
