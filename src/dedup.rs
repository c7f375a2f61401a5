//! Collapsing of concurrent identical requests
//!
//! The first caller for a key creates an in-flight entry holding a shared
//! future; every caller arriving within the dedup window awaits that same
//! future and observes the same outcome, success or failure. Entries are
//! pruned once the window has elapsed, so a later call (including a retry
//! after a failure) runs `produce` again. The window only governs collapsing
//! simultaneous calls; data freshness is the durable cache's job.

use crate::config::CacheConfig;
use crate::core::PreviewResult;
use crate::logger::{self, LogTag};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

type SharedOutcome<V> = Shared<BoxFuture<'static, PreviewResult<V>>>;

struct InFlightRequest<V: Clone> {
    future: SharedOutcome<V>,
    created_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub produced: u64,
    pub collapsed: u64,
    pub in_flight: usize,
}

pub struct RequestDeduplicator<V: Clone> {
    window: Duration,
    in_flight: Mutex<HashMap<String, InFlightRequest<V>>>,
    produced: AtomicU64,
    collapsed: AtomicU64,
}

impl<V> RequestDeduplicator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            in_flight: Mutex::new(HashMap::new()),
            produced: AtomicU64::new(0),
            collapsed: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_millis(config.dedup_window_ms))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run `produce` unless an identical request is already in flight within
    /// the window, in which case its outcome is shared. The lock is held only
    /// to look up or register the entry, never across the await, so unrelated
    /// keys never wait on each other.
    pub async fn dedupe<F, Fut>(&self, key: &str, produce: F) -> PreviewResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PreviewResult<V>> + Send + 'static,
    {
        let shared = {
            let mut in_flight = self.in_flight.lock();
            let now = Instant::now();
            in_flight.retain(|_, request| now.duration_since(request.created_at) < self.window);

            match in_flight.get(key) {
                Some(request) => {
                    self.collapsed.fetch_add(1, Ordering::Relaxed);
                    logger::debug(LogTag::Dedup, &format!("Joined in-flight request for {}", key));
                    request.future.clone()
                }
                None => {
                    self.produced.fetch_add(1, Ordering::Relaxed);
                    let future = produce().boxed().shared();
                    in_flight.insert(
                        key.to_string(),
                        InFlightRequest {
                            future: future.clone(),
                            created_at: now,
                        },
                    );
                    future
                }
            }
        };

        shared.await
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            produced: self.produced.load(Ordering::Relaxed),
            collapsed: self.collapsed.load(Ordering::Relaxed),
            in_flight: self.in_flight.lock().len(),
        }
    }
}
