//! Scope: digest loop and deferred callbacks for bound arrays.
//!
//! A watcher is a closure returning `true` when it saw (and handled) a change.
//! [`Scope::apply`] runs every watcher until a full pass reports no change,
//! failing once `digest_ttl` passes have not settled it. Timeouts queued with
//! [`Scope::timeout`] run on [`Scope::flush_timeouts`], each followed by a
//! digest.
//!
//! No lock is held while a watcher or timeout runs, so both may register or
//! remove watchers and schedule or cancel timeouts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::error::{Result, ScopeError};

pub type WatchId = u64;
pub type TimeoutId = u64;

type WatchFn = dyn Fn() -> bool + Send + Sync;
type TimeoutFn = Box<dyn FnOnce() + Send>;

const DEFAULT_DIGEST_TTL: usize = 10;

fn default_digest_ttl() -> usize {
    DEFAULT_DIGEST_TTL
}

/// Scope configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ScopeOptions {
    /// Maximum digest passes before [`ScopeError::DigestLimit`]. A scope
    /// always allows at least one pass.
    #[serde(default = "default_digest_ttl")]
    pub digest_ttl: usize,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self {
            digest_ttl: DEFAULT_DIGEST_TTL,
        }
    }
}

struct ScopeInner {
    options: ScopeOptions,
    watchers: Mutex<Vec<(WatchId, Arc<WatchFn>)>>,
    timeouts: Mutex<BTreeMap<TimeoutId, TimeoutFn>>,
    next_id: AtomicU64,
    digests: AtomicU64,
}

/// Handle to a digest scope. Clones share watchers and timeouts.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self::with_options(ScopeOptions::default())
    }

    pub fn with_options(mut options: ScopeOptions) -> Self {
        options.digest_ttl = options.digest_ttl.max(1);
        Self {
            inner: Arc::new(ScopeInner {
                options,
                watchers: Mutex::new(Vec::new()),
                timeouts: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                digests: AtomicU64::new(0),
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Watchers
    // -----------------------------------------------------------------------

    pub fn watch(&self, listener: impl Fn() -> bool + Send + Sync + 'static) -> WatchId {
        let id = self.next_id();
        self.inner.watchers.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a watcher. Returns whether it was registered.
    pub fn unwatch(&self, id: WatchId) -> bool {
        let mut watchers = self.inner.watchers.lock();
        let before = watchers.len();
        watchers.retain(|(wid, _)| *wid != id);
        watchers.len() != before
    }

    pub fn is_watching(&self, id: WatchId) -> bool {
        self.inner.watchers.lock().iter().any(|(wid, _)| *wid == id)
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    // -----------------------------------------------------------------------
    // Digest
    // -----------------------------------------------------------------------

    /// Run a digest.
    pub fn apply(&self) -> Result<()> {
        self.inner.digests.fetch_add(1, Ordering::SeqCst);
        let ttl = self.inner.options.digest_ttl;

        for _ in 0..ttl {
            let snapshot: Vec<(WatchId, Arc<WatchFn>)> = self
                .inner
                .watchers
                .lock()
                .iter()
                .map(|(id, w)| (*id, Arc::clone(w)))
                .collect();

            let mut dirty = false;
            for (id, watcher) in snapshot {
                // Removed by an earlier watcher in this pass.
                if !self.is_watching(id) {
                    continue;
                }
                if watcher() {
                    dirty = true;
                }
            }
            if !dirty {
                return Ok(());
            }
        }

        tracing::warn!(ttl, "digest limit reached");
        Err(ScopeError::DigestLimit { iterations: ttl }.into())
    }

    /// Number of digests run so far.
    pub fn digest_count(&self) -> u64 {
        self.inner.digests.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Timeouts
    // -----------------------------------------------------------------------

    /// Queue `f` to run on the next [`flush_timeouts`](Self::flush_timeouts).
    pub fn timeout(&self, f: impl FnOnce() + Send + 'static) -> TimeoutId {
        let id = self.next_id();
        self.inner.timeouts.lock().insert(id, Box::new(f));
        id
    }

    /// Drop a queued timeout. Returns whether it was still pending.
    pub fn cancel(&self, id: TimeoutId) -> bool {
        self.inner.timeouts.lock().remove(&id).is_some()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.inner.timeouts.lock().len()
    }

    /// Run queued timeouts in scheduling order, including ones queued while
    /// flushing. Each is followed by a digest.
    pub fn flush_timeouts(&self) -> Result<()> {
        loop {
            let next = self.inner.timeouts.lock().pop_first();
            let Some((_, f)) = next else {
                return Ok(());
            };
            f();
            self.apply()?;
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("watchers", &self.watcher_count())
            .field("pending_timeouts", &self.pending_timeouts())
            .field("digests", &self.digest_count())
            .finish()
    }
}
