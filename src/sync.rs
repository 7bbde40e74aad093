use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheState};
use crate::model::{FilterSet, Fingerprint};
use crate::observability::{FETCHES_TOTAL, FETCH_DURATION_SECONDS, FETCH_GENERATION};
use crate::rows::Dataset;
use crate::source::{QuerySource, SourceError};

/// Where the controller stands. Published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching { generation: u64, fingerprint: Fingerprint },
    Applied { fingerprint: Fingerprint },
    Cancelled,
    Failed { fingerprint: Fingerprint, error: String },
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Applied { .. } | SyncState::Cancelled | SyncState::Failed { .. })
    }
}

/// What one `apply_filters` call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The fetch committed a new snapshot.
    Applied,
    /// No fetch was needed.
    Unchanged,
    /// A newer request (or `cancel`) superseded this one; nothing committed.
    Cancelled,
    /// The source failed; the previous snapshot stays.
    Failed(SourceError),
}

#[derive(Default)]
struct Inner {
    last_applied: Option<Fingerprint>,
    in_flight: Option<(u64, Fingerprint)>,
    last_requested: Option<FilterSet>,
}

/// Refetches the cache when the filter selection changes.
///
/// Every fetch carries a generation number. Generation bumps and the
/// commit check both happen under `inner`, and the commit runs inside the
/// cache write lock, so a stale fetch can never overwrite a newer one.
pub struct FilterSyncController {
    cache: Arc<Cache>,
    source: Arc<dyn QuerySource>,
    generation: AtomicU64,
    inner: Mutex<Inner>,
    state: watch::Sender<SyncState>,
}

impl FilterSyncController {
    pub fn new(cache: Arc<Cache>, source: Arc<dyn QuerySource>) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            cache,
            source,
            generation: AtomicU64::new(0),
            inner: Mutex::new(Inner::default()),
            state,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, next: SyncState) {
        self.state.send_replace(next);
    }

    /// Fetch for `filters` unless the cache already holds (or is already
    /// fetching) that selection.
    pub async fn apply_filters(&self, filters: FilterSet) -> FetchOutcome {
        let fingerprint = filters.fingerprint();
        let generation = {
            let mut inner = self.inner();
            inner.last_requested = Some(filters.clone());

            if inner.in_flight.as_ref().is_some_and(|(_, fp)| *fp == fingerprint) {
                return FetchOutcome::Unchanged;
            }
            if inner.last_applied.as_ref() == Some(&fingerprint) {
                // Back to what the cache already shows: drop any other fetch.
                if inner.in_flight.take().is_some() {
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    self.publish(SyncState::Applied { fingerprint });
                }
                return FetchOutcome::Unchanged;
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.in_flight = Some((generation, fingerprint.clone()));
            self.publish(SyncState::Fetching {
                generation,
                fingerprint: fingerprint.clone(),
            });
            generation
        };

        self.run(generation, fingerprint, filters).await
    }

    /// Re-issue the most recent selection, typically after a failure.
    pub async fn retry(&self) -> FetchOutcome {
        let last = self.inner().last_requested.clone();
        match last {
            Some(filters) => self.apply_filters(filters).await,
            None => FetchOutcome::Unchanged,
        }
    }

    /// Supersede the in-flight fetch, if any. Its result will be dropped.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner();
        let Some((generation, fingerprint)) = inner.in_flight.take() else {
            return false;
        };
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.publish(SyncState::Cancelled);
        debug!(generation, %fingerprint, "fetch cancelled");
        true
    }

    /// Return a terminal state to `Idle`. Returns whether anything changed.
    pub fn acknowledge(&self) -> bool {
        let _inner = self.inner();
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run(&self, generation: u64, fingerprint: Fingerprint, filters: FilterSet) -> FetchOutcome {
        metrics::gauge!(FETCH_GENERATION).set(generation as f64);
        debug!(generation, %fingerprint, "fetch issued");

        let started = Instant::now();
        let result = self.source.fetch(&filters).await;
        metrics::histogram!(FETCH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                let mut inner = self.inner();
                if !self.is_current(generation) {
                    return self.stale(generation);
                }
                inner.in_flight = None;
                self.publish(SyncState::Failed {
                    fingerprint,
                    error: e.to_string(),
                });
                metrics::counter!(FETCHES_TOTAL, "outcome" => "failed").increment(1);
                warn!(generation, "fetch failed, keeping previous snapshot: {e}");
                return FetchOutcome::Failed(e);
            }
        };

        let row_count = rows.len();
        let next = CacheState::from_dataset(Dataset::from_rows(rows), Some(fingerprint.clone()));
        let committed = self
            .cache
            .replace_if(next, || {
                let mut inner = self.inner();
                if !self.is_current(generation) {
                    return false;
                }
                inner.in_flight = None;
                inner.last_applied = Some(fingerprint.clone());
                self.publish(SyncState::Applied {
                    fingerprint: fingerprint.clone(),
                });
                true
            })
            .await;

        if !committed {
            return self.stale(generation);
        }
        metrics::counter!(FETCHES_TOTAL, "outcome" => "applied").increment(1);
        info!(generation, %fingerprint, rows = row_count, "snapshot applied");
        FetchOutcome::Applied
    }

    fn stale(&self, generation: u64) -> FetchOutcome {
        metrics::counter!(FETCHES_TOTAL, "outcome" => "cancelled").increment(1);
        debug!(generation, "stale fetch dropped");
        FetchOutcome::Cancelled
    }
}
