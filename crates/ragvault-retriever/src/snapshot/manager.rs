//! Corpus snapshot manager.
//!
//! State machine `Empty -> Building -> Fresh -> Stale -> Building -> ...`,
//! derived from three facts: whether a rebuild is in flight, which snapshot
//! is installed, and the highest store version observed. At most one rebuild
//! runs at a time; every caller that needs one joins the same shared handle.
//!
//! When given the retriever's [`VectorIndex`], every rebuild also replays the
//! same change log (or scan) onto it, so writes made by another process reach
//! vector search by the time the snapshot covering them is installed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ragvault_protocols::{
    ChunkStore, RebuildKind, RetrievalError, SnapshotMarker, SnapshotState, StaleIndexWarning,
    StaleReason, StoreScan,
};

use super::corpus::CorpusSnapshot;
use crate::tokenizer::Tokenizer;
use crate::vector_index::{VectorIndex, VectorSync};

/// How a query treats a snapshot older than its read version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyPolicy {
    /// Wait (bounded) for a rebuild before scoring.
    #[default]
    Strict,
    /// Serve the old snapshot with a warning and rebuild in the background.
    Relaxed,
}

/// When rebuilds start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildMode {
    /// On the next keyword access.
    #[default]
    Lazy,
    /// In the background after every write.
    Eager,
}

/// Snapshot manager configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub policy: ConsistencyPolicy,
    pub rebuild_mode: RebuildMode,
    /// Prefer applying the store change log over a full rescan.
    pub incremental: bool,
    /// Longest a caller waits for an in-flight rebuild.
    pub max_sync_rebuild: Duration,
    /// Build the first snapshot while the retriever opens.
    pub warm_on_start: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            policy: ConsistencyPolicy::Strict,
            rebuild_mode: RebuildMode::Lazy,
            incremental: true,
            max_sync_rebuild: Duration::from_secs(2),
            warm_on_start: true,
        }
    }
}

/// Summary of the last completed rebuild.
#[derive(Debug, Clone)]
pub struct RebuildReport {
    pub kind: RebuildKind,
    pub duration: Duration,
    pub version: u64,
    pub chunk_count: usize,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot handed to a query, with a warning when it is behind the
/// query's read version.
#[derive(Debug, Clone)]
pub struct ResolvedSnapshot {
    pub snapshot: Arc<CorpusSnapshot>,
    pub warning: Option<StaleIndexWarning>,
}

impl ResolvedSnapshot {
    fn fresh(snapshot: Arc<CorpusSnapshot>) -> Self {
        Self {
            snapshot,
            warning: None,
        }
    }

    fn stale(snapshot: Arc<CorpusSnapshot>, warning: StaleIndexWarning) -> Self {
        Self {
            snapshot,
            warning: Some(warning),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.warning.is_some()
    }
}

type RebuildHandle = Shared<BoxFuture<'static, Result<Arc<CorpusSnapshot>, RetrievalError>>>;

#[derive(Default)]
struct ManagerState {
    current: Option<Arc<CorpusSnapshot>>,
    in_flight: Option<RebuildHandle>,
    observed_version: u64,
    last_rebuild: Option<RebuildReport>,
    persisted: Option<SnapshotMarker>,
}

struct ManagerInner {
    store: Arc<dyn ChunkStore>,
    tokenizer: Tokenizer,
    config: SnapshotConfig,
    vectors: Option<Arc<VectorIndex>>,
    state: Mutex<ManagerState>,
    cancel: CancellationToken,
}

/// Owns the current [`CorpusSnapshot`] and all rebuilds of it.
pub struct SnapshotManager {
    inner: Arc<ManagerInner>,
}

fn join_error(err: tokio::task::JoinError) -> RetrievalError {
    RetrievalError::IndexUnavailable(format!("snapshot rebuild task failed: {err}"))
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn ChunkStore>, tokenizer: Tokenizer, config: SnapshotConfig) -> Self {
        Self::build(store, tokenizer, config, None)
    }

    /// A manager that keeps `vectors` in step with the store on every rebuild.
    pub fn with_vector_index(
        store: Arc<dyn ChunkStore>,
        tokenizer: Tokenizer,
        config: SnapshotConfig,
        vectors: Arc<VectorIndex>,
    ) -> Self {
        Self::build(store, tokenizer, config, Some(vectors))
    }

    fn build(
        store: Arc<dyn ChunkStore>,
        tokenizer: Tokenizer,
        config: SnapshotConfig,
        vectors: Option<Arc<VectorIndex>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                store,
                tokenizer,
                config,
                vectors,
                state: Mutex::new(ManagerState::default()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SnapshotState {
        let state = self.inner.state.lock();
        if state.in_flight.is_some() {
            return SnapshotState::Building;
        }
        match &state.current {
            None => SnapshotState::Empty,
            Some(snapshot) if snapshot.version() < state.observed_version => SnapshotState::Stale,
            Some(_) => SnapshotState::Fresh,
        }
    }

    /// Installed snapshot, if any.
    pub fn current(&self) -> Option<Arc<CorpusSnapshot>> {
        self.inner.state.lock().current.clone()
    }

    pub fn snapshot_version(&self) -> Option<u64> {
        self.inner.state.lock().current.as_ref().map(|s| s.version())
    }

    pub fn last_rebuild(&self) -> Option<RebuildReport> {
        self.inner.state.lock().last_rebuild.clone()
    }

    /// Freshness marker read back from (or last written to) the store.
    pub fn persisted_marker(&self) -> Option<SnapshotMarker> {
        self.inner.state.lock().persisted.clone()
    }

    /// Record a store version seen by a read.
    pub fn observe(&self, version: u64) {
        let mut state = self.inner.state.lock();
        if version > state.observed_version {
            state.observed_version = version;
        }
    }

    /// Called from the write path after each store mutation.
    pub fn notify_mutation(&self, version: u64) {
        self.observe(version);
        if self.inner.config.rebuild_mode == RebuildMode::Eager && !self.inner.cancel.is_cancelled() {
            debug!(version, "eager snapshot rebuild requested");
            let _ = self.ensure_rebuild();
        }
    }

    /// Read the persisted freshness marker from the store.
    pub async fn load_marker(&self) -> Result<Option<SnapshotMarker>, RetrievalError> {
        let marker = self.inner.store.snapshot_marker().await?;
        if let Some(marker) = &marker {
            debug!(
                version = marker.version,
                chunk_count = marker.chunk_count,
                "found persisted snapshot marker"
            );
        }
        self.inner.state.lock().persisted = marker.clone();
        Ok(marker)
    }

    /// Build and install a full snapshot from an existing scan.
    pub async fn prime(&self, scan: StoreScan) -> Result<RebuildReport, RetrievalError> {
        let started = Instant::now();
        self.observe(scan.version);
        let tokenizer = self.inner.tokenizer.clone();
        let cancel = self.inner.cancel.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            CorpusSnapshot::build(scan.version, &scan.chunks, &tokenizer, &cancel)
        })
        .await
        .map_err(join_error)??;

        let (_, report) = self.inner.install(snapshot, RebuildKind::Full, started, false);
        self.inner.persist_marker(&report).await;
        Ok(report)
    }

    /// Explicit warm-up: make sure a snapshot at least as new as the store
    /// exists.
    pub async fn warm_up(&self) -> Result<ResolvedSnapshot, RetrievalError> {
        let version = self.inner.store.mutation_counter().await?;
        self.resolve(version).await
    }

    /// Run (or join) a rebuild and wait for it without a time bound.
    pub async fn rebuild_now(&self) -> Result<RebuildReport, RetrievalError> {
        let snapshot = self.ensure_rebuild().await?;
        Ok(self.last_rebuild().unwrap_or_else(|| RebuildReport {
            kind: RebuildKind::Full,
            duration: Duration::ZERO,
            version: snapshot.version(),
            chunk_count: snapshot.len(),
            finished_at: snapshot.built_at(),
        }))
    }

    /// Snapshot for a read at `read_version`, applying the consistency policy.
    pub async fn resolve(&self, read_version: u64) -> Result<ResolvedSnapshot, RetrievalError> {
        self.observe(read_version);
        let deadline = Instant::now() + self.inner.config.max_sync_rebuild;

        let mut current = self.current();
        loop {
            if let Some(snapshot) = &current {
                if snapshot.version() >= read_version {
                    return Ok(ResolvedSnapshot::fresh(snapshot.clone()));
                }
                if self.inner.config.policy == ConsistencyPolicy::Relaxed {
                    let _ = self.ensure_rebuild();
                    let warning = StaleIndexWarning::new(
                        snapshot.version(),
                        read_version,
                        StaleReason::RelaxedPolicy,
                    );
                    debug!(%warning, "serving stale keyword snapshot");
                    return Ok(ResolvedSnapshot::stale(snapshot.clone(), warning));
                }
            }

            let handle = self.ensure_rebuild();
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(snapshot)) => {
                    if snapshot.version() >= read_version {
                        return Ok(ResolvedSnapshot::fresh(snapshot));
                    }
                    current = Some(snapshot);
                    if Instant::now() >= deadline {
                        return Ok(self.timed_out(current, read_version));
                    }
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => return Ok(self.timed_out(current, read_version)),
            }
        }
    }

    fn timed_out(&self, current: Option<Arc<CorpusSnapshot>>, read_version: u64) -> ResolvedSnapshot {
        let snapshot = current.unwrap_or_else(|| Arc::new(CorpusSnapshot::empty(0)));
        let warning = StaleIndexWarning::new(
            snapshot.version(),
            read_version,
            StaleReason::RebuildTimedOut,
        );
        warn!(
            budget_ms = self.inner.config.max_sync_rebuild.as_millis() as u64,
            %warning,
            "snapshot rebuild exceeded synchronous budget"
        );
        ResolvedSnapshot::stale(snapshot, warning)
    }

    /// Start a rebuild unless one is already running; either way return
    /// the shared handle.
    fn ensure_rebuild(&self) -> RebuildHandle {
        let mut state = self.inner.state.lock();
        if let Some(handle) = &state.in_flight {
            return handle.clone();
        }

        let base = state.current.clone();
        let inner = self.inner.clone();
        let task = tokio::spawn(async move { inner.run_rebuild(base).await });
        let inner = self.inner.clone();
        let handle = async move {
            match task.await {
                Ok(result) => result,
                Err(err) => {
                    // The task died before it could clear its own handle.
                    inner.state.lock().in_flight = None;
                    Err(join_error(err))
                }
            }
        }
        .boxed()
        .shared();
        state.in_flight = Some(handle.clone());
        handle
    }

    /// Cancel any in-flight rebuild and refuse new ones.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

impl ManagerInner {
    async fn run_rebuild(
        self: Arc<Self>,
        base: Option<Arc<CorpusSnapshot>>,
    ) -> Result<Arc<CorpusSnapshot>, RetrievalError> {
        let started = Instant::now();
        match self.build_next(base).await {
            Ok((snapshot, kind)) => {
                let (installed, report) = self.install(snapshot, kind, started, true);
                self.persist_marker(&report).await;
                Ok(installed)
            }
            Err(err) => {
                self.state.lock().in_flight = None;
                warn!(error = %err, "snapshot rebuild failed");
                Err(err)
            }
        }
    }

    async fn build_next(
        &self,
        base: Option<Arc<CorpusSnapshot>>,
    ) -> Result<(CorpusSnapshot, RebuildKind), RetrievalError> {
        if self.cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }

        if self.config.incremental {
            if let Some(base) = base {
                match self.store.changes_since(base.version()).await? {
                    Some(changes) => {
                        let tokenizer = self.tokenizer.clone();
                        let cancel = self.cancel.clone();
                        let vectors = self.vectors.clone();
                        let next = tokio::task::spawn_blocking(move || {
                            if let Some(vectors) = vectors {
                                log_sync(changes.to_version, vectors.apply_changes(&changes));
                            }
                            base.apply(&changes, &tokenizer, &cancel)
                        })
                        .await
                        .map_err(join_error)??;
                        return Ok((next, RebuildKind::Incremental));
                    }
                    None => debug!(
                        from = base.version(),
                        "change log does not reach snapshot version, rebuilding in full"
                    ),
                }
            }
        }

        let scan = self.store.scan().await?;
        let tokenizer = self.tokenizer.clone();
        let cancel = self.cancel.clone();
        let vectors = self.vectors.clone();
        let next = tokio::task::spawn_blocking(move || {
            if let Some(vectors) = vectors {
                log_sync(scan.version, vectors.reconcile(scan.version, &scan.chunks));
            }
            CorpusSnapshot::build(scan.version, &scan.chunks, &tokenizer, &cancel)
        })
        .await
        .map_err(join_error)??;
        Ok((next, RebuildKind::Full))
    }

    /// Install a finished snapshot unless a newer one is already in place.
    fn install(
        &self,
        snapshot: CorpusSnapshot,
        kind: RebuildKind,
        started: Instant,
        from_rebuild_task: bool,
    ) -> (Arc<CorpusSnapshot>, RebuildReport) {
        let snapshot = Arc::new(snapshot);
        let report = RebuildReport {
            kind,
            duration: started.elapsed(),
            version: snapshot.version(),
            chunk_count: snapshot.len(),
            finished_at: snapshot.built_at(),
        };

        let mut state = self.state.lock();
        if from_rebuild_task {
            state.in_flight = None;
        }
        let newer = state
            .current
            .as_ref()
            .is_none_or(|current| snapshot.version() >= current.version());
        if newer {
            state.current = Some(snapshot.clone());
        }
        if report.version > state.observed_version {
            state.observed_version = report.version;
        }
        state.last_rebuild = Some(report.clone());
        let installed = state.current.clone().unwrap_or(snapshot);
        drop(state);

        info!(
            kind = ?report.kind,
            version = report.version,
            chunks = report.chunk_count,
            duration_ms = report.duration.as_millis() as u64,
            "corpus snapshot rebuilt"
        );
        (installed, report)
    }

    async fn persist_marker(&self, report: &RebuildReport) {
        let marker = SnapshotMarker {
            version: report.version,
            built_at: report.finished_at,
            chunk_count: report.chunk_count,
        };
        match self.store.record_snapshot_marker(marker.clone()).await {
            Ok(()) => self.state.lock().persisted = Some(marker),
            Err(err) => warn!(error = %err, "failed to persist snapshot marker"),
        }
    }
}

fn log_sync(version: u64, sync: VectorSync) {
    if !sync.is_noop() {
        info!(
            version,
            added = sync.added,
            removed = sync.removed,
            skipped = sync.skipped,
            "vector index caught up with store"
        );
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
