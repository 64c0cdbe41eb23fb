//! Mirror engine
//!
//! The [`SyncEngine`] orchestrates one run of the three-phase pipeline:
//!
//! 1. **Fetch**: pull remote album and asset listings (paced by the
//!    metadata token bucket) and load the current local state
//! 2. **Diff**: compute the ordered operation plan
//! 3. **Write**: download assets concurrently, then apply structure
//!    operations serially, then promote archived orphans
//!
//! ## Concurrency
//!
//! Asset downloads run through a `JoinSet` bounded by a semaphore of
//! `download_threads` permits. The barrier between asset and album
//! operations is strict: no structure operation begins until every
//! scheduled download has settled. Distinct UUIDs never share a file, so
//! parallel downloads cannot collide.
//!
//! ## Retry Logic
//!
//! Each download independently retries transient errors (network faults,
//! throttling, verification mismatches) with exponential backoff. A
//! terminal failure marks the asset failed for this run and is surfaced
//! on its `record-completed` event; the run continues.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use photomirror_core::config::Config;
use photomirror_core::domain::{Album, Asset, LibraryError};
use photomirror_core::ports::event_sink::{EventBus, SyncEvent};
use photomirror_core::ports::remote_library::RemoteLibrary;
use photomirror_store::LibraryStore;

use crate::differ::{diff, LocalState, RemoteState, SyncOperation};
use crate::rate_limit::MetadataBucket;

// ============================================================================
// Retry logic
// ============================================================================

/// Base delay for exponential backoff between download attempts
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Determines whether an error is transient (retryable)
///
/// Structured library errors answer for themselves; anything else falls
/// back to sniffing the rendered chain for network and throttling
/// signatures.
fn is_transient_error(err: &anyhow::Error) -> bool {
    if let Some(lib) = err.downcast_ref::<LibraryError>() {
        return lib.is_retryable();
    }

    let err_str = format!("{err:#}").to_lowercase();
    err_str.contains("network")
        || err_str.contains("connection")
        || err_str.contains("timeout")
        || err_str.contains("reset by peer")
        || err_str.contains("broken pipe")
        || err_str.contains("429")
        || err_str.contains("too many requests")
        || err_str.contains("rate limit")
        || err_str.contains("500")
        || err_str.contains("502")
        || err_str.contains("503")
        || err_str.contains("504")
        || err_str.contains("server error")
}

/// Executes an async operation with exponential backoff retry.
///
/// Only transient errors are retried; cancellation is observed before
/// every attempt and during the backoff sleep.
async fn with_retry<F, Fut, T>(
    operation_name: &str,
    max_retries: u32,
    base_delay: Duration,
    cancel: &CancellationToken,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..=max_retries {
        if cancel.is_cancelled() {
            anyhow::bail!("run cancelled during {operation_name}");
        }

        match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt, "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt < max_retries && is_transient_error(&err) {
                    let delay = base_delay * 2u32.saturating_pow(attempt.min(16));
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient error, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => anyhow::bail!("run cancelled during {operation_name}"),
                    }
                    last_error = Some(err);
                } else {
                    return Err(err);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("retry exhausted for {operation_name}")))
}

// ============================================================================
// RunResult
// ============================================================================

/// Summary of a completed mirror run
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub assets_downloaded: u32,
    pub assets_removed: u32,
    pub albums_added: u32,
    pub albums_removed: u32,
    pub albums_renamed: u32,
    pub albums_stashed: u32,
    pub albums_retrieved: u32,
    /// Assets that exhausted their retries, with the terminal error
    pub failed_assets: Vec<(String, String)>,
    /// Non-fatal structure errors encountered along the way
    pub errors: Vec<String>,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
}

impl RunResult {
    /// A run fails the process only when nothing at all succeeded.
    pub fn all_assets_failed(&self) -> bool {
        self.assets_downloaded == 0 && !self.failed_assets.is_empty()
    }
}

// ============================================================================
// Structure actions
// ============================================================================

/// Serialized structure work after the asset barrier
///
/// A same-UUID remove/add pair from the differ where only the display
/// name changed collapses into `Rename`, so the store swaps one symlink
/// instead of rebuilding the directory.
#[derive(Debug)]
enum StructureAction {
    Stash(Album),
    Remove(Album),
    RemoveAsset(photomirror_store::AssetRecord),
    Retrieve(Album),
    Add(Album),
    Rename { from: Album, to: Album },
}

/// Collapse rename pairs and strip asset adds out of a plan.
fn structure_actions(plan: &[SyncOperation]) -> Vec<StructureAction> {
    // map of same-UUID removes that a later add may claim as a rename
    let mut removed: HashMap<&str, &Album> = HashMap::new();
    for op in plan {
        if let SyncOperation::AlbumRemove(album) = op {
            removed.insert(album.uuid.as_str(), album);
        }
    }

    let mut renamed: HashMap<&str, &Album> = HashMap::new();
    for op in plan {
        if let SyncOperation::AlbumAdd(album) = op {
            if let Some(old) = removed.get(album.uuid.as_str()) {
                if album.is_rename_of(old) {
                    renamed.insert(album.uuid.as_str(), old);
                }
            }
        }
    }

    let mut actions = Vec::new();
    for op in plan {
        match op {
            SyncOperation::AssetAdd(_) => {}
            SyncOperation::AssetRemove(record) => {
                actions.push(StructureAction::RemoveAsset(record.clone()));
            }
            SyncOperation::AlbumArchiveStash(album) => {
                actions.push(StructureAction::Stash(album.clone()));
            }
            SyncOperation::AlbumRemove(album) => {
                if !renamed.contains_key(album.uuid.as_str()) {
                    actions.push(StructureAction::Remove(album.clone()));
                }
            }
            SyncOperation::AlbumArchiveRetrieve(album) => {
                actions.push(StructureAction::Retrieve(album.clone()));
            }
            SyncOperation::AlbumAdd(album) => {
                if let Some(old) = renamed.get(album.uuid.as_str()) {
                    actions.push(StructureAction::Rename {
                        from: (*old).clone(),
                        to: album.clone(),
                    });
                } else {
                    actions.push(StructureAction::Add(album.clone()));
                }
            }
        }
    }
    actions
}

// ============================================================================
// SyncEngine
// ============================================================================

/// One-way mirror engine
///
/// ## Dependencies
///
/// - `remote`: the photo service port (listings + downloads)
/// - `store`: the local library store (sole tree mutator)
/// - `events`: non-blocking lifecycle event sink
pub struct SyncEngine {
    remote: Arc<dyn RemoteLibrary>,
    store: LibraryStore,
    events: EventBus,
    limiter: MetadataBucket,
    download_threads: usize,
    max_retries: u32,
    retry_base: Duration,
    remote_delete: bool,
    cancel: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteLibrary>,
        store: LibraryStore,
        events: EventBus,
        config: &Config,
    ) -> Self {
        Self {
            remote,
            store,
            events,
            limiter: MetadataBucket::new(config.metadata_rate),
            download_threads: config.download_threads.max(1) as usize,
            max_retries: config.max_retries,
            retry_base: BASE_RETRY_DELAY,
            remote_delete: config.remote_delete,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach an externally controlled cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the backoff base delay (tests shrink it).
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Run one fetch → diff → write cycle.
    ///
    /// Per-asset failures are collected into the result; a fatal error
    /// (invariant loss, unusable remote) emits an `error` event and aborts.
    pub async fn run(&self) -> Result<RunResult> {
        let start = std::time::Instant::now();

        match self.run_inner().await {
            Ok(mut result) => {
                result.duration_ms = start.elapsed().as_millis() as u64;
                self.events.emit(SyncEvent::Done);
                info!(
                    downloaded = result.assets_downloaded,
                    failed = result.failed_assets.len(),
                    albums_added = result.albums_added,
                    albums_removed = result.albums_removed,
                    duration_ms = result.duration_ms,
                    "mirror run completed"
                );
                Ok(result)
            }
            Err(err) => {
                let (code, cause) = match err.downcast_ref::<LibraryError>() {
                    Some(lib) => (lib.code().to_string(), None),
                    None => (
                        "run-failed".to_string(),
                        err.chain().nth(1).map(|c| c.to_string()),
                    ),
                };
                error!(code = %code, error = %err, "mirror run failed");
                self.events.emit(SyncEvent::Error {
                    code,
                    message: err.to_string(),
                    cause,
                });
                Err(err)
            }
        }
    }

    async fn run_inner(&self) -> Result<RunResult> {
        let mut result = RunResult::default();
        self.store.ensure_layout().await?;

        // --- phase 1: fetch ---
        self.limiter.acquire().await;
        let remote_albums = self
            .remote
            .fetch_albums()
            .await
            .context("failed to fetch remote albums")?;
        self.limiter.acquire().await;
        let remote_assets = self
            .remote
            .fetch_assets()
            .await
            .context("failed to fetch remote assets")?;
        let remote = RemoteState {
            albums: remote_albums,
            assets: remote_assets,
        };
        self.events.emit(SyncEvent::Fetch);
        self.check_cancelled()?;

        // --- phase 2: diff ---
        let local = self.load_local_state(&remote).await?;
        let plan = diff(&remote, &local);
        self.events.emit(SyncEvent::Diff);
        debug!(operations = plan.len(), "executing plan");
        self.check_cancelled()?;

        // --- phase 3: write ---
        self.events.emit(SyncEvent::Write);
        self.download_assets(&plan, &mut result).await;
        self.check_cancelled()?;

        self.events.emit(SyncEvent::ApplyStructure);
        self.apply_structure(&plan, &mut result).await?;

        self.store.clean_archived_orphans().await?;

        if self.remote_delete {
            self.signal_remote_delete(&plan, &result).await;
        }

        Ok(result)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            anyhow::bail!("run cancelled");
        }
        Ok(())
    }

    // ========================================================================
    // Local state
    // ========================================================================

    /// Load on-disk state and verify every remote asset already present.
    ///
    /// Verification failures feed the differ's re-download set; this is
    /// what heals truncated downloads and dangling album links.
    async fn load_local_state(&self, remote: &RemoteState) -> Result<LocalState> {
        let assets = self.store.load_assets().await?;
        let albums = self.store.load_albums().await?;
        let stashed = self.store.load_stashed_albums().await?;

        let mut invalid_assets = std::collections::HashSet::new();
        for (uuid, asset) in &remote.assets {
            if assets.contains_key(uuid) && !self.store.verify_asset(asset).await {
                debug!(uuid = %uuid, "asset failed verification, scheduling re-download");
                invalid_assets.insert(uuid.clone());
            }
        }

        Ok(LocalState {
            albums,
            assets,
            stashed,
            invalid_assets,
        })
    }

    // ========================================================================
    // Asset phase
    // ========================================================================

    /// Download every `AssetAdd` with bounded parallelism.
    ///
    /// All downloads settle (success or terminal failure) before this
    /// returns; structure operations rely on that barrier.
    async fn download_assets(&self, plan: &[SyncOperation], result: &mut RunResult) {
        let adds: Vec<Asset> = plan
            .iter()
            .filter_map(|op| match op {
                SyncOperation::AssetAdd(asset) => Some(asset.clone()),
                _ => None,
            })
            .collect();
        if adds.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.download_threads));
        let mut tasks = JoinSet::new();

        for asset in adds {
            let semaphore = Arc::clone(&semaphore);
            let remote = Arc::clone(&self.remote);
            let store = self.store.clone();
            let events = self.events.clone();
            let cancel = self.cancel.clone();
            let max_retries = self.max_retries;
            let retry_base = self.retry_base;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");

                let outcome = with_retry(
                    "download_asset",
                    max_retries,
                    retry_base,
                    &cancel,
                    || {
                        let remote = Arc::clone(&remote);
                        let store = store.clone();
                        let asset = asset.clone();
                        async move {
                            let bytes = remote.download_asset(&asset).await.map_err(|e| {
                                anyhow::Error::from(LibraryError::DownloadFailed {
                                    uuid: asset.uuid.clone(),
                                    reason: format!("{e:#}"),
                                })
                            })?;
                            store.write_asset(&asset, &bytes).await?;
                            Ok(())
                        }
                    },
                )
                .await;

                events.emit(SyncEvent::RecordCompleted {
                    uuid: asset.uuid.clone(),
                    success: outcome.is_ok(),
                });
                (asset.uuid, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => result.assets_downloaded += 1,
                Ok((uuid, Err(err))) => {
                    warn!(uuid = %uuid, error = %err, "asset failed for this run");
                    result.failed_assets.push((uuid, format!("{err:#}")));
                }
                Err(join_err) => {
                    warn!(error = %join_err, "download task panicked");
                    result.errors.push(format!("download task failed: {join_err}"));
                }
            }
        }
    }

    // ========================================================================
    // Structure phase
    // ========================================================================

    /// Apply album and asset-removal operations serially, in plan order.
    async fn apply_structure(&self, plan: &[SyncOperation], result: &mut RunResult) -> Result<()> {
        for action in structure_actions(plan) {
            self.check_cancelled()?;
            match action {
                StructureAction::Stash(album) => {
                    self.store.stash_archived_album(&album).await?;
                    result.albums_stashed += 1;
                }
                StructureAction::Remove(album) => match self.store.delete_album(&album).await {
                    Ok(()) => result.albums_removed += 1,
                    // user content appeared after the plan was computed:
                    // invariant-threatening, halt before anything is lost
                    Err(e @ LibraryError::NotEmpty(_)) => return Err(e.into()),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!(uuid = %album.uuid, error = %e, "album remove skipped");
                        result.errors.push(format!("remove {}: {e}", album.uuid));
                    }
                },
                StructureAction::RemoveAsset(record) => {
                    match self.store.delete_asset(&record).await {
                        Ok(()) => result.assets_removed += 1,
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => {
                            warn!(uuid = %record.uuid, error = %e, "asset remove skipped");
                            result.errors.push(format!("remove asset {}: {e}", record.uuid));
                        }
                    }
                }
                StructureAction::Retrieve(album) => {
                    match self.store.retrieve_stashed_album(&album).await {
                        Ok(()) => result.albums_retrieved += 1,
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => {
                            warn!(uuid = %album.uuid, error = %e, "album retrieve skipped");
                            result.errors.push(format!("retrieve {}: {e}", album.uuid));
                        }
                    }
                }
                StructureAction::Add(album) => match self.store.write_album(&album).await {
                    Ok(()) => result.albums_added += 1,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    // tolerated on re-run over a partially written tree
                    Err(LibraryError::AlreadyExists(path)) => {
                        debug!(uuid = %album.uuid, path = %path.display(), "album already present");
                    }
                    Err(e) => {
                        warn!(uuid = %album.uuid, error = %e, "album add skipped");
                        result.errors.push(format!("add {}: {e}", album.uuid));
                    }
                },
                StructureAction::Rename { from, to } => {
                    match self.store.rename_album(&from, &to).await {
                        Ok(()) => result.albums_renamed += 1,
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        Err(e) => {
                            warn!(uuid = %to.uuid, error = %e, "album rename skipped");
                            result.errors.push(format!("rename {}: {e}", to.uuid));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Remote delete signal
    // ========================================================================

    /// Forward the delete-remote signal for assets mirrored this run.
    ///
    /// Best-effort: the mirror is already consistent, so a failed signal
    /// is only warned about.
    async fn signal_remote_delete(&self, plan: &[SyncOperation], result: &RunResult) {
        let failed: std::collections::HashSet<&str> = result
            .failed_assets
            .iter()
            .map(|(uuid, _)| uuid.as_str())
            .collect();
        let downloaded: Vec<String> = plan
            .iter()
            .filter_map(|op| match op {
                SyncOperation::AssetAdd(a) if !failed.contains(a.uuid.as_str()) => {
                    Some(a.uuid.clone())
                }
                _ => None,
            })
            .collect();
        if downloaded.is_empty() {
            return;
        }

        info!(count = downloaded.len(), "signalling remote delete");
        if let Err(e) = self.remote.delete_assets(&downloaded).await {
            warn!(error = %e, "remote delete signal failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
