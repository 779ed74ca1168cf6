use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use prefsync_store::{NativeStore, Scope, StoreId, StoreResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::handle::StoreHandle;
use crate::registry::HandleRegistry;
use crate::scheduler::{Job, JobRunner, Scheduler};
use crate::tracker::ChangeTracker;

/// Bookkeeping guarded by the synchronizer's main lock.
#[derive(Debug, Default)]
struct SyncState {
    registry: HandleRegistry,
    tracker: ChangeTracker,
    /// Generation of the armed flush job. `Some` iff a flush is pending.
    flush_token: Option<u64>,
    generation: u64,
    periodic_sync_started: bool,
}

pub(crate) struct Shared {
    native: Arc<dyn NativeStore>,
    config: SyncConfig,
    state: Mutex<SyncState>,
    /// Held by flush, sync and multi-record structural edits.
    structure: Mutex<()>,
    scheduler: Scheduler,
}

/// Point-in-time counters, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub live_handles: usize,
    pub dirty_handles: usize,
    pub flush_pending: bool,
}

/// Coordinates handles, dirty tracking and the flush/sync timers for one
/// native store.
///
/// Cheap to clone; clones share state. Create one per process (or per test)
/// and hand it to the preference roots. When the last clone is dropped, the
/// timer thread stops and any dirty handles get one final best-effort flush.
///
/// # Locking
///
/// All registry, tracker and timer bookkeeping happens under one mutex. A
/// second, coarser lock ([`with_structure_lock`](Self::with_structure_lock))
/// is taken before it by flush, sync and callers that must update two
/// records atomically with respect to them. Do not flush or sync from inside
/// `with_structure_lock`.
#[derive(Clone)]
pub struct Synchronizer {
    shared: Arc<Shared>,
}

impl Synchronizer {
    /// Start a synchronizer over `native` and spawn its timer thread.
    pub fn new(native: Arc<dyn NativeStore>, config: SyncConfig) -> SyncResult<Self> {
        let scheduler = Scheduler::spawn()?;
        let shared = Arc::new(Shared {
            native,
            config,
            state: Mutex::new(SyncState::default()),
            structure: Mutex::new(()),
            scheduler,
        });
        let runner: Weak<dyn JobRunner> = Arc::downgrade(&shared) as Weak<dyn JobRunner>;
        shared.scheduler.bind(runner);

        info!(
            flush_delay_ms = shared.config.flush_delay().as_millis() as u64,
            sync_interval_ms = shared.config.sync_interval().map(|d| d.as_millis() as u64),
            "synchronizer started"
        );
        Ok(Self { shared })
    }

    /// Start a synchronizer using [`SyncConfig::process`].
    pub fn with_process_config(native: Arc<dyn NativeStore>) -> SyncResult<Self> {
        Self::new(native, SyncConfig::process().clone())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// The shared handle for store `name` in the user or system scope.
    ///
    /// Never fails and does no I/O. The first call also starts the periodic
    /// sync job when one is configured.
    pub fn resolve_handle(&self, name: &str, is_user: bool) -> Arc<StoreHandle> {
        let scope = Scope::from_is_user(is_user);
        let id = StoreId::new(name, scope);
        let mut state = self.shared.lock_state();
        let handle = state.registry.resolve_with(&id, || {
            StoreHandle::new(
                id.clone(),
                scope,
                Arc::clone(&self.shared.native),
                Arc::downgrade(&self.shared),
            )
        });

        if !state.periodic_sync_started {
            state.periodic_sync_started = true;
            if let Some(every) = self.shared.config.sync_interval() {
                self.shared.scheduler.start_sync(every);
                info!(interval_ms = every.as_millis() as u64, "periodic sync enabled");
            }
        }
        handle
    }

    /// Record `handle` as having uncommitted writes and arm the flush timer
    /// if it is not already armed. Never blocks on I/O.
    pub fn mark_dirty(&self, handle: &Arc<StoreHandle>) {
        let mut state = self.shared.lock_state();
        self.shared.mark_dirty_locked(&mut state, handle);
    }

    /// Commit every dirty handle. Returns `true` iff every commit succeeded.
    pub fn flush_all(&self) -> bool {
        self.shared.flush(None)
    }

    /// Commit the dirty handles of `scope`; the other scope stays tracked.
    pub fn flush_scope(&self, scope: Scope) -> bool {
        self.shared.flush(Some(scope))
    }

    /// Commit every live handle, dirty or not, and cancel the pending flush.
    pub fn sync_all(&self) -> bool {
        self.shared.sync(None)
    }

    /// Commit every live handle of `scope` and untrack them.
    pub fn sync_scope(&self, scope: Scope) -> bool {
        self.shared.sync(Some(scope))
    }

    pub fn flush_user(&self) -> bool {
        self.flush_scope(Scope::User)
    }

    pub fn flush_world(&self) -> bool {
        self.flush_all()
    }

    pub fn sync_user(&self) -> bool {
        self.sync_scope(Scope::User)
    }

    pub fn sync_world(&self) -> bool {
        self.sync_all()
    }

    /// Run `f` while holding the structure lock, excluding flush and sync.
    pub fn with_structure_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.shared.lock_structure();
        f()
    }

    pub fn is_dirty(&self, id: &StoreId) -> bool {
        self.shared.lock_state().tracker.contains(id)
    }

    pub fn dirty_ids(&self) -> Vec<StoreId> {
        self.shared.lock_state().tracker.ids()
    }

    pub fn flush_pending(&self) -> bool {
        self.shared.lock_state().flush_token.is_some()
    }

    pub fn stats(&self) -> SyncStats {
        let state = self.shared.lock_state();
        SyncStats {
            live_handles: state.registry.live().len(),
            dirty_handles: state.tracker.len(),
            flush_pending: state.flush_token.is_some(),
        }
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().expect("synchronizer lock poisoned")
    }

    fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure.lock().expect("structure lock poisoned")
    }

    /// Apply a native mutation and mark its handle dirty, atomically with
    /// respect to flush and sync bookkeeping.
    pub(crate) fn apply_mutation(
        &self,
        handle: &Arc<StoreHandle>,
        op: impl FnOnce(&StoreHandle) -> StoreResult<bool>,
    ) -> SyncResult<bool> {
        let mut state = self.lock_state();
        let changed = op(handle)?;
        self.mark_dirty_locked(&mut state, handle);
        Ok(changed)
    }

    fn mark_dirty_locked(&self, state: &mut SyncState, handle: &Arc<StoreHandle>) {
        if state.tracker.insert(handle) {
            debug!(store = %handle.id(), "marked dirty");
        }
        if state.flush_token.is_none() {
            self.arm_flush_locked(state);
        }
    }

    fn arm_flush_locked(&self, state: &mut SyncState) {
        state.generation += 1;
        state.flush_token = Some(state.generation);
        let delay = self.config.flush_delay();
        self.scheduler.arm_flush(state.generation, delay);
        debug!(
            generation = state.generation,
            delay_ms = delay.as_millis() as u64,
            "flush armed"
        );
    }

    fn cancel_flush_locked(&self, state: &mut SyncState) {
        if let Some(generation) = state.flush_token.take() {
            self.scheduler.cancel_flush();
            debug!(generation, "flush cancelled");
        }
    }

    /// Keep the flush token consistent with the tracker: pending iff
    /// something is still dirty.
    fn settle_flush_locked(&self, state: &mut SyncState) {
        if state.tracker.is_empty() {
            self.cancel_flush_locked(state);
        } else if state.flush_token.is_none() {
            self.arm_flush_locked(state);
        }
    }

    fn flush(&self, scope: Option<Scope>) -> bool {
        let _structure = self.lock_structure();
        let mut state = self.lock_state();
        self.flush_locked(&mut state, scope)
    }

    fn flush_locked(&self, state: &mut SyncState, scope: Option<Scope>) -> bool {
        let pending = match scope {
            Some(scope) => state.tracker.drain_scope(scope),
            None => state.tracker.drain_all(),
        };

        let mut ok = true;
        for handle in pending {
            match handle.commit() {
                Ok(()) => debug!(store = %handle.id(), "flushed"),
                Err(e) => {
                    warn!(store = %handle.id(), error = %e, "flush failed; will retry");
                    ok = false;
                    state.tracker.insert(&handle);
                }
            }
        }

        self.settle_flush_locked(state);
        ok
    }

    fn sync(&self, scope: Option<Scope>) -> bool {
        let _structure = self.lock_structure();
        let mut state = self.lock_state();

        let live = match scope {
            Some(scope) => state.registry.live_in(scope),
            None => state.registry.live(),
        };

        let mut ok = true;
        for handle in &live {
            if let Err(e) = handle.commit() {
                warn!(store = %handle.id(), error = %e, "sync failed");
                ok = false;
            }
        }

        match scope {
            Some(scope) => drop(state.tracker.drain_scope(scope)),
            None => state.tracker.clear(),
        }
        self.settle_flush_locked(&mut state);

        debug!(scope = ?scope, handles = live.len(), ok, "sync complete");
        ok
    }

    fn run_scheduled_flush(&self, generation: u64) {
        let _structure = self.lock_structure();
        let mut state = self.lock_state();
        if state.flush_token != Some(generation) {
            debug!(generation, "stale flush job ignored");
            return;
        }
        state.flush_token = None;
        let ok = self.flush_locked(&mut state, None);
        debug!(generation, ok, "scheduled flush complete");
    }
}

impl JobRunner for Shared {
    fn run_job(&self, job: Job) {
        match job {
            Job::Flush { generation } => self.run_scheduled_flush(generation),
            Job::Sync => {
                self.sync(None);
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pending = state.tracker.drain_all();
        if pending.is_empty() {
            return;
        }

        let mut failed = 0usize;
        for handle in &pending {
            if let Err(e) = handle.commit() {
                warn!(store = %handle.id(), error = %e, "final flush failed");
                failed += 1;
            }
        }
        info!(
            committed = pending.len() - failed,
            failed,
            "final flush on shutdown"
        );
    }
}
