//! Sync Coordinator for marksync.
//!
//! Owns the current tree C, the backup tree B (last tree agreed with the
//! remote) and one snapshot per local store, and decides for every local or
//! remote divergence whether to merge or edit. It is the only writer of
//! those trees.
//!
//! The coordinator runs as one task looping over a single `select!` on
//! three sources: the event channel (store changes, login, sync-now,
//! cancel), the outstanding exchange worker, and the current state's
//! deadline. Each wake-up is handled to completion before the next wait.
//!
//! Wait handles: every registered store counts as one, and an outstanding
//! exchange adds one. `handles == stores` outside exchanges,
//! `handles == stores + 1` while one is running, and `stores > 0` in every
//! state except START, CFG and STOP.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::managers::change_applier::{self, ApplyStrategy};
use crate::managers::local_store::LocalStore;
use crate::managers::tree_builder::TreeBuilder;
use crate::services::credential_store::{CredentialStore, CredentialStoreTrait};
use crate::services::diff_engine::DiffEngine;
use crate::services::exchange::{ExchangeReply, ExchangeRequest, RemoteExchange};
use crate::services::snapshot_store::{self, SnapshotStore, SnapshotStoreTrait};
use crate::types::bookmark::BookmarkModel;
use crate::types::credential::Credentials;
use crate::types::errors::ExchangeError;
use crate::types::settings::{SyncSettings, SyncTiming};
use crate::types::sync::{describe, next_state, SyncEvent, SyncState, SyncStatus, Trigger};

/// Cloneable sender side of the coordinator's event channel.
///
/// Every method returns false once the coordinator is gone.
#[derive(Clone, Debug)]
pub struct SyncNotifier {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncNotifier {
    pub fn store_changed(&self, index: usize) -> bool {
        self.tx.send(SyncEvent::StoreChanged(index)).is_ok()
    }

    pub fn login(&self, credentials: Credentials) -> bool {
        self.tx.send(SyncEvent::Login(credentials)).is_ok()
    }

    pub fn sync_now(&self) -> bool {
        self.tx.send(SyncEvent::SyncNow).is_ok()
    }

    pub fn cancel(&self) -> bool {
        self.tx.send(SyncEvent::Cancel).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(SyncEvent::Shutdown).is_ok()
    }
}

type ExchangeOutcome = Result<ExchangeReply, ExchangeError>;

/// The outstanding exchange and the tree it uploaded.
struct Worker {
    handle: JoinHandle<ExchangeOutcome>,
    sent: BookmarkModel,
}

enum Wake {
    Event(Option<SyncEvent>),
    Exchange(Result<ExchangeOutcome, JoinError>),
    Timer,
}

async fn join_worker(worker: Option<&mut Worker>) -> Result<ExchangeOutcome, JoinError> {
    match worker {
        Some(worker) => (&mut worker.handle).await,
        None => std::future::pending().await,
    }
}

pub struct SyncCoordinator {
    state: SyncState,
    timing: SyncTiming,
    engine: DiffEngine,
    db: Database,
    client_id: Uuid,
    credentials: Option<Credentials>,
    remote: Arc<dyn RemoteExchange>,
    stores: Vec<Box<dyn LocalStore>>,
    /// Last tree read from (or written to) each store; `None` until the
    /// store has been read successfully once.
    snapshots: Vec<Option<BookmarkModel>>,
    registered: bool,
    current: Arc<Mutex<BookmarkModel>>,
    backup: BookmarkModel,
    worker: Option<Worker>,
    expire: Option<Instant>,
    attempts: u32,
    status: Arc<Mutex<SyncStatus>>,
    tx: mpsc::UnboundedSender<SyncEvent>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
}

impl SyncCoordinator {
    /// # Panics
    /// Panics if `stores` is empty.
    pub fn new(
        db: Database,
        stores: Vec<Box<dyn LocalStore>>,
        remote: Arc<dyn RemoteExchange>,
        settings: &SyncSettings,
        credentials: Option<Credentials>,
    ) -> Self {
        assert!(!stores.is_empty(), "at least one local store is required");
        let (tx, events) = mpsc::unbounded_channel();
        let snapshots = stores.iter().map(|_| None).collect();
        Self {
            state: SyncState::Start,
            timing: settings.timing(),
            engine: DiffEngine::with_hidden_prefix(settings.hidden_prefix()),
            db,
            client_id: settings.remote.client_id.unwrap_or_else(Uuid::nil),
            credentials,
            remote,
            stores,
            snapshots,
            registered: false,
            current: Arc::new(Mutex::new(BookmarkModel::new())),
            backup: BookmarkModel::new(),
            worker: None,
            expire: None,
            attempts: 0,
            status: Arc::new(Mutex::new(SyncStatus::new(SyncState::Start))),
            tx,
            events,
        }
    }

    /// Overrides the timing resolved from settings.
    pub fn with_timing(mut self, timing: SyncTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn notifier(&self) -> SyncNotifier {
        SyncNotifier {
            tx: self.tx.clone(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn status(&self) -> SyncStatus {
        self.status.lock().clone()
    }

    /// Shared status for observers on other tasks.
    pub fn status_handle(&self) -> Arc<Mutex<SyncStatus>> {
        Arc::clone(&self.status)
    }

    /// The current tree, readable by observers under its lock.
    pub fn current_handle(&self) -> Arc<Mutex<BookmarkModel>> {
        Arc::clone(&self.current)
    }

    pub fn backup(&self) -> &BookmarkModel {
        &self.backup
    }

    /// Number of registered local stores.
    pub fn stores(&self) -> usize {
        if self.registered {
            self.stores.len()
        } else {
            0
        }
    }

    /// Active wait handles: one per registered store, plus one per exchange.
    pub fn handles(&self) -> usize {
        self.stores() + usize::from(self.worker.is_some())
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.expire
    }

    pub fn check_invariants(&self) -> bool {
        let exchanging = self.worker.is_some();
        exchanging == self.state.is_exchanging()
            && (self.stores() > 0) == self.state.has_stores()
            && self.handles() == self.stores() + usize::from(exchanging)
    }

    // ── driving ─────────────────────────────────────────────────────────

    /// Leaves START: restores or rebuilds the trees and picks the first state.
    pub fn start(&mut self) {
        assert_eq!(self.state, SyncState::Start, "start called twice");
        if self.credentials.is_none() {
            self.transition(Trigger::StartErr);
            return;
        }
        self.registered = true;
        if self.restore_snapshots() {
            self.reconcile_stores();
            self.propagate();
            self.persist();
            self.transition(Trigger::StartOk1);
            self.expire = Some(Instant::now() + self.timing.settle_delay);
        } else {
            self.rebuild_from_stores();
            self.transition(Trigger::StartOk0);
            self.expire = Some(Instant::now());
        }
    }

    /// Waits for the next wake-up and handles it. Returns false once stopped.
    pub async fn step(&mut self) -> bool {
        if self.state == SyncState::Stop {
            return false;
        }
        let armed = self.expire.is_some();
        let deadline = self
            .expire
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(24 * 60 * 60));
        let exchanging = self.worker.is_some();

        let wake = tokio::select! {
            event = self.events.recv() => Wake::Event(event),
            result = join_worker(self.worker.as_mut()), if exchanging => Wake::Exchange(result),
            _ = sleep_until(deadline), if armed => Wake::Timer,
        };

        match wake {
            // every notifier is gone; nothing can drive us any more
            Wake::Event(None) => self.handle_event(SyncEvent::Shutdown),
            Wake::Event(Some(event)) => self.handle_event(event),
            Wake::Exchange(result) => {
                let sent = match self.worker.take() {
                    Some(worker) => worker.sent,
                    None => BookmarkModel::new(),
                };
                self.refresh_counts();
                let outcome = result.unwrap_or_else(|e| {
                    Err(ExchangeError::MalformedResponse(format!("exchange task failed: {}", e)))
                });
                self.on_exchange_result(outcome, sent);
            }
            Wake::Timer => self.on_timer(),
        }
        debug_assert!(self.check_invariants(), "invariants broken in {}", self.state);
        self.state != SyncState::Stop
    }

    /// Starts (if needed) and runs until STOP.
    pub async fn run(mut self) {
        if self.state == SyncState::Start {
            self.start();
        }
        while self.step().await {}
        info!("sync coordinator stopped");
    }

    pub fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::StoreChanged(index) => self.on_store_changed(index),
            SyncEvent::Login(credentials) => self.on_login(credentials),
            SyncEvent::SyncNow => self.on_tick(Trigger::SyncNow),
            SyncEvent::Cancel => self.stop(Trigger::UserCancel),
            SyncEvent::Shutdown => self.stop(Trigger::Shutdown),
        }
    }

    pub fn on_timer(&mut self) {
        self.expire = None;
        self.on_tick(Trigger::TimerExpired);
    }

    // ── event handlers ──────────────────────────────────────────────────

    fn on_tick(&mut self, trigger: Trigger) {
        let from = self.state;
        let Some(to) = next_state(from, trigger) else {
            debug!(state = %from, ?trigger, "ignored");
            return;
        };
        if to == from {
            // SYNCW: the exchange is still running, nothing to reschedule onto
            return;
        }
        self.transition(trigger);
        self.spawn_exchange();
    }

    /// Reads the changed store and brings its changes into C.
    pub fn on_store_changed(&mut self, index: usize) {
        if !self.registered || index >= self.stores.len() {
            return;
        }
        let fresh = match self.stores[index].load() {
            Ok(tree) => tree,
            Err(e) => {
                warn!(store = self.stores[index].name(), error = %e, "store unavailable this cycle");
                self.set_error(e.to_string());
                return;
            }
        };
        let edits = self.absorb(index, fresh);
        self.save_snapshot(index);
        if edits == 0 {
            return;
        }
        info!(store = self.stores[index].name(), edits, "local change");
        self.propagate();
        self.persist();

        match next_state(self.state, Trigger::LocalChange) {
            Some(SyncState::Wait) => {
                let settle = Instant::now() + self.timing.settle_delay;
                // a pending backoff in WAIT is not shortened by local edits
                self.expire = match (self.state, self.expire) {
                    (SyncState::Wait, Some(pending)) => Some(pending.max(settle)),
                    _ => Some(settle),
                };
                self.transition(Trigger::LocalChange);
            }
            Some(_) => self.transition(Trigger::LocalChange),
            None => {}
        }
    }

    fn on_login(&mut self, credentials: Credentials) {
        if self.state != SyncState::Cfg {
            debug!(state = %self.state, "login ignored");
            return;
        }
        let store = CredentialStore::new(self.db.connection(), self.client_id.as_bytes());
        if let Err(e) = store.save(&credentials) {
            warn!(error = %e, "could not persist login");
        }
        self.credentials = Some(credentials);
        self.registered = true;
        self.rebuild_from_stores();
        self.transition(Trigger::Login);
        self.spawn_exchange();
    }

    pub fn on_exchange_result(&mut self, outcome: ExchangeOutcome, sent: BookmarkModel) {
        match outcome {
            Ok(reply) => {
                self.apply_reply(reply, &sent);
                self.attempts = 0;
                self.transition(Trigger::ExchangeOk);
                match self.state {
                    SyncState::Sync => self.spawn_exchange(),
                    SyncState::Idle => {
                        self.expire = self
                            .timing
                            .auto_sync
                            .then(|| Instant::now() + self.timing.sync_interval);
                    }
                    SyncState::Wait => {
                        self.expire = Some(Instant::now() + self.timing.settle_delay);
                    }
                    _ => {}
                }
            }
            Err(err) if err.is_permanent() => {
                warn!(error = %err, "exchange rejected");
                self.set_error(err.to_string());
                self.credentials = None;
                let store = CredentialStore::new(self.db.connection(), self.client_id.as_bytes());
                if let Err(e) = store.clear() {
                    warn!(error = %e, "could not clear rejected login");
                }
                self.enter_cfg(Trigger::PermanentError);
            }
            Err(err) => {
                warn!(error = %err, attempt = self.attempts, "exchange failed");
                self.set_error(err.to_string());
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| self.timing.backoff(self.attempts))
                    .min(self.timing.retry_interval);
                self.attempts = self.attempts.saturating_add(1);
                if self.state == SyncState::Login {
                    self.enter_cfg(Trigger::TemporaryError);
                } else {
                    self.transition(Trigger::TemporaryError);
                    self.expire = Some(Instant::now() + delay);
                }
            }
        }
    }

    // ── tree work ───────────────────────────────────────────────────────

    /// Merges the first reply into C, edits later ones; then adopts the token.
    fn apply_reply(&mut self, reply: ExchangeReply, sent: &BookmarkModel) {
        let token = reply.token();
        {
            let mut current = self.current.lock();
            let edits = if self.state.is_first_exchange() {
                let old = current.clone();
                change_applier::apply(&self.engine, ApplyStrategy::Merge, &reply.tree, &old, &mut current)
            } else {
                change_applier::apply(&self.engine, ApplyStrategy::Edit, &reply.tree, sent, &mut current)
            };
            let mut builder = TreeBuilder::new(&mut current);
            builder.edit_root();
            builder.set_subscription_seq_no(token);
            builder.end_subscription();
            info!(edits, token, "exchange applied");
        }
        self.backup = reply.tree;
        self.propagate();
        self.persist();
    }

    /// Starts from an empty C and merges every readable store into it.
    fn rebuild_from_stores(&mut self) {
        let mut current = BookmarkModel::new();
        for index in 0..self.stores.len() {
            match self.stores[index].load() {
                Ok(fresh) => {
                    let old = current.clone();
                    change_applier::apply(&self.engine, ApplyStrategy::Merge, &fresh, &old, &mut current);
                    self.snapshots[index] = Some(fresh);
                }
                Err(e) => {
                    warn!(store = self.stores[index].name(), error = %e, "store unavailable this cycle");
                    self.snapshots[index] = None;
                }
            }
        }
        *self.current.lock() = current;
        self.backup = BookmarkModel::new();
        self.propagate();
        self.persist();
    }

    /// Loads C, B and every store snapshot. False if any is missing or unreadable.
    fn restore_snapshots(&mut self) -> bool {
        let snapshots = SnapshotStore::new(self.db.connection());
        let names: Vec<&str> = self.stores.iter().map(|s| s.name()).collect();
        match snapshots.has_recoverable(&names) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(error = %e, "snapshot lookup failed");
                return false;
            }
        }
        let load = |name: &str| match snapshots.load_tree(name) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(tree = name, error = %e, "snapshot unreadable");
                None
            }
        };
        let (Some(current), Some(backup)) = (load(snapshot_store::CURRENT), load(snapshot_store::BACKUP)) else {
            return false;
        };
        let mut stores = Vec::with_capacity(names.len());
        for name in &names {
            match load(&snapshot_store::store_key(name)) {
                Some(tree) => stores.push(Some(tree)),
                None => return false,
            }
        }
        *self.current.lock() = current;
        self.backup = backup;
        self.snapshots = stores;
        true
    }

    /// Edits each store's drift since its snapshot into C.
    fn reconcile_stores(&mut self) {
        for index in 0..self.stores.len() {
            let fresh = match self.stores[index].load() {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(store = self.stores[index].name(), error = %e, "store unavailable this cycle");
                    continue;
                }
            };
            self.absorb(index, fresh);
        }
    }

    /// Brings a fresh read of store `index` into C and makes it the store's
    /// snapshot. A store seen for the first time is merged; afterwards only
    /// its drift since the snapshot is edited in.
    fn absorb(&mut self, index: usize, fresh: BookmarkModel) -> usize {
        let edits = {
            let mut current = self.current.lock();
            match &self.snapshots[index] {
                Some(snapshot) => {
                    change_applier::apply(&self.engine, ApplyStrategy::Edit, &fresh, snapshot, &mut current)
                }
                None => {
                    debug!(store = self.stores[index].name(), "first read, merging");
                    let old = current.clone();
                    change_applier::apply(&self.engine, ApplyStrategy::Merge, &fresh, &old, &mut current)
                }
            }
        };
        self.snapshots[index] = Some(fresh);
        edits
    }

    /// Rewrites every store whose snapshot differs from C. Stores never read
    /// successfully are left alone.
    fn propagate(&mut self) {
        let current = self.current.lock().clone();
        for index in 0..self.stores.len() {
            let Some(snapshot) = &self.snapshots[index] else {
                continue;
            };
            if self.engine.equivalent(&current, snapshot) {
                continue;
            }
            match self.stores[index].save(&current) {
                Ok(()) => {
                    debug!(store = self.stores[index].name(), "store updated");
                    self.snapshots[index] = Some(current.clone());
                }
                Err(e) => {
                    warn!(store = self.stores[index].name(), error = %e, "store unavailable this cycle");
                }
            }
        }
    }

    fn persist(&self) {
        let snapshots = SnapshotStore::new(self.db.connection());
        let current = self.current.lock().clone();
        let saved = snapshots
            .save_tree(snapshot_store::CURRENT, &current)
            .and_then(|_| snapshots.save_tree(snapshot_store::BACKUP, &self.backup));
        if let Err(e) = saved {
            warn!(error = %e, "could not persist trees");
        }
        for index in 0..self.stores.len() {
            self.save_snapshot(index);
        }
    }

    fn save_snapshot(&self, index: usize) {
        let snapshots = SnapshotStore::new(self.db.connection());
        let key = snapshot_store::store_key(self.stores[index].name());
        // an unread store has no snapshot; a stale row would make it look recoverable
        let saved = match &self.snapshots[index] {
            Some(tree) => snapshots.save_tree(&key, tree),
            None => snapshots.delete_tree(&key),
        };
        if let Err(e) = saved {
            warn!(store = self.stores[index].name(), error = %e, "could not persist snapshot");
        }
    }

    // ── state bookkeeping ───────────────────────────────────────────────

    fn spawn_exchange(&mut self) {
        assert!(self.worker.is_none(), "only one exchange may be active");
        let Some(credentials) = self.credentials.clone() else {
            self.enter_cfg(Trigger::PermanentError);
            return;
        };
        let sent = self.current.lock().clone();
        let request = ExchangeRequest {
            credentials,
            client_id: self.client_id,
            token: sent.seq_no(),
            tree: sent.clone(),
        };
        debug!(token = request.token, "starting exchange");
        let handle = tokio::spawn(self.remote.exchange(request));
        self.worker = Some(Worker { handle, sent });
        self.expire = None;
        self.refresh_counts();
    }

    fn abort_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.handle.abort();
            debug!("outstanding exchange aborted");
        }
        self.refresh_counts();
    }

    fn enter_cfg(&mut self, trigger: Trigger) {
        self.abort_worker();
        self.persist();
        self.registered = false;
        self.expire = None;
        self.transition(trigger);
    }

    /// Tears everything down. Observers keep the last applied C.
    fn stop(&mut self, trigger: Trigger) {
        if self.state == SyncState::Stop {
            return;
        }
        self.abort_worker();
        if self.registered {
            self.persist();
        }
        self.registered = false;
        self.expire = None;
        self.transition(trigger);
        self.current = Arc::new(Mutex::new(BookmarkModel::new()));
        self.backup = BookmarkModel::new();
        self.events.close();
    }

    fn transition(&mut self, trigger: Trigger) {
        let from = self.state;
        let Some(to) = next_state(from, trigger) else {
            debug!(state = %from, ?trigger, "no transition");
            return;
        };
        info!(from = %from, to = %to, ?trigger, "sync state");
        self.state = to;
        let mut status = self.status.lock();
        status.state = to;
        status.message = match (to, &status.last_error) {
            (SyncState::Retry | SyncState::Wait | SyncState::Cfg, Some(err)) => {
                format!("{}: {}", describe(to), err)
            }
            _ => describe(to).to_string(),
        };
        if matches!(to, SyncState::Idle) {
            status.last_error = None;
        }
        drop(status);
        self.refresh_counts();
    }

    fn refresh_counts(&self) {
        let mut status = self.status.lock();
        status.stores = self.stores();
        status.handles = self.handles();
    }

    fn set_error(&mut self, message: String) {
        self.status.lock().last_error = Some(message);
    }
}
