use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::errors::{SyncError, SyncResult};

use super::gateway::RemoteGateway;
use super::models::BoardView;
use super::store::EntityStore;

/// Explicitly constructed handle shared by the engine, the reconciler and
/// the session manager of one client.
///
/// The store mutex is only ever held inside the synchronous closures passed
/// to [`read`](Self::read) and [`mutate`](Self::mutate), never across an
/// `.await`, so every store change is one uninterruptible step.
#[derive(Clone)]
pub struct BoardContext {
    store: Arc<Mutex<EntityStore>>,
    gateway: Arc<dyn RemoteGateway>,
    revisions: Arc<watch::Sender<u64>>,
    epoch: Arc<AtomicU64>,
}

impl BoardContext {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        let (revisions, _) = watch::channel(0);
        Self {
            store: Arc::new(Mutex::new(EntityStore::new())),
            gateway,
            revisions: Arc::new(revisions),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.gateway
    }

    pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> SyncResult<R> {
        let guard = self.store.lock().map_err(|_| SyncError::LockPoisoned)?;
        Ok(f(&*guard))
    }

    /// Run one synchronous store mutation and publish the new revision if
    /// anything changed.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut EntityStore) -> R) -> SyncResult<R> {
        let mut guard = self.store.lock().map_err(|_| SyncError::LockPoisoned)?;
        let before = guard.revision();
        let result = f(&mut *guard);
        let after = guard.revision();
        drop(guard);
        if after != before {
            self.revisions.send_replace(after);
        }
        Ok(result)
    }

    /// Receiver that fires whenever the store changes; the UI re-render hook.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.revisions.subscribe()
    }

    pub fn view(&self) -> SyncResult<BoardView> {
        self.read(|store| store.view())
    }

    /// Current session epoch. Bumped on every board switch so late results
    /// for a previous board can be recognised and discarded.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}
