use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::errors::{SyncError, SyncResult};

use super::context::BoardContext;
use super::models::{ChangeEvent, ChangeKind, EntityKey, Row};
use super::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
}

/// What applying one change event did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

/// Fold one remote change event into the store.
///
/// Idempotent: an insert for an id already present replaces it (that is how
/// the echo of an optimistic create lands), a delete of an absent entity is
/// a no-op. A task row is only accepted while its column is loaded. Events
/// for any board other than the loaded one are ignored, as are board rows,
/// which the session manager owns.
pub fn apply_event(store: &mut EntityStore, event: &ChangeEvent) -> Applied {
    let Some(board_id) = store.board_id() else {
        return Applied::Ignored;
    };
    if event.row.board_id() != board_id {
        return Applied::Ignored;
    }

    match (event.kind, &event.row) {
        (_, Row::Board(_)) => Applied::Ignored,
        (ChangeKind::Insert | ChangeKind::Update, Row::Task(task))
            if store.column(task.column_id).is_none() =>
        {
            warn!(
                task = %task.id,
                column = %task.column_id,
                "dropping task row whose column is not on this board"
            );
            Applied::Ignored
        }
        (ChangeKind::Insert | ChangeKind::Update, row) => {
            let existed = store.contains(row.key());
            store.put(row.clone());
            if existed { Applied::Replaced } else { Applied::Inserted }
        }
        (ChangeKind::Delete, Row::Column(column)) => {
            let orphans: Vec<Uuid> = store.tasks_in(column.id).iter().map(|t| t.id).collect();
            for id in orphans {
                store.remove(EntityKey::task(id));
            }
            match store.remove(EntityKey::column(column.id)) {
                Some(_) => Applied::Removed,
                None => Applied::Ignored,
            }
        }
        (ChangeKind::Delete, row) => match store.remove(row.key()) {
            Some(_) => Applied::Removed,
            None => Applied::Ignored,
        },
    }
}

/// Owns the live change feed of the active board and drains it into the
/// store in arrival order.
pub struct Reconciler {
    ctx: BoardContext,
    state: SubscriptionState,
    board_id: Option<Uuid>,
    drain: Option<JoinHandle<()>>,
}

impl Reconciler {
    pub fn new(ctx: BoardContext) -> Self {
        Self {
            ctx,
            state: SubscriptionState::Unsubscribed,
            board_id: None,
            drain: None,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        match (&self.state, &self.drain) {
            (SubscriptionState::Active, Some(drain)) if drain.is_finished() => {
                SubscriptionState::Unsubscribed
            }
            (state, _) => *state,
        }
    }

    pub fn board_id(&self) -> Option<Uuid> {
        self.board_id
    }

    pub fn is_live(&self) -> bool {
        self.state() == SubscriptionState::Active
    }

    /// Subscribe to `board_id`, replacing any current subscription.
    ///
    /// Events are only applied while the session epoch observed here is
    /// still current; the drain stops at the first event after a switch.
    pub async fn subscribe(&mut self, board_id: Uuid) -> SyncResult<()> {
        self.unsubscribe();
        self.state = SubscriptionState::Subscribing;
        let epoch = self.ctx.epoch();

        let mut subscription = match self.ctx.gateway().subscribe(board_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.state = SubscriptionState::Unsubscribed;
                warn!(%board_id, error = %e, "could not subscribe to board changes");
                return Err(match e {
                    SyncError::Subscription(_) => e,
                    other => SyncError::Subscription(other.to_string()),
                });
            }
        };
        if self.ctx.epoch() != epoch {
            self.state = SubscriptionState::Unsubscribed;
            return Err(SyncError::Subscription(format!(
                "Board {} is no longer active",
                board_id
            )));
        }

        let ctx = self.ctx.clone();
        self.drain = Some(tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                if ctx.epoch() != epoch {
                    break;
                }
                match ctx.mutate(|store| apply_event(store, &event)) {
                    Ok(applied) => trace!(
                        table = %event.table(),
                        id = %event.row.id(),
                        ?applied,
                        "change applied"
                    ),
                    Err(e) => {
                        warn!(%board_id, error = %e, "stopping change drain");
                        break;
                    }
                }
            }
            debug!(%board_id, "change drain stopped; board is no longer live");
        }));
        self.board_id = Some(board_id);
        self.state = SubscriptionState::Active;
        debug!(%board_id, "subscribed to board changes");
        Ok(())
    }

    /// Drop the current subscription. No event is applied afterwards.
    pub fn unsubscribe(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        if let Some(board_id) = self.board_id.take() {
            debug!(%board_id, "unsubscribed from board changes");
        }
        self.state = SubscriptionState::Unsubscribed;
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}
