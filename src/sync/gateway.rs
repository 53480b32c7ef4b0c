use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::SyncResult;

use super::models::{Board, BoardSnapshot, ChangeEvent, Row, Table};

/// The only seam between the sync core and the backend.
///
/// Real implementation: `SqliteGateway`. Tests wrap it to inject failures.
/// Every row returned by an implementation must already have passed
/// `Row::decode`, so nothing untyped reaches the entity store.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_boards(&self, owner_id: &str) -> SyncResult<Vec<Board>>;

    /// Full snapshot fetch of one board's columns and tasks.
    async fn list(&self, board_id: Uuid) -> SyncResult<BoardSnapshot>;

    /// Persist a new row and return it as stored, including server-set
    /// timestamps.
    async fn insert(&self, row: Row) -> SyncResult<Row>;

    /// Merge the fields of `patch` (a JSON object) onto a stored row.
    async fn update(&self, table: Table, id: Uuid, patch: serde_json::Value) -> SyncResult<()>;

    /// Delete a row. Boards and columns cascade to their children.
    async fn remove(&self, table: Table, id: Uuid) -> SyncResult<()>;

    /// Open the change feed for one board.
    async fn subscribe(&self, board_id: Uuid) -> SyncResult<Subscription>;
}

/// A live change feed for one board: a bounded, ordered stream of decoded
/// events. Dropping it unsubscribes.
pub struct Subscription {
    board_id: Uuid,
    events: mpsc::Receiver<ChangeEvent>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(
        board_id: Uuid,
        events: mpsc::Receiver<ChangeEvent>,
        forwarder: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            board_id,
            events,
            forwarder,
        }
    }

    /// A subscription fed directly by the caller, without a forwarding task.
    pub fn from_channel(board_id: Uuid, events: mpsc::Receiver<ChangeEvent>) -> Self {
        Self::new(board_id, events, None)
    }

    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    /// Next event in arrival order; `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
