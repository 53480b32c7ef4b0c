use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::SyncError;

use super::gateway::Subscription;
use super::models::ChangeEvent;

/// Default number of undelivered messages the broadcast side retains per
/// receiver before it starts reporting lag.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// Server-side change feed shared by every client of one backend.
///
/// Committed writes are published as JSON text, the same shape a
/// websocket push would carry. Each subscriber gets its own forwarding
/// task that decodes, filters to one board and pushes into a bounded
/// channel, so a slow client only ever lags itself.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<String>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Serialize and publish a change event.
    /// Returns silently even if no clients are subscribed.
    pub fn publish(&self, event: &ChangeEvent) {
        let json = event
            .to_wire()
            .and_then(|wire| serde_json::to_string(&wire).map_err(|e| SyncError::Other(e.into())));
        match json {
            Ok(json) => {
                let _ = self.tx.send(json);
            }
            Err(e) => warn!(error = %e, "failed to serialize change event"),
        }
    }

    /// Publish a raw message as-is. Lets tests push malformed payloads.
    pub fn publish_raw(&self, json: impl Into<String>) {
        let _ = self.tx.send(json.into());
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Subscribe to one board's events.
    ///
    /// The broadcast receiver is created before this returns, so every
    /// event published afterwards is observed. A subscriber that falls more
    /// than the broadcast capacity behind is closed rather than fed a gap.
    pub fn subscribe(&self, board_id: Uuid, capacity: usize) -> Subscription {
        let mut rx = self.tx.subscribe();
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));

        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(json) => {
                        let event = match ChangeEvent::decode(&json) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(%board_id, error = %e, "dropping malformed change event");
                                continue;
                            }
                        };
                        if event.row.board_id() != board_id {
                            continue;
                        }
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Skipped events cannot be replayed; close so the
                        // subscriber refetches instead of silently diverging.
                        warn!(%board_id, skipped, "change feed lagged; closing subscription");
                        break;
                    }
                }
            }
            debug!(%board_id, "change feed forwarder stopped");
        });

        Subscription::new(board_id, events_rx, Some(forwarder))
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}
