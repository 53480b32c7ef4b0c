use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BoardsConfig;
use crate::errors::{SyncError, SyncResult};

use super::client_state::ClientState;
use super::context::BoardContext;
use super::models::{Board, BoardSnapshot, Column, Row, Table};
use super::reconciler::{Reconciler, SubscriptionState};

/// Owns which board is active for one account on this device.
///
/// Every switch runs the same sequence: drop the old subscription, advance
/// the session epoch, fetch the new board (seeding starter columns into an
/// empty one), load it into the store, subscribe, then persist the choice.
/// A failed subscribe still leaves the board active, just not live.
pub struct BoardSession {
    owner_id: String,
    ctx: BoardContext,
    reconciler: Reconciler,
    state: Arc<ClientState>,
    settings: BoardsConfig,
    boards: Vec<Board>,
    active: Option<Uuid>,
}

fn board_from(row: Row) -> SyncResult<Board> {
    match row {
        Row::Board(board) => Ok(board),
        other => Err(SyncError::validation(format!(
            "Expected a board row, got a {} row",
            other.table()
        ))),
    }
}

impl BoardSession {
    pub fn new(
        owner_id: impl Into<String>,
        ctx: BoardContext,
        state: Arc<ClientState>,
        settings: BoardsConfig,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            reconciler: Reconciler::new(ctx.clone()),
            ctx,
            state,
            settings,
            boards: Vec::new(),
            active: None,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn context(&self) -> &BoardContext {
        &self.ctx
    }

    /// Board listing as of the last fetch, in listing order.
    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn active_board(&self) -> Option<Uuid> {
        self.active
    }

    pub fn active(&self) -> Option<&Board> {
        let id = self.active?;
        self.boards.iter().find(|b| b.id == id)
    }

    pub fn subscription_state(&self) -> SubscriptionState {
        self.reconciler.state()
    }

    /// Whether the store is being kept current by a change feed.
    pub fn is_live(&self) -> bool {
        self.active.is_some()
            && self.reconciler.board_id() == self.active
            && self.reconciler.is_live()
    }

    pub async fn list_boards(&mut self) -> SyncResult<Vec<Board>> {
        let boards = self.ctx.gateway().list_boards(&self.owner_id).await?;
        self.boards = boards.clone();
        Ok(boards)
    }

    /// Pick and open the board to show at startup, creating the default
    /// board for an account that has none.
    pub async fn bootstrap(&mut self) -> SyncResult<Board> {
        let boards = self.list_boards().await?;
        let Some(first) = boards.first() else {
            info!(owner = %self.owner_id, "no boards yet; creating the default board");
            let name = self.settings.default_board_name.clone();
            return self.create_board(&name).await;
        };

        let remembered = self.state.active_board(&self.owner_id)?;
        let target = match remembered {
            Some(id) if boards.iter().any(|b| b.id == id) => id,
            Some(id) => {
                warn!(owner = %self.owner_id, board = %id, "remembered board no longer exists");
                first.id
            }
            None => first.id,
        };
        self.switch_board(target).await?;
        self.active()
            .cloned()
            .ok_or_else(|| SyncError::board_not_found(target))
    }

    pub async fn switch_board(&mut self, board_id: Uuid) -> SyncResult<()> {
        if !self.boards.iter().any(|b| b.id == board_id) {
            self.list_boards().await?;
            if !self.boards.iter().any(|b| b.id == board_id) {
                return Err(SyncError::board_not_found(board_id));
            }
        }
        info!(owner = %self.owner_id, board = %board_id, "switching board");

        self.reconciler.unsubscribe();
        let epoch = self.ctx.advance_epoch();

        let snapshot = match self.fetch_seeded(board_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(board = %board_id, error = %e, "could not load board");
                if self.ctx.epoch() == epoch {
                    self.ctx.mutate(|store| store.clear())?;
                    self.active = None;
                }
                return Err(e);
            }
        };
        if self.ctx.epoch() != epoch {
            return Err(SyncError::Subscription(format!(
                "Switch to board {} was superseded",
                board_id
            )));
        }
        self.ctx.mutate(|store| store.load(board_id, snapshot))?;
        self.active = Some(board_id);

        let subscribed = self.reconciler.subscribe(board_id).await;
        self.state.set_active_board(&self.owner_id, Some(board_id))?;
        subscribed
    }

    /// Refetch and resubscribe the active board when its change feed has
    /// closed, e.g. after the feed dropped events for a slow client. A live
    /// session is left alone.
    pub async fn resync(&mut self) -> SyncResult<()> {
        let Some(board_id) = self.active else {
            return Err(SyncError::validation("No active board"));
        };
        if self.is_live() {
            return Ok(());
        }
        info!(owner = %self.owner_id, board = %board_id, "change feed closed; reloading board");
        self.switch_board(board_id).await
    }

    pub async fn create_board(&mut self, name: &str) -> SyncResult<Board> {
        let name = self.check_name(name)?;
        let board = Board {
            id: Uuid::new_v4(),
            owner_id: self.owner_id.clone(),
            name,
            created_at: Utc::now(),
        };
        let board = board_from(self.ctx.gateway().insert(Row::Board(board)).await?)?;
        info!(owner = %self.owner_id, board = %board.id, name = %board.name, "board created");
        self.boards.push(board.clone());

        if let Err(e) = self.seed_columns(board.id).await {
            warn!(board = %board.id, error = %e, "board created without its starter columns");
            return Err(SyncError::PartiallyInitialized {
                board_id: board.id,
                source: Box::new(e),
            });
        }
        self.switch_board(board.id).await?;
        Ok(board)
    }

    pub async fn rename_board(&mut self, board_id: Uuid, name: &str) -> SyncResult<Board> {
        let name = self.check_name(name)?;
        self.ctx
            .gateway()
            .update(Table::Boards, board_id, json!({ "name": name }))
            .await?;
        self.list_boards().await?;
        self.boards
            .iter()
            .find(|b| b.id == board_id)
            .cloned()
            .ok_or_else(|| SyncError::board_not_found(board_id))
    }

    /// Delete a board with everything on it. When it was the active board,
    /// the board after it in listing order (else the one before) becomes
    /// active. Returns the active board afterwards.
    pub async fn delete_board(&mut self, board_id: Uuid) -> SyncResult<Option<Uuid>> {
        if self.boards.is_empty() {
            self.list_boards().await?;
        }
        let Some(index) = self.boards.iter().position(|b| b.id == board_id) else {
            return Err(SyncError::board_not_found(board_id));
        };
        if self.boards.len() <= 1 {
            return Err(SyncError::validation("Cannot delete the only board"));
        }
        let fallback = self
            .boards
            .get(index + 1)
            .or_else(|| index.checked_sub(1).and_then(|i| self.boards.get(i)))
            .map(|b| b.id);

        self.ctx.gateway().remove(Table::Boards, board_id).await?;
        info!(owner = %self.owner_id, board = %board_id, "board deleted");
        self.boards.retain(|b| b.id != board_id);

        if self.active == Some(board_id) {
            self.reconciler.unsubscribe();
            match fallback {
                Some(next) => self.switch_board(next).await?,
                None => {
                    self.ctx.advance_epoch();
                    self.ctx.mutate(|store| store.clear())?;
                    self.active = None;
                    self.state.set_active_board(&self.owner_id, None)?;
                }
            }
        }
        Ok(self.active)
    }

    fn check_name(&self, name: &str) -> SyncResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::validation("Board name must not be empty"));
        }
        let len = name.chars().count();
        if len > self.settings.max_name_len {
            return Err(SyncError::validation(format!(
                "Board name is {} characters long; the limit is {}",
                len, self.settings.max_name_len
            )));
        }
        Ok(name.to_string())
    }

    async fn fetch_seeded(&self, board_id: Uuid) -> SyncResult<BoardSnapshot> {
        let mut snapshot = self.ctx.gateway().list(board_id).await?;
        if snapshot.columns.is_empty() {
            info!(board = %board_id, "board has no columns; seeding starter columns");
            snapshot.columns = self.seed_columns(board_id).await?;
        }
        Ok(snapshot)
    }

    /// Configured starter titles without blanks; the built-in set when none
    /// are usable, so a seeded board always has a column.
    fn starter_titles(&self) -> Vec<String> {
        let titles: Vec<String> = self
            .settings
            .starter_columns
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if titles.is_empty() {
            warn!("no usable starter columns configured; using the defaults");
            return BoardsConfig::default().starter_columns;
        }
        titles
    }

    async fn seed_columns(&self, board_id: Uuid) -> SyncResult<Vec<Column>> {
        let titles = self.starter_titles();
        let mut columns = Vec::with_capacity(titles.len());
        for (position, title) in titles.into_iter().enumerate() {
            let column = Column {
                id: Uuid::new_v4(),
                board_id,
                title,
                position: position as i64,
            };
            match self.ctx.gateway().insert(Row::Column(column)).await? {
                Row::Column(column) => columns.push(column),
                other => {
                    return Err(SyncError::validation(format!(
                        "Expected a column row, got a {} row",
                        other.table()
                    )));
                }
            }
        }
        Ok(columns)
    }
}
