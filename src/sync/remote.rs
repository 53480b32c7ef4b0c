use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{SyncError, SyncResult};

use super::db::{DbHandle, RemoteDb};
use super::feed::ChangeFeed;
use super::gateway::{RemoteGateway, Subscription};
use super::models::*;

/// Reference backend: a SQLite database plus an in-process change feed.
///
/// Clones share the same database and feed, so several client contexts
/// built on clones of one gateway behave like devices editing the same
/// account. Every committed write is published on the feed while the
/// database lock is still held, so feed order is commit order.
#[derive(Clone)]
pub struct SqliteGateway {
    db: DbHandle,
    feed: ChangeFeed,
    feed_capacity: usize,
}

impl SqliteGateway {
    pub fn new(db: RemoteDb, feed_capacity: usize) -> Self {
        Self {
            db: DbHandle::new(db),
            feed: ChangeFeed::default(),
            feed_capacity,
        }
    }

    pub fn open(path: &Path, feed_capacity: usize) -> anyhow::Result<Self> {
        Ok(Self::new(RemoteDb::new(path)?, feed_capacity))
    }

    pub fn new_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(RemoteDb::new_in_memory()?, 256))
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

fn rejected(err: anyhow::Error) -> SyncError {
    SyncError::Network(err)
}

/// Referential checks the relational store enforces before a write.
fn check_references(db: &RemoteDb, row: &Row) -> SyncResult<()> {
    match row {
        Row::Board(_) => Ok(()),
        Row::Column(column) => {
            if db.get_board(column.board_id).map_err(rejected)?.is_none() {
                return Err(SyncError::board_not_found(column.board_id));
            }
            Ok(())
        }
        Row::Task(task) => {
            let column = db
                .get_column(task.column_id)
                .map_err(rejected)?
                .ok_or_else(|| SyncError::column_not_found(task.column_id))?;
            if column.board_id != task.board_id {
                return Err(SyncError::validation(format!(
                    "Task {} claims board {} but column {} belongs to board {}",
                    task.id, task.board_id, column.id, column.board_id
                )));
            }
            Ok(())
        }
    }
}

/// Overlay the fields of `patch` onto `current`. The identity is immutable.
fn merge_patch(
    current: serde_json::Value,
    patch: serde_json::Value,
    id: Uuid,
) -> SyncResult<serde_json::Value> {
    let serde_json::Value::Object(fields) = patch else {
        return Err(SyncError::validation("Update patch must be a JSON object"));
    };
    let mut merged = current;
    let Some(target) = merged.as_object_mut() else {
        return Err(SyncError::validation("Stored row is not a JSON object"));
    };
    for (key, value) in fields {
        if key == "id" && value != serde_json::Value::String(id.to_string()) {
            return Err(SyncError::validation(format!("Row {} cannot change its id", id)));
        }
        target.insert(key, value);
    }
    Ok(merged)
}

fn stamp(row: Row) -> Row {
    match row {
        Row::Task(mut task) => {
            task.updated_at = Utc::now();
            Row::Task(task)
        }
        other => other,
    }
}

#[async_trait]
impl RemoteGateway for SqliteGateway {
    async fn list_boards(&self, owner_id: &str) -> SyncResult<Vec<Board>> {
        let owner_id = owner_id.to_string();
        self.db
            .call(move |db| db.list_boards(&owner_id).map_err(rejected))
            .await
    }

    async fn list(&self, board_id: Uuid) -> SyncResult<BoardSnapshot> {
        self.db
            .call(move |db| {
                if db.get_board(board_id).map_err(rejected)?.is_none() {
                    return Err(SyncError::board_not_found(board_id));
                }
                Ok(BoardSnapshot {
                    columns: db.list_columns(board_id).map_err(rejected)?,
                    tasks: db.list_tasks(board_id).map_err(rejected)?,
                })
            })
            .await
    }

    async fn insert(&self, row: Row) -> SyncResult<Row> {
        row.validate()?;
        let row = stamp(row);
        let feed = self.feed.clone();
        let persisted = self
            .db
            .call(move |db| {
                check_references(db, &row)?;
                if db.get_row(row.table(), row.id()).map_err(rejected)?.is_some() {
                    return Err(SyncError::validation(format!(
                        "{} row {} already exists",
                        row.table(),
                        row.id()
                    )));
                }
                db.insert_row(&row).map_err(rejected)?;
                feed.publish(&ChangeEvent::insert(row.clone()));
                Ok(row)
            })
            .await?;
        debug!(table = %persisted.table(), id = %persisted.id(), "row inserted");
        Ok(persisted)
    }

    async fn update(&self, table: Table, id: Uuid, patch: serde_json::Value) -> SyncResult<()> {
        let feed = self.feed.clone();
        self.db
            .call(move |db| {
                let current = db.get_row(table, id).map_err(rejected)?.ok_or(SyncError::NotFound {
                    entity: entity_name(table),
                    id,
                })?;
                let merged = merge_patch(current.to_value()?, patch, id)?;
                let row = stamp(Row::decode(table, merged)?);
                check_references(db, &row)?;
                db.replace_row(&row).map_err(rejected)?;
                feed.publish(&ChangeEvent::update(row));
                Ok(())
            })
            .await?;
        debug!(%table, %id, "row updated");
        Ok(())
    }

    async fn remove(&self, table: Table, id: Uuid) -> SyncResult<()> {
        let feed = self.feed.clone();
        let cascaded = self
            .db
            .call(move |db| {
                let current = db.get_row(table, id).map_err(rejected)?.ok_or(SyncError::NotFound {
                    entity: entity_name(table),
                    id,
                })?;
                // Collect cascaded children so the feed reports them too.
                let mut cascaded: Vec<Row> = Vec::new();
                match &current {
                    Row::Board(board) => {
                        let tasks = db.list_tasks(board.id).map_err(rejected)?;
                        let columns = db.list_columns(board.id).map_err(rejected)?;
                        cascaded.extend(tasks.into_iter().map(Row::Task));
                        cascaded.extend(columns.into_iter().map(Row::Column));
                    }
                    Row::Column(column) => {
                        cascaded.extend(
                            db.list_tasks_in_column(column.id)
                                .map_err(rejected)?
                                .into_iter()
                                .map(Row::Task),
                        );
                    }
                    Row::Task(_) => {}
                }
                db.delete_row(table, id).map_err(rejected)?;
                let count = cascaded.len();
                cascaded.push(current);
                for row in cascaded {
                    feed.publish(&ChangeEvent::delete(row));
                }
                Ok(count)
            })
            .await?;
        debug!(%table, %id, cascaded, "row removed");
        Ok(())
    }

    async fn subscribe(&self, board_id: Uuid) -> SyncResult<Subscription> {
        let exists = self
            .db
            .call(move |db| db.get_board(board_id).map_err(rejected))
            .await
            .map_err(|e| SyncError::Subscription(e.to_string()))?
            .is_some();
        if !exists {
            return Err(SyncError::Subscription(format!("Board {} does not exist", board_id)));
        }
        Ok(self.feed.subscribe(board_id, self.feed_capacity))
    }
}

fn entity_name(table: Table) -> &'static str {
    match table {
        Table::Boards => "Board",
        Table::Columns => "Column",
        Table::Tasks => "Task",
    }
}
