use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::errors::{SyncError, SyncResult};

use super::models::*;

/// Async-safe handle to the remote board database.
///
/// Wraps `RemoteDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<RemoteDb>>,
}

impl DbHandle {
    pub fn new(db: RemoteDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> SyncResult<R>
    where
        F: FnOnce(&RemoteDb) -> SyncResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| SyncError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| SyncError::Network(anyhow::Error::new(e).context("Database task panicked")))?
    }
}

pub struct RemoteDb {
    conn: Connection,
}

impl RemoteDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        // Positions are deliberately not UNIQUE: a reorder is delivered as
        // several row writes and passes through transient ties.
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS boards (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS columns (
                    id TEXT PRIMARY KEY,
                    board_id TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    position INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    column_id TEXT NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
                    board_id TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    priority TEXT NOT NULL DEFAULT 'medium',
                    deadline TEXT,
                    position INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_boards_owner ON boards(owner_id);
                CREATE INDEX IF NOT EXISTS idx_columns_board ON columns(board_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_board ON tasks(board_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_column ON tasks(column_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Boards ────────────────────────────────────────────────────────

    pub fn list_boards(&self, owner_id: &str) -> Result<Vec<Board>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, owner_id, name, created_at FROM boards
                 WHERE owner_id = ?1 ORDER BY created_at, id",
            )
            .context("Failed to prepare list_boards")?;
        let rows = stmt
            .query_map(params![owner_id], BoardRow::from_sql)
            .context("Failed to query boards")?;
        let mut boards = Vec::new();
        for row in rows {
            boards.push(row.context("Failed to read board row")?.into_board()?);
        }
        Ok(boards)
    }

    pub fn get_board(&self, id: Uuid) -> Result<Option<Board>> {
        self.conn
            .query_row(
                "SELECT id, owner_id, name, created_at FROM boards WHERE id = ?1",
                params![id.to_string()],
                BoardRow::from_sql,
            )
            .optional()
            .context("Failed to query board")?
            .map(BoardRow::into_board)
            .transpose()
    }

    pub fn insert_board(&self, board: &Board) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO boards (id, owner_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    board.id.to_string(),
                    board.owner_id,
                    board.name,
                    format_timestamp(&board.created_at)
                ],
            )
            .context("Failed to insert board")?;
        Ok(())
    }

    pub fn replace_board(&self, board: &Board) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE boards SET owner_id = ?1, name = ?2, created_at = ?3 WHERE id = ?4",
                params![
                    board.owner_id,
                    board.name,
                    format_timestamp(&board.created_at),
                    board.id.to_string()
                ],
            )
            .context("Failed to update board")?;
        Ok(count > 0)
    }

    // ── Columns ───────────────────────────────────────────────────────

    pub fn list_columns(&self, board_id: Uuid) -> Result<Vec<Column>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, board_id, title, position FROM columns
                 WHERE board_id = ?1 ORDER BY position, id",
            )
            .context("Failed to prepare list_columns")?;
        let rows = stmt
            .query_map(params![board_id.to_string()], ColumnRow::from_sql)
            .context("Failed to query columns")?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.context("Failed to read column row")?.into_column()?);
        }
        Ok(columns)
    }

    pub fn get_column(&self, id: Uuid) -> Result<Option<Column>> {
        self.conn
            .query_row(
                "SELECT id, board_id, title, position FROM columns WHERE id = ?1",
                params![id.to_string()],
                ColumnRow::from_sql,
            )
            .optional()
            .context("Failed to query column")?
            .map(ColumnRow::into_column)
            .transpose()
    }

    pub fn insert_column(&self, column: &Column) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO columns (id, board_id, title, position) VALUES (?1, ?2, ?3, ?4)",
                params![
                    column.id.to_string(),
                    column.board_id.to_string(),
                    column.title,
                    column.position
                ],
            )
            .context("Failed to insert column")?;
        Ok(())
    }

    pub fn replace_column(&self, column: &Column) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE columns SET board_id = ?1, title = ?2, position = ?3 WHERE id = ?4",
                params![
                    column.board_id.to_string(),
                    column.title,
                    column.position,
                    column.id.to_string()
                ],
            )
            .context("Failed to update column")?;
        Ok(count > 0)
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    pub fn list_tasks(&self, board_id: Uuid) -> Result<Vec<Task>> {
        self.query_tasks(
            "SELECT id, column_id, board_id, title, priority, deadline, position, updated_at
             FROM tasks WHERE board_id = ?1 ORDER BY column_id, position, id",
            board_id,
        )
    }

    pub fn list_tasks_in_column(&self, column_id: Uuid) -> Result<Vec<Task>> {
        self.query_tasks(
            "SELECT id, column_id, board_id, title, priority, deadline, position, updated_at
             FROM tasks WHERE column_id = ?1 ORDER BY position, id",
            column_id,
        )
    }

    fn query_tasks(&self, sql: &str, key: Uuid) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare task query")?;
        let rows = stmt
            .query_map(params![key.to_string()], TaskRow::from_sql)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read task row")?.into_task()?);
        }
        Ok(tasks)
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        self.conn
            .query_row(
                "SELECT id, column_id, board_id, title, priority, deadline, position, updated_at
                 FROM tasks WHERE id = ?1",
                params![id.to_string()],
                TaskRow::from_sql,
            )
            .optional()
            .context("Failed to query task")?
            .map(TaskRow::into_task)
            .transpose()
    }

    pub fn insert_task(&self, task: &Task) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tasks (id, column_id, board_id, title, priority, deadline, position, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.to_string(),
                    task.column_id.to_string(),
                    task.board_id.to_string(),
                    task.title,
                    task.priority.as_str(),
                    task.deadline.as_ref().map(format_timestamp),
                    task.position,
                    format_timestamp(&task.updated_at)
                ],
            )
            .context("Failed to insert task")?;
        Ok(())
    }

    pub fn replace_task(&self, task: &Task) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE tasks SET column_id = ?1, board_id = ?2, title = ?3, priority = ?4,
                 deadline = ?5, position = ?6, updated_at = ?7 WHERE id = ?8",
                params![
                    task.column_id.to_string(),
                    task.board_id.to_string(),
                    task.title,
                    task.priority.as_str(),
                    task.deadline.as_ref().map(format_timestamp),
                    task.position,
                    format_timestamp(&task.updated_at),
                    task.id.to_string()
                ],
            )
            .context("Failed to update task")?;
        Ok(count > 0)
    }

    // ── Generic row access ────────────────────────────────────────────

    pub fn get_row(&self, table: Table, id: Uuid) -> Result<Option<Row>> {
        Ok(match table {
            Table::Boards => self.get_board(id)?.map(Row::Board),
            Table::Columns => self.get_column(id)?.map(Row::Column),
            Table::Tasks => self.get_task(id)?.map(Row::Task),
        })
    }

    pub fn insert_row(&self, row: &Row) -> Result<()> {
        match row {
            Row::Board(b) => self.insert_board(b),
            Row::Column(c) => self.insert_column(c),
            Row::Task(t) => self.insert_task(t),
        }
    }

    pub fn replace_row(&self, row: &Row) -> Result<bool> {
        match row {
            Row::Board(b) => self.replace_board(b),
            Row::Column(c) => self.replace_column(c),
            Row::Task(t) => self.replace_task(t),
        }
    }

    pub fn delete_row(&self, table: Table, id: Uuid) -> Result<bool> {
        let sql = match table {
            Table::Boards => "DELETE FROM boards WHERE id = ?1",
            Table::Columns => "DELETE FROM columns WHERE id = ?1",
            Table::Tasks => "DELETE FROM tasks WHERE id = ?1",
        };
        let count = self
            .conn
            .execute(sql, params![id.to_string()])
            .with_context(|| format!("Failed to delete from {}", table))?;
        Ok(count > 0)
    }
}

// ── Internal row helpers ──────────────────────────────────────────────

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Failed to parse {} '{}'", field, value))
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Failed to parse {} '{}'", field, value))
}

/// Intermediate row struct for reading boards before converting the
/// id and timestamp strings into typed values.
struct BoardRow {
    id: String,
    owner_id: String,
    name: String,
    created_at: String,
}

impl BoardRow {
    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_board(self) -> Result<Board> {
        Ok(Board {
            id: parse_uuid(&self.id, "board id")?,
            owner_id: self.owner_id,
            name: self.name,
            created_at: parse_timestamp(&self.created_at, "board created_at")?,
        })
    }
}

struct ColumnRow {
    id: String,
    board_id: String,
    title: String,
    position: i64,
}

impl ColumnRow {
    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            board_id: row.get(1)?,
            title: row.get(2)?,
            position: row.get(3)?,
        })
    }

    fn into_column(self) -> Result<Column> {
        Ok(Column {
            id: parse_uuid(&self.id, "column id")?,
            board_id: parse_uuid(&self.board_id, "column board_id")?,
            title: self.title,
            position: self.position,
        })
    }
}

struct TaskRow {
    id: String,
    column_id: String,
    board_id: String,
    title: String,
    priority: String,
    deadline: Option<String>,
    position: i64,
    updated_at: String,
}

impl TaskRow {
    fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            column_id: row.get(1)?,
            board_id: row.get(2)?,
            title: row.get(3)?,
            priority: row.get(4)?,
            deadline: row.get(5)?,
            position: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let priority = self
            .priority
            .parse::<Priority>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse task priority")?;
        let deadline = self
            .deadline
            .as_deref()
            .map(|d| parse_timestamp(d, "task deadline"))
            .transpose()?;
        Ok(Task {
            id: parse_uuid(&self.id, "task id")?,
            column_id: parse_uuid(&self.column_id, "task column_id")?,
            board_id: parse_uuid(&self.board_id, "task board_id")?,
            title: self.title,
            priority,
            deadline,
            position: self.position,
            updated_at: parse_timestamp(&self.updated_at, "task updated_at")?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
