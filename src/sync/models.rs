use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{SyncError, SyncResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub position: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub column_id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    pub position: i64,
    pub updated_at: DateTime<Utc>,
}

/// Remote tables addressed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Boards,
    Columns,
    Tasks,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boards => "boards",
            Self::Columns => "columns",
            Self::Tasks => "tasks",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boards" => Ok(Self::Boards),
            "columns" => Ok(Self::Columns),
            "tasks" => Ok(Self::Tasks),
            _ => Err(format!("Invalid table: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A typed row of one of the remote tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Board(Board),
    Column(Column),
    Task(Task),
}

impl Row {
    pub fn table(&self) -> Table {
        match self {
            Self::Board(_) => Table::Boards,
            Self::Column(_) => Table::Columns,
            Self::Task(_) => Table::Tasks,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Board(b) => b.id,
            Self::Column(c) => c.id,
            Self::Task(t) => t.id,
        }
    }

    /// The board a row is scoped to. A board is scoped to itself.
    pub fn board_id(&self) -> Uuid {
        match self {
            Self::Board(b) => b.id,
            Self::Column(c) => c.board_id,
            Self::Task(t) => t.board_id,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            table: self.table(),
            id: self.id(),
        }
    }

    /// Decode an untrusted JSON row. Shape errors and field-level
    /// violations both surface as `SyncError::Validation`.
    pub fn decode(table: Table, value: serde_json::Value) -> SyncResult<Self> {
        let row = match table {
            Table::Boards => serde_json::from_value(value).map(Self::Board),
            Table::Columns => serde_json::from_value(value).map(Self::Column),
            Table::Tasks => serde_json::from_value(value).map(Self::Task),
        }
        .map_err(|e| SyncError::validation(format!("Malformed {} row: {}", table, e)))?;
        row.validate()?;
        Ok(row)
    }

    pub fn to_value(&self) -> SyncResult<serde_json::Value> {
        let value = match self {
            Self::Board(b) => serde_json::to_value(b),
            Self::Column(c) => serde_json::to_value(c),
            Self::Task(t) => serde_json::to_value(t),
        };
        value.map_err(|e| SyncError::Other(e.into()))
    }

    pub fn validate(&self) -> SyncResult<()> {
        match self {
            Self::Board(b) => {
                if b.owner_id.trim().is_empty() {
                    return Err(SyncError::validation("Board owner must not be empty"));
                }
                if b.name.trim().is_empty() {
                    return Err(SyncError::validation("Board name must not be empty"));
                }
            }
            Self::Column(c) => {
                if c.title.trim().is_empty() {
                    return Err(SyncError::validation("Column title must not be empty"));
                }
                if c.position < 0 {
                    return Err(SyncError::validation(format!(
                        "Column {} has negative position {}",
                        c.id, c.position
                    )));
                }
            }
            Self::Task(t) => {
                if t.title.trim().is_empty() {
                    return Err(SyncError::validation("Task title must not be empty"));
                }
                if t.position < 0 {
                    return Err(SyncError::validation(format!(
                        "Task {} has negative position {}",
                        t.id, t.position
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Identity of a stored entity across tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub table: Table,
    pub id: Uuid,
}

impl EntityKey {
    pub fn column(id: Uuid) -> Self {
        Self {
            table: Table::Columns,
            id,
        }
    }

    pub fn task(id: Uuid) -> Self {
        Self {
            table: Table::Tasks,
            id,
        }
    }
}

/// A decoded change-feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub row: Row,
}

impl ChangeEvent {
    pub fn insert(row: Row) -> Self {
        Self {
            kind: ChangeKind::Insert,
            row,
        }
    }

    pub fn update(row: Row) -> Self {
        Self {
            kind: ChangeKind::Update,
            row,
        }
    }

    pub fn delete(row: Row) -> Self {
        Self {
            kind: ChangeKind::Delete,
            row,
        }
    }

    pub fn table(&self) -> Table {
        self.row.table()
    }

    pub fn to_wire(&self) -> SyncResult<WireEvent> {
        Ok(WireEvent {
            table: self.row.table(),
            kind: self.kind,
            row: self.row.to_value()?,
        })
    }

    /// Decode a JSON-encoded wire event, validating the row it carries.
    pub fn decode(json: &str) -> SyncResult<Self> {
        let wire: WireEvent = serde_json::from_str(json)
            .map_err(|e| SyncError::validation(format!("Malformed change event: {}", e)))?;
        wire.into_event()
    }
}

/// Change event as it travels on the feed: the row is still raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row: serde_json::Value,
}

impl WireEvent {
    pub fn into_event(self) -> SyncResult<ChangeEvent> {
        let row = Row::decode(self.table, self.row)?;
        Ok(ChangeEvent {
            kind: self.kind,
            row,
        })
    }
}

/// Full fetch of one board's columns and tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub columns: Vec<Column>,
    pub tasks: Vec<Task>,
}

// Intent payloads

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Field-level edit of a task. `deadline: Some(None)` clears the deadline.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub deadline: Option<Option<DateTime<Utc>>>,
}

// View types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub board_id: Option<Uuid>,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnView {
    pub column: Column,
    pub tasks: Vec<Task>,
}
