use std::collections::BTreeMap;

use uuid::Uuid;

use super::models::{BoardSnapshot, BoardView, Column, ColumnView, EntityKey, Row, Table, Task};

/// The columns and tasks of the active board, keyed by identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pub board_id: Option<Uuid>,
    pub columns: BTreeMap<Uuid, Column>,
    pub tasks: BTreeMap<Uuid, Task>,
}

/// Best-known state of one board. Pure data: no I/O, no async.
///
/// Every change bumps `revision`, which the context publishes so a UI can
/// re-render without diffing.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: Entities,
    revision: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn board_id(&self) -> Option<Uuid> {
        self.entities.board_id
    }

    /// Replace the whole store with a freshly fetched board.
    pub fn load(&mut self, board_id: Uuid, snapshot: BoardSnapshot) {
        self.entities = Entities {
            board_id: Some(board_id),
            columns: snapshot.columns.into_iter().map(|c| (c.id, c)).collect(),
            tasks: snapshot.tasks.into_iter().map(|t| (t.id, t)).collect(),
        };
        self.revision += 1;
    }

    pub fn clear(&mut self) {
        self.entities = Entities::default();
        self.revision += 1;
    }

    pub fn column(&self, id: Uuid) -> Option<&Column> {
        self.entities.columns.get(&id)
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.entities.tasks.get(&id)
    }

    pub fn column_count(&self) -> usize {
        self.entities.columns.len()
    }

    pub fn task_count(&self) -> usize {
        self.entities.tasks.len()
    }

    /// Columns in display order. Ties on position fall back to identity so
    /// the order is stable while a reorder is half-delivered.
    pub fn columns_ordered(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.entities.columns.values().collect();
        columns.sort_by_key(|c| (c.position, c.id));
        columns
    }

    /// Tasks of one column in display order.
    pub fn tasks_in(&self, column_id: Uuid) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .entities
            .tasks
            .values()
            .filter(|t| t.column_id == column_id)
            .collect();
        tasks.sort_by_key(|t| (t.position, t.id));
        tasks
    }

    pub fn get(&self, key: EntityKey) -> Option<Row> {
        match key.table {
            Table::Columns => self.column(key.id).cloned().map(Row::Column),
            Table::Tasks => self.task(key.id).cloned().map(Row::Task),
            Table::Boards => None,
        }
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        match key.table {
            Table::Columns => self.entities.columns.contains_key(&key.id),
            Table::Tasks => self.entities.tasks.contains_key(&key.id),
            Table::Boards => false,
        }
    }

    /// Insert or replace a row. Board rows are not held by the store and
    /// are ignored; returns whether anything changed.
    pub fn put(&mut self, row: Row) -> bool {
        let changed = match row {
            Row::Column(column) => {
                self.entities.columns.insert(column.id, column.clone()) != Some(column)
            }
            Row::Task(task) => self.entities.tasks.insert(task.id, task.clone()) != Some(task),
            Row::Board(_) => false,
        };
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// Remove a row, returning its last known version.
    pub fn remove(&mut self, key: EntityKey) -> Option<Row> {
        let removed = match key.table {
            Table::Columns => self.entities.columns.remove(&key.id).map(Row::Column),
            Table::Tasks => self.entities.tasks.remove(&key.id).map(Row::Task),
            Table::Boards => None,
        };
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    pub fn view(&self) -> BoardView {
        let columns = self
            .columns_ordered()
            .into_iter()
            .map(|column| ColumnView {
                column: column.clone(),
                tasks: self.tasks_in(column.id).into_iter().cloned().collect(),
            })
            .collect();
        BoardView {
            board_id: self.board_id(),
            columns,
        }
    }
}
