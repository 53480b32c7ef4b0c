//! Optimistic mutation engine.
//!
//! Every intent runs in two phases:
//!
//! 1. **Apply**: under one store lock, check preconditions,
//!    record the prior version of every entity it touches, mutate the store
//!    and list the remote writes. The result is a [`PendingMutation`].
//! 2. **Commit**: await the remote writes in order. If one fails, writes
//!    that already succeeded are compensated and [`rollback`] restores the
//!    recorded prior versions, then the error is returned. No retries.
//!
//! Writes are full-row replaces, so the change-feed echo of a committed
//! write is idempotent against the optimistic state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TasksConfig;
use crate::errors::{SyncError, SyncResult};

use super::context::BoardContext;
use super::models::*;
use super::position::{self, Shift};
use super::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreateTask,
    UpdateTask,
    DeleteTask,
    MoveTask,
    CreateColumn,
    RenameColumn,
    MoveColumn,
    DeleteColumn,
}

impl Intent {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::CreateTask => "create task",
            Self::UpdateTask => "update task",
            Self::DeleteTask => "delete task",
            Self::MoveTask => "move task",
            Self::CreateColumn => "create column",
            Self::RenameColumn => "rename column",
            Self::MoveColumn => "move column",
            Self::DeleteColumn => "delete column",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteWrite {
    Insert(Row),
    /// Full-row replace.
    Update(Row),
    Remove(EntityKey),
}

/// Version of an entity before a mutation touched it; `None` if it did not
/// exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prior {
    pub key: EntityKey,
    pub before: Option<Row>,
}

/// Everything needed to finish or undo one optimistic mutation.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub id: Uuid,
    pub intent: Intent,
    pub board_id: Uuid,
    pub epoch: u64,
    pub prior: Vec<Prior>,
    pub writes: Vec<RemoteWrite>,
}

/// Restore every entity touched by `pending` to its recorded prior version.
pub fn rollback(store: &mut EntityStore, pending: &PendingMutation) {
    for prior in pending.prior.iter().rev() {
        match &prior.before {
            Some(row) => {
                store.put(row.clone());
            }
            None => {
                store.remove(prior.key);
            }
        }
    }
}

/// Builder for a pending mutation; records prior versions as it goes.
pub struct Draft<'a> {
    store: &'a mut EntityStore,
    prior: Vec<Prior>,
    writes: Vec<RemoteWrite>,
}

impl<'a> Draft<'a> {
    fn new(store: &'a mut EntityStore) -> Self {
        Self {
            store,
            prior: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn store(&self) -> &EntityStore {
        &*self.store
    }

    fn remember(&mut self, key: EntityKey) {
        if !self.prior.iter().any(|p| p.key == key) {
            let before = self.store.get(key);
            self.prior.push(Prior { key, before });
        }
    }

    pub fn put(&mut self, row: Row) {
        self.remember(row.key());
        self.store.put(row);
    }

    pub fn remove(&mut self, key: EntityKey) {
        self.remember(key);
        self.store.remove(key);
    }

    pub fn write(&mut self, write: RemoteWrite) {
        self.writes.push(write);
    }

    pub fn shift_tasks(&mut self, shifts: &[Shift]) {
        for shift in shifts {
            if let Some(mut task) = self.store.task(shift.id).cloned() {
                task.position = shift.to;
                self.put(Row::Task(task.clone()));
                self.write(RemoteWrite::Update(Row::Task(task)));
            }
        }
    }

    pub fn shift_columns(&mut self, shifts: &[Shift]) {
        for shift in shifts {
            if let Some(mut column) = self.store.column(shift.id).cloned() {
                column.position = shift.to;
                self.put(Row::Column(column.clone()));
                self.write(RemoteWrite::Update(Row::Column(column)));
            }
        }
    }

    fn finish(self, intent: Intent, board_id: Uuid, epoch: u64) -> PendingMutation {
        PendingMutation {
            id: Uuid::new_v4(),
            intent,
            board_id,
            epoch,
            prior: self.prior,
            writes: self.writes,
        }
    }

    /// Undo a draft whose preconditions failed halfway.
    fn abandon(self) {
        for prior in self.prior.into_iter().rev() {
            match prior.before {
                Some(row) => {
                    self.store.put(row);
                }
                None => {
                    self.store.remove(prior.key);
                }
            }
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Applies user intents optimistically and commits them remotely.
#[derive(Clone)]
pub struct Engine {
    ctx: BoardContext,
    limits: TasksConfig,
    in_flight: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(ctx: BoardContext, limits: TasksConfig) -> Self {
        Self {
            ctx,
            limits,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn context(&self) -> &BoardContext {
        &self.ctx
    }

    /// Number of mutations whose remote writes have not resolved yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    /// Create a task in `column_id` at `index` (appended when `None`).
    pub async fn create_task(
        &self,
        column_id: Uuid,
        new: NewTask,
        index: Option<usize>,
    ) -> SyncResult<Task> {
        let title = self.check_title(&new.title, "Task title")?;
        let (pending, task) = self.begin(Intent::CreateTask, |draft| {
            let column = draft
                .store()
                .column(column_id)
                .cloned()
                .ok_or_else(|| SyncError::column_not_found(column_id))?;
            let siblings: Vec<Task> =
                draft.store().tasks_in(column_id).into_iter().cloned().collect();
            let placement = position::allocate(&siblings, None, index.unwrap_or(siblings.len()));
            let task = Task {
                id: Uuid::new_v4(),
                column_id,
                board_id: column.board_id,
                title,
                priority: new.priority,
                deadline: new.deadline,
                position: placement.position,
                updated_at: Utc::now(),
            };
            draft.put(Row::Task(task.clone()));
            draft.write(RemoteWrite::Insert(Row::Task(task.clone())));
            draft.shift_tasks(&placement.shifts);
            Ok(task)
        })?;

        let persisted = self.commit(pending).await?;
        Ok(persisted
            .into_iter()
            .find_map(|row| match row {
                Row::Task(t) if t.id == task.id => Some(t),
                _ => None,
            })
            .unwrap_or(task))
    }

    pub async fn update_task(&self, task_id: Uuid, patch: TaskPatch) -> SyncResult<Task> {
        let title = match &patch.title {
            Some(title) => Some(self.check_title(title, "Task title")?),
            None => None,
        };
        let (pending, task) = self.begin(Intent::UpdateTask, |draft| {
            let mut task = draft
                .store()
                .task(task_id)
                .cloned()
                .ok_or_else(|| SyncError::task_not_found(task_id))?;
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(priority) = patch.priority {
                task.priority = priority;
            }
            if let Some(deadline) = patch.deadline {
                task.deadline = deadline;
            }
            task.updated_at = Utc::now();
            draft.put(Row::Task(task.clone()));
            draft.write(RemoteWrite::Update(Row::Task(task.clone())));
            Ok(task)
        })?;
        self.commit(pending).await?;
        Ok(task)
    }

    pub async fn delete_task(&self, task_id: Uuid) -> SyncResult<()> {
        let compact = self.limits.compact_on_delete;
        let (pending, ()) = self.begin(Intent::DeleteTask, |draft| {
            let task = draft
                .store()
                .task(task_id)
                .cloned()
                .ok_or_else(|| SyncError::task_not_found(task_id))?;
            draft.remove(EntityKey::task(task_id));
            draft.write(RemoteWrite::Remove(EntityKey::task(task_id)));
            if compact {
                let remaining: Vec<Task> =
                    draft.store().tasks_in(task.column_id).into_iter().cloned().collect();
                draft.shift_tasks(&position::compact(&remaining));
            }
            Ok(())
        })?;
        self.commit(pending).await?;
        Ok(())
    }

    /// Move a task to `index` within `column_id`, which may be its current
    /// column.
    pub async fn move_task(
        &self,
        task_id: Uuid,
        column_id: Uuid,
        index: usize,
    ) -> SyncResult<Task> {
        let (pending, task) = self.begin(Intent::MoveTask, |draft| {
            let task = draft
                .store()
                .task(task_id)
                .cloned()
                .ok_or_else(|| SyncError::task_not_found(task_id))?;
            let column = draft
                .store()
                .column(column_id)
                .cloned()
                .ok_or_else(|| SyncError::column_not_found(column_id))?;
            if column.board_id != task.board_id {
                return Err(SyncError::validation(format!(
                    "Column {} is not on the board of task {}",
                    column_id, task_id
                )));
            }
            let siblings: Vec<Task> =
                draft.store().tasks_in(column_id).into_iter().cloned().collect();
            let placement = position::allocate(&siblings, Some(task_id), index);
            let moved = Task {
                column_id,
                board_id: column.board_id,
                position: placement.position,
                updated_at: Utc::now(),
                ..task
            };
            draft.put(Row::Task(moved.clone()));
            draft.write(RemoteWrite::Update(Row::Task(moved.clone())));
            draft.shift_tasks(&placement.shifts);
            Ok(moved)
        })?;
        self.commit(pending).await?;
        Ok(task)
    }

    // ── Columns ───────────────────────────────────────────────────────

    pub async fn create_column(&self, title: &str, index: Option<usize>) -> SyncResult<Column> {
        let title = self.check_title(title, "Column title")?;
        let (pending, column) = self.begin(Intent::CreateColumn, |draft| {
            let board_id = draft
                .store()
                .board_id()
                .ok_or_else(|| SyncError::validation("No active board"))?;
            let siblings: Vec<Column> =
                draft.store().columns_ordered().into_iter().cloned().collect();
            let placement = position::allocate(&siblings, None, index.unwrap_or(siblings.len()));
            let column = Column {
                id: Uuid::new_v4(),
                board_id,
                title,
                position: placement.position,
            };
            draft.put(Row::Column(column.clone()));
            draft.write(RemoteWrite::Insert(Row::Column(column.clone())));
            draft.shift_columns(&placement.shifts);
            Ok(column)
        })?;
        self.commit(pending).await?;
        Ok(column)
    }

    pub async fn rename_column(&self, column_id: Uuid, title: &str) -> SyncResult<Column> {
        let title = self.check_title(title, "Column title")?;
        let (pending, column) = self.begin(Intent::RenameColumn, |draft| {
            let mut column = draft
                .store()
                .column(column_id)
                .cloned()
                .ok_or_else(|| SyncError::column_not_found(column_id))?;
            column.title = title;
            draft.put(Row::Column(column.clone()));
            draft.write(RemoteWrite::Update(Row::Column(column.clone())));
            Ok(column)
        })?;
        self.commit(pending).await?;
        Ok(column)
    }

    pub async fn move_column(&self, column_id: Uuid, index: usize) -> SyncResult<Column> {
        let (pending, column) = self.begin(Intent::MoveColumn, |draft| {
            let column = draft
                .store()
                .column(column_id)
                .cloned()
                .ok_or_else(|| SyncError::column_not_found(column_id))?;
            let siblings: Vec<Column> =
                draft.store().columns_ordered().into_iter().cloned().collect();
            let placement = position::allocate(&siblings, Some(column_id), index);
            let moved = Column {
                position: placement.position,
                ..column
            };
            draft.put(Row::Column(moved.clone()));
            draft.write(RemoteWrite::Update(Row::Column(moved.clone())));
            draft.shift_columns(&placement.shifts);
            Ok(moved)
        })?;
        self.commit(pending).await?;
        Ok(column)
    }

    /// Delete a column and, locally, its tasks. The remote store cascades.
    pub async fn delete_column(&self, column_id: Uuid) -> SyncResult<()> {
        let (pending, ()) = self.begin(Intent::DeleteColumn, |draft| {
            if draft.store().column(column_id).is_none() {
                return Err(SyncError::column_not_found(column_id));
            }
            if draft.store().column_count() <= 1 {
                return Err(SyncError::validation("A board must keep at least one column"));
            }
            let tasks: Vec<Uuid> = draft.store().tasks_in(column_id).iter().map(|t| t.id).collect();
            for id in tasks {
                draft.remove(EntityKey::task(id));
            }
            draft.remove(EntityKey::column(column_id));
            draft.write(RemoteWrite::Remove(EntityKey::column(column_id)));
            Ok(())
        })?;
        self.commit(pending).await?;
        Ok(())
    }

    // ── Phases ────────────────────────────────────────────────────────

    fn check_title(&self, title: &str, label: &str) -> SyncResult<String> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::validation(format!("{} must not be empty", label)));
        }
        let len = title.chars().count();
        if len > self.limits.max_title_len {
            return Err(SyncError::validation(format!(
                "{} is {} characters long; the limit is {}",
                label, len, self.limits.max_title_len
            )));
        }
        Ok(title.to_string())
    }

    /// Phase one: apply an intent to the store in a single synchronous step.
    fn begin<T>(
        &self,
        intent: Intent,
        f: impl FnOnce(&mut Draft<'_>) -> SyncResult<T>,
    ) -> SyncResult<(PendingMutation, T)> {
        let epoch = self.ctx.epoch();
        self.ctx.mutate(|store| {
            let board_id = store
                .board_id()
                .ok_or_else(|| SyncError::validation("No active board"))?;
            let mut draft = Draft::new(store);
            match f(&mut draft) {
                Ok(value) => {
                    let pending = draft.finish(intent, board_id, epoch);
                    debug!(
                        mutation = %pending.id,
                        intent = intent.describe(),
                        writes = pending.writes.len(),
                        "applied optimistically"
                    );
                    Ok((pending, value))
                }
                Err(e) => {
                    draft.abandon();
                    Err(e)
                }
            }
        })?
    }

    /// Phase two: perform the remote writes, undoing everything on failure.
    /// Returns the rows the gateway persisted for inserts.
    async fn commit(&self, pending: PendingMutation) -> SyncResult<Vec<Row>> {
        let _in_flight = InFlight::enter(&self.in_flight);
        let mut persisted = Vec::new();

        for (done, write) in pending.writes.iter().enumerate() {
            match self.dispatch(write).await {
                Ok(Some(row)) => persisted.push(row),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        mutation = %pending.id,
                        intent = pending.intent.describe(),
                        error = %err,
                        "remote write failed; rolling back"
                    );
                    self.compensate(&pending, &pending.writes[..done]).await;
                    self.settle_failure(&pending, &err)?;
                    return Err(err);
                }
            }
        }

        if !persisted.is_empty() && self.is_current(&pending) {
            self.ctx.mutate(|store| {
                for row in &persisted {
                    if store.contains(row.key()) {
                        store.put(row.clone());
                    }
                }
            })?;
        }
        debug!(mutation = %pending.id, intent = pending.intent.describe(), "committed");
        Ok(persisted)
    }

    async fn dispatch(&self, write: &RemoteWrite) -> SyncResult<Option<Row>> {
        let gateway = self.ctx.gateway();
        match write {
            RemoteWrite::Insert(row) => gateway.insert(row.clone()).await.map(Some),
            RemoteWrite::Update(row) => {
                let patch = row.to_value()?;
                gateway.update(row.table(), row.id(), patch).await.map(|_| None)
            }
            RemoteWrite::Remove(key) => gateway.remove(key.table, key.id).await.map(|_| None),
        }
    }

    /// Best-effort undo of writes that already reached the remote store.
    async fn compensate(&self, pending: &PendingMutation, succeeded: &[RemoteWrite]) {
        let gateway = self.ctx.gateway();
        for write in succeeded.iter().rev() {
            let result = match write {
                RemoteWrite::Insert(row) => gateway.remove(row.table(), row.id()).await,
                RemoteWrite::Update(row) => match prior_of(pending, row.key()) {
                    Some(before) => match before.to_value() {
                        Ok(patch) => gateway.update(before.table(), before.id(), patch).await,
                        Err(e) => Err(e),
                    },
                    None => gateway.remove(row.table(), row.id()).await,
                },
                RemoteWrite::Remove(key) => match prior_of(pending, *key) {
                    Some(before) => gateway.insert(before.clone()).await.map(|_| ()),
                    None => Ok(()),
                },
            };
            if let Err(e) = result {
                warn!(mutation = %pending.id, error = %e, "could not compensate remote write");
            }
        }
    }

    fn settle_failure(&self, pending: &PendingMutation, err: &SyncError) -> SyncResult<()> {
        if !self.is_current(pending) {
            debug!(mutation = %pending.id, "board switched; discarding failed mutation");
            return Ok(());
        }
        self.ctx.mutate(|store| {
            rollback(store, pending);
            // The remote store no longer has this entity; do not resurrect it.
            if let SyncError::NotFound { id, .. } = err {
                store.remove(EntityKey::task(*id));
                if store.remove(EntityKey::column(*id)).is_some() {
                    let orphans: Vec<Uuid> = store.tasks_in(*id).iter().map(|t| t.id).collect();
                    for orphan in orphans {
                        store.remove(EntityKey::task(orphan));
                    }
                }
            }
        })
    }

    fn is_current(&self, pending: &PendingMutation) -> bool {
        self.ctx.epoch() == pending.epoch
            && self
                .ctx
                .read(|store| store.board_id() == Some(pending.board_id))
                .unwrap_or(false)
    }
}

fn prior_of(pending: &PendingMutation, key: EntityKey) -> Option<&Row> {
    pending
        .prior
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.before.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::models::BoardSnapshot;

    fn column(board_id: Uuid, title: &str, position: i64) -> Column {
        Column {
            id: Uuid::new_v4(),
            board_id,
            title: title.to_string(),
            position,
        }
    }

    fn task(column: &Column, title: &str, position: i64) -> Task {
        Task {
            id: Uuid::new_v4(),
            column_id: column.id,
            board_id: column.board_id,
            title: title.to_string(),
            priority: Priority::Medium,
            deadline: None,
            position,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_rollback_is_exact() {
        let board = Uuid::new_v4();
        let a = column(board, "A", 0);
        let b = column(board, "B", 1);
        let t1 = task(&a, "t1", 0);
        let t2 = task(&a, "t2", 1);
        let mut store = EntityStore::new();
        store.load(
            board,
            BoardSnapshot {
                columns: vec![a.clone(), b.clone()],
                tasks: vec![t1.clone(), t2.clone()],
            },
        );
        let before = store.entities().clone();

        let mut draft = Draft::new(&mut store);
        let moved = Task {
            column_id: b.id,
            position: 0,
            ..t2.clone()
        };
        draft.put(Row::Task(moved));
        draft.remove(EntityKey::task(t1.id));
        let created = task(&b, "new", 1);
        draft.put(Row::Task(created));
        let pending = draft.finish(Intent::MoveTask, board, 0);

        assert_ne!(store.entities(), &before);
        rollback(&mut store, &pending);
        assert_eq!(store.entities(), &before);
    }

    #[test]
    fn test_draft_records_first_prior_only() {
        let board = Uuid::new_v4();
        let a = column(board, "A", 0);
        let t1 = task(&a, "t1", 0);
        let mut store = EntityStore::new();
        store.load(
            board,
            BoardSnapshot {
                columns: vec![a.clone()],
                tasks: vec![t1.clone()],
            },
        );
        let mut draft = Draft::new(&mut store);
        let mut edited = t1.clone();
        edited.title = "once".to_string();
        draft.put(Row::Task(edited.clone()));
        edited.title = "twice".to_string();
        draft.put(Row::Task(edited));
        let pending = draft.finish(Intent::UpdateTask, board, 0);
        assert_eq!(pending.prior.len(), 1);
        assert_eq!(pending.prior[0].before, Some(Row::Task(t1)));
    }

    #[test]
    fn test_abandon_restores_store() {
        let board = Uuid::new_v4();
        let a = column(board, "A", 0);
        let t1 = task(&a, "t1", 0);
        let mut store = EntityStore::new();
        store.load(
            board,
            BoardSnapshot {
                columns: vec![a],
                tasks: vec![t1.clone()],
            },
        );
        let before = store.entities().clone();
        let mut draft = Draft::new(&mut store);
        draft.remove(EntityKey::task(t1.id));
        draft.abandon();
        assert_eq!(store.entities(), &before);
    }

    // ── Commit against a backend that can be told to fail ────────────

    use crate::sync::gateway::{RemoteGateway, Subscription};
    use crate::sync::remote::SqliteGateway;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Delegates to a real gateway but fails the write with the given
    /// zero-based index, counting inserts, updates and removes.
    struct FlakyGateway {
        inner: SqliteGateway,
        writes: AtomicUsize,
        fail_at: Mutex<Option<usize>>,
    }

    impl FlakyGateway {
        fn new(inner: SqliteGateway) -> Self {
            Self {
                inner,
                writes: AtomicUsize::new(0),
                fail_at: Mutex::new(None),
            }
        }

        fn fail_write(&self, index: usize) {
            self.writes.store(0, Ordering::SeqCst);
            *self.fail_at.lock().unwrap() = Some(index);
        }

        fn check(&self) -> SyncResult<()> {
            let n = self.writes.fetch_add(1, Ordering::SeqCst);
            if *self.fail_at.lock().unwrap() == Some(n) {
                return Err(SyncError::Network(anyhow::anyhow!("connection reset")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteGateway for FlakyGateway {
        async fn list_boards(&self, owner_id: &str) -> SyncResult<Vec<Board>> {
            self.inner.list_boards(owner_id).await
        }
        async fn list(&self, board_id: Uuid) -> SyncResult<BoardSnapshot> {
            self.inner.list(board_id).await
        }
        async fn insert(&self, row: Row) -> SyncResult<Row> {
            self.check()?;
            self.inner.insert(row).await
        }
        async fn update(&self, table: Table, id: Uuid, patch: serde_json::Value) -> SyncResult<()> {
            self.check()?;
            self.inner.update(table, id, patch).await
        }
        async fn remove(&self, table: Table, id: Uuid) -> SyncResult<()> {
            self.check()?;
            self.inner.remove(table, id).await
        }
        async fn subscribe(&self, board_id: Uuid) -> SyncResult<Subscription> {
            self.inner.subscribe(board_id).await
        }
    }

    struct Fixture {
        remote: SqliteGateway,
        flaky: Arc<FlakyGateway>,
        engine: Engine,
        board: Uuid,
        todo: Column,
        done: Column,
    }

    async fn fixture() -> SyncResult<Fixture> {
        fixture_with(TasksConfig::default()).await
    }

    async fn fixture_with(limits: TasksConfig) -> SyncResult<Fixture> {
        let remote = SqliteGateway::new_in_memory()?;
        let board = Board {
            id: Uuid::new_v4(),
            owner_id: "alice".to_string(),
            name: "Home".to_string(),
            created_at: Utc::now(),
        };
        remote.insert(Row::Board(board.clone())).await?;
        let todo = column(board.id, "To Do", 0);
        let done = column(board.id, "Done", 1);
        remote.insert(Row::Column(todo.clone())).await?;
        remote.insert(Row::Column(done.clone())).await?;

        let flaky = Arc::new(FlakyGateway::new(remote.clone()));
        let ctx = BoardContext::new(flaky.clone());
        let snapshot = remote.list(board.id).await?;
        ctx.mutate(|store| store.load(board.id, snapshot))?;
        let engine = Engine::new(ctx, limits);
        Ok(Fixture {
            remote,
            flaky,
            engine,
            board: board.id,
            todo,
            done,
        })
    }

    #[tokio::test]
    async fn test_create_task_commits_and_matches_remote() -> SyncResult<()> {
        let f = fixture().await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        let b = f.engine.create_task(f.todo.id, NewTask::titled("b"), Some(0)).await?;

        let local = f.engine.context().read(|s| {
            s.tasks_in(f.todo.id)
                .iter()
                .map(|t| (t.id, t.position))
                .collect::<Vec<_>>()
        })?;
        assert_eq!(local, vec![(b.id, 0), (a.id, 1)]);

        let remote = f.remote.list(f.board).await?;
        let mut remote: Vec<_> = remote.tasks.iter().map(|t| (t.id, t.position)).collect();
        remote.sort_by_key(|(_, p)| *p);
        assert_eq!(remote, local);
        assert_eq!(f.engine.in_flight(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_create_rolls_back_exactly() -> SyncResult<()> {
        let f = fixture().await?;
        f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        let before = f.engine.context().read(|s| s.entities().clone())?;

        f.flaky.fail_write(0);
        let err = f
            .engine
            .create_task(f.todo.id, NewTask::titled("b"), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(f.engine.context().read(|s| s.entities().clone())?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_compensates_remote() -> SyncResult<()> {
        let f = fixture().await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        let before_local = f.engine.context().read(|s| s.entities().clone())?;

        // The insert succeeds, then shifting `a` fails.
        f.flaky.fail_write(1);
        let err = f
            .engine
            .create_task(f.todo.id, NewTask::titled("b"), Some(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(f.engine.context().read(|s| s.entities().clone())?, before_local);

        let remote = f.remote.list(f.board).await?;
        assert_eq!(remote.tasks.len(), 1);
        assert_eq!(remote.tasks[0].id, a.id);
        assert_eq!(remote.tasks[0].position, 0);
        Ok(())
    }

    fn local_order(f: &Fixture, column: Uuid) -> SyncResult<Vec<(String, i64)>> {
        f.engine
            .context()
            .read(|s| s.tasks_in(column).iter().map(|t| (t.title.clone(), t.position)).collect())
    }

    async fn remote_order(f: &Fixture, column: Uuid) -> SyncResult<Vec<(String, i64)>> {
        let mut tasks: Vec<(String, i64)> = f
            .remote
            .list(f.board)
            .await?
            .tasks
            .into_iter()
            .filter(|t| t.column_id == column)
            .map(|t| (t.title, t.position))
            .collect();
        tasks.sort_by_key(|(_, p)| *p);
        Ok(tasks)
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back_exactly() -> SyncResult<()> {
        let f = fixture().await?;
        let mut ids = Vec::new();
        for title in ["T1", "T2", "T3"] {
            ids.push(f.engine.create_task(f.todo.id, NewTask::titled(title), None).await?.id);
        }
        let before = f.engine.context().read(|s| s.entities().clone())?;

        // T3's own update lands, then shifting T1 down fails.
        f.flaky.fail_write(1);
        let err = f.engine.move_task(ids[2], f.todo.id, 0).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));

        assert_eq!(f.engine.context().read(|s| s.entities().clone())?, before);
        let expected = vec![("T1".to_string(), 0), ("T2".to_string(), 1), ("T3".to_string(), 2)];
        assert_eq!(remote_order(&f, f.todo.id).await?, expected);
        assert_eq!(f.engine.in_flight(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_task_leaves_gap_by_default() -> SyncResult<()> {
        let f = fixture().await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        f.engine.create_task(f.todo.id, NewTask::titled("b"), None).await?;
        f.engine.create_task(f.todo.id, NewTask::titled("c"), None).await?;

        f.engine.delete_task(a.id).await?;
        let expected = vec![("b".to_string(), 1), ("c".to_string(), 2)];
        assert_eq!(local_order(&f, f.todo.id)?, expected);
        assert_eq!(remote_order(&f, f.todo.id).await?, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_task_compacts_when_configured() -> SyncResult<()> {
        let limits = TasksConfig {
            compact_on_delete: true,
            ..TasksConfig::default()
        };
        let f = fixture_with(limits).await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        f.engine.create_task(f.todo.id, NewTask::titled("b"), None).await?;
        f.engine.create_task(f.todo.id, NewTask::titled("c"), None).await?;

        f.engine.delete_task(a.id).await?;
        let expected = vec![("b".to_string(), 0), ("c".to_string(), 1)];
        assert_eq!(local_order(&f, f.todo.id)?, expected);
        assert_eq!(remote_order(&f, f.todo.id).await?, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_column_shifts_siblings() -> SyncResult<()> {
        let f = fixture().await?;
        let doing = f.engine.create_column("Doing", None).await?;
        assert_eq!(doing.position, 2);

        let moved = f.engine.move_column(doing.id, 0).await?;
        assert_eq!(moved.position, 0);

        let local = f.engine.context().read(|s| {
            s.columns_ordered()
                .iter()
                .map(|c| (c.title.clone(), c.position))
                .collect::<Vec<_>>()
        })?;
        let expected = vec![
            ("Doing".to_string(), 0),
            ("To Do".to_string(), 1),
            ("Done".to_string(), 2),
        ];
        assert_eq!(local, expected);

        let mut remote: Vec<(String, i64)> = f
            .remote
            .list(f.board)
            .await?
            .columns
            .into_iter()
            .map(|c| (c.title, c.position))
            .collect();
        remote.sort_by_key(|(_, p)| *p);
        assert_eq!(remote, expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_rename_column() -> SyncResult<()> {
        let f = fixture().await?;
        let renamed = f.engine.rename_column(f.done.id, "  Shipped ").await?;
        assert_eq!(renamed.title, "Shipped");
        assert_eq!(renamed.position, f.done.position);

        let remote = f.remote.list(f.board).await?;
        assert!(remote.columns.iter().any(|c| c.id == f.done.id && c.title == "Shipped"));

        let err = f.engine.rename_column(f.done.id, " ").await.unwrap_err();
        assert!(err.is_validation());
        let local = f.engine.context().read(|s| s.column(f.done.id).map(|c| c.title.clone()))?;
        assert_eq!(local.as_deref(), Some("Shipped"));
        Ok(())
    }

    #[tokio::test]
    async fn test_move_task_across_columns() -> SyncResult<()> {
        let f = fixture().await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        let b = f.engine.create_task(f.done.id, NewTask::titled("b"), None).await?;

        let moved = f.engine.move_task(a.id, f.done.id, 0).await?;
        assert_eq!(moved.column_id, f.done.id);
        assert_eq!(moved.position, 0);

        let order = f
            .engine
            .context()
            .read(|s| s.tasks_in(f.done.id).iter().map(|t| t.id).collect::<Vec<_>>())?;
        assert_eq!(order, vec![a.id, b.id]);
        assert!(f.engine.context().read(|s| s.tasks_in(f.todo.id).is_empty())?);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_of_remotely_deleted_task_drops_it() -> SyncResult<()> {
        let f = fixture().await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        f.remote.remove(Table::Tasks, a.id).await?;

        let patch = TaskPatch {
            title: Some("renamed".to_string()),
            ..TaskPatch::default()
        };
        let err = f.engine.update_task(a.id, patch).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(f.engine.context().read(|s| s.task(a.id).is_none())?);
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_happens_before_apply() -> SyncResult<()> {
        let f = fixture().await?;
        let revision = f.engine.context().read(|s| s.revision())?;

        let err = f.engine.create_task(f.todo.id, NewTask::titled("   "), None).await.unwrap_err();
        assert!(err.is_validation());
        let err = f
            .engine
            .create_task(Uuid::new_v4(), NewTask::titled("x"), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let long = "x".repeat(TasksConfig::default().max_title_len + 1);
        let err = f.engine.create_column(&long, None).await.unwrap_err();
        assert!(err.is_validation());

        assert_eq!(f.engine.context().read(|s| s.revision())?, revision);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_last_column_is_rejected() -> SyncResult<()> {
        let f = fixture().await?;
        f.engine.create_task(f.done.id, NewTask::titled("x"), None).await?;
        f.engine.delete_column(f.done.id).await?;
        assert!(f.engine.context().read(|s| s.task_count() == 0)?);

        let err = f.engine.delete_column(f.todo.id).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(f.remote.list(f.board).await?.columns.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_after_board_switch_is_discarded() -> SyncResult<()> {
        let f = fixture().await?;
        let a = f.engine.create_task(f.todo.id, NewTask::titled("a"), None).await?;
        let pending = f.engine.begin(Intent::DeleteTask, |draft| {
            draft.remove(EntityKey::task(a.id));
            draft.write(RemoteWrite::Remove(EntityKey::task(a.id)));
            Ok(())
        })?;

        // Switch away before the remote write resolves.
        f.engine.context().advance_epoch();
        f.engine.context().mutate(|s| s.clear())?;
        f.flaky.fail_write(0);
        let err = f.engine.commit(pending.0).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert!(f.engine.context().read(|s| s.task_count() == 0 && s.board_id().is_none())?);
        Ok(())
    }
}

