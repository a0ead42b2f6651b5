use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use super::models::*;
use super::positions::{self, Placement, WritePlan};
use crate::errors::{BoardError, Result};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BoardError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| BoardError::Other(anyhow::anyhow!("DB task panicked: {}", e)))?
    }
}

pub struct BoardDb {
    conn: Connection,
}

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.conn
            .busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS boards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS board_columns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    color TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(board_id, position)
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    column_id INTEGER NOT NULL REFERENCES board_columns(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT,
                    priority TEXT NOT NULL DEFAULT 'medium',
                    due_date TEXT,
                    position INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(column_id, position)
                );

                CREATE INDEX IF NOT EXISTS idx_columns_board ON board_columns(board_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_column ON tasks(column_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Start a write transaction that takes the database write lock up front,
    /// so the ordering read inside it cannot go stale before the write.
    fn begin_write(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // ── Board CRUD ────────────────────────────────────────────────────

    /// Create a board together with its three seed columns.
    pub fn create_board(&self, title: &str, description: Option<&str>) -> Result<Board> {
        let title = required_title("Board", title)?;
        let description = optional_text(description);

        let tx = self.begin_write()?;
        tx.execute(
            "INSERT INTO boards (title, description) VALUES (?1, ?2)",
            params![title, description],
        )?;
        let board_id = tx.last_insert_rowid();
        for (position, (col_title, color)) in SEED_COLUMNS.iter().enumerate() {
            tx.execute(
                "INSERT INTO board_columns (board_id, title, color, position) VALUES (?1, ?2, ?3, ?4)",
                params![board_id, col_title, color, position as i64],
            )?;
        }
        tx.commit()?;

        tracing::info!(board_id, title = %title, "Created board");
        self.get_board(board_id)?
            .ok_or(BoardError::BoardNotFound { id: board_id })
    }

    pub fn list_boards(&self) -> Result<Vec<Board>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, title, description, created_at FROM boards ORDER BY id")?;
        let rows = stmt.query_map([], board_from_row)?;
        let mut boards = Vec::new();
        for row in rows {
            boards.push(row?);
        }
        Ok(boards)
    }

    pub fn get_board(&self, id: i64) -> Result<Option<Board>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, title, description, created_at FROM boards WHERE id = ?1",
                params![id],
                board_from_row,
            )
            .optional()?)
    }

    // ── Column CRUD ───────────────────────────────────────────────────

    /// Append a column after the board's last column.
    pub fn append_column(&self, board_id: i64, title: &str, color: &str) -> Result<Column> {
        let title = required_title("Column", title)?;

        let tx = self.begin_write()?;
        let exists: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM boards WHERE id = ?1",
            params![board_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(BoardError::BoardNotFound { id: board_id });
        }
        let max_pos: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) FROM board_columns WHERE board_id = ?1",
            params![board_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO board_columns (board_id, title, color, position) VALUES (?1, ?2, ?3, ?4)",
            params![board_id, title, color.trim(), max_pos + 1],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(board_id, column_id = id, position = max_pos + 1, "Appended column");
        self.get_column(id)?.ok_or(BoardError::ColumnNotFound { id })
    }

    pub fn get_column(&self, id: i64) -> Result<Option<Column>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, board_id, title, color, position, created_at FROM board_columns WHERE id = ?1",
                params![id],
                column_from_row,
            )
            .optional()?)
    }

    pub fn list_columns(&self, board_id: i64) -> Result<Vec<Column>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, board_id, title, color, position, created_at
             FROM board_columns WHERE board_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![board_id], column_from_row)?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        Ok(columns)
    }

    // ── Task CRUD ─────────────────────────────────────────────────────

    /// Append a task after the column's last task.
    pub fn append_task(&self, column_id: i64, new_task: &NewTask) -> Result<Task> {
        let title = required_title("Task", &new_task.title)?;
        let description = optional_text(new_task.description.as_deref());

        let tx = self.begin_write()?;
        if column_row(&tx, column_id)?.is_none() {
            return Err(BoardError::ColumnNotFound { id: column_id });
        }
        let max_pos: i64 = tx.query_row(
            "SELECT COALESCE(MAX(position), -1) FROM tasks WHERE column_id = ?1",
            params![column_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO tasks (column_id, title, description, priority, due_date, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                column_id,
                title,
                description,
                new_task.priority.as_str(),
                new_task.due_date,
                max_pos + 1
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        tracing::info!(column_id, task_id = id, position = max_pos + 1, "Appended task");
        self.get_task(id)?.ok_or(BoardError::TaskNotFound { id })
    }

    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, column_id, title, description, priority, due_date, position, created_at, updated_at
                 FROM tasks WHERE id = ?1",
                params![id],
                TaskRow::from_row,
            )
            .optional()?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn list_tasks(&self, column_id: i64) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, column_id, title, description, priority, due_date, position, created_at, updated_at
             FROM tasks WHERE column_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![column_id], TaskRow::from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?.into_task()?);
        }
        Ok(tasks)
    }

    // ── Board snapshot ────────────────────────────────────────────────

    /// Read a board with its columns and tasks in position order.
    pub fn get_board_snapshot(&self, board_id: i64) -> Result<BoardSnapshot> {
        let board = self
            .get_board(board_id)?
            .ok_or(BoardError::BoardNotFound { id: board_id })?;

        let mut columns = Vec::new();
        for column in self.list_columns(board_id)? {
            let tasks = self.list_tasks(column.id)?;
            columns.push(ColumnWithTasks { column, tasks });
        }

        Ok(BoardSnapshot {
            board,
            columns,
            version: 0,
        })
    }

    // ── Position store ────────────────────────────────────────────────

    /// Move a task to `new_index` inside the column it already belongs to.
    pub fn reorder_task(&self, task_id: i64, new_index: usize, column_id: i64) -> Result<Task> {
        let tx = self.begin_write()?;
        if column_row(&tx, column_id)?.is_none() {
            return Err(BoardError::ColumnNotFound { id: column_id });
        }
        let task_column = task_column_id(&tx, task_id)?;
        if task_column != column_id {
            return Err(BoardError::TaskNotInColumn { task_id, column_id });
        }

        let ordered = ordered_task_ids(&tx, column_id)?;
        let desired = positions::reorder(&ordered, column_id, task_id, new_index)?;
        let plan = positions::plan_writes(
            &positions::placements(column_id, &ordered),
            &positions::placements(column_id, &desired),
        );
        apply_plan(&tx, &plan)?;
        tx.commit()?;

        tracing::info!(task_id, column_id, new_index, rows = plan.len(), "Reordered task");
        self.get_task(task_id)?
            .ok_or(BoardError::TaskNotFound { id: task_id })
    }

    /// Move a task from `source_column_id` into `target_column_id` at `new_index`.
    pub fn move_task(
        &self,
        task_id: i64,
        source_column_id: i64,
        target_column_id: i64,
        new_index: usize,
    ) -> Result<Task> {
        let tx = self.begin_write()?;
        let source = column_row(&tx, source_column_id)?
            .ok_or(BoardError::ColumnNotFound { id: source_column_id })?;
        let target = column_row(&tx, target_column_id)?
            .ok_or(BoardError::ColumnNotFound { id: target_column_id })?;
        let task_column = task_column_id(&tx, task_id)?;
        if task_column != source_column_id {
            return Err(BoardError::TaskNotInColumn {
                task_id,
                column_id: source_column_id,
            });
        }
        if source.board_id != target.board_id {
            return Err(BoardError::invalid(format!(
                "Columns {} and {} belong to different boards",
                source_column_id, target_column_id
            )));
        }

        let source_ids = ordered_task_ids(&tx, source_column_id)?;
        let target_ids = ordered_task_ids(&tx, target_column_id)?;
        let (next_source, next_target) = positions::move_between(
            &source_ids,
            source_column_id,
            &target_ids,
            target_column_id,
            task_id,
            new_index,
        )?;

        let (current, desired) = if source_column_id == target_column_id {
            (
                positions::placements(source_column_id, &source_ids),
                positions::placements(source_column_id, &next_source),
            )
        } else {
            let mut current = positions::placements(source_column_id, &source_ids);
            current.extend(positions::placements(target_column_id, &target_ids));
            let mut desired = positions::placements(source_column_id, &next_source);
            desired.extend(positions::placements(target_column_id, &next_target));
            (current, desired)
        };

        let plan = positions::plan_writes(&current, &desired);
        apply_plan(&tx, &plan)?;
        tx.commit()?;

        tracing::info!(
            task_id,
            source_column_id,
            target_column_id,
            new_index,
            rows = plan.len(),
            "Moved task"
        );
        self.get_task(task_id)?
            .ok_or(BoardError::TaskNotFound { id: task_id })
    }
}

// ── Internal helpers ──────────────────────────────────────────────────

fn required_title(kind: &str, title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BoardError::invalid(format!("{} title is required", kind)));
    }
    Ok(title.to_string())
}

fn optional_text(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn board_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Board> {
    Ok(Board {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn column_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get(0)?,
        board_id: row.get(1)?,
        title: row.get(2)?,
        color: row.get(3)?,
        position: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn column_row(conn: &Connection, column_id: i64) -> Result<Option<Column>> {
    Ok(conn
        .query_row(
            "SELECT id, board_id, title, color, position, created_at FROM board_columns WHERE id = ?1",
            params![column_id],
            column_from_row,
        )
        .optional()?)
}

fn task_column_id(conn: &Connection, task_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT column_id FROM tasks WHERE id = ?1",
        params![task_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(BoardError::TaskNotFound { id: task_id })
}

fn ordered_task_ids(conn: &Connection, column_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM tasks WHERE column_id = ?1 ORDER BY position")?;
    let rows = stmt.query_map(params![column_id], |row| row.get(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

fn apply_phase(conn: &Connection, phase: &[Placement]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE tasks SET column_id = ?1, position = ?2, updated_at = datetime('now') WHERE id = ?3",
    )?;
    for p in phase {
        stmt.execute(params![p.column_id, p.position, p.task_id])?;
    }
    Ok(())
}

/// Scratch phase then final phase. The caller owns the transaction.
fn apply_plan(conn: &Connection, plan: &WritePlan) -> Result<()> {
    apply_phase(conn, &plan.scratch)?;
    apply_phase(conn, &plan.finals)
}

/// Intermediate row struct for reading tasks from SQLite before converting
/// the priority string into its typed value.
struct TaskRow {
    id: i64,
    column_id: i64,
    title: String,
    description: Option<String>,
    priority: String,
    due_date: Option<chrono::NaiveDate>,
    position: i64,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            column_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            priority: row.get(4)?,
            due_date: row.get(5)?,
            position: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        let priority = Priority::from_str(&self.priority)
            .map_err(|e| BoardError::Other(anyhow::anyhow!(e)))?;
        Ok(Task {
            id: self.id,
            column_id: self.column_id,
            title: self.title,
            description: self.description,
            priority,
            due_date: self.due_date,
            position: self.position,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
