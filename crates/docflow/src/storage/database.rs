//! SQLite task store
//!
//! Durable storage for task records. One connection guarded by a mutex and
//! driven from the blocking pool. Each status update runs in an immediate
//! transaction that reads the current status, checks the transition, and
//! writes the new fields with `updated_at` together.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::TaskStore;
use crate::error::{Error, Result};
use crate::types::{OwnerId, StatusUpdate, Task, TaskKind, TaskStatus};

const TASK_COLUMNS: &str = "id, owner_id, filename, file_size, task_type, status, \
                            result, error_message, created_at, updated_at";

/// SQLite-based task store
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::persistence(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::persistence(format!("Failed to open in-memory database: {}", e))
        })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=5000;
        "#,
        )
        .map_err(|e| Error::persistence(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                owner_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                task_type TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_owner_created
                ON tasks(owner_id, created_at DESC);
        "#,
        )
        .map_err(|e| Error::persistence(format!("Failed to run migrations: {}", e)))?;

        Ok(())
    }

    /// rusqlite is sync, run it on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let task = task.clone();
        self.blocking(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO tasks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    TASK_COLUMNS
                ),
                params![
                    task.id.to_string(),
                    task.owner.0,
                    task.filename,
                    task.file_size as i64,
                    task.kind.as_str(),
                    task.status.as_str(),
                    task.result,
                    task.error,
                    timestamp(&task.created_at),
                    timestamp(&task.updated_at),
                ],
            )
            .map_err(|e| {
                Error::persistence(format!("Failed to create task {}: {}", task.id, e))
            })?;
            Ok(())
        })
        .await
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<Task> {
        let update = update.clone();
        self.blocking(move |conn| {
            // Take the write lock up front so a busy database waits on busy_timeout
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| Error::persistence(format!("Failed to begin transaction: {}", e)))?;

            let mut task =
                select_task(&tx, id)?.ok_or_else(|| Error::NotFound(id.to_string()))?;
            let at = Utc::now().trunc_subsecs(6).max(task.updated_at);
            task.apply(&update, at)?;

            tx.execute(
                r#"
                UPDATE tasks SET
                    status = ?2,
                    result = ?3,
                    error_message = ?4,
                    updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    id.to_string(),
                    task.status.as_str(),
                    task.result,
                    task.error,
                    timestamp(&task.updated_at),
                ],
            )
            .map_err(|e| Error::persistence(format!("Failed to update task {}: {}", id, e)))?;

            tx.commit()
                .map_err(|e| Error::persistence(format!("Failed to commit task {}: {}", id, e)))?;

            Ok(task)
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        self.blocking(move |conn| {
            select_task(conn, id)?.ok_or_else(|| Error::NotFound(id.to_string()))
        })
        .await
    }

    async fn list(&self, owner: OwnerId, limit: usize) -> Result<Vec<Task>> {
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM tasks WHERE owner_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                    TASK_COLUMNS
                ))
                .map_err(|e| Error::persistence(format!("Failed to prepare query: {}", e)))?;

            let rows = stmt
                .query_map(params![owner.0, limit as i64], row_to_task)
                .map_err(|e| Error::persistence(format!("Failed to list tasks: {}", e)))?;

            let mut tasks = Vec::new();
            for row in rows {
                tasks.push(
                    row.map_err(|e| Error::persistence(format!("Failed to read task: {}", e)))??,
                );
            }
            Ok(tasks)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.blocking(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(|e| Error::persistence(format!("Database unavailable: {}", e)))?;
            Ok(())
        })
        .await
    }
}

fn select_task(conn: &Connection, id: Uuid) -> Result<Option<Task>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))
        .map_err(|e| Error::persistence(format!("Failed to prepare query: {}", e)))?;

    stmt.query_row(params![id.to_string()], row_to_task)
        .optional()
        .map_err(|e| Error::persistence(format!("Failed to get task {}: {}", id, e)))?
        .transpose()
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::persistence(format!("Bad timestamp '{}': {}", raw, e)))
}

/// Column values are read here; domain parsing happens in the inner `Result`
/// so that a malformed row surfaces as a persistence error.
fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Result<Task>> {
    let id_str: String = row.get(0)?;
    let owner_id: i64 = row.get(1)?;
    let filename: String = row.get(2)?;
    let file_size: i64 = row.get(3)?;
    let kind_str: String = row.get(4)?;
    let status_str: String = row.get(5)?;
    let result: Option<String> = row.get(6)?;
    let error: Option<String> = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    let parsed = || -> Result<Task> {
        Ok(Task {
            id: Uuid::parse_str(&id_str)
                .map_err(|e| Error::persistence(format!("Bad task id '{}': {}", id_str, e)))?,
            owner: OwnerId(owner_id),
            filename,
            file_size: file_size.max(0) as u64,
            kind: kind_str.parse::<TaskKind>().map_err(|_| {
                Error::persistence(format!("unknown task type '{}'", kind_str))
            })?,
            status: status_str.parse::<TaskStatus>()?,
            result,
            error,
            created_at: parse_timestamp(&created_at_str)?,
            updated_at: parse_timestamp(&updated_at_str)?,
        })
    };
    Ok(parsed())
}
