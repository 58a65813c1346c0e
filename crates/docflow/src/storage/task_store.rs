//! TaskStore contract and in-memory implementation

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{OwnerId, StatusUpdate, Task};

/// Durable record of processing tasks keyed by task id.
///
/// `update_status` sets `updated_at` in the same write as the status fields,
/// and a `get` after a successful update from the same caller observes it.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task; fails if the id already exists
    async fn create(&self, task: &Task) -> Result<()>;

    /// Apply a status change and return the updated record
    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<Task>;

    /// Fetch one task, `NotFound` if absent
    async fn get(&self, id: Uuid) -> Result<Task>;

    /// Tasks for one owner, newest first
    async fn list(&self, owner: OwnerId, limit: usize) -> Result<Vec<Task>>;

    /// Cheap liveness check
    async fn ping(&self) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<Uuid, Task>,
    /// Insertion order, oldest first
    order: Vec<Uuid>,
}

/// In-memory implementation for development and testing.
#[derive(Default)]
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks
    pub fn len(&self) -> usize {
        self.inner.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.tasks.contains_key(&task.id) {
            return Err(Error::persistence(format!("task {} already exists", task.id)));
        }
        inner.tasks.insert(task.id, task.clone());
        inner.order.push(task.id);
        Ok(())
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<Task> {
        let mut inner = self.inner.write();
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let at = Utc::now().max(task.updated_at);
        task.apply(update, at)?;
        Ok(task.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        self.inner
            .read()
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn list(&self, owner: OwnerId, limit: usize) -> Result<Vec<Task>> {
        let inner = self.inner.read();
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.tasks.get(id))
            .filter(|task| task.owner == owner)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskKind, TaskStatus};

    #[test]
    fn test_create_rejects_duplicate_id() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let task = Task::new(OwnerId(1), "a.txt", 3, TaskKind::Summarize);
            store.create(&task).await.unwrap();

            let err = store.create(&task).await.unwrap_err();
            assert!(matches!(err, Error::Persistence(_)));
            assert_eq!(store.len(), 1);
        });
    }

    #[test]
    fn test_update_is_visible_to_next_get() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let task = Task::new(OwnerId(1), "a.txt", 3, TaskKind::Summarize);
            store.create(&task).await.unwrap();

            store.update_status(task.id, &StatusUpdate::processing()).await.unwrap();
            store
                .update_status(task.id, &StatusUpdate::completed("done"))
                .await
                .unwrap();

            let stored = store.get(task.id).await.unwrap();
            assert_eq!(stored.status, TaskStatus::Completed);
            assert_eq!(stored.result.as_deref(), Some("done"));
            assert!(stored.updated_at >= stored.created_at);
        });
    }

    #[test]
    fn test_terminal_state_is_final() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let task = Task::new(OwnerId(1), "a.txt", 3, TaskKind::Summarize);
            store.create(&task).await.unwrap();
            store.update_status(task.id, &StatusUpdate::processing()).await.unwrap();
            store.update_status(task.id, &StatusUpdate::failed("boom")).await.unwrap();

            let err = store
                .update_status(task.id, &StatusUpdate::processing())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidTransition { .. }));
            assert_eq!(store.get(task.id).await.unwrap().status, TaskStatus::Failed);
        });
    }

    #[test]
    fn test_list_is_owner_scoped_newest_first() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let mut ids = Vec::new();
            for i in 0..4 {
                let owner = if i % 2 == 0 { OwnerId(7) } else { OwnerId(8) };
                let task = Task::new(owner, format!("{}.txt", i), 1, TaskKind::Qa);
                ids.push(task.id);
                store.create(&task).await.unwrap();
            }

            let listed = store.list(OwnerId(7), 10).await.unwrap();
            let listed_ids: Vec<_> = listed.iter().map(|t| t.id).collect();
            assert_eq!(listed_ids, vec![ids[2], ids[0]]);

            assert_eq!(store.list(OwnerId(7), 1).await.unwrap().len(), 1);
            assert!(store.list(OwnerId(99), 10).await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_missing_task_is_not_found() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let id = Uuid::new_v4();
            assert!(matches!(store.get(id).await, Err(Error::NotFound(_))));
            assert!(matches!(
                store.update_status(id, &StatusUpdate::processing()).await,
                Err(Error::NotFound(_))
            ));
        });
    }
}
