//! Process-local registry of active tasks.
//!
//! [`TaskRegistry`] is the contract: the single source of truth for "what
//! is running now". [`InMemoryTaskRegistry`] implements it on a
//! [`DashMap`], the default backing used by the orchestrator.
//!
//! # Visibility
//!
//! Entries live only in this process. Several orchestrator instances, or
//! several OS processes behind a load balancer, each have their own
//! registry and do not see each other's tasks. A shared store can be put
//! behind the same trait if cross-instance visibility is needed.
//!
//! # Concurrency
//!
//! `DashMap` shards its locks, so the registry is safe on a multi-threaded
//! runtime. [`update`](TaskRegistry::update) runs the mutator while holding
//! the entry's shard lock: a concurrent [`get`](TaskRegistry::get) observes
//! the record either entirely before or entirely after the mutation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::RegistryError;
use crate::types::ProgressRecord;

/// Mapping from task id to the task's live [`ProgressRecord`].
pub trait TaskRegistry: Send + Sync {
    /// Inserts `record` under its `task_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] if the id is present;
    /// the existing entry is not touched.
    fn register(&self, record: ProgressRecord) -> Result<(), RegistryError>;

    /// Applies `mutator` in place to the entry for `task_id`.
    ///
    /// Returns `false` without calling the mutator if the id is absent, so
    /// late updates for removed or cancelled tasks are silently dropped.
    fn update(&self, task_id: &str, mutator: &mut dyn FnMut(&mut ProgressRecord)) -> bool;

    /// Deletes and returns the entry, if present.
    fn remove(&self, task_id: &str) -> Option<ProgressRecord>;

    /// Returns a copy of the entry, if present.
    fn get(&self, task_id: &str) -> Option<ProgressRecord>;

    /// Returns copies of all entries, oldest first.
    ///
    /// The snapshot is detached: later registry mutations do not show up in
    /// the returned vector.
    fn list(&self) -> Vec<ProgressRecord>;

    /// Number of registered tasks.
    fn len(&self) -> usize;

    /// Returns `true` if no task is registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`TaskRegistry`] backed by a `DashMap<String, ProgressRecord>`.
///
/// # Examples
///
/// ```
/// use archi_pipeline::registry::{InMemoryTaskRegistry, TaskRegistry};
/// use archi_pipeline::{ProgressRecord, Stage};
///
/// let registry = InMemoryTaskRegistry::new();
/// registry.register(ProgressRecord::new("t1")).unwrap();
/// assert!(registry.register(ProgressRecord::new("t1")).is_err());
///
/// registry.update("t1", &mut |r| {
///     r.enter(Stage::Collecting, "collecting").unwrap();
/// });
/// assert_eq!(registry.get("t1").unwrap().stage, Stage::Collecting);
///
/// assert!(registry.remove("t1").is_some());
/// assert!(!registry.update("t1", &mut |r| r.advance(0.2, "late")));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryTaskRegistry {
    entries: DashMap<String, ProgressRecord>,
}

impl InMemoryTaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl TaskRegistry for InMemoryTaskRegistry {
    fn register(&self, record: ProgressRecord) -> Result<(), RegistryError> {
        match self.entries.entry(record.task_id.clone()) {
            Entry::Occupied(occupied) => Err(RegistryError::AlreadyRegistered {
                task_id: occupied.key().clone(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            },
        }
    }

    fn update(&self, task_id: &str, mutator: &mut dyn FnMut(&mut ProgressRecord)) -> bool {
        match self.entries.get_mut(task_id) {
            Some(mut entry) => {
                mutator(entry.value_mut());
                true
            },
            None => false,
        }
    }

    fn remove(&self, task_id: &str) -> Option<ProgressRecord> {
        self.entries.remove(task_id).map(|(_, record)| record)
    }

    fn get(&self, task_id: &str) -> Option<ProgressRecord> {
        self.entries.get(task_id).map(|entry| entry.value().clone())
    }

    fn list(&self) -> Vec<ProgressRecord> {
        let mut records: Vec<ProgressRecord> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        records
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_rejects_duplicates_and_keeps_original() {
        let registry = InMemoryTaskRegistry::new();
        let mut first = ProgressRecord::new("dup");
        first.message = "first".to_string();
        registry.register(first).unwrap();

        let err = registry.register(ProgressRecord::new("dup")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyRegistered {
                task_id: "dup".to_string()
            }
        );
        assert_eq!(registry.get("dup").unwrap().message, "first");
    }

    #[test]
    fn update_on_missing_id_is_a_noop() {
        let registry = InMemoryTaskRegistry::new();
        let mut called = false;
        assert!(!registry.update("ghost", &mut |_| called = true));
        assert!(!called);
    }

    #[test]
    fn list_is_a_detached_snapshot() {
        let registry = InMemoryTaskRegistry::new();
        registry.register(ProgressRecord::new("a")).unwrap();
        registry.register(ProgressRecord::new("b")).unwrap();

        let snapshot = registry.list();
        registry.update("a", &mut |r| {
            r.enter(Stage::Collecting, "collecting").unwrap();
        });
        registry.remove("b");

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|r| r.stage == Stage::Initialized));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_returns_entry_once() {
        let registry = InMemoryTaskRegistry::new();
        registry.register(ProgressRecord::new("t")).unwrap();
        assert_eq!(registry.remove("t").unwrap().task_id, "t");
        assert!(registry.remove("t").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_on_distinct_tasks() {
        use std::sync::Arc;

        let registry = Arc::new(InMemoryTaskRegistry::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let id = format!("task-{i}");
                registry.register(ProgressRecord::new(id.clone())).unwrap();
                registry.update(&id, &mut |r| {
                    r.enter(Stage::Collecting, "collecting").unwrap();
                });
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.len(), 16);
        assert!(registry
            .list()
            .iter()
            .all(|r| r.stage == Stage::Collecting && r.progress == 0.1));
    }
}
