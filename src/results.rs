//! Bounded cache of finished task results.
//!
//! Tasks leave the [`TaskRegistry`](crate::registry::TaskRegistry) the
//! moment they finish, so `get_result` needs somewhere else to look. The
//! cache keeps the most recent `capacity` results and evicts the oldest
//! insertion first. It is in-memory only; results do not survive a restart.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::types::TaskResult;

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<String, TaskResult>,
    order: VecDeque<String>,
}

/// Completed-result store keyed by task id.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use archi_pipeline::results::ResultCache;
/// use archi_pipeline::TaskResult;
///
/// let cache = ResultCache::new(1);
/// let result = |id: &str| TaskResult {
///     task_id: id.to_string(),
///     success: false,
///     analysis: None,
///     report_location: None,
///     records: vec![],
///     error_message: Some("x".to_string()),
///     elapsed: Duration::from_millis(1),
///     progress_history: vec![],
/// };
/// cache.insert(result("a"));
/// cache.insert(result("b"));
/// assert!(cache.get("a").is_none());
/// assert!(cache.get("b").is_some());
/// ```
#[derive(Debug)]
pub struct ResultCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ResultCache {
    /// Creates a cache holding at most `capacity` results.
    ///
    /// A capacity of zero disables retention.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Stores `result`, evicting the oldest entries beyond capacity.
    pub fn insert(&self, result: TaskResult) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        let task_id = result.task_id.clone();
        if inner.results.insert(task_id.clone(), result).is_none() {
            inner.order.push_back(task_id);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.results.remove(&oldest);
            }
        }
    }

    /// Returns a copy of the result for `task_id`.
    pub fn get(&self, task_id: &str) -> Option<TaskResult> {
        self.inner.lock().results.get(task_id).cloned()
    }

    /// Number of retained results.
    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    /// Returns `true` if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(id: &str) -> TaskResult {
        TaskResult {
            task_id: id.to_string(),
            success: true,
            analysis: None,
            report_location: None,
            records: Vec::new(),
            error_message: None,
            elapsed: Duration::from_millis(5),
            progress_history: Vec::new(),
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let cache = ResultCache::new(2);
        cache.insert(result("a"));
        cache.insert(result("b"));
        cache.insert(result("c"));
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn reinserting_same_id_does_not_grow() {
        let cache = ResultCache::new(2);
        cache.insert(result("a"));
        cache.insert(result("a"));
        cache.insert(result("b"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn zero_capacity_retains_nothing() {
        let cache = ResultCache::new(0);
        cache.insert(result("a"));
        assert!(cache.is_empty());
    }
}
