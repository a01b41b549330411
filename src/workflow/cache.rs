use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::workflow::result::ExecutionResult;

/// Finished executions by id, oldest evicted once `capacity` is reached.
pub struct ExecutionCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<String, ExecutionResult>,
    order: VecDeque<String>,
}

impl ExecutionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    pub async fn insert(&self, result: ExecutionResult) {
        if self.capacity == 0 {
            return;
        }
        let mut guard = self.inner.lock().await;
        let id = result.execution_id.clone();
        if guard.entries.insert(id.clone(), result).is_none() {
            guard.order.push_back(id);
        }
        while guard.order.len() > self.capacity {
            if let Some(evicted) = guard.order.pop_front() {
                guard.entries.remove(&evicted);
            }
        }
    }

    pub async fn get(&self, execution_id: &str) -> Option<ExecutionResult> {
        self.inner.lock().await.entries.get(execution_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
