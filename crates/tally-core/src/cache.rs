//! Bounded LRU cache of parsed datasets
//!
//! The index is behind a short-held mutex; every entry has its own
//! `RwLock` slot. Readers share an `Arc<Dataset>`, and concurrent requests
//! for a missing key share one load: the first caller parses under the
//! slot's write lock while the others wait.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::dataset::Dataset;
use crate::error::{Error, Result};

type Slot = Arc<RwLock<Option<Arc<Dataset>>>>;

#[derive(Default)]
struct Index {
    slots: HashMap<String, Slot>,
    /// Least recently used first
    order: VecDeque<String>,
}

impl Index {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.slots.remove(key);
        self.order.retain(|k| k != key);
    }

    fn evict(&mut self, capacity: usize) {
        while self.slots.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            tracing::debug!(key = %oldest, "Evicting cached dataset");
            self.slots.remove(&oldest);
        }
    }
}

pub struct DatasetCache {
    capacity: usize,
    index: Mutex<Index>,
}

impl DatasetCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            index: Mutex::new(Index::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached (or loading) entries
    pub fn len(&self) -> usize {
        self.lock_index().map(|i| i.slots.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached dataset for `key`, if loaded
    pub fn get(&self, key: &str) -> Result<Option<Arc<Dataset>>> {
        let slot = {
            let mut index = self.lock_index()?;
            let Some(slot) = index.slots.get(key).cloned() else {
                return Ok(None);
            };
            index.touch(key);
            slot
        };
        let guard = read_slot(&slot)?;
        Ok(guard.clone())
    }

    pub fn insert(&self, key: &str, dataset: Dataset) -> Result<Arc<Dataset>> {
        let dataset = Arc::new(dataset);
        let mut index = self.lock_index()?;
        index
            .slots
            .insert(key.to_string(), Arc::new(RwLock::new(Some(dataset.clone()))));
        index.touch(key);
        index.evict(self.capacity);
        Ok(dataset)
    }

    /// Return the cached dataset or run `load` exactly once for concurrent callers
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<Arc<Dataset>>
    where
        F: FnOnce() -> Result<Dataset>,
    {
        let slot = {
            let mut index = self.lock_index()?;
            let slot = index.slots.entry(key.to_string()).or_default().clone();
            index.touch(key);
            index.evict(self.capacity);
            slot
        };

        if let Some(dataset) = read_slot(&slot)?.as_ref() {
            tracing::debug!(key = %key, "Dataset cache hit");
            return Ok(dataset.clone());
        }

        let mut guard = write_slot(&slot)?;
        // Another caller may have loaded it while we waited
        if let Some(dataset) = guard.as_ref() {
            tracing::debug!(key = %key, "Dataset cache hit");
            return Ok(dataset.clone());
        }

        tracing::debug!(key = %key, "Dataset cache miss");
        match load() {
            Ok(dataset) => {
                let dataset = Arc::new(dataset);
                *guard = Some(dataset.clone());
                Ok(dataset)
            }
            Err(e) => {
                drop(guard);
                // Forget the empty slot so a later call retries
                let mut index = self.lock_index()?;
                if index.slots.get(key).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                    index.remove(key);
                }
                Err(e)
            }
        }
    }

    pub fn invalidate(&self, key: &str) -> Result<()> {
        self.lock_index()?.remove(key);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut index = self.lock_index()?;
        index.slots.clear();
        index.order.clear();
        Ok(())
    }

    fn lock_index(&self) -> Result<MutexGuard<'_, Index>> {
        self.index
            .lock()
            .map_err(|_| Error::Computation("dataset cache lock poisoned".to_string()))
    }
}

fn read_slot(slot: &Slot) -> Result<RwLockReadGuard<'_, Option<Arc<Dataset>>>> {
    slot.read()
        .map_err(|_| Error::Computation("dataset cache entry lock poisoned".to_string()))
}

fn write_slot(slot: &Slot) -> Result<RwLockWriteGuard<'_, Option<Arc<Dataset>>>> {
    slot.write()
        .map_err(|_| Error::Computation("dataset cache entry lock poisoned".to_string()))
}
