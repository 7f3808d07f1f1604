use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{Persistence, QueryExecutor, Record, matcher};
use crate::{
    error::Error,
    query::{Criteria, QueryOptions},
    value::Document,
};

pub type DestroyHook = Arc<dyn Fn(&str, &Record) + Send + Sync>;

/// Counters for the writes the adapter has performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdapterStats {
    pub saves: u64,
    /// Single-document removals that ran destroy hooks.
    pub destroys: u64,
    /// Documents removed without hooks, single or bulk.
    pub deletes: u64,
}

#[derive(Default)]
struct Counters {
    saves: AtomicU64,
    destroys: AtomicU64,
    deletes: AtomicU64,
}

#[derive(Clone, Default)]
struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<Record>>>>,
    hooks: Arc<Mutex<Vec<DestroyHook>>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    fn collections(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Record>>>, Error> {
        self.collections
            .lock()
            .map_err(|_| Error::Storage("memory store lock poisoned".into()))
    }

    fn hooks(&self) -> Result<Vec<DestroyHook>, Error> {
        self.hooks
            .lock()
            .map(|hooks| hooks.clone())
            .map_err(|_| Error::Storage("memory hook lock poisoned".into()))
    }

    /// Removes `id` from `collection`, returning the removed record.
    fn remove(&self, collection: &str, id: Uuid) -> Result<Option<Record>, Error> {
        let mut collections = self.collections()?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(None);
        };
        Ok(records
            .iter()
            .position(|record| record.id == id)
            .map(|index| records.remove(index)))
    }
}

/// In-process store keeping each collection as an insertion-ordered list.
///
/// Clones share the same data, so a test can keep a handle for inspection
/// while the engine owns another.
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    store: MemoryStore,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook run for every document removed through `destroy`.
    pub fn on_destroy<F>(&self, hook: F) -> Result<(), Error>
    where
        F: Fn(&str, &Record) + Send + Sync + 'static,
    {
        self.store
            .hooks
            .lock()
            .map_err(|_| Error::Storage("memory hook lock poisoned".into()))?
            .push(Arc::new(hook));
        Ok(())
    }

    pub fn stats(&self) -> AdapterStats {
        let counters = &self.store.counters;
        AdapterStats {
            saves: counters.saves.load(Ordering::Relaxed),
            destroys: counters.destroys.load(Ordering::Relaxed),
            deletes: counters.deletes.load(Ordering::Relaxed),
        }
    }

    /// Raw stored bodies of `collection`, in insertion order.
    pub fn records(&self, collection: &str) -> Result<Vec<Record>, Error> {
        Ok(self
            .store
            .collections()?
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl QueryExecutor for MemoryAdapter {
    async fn find(
        &self,
        collection: &str,
        criteria: &Criteria,
        options: &QueryOptions,
    ) -> Result<Vec<Record>, Error> {
        let collections = self.store.collections()?;
        let mut found = Vec::new();
        for record in collections.get(collection).into_iter().flatten() {
            if matcher::matches(&record.data, criteria)? {
                found.push(record.clone());
            }
        }
        Ok(matcher::shape(found, options))
    }

    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64, Error> {
        let collections = self.store.collections()?;
        let mut count = 0;
        for record in collections.get(collection).into_iter().flatten() {
            if matcher::matches(&record.data, criteria)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_many(&self, collection: &str, criteria: &Criteria) -> Result<u64, Error> {
        let mut collections = self.store.collections()?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut kept = Vec::with_capacity(records.len());
        let mut deleted = 0;
        for record in records.drain(..) {
            if matcher::matches(&record.data, criteria)? {
                deleted += 1;
            } else {
                kept.push(record);
            }
        }
        *records = kept;

        self.store.counters.deletes.fetch_add(deleted, Ordering::Relaxed);
        debug!(collection, deleted, "bulk delete");
        Ok(deleted)
    }

    async fn update_many(
        &self,
        collection: &str,
        criteria: &Criteria,
        update: &Document,
    ) -> Result<u64, Error> {
        let mut collections = self.store.collections()?;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let mut updated = 0;
        for record in records.iter_mut() {
            if matcher::matches(&record.data, criteria)? {
                matcher::apply_update(&mut record.data, update)?;
                updated += 1;
            }
        }
        debug!(collection, updated, "bulk update");
        Ok(updated)
    }
}

#[async_trait]
impl Persistence for MemoryAdapter {
    async fn save(&self, collection: &str, record: Record) -> Result<(), Error> {
        let mut collections = self.store.collections()?;
        let records = collections.entry(collection.to_string()).or_default();
        match records.iter_mut().find(|stored| stored.id == record.id) {
            Some(stored) => *stored = record,
            None => records.push(record),
        }
        self.store.counters.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn destroy(&self, collection: &str, id: Uuid) -> Result<(), Error> {
        let Some(record) = self.store.remove(collection, id)? else {
            return Ok(());
        };
        for hook in self.store.hooks()? {
            hook(collection, &record);
        }
        self.store.counters.destroys.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: Uuid) -> Result<(), Error> {
        if self.store.remove(collection, id)?.is_some() {
            self.store.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
