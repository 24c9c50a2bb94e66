//! In-memory fakes for exercising the engine without real stores.

use crate::{
    errors::{ReconcileError, ReconcileResult},
    models::{
        action::{Mutation, Precondition},
        archive::StoredObject,
        record::IndexRecord,
    },
    services::{index_store::IndexStore, object_store::ObjectStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Object store holding keys and generation tokens in a map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Option<String>, Bytes)>>,
    /// Number of upcoming `list` calls that fail with a transient error.
    pub failing_lists: AtomicU32,
}

impl MemoryObjectStore {
    pub fn with_objects(objects: &[(&str, Option<&str>)]) -> Self {
        let store = Self::default();
        for (path, generation) in objects {
            store.insert(path, generation.map(str::to_string));
        }
        store
    }

    pub fn insert(&self, path: &str, generation: Option<String>) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), (generation, Bytes::new()));
    }

    pub fn remove(&self, path: &str) {
        self.objects.lock().unwrap().remove(path);
    }

    pub fn body(&self, path: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|(_, body)| body.clone())
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        "test-bucket"
    }

    async fn list(&self, prefix: &str) -> ReconcileResult<Vec<StoredObject>> {
        let remaining = self.failing_lists.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_lists.store(remaining - 1, Ordering::SeqCst);
            return Err(ReconcileError::Store(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "listing interrupted",
            )));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, (generation, body))| StoredObject {
                path: path.clone(),
                generation: generation.clone(),
                is_marker: path.ends_with('/') && body.is_empty(),
            })
            .collect())
    }

    async fn put(&self, key: &str, body: Bytes) -> ReconcileResult<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (Some("1".into()), body));
        Ok(())
    }
}

/// Index wrapper that counts writes and can fail them transiently.
pub struct CountingIndex<I> {
    pub inner: I,
    pub applied: AtomicU32,
    /// Number of upcoming `apply` calls that fail with a transient error.
    pub failing_applies: AtomicU32,
}

impl<I> CountingIndex<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            applied: AtomicU32::new(0),
            failing_applies: AtomicU32::new(0),
        }
    }

    pub fn apply_calls(&self) -> u32 {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<I: IndexStore> IndexStore for CountingIndex<I> {
    async fn list_active(&self) -> ReconcileResult<Vec<IndexRecord>> {
        self.inner.list_active().await
    }

    async fn list_deleted(&self) -> ReconcileResult<Vec<IndexRecord>> {
        self.inner.list_deleted().await
    }

    async fn apply(
        &self,
        zip_name: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> ReconcileResult<u64> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_applies.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_applies.store(remaining - 1, Ordering::SeqCst);
            return Err(ReconcileError::Store(io::Error::new(
                io::ErrorKind::TimedOut,
                "index write timed out",
            )));
        }
        self.inner.apply(zip_name, precondition, mutation).await
    }
}

/// Index wrapper that records write order and notices two writes to the
/// same name in flight at once.
pub struct InFlightIndex<I> {
    pub inner: I,
    in_flight: Mutex<HashSet<String>>,
    max_in_flight: AtomicUsize,
    overlapped: AtomicBool,
    calls: Mutex<Vec<(String, Precondition)>>,
}

impl<I> InFlightIndex<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            in_flight: Mutex::new(HashSet::new()),
            max_in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Whether any name ever had two writes in flight.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    /// Most distinct names seen in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Writes in the order they started.
    pub fn calls(&self) -> Vec<(String, Precondition)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<I: IndexStore> IndexStore for InFlightIndex<I> {
    async fn list_active(&self) -> ReconcileResult<Vec<IndexRecord>> {
        self.inner.list_active().await
    }

    async fn list_deleted(&self) -> ReconcileResult<Vec<IndexRecord>> {
        self.inner.list_deleted().await
    }

    async fn apply(
        &self,
        zip_name: &str,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> ReconcileResult<u64> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(zip_name.to_string()) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.max_in_flight
                .fetch_max(in_flight.len(), Ordering::SeqCst);
            self.calls
                .lock()
                .unwrap()
                .push((zip_name.to_string(), precondition.clone()));
        }
        // Hold the slot long enough for a concurrent write to show up.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = self.inner.apply(zip_name, precondition, mutation).await;
        self.in_flight.lock().unwrap().remove(zip_name);
        result
    }
}
