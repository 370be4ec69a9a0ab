use crate::model::{constants::ENTITY_LOCK_STRIPES, structures::partition::Partition};
use std::{
    collections::{hash_map::DefaultHasher, HashMap, HashSet},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex}
};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Locks guarding one partition.
///
/// A ranking pass holds `pass` exclusively for its whole read, sort and write sequence.
/// Rating updates hold it shared, plus the stripes of the two entities they modify, so
/// updates on disjoint pairs run concurrently while a pass always sees a stable partition.
pub struct PartitionLock {
    pass: RwLock<()>,
    stripes: Vec<AsyncMutex<()>>
}

/// Held by a rating update for the duration of its read-modify-write.
pub struct PairGuard<'a> {
    _shared: RwLockReadGuard<'a, ()>,
    _first: MutexGuard<'a, ()>,
    _second: Option<MutexGuard<'a, ()>>
}

impl PartitionLock {
    fn new() -> Self {
        PartitionLock {
            pass: RwLock::new(()),
            stripes: (0..ENTITY_LOCK_STRIPES).map(|_| AsyncMutex::new(())).collect()
        }
    }

    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.pass.write().await
    }

    /// Stripes are always taken in ascending order so two updates can never deadlock.
    pub async fn lock_pair(&self, a: &str, b: &str) -> PairGuard<'_> {
        let shared = self.pass.read().await;

        let (low, high) = {
            let (x, y) = (stripe_index(a), stripe_index(b));
            (x.min(y), x.max(y))
        };

        let first = self.stripes[low].lock().await;
        let second = if high != low {
            Some(self.stripes[high].lock().await)
        } else {
            None
        };

        PairGuard {
            _shared: shared,
            _first: first,
            _second: second
        }
    }
}

fn stripe_index(id: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    (hasher.finish() % ENTITY_LOCK_STRIPES as u64) as usize
}

/// Lazily created lock per partition.
#[derive(Default)]
pub struct PartitionLocks {
    partitions: Mutex<HashMap<Partition, Arc<PartitionLock>>>
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: Partition) -> Arc<PartitionLock> {
        let mut partitions = self.partitions.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            partitions
                .entry(partition)
                .or_insert_with(|| Arc::new(PartitionLock::new()))
        )
    }
}

/// Tracks which partitions currently have a ranking run in flight.
#[derive(Default)]
pub struct InFlight {
    running: Mutex<HashSet<Partition>>
}

/// Marks a partition as running until dropped.
pub struct InFlightGuard {
    registry: Arc<InFlight>,
    partition: Partition
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when a run for `partition` is already in flight.
    pub fn try_begin(self: &Arc<Self>, partition: Partition) -> Option<InFlightGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert(partition) {
            return None;
        }

        Some(InFlightGuard {
            registry: Arc::clone(self),
            partition
        })
    }

    pub fn is_running(&self, partition: Partition) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&partition)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut running = self.registry.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.partition);
    }
}
