use super::{EntityStore, SnapshotStore};
use crate::{
    error::StoreError,
    model::structures::{
        partition::Partition,
        ranking_category::RankingCategory,
        ranking_snapshot::RankingSnapshot,
        ranking_type::RankingType,
        ratable_entity::{EntityId, RatableEntity},
        sport_type::SportType
    }
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{PoisonError, RwLock},
    time::Duration
};
use strum::IntoEnumIterator;

#[derive(Default)]
struct Faults {
    failing_saves: HashSet<EntityId>,
    failing_partitions: HashSet<Partition>,
    slow_partitions: HashMap<Partition, Duration>,
    snapshots_unavailable: bool
}

/// Process-local entity and snapshot store.
///
/// Used by the test suites and for running the engine without a database. Faults can be
/// injected per entity or per partition to exercise failure isolation.
#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<EntityId, RatableEntity>>,
    snapshots: RwLock<Vec<RankingSnapshot>>,
    faults: RwLock<Faults>
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(entities: impl IntoIterator<Item = RatableEntity>) -> Self {
        let store = Self::new();
        for entity in entities {
            store.insert(entity);
        }

        store
    }

    /// Seeds or replaces an entity without a version check.
    pub fn insert(&self, entity: RatableEntity) {
        if let Ok(mut entities) = self.entities.write() {
            entities.insert(entity.id.clone(), entity);
        }
    }

    pub fn entity(&self, id: &str) -> Option<RatableEntity> {
        self.entities.read().ok().and_then(|entities| entities.get(id).cloned())
    }

    pub fn snapshots(&self) -> Vec<RankingSnapshot> {
        self.snapshots.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn fail_saves_for(&self, id: &str) {
        if let Ok(mut faults) = self.faults.write() {
            faults.failing_saves.insert(id.to_string());
        }
    }

    pub fn fail_reads_for(&self, partition: Partition) {
        if let Ok(mut faults) = self.faults.write() {
            faults.failing_partitions.insert(partition);
        }
    }

    /// Delays every read of the partition's entities by `delay`.
    pub fn slow_reads_for(&self, partition: Partition, delay: Duration) {
        if let Ok(mut faults) = self.faults.write() {
            faults.slow_partitions.insert(partition, delay);
        }
    }

    pub fn set_snapshots_unavailable(&self, unavailable: bool) {
        if let Ok(mut faults) = self.faults.write() {
            faults.snapshots_unavailable = unavailable;
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.write() {
            *faults = Faults::default();
        }
    }

    fn check_snapshots_available(&self) -> Result<(), StoreError> {
        if self.faults.read().map_err(poisoned)?.snapshots_unavailable {
            return Err(StoreError::Unavailable("snapshot store offline".to_string()));
        }

        Ok(())
    }

    fn latest_matching<F>(&self, filter: F) -> Result<Vec<RankingSnapshot>, StoreError>
    where
        F: Fn(&RankingSnapshot) -> bool
    {
        self.check_snapshots_available()?;
        let snapshots = self.snapshots.read().map_err(poisoned)?;

        let latest = snapshots.iter().filter(|s| filter(s)).map(|s| s.ranking_date).max();
        let Some(latest) = latest else {
            return Ok(Vec::new());
        };

        Ok(snapshots
            .iter()
            .filter(|s| filter(s) && s.ranking_date == latest)
            .cloned()
            .sorted_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.entity_id.cmp(&b.entity_id)))
            .collect())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_sport_and_category(
        &self,
        sport_type: SportType,
        category: RankingCategory
    ) -> Result<Vec<RatableEntity>, StoreError> {
        let partition = Partition::new(sport_type, category);
        let delay = {
            let faults = self.faults.read().map_err(poisoned)?;
            if faults.failing_partitions.contains(&partition) {
                return Err(StoreError::Unavailable(format!("reads failing for {}", partition)));
            }

            faults.slow_partitions.get(&partition).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let entities = self.entities.read().map_err(poisoned)?;
        Ok(entities
            .values()
            .filter(|e| e.active && e.sport_type == sport_type && e.category == category)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RatableEntity>, StoreError> {
        Ok(self.entities.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn save(&self, entity: &RatableEntity) -> Result<(), StoreError> {
        if self.faults.read().map_err(poisoned)?.failing_saves.contains(&entity.id) {
            return Err(StoreError::Unavailable(format!("save failing for {}", entity.id)));
        }

        let mut entities = self.entities.write().map_err(poisoned)?;
        let stored_version = entities.get(&entity.id).map(|e| e.version);

        match stored_version {
            Some(version) if version != entity.version => Err(StoreError::StaleWrite(entity.id.clone())),
            _ => {
                let mut saved = entity.clone();
                saved.version = entity.version + 1;
                entities.insert(saved.id.clone(), saved);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn append(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError> {
        self.check_snapshots_available()?;
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;

        let duplicate = snapshots.iter().any(|s| {
            s.sport_type == snapshot.sport_type
                && s.ranking_type == snapshot.ranking_type
                && s.ranking_category == snapshot.ranking_category
                && s.entity_id == snapshot.entity_id
                && s.ranking_date == snapshot.ranking_date
        });
        if duplicate {
            return Err(StoreError::InvalidRow(format!(
                "duplicate snapshot for {} at {}",
                snapshot.entity_id, snapshot.ranking_date
            )));
        }

        snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn find_latest_by_partition(
        &self,
        sport_type: SportType,
        ranking_type: RankingType
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        let mut latest = Vec::new();
        for category in RankingCategory::iter() {
            latest.extend(self.latest_matching(|s| {
                s.sport_type == sport_type && s.ranking_type == ranking_type && s.ranking_category == category
            })?);
        }

        latest.sort_by(|a, b| {
            a.rank
                .cmp(&b.rank)
                .then_with(|| a.ranking_category.cmp(&b.ranking_category))
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });

        Ok(latest)
    }

    async fn find_latest_by_category(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        category: RankingCategory
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        self.latest_matching(|s| {
            s.sport_type == sport_type && s.ranking_type == ranking_type && s.ranking_category == category
        })
    }

    async fn find_by_entity_id(&self, entity_id: &str) -> Result<Vec<RankingSnapshot>, StoreError> {
        self.check_snapshots_available()?;
        let snapshots = self.snapshots.read().map_err(poisoned)?;

        Ok(snapshots
            .iter()
            .filter(|s| s.entity_id == entity_id)
            .cloned()
            .sorted_by_key(|s| s.ranking_date)
            .collect())
    }

    async fn find_between(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        start: DateTime<Utc>,
        end: DateTime<Utc>
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        self.check_snapshots_available()?;
        let snapshots = self.snapshots.read().map_err(poisoned)?;

        Ok(snapshots
            .iter()
            .filter(|s| {
                s.sport_type == sport_type
                    && s.ranking_type == ranking_type
                    && s.ranking_date >= start
                    && s.ranking_date <= end
            })
            .cloned()
            .sorted_by(|a, b| a.ranking_date.cmp(&b.ranking_date).then_with(|| a.rank.cmp(&b.rank)))
            .collect())
    }
}
