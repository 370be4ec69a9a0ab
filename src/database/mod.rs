pub mod db;
pub mod memory;

use crate::{
    error::StoreError,
    model::structures::{
        partition::Partition,
        ranking_category::RankingCategory,
        ranking_snapshot::RankingSnapshot,
        ranking_type::RankingType,
        ratable_entity::RatableEntity,
        sport_type::SportType
    }
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence for players and teams.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Active entities of one sport and category, in no particular order.
    async fn find_by_sport_and_category(
        &self,
        sport_type: SportType,
        category: RankingCategory
    ) -> Result<Vec<RatableEntity>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<RatableEntity>, StoreError>;

    /// Overwrites the stored entity. Fails with [`StoreError::StaleWrite`] when the
    /// stored version differs from `entity.version`; on success the stored version is bumped.
    async fn save(&self, entity: &RatableEntity) -> Result<(), StoreError>;
}

/// Append-only log of ranking snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn append(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError>;

    /// The latest run of each category for the sport and ranking type. Every category
    /// contributes the snapshots at its own maximum `ranking_date`; the union is ordered
    /// by rank, then category.
    async fn find_latest_by_partition(
        &self,
        sport_type: SportType,
        ranking_type: RankingType
    ) -> Result<Vec<RankingSnapshot>, StoreError>;

    /// Snapshots at the maximum `ranking_date` of one category, ordered by rank.
    async fn find_latest_by_category(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        category: RankingCategory
    ) -> Result<Vec<RankingSnapshot>, StoreError>;

    /// Every snapshot of an entity, oldest first.
    async fn find_by_entity_id(&self, entity_id: &str) -> Result<Vec<RankingSnapshot>, StoreError>;

    /// Snapshots with `start <= ranking_date <= end`, ordered by date then rank.
    async fn find_between(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        start: DateTime<Utc>,
        end: DateTime<Utc>
    ) -> Result<Vec<RankingSnapshot>, StoreError>;
}

/// Exclusive claim on a partition shared between engine processes.
///
/// In-process overlap is already prevented by the scheduler; a lease keeps a one-shot
/// `--recalculate` or `--run-now` from ranking a partition the daemon is ranking.
#[async_trait]
pub trait PartitionLease: Send + Sync {
    /// Returns `false` without waiting when another holder has the partition.
    async fn try_acquire(&self, partition: Partition) -> Result<bool, StoreError>;

    async fn release(&self, partition: Partition) -> Result<(), StoreError>;
}
