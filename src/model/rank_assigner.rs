use crate::{
    database::{EntityStore, SnapshotStore},
    error::{EngineError, EngineResult, StoreError},
    model::{
        locks::PartitionLocks,
        structures::{
            partition::Partition,
            processing::RunResult,
            ranking_category::RankingCategory,
            ranking_snapshot::RankingSnapshot,
            ranking_type::RankingType,
            ratable_entity::RatableEntity,
            sport_type::SportType
        }
    }
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::{cmp::Ordering, sync::Arc, sync::Mutex};
use tracing::{info, instrument};

/// Ranking order: rating descending, then id ascending.
pub fn rank_cmp(a: &RatableEntity, b: &RatableEntity) -> Ordering {
    b.rating.total_cmp(&a.rating).then_with(|| a.id.cmp(&b.id))
}

pub fn rank_order(entities: &mut [RatableEntity]) {
    entities.sort_by(rank_cmp);
}

/// Hands out ranking dates. Dates are truncated to microseconds (the store's precision)
/// and strictly increase, even when two runs start within the same microsecond.
#[derive(Default)]
pub struct RankingClock {
    last: Mutex<Option<DateTime<Utc>>>
}

impl RankingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> DateTime<Utc> {
        self.next_after(Utc::now())
    }

    fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(6);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        let next = match *last {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now
        };
        *last = Some(next);

        next
    }
}

/// Recomputes the full ordering of one partition and records it as a snapshot batch.
pub struct RankAssigner {
    entities: Arc<dyn EntityStore>,
    snapshots: Arc<dyn SnapshotStore>,
    locks: Arc<PartitionLocks>,
    clock: RankingClock
}

impl RankAssigner {
    pub fn new(entities: Arc<dyn EntityStore>, snapshots: Arc<dyn SnapshotStore>, locks: Arc<PartitionLocks>) -> Self {
        RankAssigner {
            entities,
            snapshots,
            locks,
            clock: RankingClock::new()
        }
    }

    /// # Ranking run
    ///
    /// Holds the partition exclusively for the whole pass so rating updates cannot
    /// interleave with it.
    ///
    /// 1. Fetch the partition's active entities. An empty partition writes nothing.
    /// 2. Sort with [`rank_cmp`] and number them from 1.
    /// 3. Per entity: remember `current_rank` as the previous rank, store the new rank on
    ///     the entity, then append its snapshot. Every snapshot of the run shares one date.
    ///
    /// The first failing write aborts the run. Writes already made stay; the next run's
    /// previous-rank capture picks up from whatever was stored.
    #[instrument(skip(self))]
    pub async fn recalculate(&self, sport_type: SportType, category: RankingCategory) -> EngineResult<RunResult> {
        let partition = Partition::new(sport_type, category);
        let lock = self.locks.get(partition);
        let _pass = lock.exclusive().await;

        let mut entities = self
            .entities
            .find_by_sport_and_category(sport_type, category)
            .await
            .map_err(|e| Self::failure(partition, e))?;

        if entities.is_empty() {
            info!("No entities in {}, nothing to rank", partition);
            return Ok(RunResult {
                partition,
                count: 0,
                ranking_date: None
            });
        }

        rank_order(&mut entities);
        let ranking_date = self.clock.next();

        for (index, entity) in entities.iter_mut().enumerate() {
            let rank = index as i32 + 1;
            let previous_rank = entity.current_rank;
            entity.current_rank = Some(rank);

            self.entities
                .save(entity)
                .await
                .map_err(|e| Self::failure(partition, e))?;

            let snapshot = RankingSnapshot {
                sport_type,
                ranking_type: RankingType::Global,
                ranking_category: category,
                entity_id: entity.id.clone(),
                rank,
                previous_rank,
                points: entity.total_points,
                rating: entity.rating,
                ranking_date
            };

            self.snapshots
                .append(&snapshot)
                .await
                .map_err(|e| Self::failure(partition, e))?;
        }

        info!("Ranked {} entities in {} at {}", entities.len(), partition, ranking_date);

        Ok(RunResult {
            partition,
            count: entities.len(),
            ranking_date: Some(ranking_date)
        })
    }

    fn failure(partition: Partition, error: StoreError) -> EngineError {
        EngineError::PartitionRunFailure {
            partition,
            reason: error.to_string()
        }
    }
}
