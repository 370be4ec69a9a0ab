use crate::{
    database::{EntityStore, PartitionLease, SnapshotStore},
    error::EngineResult,
    model::{
        constants::DEFAULT_LATEST_LIMIT,
        locks::PartitionLocks,
        query::RankingQueryService,
        rank_assigner::RankAssigner,
        rating_updater::RatingUpdater,
        scheduler::{RankingScheduler, SchedulerConfig},
        structures::{
            processing::{CycleReport, RatingDelta},
            ranking_snapshot::RankingSnapshot,
            ranking_type::RankingType,
            sport_type::SportType
        }
    }
};
use std::sync::Arc;

/// The rating and ranking engine wired over one pair of stores.
///
/// All components share the same partition locks, so rating updates, ranking runs and the
/// scheduler coordinate with each other.
pub struct RankingEngine {
    updater: RatingUpdater,
    assigner: Arc<RankAssigner>,
    scheduler: Arc<RankingScheduler>,
    queries: RankingQueryService
}

impl RankingEngine {
    pub fn new(entities: Arc<dyn EntityStore>, snapshots: Arc<dyn SnapshotStore>, config: SchedulerConfig) -> Self {
        let locks = Arc::new(PartitionLocks::new());
        let assigner = Arc::new(RankAssigner::new(
            Arc::clone(&entities),
            Arc::clone(&snapshots),
            Arc::clone(&locks)
        ));

        RankingEngine {
            updater: RatingUpdater::new(entities, locks),
            scheduler: Arc::new(RankingScheduler::new(Arc::clone(&assigner), config)),
            assigner,
            queries: RankingQueryService::new(snapshots)
        }
    }

    /// Builds an engine over a single store serving both entities and snapshots.
    pub fn with_store<S>(store: Arc<S>, config: SchedulerConfig) -> Self
    where
        S: EntityStore + SnapshotStore + 'static
    {
        Self::new(store.clone(), store, config)
    }

    /// Coordinates ranking runs with other processes through `lease`.
    pub fn with_lease(mut self, lease: Arc<dyn PartitionLease>) -> Self {
        let config = self.scheduler.config().clone();
        self.scheduler = Arc::new(RankingScheduler::new(Arc::clone(&self.assigner), config).with_lease(lease));
        self
    }

    pub fn updater(&self) -> &RatingUpdater {
        &self.updater
    }

    pub fn assigner(&self) -> &RankAssigner {
        &self.assigner
    }

    pub fn scheduler(&self) -> Arc<RankingScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn queries(&self) -> &RankingQueryService {
        &self.queries
    }

    /// Match-completion hook.
    pub async fn update_ratings_after_match(
        &self,
        winner_id: &str,
        loser_id: &str,
        sport_type: SportType
    ) -> EngineResult<RatingDelta> {
        self.updater
            .update_ratings_after_match(winner_id, loser_id, sport_type)
            .await
    }

    /// Administrative recompute of one sport's player and team rankings.
    pub async fn calculate_rankings(&self, sport_type: SportType) -> CycleReport {
        self.scheduler.trigger_sport(sport_type).await
    }

    pub async fn latest_rankings(
        &self,
        sport_type: SportType,
        ranking_type: RankingType
    ) -> EngineResult<Vec<RankingSnapshot>> {
        self.queries
            .get_latest_rankings(sport_type, ranking_type, DEFAULT_LATEST_LIMIT)
            .await
    }

    pub async fn player_ranking_history(&self, entity_id: &str) -> EngineResult<Vec<RankingSnapshot>> {
        self.queries.get_player_ranking_history(entity_id).await
    }

    pub async fn team_ranking_history(&self, entity_id: &str) -> EngineResult<Vec<RankingSnapshot>> {
        self.queries.get_team_ranking_history(entity_id).await
    }
}
