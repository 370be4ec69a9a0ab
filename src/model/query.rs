use crate::{
    database::SnapshotStore,
    error::EngineResult,
    model::structures::{
        ranking_category::RankingCategory, ranking_snapshot::RankingSnapshot, ranking_type::RankingType,
        sport_type::SportType
    }
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Read-only access to recorded rankings. "No data yet" is an empty list, never an error.
#[derive(Clone)]
pub struct RankingQueryService {
    snapshots: Arc<dyn SnapshotStore>
}

impl RankingQueryService {
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        RankingQueryService { snapshots }
    }

    /// The most recent player run and the most recent team run for the sport and ranking
    /// type, merged best rank first (players before teams on equal rank).
    pub async fn get_latest_rankings(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        limit: usize
    ) -> EngineResult<Vec<RankingSnapshot>> {
        let mut latest = self
            .snapshots
            .find_latest_by_partition(sport_type, ranking_type)
            .await?;
        latest.truncate(limit);

        Ok(latest)
    }

    pub async fn get_latest_category_rankings(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        category: RankingCategory,
        limit: usize
    ) -> EngineResult<Vec<RankingSnapshot>> {
        let mut latest = self
            .snapshots
            .find_latest_by_category(sport_type, ranking_type, category)
            .await?;
        latest.truncate(limit);

        Ok(latest)
    }

    /// Every snapshot recorded for the entity, oldest first.
    pub async fn get_history(&self, entity_id: &str) -> EngineResult<Vec<RankingSnapshot>> {
        Ok(self.snapshots.find_by_entity_id(entity_id).await?)
    }

    pub async fn get_player_ranking_history(&self, entity_id: &str) -> EngineResult<Vec<RankingSnapshot>> {
        self.history_in_category(entity_id, RankingCategory::Player).await
    }

    pub async fn get_team_ranking_history(&self, entity_id: &str) -> EngineResult<Vec<RankingSnapshot>> {
        self.history_in_category(entity_id, RankingCategory::Team).await
    }

    async fn history_in_category(
        &self,
        entity_id: &str,
        category: RankingCategory
    ) -> EngineResult<Vec<RankingSnapshot>> {
        let mut history = self.get_history(entity_id).await?;
        history.retain(|s| s.ranking_category == category);

        Ok(history)
    }

    pub async fn get_rankings_between(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        start: DateTime<Utc>,
        end: DateTime<Utc>
    ) -> EngineResult<Vec<RankingSnapshot>> {
        if start > end {
            return Ok(Vec::new());
        }

        Ok(self
            .snapshots
            .find_between(sport_type, ranking_type, start, end)
            .await?)
    }
}
