use crate::model::structures::{
    partition::Partition, ranking_category::RankingCategory, ranking_type::RankingType, ratable_entity::EntityId,
    sport_type::SportType
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entity's position in one ranking run. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSnapshot {
    pub sport_type: SportType,
    pub ranking_type: RankingType,
    pub ranking_category: RankingCategory,
    pub entity_id: EntityId,
    /// 1-based
    pub rank: i32,
    /// The entity's `current_rank` before the run that produced this snapshot
    pub previous_rank: Option<i32>,
    pub points: i64,
    pub rating: f64,
    /// Shared by every snapshot of a run
    pub ranking_date: DateTime<Utc>
}

impl RankingSnapshot {
    pub fn partition(&self) -> Partition {
        Partition::new(self.sport_type, self.ranking_category)
    }

    /// Positive when the entity climbed since the previous run.
    pub fn rank_change(&self) -> Option<i32> {
        self.previous_rank.map(|previous| previous - self.rank)
    }
}
