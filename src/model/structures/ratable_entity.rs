use crate::model::{
    constants::DEFAULT_RATING,
    structures::{partition::Partition, ranking_category::RankingCategory, sport_type::SportType}
};
use serde::{Deserialize, Serialize};

pub type EntityId = String;

/// A player profile or a team: anything that carries a rating and can be ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatableEntity {
    pub id: EntityId,
    /// Player or Team
    pub category: RankingCategory,
    pub sport_type: SportType,
    /// Elo points
    pub rating: f64,
    /// Only ever grows
    pub total_points: i64,
    pub matches_played: i32,
    pub matches_won: i32,
    /// Rank assigned by the last ranking run, stale until the next one
    pub current_rank: Option<i32>,
    /// Soft-deactivation is owned outside the engine
    pub active: bool,
    /// Bumped by the store on every save
    pub version: i64
}

impl RatableEntity {
    pub fn new(id: impl Into<EntityId>, category: RankingCategory, sport_type: SportType, rating: f64) -> Self {
        RatableEntity {
            id: id.into(),
            category,
            sport_type,
            rating,
            total_points: 0,
            matches_played: 0,
            matches_won: 0,
            current_rank: None,
            active: true,
            version: 0
        }
    }

    pub fn player(id: impl Into<EntityId>, sport_type: SportType) -> Self {
        Self::new(id, RankingCategory::Player, sport_type, DEFAULT_RATING)
    }

    pub fn team(id: impl Into<EntityId>, sport_type: SportType) -> Self {
        Self::new(id, RankingCategory::Team, sport_type, DEFAULT_RATING)
    }

    pub fn partition(&self) -> Partition {
        Partition::new(self.sport_type, self.category)
    }

    pub fn matches_lost(&self) -> i32 {
        self.matches_played - self.matches_won
    }
}
