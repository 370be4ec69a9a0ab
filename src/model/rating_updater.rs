use crate::{
    database::EntityStore,
    error::{EngineError, EngineResult},
    model::{
        constants::{ELO_SCALE, K_FACTOR, LOSS_POINTS, WIN_POINTS},
        locks::PartitionLocks,
        structures::{
            partition::Partition,
            processing::RatingDelta,
            ratable_entity::RatableEntity,
            sport_type::SportType
        }
    }
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Probability that an entity rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / ELO_SCALE))
}

/// Elo adjustment for a decided match. The loser loses exactly what the winner gains.
pub fn elo_deltas(winner_rating: f64, loser_rating: f64) -> RatingDelta {
    let expected_winner = expected_score(winner_rating, loser_rating);
    let winner_delta = K_FACTOR * (1.0 - expected_winner);

    RatingDelta {
        winner_delta,
        loser_delta: -winner_delta
    }
}

/// Applies match results to entity ratings as they come in.
pub struct RatingUpdater {
    entities: Arc<dyn EntityStore>,
    locks: Arc<PartitionLocks>
}

impl RatingUpdater {
    pub fn new(entities: Arc<dyn EntityStore>, locks: Arc<PartitionLocks>) -> Self {
        RatingUpdater { entities, locks }
    }

    /// # Match result processing
    ///
    /// 1. Both entities must exist, be distinct, belong to `sport_type` and share a category.
    /// 2. The partition is locked shared and both entities' stripes exclusively, then both
    ///     entities are re-read so the adjustment is computed from their latest ratings.
    /// 3. The winner gains `K * (1 - expected)` and [`WIN_POINTS`], the loser loses the same
    ///     amount of rating and gains [`LOSS_POINTS`]. Both play one more match.
    ///
    /// If the second save fails the first one stays applied; the whole call reports the
    /// failure and the caller decides whether to retry.
    #[instrument(skip(self))]
    pub async fn update_ratings_after_match(
        &self,
        winner_id: &str,
        loser_id: &str,
        sport_type: SportType
    ) -> EngineResult<RatingDelta> {
        if winner_id == loser_id {
            return Err(EngineError::InvalidMatch(format!(
                "{} cannot play against itself",
                winner_id
            )));
        }

        let winner = self.fetch(winner_id).await?;
        let loser = self.fetch(loser_id).await?;
        let partition = Self::validate(&winner, &loser, sport_type)?;

        let lock = self.locks.get(partition);
        let _guard = lock.lock_pair(winner_id, loser_id).await;

        let mut winner = self.fetch(winner_id).await?;
        let mut loser = self.fetch(loser_id).await?;
        Self::validate(&winner, &loser, sport_type)?;

        let delta = elo_deltas(winner.rating, loser.rating);

        winner.rating += delta.winner_delta;
        winner.matches_won += 1;
        winner.matches_played += 1;
        winner.total_points += WIN_POINTS;

        loser.rating += delta.loser_delta;
        loser.matches_played += 1;
        loser.total_points += LOSS_POINTS;

        self.entities.save(&winner).await?;
        self.entities.save(&loser).await?;

        debug!(
            "{} beat {} in {}: {:+.2} / {:+.2}",
            winner_id, loser_id, partition, delta.winner_delta, delta.loser_delta
        );

        Ok(delta)
    }

    async fn fetch(&self, id: &str) -> EngineResult<RatableEntity> {
        self.entities
            .find_by_id(id)
            .await?
            .ok_or_else(|| EngineError::NotFound { id: id.to_string() })
    }

    fn validate(winner: &RatableEntity, loser: &RatableEntity, sport_type: SportType) -> EngineResult<Partition> {
        for entity in [winner, loser] {
            if entity.sport_type != sport_type {
                return Err(EngineError::InvalidMatch(format!(
                    "{} plays {}, not {}",
                    entity.id, entity.sport_type, sport_type
                )));
            }
        }

        if winner.category != loser.category {
            return Err(EngineError::InvalidMatch(format!(
                "{} is a {} but {} is a {}",
                winner.id, winner.category, loser.id, loser.category
            )));
        }

        Ok(winner.partition())
    }
}
