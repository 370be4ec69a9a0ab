use crate::model::{
    constants::{LOSS_POINTS, WIN_POINTS},
    structures::{ranking_category::RankingCategory, ratable_entity::RatableEntity, sport_type::SportType}
};
use rand::{
    seq::{IndexedRandom, SliceRandom},
    Rng, SeedableRng
};
use rand_chacha::ChaCha8Rng;

/// Generates `n` entities of one partition with seeded ratings between 600 and 1800.
///
/// Roughly one in ten entities copies the rating of an earlier one, so generated
/// partitions always contain ties. Ids are zero padded (`p0007`, `t0042`) so their
/// lexicographic order matches generation order.
pub fn generate_entities(n: usize, sport_type: SportType, category: RankingCategory, seed: u64) -> Vec<RatableEntity> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let prefix = match category {
        RankingCategory::Player => "p",
        RankingCategory::Team => "t"
    };

    let mut entities: Vec<RatableEntity> = Vec::with_capacity(n);
    for i in 0..n {
        let rating = if i > 0 && rng.random_bool(0.1) {
            entities[rng.random_range(0..i)].rating
        } else {
            (rng.random_range(600.0..1800.0_f64) * 100.0).round() / 100.0
        };

        let mut entity = RatableEntity::new(format!("{}{:04}", prefix, i), category, sport_type, rating);
        entity.matches_played = rng.random_range(0..50);
        entity.matches_won = rng.random_range(0..=entity.matches_played);
        entity.total_points = entity.matches_won as i64 * WIN_POINTS + entity.matches_lost() as i64 * LOSS_POINTS;
        entities.push(entity);
    }

    entities
}

/// Seeded random match results between distinct entities, as (winner id, loser id).
pub fn generate_results(entities: &[RatableEntity], n: usize, seed: u64) -> Vec<(String, String)> {
    if entities.len() < 2 {
        panic!("At least two entities are needed to generate results");
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n)
        .map(|_| {
            let pair: Vec<&RatableEntity> = entities.choose_multiple(&mut rng, 2).collect();
            (pair[0].id.clone(), pair[1].id.clone())
        })
        .collect()
}

/// The same entities in a seeded random order.
pub fn shuffled(entities: &[RatableEntity], seed: u64) -> Vec<RatableEntity> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut copy = entities.to_vec();
    copy.shuffle(&mut rng);

    copy
}
