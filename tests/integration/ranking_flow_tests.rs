use approx::assert_abs_diff_eq;
use itertools::Itertools;
use ranking_engine::{
    database::{memory::MemoryStore, EntityStore},
    error::EngineError,
    model::{
        ranking_engine::RankingEngine,
        structures::{
            partition::Partition, processing::PartitionStatus, ranking_category::RankingCategory,
            ranking_type::RankingType, ratable_entity::RatableEntity, sport_type::SportType
        }
    },
    utils::test_utils::{generate_entities, generate_results, shuffled}
};
use std::{collections::HashMap, sync::Arc};

use crate::common::{init_test_env, memory_engine};

fn rated(id: &str, category: RankingCategory, sport_type: SportType, rating: f64) -> RatableEntity {
    RatableEntity::new(id, category, sport_type, rating)
}

#[tokio::test]
async fn test_match_then_recompute() {
    init_test_env();
    let (store, engine) = memory_engine(vec![
        rated("A", RankingCategory::Player, SportType::Football, 1200.0),
        rated("B", RankingCategory::Player, SportType::Football, 1000.0)
    ]);

    let delta = engine
        .update_ratings_after_match("A", "B", SportType::Football)
        .await
        .unwrap();

    assert_abs_diff_eq!(delta.winner_delta, 7.688, epsilon = 0.001);
    assert_abs_diff_eq!(delta.winner_delta + delta.loser_delta, 0.0, epsilon = 1e-9);

    let a = store.entity("A").unwrap();
    let b = store.entity("B").unwrap();
    assert_abs_diff_eq!(a.rating, 1207.688, epsilon = 0.001);
    assert_abs_diff_eq!(b.rating, 992.312, epsilon = 0.001);
    assert_eq!(a.total_points, 100);
    assert_eq!(b.total_points, 10);
    assert_eq!((a.matches_played, a.matches_won), (1, 1));
    assert_eq!((b.matches_played, b.matches_won), (1, 0));

    let report = engine.calculate_rankings(SportType::Football).await;
    assert_eq!(report.succeeded(), 2);

    let latest = engine
        .latest_rankings(SportType::Football, RankingType::Global)
        .await
        .unwrap();
    assert_eq!(
        latest
            .iter()
            .map(|s| (s.entity_id.as_str(), s.rank, s.previous_rank))
            .collect::<Vec<_>>(),
        vec![("A", 1, None), ("B", 2, None)]
    );
    assert_eq!(store.entity("A").unwrap().current_rank, Some(1));
}

#[tokio::test]
async fn test_latest_rankings_show_players_and_teams() {
    init_test_env();
    let (_, engine) = memory_engine(vec![
        rated("p1", RankingCategory::Player, SportType::Rugby, 1200.0),
        rated("p2", RankingCategory::Player, SportType::Rugby, 1100.0),
        rated("t1", RankingCategory::Team, SportType::Rugby, 1000.0)
    ]);

    for _ in 0..2 {
        let report = engine.calculate_rankings(SportType::Rugby).await;
        assert_eq!(report.succeeded(), 2);

        let latest = engine
            .latest_rankings(SportType::Rugby, RankingType::Global)
            .await
            .unwrap();
        let keys = latest
            .iter()
            .map(|s| (s.entity_id.as_str(), s.ranking_category, s.rank))
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                ("p1", RankingCategory::Player, 1),
                ("t1", RankingCategory::Team, 1),
                ("p2", RankingCategory::Player, 2)
            ]
        );
    }
}

#[tokio::test]
async fn test_tied_teams_ranked_by_id() {
    init_test_env();
    let (_, engine) = memory_engine(vec![
        rated("t3", RankingCategory::Team, SportType::Hockey, 1500.0),
        rated("t1", RankingCategory::Team, SportType::Hockey, 1500.0),
        rated("t2", RankingCategory::Team, SportType::Hockey, 1400.0)
    ]);

    for _ in 0..3 {
        engine.calculate_rankings(SportType::Hockey).await;

        let latest = engine
            .latest_rankings(SportType::Hockey, RankingType::Global)
            .await
            .unwrap();
        let order = latest.iter().map(|s| (s.entity_id.as_str(), s.rank)).collect::<Vec<_>>();
        assert_eq!(order, vec![("t1", 1), ("t3", 2), ("t2", 3)]);
    }
}

#[tokio::test]
async fn test_ranks_are_a_permutation() {
    init_test_env();
    for seed in 0..5 {
        let entities = generate_entities(120, SportType::Esports, RankingCategory::Player, seed);
        let (_, engine) = memory_engine(shuffled(&entities, seed + 100));

        let result = engine
            .assigner()
            .recalculate(SportType::Esports, RankingCategory::Player)
            .await
            .unwrap();
        assert_eq!(result.count, 120);

        let latest = engine
            .queries()
            .get_latest_rankings(SportType::Esports, RankingType::Global, usize::MAX)
            .await
            .unwrap();

        let ranks = latest.iter().map(|s| s.rank).sorted().collect::<Vec<_>>();
        assert_eq!(ranks, (1..=120).collect::<Vec<_>>());

        // Ordered by rating desc, then id asc
        assert!(latest.windows(2).all(|w| {
            w[0].rating > w[1].rating || (w[0].rating == w[1].rating && w[0].entity_id < w[1].entity_id)
        }));
    }
}

#[tokio::test]
async fn test_ordering_independent_of_store_order() {
    init_test_env();
    let entities = generate_entities(80, SportType::Badminton, RankingCategory::Team, 11);

    let mut orders = Vec::new();
    for seed in [1, 2, 3] {
        let (_, engine) = memory_engine(shuffled(&entities, seed));
        engine.calculate_rankings(SportType::Badminton).await;

        let latest = engine
            .latest_rankings(SportType::Badminton, RankingType::Global)
            .await
            .unwrap();
        orders.push(latest.into_iter().map(|s| s.entity_id).collect::<Vec<_>>());
    }

    assert!(orders.iter().all_equal());
}

#[tokio::test]
async fn test_recompute_twice_only_previous_rank_changes() {
    init_test_env();
    let entities = generate_entities(40, SportType::Boxing, RankingCategory::Player, 5);
    let (_, engine) = memory_engine(entities);
    let queries = engine.queries();

    engine.calculate_rankings(SportType::Boxing).await;
    let first = queries
        .get_latest_rankings(SportType::Boxing, RankingType::Global, 100)
        .await
        .unwrap();

    engine.calculate_rankings(SportType::Boxing).await;
    let second = queries
        .get_latest_rankings(SportType::Boxing, RankingType::Global, 100)
        .await
        .unwrap();

    assert!(second[0].ranking_date > first[0].ranking_date);
    for (before, after) in first.iter().zip(&second) {
        assert_eq!(before.entity_id, after.entity_id);
        assert_eq!(before.rank, after.rank);
        assert_eq!(after.previous_rank, Some(after.rank));
    }
}

#[tokio::test]
async fn test_concurrent_matches_stay_zero_sum() {
    init_test_env();
    let entities = generate_entities(12, SportType::Chess, RankingCategory::Player, 21);
    let results = generate_results(&entities, 200, 21);
    let (store, engine) = memory_engine(entities.clone());
    let engine = Arc::new(engine);

    let total_before: f64 = entities.iter().map(|e| e.rating).sum();

    let handles = results
        .into_iter()
        .map(|(winner, loser)| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                loop {
                    match engine
                        .update_ratings_after_match(&winner, &loser, SportType::Chess)
                        .await
                    {
                        Err(e) if e.is_retryable() => continue,
                        other => return other
                    }
                }
            })
        })
        .collect::<Vec<_>>();

    // Rankings may run while matches are being applied
    let ranking = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.calculate_rankings(SportType::Chess).await })
    };

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(ranking.await.unwrap().failed(), 0);

    let after = store
        .find_by_sport_and_category(SportType::Chess, RankingCategory::Player)
        .await
        .unwrap();
    let total_after: f64 = after.iter().map(|e| e.rating).sum();
    let played: i32 = after.iter().map(|e| e.matches_played).sum::<i32>()
        - entities.iter().map(|e| e.matches_played).sum::<i32>();

    assert_abs_diff_eq!(total_before, total_after, epsilon = 1e-6);
    assert_eq!(played, 400);
}

#[tokio::test]
async fn test_history_is_monotonic_and_per_category() {
    init_test_env();
    let (_, engine) = memory_engine(vec![
        rated("p1", RankingCategory::Player, SportType::Cycling, 1100.0),
        rated("p2", RankingCategory::Player, SportType::Cycling, 1000.0),
        rated("t1", RankingCategory::Team, SportType::Cycling, 1000.0)
    ]);

    let mut dates = Vec::new();
    for i in 0..4 {
        if i % 2 == 1 {
            engine
                .update_ratings_after_match("p2", "p1", SportType::Cycling)
                .await
                .unwrap();
        }
        let report = engine.calculate_rankings(SportType::Cycling).await;
        let run = match &report
            .outcome(Partition::new(SportType::Cycling, RankingCategory::Player))
            .unwrap()
            .status
        {
            PartitionStatus::Succeeded { result } => result.ranking_date.unwrap(),
            other => panic!("unexpected status {:?}", other)
        };
        dates.push(run);
    }

    let history = engine.player_ranking_history("p2").await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.windows(2).all(|w| w[0].ranking_date < w[1].ranking_date));
    assert_eq!(history.iter().map(|s| s.ranking_date).collect::<Vec<_>>(), dates);
    // previous_rank always points at the rank of the run before
    assert_eq!(history[0].previous_rank, None);
    assert!(history.windows(2).all(|w| w[1].previous_rank == Some(w[0].rank)));

    assert!(engine.team_ranking_history("p2").await.unwrap().is_empty());
    assert_eq!(engine.team_ranking_history("t1").await.unwrap().len(), 4);

    let between = engine
        .queries()
        .get_rankings_between(SportType::Cycling, RankingType::Global, dates[1], dates[2])
        .await
        .unwrap();
    let per_date = between.iter().counts_by(|s| s.ranking_date);
    assert_eq!(per_date.get(&dates[1]), Some(&2));
    assert_eq!(per_date.get(&dates[2]), Some(&2));
}

#[tokio::test]
async fn test_failed_partition_keeps_previous_rankings() {
    init_test_env();
    let (store, engine) = memory_engine(vec![
        rated("p1", RankingCategory::Player, SportType::Golf, 1000.0),
        rated("p2", RankingCategory::Player, SportType::Golf, 1100.0),
        rated("t1", RankingCategory::Team, SportType::Golf, 1000.0)
    ]);
    let players = Partition::new(SportType::Golf, RankingCategory::Player);

    engine.calculate_rankings(SportType::Golf).await;
    let before = engine
        .queries()
        .get_latest_category_rankings(SportType::Golf, RankingType::Global, RankingCategory::Player, 10)
        .await
        .unwrap();

    store.fail_reads_for(players);
    let report = engine.calculate_rankings(SportType::Golf).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
    assert!(report.outcome(players).unwrap().is_failure());

    let after = engine
        .queries()
        .get_latest_category_rankings(SportType::Golf, RankingType::Global, RankingCategory::Player, 10)
        .await
        .unwrap();
    assert_eq!(before, after);

    store.clear_faults();
    let result = engine.scheduler().trigger_partition(players).await.unwrap();
    assert_eq!(result.count, 2);
    assert_eq!(
        engine.player_ranking_history("p2").await.unwrap().last().unwrap().ranking_date,
        result.ranking_date.unwrap()
    );
}

#[tokio::test]
async fn test_rejects_invalid_matches() {
    init_test_env();
    let (store, engine) = memory_engine(vec![
        rated("p1", RankingCategory::Player, SportType::Tennis, 1000.0),
        rated("p2", RankingCategory::Player, SportType::Tennis, 1000.0),
        rated("t1", RankingCategory::Team, SportType::Tennis, 1000.0),
        rated("g1", RankingCategory::Player, SportType::Golf, 1000.0)
    ]);

    let cases: HashMap<(&str, &str), bool> = HashMap::from([
        (("p1", "p1"), false),
        (("p1", "t1"), false),
        (("p1", "g1"), false),
        (("p1", "zz"), true)
    ]);

    for ((winner, loser), not_found) in cases {
        let result = engine
            .update_ratings_after_match(winner, loser, SportType::Tennis)
            .await;

        match result {
            Err(EngineError::NotFound { .. }) => assert!(not_found),
            Err(EngineError::InvalidMatch(_)) => assert!(!not_found),
            other => panic!("unexpected result {:?} for {} vs {}", other, winner, loser)
        }
    }

    assert_eq!(store.entity("p1").unwrap().version, 0);
    assert_eq!(store.entity("p1").unwrap().rating, 1000.0);
}

#[tokio::test]
async fn test_empty_sport_writes_nothing() {
    init_test_env();
    let (store, engine) = memory_engine(Vec::new());

    let report = engine.calculate_rankings(SportType::Kabaddi).await;

    assert_eq!(report.succeeded(), 2);
    assert!(report.outcomes.iter().all(|o| matches!(
        &o.status,
        PartitionStatus::Succeeded { result } if result.count == 0 && result.ranking_date.is_none()
    )));
    assert!(store.snapshots().is_empty());
    assert!(engine
        .latest_rankings(SportType::Kabaddi, RankingType::Global)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_memory_store_is_shared_by_engine() {
    let store = Arc::new(MemoryStore::new());
    store.insert(RatableEntity::player("solo", SportType::Swimming));

    let engine = RankingEngine::with_store(store.clone(), Default::default());
    engine.calculate_rankings(SportType::Swimming).await;

    assert_eq!(store.entity("solo").unwrap().current_rank, Some(1));
}
