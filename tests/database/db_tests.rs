use approx::assert_abs_diff_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ranking_engine::{
    database::{db::DbClient, EntityStore, PartitionLease, SnapshotStore},
    error::{EngineError, StoreError},
    model::{
        ranking_engine::RankingEngine,
        scheduler::SchedulerConfig,
        structures::{
            partition::Partition, processing::PartitionStatus, ranking_category::RankingCategory,
            ranking_snapshot::RankingSnapshot, ranking_type::RankingType, ratable_entity::RatableEntity,
            sport_type::SportType
        }
    }
};
use serial_test::serial;
use std::sync::Arc;

use super::test_helpers::TestDatabase;
use crate::common::init_test_env;

fn snapshot(entity_id: &str, rank: i32, ranking_date: DateTime<Utc>) -> RankingSnapshot {
    RankingSnapshot {
        sport_type: SportType::Chess,
        ranking_type: RankingType::Global,
        ranking_category: RankingCategory::Player,
        entity_id: entity_id.to_string(),
        rank,
        previous_rank: None,
        points: 100,
        rating: 1000.0,
        ranking_date
    }
}

#[tokio::test]
#[serial]
async fn test_find_by_sport_and_category() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");

    let mut retired = RatableEntity::player("p3", SportType::Chess);
    retired.active = false;
    let client = test_db
        .seed(&[
            RatableEntity::player("p1", SportType::Chess),
            RatableEntity::player("p2", SportType::Chess),
            retired,
            RatableEntity::team("t1", SportType::Chess),
            RatableEntity::player("g1", SportType::Golf)
        ])
        .await
        .expect("Failed to seed");

    let mut players = client
        .find_by_sport_and_category(SportType::Chess, RankingCategory::Player)
        .await
        .unwrap();
    players.sort_by(|a, b| a.id.cmp(&b.id));

    let ids = players.iter().map(|e| e.id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(players[0].rating, 1000.0);
    assert_eq!(players[0].category, RankingCategory::Player);

    assert!(client.find_by_id("p3").await.unwrap().is_some());
    assert!(client.find_by_id("missing").await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_save_bumps_version_and_rejects_stale_writes() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db
        .seed(&[RatableEntity::player("p1", SportType::Tennis)])
        .await
        .expect("Failed to seed");

    let mut first = client.find_by_id("p1").await.unwrap().unwrap();
    let second = first.clone();

    first.rating = 1016.0;
    first.matches_played = 1;
    client.save(&first).await.unwrap();

    let stored = client.find_by_id("p1").await.unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.rating, 1016.0);

    // `second` still carries version 0
    let result = client.save(&second).await;
    assert!(matches!(result, Err(StoreError::StaleWrite(ref id)) if id == "p1"));

    let stored = client.find_by_id("p1").await.unwrap().unwrap();
    assert_eq!(stored.rating, 1016.0);
}

#[tokio::test]
#[serial]
async fn test_save_inserts_missing_entity() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.client().await.expect("Failed to connect");

    client.save(&RatableEntity::team("t9", SportType::Rugby)).await.unwrap();

    let stored = client.find_by_id("t9").await.unwrap().unwrap();
    assert_eq!(stored.category, RankingCategory::Team);
    assert_eq!(stored.sport_type, SportType::Rugby);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
#[serial]
async fn test_snapshot_queries() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.client().await.expect("Failed to connect");
    let day = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();

    for (offset, order) in [(0, ["p1", "p2"]), (1, ["p2", "p1"])] {
        for (index, id) in order.iter().enumerate() {
            client
                .append(&snapshot(id, index as i32 + 1, day + Duration::days(offset)))
                .await
                .unwrap();
        }
    }

    let latest = client
        .find_latest_by_partition(SportType::Chess, RankingType::Global)
        .await
        .unwrap();
    let ids = latest.iter().map(|s| s.entity_id.as_str()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["p2", "p1"]);
    assert_eq!(latest[0].ranking_date, day + Duration::days(1));

    let teams = client
        .find_latest_by_category(SportType::Chess, RankingType::Global, RankingCategory::Team)
        .await
        .unwrap();
    assert!(teams.is_empty());

    let history = client.find_by_entity_id("p1").await.unwrap();
    assert_eq!(history.iter().map(|s| s.rank).collect::<Vec<_>>(), vec![1, 2]);

    let first_day = client
        .find_between(SportType::Chess, RankingType::Global, day, day + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(first_day.len(), 2);
    assert_eq!(first_day[0].entity_id, "p1");
}

#[tokio::test]
#[serial]
async fn test_duplicate_snapshot_key_rejected() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let client = test_db.client().await.expect("Failed to connect");
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap();

    client.append(&snapshot("p1", 1, at)).await.unwrap();

    assert!(client.append(&snapshot("p1", 2, at)).await.is_err());
    assert!(client.append(&snapshot("p2", 0, at)).await.is_err());
}

#[tokio::test]
#[serial]
async fn test_engine_flow_on_postgres() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");

    let mut a = RatableEntity::player("a", SportType::Chess);
    a.rating = 1200.0;
    let client: Arc<DbClient> = Arc::new(
        test_db
            .seed(&[
                a,
                RatableEntity::player("b", SportType::Chess),
                RatableEntity::team("t1", SportType::Chess)
            ])
            .await
            .expect("Failed to seed")
    );
    let engine = RankingEngine::with_store(client.clone(), SchedulerConfig::default());

    let delta = engine
        .update_ratings_after_match("b", "a", SportType::Chess)
        .await
        .unwrap();
    assert_abs_diff_eq!(delta.winner_delta, 24.31, epsilon = 0.01);

    let missing = engine
        .update_ratings_after_match("b", "nobody", SportType::Chess)
        .await;
    assert!(matches!(missing, Err(EngineError::NotFound { .. })));

    let report = engine.calculate_rankings(SportType::Chess).await;
    assert_eq!(report.failed(), 0);
    assert!(report
        .outcome(Partition::new(SportType::Chess, RankingCategory::Team))
        .unwrap()
        .is_success());

    let latest = engine
        .latest_rankings(SportType::Chess, RankingType::Global)
        .await
        .unwrap();
    assert_eq!(
        latest
            .iter()
            .map(|s| (s.entity_id.as_str(), s.ranking_category))
            .collect::<Vec<_>>(),
        vec![
            ("a", RankingCategory::Player),
            ("t1", RankingCategory::Team),
            ("b", RankingCategory::Player)
        ]
    );

    let players = engine
        .queries()
        .get_latest_category_rankings(SportType::Chess, RankingType::Global, RankingCategory::Player, 10)
        .await
        .unwrap();
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].entity_id, "a");
    assert_eq!(players[1].entity_id, "b");
    assert_eq!(players[1].points, 100);

    let stored = client.find_by_id("b").await.unwrap().unwrap();
    assert_eq!(stored.current_rank, Some(2));
    assert_eq!(stored.matches_won, 1);

    let history = engine.player_ranking_history("a").await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(engine.team_ranking_history("a").await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_partition_lease_is_exclusive_across_clients() {
    init_test_env();
    let test_db = TestDatabase::new().await.expect("Failed to create test database");
    let daemon = test_db.client().await.expect("Failed to connect");
    let chess_players = Partition::new(SportType::Chess, RankingCategory::Player);
    let chess_teams = Partition::new(SportType::Chess, RankingCategory::Team);

    let one_shot: Arc<DbClient> = Arc::new(
        test_db
            .seed(&[
                RatableEntity::player("p1", SportType::Chess),
                RatableEntity::team("t1", SportType::Chess)
            ])
            .await
            .expect("Failed to seed")
    );

    assert!(daemon.try_acquire(chess_players).await.unwrap());
    assert!(!one_shot.try_acquire(chess_players).await.unwrap());
    assert!(one_shot.try_acquire(chess_teams).await.unwrap());
    one_shot.release(chess_teams).await.unwrap();

    let engine =
        RankingEngine::with_store(one_shot.clone(), SchedulerConfig::default()).with_lease(one_shot.clone());
    let report = engine.calculate_rankings(SportType::Chess).await;
    assert!(matches!(
        report.outcome(chess_players).unwrap().status,
        PartitionStatus::Skipped { .. }
    ));
    assert!(report.outcome(chess_teams).unwrap().is_success());
    assert_eq!(one_shot.find_by_id("p1").await.unwrap().unwrap().current_rank, None);

    daemon.release(chess_players).await.unwrap();
    let report = engine.calculate_rankings(SportType::Chess).await;
    assert_eq!(report.succeeded(), 2);
    assert_eq!(one_shot.find_by_id("p1").await.unwrap().unwrap().current_rank, Some(1));
}
