use super::{EntityStore, PartitionLease, SnapshotStore};
use crate::{
    error::StoreError,
    model::structures::{
        partition::Partition, ranking_category::RankingCategory, ranking_snapshot::RankingSnapshot,
        ranking_type::RankingType, ratable_entity::RatableEntity, sport_type::SportType
    }
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres_types::ToSql;
use std::sync::Arc;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info, warn};

const SCHEMA: &str = include_str!("schema.sql");

/// First key of every partition advisory lock ("RANK")
const LEASE_NAMESPACE: i32 = 0x5241_4E4B;

const ENTITY_COLUMNS: &str = "id, category, sport_type, rating, total_points, matches_played, matches_won, \
    current_rank, active, version";

const SNAPSHOT_COLUMNS: &str = "sport_type, ranking_type, ranking_category, entity_id, rank, previous_rank, \
    points, rating, ranking_date";

#[derive(Clone)]
pub struct DbClient {
    client: Arc<Client>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(client)
        })
    }

    /// Creates the entity and snapshot tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.client.batch_execute(SCHEMA).await?;
        info!("Schema verified");

        Ok(())
    }

    /// Inserts a new entity. Entity creation belongs to the platform; this exists for
    /// seeding and administration.
    pub async fn insert_entity(&self, entity: &RatableEntity) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO ratable_entities ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            ENTITY_COLUMNS
        );
        let values: &[&(dyn ToSql + Sync)] = &[
            &entity.id,
            &(entity.category as i16),
            &(entity.sport_type as i16),
            &entity.rating,
            &entity.total_points,
            &entity.matches_played,
            &entity.matches_won,
            &entity.current_rank,
            &entity.active,
            &entity.version
        ];

        self.client.execute(query.as_str(), values).await?;
        Ok(())
    }

    fn entity_from_row(row: &Row) -> Result<RatableEntity, StoreError> {
        let category = row.try_get::<_, i16>("category")?;
        let sport_type = row.try_get::<_, i16>("sport_type")?;

        Ok(RatableEntity {
            id: row.try_get("id")?,
            category: RankingCategory::try_from(i32::from(category))
                .map_err(|_| StoreError::InvalidRow(format!("unknown category {}", category)))?,
            sport_type: SportType::try_from(i32::from(sport_type))
                .map_err(|_| StoreError::InvalidRow(format!("unknown sport type {}", sport_type)))?,
            rating: row.try_get("rating")?,
            total_points: row.try_get("total_points")?,
            matches_played: row.try_get("matches_played")?,
            matches_won: row.try_get("matches_won")?,
            current_rank: row.try_get("current_rank")?,
            active: row.try_get("active")?,
            version: row.try_get("version")?
        })
    }

    fn snapshot_from_row(row: &Row) -> Result<RankingSnapshot, StoreError> {
        let sport_type = row.try_get::<_, i16>("sport_type")?;
        let ranking_type = row.try_get::<_, i16>("ranking_type")?;
        let category = row.try_get::<_, i16>("ranking_category")?;

        Ok(RankingSnapshot {
            sport_type: SportType::try_from(i32::from(sport_type))
                .map_err(|_| StoreError::InvalidRow(format!("unknown sport type {}", sport_type)))?,
            ranking_type: RankingType::try_from(i32::from(ranking_type))
                .map_err(|_| StoreError::InvalidRow(format!("unknown ranking type {}", ranking_type)))?,
            ranking_category: RankingCategory::try_from(i32::from(category))
                .map_err(|_| StoreError::InvalidRow(format!("unknown category {}", category)))?,
            entity_id: row.try_get("entity_id")?,
            rank: row.try_get("rank")?,
            previous_rank: row.try_get("previous_rank")?,
            points: row.try_get("points")?,
            rating: row.try_get("rating")?,
            ranking_date: row.try_get("ranking_date")?
        })
    }

    async fn query_snapshots(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)]
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        let rows = self.client.query(query, params).await?;
        rows.iter().map(Self::snapshot_from_row).collect()
    }

    // Access the underlying Client
    pub fn client(&self) -> Arc<Client> {
        Arc::clone(&self.client)
    }
}

#[async_trait]
impl EntityStore for DbClient {
    async fn find_by_sport_and_category(
        &self,
        sport_type: SportType,
        category: RankingCategory
    ) -> Result<Vec<RatableEntity>, StoreError> {
        let query = format!(
            "SELECT {} FROM ratable_entities WHERE sport_type = $1 AND category = $2 AND active",
            ENTITY_COLUMNS
        );
        let rows = self
            .client
            .query(query.as_str(), &[&(sport_type as i16), &(category as i16)])
            .await?;

        debug!("Fetched {} entities for {}/{}", rows.len(), sport_type, category);
        rows.iter().map(Self::entity_from_row).collect()
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<RatableEntity>, StoreError> {
        let query = format!("SELECT {} FROM ratable_entities WHERE id = $1", ENTITY_COLUMNS);
        let row = self.client.query_opt(query.as_str(), &[&id]).await?;

        row.as_ref().map(Self::entity_from_row).transpose()
    }

    async fn save(&self, entity: &RatableEntity) -> Result<(), StoreError> {
        let update = "UPDATE ratable_entities SET rating = $3, total_points = $4, matches_played = $5, \
            matches_won = $6, current_rank = $7, version = version + 1 WHERE id = $1 AND version = $2";
        let values: &[&(dyn ToSql + Sync)] = &[
            &entity.id,
            &entity.version,
            &entity.rating,
            &entity.total_points,
            &entity.matches_played,
            &entity.matches_won,
            &entity.current_rank
        ];

        if self.client.execute(update, values).await? == 1 {
            return Ok(());
        }

        // Either the row does not exist yet or someone else saved it first
        let insert = format!(
            "INSERT INTO ratable_entities ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
            ON CONFLICT (id) DO NOTHING",
            ENTITY_COLUMNS
        );
        let next_version = entity.version + 1;
        let values: &[&(dyn ToSql + Sync)] = &[
            &entity.id,
            &(entity.category as i16),
            &(entity.sport_type as i16),
            &entity.rating,
            &entity.total_points,
            &entity.matches_played,
            &entity.matches_won,
            &entity.current_rank,
            &entity.active,
            &next_version
        ];

        match self.client.execute(insert.as_str(), values).await? {
            1 => Ok(()),
            _ => Err(StoreError::StaleWrite(entity.id.clone()))
        }
    }
}

#[async_trait]
impl SnapshotStore for DbClient {
    async fn append(&self, snapshot: &RankingSnapshot) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO ranking_snapshots ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            SNAPSHOT_COLUMNS
        );
        let values: &[&(dyn ToSql + Sync)] = &[
            &(snapshot.sport_type as i16),
            &(snapshot.ranking_type as i16),
            &(snapshot.ranking_category as i16),
            &snapshot.entity_id,
            &snapshot.rank,
            &snapshot.previous_rank,
            &snapshot.points,
            &snapshot.rating,
            &snapshot.ranking_date
        ];

        self.client.execute(query.as_str(), values).await?;
        Ok(())
    }

    async fn find_latest_by_partition(
        &self,
        sport_type: SportType,
        ranking_type: RankingType
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        let query = format!(
            "SELECT {} FROM ranking_snapshots s WHERE sport_type = $1 AND ranking_type = $2 \
            AND ranking_date = (SELECT MAX(m.ranking_date) FROM ranking_snapshots m \
                WHERE m.sport_type = $1 AND m.ranking_type = $2 AND m.ranking_category = s.ranking_category) \
            ORDER BY rank, ranking_category, entity_id",
            SNAPSHOT_COLUMNS
        );

        self.query_snapshots(&query, &[&(sport_type as i16), &(ranking_type as i16)])
            .await
    }

    async fn find_latest_by_category(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        category: RankingCategory
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        let query = format!(
            "SELECT {} FROM ranking_snapshots WHERE sport_type = $1 AND ranking_type = $2 AND ranking_category = $3 \
            AND ranking_date = (SELECT MAX(ranking_date) FROM ranking_snapshots \
                WHERE sport_type = $1 AND ranking_type = $2 AND ranking_category = $3) \
            ORDER BY rank, entity_id",
            SNAPSHOT_COLUMNS
        );

        self.query_snapshots(
            &query,
            &[&(sport_type as i16), &(ranking_type as i16), &(category as i16)]
        )
        .await
    }

    async fn find_by_entity_id(&self, entity_id: &str) -> Result<Vec<RankingSnapshot>, StoreError> {
        let query = format!(
            "SELECT {} FROM ranking_snapshots WHERE entity_id = $1 ORDER BY ranking_date",
            SNAPSHOT_COLUMNS
        );

        self.query_snapshots(&query, &[&entity_id]).await
    }

    async fn find_between(
        &self,
        sport_type: SportType,
        ranking_type: RankingType,
        start: DateTime<Utc>,
        end: DateTime<Utc>
    ) -> Result<Vec<RankingSnapshot>, StoreError> {
        let query = format!(
            "SELECT {} FROM ranking_snapshots WHERE sport_type = $1 AND ranking_type = $2 \
            AND ranking_date >= $3 AND ranking_date <= $4 ORDER BY ranking_date, rank",
            SNAPSHOT_COLUMNS
        );

        self.query_snapshots(
            &query,
            &[&(sport_type as i16), &(ranking_type as i16), &start, &end]
        )
        .await
    }
}

/// Session-level advisory locks, one per partition. They live on this client's connection
/// and are released by Postgres if the process dies.
#[async_trait]
impl PartitionLease for DbClient {
    async fn try_acquire(&self, partition: Partition) -> Result<bool, StoreError> {
        let row = self
            .client
            .query_one(
                "SELECT pg_try_advisory_lock($1, $2)",
                &[&LEASE_NAMESPACE, &lease_key(partition)]
            )
            .await?;

        let acquired = row.try_get::<_, bool>(0)?;
        debug!("Lease for {} acquired: {}", partition, acquired);
        Ok(acquired)
    }

    async fn release(&self, partition: Partition) -> Result<(), StoreError> {
        let row = self
            .client
            .query_one(
                "SELECT pg_advisory_unlock($1, $2)",
                &[&LEASE_NAMESPACE, &lease_key(partition)]
            )
            .await?;

        if !row.try_get::<_, bool>(0)? {
            warn!("Lease for {} was not held by this session", partition);
        }
        Ok(())
    }
}

fn lease_key(partition: Partition) -> i32 {
    partition.sport_type as i32 * 2 + partition.category as i32
}
