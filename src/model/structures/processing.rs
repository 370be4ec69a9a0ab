use crate::model::structures::partition::Partition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of a successful RankAssigner run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub partition: Partition,
    /// Number of entities ranked (and snapshots written)
    pub count: usize,
    /// `None` when the partition was empty and nothing was written
    pub ranking_date: Option<DateTime<Utc>>
}

/// Rating change applied by a single match result
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDelta {
    pub winner_delta: f64,
    pub loser_delta: f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PartitionStatus {
    Succeeded { result: RunResult },
    Failed { reason: String },
    Skipped { reason: String }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionOutcome {
    pub partition: Partition,
    pub status: PartitionStatus
}

impl PartitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, PartitionStatus::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, PartitionStatus::Failed { .. })
    }
}

/// Everything one scheduler cycle (or manual trigger) did, partition by partition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<PartitionOutcome>
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.succeeded() - self.failed()
    }

    pub fn outcome(&self, partition: Partition) -> Option<&PartitionOutcome> {
        self.outcomes.iter().find(|o| o.partition == partition)
    }
}
