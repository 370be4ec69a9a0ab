use crate::{
    database::PartitionLease,
    error::{EngineError, EngineResult},
    model::{
        constants::{
            DEFAULT_MAX_PARALLEL_PARTITIONS, DEFAULT_PARTITION_TIMEOUT_SECS, DEFAULT_SCHEDULE_HOUR,
            DEFAULT_SCHEDULE_MINUTE
        },
        locks::InFlight,
        rank_assigner::RankAssigner,
        structures::{
            partition::Partition,
            processing::{CycleReport, PartitionOutcome, PartitionStatus, RunResult},
            sport_type::SportType
        }
    }
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use futures::future::join_all;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc
    },
    time::Duration
};
use tokio::{
    sync::{watch, Semaphore},
    task::JoinHandle
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Daily trigger time, UTC
    pub schedule_at: NaiveTime,
    /// A partition still running after this long is abandoned and reported failed
    pub partition_timeout: Duration,
    pub max_parallel_partitions: usize
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            schedule_at: NaiveTime::from_hms_opt(DEFAULT_SCHEDULE_HOUR, DEFAULT_SCHEDULE_MINUTE, 0)
                .unwrap_or_default(),
            partition_timeout: Duration::from_secs(DEFAULT_PARTITION_TIMEOUT_SECS),
            max_parallel_partitions: DEFAULT_MAX_PARALLEL_PARTITIONS
        }
    }
}

/// First occurrence of `at` strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();

    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Clears the cycle flag when the cycle ends, including when its future is dropped.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives [`RankAssigner`] over every partition once a day, and on demand.
///
/// Partitions are independent: each one is bounded by a timeout, failures are recorded in
/// the cycle report and never stop the other partitions. A partition never has two runs in
/// flight; a trigger that finds one running is skipped. With a [`PartitionLease`] the same
/// holds across processes sharing the database.
pub struct RankingScheduler {
    assigner: Arc<RankAssigner>,
    in_flight: Arc<InFlight>,
    lease: Option<Arc<dyn PartitionLease>>,
    cycle_running: AtomicBool,
    config: SchedulerConfig
}

impl RankingScheduler {
    pub fn new(assigner: Arc<RankAssigner>, config: SchedulerConfig) -> Self {
        RankingScheduler {
            assigner,
            in_flight: Arc::new(InFlight::new()),
            lease: None,
            cycle_running: AtomicBool::new(false),
            config
        }
    }

    /// Runs a partition only while holding its lease.
    pub fn with_lease(mut self, lease: Arc<dyn PartitionLease>) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs every partition of every sport. Returns `None` when the previous cycle is
    /// still in progress.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        if self
            .cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Previous ranking cycle still in progress, skipping this tick");
            return None;
        }
        let _cycle = CycleGuard(&self.cycle_running);

        Some(self.run_partitions(Partition::all()).await)
    }

    /// Administrative recompute of both categories of one sport.
    pub async fn trigger_sport(&self, sport_type: SportType) -> CycleReport {
        self.run_partitions(Partition::for_sport(sport_type)).await
    }

    /// Administrative recompute of one partition. Fails with
    /// [`EngineError::ConcurrencyConflict`] when a run for it is already in flight, here or
    /// under another holder of the lease.
    pub async fn trigger_partition(&self, partition: Partition) -> EngineResult<RunResult> {
        let Some(_flight) = self.in_flight.try_begin(partition) else {
            return Err(EngineError::ConcurrencyConflict(format!(
                "a ranking run for {} is already in progress",
                partition
            )));
        };

        if !self.acquire_lease(partition).await? {
            return Err(EngineError::ConcurrencyConflict(format!(
                "a ranking run for {} is in progress in another process",
                partition
            )));
        }

        let result = self.recalculate_with_timeout(partition).await;
        self.release_lease(partition).await;
        result
    }

    async fn run_partitions(&self, partitions: Vec<Partition>) -> CycleReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Ranking cycle {} started over {} partitions", run_id, partitions.len());

        let permits = Semaphore::new(self.config.max_parallel_partitions.max(1));
        let runs = partitions
            .into_iter()
            .map(|partition| self.run_partition(partition, &permits));
        let mut outcomes = join_all(runs).await;
        outcomes.sort_by_key(|o| o.partition);

        let report = CycleReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes
        };

        if report.failed() > 0 {
            warn!(
                "Ranking cycle {} finished: {} succeeded, {} failed, {} skipped",
                run_id,
                report.succeeded(),
                report.failed(),
                report.skipped()
            );
        } else {
            info!(
                "Ranking cycle {} finished: {} succeeded, {} skipped",
                run_id,
                report.succeeded(),
                report.skipped()
            );
        }

        report
    }

    async fn run_partition(&self, partition: Partition, permits: &Semaphore) -> PartitionOutcome {
        // The semaphore is never closed
        let _permit = permits.acquire().await.ok();

        let Some(_flight) = self.in_flight.try_begin(partition) else {
            warn!("Ranking run for {} already in progress, skipping", partition);
            return PartitionOutcome {
                partition,
                status: PartitionStatus::Skipped {
                    reason: "run already in progress".to_string()
                }
            };
        };

        match self.acquire_lease(partition).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Ranking run for {} held by another process, skipping", partition);
                return PartitionOutcome {
                    partition,
                    status: PartitionStatus::Skipped {
                        reason: "run in progress in another process".to_string()
                    }
                };
            }
            Err(e) => {
                error!("Failed to acquire lease for {}: {}", partition, e);
                return PartitionOutcome {
                    partition,
                    status: PartitionStatus::Failed { reason: e.to_string() }
                };
            }
        }

        let status = match self.recalculate_with_timeout(partition).await {
            Ok(result) => PartitionStatus::Succeeded { result },
            Err(e) => {
                error!("{}", e);
                PartitionStatus::Failed { reason: e.to_string() }
            }
        };
        self.release_lease(partition).await;

        PartitionOutcome { partition, status }
    }

    /// Always `true` without a lease.
    async fn acquire_lease(&self, partition: Partition) -> EngineResult<bool> {
        match &self.lease {
            Some(lease) => Ok(lease.try_acquire(partition).await?),
            None => Ok(true)
        }
    }

    async fn release_lease(&self, partition: Partition) {
        if let Some(lease) = &self.lease {
            if let Err(e) = lease.release(partition).await {
                warn!("Failed to release lease for {}: {}", partition, e);
            }
        }
    }

    async fn recalculate_with_timeout(&self, partition: Partition) -> EngineResult<RunResult> {
        let run = self.assigner.recalculate(partition.sport_type, partition.category);

        match tokio::time::timeout(self.config.partition_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::PartitionRunFailure {
                partition,
                reason: format!("timed out after {:?}", self.config.partition_timeout)
            })
        }
    }

    /// Fires a cycle at the configured time every day until `shutdown` flips to `true`.
    /// Cycles run on their own task, so a slow cycle makes the next tick skip rather
    /// than queue. On shutdown a cycle still in progress is awaited before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Ranking scheduler started, daily at {} UTC", self.config.schedule_at);
        let mut cycle: Option<JoinHandle<Option<CycleReport>>> = None;

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.config.schedule_at);
            let wait = (next - now).to_std().unwrap_or_default();
            info!("Next ranking cycle at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if cycle.as_ref().is_some_and(|handle| !handle.is_finished()) {
                        warn!("Previous ranking cycle still in progress, skipping this tick");
                        continue;
                    }

                    let scheduler = Arc::clone(&self);
                    cycle = Some(tokio::spawn(async move { scheduler.run_cycle().await }));
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = cycle.filter(|handle| !handle.is_finished()) {
            info!("Waiting for the running ranking cycle to finish");
            if let Err(e) = handle.await {
                error!("Ranking cycle task failed: {}", e);
            }
        }

        info!("Ranking scheduler stopped");
    }
}
