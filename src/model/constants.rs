// Elo constants
pub const K_FACTOR: f64 = 32.0;
pub const ELO_SCALE: f64 = 400.0;
pub const DEFAULT_RATING: f64 = 1000.0;
// Points awarded per match result
pub const WIN_POINTS: i64 = 100;
pub const LOSS_POINTS: i64 = 10;
// Ranking run constants
pub const DEFAULT_LATEST_LIMIT: usize = 100;
pub const DEFAULT_SCHEDULE_HOUR: u32 = 2;
pub const DEFAULT_SCHEDULE_MINUTE: u32 = 0;
pub const DEFAULT_PARTITION_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_PARALLEL_PARTITIONS: usize = 4;
// Number of entity lock stripes held by each partition lock set
pub const ENTITY_LOCK_STRIPES: usize = 64;
