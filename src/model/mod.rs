pub mod constants;
pub mod locks;
pub mod query;
pub mod rank_assigner;
pub mod ranking_engine;
pub mod rating_updater;
pub mod scheduler;
pub mod structures;
