pub mod partition;
pub mod processing;
pub mod ranking_category;
pub mod ranking_snapshot;
pub mod ranking_type;
pub mod ratable_entity;
pub mod sport_type;
