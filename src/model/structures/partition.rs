use crate::model::structures::{ranking_category::RankingCategory, sport_type::SportType};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum::IntoEnumIterator;

/// The unit of independent recomputation: one sport, one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub sport_type: SportType,
    pub category: RankingCategory
}

impl Partition {
    pub fn new(sport_type: SportType, category: RankingCategory) -> Self {
        Partition { sport_type, category }
    }

    /// Every sport crossed with every category, sport-major.
    pub fn all() -> Vec<Partition> {
        iproduct!(SportType::iter(), RankingCategory::iter())
            .map(|(sport, category)| Partition::new(sport, category))
            .collect()
    }

    /// Both categories of a single sport
    pub fn for_sport(sport_type: SportType) -> Vec<Partition> {
        RankingCategory::iter()
            .map(|category| Partition::new(sport_type, category))
            .collect()
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.sport_type, self.category)
    }
}
