use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter, EnumString};

/// Which kind of entity a ranking covers. Players and teams never share a ranking.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum RankingCategory {
    Player = 0,
    Team = 1
}

impl TryFrom<i32> for RankingCategory {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RankingCategory::Player),
            1 => Ok(RankingCategory::Team),
            _ => Err(())
        }
    }
}
