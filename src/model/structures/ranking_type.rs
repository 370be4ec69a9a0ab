use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter, EnumString};

/// Geographic scope of a ranking. Recomputation currently only produces `Global`.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum RankingType {
    Global = 0,
    National = 1,
    State = 2,
    City = 3
}

impl TryFrom<i32> for RankingType {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RankingType::Global),
            1 => Ok(RankingType::National),
            2 => Ok(RankingType::State),
            3 => Ok(RankingType::City),
            _ => Err(())
        }
    }
}
