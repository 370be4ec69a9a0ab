use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use strum_macros::{Display, EnumIter, EnumString};

/// Every sport the platform organises events for. Each sport is ranked independently.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[repr(u8)]
pub enum SportType {
    Football = 0,
    Basketball = 1,
    Cricket = 2,
    Tennis = 3,
    Badminton = 4,
    Volleyball = 5,
    TableTennis = 6,
    Chess = 7,
    Hockey = 8,
    Baseball = 9,
    Rugby = 10,
    Golf = 11,
    Swimming = 12,
    Athletics = 13,
    Boxing = 14,
    MartialArts = 15,
    Esports = 16,
    Kabaddi = 17,
    Wrestling = 18,
    Cycling = 19,
    Other = 20
}

impl TryFrom<i32> for SportType {
    type Error = ();

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SportType::Football),
            1 => Ok(SportType::Basketball),
            2 => Ok(SportType::Cricket),
            3 => Ok(SportType::Tennis),
            4 => Ok(SportType::Badminton),
            5 => Ok(SportType::Volleyball),
            6 => Ok(SportType::TableTennis),
            7 => Ok(SportType::Chess),
            8 => Ok(SportType::Hockey),
            9 => Ok(SportType::Baseball),
            10 => Ok(SportType::Rugby),
            11 => Ok(SportType::Golf),
            12 => Ok(SportType::Swimming),
            13 => Ok(SportType::Athletics),
            14 => Ok(SportType::Boxing),
            15 => Ok(SportType::MartialArts),
            16 => Ok(SportType::Esports),
            17 => Ok(SportType::Kabaddi),
            18 => Ok(SportType::Wrestling),
            19 => Ok(SportType::Cycling),
            20 => Ok(SportType::Other),
            _ => Err(())
        }
    }
}
