use std::fmt;
use std::str::FromStr;

use crate::ids::RatingId;
use sea_orm::entity::prelude::*;
use sea_orm::Iterable;
use serde::{Deserialize, Serialize};

/// The closed set of aspects a user can be rated on.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum RatingFieldName {
    #[sea_orm(string_value = "attitude")]
    Attitude,
    #[sea_orm(string_value = "communication")]
    Communication,
    #[sea_orm(string_value = "reliability")]
    Reliability,
    #[sea_orm(string_value = "teamwork")]
    Teamwork,
}

impl RatingFieldName {
    pub fn as_str(self) -> &'static str {
        match self {
            RatingFieldName::Attitude => "attitude",
            RatingFieldName::Communication => "communication",
            RatingFieldName::Reliability => "reliability",
            RatingFieldName::Teamwork => "teamwork",
        }
    }
}

impl fmt::Display for RatingFieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rating field: {0}")]
pub struct UnknownRatingField(pub String);

impl FromStr for RatingFieldName {
    type Err = UnknownRatingField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RatingFieldName::iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownRatingField(s.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rating_field")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub rating_id: RatingId,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: RatingFieldName,
    pub value: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rating::Entity",
        from = "Column::RatingId",
        to = "super::rating::Column::Id"
    )]
    Rating,
}

impl Related<super::rating::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rating.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
