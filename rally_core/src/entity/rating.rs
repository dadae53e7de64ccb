use crate::ids::{RatingId, UserId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One user's rating of another. Unique per (rating_user_id, rated_user_id).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rating")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: RatingId,
    pub rating_user_id: UserId,
    pub rated_user_id: UserId,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RatingUserId",
        to = "super::user::Column::Id"
    )]
    RatingUser,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::RatedUserId",
        to = "super::user::Column::Id"
    )]
    RatedUser,
    #[sea_orm(has_many = "super::rating_field::Entity")]
    RatingField,
}

impl Related<super::rating_field::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RatingField.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
