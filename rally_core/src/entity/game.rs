use crate::ids::GameId;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

// Cached metadata from the external game catalogue; the id is the catalogue's.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "game")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: GameId,
    pub name: String,
    pub cover: Option<String>,
    pub artwork: Option<String>,
    pub summary: String,
    pub first_release_date: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::community::Entity")]
    Community,
}

impl Related<super::community::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Community.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
