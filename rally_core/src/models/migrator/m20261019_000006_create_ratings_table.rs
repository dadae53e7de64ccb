use sea_orm_migration::{prelude::*, schema::*};

use super::m20261019_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Rating::Table)
                    .col(pk_uuid(Rating::Id))
                    .col(uuid(Rating::RatingUserId))
                    .col(uuid(Rating::RatedUserId))
                    .col(text_null(Rating::Description))
                    .col(timestamp_with_time_zone(Rating::CreatedAt))
                    .col(timestamp_with_time_zone(Rating::UpdatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rating-rating_user_id")
                            .from(Rating::Table, Rating::RatingUserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rating-rated_user_id")
                            .from(Rating::Table, Rating::RatedUserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One rating per giver/receiver pair
        manager
            .create_index(
                Index::create()
                    .name("uq_rating_pair")
                    .table(Rating::Table)
                    .col(Rating::RatingUserId)
                    .col(Rating::RatedUserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_rating_rated_user_id")
                    .table(Rating::Table)
                    .col(Rating::RatedUserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RatingField::Table)
                    .col(uuid(RatingField::RatingId))
                    .col(string_len(RatingField::Name, 16))
                    .col(integer(RatingField::Value))
                    .primary_key(
                        Index::create()
                            .col(RatingField::RatingId)
                            .col(RatingField::Name),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-rating-field-rating_id")
                            .from(RatingField::Table, RatingField::RatingId)
                            .to(Rating::Table, Rating::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RatingField::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Rating::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Rating {
    Table,
    Id,
    RatingUserId,
    RatedUserId,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RatingField {
    Table,
    RatingId,
    Name,
    Value,
}
