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
                    .table(UserFollow::Table)
                    .col(uuid(UserFollow::FollowerId))
                    .col(uuid(UserFollow::FollowedId))
                    .col(timestamp_with_time_zone(UserFollow::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(UserFollow::FollowerId)
                            .col(UserFollow::FollowedId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-user-follow-follower_id")
                            .from(UserFollow::Table, UserFollow::FollowerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-user-follow-followed_id")
                            .from(UserFollow::Table, UserFollow::FollowedId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The primary key covers follower -> followed; this covers the reverse
        manager
            .create_index(
                Index::create()
                    .name("idx_user_follow_followed_id")
                    .table(UserFollow::Table)
                    .col(UserFollow::FollowedId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserFollow::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserFollow {
    Table,
    FollowerId,
    FollowedId,
    CreatedAt,
}
