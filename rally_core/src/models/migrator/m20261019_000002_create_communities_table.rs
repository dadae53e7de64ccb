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
                    .table(Game::Table)
                    .col(big_integer(Game::Id).primary_key())
                    .col(string(Game::Name))
                    .col(string_null(Game::Cover))
                    .col(string_null(Game::Artwork))
                    .col(text(Game::Summary))
                    .col(timestamp_with_time_zone_null(Game::FirstReleaseDate))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Community::Table)
                    .col(pk_uuid(Community::Id))
                    .col(string_len_uniq(Community::Name, 80))
                    .col(uuid(Community::OwnerId))
                    .col(big_integer(Community::GameId))
                    .col(timestamp_with_time_zone(Community::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-community-owner_id")
                            .from(Community::Table, Community::OwnerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-community-game_id")
                            .from(Community::Table, Community::GameId)
                            .to(Game::Table, Game::Id)
                            .on_delete(ForeignKeyAction::Restrict)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommunityMember::Table)
                    .col(uuid(CommunityMember::CommunityId))
                    .col(uuid(CommunityMember::UserId))
                    .col(timestamp_with_time_zone(CommunityMember::JoinedAt))
                    .primary_key(
                        Index::create()
                            .col(CommunityMember::CommunityId)
                            .col(CommunityMember::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-community-member-community_id")
                            .from(CommunityMember::Table, CommunityMember::CommunityId)
                            .to(Community::Table, Community::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-community-member-user_id")
                            .from(CommunityMember::Table, CommunityMember::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Home feed looks memberships up by user
        manager
            .create_index(
                Index::create()
                    .name("idx_community_member_user_id")
                    .table(CommunityMember::Table)
                    .col(CommunityMember::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommunityMember::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Community::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Game::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Game {
    Table,
    Id,
    Name,
    Cover,
    Artwork,
    Summary,
    FirstReleaseDate,
}

#[derive(DeriveIden)]
pub enum Community {
    Table,
    Id,
    Name,
    OwnerId,
    GameId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum CommunityMember {
    Table,
    CommunityId,
    UserId,
    JoinedAt,
}
