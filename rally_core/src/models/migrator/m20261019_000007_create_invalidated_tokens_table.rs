use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(InvalidatedToken::Table)
                    .col(string_len(InvalidatedToken::TokenId, 64).primary_key())
                    .col(timestamp_with_time_zone(InvalidatedToken::ExpiresAt))
                    .to_owned(),
            )
            .await?;

        // Pruning scans by expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_invalidated_token_expires_at")
                    .table(InvalidatedToken::Table)
                    .col(InvalidatedToken::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InvalidatedToken::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum InvalidatedToken {
    Table,
    TokenId,
    ExpiresAt,
}
