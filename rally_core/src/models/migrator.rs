use sea_orm_migration::prelude::*;

mod m20261019_000001_create_user_table;
mod m20261019_000002_create_communities_table;
mod m20261019_000003_create_user_follows_table;
mod m20261019_000004_create_posts_table;
mod m20261019_000005_create_comments_table;
mod m20261019_000006_create_ratings_table;
mod m20261019_000007_create_invalidated_tokens_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_user_table::Migration),
            Box::new(m20261019_000002_create_communities_table::Migration),
            Box::new(m20261019_000003_create_user_follows_table::Migration),
            Box::new(m20261019_000004_create_posts_table::Migration),
            Box::new(m20261019_000005_create_comments_table::Migration),
            Box::new(m20261019_000006_create_ratings_table::Migration),
            Box::new(m20261019_000007_create_invalidated_tokens_table::Migration),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{Database, DbErr};

    #[tokio::test]
    async fn test_migrations_okay() -> Result<(), DbErr> {
        let db = Database::connect("sqlite::memory:").await?;
        let schema_manager = SchemaManager::new(&db);

        Migrator::refresh(&db).await?;

        for table in [
            "user",
            "user_profile",
            "game",
            "community",
            "community_member",
            "user_follow",
            "post",
            "post_like",
            "comment",
            "comment_like",
            "rating",
            "rating_field",
            "invalidated_token",
        ] {
            assert!(schema_manager.has_table(table).await?, "missing table {table}");
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_migrations_roll_back_cleanly() -> Result<(), DbErr> {
        let db = Database::connect("sqlite::memory:").await?;
        let schema_manager = SchemaManager::new(&db);

        Migrator::up(&db, None).await?;
        Migrator::down(&db, None).await?;

        assert!(!schema_manager.has_table("post").await?);
        assert!(!schema_manager.has_table("user").await?);

        Ok(())
    }
}
