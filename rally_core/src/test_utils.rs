use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use sea_orm_migration::MigratorTrait;

use crate::{
    entity::prelude::*,
    ids::{CommentId, CommunityId, GameId, PostId, UserId},
    models::migrator::Migrator,
};

pub(crate) async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

pub(crate) fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

pub(crate) async fn create_user(db: &DatabaseConnection, username: &str) -> UserId {
    let id = UserId::new();
    User::insert(UserActiveModel {
        id: Set(id),
        username: Set(username.to_string()),
        password_hash: Set("not-a-real-hash".to_string()),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .expect("insert user");

    UserProfile::insert(UserProfileActiveModel {
        user_id: Set(id),
        bio: Set(String::new()),
        profile_picture_id: Set(None),
    })
    .exec(db)
    .await
    .expect("insert profile");

    id
}

pub(crate) async fn create_game(db: &DatabaseConnection, id: GameId) -> GameId {
    Game::insert(GameActiveModel {
        id: Set(id),
        name: Set(format!("Game {id}")),
        cover: Set(None),
        artwork: Set(None),
        summary: Set("A game".to_string()),
        first_release_date: Set(None),
    })
    .exec(db)
    .await
    .expect("insert game");

    id
}

/// Creates a community owned by `owner`, who also becomes its first member.
pub(crate) async fn create_community(
    db: &DatabaseConnection,
    owner: UserId,
    name: &str,
) -> CommunityId {
    let game_id = Game::find()
        .one(db)
        .await
        .expect("query game")
        .map(|g| g.id);
    let game_id = match game_id {
        Some(id) => id,
        None => create_game(db, 1942).await,
    };

    let id = CommunityId::new();
    Community::insert(CommunityActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        owner_id: Set(owner),
        game_id: Set(game_id),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .expect("insert community");

    join(db, owner, id).await;
    id
}

pub(crate) async fn join(db: &DatabaseConnection, user: UserId, community: CommunityId) {
    CommunityMember::insert(CommunityMemberActiveModel {
        community_id: Set(community),
        user_id: Set(user),
        joined_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .expect("insert membership");
}

pub(crate) async fn follow(db: &DatabaseConnection, follower: UserId, followed: UserId) {
    UserFollow::insert(UserFollowActiveModel {
        follower_id: Set(follower),
        followed_id: Set(followed),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .expect("insert follow");
}

pub(crate) async fn create_post_at(
    db: &DatabaseConnection,
    author: UserId,
    community: CommunityId,
    title: &str,
    created_at: DateTime<Utc>,
) -> PostId {
    let id = PostId::new();
    Post::insert(PostActiveModel {
        id: Set(id),
        title: Set(title.to_string()),
        content: Set(format!("{title} body")),
        image_id: Set(None),
        community_id: Set(community),
        author_id: Set(author),
        created_at: Set(created_at),
        updated_at: Set(created_at),
    })
    .exec(db)
    .await
    .expect("insert post");

    id
}

pub(crate) async fn create_comment_at(
    db: &DatabaseConnection,
    post: PostId,
    author: UserId,
    parent: Option<CommentId>,
    content: &str,
    created_at: DateTime<Utc>,
) -> CommentId {
    let id = CommentId::new();
    Comment::insert(CommentActiveModel {
        id: Set(id),
        content: Set(content.to_string()),
        post_id: Set(post),
        parent_id: Set(parent),
        author_id: Set(Some(author)),
        created_at: Set(created_at),
        updated_at: Set(created_at),
    })
    .exec(db)
    .await
    .expect("insert comment");

    id
}

pub(crate) async fn like_post(db: &DatabaseConnection, post: PostId, user: UserId) {
    PostLike::insert(PostLikeActiveModel {
        post_id: Set(post),
        user_id: Set(user),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .expect("insert post like");
}

pub(crate) async fn like_comment(db: &DatabaseConnection, comment: CommentId, user: UserId) {
    CommentLike::insert(CommentLikeActiveModel {
        comment_id: Set(comment),
        user_id: Set(user),
        created_at: Set(Utc::now()),
    })
    .exec(db)
    .await
    .expect("insert comment like");
}
