use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection};
use thiserror::Error;
use zel_core::prelude::*;

use crate::{
    entity::prelude::*,
    error::ErrorKind,
    ids::{CommentId, CommunityId, PostId, UserId},
    service::{aggregate, views::PostView},
};

pub const MAX_TITLE_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum PostsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("post not found")]
    PostNotFound,

    #[error("community not found")]
    CommunityNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("title must be between 1 and {MAX_TITLE_LEN} characters")]
    InvalidTitle,

    #[error("post content cannot be empty")]
    EmptyContent,

    #[error("unauthorized: not post author")]
    Unauthorized,
}

impl PostsServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PostsServiceError::DbError(_) => ErrorKind::Internal,
            PostsServiceError::PostNotFound
            | PostsServiceError::CommunityNotFound
            | PostsServiceError::UserNotFound => ErrorKind::NotFound,
            PostsServiceError::InvalidTitle | PostsServiceError::EmptyContent => {
                ErrorKind::InvalidArgument
            }
            PostsServiceError::Unauthorized => ErrorKind::NotAuthorized,
        }
    }
}

impl From<PostsServiceError> for ResourceError {
    fn from(error: PostsServiceError) -> Self {
        match error {
            PostsServiceError::DbError(error) => ResourceError::infra(error),
            error => ResourceError::app(error),
        }
    }
}

fn validate_title(title: &str) -> Result<String, PostsServiceError> {
    let title = title.trim();
    let len = title.chars().count();
    if len == 0 || len > MAX_TITLE_LEN {
        return Err(PostsServiceError::InvalidTitle);
    }
    Ok(title.to_string())
}

fn validate_content(content: String) -> Result<String, PostsServiceError> {
    if content.trim().is_empty() {
        return Err(PostsServiceError::EmptyContent);
    }
    Ok(content)
}

#[derive(Clone)]
pub struct PostsService {
    db: DatabaseConnection,
}

impl PostsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_post(&self, post_id: PostId) -> Result<PostModel, PostsServiceError> {
        Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .ok_or(PostsServiceError::PostNotFound)
    }

    async fn like_count(&self, post_id: PostId) -> Result<u64, PostsServiceError> {
        Ok(PostLike::find()
            .filter(PostLikeColumn::PostId.eq(post_id))
            .count(&self.db)
            .await?)
    }

    /// Create a new post in a community
    pub async fn _create_post(
        &self,
        author_id: UserId,
        community_id: CommunityId,
        title: String,
        content: String,
        image_id: Option<String>,
    ) -> Result<PostView, PostsServiceError> {
        let title = validate_title(&title)?;
        let content = validate_content(content)?;

        User::find_by_id(author_id)
            .one(&self.db)
            .await?
            .ok_or(PostsServiceError::UserNotFound)?;
        Community::find_by_id(community_id)
            .one(&self.db)
            .await?
            .ok_or(PostsServiceError::CommunityNotFound)?;

        let now = Utc::now();
        let post = PostActiveModel {
            id: Set(PostId::new()),
            title: Set(title),
            content: Set(content),
            image_id: Set(image_id),
            community_id: Set(community_id),
            author_id: Set(author_id),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let post = Post::insert(post).exec_with_returning(&self.db).await?;
        tracing::info!(post_id = %post.id, %community_id, %author_id, "created post");

        Ok(aggregate::post_view(&self.db, post).await?)
    }

    /// Get a specific post by ID
    pub async fn _get_post(&self, post_id: PostId) -> Result<PostView, PostsServiceError> {
        let post = self.find_post(post_id).await?;
        Ok(aggregate::post_view(&self.db, post).await?)
    }

    /// Update a post (only by author)
    pub async fn _update_post(
        &self,
        post_id: PostId,
        user_id: UserId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<PostView, PostsServiceError> {
        let post = self.find_post(post_id).await?;

        if post.author_id != user_id {
            return Err(PostsServiceError::Unauthorized);
        }

        let mut post_active: PostActiveModel = post.into();

        if let Some(title) = title {
            post_active.title = Set(validate_title(&title)?);
        }

        if let Some(content) = content {
            post_active.content = Set(validate_content(content)?);
        }

        post_active.updated_at = Set(Utc::now());

        let updated = post_active.update(&self.db).await?;
        Ok(aggregate::post_view(&self.db, updated).await?)
    }

    /// Delete a post with its comments and likes (only by author)
    pub async fn _delete_post(
        &self,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<(), PostsServiceError> {
        let post = self.find_post(post_id).await?;

        if post.author_id != user_id {
            return Err(PostsServiceError::Unauthorized);
        }

        let txn = self.db.begin().await?;

        let comment_ids: Vec<CommentId> = Comment::find()
            .select_only()
            .column(CommentColumn::Id)
            .filter(CommentColumn::PostId.eq(post_id))
            .into_tuple()
            .all(&txn)
            .await?;

        if !comment_ids.is_empty() {
            CommentLike::delete_many()
                .filter(CommentLikeColumn::CommentId.is_in(comment_ids.iter().copied()))
                .exec(&txn)
                .await?;
            Comment::delete_many()
                .filter(CommentColumn::PostId.eq(post_id))
                .exec(&txn)
                .await?;
        }

        PostLike::delete_many()
            .filter(PostLikeColumn::PostId.eq(post_id))
            .exec(&txn)
            .await?;

        Post::delete_by_id(post_id).exec(&txn).await?;

        txn.commit().await?;

        tracing::info!(%post_id, comments = comment_ids.len(), "deleted post");
        Ok(())
    }

    /// Like a post. Liking twice is a no-op. Returns the like count.
    pub async fn _like_post(&self, post_id: PostId, user_id: UserId) -> Result<u64, PostsServiceError> {
        self.find_post(post_id).await?;
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(PostsServiceError::UserNotFound)?;

        PostLike::insert(PostLikeActiveModel {
            post_id: Set(post_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([PostLikeColumn::PostId, PostLikeColumn::UserId])
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(&self.db)
        .await?;

        self.like_count(post_id).await
    }

    /// Remove a like. Unliking a post that was not liked is a no-op.
    pub async fn _unlike_post(
        &self,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<u64, PostsServiceError> {
        self.find_post(post_id).await?;

        PostLike::delete_many()
            .filter(PostLikeColumn::PostId.eq(post_id))
            .filter(PostLikeColumn::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        self.like_count(post_id).await
    }

    /// Count total posts in a community
    pub async fn _count_posts_in_community(
        &self,
        community_id: CommunityId,
    ) -> Result<u64, PostsServiceError> {
        let count = Post::find()
            .filter(PostColumn::CommunityId.eq(community_id))
            .count(&self.db)
            .await?;

        Ok(count)
    }

    /// Count total posts by a user
    pub async fn _count_posts_by_user(&self, user_id: UserId) -> Result<u64, PostsServiceError> {
        let count = Post::find()
            .filter(PostColumn::AuthorId.eq(user_id))
            .count(&self.db)
            .await?;

        Ok(count)
    }
}

#[zel_service(name = "posts")]
trait Posts {
    #[doc = "Create a new post in a community"]
    #[method(name = "create_post")]
    async fn create_post(
        &self,
        author_id: UserId,
        community_id: CommunityId,
        title: String,
        content: String,
        image_id: Option<String>,
    ) -> Result<PostView, ResourceError>;

    #[doc = "Get a specific post by ID"]
    #[method(name = "get_post")]
    async fn get_post(&self, post_id: PostId) -> Result<PostView, ResourceError>;

    #[doc = "Update a post (only by author)"]
    #[method(name = "update_post")]
    async fn update_post(
        &self,
        post_id: PostId,
        user_id: UserId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<PostView, ResourceError>;

    #[doc = "Delete a post with its comments and likes (only by author)"]
    #[method(name = "delete_post")]
    async fn delete_post(&self, post_id: PostId, user_id: UserId) -> Result<(), ResourceError>;

    #[doc = "Like a post; returns the new like count"]
    #[method(name = "like_post")]
    async fn like_post(&self, post_id: PostId, user_id: UserId) -> Result<u64, ResourceError>;

    #[doc = "Remove a like from a post; returns the new like count"]
    #[method(name = "unlike_post")]
    async fn unlike_post(&self, post_id: PostId, user_id: UserId) -> Result<u64, ResourceError>;
}

#[async_trait]
impl PostsServer for PostsService {
    async fn create_post(
        &self,
        _ctx: RequestContext,
        author_id: UserId,
        community_id: CommunityId,
        title: String,
        content: String,
        image_id: Option<String>,
    ) -> Result<PostView, ResourceError> {
        Ok(self
            ._create_post(author_id, community_id, title, content, image_id)
            .await?)
    }

    async fn get_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
    ) -> Result<PostView, ResourceError> {
        Ok(self._get_post(post_id).await?)
    }

    async fn update_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
        user_id: UserId,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<PostView, ResourceError> {
        Ok(self._update_post(post_id, user_id, title, content).await?)
    }

    async fn delete_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<(), ResourceError> {
        Ok(self._delete_post(post_id, user_id).await?)
    }

    async fn like_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<u64, ResourceError> {
        Ok(self._like_post(post_id, user_id).await?)
    }

    async fn unlike_post(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
        user_id: UserId,
    ) -> Result<u64, ResourceError> {
        Ok(self._unlike_post(post_id, user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        create_comment_at, create_community, create_user, hours_ago, like_comment, setup_test_db,
    };

    async fn setup_test_service() -> (PostsService, UserId, CommunityId) {
        let db = setup_test_db().await;
        let author = create_user(&db, "author").await;
        let community = create_community(&db, author, "Platformers").await;
        (PostsService::new(db), author, community)
    }

    #[tokio::test]
    async fn test_create_post() {
        let (service, author, community) = setup_test_service().await;

        let post = service
            ._create_post(
                author,
                community,
                "  Test Post ".to_string(),
                "This is a test post body".to_string(),
                Some("img-42".to_string()),
            )
            .await
            .expect("Failed to create post");

        assert_eq!(post.title, "Test Post");
        assert_eq!(post.content, "This is a test post body");
        assert!(post.has_media);
        assert_eq!(post.author.id, author);
        assert_eq!(post.community.id, community);
        assert_eq!(post.community.num_users, 1);
        assert_eq!(post.num_likes, 0);
        assert_eq!(post.num_comments, 0);
    }

    #[tokio::test]
    async fn test_create_post_validation() {
        let (service, author, community) = setup_test_service().await;

        let err = service
            ._create_post(author, community, " ".into(), "body".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PostsServiceError::InvalidTitle));

        let err = service
            ._create_post(author, community, "x".repeat(MAX_TITLE_LEN + 1), "body".into(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = service
            ._create_post(author, community, "Title".into(), "   ".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PostsServiceError::EmptyContent));

        let err = service
            ._create_post(author, CommunityId::new(), "Title".into(), "body".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PostsServiceError::CommunityNotFound));
    }

    #[tokio::test]
    async fn test_like_post_is_idempotent() {
        let (service, author, community) = setup_test_service().await;
        let fan = create_user(&service.db, "fan").await;
        let post = service
            ._create_post(author, community, "Title".into(), "Body".into(), None)
            .await
            .unwrap();

        assert_eq!(service._like_post(post.id, fan).await.unwrap(), 1);
        assert_eq!(service._like_post(post.id, fan).await.unwrap(), 1);
        assert_eq!(service._like_post(post.id, author).await.unwrap(), 2);
        assert_eq!(service._get_post(post.id).await.unwrap().num_likes, 2);

        assert_eq!(service._unlike_post(post.id, fan).await.unwrap(), 1);
        assert_eq!(service._unlike_post(post.id, fan).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_post() {
        let (service, author, community) = setup_test_service().await;
        let post = service
            ._create_post(author, community, "Original".into(), "Original Body".into(), None)
            .await
            .unwrap();

        let updated = service
            ._update_post(post.id, author, Some("Updated".into()), None)
            .await
            .unwrap();
        assert_eq!(updated.title, "Updated");
        assert_eq!(updated.content, "Original Body");
        assert!(updated.updated_at >= post.updated_at);

        let other = create_user(&service.db, "other").await;
        let err = service
            ._update_post(post.id, other, Some("Hijacked".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PostsServiceError::Unauthorized));
    }

    #[tokio::test]
    async fn test_delete_post_removes_comments_and_likes() {
        let (service, author, community) = setup_test_service().await;
        let fan = create_user(&service.db, "fan").await;
        let post = service
            ._create_post(author, community, "To Delete".into(), "Body".into(), None)
            .await
            .unwrap();

        service._like_post(post.id, fan).await.unwrap();
        let root = create_comment_at(&service.db, post.id, fan, None, "root", hours_ago(2)).await;
        let reply =
            create_comment_at(&service.db, post.id, author, Some(root), "reply", hours_ago(1)).await;
        like_comment(&service.db, reply, fan).await;

        let err = service._delete_post(post.id, fan).await.unwrap_err();
        assert!(matches!(err, PostsServiceError::Unauthorized));

        service
            ._delete_post(post.id, author)
            .await
            .expect("Author should be able to delete");

        assert!(matches!(
            service._get_post(post.id).await,
            Err(PostsServiceError::PostNotFound)
        ));
        assert_eq!(Comment::find().count(&service.db).await.unwrap(), 0);
        assert_eq!(CommentLike::find().count(&service.db).await.unwrap(), 0);
        assert_eq!(PostLike::find().count(&service.db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counts() {
        let (service, author, community) = setup_test_service().await;
        for i in 0..3 {
            service
                ._create_post(author, community, format!("Post {i}"), format!("Body {i}"), None)
                .await
                .unwrap();
        }

        assert_eq!(service._count_posts_in_community(community).await.unwrap(), 3);
        assert_eq!(service._count_posts_by_user(author).await.unwrap(), 3);
        assert_eq!(service._count_posts_by_user(UserId::new()).await.unwrap(), 0);
    }
}
