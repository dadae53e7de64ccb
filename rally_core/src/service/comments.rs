use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection};
use thiserror::Error;
use zel_core::prelude::*;

use crate::{
    config::CommentsConfig,
    entity::prelude::*,
    error::ErrorKind,
    ids::{CommentId, PostId, UserId},
    service::{
        aggregate, page_offset,
        views::{CommentNode, CommentView, UserSummary},
    },
};

#[derive(Debug, Error)]
pub enum CommentsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("comment not found")]
    CommentNotFound,

    #[error("post not found")]
    PostNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("comment content cannot be empty")]
    EmptyContent,

    #[error("parent comment belongs to a different post")]
    ParentOnOtherPost,

    #[error("max_depth must be at least 1")]
    InvalidMaxDepth,

    #[error("unauthorized: not comment author")]
    Unauthorized,
}

impl CommentsServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommentsServiceError::DbError(_) => ErrorKind::Internal,
            CommentsServiceError::CommentNotFound
            | CommentsServiceError::PostNotFound
            | CommentsServiceError::UserNotFound => ErrorKind::NotFound,
            CommentsServiceError::EmptyContent
            | CommentsServiceError::ParentOnOtherPost
            | CommentsServiceError::InvalidMaxDepth => ErrorKind::InvalidArgument,
            CommentsServiceError::Unauthorized => ErrorKind::NotAuthorized,
        }
    }
}

impl From<CommentsServiceError> for ResourceError {
    fn from(error: CommentsServiceError) -> Self {
        match error {
            CommentsServiceError::DbError(error) => ResourceError::infra(error),
            error => ResourceError::app(error),
        }
    }
}

/// Replies of one post grouped by parent, plus the like and author lookups,
/// so nodes expand without touching the store again.
struct TreeBuilder {
    children: HashMap<CommentId, Vec<CommentModel>>,
    likes: HashMap<CommentId, u64>,
    liked: HashSet<CommentId>,
    authors: HashMap<UserId, UserSummary>,
    max_depth: u32,
}

impl TreeBuilder {
    fn build(&self, root: &CommentModel) -> CommentNode {
        let mut path = HashSet::new();
        self.expand(root, 1, &mut path)
    }

    fn expand(&self, comment: &CommentModel, depth: u32, path: &mut HashSet<CommentId>) -> CommentNode {
        path.insert(comment.id);

        let children = self
            .children
            .get(&comment.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut replies = Vec::new();
        let mut replies_truncated = false;

        if depth >= self.max_depth {
            replies_truncated = !children.is_empty();
        } else {
            for child in children {
                if path.contains(&child.id) {
                    tracing::warn!(
                        comment_id = %child.id,
                        parent_id = %comment.id,
                        "comment cycle detected, treating as leaf"
                    );
                    continue;
                }
                replies.push(self.expand(child, depth + 1, path));
            }
        }

        path.remove(&comment.id);

        CommentNode {
            id: comment.id,
            content: comment.content.clone(),
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            author: comment
                .author_id
                .and_then(|id| self.authors.get(&id).cloned()),
            parent_id: comment.parent_id,
            post_id: comment.post_id,
            num_likes: self.likes.get(&comment.id).copied().unwrap_or(0),
            liked: self.liked.contains(&comment.id),
            replies,
            replies_truncated,
        }
    }
}

fn sort_chronologically(comments: &mut [CommentModel]) {
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Clone)]
pub struct CommentsService {
    db: DatabaseConnection,
    config: CommentsConfig,
}

impl CommentsService {
    pub fn new(db: DatabaseConnection, config: CommentsConfig) -> Self {
        Self { db, config }
    }

    async fn find_comment(&self, comment_id: CommentId) -> Result<CommentModel, CommentsServiceError> {
        Comment::find_by_id(comment_id)
            .one(&self.db)
            .await?
            .ok_or(CommentsServiceError::CommentNotFound)
    }

    async fn ensure_post(&self, post_id: PostId) -> Result<(), CommentsServiceError> {
        Post::find_by_id(post_id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or(CommentsServiceError::PostNotFound)
    }

    fn resolve_max_depth(&self, max_depth: Option<u32>) -> Result<u32, CommentsServiceError> {
        match max_depth.unwrap_or(self.config.default_max_depth) {
            0 => Err(CommentsServiceError::InvalidMaxDepth),
            depth => Ok(depth.min(self.config.max_depth_cap.max(1))),
        }
    }

    async fn comment_view(&self, comment: CommentModel) -> Result<CommentView, CommentsServiceError> {
        let author = match comment.author_id {
            Some(author_id) => aggregate::user_summaries(&self.db, [author_id])
                .await?
                .remove(&author_id),
            None => None,
        };
        let num_likes = aggregate::comment_like_count(&self.db, comment.id).await?;

        Ok(CommentView {
            id: comment.id,
            content: comment.content,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            author,
            parent_id: comment.parent_id,
            post_id: comment.post_id,
            num_likes,
        })
    }

    /// Loads the per-post lookup tables a tree expansion needs.
    async fn tree_builder(
        &self,
        post_id: PostId,
        roots: &[CommentModel],
        max_depth: u32,
        viewer: Option<UserId>,
    ) -> Result<TreeBuilder, CommentsServiceError> {
        let replies = Comment::find()
            .filter(CommentColumn::PostId.eq(post_id))
            .filter(CommentColumn::ParentId.is_not_null())
            .all(&self.db)
            .await?;

        let author_ids: HashSet<UserId> = roots
            .iter()
            .chain(replies.iter())
            .filter_map(|c| c.author_id)
            .collect();

        let mut children: HashMap<CommentId, Vec<CommentModel>> = HashMap::new();
        for reply in replies {
            if let Some(parent_id) = reply.parent_id {
                children.entry(parent_id).or_default().push(reply);
            }
        }
        for siblings in children.values_mut() {
            sort_chronologically(siblings);
        }

        let likes = aggregate::comment_like_counts_for_post(&self.db, post_id).await?;
        let liked = match viewer {
            Some(viewer) => aggregate::comments_liked_by(&self.db, post_id, viewer).await?,
            None => HashSet::new(),
        };
        let authors = aggregate::user_summaries(&self.db, author_ids).await?;

        Ok(TreeBuilder {
            children,
            likes,
            liked,
            authors,
            max_depth,
        })
    }

    /// Create a comment on a post, optionally as a reply
    pub async fn _create_comment(
        &self,
        author_id: UserId,
        post_id: PostId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentView, CommentsServiceError> {
        if content.trim().is_empty() {
            return Err(CommentsServiceError::EmptyContent);
        }

        self.ensure_post(post_id).await?;
        User::find_by_id(author_id)
            .one(&self.db)
            .await?
            .ok_or(CommentsServiceError::UserNotFound)?;

        if let Some(parent_id) = parent_id {
            let parent = self.find_comment(parent_id).await?;
            if parent.post_id != post_id {
                return Err(CommentsServiceError::ParentOnOtherPost);
            }
        }

        let now = Utc::now();
        let comment = Comment::insert(CommentActiveModel {
            id: Set(CommentId::new()),
            content: Set(content),
            post_id: Set(post_id),
            parent_id: Set(parent_id),
            author_id: Set(Some(author_id)),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .exec_with_returning(&self.db)
        .await?;

        tracing::info!(comment_id = %comment.id, %post_id, ?parent_id, "created comment");
        self.comment_view(comment).await
    }

    /// Delete a comment and every reply below it (only by author)
    pub async fn _delete_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<(), CommentsServiceError> {
        let comment = self.find_comment(comment_id).await?;

        if comment.author_id != Some(user_id) {
            return Err(CommentsServiceError::Unauthorized);
        }

        let txn = self.db.begin().await?;

        let edges: Vec<(CommentId, Option<CommentId>)> = Comment::find()
            .select_only()
            .column(CommentColumn::Id)
            .column(CommentColumn::ParentId)
            .filter(CommentColumn::PostId.eq(comment.post_id))
            .into_tuple()
            .all(&txn)
            .await?;

        let mut children: HashMap<CommentId, Vec<CommentId>> = HashMap::new();
        for (id, parent_id) in edges {
            if let Some(parent_id) = parent_id {
                children.entry(parent_id).or_default().push(id);
            }
        }

        let mut subtree: HashSet<CommentId> = HashSet::from([comment_id]);
        let mut queue = VecDeque::from([comment_id]);
        while let Some(id) = queue.pop_front() {
            for child in children.get(&id).into_iter().flatten() {
                if subtree.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }

        CommentLike::delete_many()
            .filter(CommentLikeColumn::CommentId.is_in(subtree.iter().copied()))
            .exec(&txn)
            .await?;
        Comment::delete_many()
            .filter(CommentColumn::Id.is_in(subtree.iter().copied()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        tracing::info!(%comment_id, removed = subtree.len(), "deleted comment");
        Ok(())
    }

    /// Like a comment. Liking twice is a no-op. Returns the like count.
    pub async fn _like_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<u64, CommentsServiceError> {
        self.find_comment(comment_id).await?;
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(CommentsServiceError::UserNotFound)?;

        CommentLike::insert(CommentLikeActiveModel {
            comment_id: Set(comment_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([CommentLikeColumn::CommentId, CommentLikeColumn::UserId])
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(&self.db)
        .await?;

        Ok(aggregate::comment_like_count(&self.db, comment_id).await?)
    }

    /// Remove a like. Unliking a comment that was not liked is a no-op.
    pub async fn _unlike_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<u64, CommentsServiceError> {
        self.find_comment(comment_id).await?;

        CommentLike::delete_many()
            .filter(CommentLikeColumn::CommentId.eq(comment_id))
            .filter(CommentLikeColumn::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        Ok(aggregate::comment_like_count(&self.db, comment_id).await?)
    }

    /// Page of top-level comments on a post, each expanded to `max_depth` levels.
    pub async fn _get_comment_tree(
        &self,
        post_id: PostId,
        limit: Option<u64>,
        offset: Option<u64>,
        max_depth: Option<u32>,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentNode>, CommentsServiceError> {
        self.ensure_post(post_id).await?;
        let max_depth = self.resolve_max_depth(max_depth)?;
        let limit = limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1));

        let roots = Comment::find()
            .filter(CommentColumn::PostId.eq(post_id))
            .filter(CommentColumn::ParentId.is_null())
            .order_by_asc(CommentColumn::CreatedAt)
            .order_by_asc(CommentColumn::Id)
            .limit(limit)
            .offset(page_offset(offset))
            .all(&self.db)
            .await?;

        let builder = self.tree_builder(post_id, &roots, max_depth, viewer).await?;
        let tree: Vec<CommentNode> = roots.iter().map(|root| builder.build(root)).collect();

        tracing::debug!(
            %post_id,
            max_depth,
            roots = tree.len(),
            nodes = tree.iter().map(CommentNode::len).sum::<usize>(),
            "built comment tree"
        );
        Ok(tree)
    }

    /// One comment expanded as the root of its own tree.
    pub async fn _get_comment_thread(
        &self,
        comment_id: CommentId,
        max_depth: Option<u32>,
        viewer: Option<UserId>,
    ) -> Result<CommentNode, CommentsServiceError> {
        let max_depth = self.resolve_max_depth(max_depth)?;
        let root = self.find_comment(comment_id).await?;

        let builder = self
            .tree_builder(root.post_id, std::slice::from_ref(&root), max_depth, viewer)
            .await?;
        Ok(builder.build(&root))
    }
}

#[zel_service(name = "comments")]
trait Comments {
    #[doc = "Create a comment on a post, optionally replying to another comment"]
    #[method(name = "create_comment")]
    async fn create_comment(
        &self,
        author_id: UserId,
        post_id: PostId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentView, ResourceError>;

    #[doc = "Delete a comment and its replies (only by author)"]
    #[method(name = "delete_comment")]
    async fn delete_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<(), ResourceError>;

    #[doc = "Like a comment; returns the new like count"]
    #[method(name = "like_comment")]
    async fn like_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<u64, ResourceError>;

    #[doc = "Remove a like from a comment; returns the new like count"]
    #[method(name = "unlike_comment")]
    async fn unlike_comment(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<u64, ResourceError>;

    #[doc = "Paged top-level comments of a post with replies expanded to max_depth"]
    #[method(name = "get_comment_tree")]
    async fn get_comment_tree(
        &self,
        post_id: PostId,
        limit: Option<u64>,
        offset: Option<u64>,
        max_depth: Option<u32>,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentNode>, ResourceError>;

    #[doc = "A single comment with its replies expanded to max_depth"]
    #[method(name = "get_comment_thread")]
    async fn get_comment_thread(
        &self,
        comment_id: CommentId,
        max_depth: Option<u32>,
        viewer: Option<UserId>,
    ) -> Result<CommentNode, ResourceError>;
}

#[async_trait]
impl CommentsServer for CommentsService {
    async fn create_comment(
        &self,
        _ctx: RequestContext,
        author_id: UserId,
        post_id: PostId,
        content: String,
        parent_id: Option<CommentId>,
    ) -> Result<CommentView, ResourceError> {
        Ok(self
            ._create_comment(author_id, post_id, content, parent_id)
            .await?)
    }

    async fn delete_comment(
        &self,
        _ctx: RequestContext,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<(), ResourceError> {
        Ok(self._delete_comment(comment_id, user_id).await?)
    }

    async fn like_comment(
        &self,
        _ctx: RequestContext,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<u64, ResourceError> {
        Ok(self._like_comment(comment_id, user_id).await?)
    }

    async fn unlike_comment(
        &self,
        _ctx: RequestContext,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<u64, ResourceError> {
        Ok(self._unlike_comment(comment_id, user_id).await?)
    }

    async fn get_comment_tree(
        &self,
        _ctx: RequestContext,
        post_id: PostId,
        limit: Option<u64>,
        offset: Option<u64>,
        max_depth: Option<u32>,
        viewer: Option<UserId>,
    ) -> Result<Vec<CommentNode>, ResourceError> {
        Ok(self
            ._get_comment_tree(post_id, limit, offset, max_depth, viewer)
            .await?)
    }

    async fn get_comment_thread(
        &self,
        _ctx: RequestContext,
        comment_id: CommentId,
        max_depth: Option<u32>,
        viewer: Option<UserId>,
    ) -> Result<CommentNode, ResourceError> {
        Ok(self
            ._get_comment_thread(comment_id, max_depth, viewer)
            .await?)
    }
}
