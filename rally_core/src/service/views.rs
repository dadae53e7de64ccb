use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    entity::prelude::*,
    ids::{CommentId, CommunityId, GameId, PostId, RatingId, UserId},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub profile_picture_id: Option<String>,
}

impl UserSummary {
    pub(crate) fn from_models(user: &UserModel, profile: Option<&UserProfileModel>) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            profile_picture_id: profile.and_then(|p| p.profile_picture_id.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub bio: String,
    pub profile_picture_id: Option<String>,
    pub num_followers: u64,
    pub num_following: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunitySummary {
    pub id: CommunityId,
    pub name: String,
    pub owner_id: UserId,
    pub game_id: GameId,
    pub num_users: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub image_id: Option<String>,
    pub has_media: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub community: CommunitySummary,
    pub author: UserSummary,
    pub num_comments: u64,
    pub num_likes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: CommentId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<UserSummary>,
    pub parent_id: Option<CommentId>,
    pub post_id: PostId,
    pub num_likes: u64,
}

/// One comment with its replies expanded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub id: CommentId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `None` once the author account has been removed.
    pub author: Option<UserSummary>,
    pub parent_id: Option<CommentId>,
    pub post_id: PostId,
    pub num_likes: u64,
    /// Whether the requesting viewer liked this comment. Always false without a viewer.
    pub liked: bool,
    pub replies: Vec<CommentNode>,
    /// Set when the depth limit cut off replies that do exist.
    pub replies_truncated: bool,
}

impl CommentNode {
    /// Number of nodes in this subtree, including itself.
    pub fn len(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::len).sum::<usize>()
    }

    /// Depth of the deepest node below (and including) this one.
    pub fn depth(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::depth).max().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingView {
    pub id: RatingId,
    pub rating_user_id: UserId,
    pub rated_user_id: UserId,
    pub fields: BTreeMap<RatingFieldName, i32>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub user_id: UserId,
    pub num_ratings: u64,
    /// Mean per field; `None` when no rating carries that field.
    pub averages: BTreeMap<RatingFieldName, Option<f64>>,
}
