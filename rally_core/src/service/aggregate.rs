use std::collections::{HashMap, HashSet};

use sea_orm::{sea_query::Expr, FromQueryResult};

use crate::{
    entity::{self, prelude::*},
    ids::{CommentId, CommunityId, PostId, UserId},
    service::views::{CommunitySummary, PostView, UserSummary},
};

#[derive(Debug, FromQueryResult)]
struct PostCount {
    post_id: PostId,
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct CommentCount {
    comment_id: CommentId,
    count: i64,
}

#[derive(Debug, FromQueryResult)]
struct MemberCount {
    community_id: CommunityId,
    count: i64,
}

fn into_map<K: std::hash::Hash + Eq>(rows: impl IntoIterator<Item = (K, i64)>) -> HashMap<K, u64> {
    rows.into_iter()
        .map(|(key, count)| (key, u64::try_from(count).unwrap_or(0)))
        .collect()
}

/// Like counts for the given posts. Posts without likes are absent.
pub(crate) async fn post_like_counts<C: ConnectionTrait>(
    conn: &C,
    post_ids: &[PostId],
) -> Result<HashMap<PostId, u64>, DbErr> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = PostLike::find()
        .select_only()
        .column(PostLikeColumn::PostId)
        .column_as(Expr::col((PostLike, PostLikeColumn::UserId)).count(), "count")
        .filter(PostLikeColumn::PostId.is_in(post_ids.iter().copied()))
        .group_by(PostLikeColumn::PostId)
        .into_model::<PostCount>()
        .all(conn)
        .await?;

    Ok(into_map(rows.into_iter().map(|r| (r.post_id, r.count))))
}

/// Like counts for every liked post matching `posts`, a condition over post
/// columns. Used to rank a whole feed context in one query.
pub(crate) async fn post_like_counts_where<C: ConnectionTrait>(
    conn: &C,
    posts: Condition,
) -> Result<HashMap<PostId, u64>, DbErr> {
    let rows = PostLike::find()
        .select_only()
        .column(PostLikeColumn::PostId)
        .column_as(Expr::col((PostLike, PostLikeColumn::UserId)).count(), "count")
        .join(JoinType::InnerJoin, entity::post_like::Relation::Post.def())
        .filter(posts)
        .group_by(PostLikeColumn::PostId)
        .into_model::<PostCount>()
        .all(conn)
        .await?;

    Ok(into_map(rows.into_iter().map(|r| (r.post_id, r.count))))
}

pub(crate) async fn post_comment_counts<C: ConnectionTrait>(
    conn: &C,
    post_ids: &[PostId],
) -> Result<HashMap<PostId, u64>, DbErr> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = Comment::find()
        .select_only()
        .column(CommentColumn::PostId)
        .column_as(Expr::col((Comment, CommentColumn::Id)).count(), "count")
        .filter(CommentColumn::PostId.is_in(post_ids.iter().copied()))
        .group_by(CommentColumn::PostId)
        .into_model::<PostCount>()
        .all(conn)
        .await?;

    Ok(into_map(rows.into_iter().map(|r| (r.post_id, r.count))))
}

/// Like counts for every liked comment on a post.
pub(crate) async fn comment_like_counts_for_post<C: ConnectionTrait>(
    conn: &C,
    post_id: PostId,
) -> Result<HashMap<CommentId, u64>, DbErr> {
    let rows = CommentLike::find()
        .select_only()
        .column(CommentLikeColumn::CommentId)
        .column_as(Expr::col((CommentLike, CommentLikeColumn::UserId)).count(), "count")
        .join(JoinType::InnerJoin, entity::comment_like::Relation::Comment.def())
        .filter(CommentColumn::PostId.eq(post_id))
        .group_by(CommentLikeColumn::CommentId)
        .into_model::<CommentCount>()
        .all(conn)
        .await?;

    Ok(into_map(rows.into_iter().map(|r| (r.comment_id, r.count))))
}

pub(crate) async fn comment_like_count<C: ConnectionTrait>(
    conn: &C,
    comment_id: CommentId,
) -> Result<u64, DbErr> {
    CommentLike::find()
        .filter(CommentLikeColumn::CommentId.eq(comment_id))
        .count(conn)
        .await
}

/// Comments on `post_id` that `user_id` has liked.
pub(crate) async fn comments_liked_by<C: ConnectionTrait>(
    conn: &C,
    post_id: PostId,
    user_id: UserId,
) -> Result<HashSet<CommentId>, DbErr> {
    let liked: Vec<CommentId> = CommentLike::find()
        .select_only()
        .column(CommentLikeColumn::CommentId)
        .join(JoinType::InnerJoin, entity::comment_like::Relation::Comment.def())
        .filter(CommentColumn::PostId.eq(post_id))
        .filter(CommentLikeColumn::UserId.eq(user_id))
        .into_tuple()
        .all(conn)
        .await?;

    Ok(liked.into_iter().collect())
}

pub(crate) async fn user_summaries<C: ConnectionTrait>(
    conn: &C,
    user_ids: impl IntoIterator<Item = UserId>,
) -> Result<HashMap<UserId, UserSummary>, DbErr> {
    let ids: HashSet<UserId> = user_ids.into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let users = User::find()
        .filter(UserColumn::Id.is_in(ids))
        .find_also_related(UserProfile)
        .all(conn)
        .await?;

    Ok(users
        .iter()
        .map(|(user, profile)| (user.id, UserSummary::from_models(user, profile.as_ref())))
        .collect())
}

pub(crate) async fn community_member_counts<C: ConnectionTrait>(
    conn: &C,
    community_ids: &[CommunityId],
) -> Result<HashMap<CommunityId, u64>, DbErr> {
    if community_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = CommunityMember::find()
        .select_only()
        .column(CommunityMemberColumn::CommunityId)
        .column_as(
            Expr::col((CommunityMember, CommunityMemberColumn::UserId)).count(),
            "count",
        )
        .filter(CommunityMemberColumn::CommunityId.is_in(community_ids.iter().copied()))
        .group_by(CommunityMemberColumn::CommunityId)
        .into_model::<MemberCount>()
        .all(conn)
        .await?;

    Ok(into_map(rows.into_iter().map(|r| (r.community_id, r.count))))
}

pub(crate) fn community_summary(community: &CommunityModel, num_users: u64) -> CommunitySummary {
    CommunitySummary {
        id: community.id,
        name: community.name.clone(),
        owner_id: community.owner_id,
        game_id: community.game_id,
        num_users,
    }
}

pub(crate) async fn community_summaries<C: ConnectionTrait>(
    conn: &C,
    community_ids: impl IntoIterator<Item = CommunityId>,
) -> Result<HashMap<CommunityId, CommunitySummary>, DbErr> {
    let ids: Vec<CommunityId> = community_ids
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let communities = Community::find()
        .filter(CommunityColumn::Id.is_in(ids.iter().copied()))
        .all(conn)
        .await?;
    let members = community_member_counts(conn, &ids).await?;

    Ok(communities
        .iter()
        .map(|c| {
            let num_users = members.get(&c.id).copied().unwrap_or(0);
            (c.id, community_summary(c, num_users))
        })
        .collect())
}

/// Renders posts into views, keeping the input order.
pub(crate) async fn post_views<C: ConnectionTrait>(
    conn: &C,
    posts: Vec<PostModel>,
) -> Result<Vec<PostView>, DbErr> {
    let post_ids: Vec<PostId> = posts.iter().map(|p| p.id).collect();

    let authors = user_summaries(conn, posts.iter().map(|p| p.author_id)).await?;
    let communities = community_summaries(conn, posts.iter().map(|p| p.community_id)).await?;
    let likes = post_like_counts(conn, &post_ids).await?;
    let comments = post_comment_counts(conn, &post_ids).await?;

    posts
        .into_iter()
        .map(|post| {
            let author = authors.get(&post.author_id).cloned().ok_or_else(|| {
                DbErr::RecordNotFound(format!("author {} of post {}", post.author_id, post.id))
            })?;
            let community = communities.get(&post.community_id).cloned().ok_or_else(|| {
                DbErr::RecordNotFound(format!(
                    "community {} of post {}",
                    post.community_id, post.id
                ))
            })?;

            Ok(PostView {
                id: post.id,
                has_media: post.image_id.is_some(),
                image_id: post.image_id,
                title: post.title,
                content: post.content,
                created_at: post.created_at,
                updated_at: post.updated_at,
                community,
                author,
                num_comments: comments.get(&post.id).copied().unwrap_or(0),
                num_likes: likes.get(&post.id).copied().unwrap_or(0),
            })
        })
        .collect()
}

pub(crate) async fn post_view<C: ConnectionTrait>(
    conn: &C,
    post: PostModel,
) -> Result<PostView, DbErr> {
    let id = post.id;
    post_views(conn, vec![post])
        .await?
        .pop()
        .ok_or_else(|| DbErr::RecordNotFound(format!("post {id}")))
}
