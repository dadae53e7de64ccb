pub(crate) mod aggregate;
pub mod comments;
pub mod communities;
pub mod feed;
pub mod posts;
pub mod ratings;
pub mod tokens;
pub mod users;
pub mod views;

use sea_orm::sea_query::LikeExpr;

/// LIMIT and OFFSET are bound as signed 64-bit integers.
pub(crate) const MAX_OFFSET: u64 = i64::MAX as u64;

/// Upper bound on rows returned by the name searches.
pub(crate) const MAX_SEARCH_LIMIT: u64 = 100;

pub(crate) fn page_offset(offset: Option<u64>) -> u64 {
    offset.unwrap_or(0).min(MAX_OFFSET)
}

/// `LIKE` pattern matching `query` anywhere, with `%` and `_` in `query` taken literally.
pub(crate) fn contains_pattern(query: &str) -> LikeExpr {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    LikeExpr::new(pattern).escape('\\')
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{
        comments::CommentsService,
        feed::{FeedContext, FeedService, SortType},
        posts::PostsService,
    };
    use crate::{
        config::{CommentsConfig, FeedConfig},
        test_utils::{create_community, create_post_at, create_user, hours_ago, setup_test_db},
    };

    #[test]
    fn test_page_offset_fits_signed_range() {
        assert_eq!(super::page_offset(None), 0);
        assert_eq!(super::page_offset(Some(7)), 7);
        assert_eq!(super::page_offset(Some(u64::MAX)), i64::MAX as u64);
    }

    #[tokio::test]
    async fn liked_post_with_reply_thread() {
        let db = setup_test_db().await;
        let posts = PostsService::new(db.clone());
        let comments = CommentsService::new(db.clone(), CommentsConfig::default());
        let feed = FeedService::new(db.clone(), FeedConfig::default());

        let user1 = create_user(&db, "user1").await;
        let user2 = create_user(&db, "user2").await;
        let user3 = create_user(&db, "user3").await;
        let community = create_community(&db, user1, "Fighters").await;

        create_post_at(&db, user1, community, "older", hours_ago(2)).await;
        let t0 = Utc::now() - Duration::minutes(5);
        let p = create_post_at(&db, user1, community, "P", t0).await;
        let p = posts._get_post(p).await.unwrap();

        posts._like_post(p.id, user2).await.unwrap();
        posts._like_post(p.id, user3).await.unwrap();

        let c1 = comments
            ._create_comment(user2, p.id, "C1".into(), None)
            .await
            .unwrap();
        let c2 = comments
            ._create_comment(user3, p.id, "C2".into(), Some(c1.id))
            .await
            .unwrap();
        assert!(c1.created_at >= t0 + Duration::minutes(5));

        let tree = comments
            ._get_comment_tree(p.id, None, None, Some(5), None)
            .await
            .unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, c1.id);
        assert_eq!(tree[0].num_likes, 0);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].id, c2.id);
        assert_eq!(tree[0].replies[0].num_likes, 0);
        assert!(tree[0].replies[0].replies.is_empty());

        let top = feed
            ._get_feed(SortType::Top, FeedContext::Community(community), None, None)
            .await
            .unwrap();
        assert_eq!(top[0].id, p.id);
        assert_eq!(top[0].num_likes, 2);
        assert_eq!(top[0].num_comments, 2);
        assert_eq!(top.len(), 2);
    }
}
