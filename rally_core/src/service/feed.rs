use std::{collections::HashMap, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zel_core::prelude::*;

use crate::{
    config::FeedConfig,
    entity::prelude::*,
    error::ErrorKind,
    ids::{CommunityId, PostId, UserId},
    service::{aggregate, page_offset, views::PostView},
};

#[derive(Debug, Error)]
pub enum FeedServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("unknown sort type: {0}")]
    InvalidSortType(String),

    #[error("exactly one of current_user, community or author must be given (got {0})")]
    InvalidContext(usize),

    #[error("user not found")]
    UserNotFound,

    #[error("community not found")]
    CommunityNotFound,
}

impl FeedServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedServiceError::DbError(_) => ErrorKind::Internal,
            FeedServiceError::InvalidSortType(_) | FeedServiceError::InvalidContext(_) => {
                ErrorKind::InvalidArgument
            }
            FeedServiceError::UserNotFound | FeedServiceError::CommunityNotFound => {
                ErrorKind::NotFound
            }
        }
    }
}

impl From<FeedServiceError> for ResourceError {
    fn from(error: FeedServiceError) -> Self {
        match error {
            FeedServiceError::DbError(error) => ResourceError::infra(error),
            error => ResourceError::app(error),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    New,
    Top,
    #[default]
    Hot,
}

impl SortType {
    /// Parses an optional query value; absent means [`SortType::Hot`].
    pub fn parse_optional(value: Option<&str>) -> Result<Self, FeedServiceError> {
        value.map_or(Ok(SortType::default()), str::parse)
    }
}

impl FromStr for SortType {
    type Err = FeedServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SortType::New),
            "top" => Ok(SortType::Top),
            "hot" => Ok(SortType::Hot),
            other => Err(FeedServiceError::InvalidSortType(other.to_string())),
        }
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortType::New => "new",
            SortType::Top => "top",
            SortType::Hot => "hot",
        })
    }
}

/// Which posts a feed is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum FeedContext {
    /// Posts from the user's communities plus posts by users they follow.
    Home(UserId),
    Community(CommunityId),
    Author(UserId),
}

impl FeedContext {
    /// Builds a context from the three mutually exclusive selectors.
    pub fn from_selectors(
        current_user: Option<UserId>,
        community: Option<CommunityId>,
        author: Option<UserId>,
    ) -> Result<Self, FeedServiceError> {
        match (current_user, community, author) {
            (Some(user), None, None) => Ok(FeedContext::Home(user)),
            (None, Some(community), None) => Ok(FeedContext::Community(community)),
            (None, None, Some(author)) => Ok(FeedContext::Author(author)),
            _ => {
                let given = [current_user.is_some(), community.is_some(), author.is_some()]
                    .into_iter()
                    .filter(|given| *given)
                    .count();
                Err(FeedServiceError::InvalidContext(given))
            }
        }
    }
}

/// `log10(max(likes, 1)) * 2 - age_hours^1.8`. Posts dated in the future count as age 0.
pub fn hot_score(likes: u64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_hours = ((now - created_at).num_milliseconds() as f64 / 3_600_000.0).max(0.0);
    (likes.max(1) as f64).log10() * 2.0 - age_hours.powf(1.8)
}

struct Candidate {
    id: PostId,
    created_at: DateTime<Utc>,
    likes: u64,
}

/// Orders candidates best first; equal keys fall back to newest id first.
fn rank(candidates: &mut [Candidate], sort: SortType, now: DateTime<Utc>) {
    match sort {
        SortType::New => candidates.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        }),
        SortType::Top => {
            candidates.sort_by(|a, b| b.likes.cmp(&a.likes).then_with(|| b.id.cmp(&a.id)))
        }
        SortType::Hot => candidates.sort_by(|a, b| {
            hot_score(b.likes, b.created_at, now)
                .total_cmp(&hot_score(a.likes, a.created_at, now))
                .then_with(|| b.id.cmp(&a.id))
        }),
    }
}

/// Ranked, paged post listings for a single viewing context.
///
/// `new` pages directly in SQL. `top` and `hot` rank `(id, created_at)` plus
/// one grouped like-count query in memory, then load only the page's posts.
#[derive(Clone)]
pub struct FeedService {
    db: DatabaseConnection,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(db: DatabaseConnection, config: FeedConfig) -> Self {
        Self { db, config }
    }

    /// Condition over post columns selecting the context's posts.
    async fn context_condition(
        &self,
        context: FeedContext,
    ) -> Result<Condition, FeedServiceError> {
        match context {
            FeedContext::Home(user_id) => {
                User::find_by_id(user_id)
                    .one(&self.db)
                    .await?
                    .ok_or(FeedServiceError::UserNotFound)?;

                let communities = CommunityMember::find()
                    .select_only()
                    .column(CommunityMemberColumn::CommunityId)
                    .filter(CommunityMemberColumn::UserId.eq(user_id))
                    .into_query();
                let followed = UserFollow::find()
                    .select_only()
                    .column(UserFollowColumn::FollowedId)
                    .filter(UserFollowColumn::FollowerId.eq(user_id))
                    .into_query();

                Ok(Condition::any()
                    .add(PostColumn::CommunityId.in_subquery(communities))
                    .add(PostColumn::AuthorId.in_subquery(followed)))
            }
            FeedContext::Community(community_id) => {
                Community::find_by_id(community_id)
                    .one(&self.db)
                    .await?
                    .ok_or(FeedServiceError::CommunityNotFound)?;
                Ok(Condition::all().add(PostColumn::CommunityId.eq(community_id)))
            }
            FeedContext::Author(author_id) => {
                User::find_by_id(author_id)
                    .one(&self.db)
                    .await?
                    .ok_or(FeedServiceError::UserNotFound)?;
                Ok(Condition::all().add(PostColumn::AuthorId.eq(author_id)))
            }
        }
    }

    pub async fn _get_feed(
        &self,
        sort: SortType,
        context: FeedContext,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<PostView>, FeedServiceError> {
        self.feed_at(sort, context, limit, offset, Utc::now()).await
    }

    async fn feed_at(
        &self,
        sort: SortType,
        context: FeedContext,
        limit: Option<u64>,
        offset: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PostView>, FeedServiceError> {
        let limit = limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit.max(1));
        let offset = page_offset(offset);
        let condition = self.context_condition(context).await?;

        let posts = match sort {
            SortType::New => {
                Post::find()
                    .filter(condition)
                    .order_by_desc(PostColumn::CreatedAt)
                    .order_by_desc(PostColumn::Id)
                    .limit(limit)
                    .offset(offset)
                    .all(&self.db)
                    .await?
            }
            SortType::Top | SortType::Hot => {
                let page = self
                    .ranked_page(condition, sort, limit, offset, now)
                    .await?;
                self.load_in_order(&page).await?
            }
        };

        tracing::debug!(?context, %sort, limit, offset, returned = posts.len(), "built feed");
        Ok(aggregate::post_views(&self.db, posts).await?)
    }

    async fn ranked_page(
        &self,
        condition: Condition,
        sort: SortType,
        limit: u64,
        offset: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<PostId>, FeedServiceError> {
        let condition = match self.config.ranking_window_days {
            Some(days) => Condition::all()
                .add(condition)
                .add(PostColumn::CreatedAt.gte(now - Duration::days(days.into()))),
            None => condition,
        };

        let rows: Vec<(PostId, DateTime<Utc>)> = Post::find()
            .select_only()
            .column(PostColumn::Id)
            .column(PostColumn::CreatedAt)
            .filter(condition.clone())
            .into_tuple()
            .all(&self.db)
            .await?;

        let likes = aggregate::post_like_counts_where(&self.db, condition).await?;

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .map(|(id, created_at)| Candidate {
                id,
                created_at,
                likes: likes.get(&id).copied().unwrap_or(0),
            })
            .collect();
        rank(&mut candidates, sort, now);

        Ok(candidates
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(|c| c.id)
            .collect())
    }

    async fn load_in_order(&self, ids: &[PostId]) -> Result<Vec<PostModel>, FeedServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<PostId, PostModel> = Post::find()
            .filter(PostColumn::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|post| (post.id, post))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

#[zel_service(name = "feed")]
trait Feed {
    #[doc = "Ranked posts for exactly one of current_user, community or author"]
    #[method(name = "get_feed")]
    async fn get_feed(
        &self,
        sort: Option<String>,
        current_user: Option<UserId>,
        community: Option<CommunityId>,
        author: Option<UserId>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<PostView>, ResourceError>;
}

#[async_trait]
impl FeedServer for FeedService {
    async fn get_feed(
        &self,
        _ctx: RequestContext,
        sort: Option<String>,
        current_user: Option<UserId>,
        community: Option<CommunityId>,
        author: Option<UserId>,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<PostView>, ResourceError> {
        let sort = SortType::parse_optional(sort.as_deref())?;
        let context = FeedContext::from_selectors(current_user, community, author)?;
        Ok(self._get_feed(sort, context, limit, offset).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        create_comment_at, create_community, create_post_at, create_user, follow, hours_ago,
        join, like_post, setup_test_db,
    };
    async fn setup_test_service() -> FeedService {
        FeedService::new(setup_test_db().await, FeedConfig::default())
    }

    async fn like_n(db: &DatabaseConnection, post: PostId, n: usize) {
        for i in 0..n {
            let fan = create_user(db, &format!("fan-{post}-{i}")).await;
            like_post(db, post, fan).await;
        }
    }

    fn ids(posts: &[PostView]) -> Vec<PostId> {
        posts.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_sort_type_parsing() {
        assert_eq!(SortType::parse_optional(None).unwrap(), SortType::Hot);
        assert_eq!(SortType::parse_optional(Some("new")).unwrap(), SortType::New);
        assert_eq!("top".parse::<SortType>().unwrap(), SortType::Top);

        let err = "best".parse::<SortType>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_context_requires_exactly_one_selector() {
        let user = UserId::new();
        let community = CommunityId::new();

        assert_eq!(
            FeedContext::from_selectors(Some(user), None, None).unwrap(),
            FeedContext::Home(user)
        );
        assert_eq!(
            FeedContext::from_selectors(None, Some(community), None).unwrap(),
            FeedContext::Community(community)
        );
        assert_eq!(
            FeedContext::from_selectors(None, None, Some(user)).unwrap(),
            FeedContext::Author(user)
        );

        for (current, comm, author) in [
            (None, None, None),
            (Some(user), Some(community), None),
            (Some(user), None, Some(user)),
            (None, Some(community), Some(user)),
            (Some(user), Some(community), Some(user)),
        ] {
            let err = FeedContext::from_selectors(current, comm, author).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_hot_score() {
        let now = Utc::now();

        // One like and zero likes both contribute log10(1) = 0.
        assert_eq!(hot_score(0, now, now), 0.0);
        assert_eq!(hot_score(1, now, now), 0.0);
        assert!((hot_score(100, now, now) - 4.0).abs() < 1e-9);

        let one_hour = hot_score(0, now - Duration::hours(1), now);
        assert!((one_hour + 1.0).abs() < 1e-9);

        // Future timestamps are not rewarded.
        assert_eq!(hot_score(10, now + Duration::hours(5), now), hot_score(10, now, now));

        assert!(hot_score(10, now - Duration::hours(1), now) > hot_score(10, now - Duration::hours(48), now));
    }

    #[tokio::test]
    async fn test_hot_prefers_recent_posts() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Shooters").await;

        let old = create_post_at(&service.db, author, community, "old", hours_ago(48)).await;
        let fresh = create_post_at(&service.db, author, community, "fresh", hours_ago(1)).await;
        like_n(&service.db, old, 10).await;
        like_n(&service.db, fresh, 10).await;

        let feed = service
            ._get_feed(SortType::Hot, FeedContext::Community(community), None, None)
            .await
            .unwrap();
        assert_eq!(ids(&feed), vec![fresh, old]);
        assert_eq!(feed[0].num_likes, 10);
    }

    #[tokio::test]
    async fn test_hot_matches_score_order() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Shooters").await;
        let now = Utc::now();

        let specs = [(2, 0), (3, 100), (1, 1), (6, 200), (0, 0)];
        let mut expected = Vec::new();
        for (i, (age, likes)) in specs.into_iter().enumerate() {
            let created_at = now - Duration::hours(age);
            let post = create_post_at(&service.db, author, community, &format!("p{i}"), created_at).await;
            like_n(&service.db, post, likes).await;
            expected.push((hot_score(likes as u64, created_at, now), post));
        }
        expected.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

        let feed = service
            .feed_at(SortType::Hot, FeedContext::Community(community), Some(10), None, now)
            .await
            .unwrap();
        assert_eq!(ids(&feed), expected.into_iter().map(|(_, id)| id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_new_ignores_likes() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Racers").await;

        let oldest = create_post_at(&service.db, author, community, "a", hours_ago(30)).await;
        let middle = create_post_at(&service.db, author, community, "b", hours_ago(20)).await;
        let newest = create_post_at(&service.db, author, community, "c", hours_ago(10)).await;
        like_n(&service.db, oldest, 3).await;

        let feed = service
            ._get_feed(SortType::New, FeedContext::Community(community), None, None)
            .await
            .unwrap();
        assert_eq!(ids(&feed), vec![newest, middle, oldest]);
    }

    #[tokio::test]
    async fn test_top_orders_by_likes_and_keeps_unliked_posts() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Racers").await;

        let unliked = create_post_at(&service.db, author, community, "a", hours_ago(1)).await;
        let one = create_post_at(&service.db, author, community, "b", hours_ago(50)).await;
        let three = create_post_at(&service.db, author, community, "c", hours_ago(99)).await;
        like_n(&service.db, one, 1).await;
        like_n(&service.db, three, 3).await;

        let feed = service
            ._get_feed(SortType::Top, FeedContext::Community(community), None, None)
            .await
            .unwrap();
        assert_eq!(ids(&feed), vec![three, one, unliked]);
        let likes: Vec<u64> = feed.iter().map(|p| p.num_likes).collect();
        assert_eq!(likes, vec![3, 1, 0]);
    }

    #[tokio::test]
    async fn test_pagination_is_stable() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Racers").await;

        let created_at = hours_ago(3);
        for i in 0..5 {
            create_post_at(&service.db, author, community, &format!("p{i}"), created_at).await;
        }

        for sort in [SortType::New, SortType::Top, SortType::Hot] {
            let all = service
                ._get_feed(sort, FeedContext::Community(community), Some(5), None)
                .await
                .unwrap();
            let first = service
                ._get_feed(sort, FeedContext::Community(community), Some(2), Some(0))
                .await
                .unwrap();
            let rest = service
                ._get_feed(sort, FeedContext::Community(community), Some(3), Some(2))
                .await
                .unwrap();

            let mut paged = ids(&first);
            paged.extend(ids(&rest));
            assert_eq!(paged, ids(&all), "sort {sort}");
        }
    }

    #[tokio::test]
    async fn test_home_feed_unions_without_duplicates() {
        let service = setup_test_service().await;
        let viewer = create_user(&service.db, "viewer").await;
        let friend = create_user(&service.db, "friend").await;
        let stranger = create_user(&service.db, "stranger").await;

        let joined = create_community(&service.db, stranger, "Joined").await;
        let other = create_community(&service.db, stranger, "Other").await;
        join(&service.db, viewer, joined).await;
        follow(&service.db, viewer, friend).await;

        // In a joined community and by a followed user: must appear once.
        let both = create_post_at(&service.db, friend, joined, "both", hours_ago(1)).await;
        let by_friend = create_post_at(&service.db, friend, other, "friend", hours_ago(2)).await;
        let in_joined = create_post_at(&service.db, stranger, joined, "joined", hours_ago(3)).await;
        create_post_at(&service.db, stranger, other, "unrelated", hours_ago(4)).await;

        let feed = service
            ._get_feed(SortType::New, FeedContext::Home(viewer), None, None)
            .await
            .unwrap();
        assert_eq!(ids(&feed), vec![both, by_friend, in_joined]);

        let top = service
            ._get_feed(SortType::Top, FeedContext::Home(viewer), None, None)
            .await
            .unwrap();
        assert_eq!(top.len(), 3);
    }

    #[tokio::test]
    async fn test_author_feed_and_counts() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let other = create_user(&service.db, "other").await;
        let community = create_community(&service.db, author, "Racers").await;

        let post = create_post_at(&service.db, author, community, "mine", hours_ago(1)).await;
        create_post_at(&service.db, other, community, "theirs", hours_ago(1)).await;
        create_comment_at(&service.db, post, other, None, "nice", hours_ago(0)).await;
        like_post(&service.db, post, other).await;

        let feed = service
            ._get_feed(SortType::Hot, FeedContext::Author(author), None, None)
            .await
            .unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, post);
        assert_eq!(feed[0].num_comments, 1);
        assert_eq!(feed[0].num_likes, 1);
        assert_eq!(feed[0].author.username, "author");
        assert_eq!(feed[0].community.name, "Racers");
    }

    #[tokio::test]
    async fn test_offset_beyond_signed_range_is_empty() {
        let service = setup_test_service().await;
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Racers").await;
        create_post_at(&service.db, author, community, "only", hours_ago(1)).await;

        for sort in [SortType::New, SortType::Top, SortType::Hot] {
            let feed = service
                ._get_feed(sort, FeedContext::Community(community), None, Some(u64::MAX))
                .await
                .unwrap();
            assert!(feed.is_empty(), "sort {sort}");
        }
    }

    #[tokio::test]
    async fn test_ranking_window_excludes_old_posts() {
        let service = FeedService::new(
            setup_test_db().await,
            FeedConfig {
                ranking_window_days: Some(1),
                ..FeedConfig::default()
            },
        );
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Racers").await;

        let old = create_post_at(&service.db, author, community, "old", hours_ago(48)).await;
        let fresh = create_post_at(&service.db, author, community, "fresh", hours_ago(2)).await;
        like_n(&service.db, old, 5).await;

        let ctx = FeedContext::Community(community);
        for sort in [SortType::Top, SortType::Hot] {
            let feed = service._get_feed(sort, ctx, None, None).await.unwrap();
            assert_eq!(ids(&feed), vec![fresh], "sort {sort}");
        }

        let newest = service._get_feed(SortType::New, ctx, None, None).await.unwrap();
        assert_eq!(ids(&newest), vec![fresh, old]);
    }

    #[tokio::test]
    async fn test_missing_context_entity() {
        let service = setup_test_service().await;

        let err = service
            ._get_feed(SortType::New, FeedContext::Community(CommunityId::new()), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedServiceError::CommunityNotFound));

        let err = service
            ._get_feed(SortType::Hot, FeedContext::Home(UserId::new()), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let service = FeedService::new(
            setup_test_db().await,
            FeedConfig {
                default_limit: 2,
                max_limit: 3,
                ..FeedConfig::default()
            },
        );
        let author = create_user(&service.db, "author").await;
        let community = create_community(&service.db, author, "Racers").await;
        for i in 0..5 {
            create_post_at(&service.db, author, community, &format!("p{i}"), hours_ago(i)).await;
        }

        let ctx = FeedContext::Community(community);
        assert_eq!(service._get_feed(SortType::New, ctx, None, None).await.unwrap().len(), 2);
        assert_eq!(service._get_feed(SortType::Top, ctx, Some(50), None).await.unwrap().len(), 3);
        assert_eq!(service._get_feed(SortType::Hot, ctx, Some(0), None).await.unwrap().len(), 1);
        assert!(service._get_feed(SortType::New, ctx, None, Some(10)).await.unwrap().is_empty());
    }
}
