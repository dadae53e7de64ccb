use chrono::{DateTime, Utc};
use sea_orm::{sea_query::OnConflict, DatabaseConnection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    entity::prelude::*,
    error::{is_unique_violation, ErrorKind},
    ids::{CommunityId, GameId, UserId},
    service::{
        aggregate, contains_pattern,
        views::{CommunitySummary, UserSummary},
        MAX_SEARCH_LIMIT,
    },
};

pub const MAX_COMMUNITY_NAME_LEN: usize = 80;

#[derive(Debug, Error)]
pub enum CommunitiesServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("community not found")]
    CommunityNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("community name is already taken")]
    NameTaken,

    #[error("community name must be between 1 and {MAX_COMMUNITY_NAME_LEN} characters")]
    InvalidName,

    #[error("the owner cannot leave their own community")]
    OwnerCannotLeave,
}

impl CommunitiesServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CommunitiesServiceError::DbError(_) => ErrorKind::Internal,
            CommunitiesServiceError::CommunityNotFound | CommunitiesServiceError::UserNotFound => {
                ErrorKind::NotFound
            }
            CommunitiesServiceError::NameTaken => ErrorKind::Conflict,
            CommunitiesServiceError::InvalidName => ErrorKind::InvalidArgument,
            CommunitiesServiceError::OwnerCannotLeave => ErrorKind::NotAuthorized,
        }
    }
}

/// Game metadata as cached from the external catalogue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub name: String,
    pub cover: Option<String>,
    pub artwork: Option<String>,
    pub summary: String,
    pub first_release_date: Option<DateTime<Utc>>,
}

impl From<GameRecord> for GameActiveModel {
    fn from(game: GameRecord) -> Self {
        GameActiveModel {
            id: Set(game.id),
            name: Set(game.name),
            cover: Set(game.cover),
            artwork: Set(game.artwork),
            summary: Set(game.summary),
            first_release_date: Set(game.first_release_date),
        }
    }
}

#[derive(Clone)]
pub struct CommunitiesService {
    db: DatabaseConnection,
}

impl CommunitiesService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_community(
        &self,
        community_id: CommunityId,
    ) -> Result<CommunityModel, CommunitiesServiceError> {
        Community::find_by_id(community_id)
            .one(&self.db)
            .await?
            .ok_or(CommunitiesServiceError::CommunityNotFound)
    }

    async fn ensure_user(&self, user_id: UserId) -> Result<(), CommunitiesServiceError> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or(CommunitiesServiceError::UserNotFound)
    }

    async fn member_count(&self, community_id: CommunityId) -> Result<u64, CommunitiesServiceError> {
        Ok(CommunityMember::find()
            .filter(CommunityMemberColumn::CommunityId.eq(community_id))
            .count(&self.db)
            .await?)
    }

    /// Creates a community for `game` with `owner_id` as its first member.
    pub async fn create_community(
        &self,
        owner_id: UserId,
        name: &str,
        game: GameRecord,
    ) -> Result<CommunitySummary, CommunitiesServiceError> {
        let name = name.trim();
        let len = name.chars().count();
        if len == 0 || len > MAX_COMMUNITY_NAME_LEN {
            return Err(CommunitiesServiceError::InvalidName);
        }
        self.ensure_user(owner_id).await?;

        let txn = self.db.begin().await?;

        Game::insert(GameActiveModel::from(game.clone()))
            .on_conflict(
                OnConflict::column(GameColumn::Id)
                    .update_columns([
                        GameColumn::Name,
                        GameColumn::Cover,
                        GameColumn::Artwork,
                        GameColumn::Summary,
                        GameColumn::FirstReleaseDate,
                    ])
                    .to_owned(),
            )
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let community = Community::insert(CommunityActiveModel {
            id: Set(CommunityId::new()),
            name: Set(name.to_string()),
            owner_id: Set(owner_id),
            game_id: Set(game.id),
            created_at: Set(now),
        })
        .exec_with_returning(&txn)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                CommunitiesServiceError::NameTaken
            } else {
                CommunitiesServiceError::DbError(err)
            }
        })?;

        CommunityMember::insert(CommunityMemberActiveModel {
            community_id: Set(community.id),
            user_id: Set(owner_id),
            joined_at: Set(now),
        })
        .exec(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(community_id = %community.id, name = %community.name, game_id = game.id, "created community");
        Ok(aggregate::community_summary(&community, 1))
    }

    pub async fn get_community(
        &self,
        community_id: CommunityId,
    ) -> Result<CommunitySummary, CommunitiesServiceError> {
        let community = self.find_community(community_id).await?;
        let num_users = self.member_count(community_id).await?;
        Ok(aggregate::community_summary(&community, num_users))
    }

    pub async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, CommunitiesServiceError> {
        Ok(Game::find_by_id(game_id).one(&self.db).await?)
    }

    pub async fn search_communities(
        &self,
        query: &str,
        limit: u64,
    ) -> Result<Vec<CommunitySummary>, CommunitiesServiceError> {
        let communities = Community::find()
            .filter(CommunityColumn::Name.like(contains_pattern(query.trim())))
            .order_by_asc(CommunityColumn::Name)
            .limit(limit.min(MAX_SEARCH_LIMIT))
            .all(&self.db)
            .await?;

        let ids: Vec<CommunityId> = communities.iter().map(|c| c.id).collect();
        let members = aggregate::community_member_counts(&self.db, &ids).await?;

        Ok(communities
            .iter()
            .map(|c| aggregate::community_summary(c, members.get(&c.id).copied().unwrap_or(0)))
            .collect())
    }

    /// Returns the member count afterwards. Joining twice is a no-op.
    pub async fn join_community(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<u64, CommunitiesServiceError> {
        self.find_community(community_id).await?;
        self.ensure_user(user_id).await?;

        CommunityMember::insert(CommunityMemberActiveModel {
            community_id: Set(community_id),
            user_id: Set(user_id),
            joined_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([
                CommunityMemberColumn::CommunityId,
                CommunityMemberColumn::UserId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .do_nothing()
        .exec(&self.db)
        .await?;

        self.member_count(community_id).await
    }

    pub async fn leave_community(
        &self,
        user_id: UserId,
        community_id: CommunityId,
    ) -> Result<u64, CommunitiesServiceError> {
        let community = self.find_community(community_id).await?;
        if community.owner_id == user_id {
            return Err(CommunitiesServiceError::OwnerCannotLeave);
        }

        CommunityMember::delete_many()
            .filter(CommunityMemberColumn::CommunityId.eq(community_id))
            .filter(CommunityMemberColumn::UserId.eq(user_id))
            .exec(&self.db)
            .await?;

        self.member_count(community_id).await
    }

    pub async fn list_members(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<UserSummary>, CommunitiesServiceError> {
        self.find_community(community_id).await?;

        let ids: Vec<UserId> = CommunityMember::find()
            .select_only()
            .column(CommunityMemberColumn::UserId)
            .filter(CommunityMemberColumn::CommunityId.eq(community_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut members: Vec<UserSummary> = aggregate::user_summaries(&self.db, ids)
            .await?
            .into_values()
            .collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    pub async fn list_user_communities(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CommunitySummary>, CommunitiesServiceError> {
        self.ensure_user(user_id).await?;

        let ids: Vec<CommunityId> = CommunityMember::find()
            .select_only()
            .column(CommunityMemberColumn::CommunityId)
            .filter(CommunityMemberColumn::UserId.eq(user_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut communities: Vec<CommunitySummary> =
            aggregate::community_summaries(&self.db, ids)
                .await?
                .into_values()
                .collect();
        communities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(communities)
    }
}
