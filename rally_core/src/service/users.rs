use std::sync::Arc;

use chrono::Utc;
use sea_orm::{sea_query::OnConflict, DatabaseConnection};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::{
    config::AuthConfig,
    entity::prelude::*,
    error::{is_unique_violation, ErrorKind},
    ids::UserId,
    service::{
        aggregate, contains_pattern,
        views::{UserSummary, UserView},
        MAX_SEARCH_LIMIT,
    },
};

pub const MAX_USERNAME_LEN: usize = 64;
pub const MAX_BIO_LEN: usize = 1024;

static DUMMY_PASSWORD: &str = "rally-no-such-user";

#[derive(Debug, Error)]
pub enum UsersServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("password hashing failed")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed")]
    HashTask(#[from] tokio::task::JoinError),

    #[error("user not found")]
    UserNotFound,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("username must be between 1 and {MAX_USERNAME_LEN} characters")]
    InvalidUsername,

    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("bio must be at most {MAX_BIO_LEN} characters")]
    BioTooLong,

    #[error("users cannot follow themselves")]
    SelfFollow,

    #[error("invalid username or password")]
    InvalidCredentials,
}

impl UsersServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UsersServiceError::DbError(_)
            | UsersServiceError::Hash(_)
            | UsersServiceError::HashTask(_) => ErrorKind::Internal,
            UsersServiceError::UserNotFound => ErrorKind::NotFound,
            UsersServiceError::UsernameTaken => ErrorKind::Conflict,
            UsersServiceError::InvalidUsername
            | UsersServiceError::PasswordTooShort(_)
            | UsersServiceError::BioTooLong
            | UsersServiceError::SelfFollow => ErrorKind::InvalidArgument,
            UsersServiceError::InvalidCredentials => ErrorKind::NotAuthorized,
        }
    }

    fn from_write(err: DbErr) -> Self {
        if is_unique_violation(&err) {
            UsersServiceError::UsernameTaken
        } else {
            UsersServiceError::DbError(err)
        }
    }
}

fn normalize_username(username: &str) -> Result<String, UsersServiceError> {
    let username = username.trim();
    let len = username.chars().count();
    if len == 0 || len > MAX_USERNAME_LEN {
        return Err(UsersServiceError::InvalidUsername);
    }
    Ok(username.to_string())
}

async fn hash_password(password: &str, cost: u32) -> Result<String, UsersServiceError> {
    let password = password.to_string();
    Ok(tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

async fn verify_password(password: &str, hash: &str) -> Result<bool, UsersServiceError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??)
}

#[derive(Clone)]
pub struct UsersService {
    db: DatabaseConnection,
    auth: AuthConfig,
    /// Hash checked against when the username is unknown, at the configured cost.
    dummy_hash: Arc<OnceCell<String>>,
}

impl UsersService {
    pub fn new(db: DatabaseConnection, auth: AuthConfig) -> Self {
        Self {
            db,
            auth,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    async fn dummy_hash(&self) -> Result<&str, UsersServiceError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| hash_password(DUMMY_PASSWORD, self.auth.bcrypt_cost))
            .await?;
        Ok(hash.as_str())
    }

    async fn find_user(&self, user_id: UserId) -> Result<UserModel, UsersServiceError> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or(UsersServiceError::UserNotFound)
    }

    async fn user_view(&self, user: UserModel) -> Result<UserView, UsersServiceError> {
        let profile = user.find_related(UserProfile).one(&self.db).await?;

        let num_followers = UserFollow::find()
            .filter(UserFollowColumn::FollowedId.eq(user.id))
            .count(&self.db)
            .await?;
        let num_following = UserFollow::find()
            .filter(UserFollowColumn::FollowerId.eq(user.id))
            .count(&self.db)
            .await?;

        Ok(UserView {
            id: user.id,
            username: user.username,
            bio: profile.as_ref().map(|p| p.bio.clone()).unwrap_or_default(),
            profile_picture_id: profile.and_then(|p| p.profile_picture_id),
            num_followers,
            num_following,
            created_at: user.created_at,
        })
    }

    /// Creates an account and its empty profile.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserView, UsersServiceError> {
        let username = normalize_username(username)?;
        if password.chars().count() < self.auth.min_password_len {
            return Err(UsersServiceError::PasswordTooShort(
                self.auth.min_password_len,
            ));
        }

        let password_hash = hash_password(password, self.auth.bcrypt_cost).await?;
        let id = UserId::new();

        let txn = self.db.begin().await?;

        let user = User::insert(UserActiveModel {
            id: Set(id),
            username: Set(username),
            password_hash: Set(password_hash),
            created_at: Set(Utc::now()),
        })
        .exec_with_returning(&txn)
        .await
        .map_err(UsersServiceError::from_write)?;

        UserProfile::insert(UserProfileActiveModel {
            user_id: Set(id),
            bio: Set(String::new()),
            profile_picture_id: Set(None),
        })
        .exec(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(user_id = %user.id, username = %user.username, "registered user");
        self.user_view(user).await
    }

    /// Checks a username/password pair. Unknown users and wrong passwords fail the same way.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<UserView, UsersServiceError> {
        let user = User::find()
            .filter(UserColumn::Username.eq(username.trim()))
            .one(&self.db)
            .await?;

        let Some(user) = user else {
            // Pay the same bcrypt cost as a known user.
            verify_password(password, self.dummy_hash().await?).await?;
            return Err(UsersServiceError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash).await? {
            tracing::debug!(user_id = %user.id, "rejected password");
            return Err(UsersServiceError::InvalidCredentials);
        }

        self.user_view(user).await
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<UserView, UsersServiceError> {
        let user = self.find_user(user_id).await?;
        self.user_view(user).await
    }

    pub async fn get_user_by_username(
        &self,
        username: &str,
    ) -> Result<UserView, UsersServiceError> {
        let user = User::find()
            .filter(UserColumn::Username.eq(username.trim()))
            .one(&self.db)
            .await?
            .ok_or(UsersServiceError::UserNotFound)?;
        self.user_view(user).await
    }

    /// Update username and profile fields; `None` leaves a field untouched.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        username: Option<String>,
        bio: Option<String>,
        profile_picture_id: Option<String>,
    ) -> Result<UserView, UsersServiceError> {
        let user = self.find_user(user_id).await?;

        if let Some(bio) = &bio {
            if bio.chars().count() > MAX_BIO_LEN {
                return Err(UsersServiceError::BioTooLong);
            }
        }

        let txn = self.db.begin().await?;

        let user = match username {
            Some(username) => {
                let mut active: UserActiveModel = user.into();
                active.username = Set(normalize_username(&username)?);
                active
                    .update(&txn)
                    .await
                    .map_err(UsersServiceError::from_write)?
            }
            None => user,
        };

        if bio.is_some() || profile_picture_id.is_some() {
            let profile = UserProfile::find_by_id(user_id).one(&txn).await?;
            match profile {
                Some(profile) => {
                    let mut active: UserProfileActiveModel = profile.into();
                    if let Some(bio) = bio {
                        active.bio = Set(bio);
                    }
                    if let Some(picture) = profile_picture_id {
                        active.profile_picture_id = Set(Some(picture));
                    }
                    active.update(&txn).await?;
                }
                None => {
                    UserProfile::insert(UserProfileActiveModel {
                        user_id: Set(user_id),
                        bio: Set(bio.unwrap_or_default()),
                        profile_picture_id: Set(profile_picture_id),
                    })
                    .exec(&txn)
                    .await?;
                }
            }
        }

        txn.commit().await?;

        self.user_view(user).await
    }

    /// Case-insensitive substring search over usernames.
    pub async fn search_users(
        &self,
        query: &str,
        limit: u64,
    ) -> Result<Vec<UserSummary>, UsersServiceError> {
        let users = User::find()
            .filter(UserColumn::Username.like(contains_pattern(query.trim())))
            .order_by_asc(UserColumn::Username)
            .limit(limit.min(MAX_SEARCH_LIMIT))
            .find_also_related(UserProfile)
            .all(&self.db)
            .await?;

        Ok(users
            .iter()
            .map(|(user, profile)| UserSummary::from_models(user, profile.as_ref()))
            .collect())
    }

    async fn follower_count(&self, user_id: UserId) -> Result<u64, UsersServiceError> {
        Ok(UserFollow::find()
            .filter(UserFollowColumn::FollowedId.eq(user_id))
            .count(&self.db)
            .await?)
    }

    /// Returns the followed user's follower count afterwards.
    pub async fn follow_user(
        &self,
        follower_id: UserId,
        followed_id: UserId,
    ) -> Result<u64, UsersServiceError> {
        if follower_id == followed_id {
            return Err(UsersServiceError::SelfFollow);
        }
        self.find_user(follower_id).await?;
        self.find_user(followed_id).await?;

        let result = UserFollow::insert(UserFollowActiveModel {
            follower_id: Set(follower_id),
            followed_id: Set(followed_id),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::columns([UserFollowColumn::FollowerId, UserFollowColumn::FollowedId])
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(&self.db)
        .await?;

        if matches!(result, TryInsertResult::Inserted(_)) {
            tracing::debug!(%follower_id, %followed_id, "followed user");
        }

        self.follower_count(followed_id).await
    }

    pub async fn unfollow_user(
        &self,
        follower_id: UserId,
        followed_id: UserId,
    ) -> Result<u64, UsersServiceError> {
        UserFollow::delete_many()
            .filter(UserFollowColumn::FollowerId.eq(follower_id))
            .filter(UserFollowColumn::FollowedId.eq(followed_id))
            .exec(&self.db)
            .await?;

        self.follower_count(followed_id).await
    }

    pub async fn list_followers(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSummary>, UsersServiceError> {
        self.find_user(user_id).await?;

        let ids: Vec<UserId> = UserFollow::find()
            .select_only()
            .column(UserFollowColumn::FollowerId)
            .filter(UserFollowColumn::FollowedId.eq(user_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        self.summaries_by_name(ids).await
    }

    pub async fn list_following(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserSummary>, UsersServiceError> {
        self.find_user(user_id).await?;

        let ids: Vec<UserId> = UserFollow::find()
            .select_only()
            .column(UserFollowColumn::FollowedId)
            .filter(UserFollowColumn::FollowerId.eq(user_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        self.summaries_by_name(ids).await
    }

    async fn summaries_by_name(
        &self,
        ids: Vec<UserId>,
    ) -> Result<Vec<UserSummary>, UsersServiceError> {
        let mut users: Vec<UserSummary> = aggregate::user_summaries(&self.db, ids)
            .await?
            .into_values()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}
