use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use sea_orm::{DatabaseConnection, Iterable};
use thiserror::Error;

use crate::{
    entity::{self, prelude::*, rating_field::UnknownRatingField},
    error::{is_unique_violation, ErrorKind},
    ids::{RatingId, UserId},
    service::views::{RatingSummary, RatingView},
};

pub const MIN_RATING_VALUE: i32 = 1;
pub const MAX_RATING_VALUE: i32 = 5;

pub type RatingFields = BTreeMap<RatingFieldName, i32>;

#[derive(Debug, Error)]
pub enum RatingsServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error(transparent)]
    UnknownField(#[from] UnknownRatingField),

    #[error("user not found")]
    UserNotFound,

    #[error("rating not found")]
    RatingNotFound,

    #[error("users cannot rate themselves")]
    SelfRating,

    #[error("a rating needs at least one field")]
    NoFields,

    #[error("{field} must be between {MIN_RATING_VALUE} and {MAX_RATING_VALUE}, got {value}")]
    ValueOutOfRange { field: RatingFieldName, value: i32 },

    #[error("a rating for this pair was created concurrently")]
    DuplicateRating,

    #[error("unauthorized: not rating author")]
    Unauthorized,
}

impl RatingsServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RatingsServiceError::DbError(_) => ErrorKind::Internal,
            RatingsServiceError::UserNotFound | RatingsServiceError::RatingNotFound => {
                ErrorKind::NotFound
            }
            RatingsServiceError::UnknownField(_)
            | RatingsServiceError::NoFields
            | RatingsServiceError::ValueOutOfRange { .. } => ErrorKind::InvalidArgument,
            RatingsServiceError::SelfRating | RatingsServiceError::Unauthorized => {
                ErrorKind::NotAuthorized
            }
            RatingsServiceError::DuplicateRating => ErrorKind::Conflict,
        }
    }
}

/// Parses raw `name -> value` input, rejecting names outside the known set.
pub fn parse_fields<K: AsRef<str>>(
    raw: impl IntoIterator<Item = (K, i32)>,
) -> Result<RatingFields, RatingsServiceError> {
    raw.into_iter()
        .map(|(name, value)| -> Result<_, RatingsServiceError> {
            Ok((name.as_ref().parse::<RatingFieldName>()?, value))
        })
        .collect()
}

fn validate_fields(fields: &RatingFields) -> Result<(), RatingsServiceError> {
    if fields.is_empty() {
        return Err(RatingsServiceError::NoFields);
    }
    for (&field, &value) in fields {
        if !(MIN_RATING_VALUE..=MAX_RATING_VALUE).contains(&value) {
            return Err(RatingsServiceError::ValueOutOfRange { field, value });
        }
    }
    Ok(())
}

fn rating_view(rating: RatingModel, fields: RatingFields) -> RatingView {
    RatingView {
        id: rating.id,
        rating_user_id: rating.rating_user_id,
        rated_user_id: rating.rated_user_id,
        fields,
        description: rating.description,
        created_at: rating.created_at,
        updated_at: rating.updated_at,
    }
}

#[derive(Clone)]
pub struct RatingsService {
    db: DatabaseConnection,
}

impl RatingsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn ensure_user(&self, user_id: UserId) -> Result<(), RatingsServiceError> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or(RatingsServiceError::UserNotFound)
    }

    async fn with_fields(
        &self,
        ratings: Vec<RatingModel>,
    ) -> Result<Vec<RatingView>, RatingsServiceError> {
        if ratings.is_empty() {
            return Ok(Vec::new());
        }

        let mut fields: HashMap<RatingId, RatingFields> = HashMap::new();
        for field in RatingField::find()
            .filter(RatingFieldColumn::RatingId.is_in(ratings.iter().map(|r| r.id)))
            .all(&self.db)
            .await?
        {
            fields
                .entry(field.rating_id)
                .or_default()
                .insert(field.name, field.value);
        }

        Ok(ratings
            .into_iter()
            .map(|rating| {
                let own = fields.remove(&rating.id).unwrap_or_default();
                rating_view(rating, own)
            })
            .collect())
    }

    /// Creates or replaces `giver`'s rating of `receiver`.
    pub async fn rate_user(
        &self,
        giver: UserId,
        receiver: UserId,
        fields: RatingFields,
        description: Option<String>,
    ) -> Result<RatingView, RatingsServiceError> {
        if giver == receiver {
            return Err(RatingsServiceError::SelfRating);
        }
        validate_fields(&fields)?;
        self.ensure_user(giver).await?;
        self.ensure_user(receiver).await?;

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let existing = Rating::find()
            .filter(RatingColumn::RatingUserId.eq(giver))
            .filter(RatingColumn::RatedUserId.eq(receiver))
            .one(&txn)
            .await?;

        let rating = match existing {
            Some(rating) => {
                let mut active: RatingActiveModel = rating.into();
                active.description = Set(description);
                active.updated_at = Set(now);
                let rating = active.update(&txn).await?;

                RatingField::delete_many()
                    .filter(RatingFieldColumn::RatingId.eq(rating.id))
                    .exec(&txn)
                    .await?;
                tracing::debug!(rating_id = %rating.id, "replacing rating");
                rating
            }
            None => Rating::insert(RatingActiveModel {
                id: Set(RatingId::new()),
                rating_user_id: Set(giver),
                rated_user_id: Set(receiver),
                description: Set(description),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .exec_with_returning(&txn)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    RatingsServiceError::DuplicateRating
                } else {
                    RatingsServiceError::DbError(err)
                }
            })?,
        };

        RatingField::insert_many(fields.iter().map(|(&name, &value)| RatingFieldActiveModel {
            rating_id: Set(rating.id),
            name: Set(name),
            value: Set(value),
        }))
        .exec_without_returning(&txn)
        .await?;

        txn.commit().await?;

        tracing::info!(rating_id = %rating.id, %giver, %receiver, "saved rating");
        Ok(rating_view(rating, fields))
    }

    pub async fn get_rating(
        &self,
        giver: UserId,
        receiver: UserId,
    ) -> Result<RatingView, RatingsServiceError> {
        let rating = Rating::find()
            .filter(RatingColumn::RatingUserId.eq(giver))
            .filter(RatingColumn::RatedUserId.eq(receiver))
            .one(&self.db)
            .await?
            .ok_or(RatingsServiceError::RatingNotFound)?;

        let mut views = self.with_fields(vec![rating]).await?;
        views.pop().ok_or(RatingsServiceError::RatingNotFound)
    }

    pub async fn list_ratings_received(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RatingView>, RatingsServiceError> {
        self.ensure_user(user_id).await?;
        let ratings = Rating::find()
            .filter(RatingColumn::RatedUserId.eq(user_id))
            .order_by_desc(RatingColumn::UpdatedAt)
            .all(&self.db)
            .await?;
        self.with_fields(ratings).await
    }

    pub async fn list_ratings_given(
        &self,
        user_id: UserId,
    ) -> Result<Vec<RatingView>, RatingsServiceError> {
        self.ensure_user(user_id).await?;
        let ratings = Rating::find()
            .filter(RatingColumn::RatingUserId.eq(user_id))
            .order_by_desc(RatingColumn::UpdatedAt)
            .all(&self.db)
            .await?;
        self.with_fields(ratings).await
    }

    /// Only the user who gave a rating may delete it.
    pub async fn delete_rating(
        &self,
        rating_id: RatingId,
        user_id: UserId,
    ) -> Result<(), RatingsServiceError> {
        let rating = Rating::find_by_id(rating_id)
            .one(&self.db)
            .await?
            .ok_or(RatingsServiceError::RatingNotFound)?;

        if rating.rating_user_id != user_id {
            return Err(RatingsServiceError::Unauthorized);
        }

        let txn = self.db.begin().await?;
        RatingField::delete_many()
            .filter(RatingFieldColumn::RatingId.eq(rating_id))
            .exec(&txn)
            .await?;
        Rating::delete_by_id(rating_id).exec(&txn).await?;
        txn.commit().await?;

        tracing::info!(%rating_id, "deleted rating");
        Ok(())
    }

    /// Per-field means over every rating `user_id` has received.
    pub async fn rating_summary(
        &self,
        user_id: UserId,
    ) -> Result<RatingSummary, RatingsServiceError> {
        self.ensure_user(user_id).await?;

        let num_ratings = Rating::find()
            .filter(RatingColumn::RatedUserId.eq(user_id))
            .count(&self.db)
            .await?;

        let values: Vec<(RatingFieldName, i32)> = RatingField::find()
            .select_only()
            .column(RatingFieldColumn::Name)
            .column(RatingFieldColumn::Value)
            .join(JoinType::InnerJoin, entity::rating_field::Relation::Rating.def())
            .filter(RatingColumn::RatedUserId.eq(user_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut totals: BTreeMap<RatingFieldName, (i64, u32)> = BTreeMap::new();
        for (name, value) in values {
            let (sum, count) = totals.entry(name).or_default();
            *sum += i64::from(value);
            *count += 1;
        }

        let averages = RatingFieldName::iter()
            .map(|name| {
                let average = totals
                    .get(&name)
                    .filter(|(_, count)| *count > 0)
                    .map(|(sum, count)| *sum as f64 / f64::from(*count));
                (name, average)
            })
            .collect();

        Ok(RatingSummary {
            user_id,
            num_ratings,
            averages,
        })
    }
}
