use chrono::{DateTime, Duration, Utc};
use sea_orm::{sea_query::OnConflict, DatabaseConnection};
use thiserror::Error;

use crate::{config::AuthConfig, entity::prelude::*, error::ErrorKind};

#[derive(Debug, Error)]
pub enum TokensServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),
}

impl TokensServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokensServiceError::DbError(_) => ErrorKind::Internal,
        }
    }
}

/// Revocation list for access tokens that were logged out before expiry.
#[derive(Clone)]
pub struct TokensService {
    db: DatabaseConnection,
    token_ttl: Duration,
}

impl TokensService {
    pub fn new(db: DatabaseConnection, auth: &AuthConfig) -> Self {
        Self {
            db,
            token_ttl: Duration::hours(auth.token_ttl_hours.max(0)),
        }
    }

    /// Revokes `token_id` until `expires_at`, or until the token lifetime from
    /// now if that is sooner. Revoking twice is a no-op.
    pub async fn invalidate(
        &self,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), TokensServiceError> {
        let expires_at = expires_at.min(Utc::now() + self.token_ttl);

        InvalidatedToken::insert(InvalidatedTokenActiveModel {
            token_id: Set(token_id.to_string()),
            expires_at: Set(expires_at),
        })
        .on_conflict(
            OnConflict::column(InvalidatedTokenColumn::TokenId)
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(&self.db)
        .await?;

        Ok(())
    }

    pub async fn is_revoked(&self, token_id: &str) -> Result<bool, TokensServiceError> {
        Ok(InvalidatedToken::find_by_id(token_id.to_string())
            .one(&self.db)
            .await?
            .is_some())
    }

    /// Drops entries whose token would have expired by `now` anyway.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, TokensServiceError> {
        let result = InvalidatedToken::delete_many()
            .filter(InvalidatedTokenColumn::ExpiresAt.lt(now))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            tracing::info!(removed = result.rows_affected, "pruned expired revoked tokens");
        }
        Ok(result.rows_affected)
    }
}
