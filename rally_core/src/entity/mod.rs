// SeaORM entities for the forum's relational model.

pub mod comment;
pub mod comment_like;
pub mod community;
pub mod community_member;
pub mod game;
pub mod invalidated_token;
pub mod post;
pub mod post_like;
pub mod rating;
pub mod rating_field;
pub mod user;
pub mod user_follow;
pub mod user_profile;

#[cfg(test)]
mod tests;

pub mod prelude {
    pub use super::comment::{
        ActiveModel as CommentActiveModel, Column as CommentColumn, Entity as Comment,
        Model as CommentModel,
    };
    pub use super::comment_like::{
        ActiveModel as CommentLikeActiveModel, Column as CommentLikeColumn,
        Entity as CommentLike, Model as CommentLikeModel,
    };
    pub use super::community::{
        ActiveModel as CommunityActiveModel, Column as CommunityColumn, Entity as Community,
        Model as CommunityModel,
    };
    pub use super::community_member::{
        ActiveModel as CommunityMemberActiveModel, Column as CommunityMemberColumn,
        Entity as CommunityMember, Model as CommunityMemberModel,
    };
    pub use super::game::{
        ActiveModel as GameActiveModel, Column as GameColumn, Entity as Game, Model as GameModel,
    };
    pub use super::invalidated_token::{
        ActiveModel as InvalidatedTokenActiveModel, Column as InvalidatedTokenColumn,
        Entity as InvalidatedToken, Model as InvalidatedTokenModel,
    };
    pub use super::post::{
        ActiveModel as PostActiveModel, Column as PostColumn, Entity as Post, Model as PostModel,
    };
    pub use super::post_like::{
        ActiveModel as PostLikeActiveModel, Column as PostLikeColumn, Entity as PostLike,
        Model as PostLikeModel,
    };
    pub use super::rating::{
        ActiveModel as RatingActiveModel, Column as RatingColumn, Entity as Rating,
        Model as RatingModel,
    };
    pub use super::rating_field::{
        ActiveModel as RatingFieldActiveModel, Column as RatingFieldColumn,
        Entity as RatingField, Model as RatingFieldModel, RatingFieldName,
    };
    pub use super::user::{
        ActiveModel as UserActiveModel, Column as UserColumn, Entity as User, Model as UserModel,
    };
    pub use super::user_follow::{
        ActiveModel as UserFollowActiveModel, Column as UserFollowColumn, Entity as UserFollow,
        Model as UserFollowModel,
    };
    pub use super::user_profile::{
        ActiveModel as UserProfileActiveModel, Column as UserProfileColumn,
        Entity as UserProfile, Model as UserProfileModel,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait, ActiveValue, ColumnTrait, Condition, ConnectionTrait, Database,
        DatabaseConnection, DatabaseTransaction, DbConn, DbErr, EntityTrait, JoinType,
        ModelTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait,
        Related, RelationTrait, Set, TransactionTrait, TryInsertResult, Unchanged,
    };
}
