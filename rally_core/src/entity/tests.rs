#[cfg(test)]
mod entity_tests {
    use chrono::Utc;

    use crate::entity::prelude::*;
    use crate::ids::*;
    use crate::test_utils::{
        create_comment_at, create_community, create_post_at, create_user, hours_ago,
        setup_test_db,
    };

    #[tokio::test]
    async fn test_create_and_find_user_with_profile() {
        let db = setup_test_db().await;

        let user_id = UserId::new();
        let user = UserActiveModel {
            id: Set(user_id),
            username: Set("tester".to_string()),
            password_hash: Set("hash".to_string()),
            created_at: Set(Utc::now()),
        };
        User::insert(user).exec(&db).await.expect("Failed to insert user");

        let profile = UserProfileActiveModel {
            user_id: Set(user_id),
            bio: Set("Hello".to_string()),
            profile_picture_id: Set(Some("pic-1".to_string())),
        };
        UserProfile::insert(profile)
            .exec(&db)
            .await
            .expect("Failed to insert profile");

        let found = User::find_by_id(user_id)
            .find_also_related(UserProfile)
            .one(&db)
            .await
            .expect("Failed to query user");

        let (user, profile) = found.expect("user exists");
        assert_eq!(user.username, "tester");
        let profile = profile.expect("profile exists");
        assert_eq!(profile.bio, "Hello");
        assert_eq!(profile.profile_picture_id.as_deref(), Some("pic-1"));
    }

    #[test]
    fn test_password_hash_is_not_serialized() {
        let user = UserModel {
            id: UserId::new(),
            username: "tester".to_string(),
            password_hash: "secret-hash".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "tester");
    }

    #[tokio::test]
    async fn test_username_unique_constraint() {
        let db = setup_test_db().await;
        create_user(&db, "taken").await;

        let duplicate = UserActiveModel {
            id: Set(UserId::new()),
            username: Set("taken".to_string()),
            password_hash: Set("hash".to_string()),
            created_at: Set(Utc::now()),
        };
        let result = User::insert(duplicate).exec(&db).await;

        let err = result.expect_err("Should fail due to unique constraint");
        assert!(crate::error::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_post_like_composite_key() {
        let db = setup_test_db().await;
        let user = create_user(&db, "liker").await;
        let community = create_community(&db, user, "Likers").await;
        let post = create_post_at(&db, user, community, "Likeable", hours_ago(1)).await;

        let like = || PostLikeActiveModel {
            post_id: Set(post),
            user_id: Set(user),
            created_at: Set(Utc::now()),
        };

        PostLike::insert(like()).exec(&db).await.unwrap();
        let again = PostLike::insert(like()).exec(&db).await;
        assert!(again.is_err(), "Same pair cannot like twice");

        let found = PostLike::find_by_id((post, user)).one(&db).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_comment_parent_relation() {
        let db = setup_test_db().await;
        let user = create_user(&db, "talker").await;
        let community = create_community(&db, user, "Talkers").await;
        let post = create_post_at(&db, user, community, "Talk", hours_ago(2)).await;

        let root = create_comment_at(&db, post, user, None, "root", hours_ago(1)).await;
        let reply = create_comment_at(&db, post, user, Some(root), "reply", hours_ago(0)).await;

        let replies = Comment::find()
            .filter(CommentColumn::ParentId.eq(root))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, reply);

        let top_level = Comment::find()
            .filter(CommentColumn::ParentId.is_null())
            .all(&db)
            .await
            .unwrap();
        assert_eq!(top_level.len(), 1);
        assert_eq!(top_level[0].id, root);
    }

    #[tokio::test]
    async fn test_cascade_delete_post_deletes_comments() {
        let db = setup_test_db().await;
        let user = create_user(&db, "author").await;
        let community = create_community(&db, user, "Authors").await;
        let post = create_post_at(&db, user, community, "Gone soon", hours_ago(1)).await;

        let root = create_comment_at(&db, post, user, None, "root", hours_ago(1)).await;
        create_comment_at(&db, post, user, Some(root), "reply", hours_ago(0)).await;

        Post::delete_by_id(post).exec(&db).await.unwrap();

        let comments = Comment::find().all(&db).await.unwrap();
        assert!(comments.is_empty(), "Comments should be cascade deleted");
    }

    #[tokio::test]
    async fn test_find_post_with_related_likes() {
        let db = setup_test_db().await;
        let author = create_user(&db, "author").await;
        let fan = create_user(&db, "fan").await;
        let community = create_community(&db, author, "Fans").await;
        let post = create_post_at(&db, author, community, "Popular", hours_ago(1)).await;

        for user in [author, fan] {
            PostLike::insert(PostLikeActiveModel {
                post_id: Set(post),
                user_id: Set(user),
                created_at: Set(Utc::now()),
            })
            .exec(&db)
            .await
            .unwrap();
        }

        let posts_with_likes = Post::find_by_id(post)
            .find_with_related(PostLike)
            .all(&db)
            .await
            .unwrap();

        assert_eq!(posts_with_likes.len(), 1);
        let (found, likes) = &posts_with_likes[0];
        assert_eq!(found.id, post);
        assert_eq!(likes.len(), 2);
    }

    #[tokio::test]
    async fn test_rating_fields_round_trip() {
        let db = setup_test_db().await;
        let giver = create_user(&db, "giver").await;
        let receiver = create_user(&db, "receiver").await;

        let rating_id = RatingId::new();
        Rating::insert(RatingActiveModel {
            id: Set(rating_id),
            rating_user_id: Set(giver),
            rated_user_id: Set(receiver),
            description: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        })
        .exec(&db)
        .await
        .unwrap();

        RatingField::insert(RatingFieldActiveModel {
            rating_id: Set(rating_id),
            name: Set(RatingFieldName::Teamwork),
            value: Set(4),
        })
        .exec(&db)
        .await
        .unwrap();

        let rating = Rating::find_by_id(rating_id).one(&db).await.unwrap().unwrap();
        let fields = rating.find_related(RatingField).all(&db).await.unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, RatingFieldName::Teamwork);
        assert_eq!(fields[0].value, 4);
    }

    #[tokio::test]
    async fn test_rating_pair_unique_constraint() {
        let db = setup_test_db().await;
        let giver = create_user(&db, "giver").await;
        let receiver = create_user(&db, "receiver").await;

        let rating = || RatingActiveModel {
            id: Set(RatingId::new()),
            rating_user_id: Set(giver),
            rated_user_id: Set(receiver),
            description: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        Rating::insert(rating()).exec(&db).await.unwrap();
        let err = Rating::insert(rating()).exec(&db).await.unwrap_err();
        assert!(crate::error::is_unique_violation(&err));
    }

    #[test]
    fn test_rating_field_names() {
        for name in ["attitude", "communication", "reliability", "teamwork"] {
            let parsed: RatingFieldName = name.parse().unwrap();
            assert_eq!(parsed.as_str(), name);
            assert_eq!(serde_json::to_value(parsed).unwrap(), name);
        }

        assert!("charm".parse::<RatingFieldName>().is_err());
    }
}
