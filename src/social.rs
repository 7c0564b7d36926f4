use crate::error::ApiError;
use crate::orm::{posts, user_follows, users};
use crate::post::{liked_post_set, ProfilePost};
use crate::user::{UserSearchResult, UserSummary};
use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::{extension::postgres::PgExpr, Condition, Expr, OnConflict};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const SEARCH_LIMIT: u64 = 20;
pub const PROFILE_POST_LIMIT: u64 = 12;

/// Public profile: counters plus the viewer's relationship to the user.
#[derive(Clone, Debug, Serialize)]
pub struct ProfileView {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub followers_count: i32,
    pub following_count: i32,
    pub posts_count: i32,
    pub created_at: NaiveDateTime,
    pub is_following: bool,
}

/// Inserts the follow edge and bumps both counters as one atomic unit.
///
/// Duplicate detection rides on the composite unique key (ON CONFLICT DO
/// NOTHING) rather than a pre-read, so two concurrent follows cannot both
/// count.
pub async fn follow(
    db: &DatabaseConnection,
    follower_id: i32,
    following_id: i32,
) -> Result<(), ApiError> {
    if follower_id == following_id {
        return Err(ApiError::Conflict("you cannot follow yourself".to_owned()));
    }

    let txn = db.begin().await.map_err(ApiError::from)?;

    // Surface a clean NotFound for a bogus target before the edge insert
    // would trip the foreign key.
    users::Entity::find_by_id(following_id)
        .one(&txn)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("user not found".to_owned()))?;

    let inserted = user_follows::Entity::insert(user_follows::ActiveModel {
        follower_id: Set(follower_id),
        following_id: Set(following_id),
        created_at: Set(Utc::now().naive_utc()),
    })
    .on_conflict(
        OnConflict::columns([
            user_follows::Column::FollowerId,
            user_follows::Column::FollowingId,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(&txn)
    .await
    .map_err(ApiError::from)?;
    if inserted == 0 {
        return Err(ApiError::Conflict(
            "you are already following this user".to_owned(),
        ));
    }

    bump_counter(&txn, follower_id, users::Column::FollowingCount, 1).await?;
    bump_counter(&txn, following_id, users::Column::FollowersCount, 1).await?;

    txn.commit().await.map_err(ApiError::from)?;

    Ok(())
}

/// Deletes the follow edge and decrements both counters atomically.
/// Existence is judged by the delete's own row count, not a separate read.
pub async fn unfollow(
    db: &DatabaseConnection,
    follower_id: i32,
    following_id: i32,
) -> Result<(), ApiError> {
    let txn = db.begin().await.map_err(ApiError::from)?;

    let deleted = user_follows::Entity::delete_many()
        .filter(user_follows::Column::FollowerId.eq(follower_id))
        .filter(user_follows::Column::FollowingId.eq(following_id))
        .exec(&txn)
        .await
        .map_err(ApiError::from)?;
    if deleted.rows_affected == 0 {
        return Err(ApiError::NotFound(
            "you are not following this user".to_owned(),
        ));
    }

    bump_counter(&txn, follower_id, users::Column::FollowingCount, -1).await?;
    bump_counter(&txn, following_id, users::Column::FollowersCount, -1).await?;

    txn.commit().await.map_err(ApiError::from)?;

    Ok(())
}

async fn bump_counter<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    column: users::Column,
    delta: i32,
) -> Result<(), ApiError> {
    let expr = if delta >= 0 {
        Expr::col(column).add(delta)
    } else {
        Expr::col(column).sub(-delta)
    };
    let updated = users::Entity::update_many()
        .col_expr(column, expr)
        .filter(users::Column::Id.eq(user_id))
        .exec(db)
        .await
        .map_err(ApiError::from)?;
    if updated.rows_affected == 0 {
        return Err(ApiError::NotFound("user not found".to_owned()));
    }
    Ok(())
}

pub async fn is_following<C: ConnectionTrait>(
    db: &C,
    follower_id: i32,
    following_id: i32,
) -> Result<bool, ApiError> {
    Ok(user_follows::Entity::find_by_id((follower_id, following_id))
        .one(db)
        .await
        .map_err(ApiError::from)?
        .is_some())
}

/// Profile plus the user's most recent posts, each with the viewer's like
/// state.
pub async fn get_profile(
    db: &DatabaseConnection,
    user_id: i32,
    viewer_id: Option<i32>,
) -> Result<Option<(ProfileView, Vec<ProfilePost>)>, ApiError> {
    let user = match users::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(ApiError::from)?
    {
        Some(user) => user,
        None => return Ok(None),
    };

    let following = match viewer_id {
        Some(viewer) if viewer != user_id => is_following(db, viewer, user_id).await?,
        _ => false,
    };

    let posts = posts::Entity::find()
        .filter(posts::Column::UserId.eq(user_id))
        .order_by_desc(posts::Column::CreatedAt)
        .limit(PROFILE_POST_LIMIT)
        .all(db)
        .await
        .map_err(ApiError::from)?;
    let liked = liked_post_set(db, viewer_id, posts.iter().map(|p| p.id).collect()).await?;

    let profile = ProfileView {
        id: user.id,
        username: user.username,
        full_name: user.full_name,
        bio: user.bio,
        avatar_url: user.avatar_url,
        is_verified: user.is_verified,
        followers_count: user.followers_count,
        following_count: user.following_count,
        posts_count: user.posts_count,
        created_at: user.created_at,
        is_following: following,
    };
    let posts = posts
        .iter()
        .map(|post| ProfilePost::from_post(post, liked.contains(&post.id)))
        .collect();

    Ok(Some((profile, posts)))
}

/// Case-insensitive substring search on username and full name, most
/// followed first.
pub async fn search_users(
    db: &DatabaseConnection,
    query: &str,
    viewer_id: Option<i32>,
) -> Result<Vec<UserSearchResult>, ApiError> {
    let pattern = format!("%{}%", query);
    let found = users::Entity::find()
        .filter(
            Condition::any()
                .add(Expr::col(users::Column::Username).ilike(pattern.as_str()))
                .add(Expr::col(users::Column::FullName).ilike(pattern.as_str())),
        )
        .order_by_desc(users::Column::FollowersCount)
        .order_by_asc(users::Column::Username)
        .limit(SEARCH_LIMIT)
        .all(db)
        .await
        .map_err(ApiError::from)?;

    let followed = viewer_follow_set(db, viewer_id, found.iter().map(|u| u.id).collect()).await?;

    Ok(found
        .iter()
        .map(|user| UserSearchResult::from_user(user, followed.contains(&user.id)))
        .collect())
}

/// Users following `user_id`, newest edge first.
pub async fn list_followers(
    db: &DatabaseConnection,
    user_id: i32,
    viewer_id: Option<i32>,
) -> Result<Vec<UserSummary>, ApiError> {
    let edges = user_follows::Entity::find()
        .filter(user_follows::Column::FollowingId.eq(user_id))
        .order_by_desc(user_follows::Column::CreatedAt)
        .all(db)
        .await
        .map_err(ApiError::from)?;
    let ids: Vec<i32> = edges.iter().map(|edge| edge.follower_id).collect();
    summarize_in_order(db, ids, viewer_id).await
}

/// Users `user_id` follows, newest edge first.
pub async fn list_following(
    db: &DatabaseConnection,
    user_id: i32,
    viewer_id: Option<i32>,
) -> Result<Vec<UserSummary>, ApiError> {
    let edges = user_follows::Entity::find()
        .filter(user_follows::Column::FollowerId.eq(user_id))
        .order_by_desc(user_follows::Column::CreatedAt)
        .all(db)
        .await
        .map_err(ApiError::from)?;
    let ids: Vec<i32> = edges.iter().map(|edge| edge.following_id).collect();
    summarize_in_order(db, ids, viewer_id).await
}

/// Loads the users behind an ordered id list and annotates each with the
/// viewer's follow state, preserving the edge ordering.
async fn summarize_in_order(
    db: &DatabaseConnection,
    ids: Vec<i32>,
    viewer_id: Option<i32>,
) -> Result<Vec<UserSummary>, ApiError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let loaded = users::Entity::find()
        .filter(users::Column::Id.is_in(ids.clone()))
        .all(db)
        .await
        .map_err(ApiError::from)?;
    let by_id: HashMap<i32, users::Model> =
        loaded.into_iter().map(|user| (user.id, user)).collect();
    let followed = viewer_follow_set(db, viewer_id, ids.clone()).await?;

    Ok(ids
        .iter()
        .filter_map(|id| by_id.get(id))
        .map(|user| UserSummary::from_user(user, followed.contains(&user.id)))
        .collect())
}

/// The subset of `user_ids` the viewer follows. Anonymous viewers follow
/// nobody.
async fn viewer_follow_set(
    db: &DatabaseConnection,
    viewer_id: Option<i32>,
    user_ids: Vec<i32>,
) -> Result<HashSet<i32>, ApiError> {
    let viewer_id = match viewer_id {
        Some(id) if !user_ids.is_empty() => id,
        _ => return Ok(HashSet::new()),
    };
    let edges = user_follows::Entity::find()
        .filter(user_follows::Column::FollowerId.eq(viewer_id))
        .filter(user_follows::Column::FollowingId.is_in(user_ids))
        .all(db)
        .await
        .map_err(ApiError::from)?;
    Ok(edges.into_iter().map(|edge| edge.following_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn user_row(id: i32) -> users::Model {
        users::Model {
            id,
            username: format!("user{}", id),
            email: format!("user{}@x.com", id),
            password_hash: String::new(),
            full_name: format!("User {}", id),
            bio: None,
            avatar_url: None,
            is_verified: false,
            followers_count: 0,
            following_count: 0,
            posts_count: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[actix_rt::test]
    async fn self_follow_is_rejected_before_touching_the_store() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let err = follow(&db, 3, 3).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_rt::test]
    async fn duplicate_follow_is_a_conflict() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_row(4)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let err = follow(&db, 3, 4).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_rt::test]
    async fn follow_updates_both_counters() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_row(4)]])
            .append_exec_results([
                // edge insert
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                // follower's following_count
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                // followee's followers_count
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        follow(&db, 3, 4).await.unwrap();
    }

    #[actix_rt::test]
    async fn follow_unknown_user_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .into_connection();

        let err = follow(&db, 3, 404).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[actix_rt::test]
    async fn unfollow_without_edge_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let err = unfollow(&db, 3, 4).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[actix_rt::test]
    async fn unfollow_updates_both_counters() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        unfollow(&db, 3, 4).await.unwrap();
    }
}
