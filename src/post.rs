use crate::error::ApiError;
use crate::orm::{post_comments, post_likes, posts, users};
use chrono::{NaiveDateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const FEED_DEFAULT_LIMIT: u64 = 20;
pub const FEED_MAX_LIMIT: u64 = 50;

/// Feed entry: post fields plus flattened author fields plus the viewer's
/// like state.
#[derive(Clone, Debug, Serialize)]
pub struct FeedPost {
    pub id: i32,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub shares_count: i32,
    pub created_at: NaiveDateTime,
    pub user_id: i32,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub is_liked: bool,
}

/// Post as it appears on a profile page; the author is implied by the page.
#[derive(Clone, Debug, Serialize)]
pub struct ProfilePost {
    pub id: i32,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub shares_count: i32,
    pub created_at: NaiveDateTime,
    pub is_liked: bool,
}

impl ProfilePost {
    pub fn from_post(post: &posts::Model, is_liked: bool) -> Self {
        Self {
            id: post.id,
            content: post.content.to_owned(),
            image_url: post.image_url.to_owned(),
            likes_count: post.likes_count,
            comments_count: post.comments_count,
            shares_count: post.shares_count,
            created_at: post.created_at,
            is_liked,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CommentView {
    pub id: i32,
    pub content: String,
    pub likes_count: i32,
    pub created_at: NaiveDateTime,
    pub parent_comment_id: Option<i32>,
    pub user_id: i32,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

/// Inserts a post and bumps the author's post counter as one atomic unit.
pub async fn create_post(
    db: &DatabaseConnection,
    user_id: i32,
    content: Option<&str>,
    image_url: Option<&str>,
) -> Result<posts::Model, ApiError> {
    let content = content.map(str::trim).filter(|c| !c.is_empty());
    let image_url = image_url.map(str::trim).filter(|u| !u.is_empty());
    if content.is_none() && image_url.is_none() {
        return Err(ApiError::Validation(
            "a post needs text or an image".to_owned(),
        ));
    }

    let txn = db.begin().await.map_err(ApiError::from)?;

    let post = posts::ActiveModel {
        user_id: Set(user_id),
        content: Set(content.map(str::to_owned)),
        image_url: Set(image_url.map(str::to_owned)),
        likes_count: Set(0),
        comments_count: Set(0),
        shares_count: Set(0),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(ApiError::from)?;

    let updated = users::Entity::update_many()
        .col_expr(
            users::Column::PostsCount,
            Expr::col(users::Column::PostsCount).add(1),
        )
        .filter(users::Column::Id.eq(user_id))
        .exec(&txn)
        .await
        .map_err(ApiError::from)?;
    if updated.rows_affected == 0 {
        return Err(ApiError::NotFound("user not found".to_owned()));
    }

    txn.commit().await.map_err(ApiError::from)?;

    Ok(post)
}

/// Flips the caller's like on a post and returns `(is_liked, likes_count)`.
///
/// The edge row is the source of truth: a conditional delete, then a
/// conditional insert guarded by the composite unique key, decide the new
/// state without a read-then-write window. The counter only moves when the
/// edge actually moved, so it always equals the number of distinct likers.
pub async fn toggle_like(
    db: &DatabaseConnection,
    post_id: i32,
    user_id: i32,
) -> Result<(bool, i32), ApiError> {
    let txn = db.begin().await.map_err(ApiError::from)?;

    posts::Entity::find_by_id(post_id)
        .one(&txn)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("post not found".to_owned()))?;

    let deleted = post_likes::Entity::delete_many()
        .filter(post_likes::Column::PostId.eq(post_id))
        .filter(post_likes::Column::UserId.eq(user_id))
        .exec(&txn)
        .await
        .map_err(ApiError::from)?;

    let is_liked = if deleted.rows_affected > 0 {
        bump_likes(&txn, post_id, -1).await?;
        false
    } else {
        let inserted = post_likes::Entity::insert(post_likes::ActiveModel {
            post_id: Set(post_id),
            user_id: Set(user_id),
            created_at: Set(Utc::now().naive_utc()),
        })
        .on_conflict(
            OnConflict::columns([post_likes::Column::PostId, post_likes::Column::UserId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(ApiError::from)?;
        // A lost insert race means a concurrent request already added the
        // like; report the liked state without double-counting it.
        if inserted > 0 {
            bump_likes(&txn, post_id, 1).await?;
        }
        true
    };

    let post = posts::Entity::find_by_id(post_id)
        .one(&txn)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("post not found".to_owned()))?;

    txn.commit().await.map_err(ApiError::from)?;

    Ok((is_liked, post.likes_count))
}

async fn bump_likes<C: ConnectionTrait>(
    db: &C,
    post_id: i32,
    delta: i32,
) -> Result<(), ApiError> {
    let expr = if delta >= 0 {
        Expr::col(posts::Column::LikesCount).add(delta)
    } else {
        Expr::col(posts::Column::LikesCount).sub(-delta)
    };
    let updated = posts::Entity::update_many()
        .col_expr(posts::Column::LikesCount, expr)
        .filter(posts::Column::Id.eq(post_id))
        .exec(db)
        .await
        .map_err(ApiError::from)?;
    if updated.rows_affected == 0 {
        return Err(ApiError::NotFound("post not found".to_owned()));
    }
    Ok(())
}

/// Inserts a comment and bumps the post's comment counter atomically.
///
/// `parent_comment_id` is stored as given; the referenced comment is not
/// validated against the post.
pub async fn add_comment(
    db: &DatabaseConnection,
    post_id: i32,
    user_id: i32,
    content: &str,
    parent_comment_id: Option<i32>,
) -> Result<post_comments::Model, ApiError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ApiError::Validation(
            "comment text is required".to_owned(),
        ));
    }

    let txn = db.begin().await.map_err(ApiError::from)?;

    // The counter update doubles as the existence check for the post.
    let updated = posts::Entity::update_many()
        .col_expr(
            posts::Column::CommentsCount,
            Expr::col(posts::Column::CommentsCount).add(1),
        )
        .filter(posts::Column::Id.eq(post_id))
        .exec(&txn)
        .await
        .map_err(ApiError::from)?;
    if updated.rows_affected == 0 {
        return Err(ApiError::NotFound("post not found".to_owned()));
    }

    let comment = post_comments::ActiveModel {
        post_id: Set(post_id),
        user_id: Set(user_id),
        content: Set(content.to_owned()),
        parent_comment_id: Set(parent_comment_id),
        likes_count: Set(0),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(ApiError::from)?;

    txn.commit().await.map_err(ApiError::from)?;

    Ok(comment)
}

/// Newest-first feed page with author fields and the viewer's like state.
/// One page of the feed with the page/limit actually applied, which may
/// differ from what the caller asked for.
#[derive(Clone, Debug)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub page: u64,
    pub limit: u64,
}

pub async fn feed(
    db: &DatabaseConnection,
    viewer_id: Option<i32>,
    page: u64,
    limit: u64,
) -> Result<FeedPage, ApiError> {
    let limit = limit.clamp(1, FEED_MAX_LIMIT);
    let page = page.max(1);
    let offset = (page - 1) * limit;

    let posts = posts::Entity::find()
        .order_by_desc(posts::Column::CreatedAt)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await
        .map_err(ApiError::from)?;

    let authors = load_authors(db, posts.iter().map(|p| p.user_id)).await?;
    let liked = liked_post_set(db, viewer_id, posts.iter().map(|p| p.id).collect()).await?;

    let posts = posts
        .into_iter()
        .filter_map(|post| {
            let author = authors.get(&post.user_id)?;
            Some(FeedPost {
                id: post.id,
                content: post.content,
                image_url: post.image_url,
                likes_count: post.likes_count,
                comments_count: post.comments_count,
                shares_count: post.shares_count,
                created_at: post.created_at,
                user_id: author.id,
                username: author.username.to_owned(),
                full_name: author.full_name.to_owned(),
                avatar_url: author.avatar_url.to_owned(),
                is_verified: author.is_verified,
                is_liked: liked.contains(&post.id),
            })
        })
        .collect();

    Ok(FeedPage { posts, page, limit })
}

/// Flat comment list for a post, oldest first, with author fields.
pub async fn list_comments(
    db: &DatabaseConnection,
    post_id: i32,
) -> Result<Vec<CommentView>, ApiError> {
    let comments = post_comments::Entity::find()
        .filter(post_comments::Column::PostId.eq(post_id))
        .order_by_asc(post_comments::Column::CreatedAt)
        .all(db)
        .await
        .map_err(ApiError::from)?;

    let authors = load_authors(db, comments.iter().map(|c| c.user_id)).await?;

    Ok(comments
        .into_iter()
        .filter_map(|comment| {
            let author = authors.get(&comment.user_id)?;
            Some(CommentView {
                id: comment.id,
                content: comment.content,
                likes_count: comment.likes_count,
                created_at: comment.created_at,
                parent_comment_id: comment.parent_comment_id,
                user_id: author.id,
                username: author.username.to_owned(),
                full_name: author.full_name.to_owned(),
                avatar_url: author.avatar_url.to_owned(),
            })
        })
        .collect())
}

/// The subset of `post_ids` the viewer has liked. Anonymous viewers like
/// nothing.
pub async fn liked_post_set(
    db: &DatabaseConnection,
    viewer_id: Option<i32>,
    post_ids: Vec<i32>,
) -> Result<HashSet<i32>, ApiError> {
    let viewer_id = match viewer_id {
        Some(id) if !post_ids.is_empty() => id,
        _ => return Ok(HashSet::new()),
    };
    let likes = post_likes::Entity::find()
        .filter(post_likes::Column::UserId.eq(viewer_id))
        .filter(post_likes::Column::PostId.is_in(post_ids))
        .all(db)
        .await
        .map_err(ApiError::from)?;
    Ok(likes.into_iter().map(|like| like.post_id).collect())
}

async fn load_authors(
    db: &DatabaseConnection,
    user_ids: impl Iterator<Item = i32>,
) -> Result<HashMap<i32, users::Model>, ApiError> {
    let ids: HashSet<i32> = user_ids.collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let users = users::Entity::find()
        .filter(users::Column::Id.is_in(ids))
        .all(db)
        .await
        .map_err(ApiError::from)?;
    Ok(users.into_iter().map(|user| (user.id, user)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn post_row(id: i32, likes_count: i32) -> posts::Model {
        posts::Model {
            id,
            user_id: 1,
            content: Some("hello".to_owned()),
            image_url: None,
            likes_count,
            comments_count: 0,
            shares_count: 0,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[actix_rt::test]
    async fn feed_reports_the_clamped_page_and_limit() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<posts::Model>::new()])
            .into_connection();

        let page = feed(&db, None, 0, 500).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, FEED_MAX_LIMIT);
        assert!(page.posts.is_empty());

        // limit/offset bind as parameters; the clamped values ride along
        let log = db.into_transaction_log();
        let select = format!("{:?}", log[0]);
        assert!(select.contains("LIMIT"));
        assert!(select.contains("OFFSET"));
    }

    #[actix_rt::test]
    async fn create_post_requires_content_or_image() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let err = create_post(&db, 1, Some("   "), None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = create_post(&db, 1, None, None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_rt::test]
    async fn toggle_like_adds_when_no_edge_exists() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            // existence check, then the fresh count read-back
            .append_query_results([vec![post_row(5, 0)], vec![post_row(5, 1)]])
            .append_exec_results([
                // delete finds nothing
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // insert lands
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                // counter bump
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let (is_liked, likes_count) = toggle_like(&db, 5, 9).await.unwrap();
        assert!(is_liked);
        assert_eq!(likes_count, 1);
    }

    #[actix_rt::test]
    async fn toggle_like_removes_when_edge_exists() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post_row(5, 1)], vec![post_row(5, 0)]])
            .append_exec_results([
                // delete removes the edge
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                // counter drop
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
            ])
            .into_connection();

        let (is_liked, likes_count) = toggle_like(&db, 5, 9).await.unwrap();
        assert!(!is_liked);
        assert_eq!(likes_count, 0);
    }

    #[actix_rt::test]
    async fn toggle_like_lost_insert_race_does_not_increment() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![post_row(5, 1)], vec![post_row(5, 1)]])
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
                // conflicting insert affects no rows; no counter bump follows
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 0,
                },
            ])
            .into_connection();

        let (is_liked, likes_count) = toggle_like(&db, 5, 9).await.unwrap();
        assert!(is_liked);
        assert_eq!(likes_count, 1);
    }

    #[actix_rt::test]
    async fn toggle_like_unknown_post_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<posts::Model>::new()])
            .into_connection();

        let err = toggle_like(&db, 404, 9).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[actix_rt::test]
    async fn add_comment_requires_text() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let err = add_comment(&db, 5, 9, "   ", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[actix_rt::test]
    async fn add_comment_unknown_post_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let err = add_comment(&db, 404, 9, "hi", None).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
