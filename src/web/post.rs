use crate::db::get_db_pool;
use crate::error::ApiError;
use crate::post::{add_comment, create_post, feed, list_comments, toggle_like, FEED_DEFAULT_LIMIT};
use crate::user::{Client, ClientUser};
use crate::web::{parse_body, parse_query};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateForm {
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LikeForm {
    pub post_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    pub post_id: Option<i32>,
    #[serde(default)]
    pub content: String,
    pub parent_comment_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CommentListParams {
    pub post_id: Option<i32>,
}

pub async fn view_feed(req: &HttpRequest, client: &Client) -> Result<HttpResponse, ApiError> {
    let params: FeedParams = parse_query(req)?;
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(FEED_DEFAULT_LIMIT);

    let feed = feed(get_db_pool(), client.get_id(), page, limit).await?;

    Ok(HttpResponse::Ok().json(json!({
        "posts": feed.posts,
        "page": feed.page,
        "limit": feed.limit,
    })))
}

pub async fn create(client: &Client, body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let user = client.require()?;
    let form: CreateForm = parse_body(body)?;

    let post = create_post(
        get_db_pool(),
        user.id,
        form.content.as_deref(),
        form.image_url.as_deref(),
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "post": post,
        "user": ClientUser::from(user),
        "message": "post created",
    })))
}

pub async fn like(client: &Client, body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let user = client.require()?;
    let form: LikeForm = parse_body(body)?;
    let post_id = form
        .post_id
        .ok_or_else(|| ApiError::Validation("post id is required".to_owned()))?;

    let (is_liked, likes_count) = toggle_like(get_db_pool(), post_id, user.id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "is_liked": is_liked,
        "likes_count": likes_count,
    })))
}

pub async fn comment(client: &Client, body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let user = client.require()?;
    let form: CommentForm = parse_body(body)?;
    let post_id = form
        .post_id
        .ok_or_else(|| ApiError::Validation("post id is required".to_owned()))?;

    let comment = add_comment(
        get_db_pool(),
        post_id,
        user.id,
        &form.content,
        form.parent_comment_id,
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({
        "comment": comment,
        "user": ClientUser::from(user),
        "message": "comment added",
    })))
}

pub async fn view_comments(req: &HttpRequest) -> Result<HttpResponse, ApiError> {
    let params: CommentListParams = parse_query(req)?;
    let post_id = params
        .post_id
        .ok_or_else(|| ApiError::Validation("post id is required".to_owned()))?;

    let comments = list_comments(get_db_pool(), post_id).await?;

    Ok(HttpResponse::Ok().json(json!({ "comments": comments })))
}
