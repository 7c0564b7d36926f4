use crate::db::get_db_pool;
use crate::error::ApiError;
use crate::user::Client;
use crate::web::{parse_body, parse_query};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct TargetUserForm {
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UserParams {
    pub user_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn follow(client: &Client, body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let user = client.require()?;
    let form: TargetUserForm = parse_body(body)?;
    let following_id = form
        .user_id
        .ok_or_else(|| ApiError::Validation("user id is required".to_owned()))?;

    crate::social::follow(get_db_pool(), user.id, following_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "now following",
        "is_following": true,
    })))
}

pub async fn unfollow(client: &Client, body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let user = client.require()?;
    let form: TargetUserForm = parse_body(body)?;
    let following_id = form
        .user_id
        .ok_or_else(|| ApiError::Validation("user id is required".to_owned()))?;

    crate::social::unfollow(get_db_pool(), user.id, following_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "message": "no longer following",
        "is_following": false,
    })))
}

pub async fn view_followers(req: &HttpRequest, client: &Client) -> Result<HttpResponse, ApiError> {
    let params: UserParams = parse_query(req)?;
    let user_id = params
        .user_id
        .ok_or_else(|| ApiError::Validation("user id is required".to_owned()))?;

    let followers =
        crate::social::list_followers(get_db_pool(), user_id, client.get_id()).await?;

    Ok(HttpResponse::Ok().json(json!({ "followers": followers })))
}

pub async fn view_following(req: &HttpRequest, client: &Client) -> Result<HttpResponse, ApiError> {
    let params: UserParams = parse_query(req)?;
    let user_id = params
        .user_id
        .ok_or_else(|| ApiError::Validation("user id is required".to_owned()))?;

    let following =
        crate::social::list_following(get_db_pool(), user_id, client.get_id()).await?;

    Ok(HttpResponse::Ok().json(json!({ "following": following })))
}

pub async fn view_search(req: &HttpRequest, client: &Client) -> Result<HttpResponse, ApiError> {
    let params: SearchParams = parse_query(req)?;
    let query = params.q.trim();
    if query.is_empty() {
        return Err(ApiError::Validation("search query is required".to_owned()));
    }

    let users = crate::social::search_users(get_db_pool(), query, client.get_id()).await?;

    Ok(HttpResponse::Ok().json(json!({ "users": users })))
}

pub async fn view_profile(req: &HttpRequest, client: &Client) -> Result<HttpResponse, ApiError> {
    let params: UserParams = parse_query(req)?;
    let user_id = params
        .user_id
        .ok_or_else(|| ApiError::Validation("user id is required".to_owned()))?;

    let (profile, posts) = crate::social::get_profile(get_db_pool(), user_id, client.get_id())
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_owned()))?;

    Ok(HttpResponse::Ok().json(json!({
        "user": profile,
        "posts": posts,
    })))
}
