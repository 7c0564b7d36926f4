use crate::db::get_db_pool;
use crate::error::ApiError;
use crate::session::invalidate_session;
use crate::user::{token_from_request, Client};
use crate::web::parse_body;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "fullName", alias = "full_name")]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn register(body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let form: RegisterForm = parse_body(body)?;
    let registration = crate::auth::register(
        get_db_pool(),
        &form.username,
        &form.email,
        &form.password,
        &form.full_name,
    )
    .await?;

    log::info!("registered user {}", registration.user.username);

    Ok(HttpResponse::Created().json(json!({
        "user": registration.user,
        "session_token": registration.session.session_token,
        "message": "registration successful",
    })))
}

pub async fn login(body: &web::Bytes) -> Result<HttpResponse, ApiError> {
    let form: LoginForm = parse_body(body)?;
    let user = crate::auth::authenticate(get_db_pool(), &form.email, &form.password).await?;
    let session = crate::session::new_session(get_db_pool(), user.id)
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(json!({
        "user": user,
        "session_token": session.session_token,
        "message": "login successful",
    })))
}

/// Logout succeeds whether or not a token was sent; invalidation is
/// idempotent.
pub async fn logout(req: &HttpRequest) -> Result<HttpResponse, ApiError> {
    if let Some(token) = token_from_request(req) {
        invalidate_session(get_db_pool(), &token)
            .await
            .map_err(ApiError::from)?;
    }

    Ok(HttpResponse::Ok().json(json!({ "message": "logged out" })))
}

pub async fn view_me(client: &Client) -> Result<HttpResponse, ApiError> {
    let user = client.require()?;
    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}
