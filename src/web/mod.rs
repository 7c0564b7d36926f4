pub mod auth;
pub mod post;
pub mod social;
pub mod upload;

use crate::error::ApiError;
use crate::user::Client;
use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    #[serde(default)]
    pub action: Option<String>,
}

/// CORS contract: every response carries these, preflights included.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add(("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .add((
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Auth-Token",
        ))
        .add(("Access-Control-Max-Age", "86400"))
}

/// Preflights short-circuit to an empty 200; the CORS headers come from the
/// DefaultHeaders wrap.
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// Text actions carry small JSON forms.
const API_BODY_LIMIT: usize = 256 * 1024;
/// Uploads carry base64 data-URIs up to 7,000,000 encoded chars, so the
/// transport limit must sit above the validator's ceiling.
const UPLOAD_BODY_LIMIT: usize = 8 * 1024 * 1024;

/// Configures the web app.
///
/// Every action shares one path and is keyed on the `action` query
/// parameter; only image upload gets a path of its own.
pub fn configure(conf: &mut web::ServiceConfig) {
    conf.service(
        web::resource("/api")
            .app_data(web::PayloadConfig::new(API_BODY_LIMIT))
            .route(web::get().to(dispatch_get))
            .route(web::post().to(dispatch_post))
            .route(web::method(Method::OPTIONS).to(preflight)),
    )
    .service(
        web::resource("/api/upload")
            .app_data(web::PayloadConfig::new(UPLOAD_BODY_LIMIT))
            .route(web::post().to(upload::put_image))
            .route(web::method(Method::OPTIONS).to(preflight)),
    )
    .default_service(web::route().to(unknown_endpoint));
}

async fn unknown_endpoint() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound("endpoint not found".to_owned()))
}

async fn dispatch_get(
    req: HttpRequest,
    query: web::Query<ActionQuery>,
) -> Result<HttpResponse, ApiError> {
    let client = Client::resolve(&req).await?;

    match query.action.as_deref() {
        None | Some("") => post::view_feed(&req, &client).await,
        Some("me") => auth::view_me(&client).await,
        Some("comments") => post::view_comments(&req).await,
        Some("followers") => social::view_followers(&req, &client).await,
        Some("following") => social::view_following(&req, &client).await,
        Some("search") => social::view_search(&req, &client).await,
        Some("profile") => social::view_profile(&req, &client).await,
        Some(_) => Err(ApiError::NotFound("endpoint not found".to_owned())),
    }
}

async fn dispatch_post(
    req: HttpRequest,
    query: web::Query<ActionQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let client = Client::resolve(&req).await?;

    match query.action.as_deref() {
        Some("register") => auth::register(&body).await,
        Some("login") => auth::login(&body).await,
        Some("logout") => auth::logout(&req).await,
        Some("create") => post::create(&client, &body).await,
        Some("like") => post::like(&client, &body).await,
        Some("comment") => post::comment(&client, &body).await,
        Some("follow") => social::follow(&client, &body).await,
        Some("unfollow") => social::unfollow(&client, &body).await,
        _ => Err(ApiError::NotFound("endpoint not found".to_owned())),
    }
}

/// Missing bodies read as `{}` so per-field validation gets to report the
/// concrete missing field.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &web::Bytes) -> Result<T, ApiError> {
    let raw: &[u8] = if body.is_empty() { b"{}" } else { body.as_ref() };
    serde_json::from_slice(raw)
        .map_err(|_| ApiError::Validation("request body must be valid JSON".to_owned()))
}

/// Per-action query strings are re-parsed from the raw request so each
/// action can declare its own parameter struct.
pub(crate) fn parse_query<T: DeserializeOwned>(req: &HttpRequest) -> Result<T, ApiError> {
    web::Query::<T>::from_query(req.query_string())
        .map(web::Query::into_inner)
        .map_err(|_| ApiError::Validation("malformed query parameters".to_owned()))
}
