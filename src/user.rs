use crate::db::get_db_pool;
use crate::error::ApiError;
use crate::orm::users;
use crate::session::resolve_session;
use actix_web::HttpRequest;
use serde::Serialize;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Represents information about this request's client. Built once per
/// request from the `X-Auth-Token` header and passed explicitly into each
/// action handler.
#[derive(Debug, Default)]
pub struct Client {
    pub user: Option<users::Model>,
}

impl Client {
    /// Resolves the client from the request headers. A missing, unknown, or
    /// expired token yields an anonymous client, not an error; only endpoints
    /// that require authentication escalate that to `Unauthorized`.
    pub async fn resolve(req: &HttpRequest) -> Result<Self, ApiError> {
        let token = match token_from_request(req) {
            Some(token) => token,
            None => return Ok(Self::default()),
        };
        let user = resolve_session(get_db_pool(), &token)
            .await
            .map_err(ApiError::from)?;
        Ok(Self { user })
    }

    pub fn require(&self) -> Result<&users::Model, ApiError> {
        self.user.as_ref().ok_or(ApiError::Unauthorized)
    }

    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_user(&self) -> bool {
        self.user.is_some()
    }
}

/// Header names are matched case-insensitively by actix; the trim covers
/// clients that pad the token value.
pub fn token_from_request(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// A mini struct for embedding the acting user in responses.
#[derive(Clone, Debug, Serialize)]
pub struct ClientUser {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

impl From<&users::Model> for ClientUser {
    fn from(user: &users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username.to_owned(),
            full_name: user.full_name.to_owned(),
            avatar_url: user.avatar_url.to_owned(),
        }
    }
}

/// Row shape for follower/following listings.
#[derive(Clone, Debug, Serialize)]
pub struct UserSummary {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub is_following: bool,
}

impl UserSummary {
    pub fn from_user(user: &users::Model, is_following: bool) -> Self {
        Self {
            id: user.id,
            username: user.username.to_owned(),
            full_name: user.full_name.to_owned(),
            avatar_url: user.avatar_url.to_owned(),
            is_verified: user.is_verified,
            is_following,
        }
    }
}

/// Row shape for search results; carries the counters search orders by.
#[derive(Clone, Debug, Serialize)]
pub struct UserSearchResult {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub followers_count: i32,
    pub posts_count: i32,
    pub is_following: bool,
}

impl UserSearchResult {
    pub fn from_user(user: &users::Model, is_following: bool) -> Self {
        Self {
            id: user.id,
            username: user.username.to_owned(),
            full_name: user.full_name.to_owned(),
            avatar_url: user.avatar_url.to_owned(),
            is_verified: user.is_verified,
            followers_count: user.followers_count,
            posts_count: user.posts_count,
            is_following,
        }
    }
}
