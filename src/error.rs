use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::{Display, Error};
use sea_orm::DbErr;

/// Failure taxonomy shared by every handler. Internal store errors are logged
/// server-side and never leak their detail into the response body.
#[derive(Debug, Display, Error)]
pub enum ApiError {
    /// Missing or malformed input, reported with a field-specific message.
    #[display(fmt = "{}", _0)]
    Validation(#[error(not(source))] String),
    /// Missing, invalid, or expired session token on an endpoint that
    /// requires one.
    #[display(fmt = "authorization required")]
    Unauthorized,
    /// Login failure. Deliberately does not distinguish unknown email from
    /// wrong password.
    #[display(fmt = "invalid email or password")]
    InvalidCredentials,
    /// Duplicate registration, duplicate follow, self-follow.
    #[display(fmt = "{}", _0)]
    Conflict(#[error(not(source))] String),
    /// Unknown endpoint or unknown user/post reference.
    #[display(fmt = "{}", _0)]
    NotFound(#[error(not(source))] String),
    /// Store failure or unexpected internal error.
    #[display(fmt = "internal server error")]
    Internal,
}

impl From<DbErr> for ApiError {
    fn from(err: DbErr) -> Self {
        log::error!("database error: {}", err);
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            // Conflicts render as 400 to match what API clients were built
            // against, not 409.
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "error": self.to_string() }))
    }
}
