use crate::orm::{sessions, users};
use chrono::{Duration, Utc};
use once_cell::sync::OnceCell;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sea_orm::sea_query::Expr;
use sea_orm::{entity::*, query::*, ConnectionTrait, DatabaseConnection, DbErr};

/// 48 alphanumeric chars is just shy of 286 bits of entropy, comfortably
/// above the 256-bit floor for an unguessable bearer token.
pub const TOKEN_LEN: usize = 48;

const DEFAULT_SESSION_DAYS: i64 = 30;

static SESSION_DAYS: OnceCell<i64> = OnceCell::new();

/// Reads SESSION_DAYS from the environment. Optional; sessions last 30 days
/// when unset.
pub fn init() {
    let days = match std::env::var("SESSION_DAYS") {
        Ok(value) => value
            .parse::<i64>()
            .expect("SESSION_DAYS cannot be parsed as an integer"),
        Err(_) => DEFAULT_SESSION_DAYS,
    };
    if days <= 0 {
        panic!("SESSION_DAYS must be a positive number of days");
    }
    SESSION_DAYS.set(days).expect("failed to set SESSION_DAYS");
}

pub fn session_lifetime() -> Duration {
    Duration::days(*SESSION_DAYS.get().unwrap_or(&DEFAULT_SESSION_DAYS))
}

/// URL-safe opaque token, unique with overwhelming probability. The unique
/// index on `session_token` backstops the astronomically unlikely collision.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Issues a fresh session for the user. Multiple concurrent sessions per
/// user are allowed; nothing here invalidates older ones.
pub async fn new_session<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<sessions::Model, DbErr> {
    let now = Utc::now().naive_utc();
    sessions::ActiveModel {
        user_id: Set(user_id),
        session_token: Set(generate_token()),
        expires_at: Set(now + session_lifetime()),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Resolves a token to its owning user iff the session is still active.
/// Unknown and expired tokens both come back as `None`; callers decide
/// whether anonymous is acceptable.
pub async fn resolve_session(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<users::Model>, DbErr> {
    let session = sessions::Entity::find()
        .filter(sessions::Column::SessionToken.eq(token))
        .filter(sessions::Column::ExpiresAt.gt(Utc::now().naive_utc()))
        .one(db)
        .await?;

    match session {
        Some(session) => users::Entity::find_by_id(session.user_id).one(db).await,
        None => Ok(None),
    }
}

/// Expires the session now. Idempotent: expiring twice, or expiring a token
/// that never existed, is a no-op.
pub async fn invalidate_session(db: &DatabaseConnection, token: &str) -> Result<(), DbErr> {
    sessions::Entity::update_many()
        .col_expr(
            sessions::Column::ExpiresAt,
            Expr::value(Utc::now().naive_utc()),
        )
        .filter(sessions::Column::SessionToken.eq(token))
        .exec(db)
        .await?;
    Ok(())
}
