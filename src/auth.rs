use crate::error::ApiError;
use crate::orm::{sessions, users};
use crate::session::new_session;
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, TransactionTrait};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug)]
pub struct Registration {
    pub user: users::Model,
    pub session: sessions::Model,
}

/// Argon2id with a per-user random salt. Deliberately slow; never swap this
/// for a general-purpose digest.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| {
            log::error!("argon2 hashing failed: {}", err);
            ApiError::Internal
        })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Creates an account and its first session in one transaction. Uniqueness
/// of username and email is decided by the insert itself (ON CONFLICT DO
/// NOTHING), not by a racy pre-read.
pub async fn register(
    db: &DatabaseConnection,
    username: &str,
    email: &str,
    password: &str,
    full_name: &str,
) -> Result<Registration, ApiError> {
    let username = username.trim();
    let email = email.trim().to_lowercase();
    let full_name = full_name.trim();

    if username.is_empty() || email.is_empty() || password.is_empty() || full_name.is_empty() {
        return Err(ApiError::Validation(
            "all required fields must be filled".to_owned(),
        ));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".to_owned(),
        ));
    }

    let password_hash = hash_password(password)?;
    let now = Utc::now().naive_utc();

    let txn = db.begin().await.map_err(ApiError::from)?;

    let user = users::Entity::insert(users::ActiveModel {
        username: Set(username.to_owned()),
        email: Set(email),
        password_hash: Set(password_hash),
        full_name: Set(full_name.to_owned()),
        is_verified: Set(false),
        followers_count: Set(0),
        following_count: Set(0),
        posts_count: Set(0),
        created_at: Set(now),
        ..Default::default()
    })
    .on_conflict(OnConflict::new().do_nothing().to_owned())
    .exec_with_returning(&txn)
    .await
    .map_err(|err| match err {
        DbErr::RecordNotInserted => ApiError::Conflict(
            "a user with this email or username already exists".to_owned(),
        ),
        other => ApiError::from(other),
    })?;

    let session = new_session(&txn, user.id).await?;

    txn.commit().await.map_err(ApiError::from)?;

    Ok(Registration { user, session })
}

/// Looks the user up by lowercased email and verifies the password hash.
/// Unknown email and wrong password produce the identical error; note the
/// two paths are not timing-equalized.
pub async fn authenticate(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
) -> Result<users::Model, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "email and password are required".to_owned(),
        ));
    }

    let user = users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(db)
        .await
        .map_err(ApiError::from)?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(ApiError::InvalidCredentials),
    }
}
