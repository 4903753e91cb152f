//! User and session models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// Where an account's identity comes from
pub mod auth_providers {
    pub const CREDENTIALS: &str = "credentials";
    pub const GOOGLE: &str = "google";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub verified: bool,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<String>,
    pub role: String,
    pub auth_provider: String,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub verified: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            verified: user.verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// New account as stored at signup or first OAuth login
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub verified: bool,
    pub otp_hash: Option<&'a str>,
    pub otp_expires_at: Option<&'a str>,
    pub role: Role,
    pub auth_provider: &'a str,
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
        .bind(email.trim())
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_id(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn create_user(db: &SqlitePool, new: &NewUser<'_>) -> Result<User, sqlx::Error> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = crate::db::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, verified, otp_hash, otp_expires_at,
                           role, auth_provider, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(new.name.trim())
    .bind(new.email.trim().to_lowercase())
    .bind(new.password_hash)
    .bind(new.verified)
    .bind(new.otp_hash)
    .bind(new.otp_expires_at)
    .bind(new.role.as_str())
    .bind(new.auth_provider)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(db)
        .await
}

/// Replace the pending one-time code of an unverified account
pub async fn set_otp(
    db: &SqlitePool,
    user_id: &str,
    otp_hash: &str,
    expires_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET otp_hash = ?, otp_expires_at = ?, updated_at = ? WHERE id = ?")
        .bind(otp_hash)
        .bind(expires_at)
        .bind(crate::db::now())
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn mark_verified(db: &SqlitePool, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE users SET verified = 1, otp_hash = NULL, otp_expires_at = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(crate::db::now())
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn set_role(db: &SqlitePool, user_id: &str, role: Role) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(crate::db::now())
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn create_session(
    db: &SqlitePool,
    user_id: &str,
    token_hash: &str,
    expires_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(crate::db::now())
    .execute(db)
    .await?;
    Ok(())
}

/// Resolve an unexpired session to its user
pub async fn find_session_user(
    db: &SqlitePool,
    token_hash: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT u.* FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ? AND s.expires_at > ?
        "#,
    )
    .bind(token_hash)
    .bind(crate::db::now())
    .fetch_optional(db)
    .await
}

pub async fn delete_session(db: &SqlitePool, token_hash: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn purge_expired_sessions(db: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(crate::db::now())
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
