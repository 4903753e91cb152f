use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_name, validate_otp, validate_password};
use crate::db::{
    self, auth_providers, LoginRequest, LoginResponse, MessageResponse, NewUser,
    ResendOtpRequest, Role, SignupRequest, User, UserResponse, VerifyRequest,
};
use crate::notifications::OtpEmail;
use crate::AppState;

pub const SESSION_COOKIE: &str = "lustre_session";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random session token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token (or one-time code) for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Six decimal digits, zero padded
fn generate_otp() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", code)
}

fn otp_matches(code: &str, stored_hash: &str) -> bool {
    let provided = hash_token(code.trim());
    let provided = provided.as_bytes();
    let stored = stored_hash.as_bytes();
    provided.len() == stored.len() && provided.ct_eq(stored).into()
}

fn hash_password_or_500(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        tracing::error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to hash password")
    })
}

/// Issue a fresh code for `user`, store its hash and mail it
async fn issue_otp(state: &AppState, user: &User) -> Result<(), ApiError> {
    let code = generate_otp();
    let ttl = state.config.auth.otp_ttl_minutes;
    let expires_at = db::timestamp(chrono::Utc::now() + chrono::Duration::minutes(ttl));

    db::set_otp(&state.db, &user.id, &hash_token(&code), &expires_at).await?;

    state
        .mailer
        .send_otp(&OtpEmail {
            to: user.email.clone(),
            name: user.name.clone(),
            code,
            expires_in_minutes: ttl,
        })
        .await?;
    Ok(())
}

/// Create a session for `user`, returning the login payload and a jar carrying the cookie
pub(crate) async fn open_session(
    state: &AppState,
    jar: CookieJar,
    mut user: User,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    ensure_admin_role(state, &mut user).await?;

    let token = generate_token();
    let expires_at = db::timestamp(
        chrono::Utc::now() + chrono::Duration::days(state.config.auth.session_ttl_days),
    );
    db::create_session(&state.db, &user.id, &hash_token(&token), &expires_at).await?;

    tracing::info!(user_id = %user.id, "Session opened");

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(state.config.auth.secure_cookies)
        .same_site(SameSite::Lax);

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// Promote the operator account to admin if it is not already
async fn ensure_admin_role(state: &AppState, user: &mut User) -> Result<(), ApiError> {
    if !user.is_admin() && state.config.auth.is_admin_email(&user.email) {
        db::set_role(&state.db, &user.id, Role::Admin).await?;
        user.role = Role::Admin.as_str().to_string();
        tracing::info!(user_id = %user.id, "Promoted operator account to admin");
    }
    Ok(())
}

/// Signup endpoint
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_name(&request.name) {
        errors.add("name", e);
    }
    if let Err(e) = validate_email(&request.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_password(&request.password) {
        errors.add("password", e);
    }
    errors.finish()?;

    if db::find_user_by_email(&state.db, &request.email).await?.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = hash_password_or_500(&request.password)?;
    let user = db::create_user(
        &state.db,
        &NewUser {
            name: &request.name,
            email: &request.email,
            password_hash: &password_hash,
            verified: false,
            otp_hash: None,
            otp_expires_at: None,
            role: Role::User,
            auth_provider: auth_providers::CREDENTIALS,
        },
    )
    .await
    .map_err(|e| {
        if super::error::is_unique_violation(&e) {
            ApiError::conflict("User already exists")
        } else {
            ApiError::from(e)
        }
    })?;

    tracing::info!(user_id = %user.id, "User signed up");
    issue_otp(&state, &user).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "User created. Please check your email for the verification code.",
        )),
    ))
}

/// Confirm an email address with the one-time code
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = db::find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.verified {
        return Ok(Json(MessageResponse::new("Email already verified")));
    }

    let stored = user.otp_hash.as_deref().unwrap_or_default();
    if validate_otp(&request.otp).is_err() || !otp_matches(&request.otp, stored) {
        return Err(ApiError::bad_request("Invalid OTP"));
    }

    let expired = user
        .otp_expires_at
        .as_deref()
        .map(|at| at <= db::now().as_str())
        .unwrap_or(true);
    if expired {
        return Err(ApiError::bad_request("OTP expired"));
    }

    db::mark_verified(&state.db, &user.id).await?;
    tracing::info!(user_id = %user.id, "Email verified");

    Ok(Json(MessageResponse::new("Email verified successfully")))
}

pub async fn resend_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResendOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = db::find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.verified {
        return Err(ApiError::bad_request("Email already verified"));
    }

    issue_otp(&state, &user).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let user = db::find_user_by_email(&state.db, &request.email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("No user found"))?;

    if !user.verified {
        return Err(ApiError::unauthorized("Please verify your email"));
    }

    if !verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    open_session(&state, jar, user).await
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), ApiError> {
    let token = session_token(&headers).ok_or_else(|| ApiError::unauthorized("Not signed in"))?;
    db::delete_session(&state.db, &hash_token(&token)).await?;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Json(MessageResponse::new("Logged out"))))
}

pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Session token from `Authorization: Bearer`, falling back to the session cookie
fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Get the current user from a token
async fn current_user(state: &AppState, token: &str) -> Result<Option<User>, ApiError> {
    let Some(mut user) = db::find_session_user(&state.db, &hash_token(token)).await? else {
        return Ok(None);
    };
    ensure_admin_role(state, &mut user).await?;
    Ok(Some(user))
}

/// Extractor for the authenticated user; rejects with 401
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        current_user(state, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Session expired or invalid"))
    }
}

/// An authenticated user with the admin role; rejects with 403 otherwise
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = User::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ApiError::forbidden("Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

/// The caller's user when a valid session is presented, `None` otherwise
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match session_token(&parts.headers) {
            Some(token) => Ok(MaybeUser(current_user(state, &token).await?)),
            None => Ok(MaybeUser(None)),
        }
    }
}
