//! Sign in with Google (authorization code flow).

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::auth::open_session;
use super::error::ApiError;
use crate::config::OAuthProviderConfig;
use crate::db::{self, auth_providers, LoginResponse, NewUser, Role};
use crate::AppState;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Holds the `state` issued with the authorization URL until the callback
pub const OAUTH_STATE_COOKIE: &str = "lustre_oauth_state";

#[derive(Debug, Serialize)]
pub struct AuthUrlResponse {
    pub authorization_url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: String,
    /// Must echo the `state` returned by the authorization URL endpoint
    #[serde(default)]
    pub state: String,
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleProfile {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
}

/// URL-encode a string for use in query parameters
fn url_encode(s: &str) -> String {
    let mut encoded = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    encoded
}

fn google_config(state: &AppState) -> Result<&OAuthProviderConfig, ApiError> {
    state
        .config
        .oauth
        .google
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Google sign-in is not configured"))
}

fn authorize_url(config: &OAuthProviderConfig, csrf_state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&access_type=online&prompt=select_account",
        GOOGLE_AUTHORIZE_URL,
        url_encode(&config.client_id),
        url_encode(&config.redirect_uri),
        url_encode("openid email profile"),
        url_encode(csrf_state),
    )
}

fn state_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, value))
        .path("/api/auth/oauth")
        .http_only(true)
        .secure(state.config.auth.secure_cookies)
        .same_site(SameSite::Lax)
        .build()
}

fn state_matches(returned: &str, issued: &str) -> bool {
    let returned = returned.as_bytes();
    let issued = issued.as_bytes();
    !issued.is_empty() && returned.len() == issued.len() && returned.ct_eq(issued).into()
}

/// Authorization URL the storefront redirects to. The issued `state` is also
/// set as an HttpOnly cookie and checked again by the callback.
pub async fn google_auth_url(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthUrlResponse>), ApiError> {
    let config = google_config(&state)?;
    let csrf_state = uuid::Uuid::new_v4().to_string();

    Ok((
        jar.add(state_cookie(&state, csrf_state.clone())),
        Json(AuthUrlResponse {
            authorization_url: authorize_url(config, &csrf_state),
            state: csrf_state,
        }),
    ))
}

async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthProviderConfig,
    code: &str,
) -> Result<String, ApiError> {
    let response = client
        .post(GOOGLE_TOKEN_URL)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", config.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ApiError::external_service(format!("Failed to exchange code: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        tracing::warn!(%status, "Google rejected the authorization code");
        if status == StatusCode::BAD_REQUEST {
            return Err(ApiError::bad_request("Invalid or expired authorization code"));
        }
        return Err(ApiError::external_service(format!(
            "Google token endpoint error: {}",
            status
        )));
    }

    let token: GoogleTokenResponse = response
        .json()
        .await
        .map_err(|e| ApiError::external_service(format!("Failed to parse token response: {}", e)))?;
    Ok(token.access_token)
}

async fn fetch_profile(
    client: &reqwest::Client,
    access_token: &str,
) -> Result<GoogleProfile, ApiError> {
    let response = client
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| ApiError::external_service(format!("Failed to fetch profile: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::external_service(format!(
            "Google profile endpoint error: {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::external_service(format!("Failed to parse profile: {}", e)))
}

/// Exchange the authorization code and sign the Google account in,
/// creating a verified account on first use.
pub async fn google_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<OAuthCallbackRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let config = google_config(&state)?;
    let issued = jar
        .get(OAUTH_STATE_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();
    if !state_matches(request.state.trim(), &issued) {
        tracing::warn!("Google callback with missing or mismatched state");
        return Err(ApiError::bad_request("Invalid OAuth state"));
    }
    if request.code.trim().is_empty() {
        return Err(ApiError::bad_request("Authorization code is required"));
    }
    let jar = jar.remove(Cookie::build(OAUTH_STATE_COOKIE).path("/api/auth/oauth"));

    let client = reqwest::Client::new();
    let access_token = exchange_code(&client, config, request.code.trim()).await?;
    let profile = fetch_profile(&client, &access_token).await?;

    let email = match profile.email {
        Some(email) if profile.email_verified => email,
        _ => {
            return Err(ApiError::bad_request(
                "Google account has no verified email address",
            ))
        }
    };

    let user = match db::find_user_by_email(&state.db, &email).await? {
        Some(user) => {
            if !user.verified {
                db::mark_verified(&state.db, &user.id).await?;
            }
            db::find_user_by_id(&state.db, &user.id)
                .await?
                .ok_or_else(|| ApiError::internal("Account disappeared during sign-in"))?
        }
        None => {
            let name = profile
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let user = db::create_user(
                &state.db,
                &NewUser {
                    name: &name,
                    email: &email,
                    password_hash: "",
                    verified: true,
                    otp_hash: None,
                    otp_expires_at: None,
                    role: Role::User,
                    auth_provider: auth_providers::GOOGLE,
                },
            )
            .await?;
            tracing::info!(user_id = %user.id, "Created account from Google sign-in");
            user
        }
    };

    open_session(&state, jar, user).await
}
