use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State, http::StatusCode};
use axum_extra::extract::cookie::CookieJar;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use ecotrack_db::NewUser;
use ecotrack_types::api::{
    AuthResponse, Claims, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};
use ecotrack_types::models::User;

use crate::error::ApiError;
use crate::mail;
use crate::middleware::{auth_cookie, clear_auth_cookie, create_token};
use crate::state::{AppState, AppStateInner};
use crate::validation::{
    JsonBody, NAME_LEN, PASSWORD_LEN, Violations, normalize_email, validate_address,
};

const RESET_TOKEN_TTL_MINUTES: i64 = 60;

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let mut v = Violations::new();
    v.length("name", &req.name, NAME_LEN);
    v.email("email", &req.email);
    check_password(&mut v, "password", &req.password);
    if let Some(address) = &req.address {
        validate_address(&mut v, address);
    }
    v.into_result()?;

    let password_hash = hash_password(req.password).await?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        email: normalize_email(&req.email),
        password_hash,
        address: req.address.unwrap_or_default(),
        is_admin: false,
    };

    let user = state
        .db(move |db| db.create_user(&new_user))
        .await?
        .ok_or_else(|| ApiError::Conflict("Email is already registered".into()))?;

    info!("Registered {} ({})", user.email, user.id);
    state.mailer.send_in_background(mail::welcome(&user));

    let (jar, body) = issue_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, body))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let email = normalize_email(&req.email);
    let row = state
        .db(move |db| db.get_user_auth_by_email(&email))
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(req.password, row.password).await? {
        return Err(ApiError::InvalidCredentials);
    }

    issue_session(&state, jar, row.user)
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .db(move |db| db.get_user(claims.sub))
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user))
}

pub async fn logout(jar: CookieJar) -> (StatusCode, CookieJar) {
    (StatusCode::NO_CONTENT, clear_auth_cookie(jar))
}

/// Always answers 202 so the response does not reveal whether an account
/// exists for the address.
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let email = normalize_email(&req.email);
    let user = state
        .db(move |db| Ok(db.get_user_auth_by_email(&email)?.map(|row| row.user)))
        .await?;

    let Some(user) = user else {
        return Ok(StatusCode::ACCEPTED);
    };

    let token = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
    let token_hash = hash_reset_token(&token);
    let expires_at = chrono::Utc::now() + chrono::Duration::minutes(RESET_TOKEN_TTL_MINUTES);
    let user_id = user.id;
    state
        .db(move |db| db.insert_password_reset(&token_hash, user_id, expires_at))
        .await?;

    info!("Password reset requested for {}", user.id);
    state
        .mailer
        .send_in_background(mail::password_reset(&user, &state.frontend_url, &token));
    Ok(StatusCode::ACCEPTED)
}

pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let mut v = Violations::new();
    check_password(&mut v, "password", &req.password);
    v.into_result()?;

    let token_hash = hash_reset_token(req.token.trim());
    let lookup = token_hash.clone();
    if state.db(move |db| db.password_reset_user(&lookup)).await?.is_none() {
        return Err(invalid_reset_token());
    }

    // The token is spent only together with the password write
    let password_hash = hash_password(req.password).await?;
    let user_id = state
        .db(move |db| db.complete_password_reset(&token_hash, &password_hash))
        .await?
        .ok_or_else(invalid_reset_token)?;

    info!("Password reset completed for {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}

fn invalid_reset_token() -> ApiError {
    ApiError::BadRequest("Reset token is invalid or has expired".into())
}

fn issue_session(
    state: &AppStateInner,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let token = create_token(&state.jwt_secret, &user, state.token_ttl_days)?;
    let jar = jar.add(auth_cookie(token.clone(), state.cookie_secure));
    Ok((jar, Json(AuthResponse { user, token })))
}

pub(crate) fn check_password(v: &mut Violations, path: &str, password: &str) {
    let (min, max) = PASSWORD_LEN;
    let len = password.chars().count();
    if len < min {
        v.add(path, format!("must be at least {} characters", min));
    } else if len > max {
        v.add(path, format!("must be at most {} characters", max));
    }
}

/// Argon2id hash, computed off the async runtime.
pub(crate) async fn hash_password(password: String) -> Result<String, ApiError> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))
    })
    .await??;
    Ok(hash)
}

async fn verify_password(password: String, stored: String) -> Result<bool, ApiError> {
    let ok = tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored)
            .map_err(|e| anyhow::anyhow!("stored password hash is unreadable: {}", e))?;
        Ok::<_, anyhow::Error>(
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
        )
    })
    .await??;
    Ok(ok)
}

fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
