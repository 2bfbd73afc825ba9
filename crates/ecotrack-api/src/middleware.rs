use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use ecotrack_types::api::Claims;
use ecotrack_types::models::User;

use crate::error::ApiError;
use crate::state::AppState;

/// Name of the httpOnly cookie carrying the same JWT as the bearer header.
pub const AUTH_COOKIE: &str = "ecotrack_token";

/// Claims of the caller on routes that work with or without a login.
#[derive(Debug, Clone)]
pub struct Viewer(pub Option<Claims>);

/// Bearer header first, then the auth cookie.
pub fn request_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }
    CookieJar::from_headers(headers)
        .get(AUTH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn create_token(secret: &str, user: &User, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        is_admin: user.is_admin,
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn auth_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((AUTH_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

pub fn clear_auth_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(AUTH_COOKIE).path("/"))
}

/// Reject the request with 401 unless it carries a valid JWT.
pub async fn verify_jwt(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(&state.jwt_secret, &token).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Attach a [`Viewer`]; an absent or invalid token just means anonymous.
pub async fn optional_jwt(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = request_token(req.headers()).and_then(|token| decode_token(&state.jwt_secret, &token));

    req.extensions_mut().insert(Viewer(claims));
    next.run(req).await
}

/// Must run after [`verify_jwt`]. The admin flag is read from the database,
/// not the token, so demotions apply immediately.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id = req
        .extensions()
        .get::<Claims>()
        .map(|claims| claims.sub)
        .ok_or(ApiError::Unauthorized)?;

    if !state.is_admin(user_id).await? {
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}
