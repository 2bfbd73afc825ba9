use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use ecotrack_db::{UpdateUser, UserChanges};
use ecotrack_types::api::{Claims, UpdateUserRequest, UserQuery};
use ecotrack_types::models::User;

use crate::auth::{check_password, hash_password};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::{
    JsonBody, NAME_LEN, PathParam, QueryParams, Violations, normalize_email, validate_address,
};

pub async fn list_users(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UserQuery>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state
        .db(move |db| db.list_users(query.search.as_deref()))
        .await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(user_id): PathParam<Uuid>,
) -> Result<Json<User>, ApiError> {
    state.ensure_self_or_admin(&claims, user_id).await?;

    let user = state
        .db(move |db| db.get_user(user_id))
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(user_id): PathParam<Uuid>,
    JsonBody(req): JsonBody<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let caller_is_admin = state.is_admin(claims.sub).await?;
    if claims.sub != user_id && !caller_is_admin {
        return Err(ApiError::Forbidden);
    }

    if let Some(is_admin) = req.is_admin {
        if !caller_is_admin {
            return Err(ApiError::Forbidden);
        }
        if !is_admin && claims.sub == user_id {
            return Err(ApiError::BadRequest("Admins cannot remove their own admin role".into()));
        }
    }

    let mut v = Violations::new();
    if let Some(name) = &req.name {
        v.length("name", name, NAME_LEN);
    }
    if let Some(email) = &req.email {
        v.email("email", email);
    }
    if let Some(password) = &req.password {
        check_password(&mut v, "password", password);
    }
    if let Some(address) = &req.address {
        validate_address(&mut v, address);
    }
    v.into_result()?;

    let password_hash = match req.password {
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };
    let changes = UserChanges {
        name: req.name.map(|name| name.trim().to_string()),
        email: req.email.as_deref().map(normalize_email),
        password_hash,
        address: req.address,
        is_admin: req.is_admin,
    };

    match state.db(move |db| db.update_user(user_id, &changes)).await? {
        UpdateUser::Updated(user) => {
            if let Some(is_admin) = req.is_admin {
                info!("{} set admin={} on {}", claims.sub, is_admin, user.id);
            }
            Ok(Json(user))
        }
        UpdateUser::NotFound => Err(ApiError::NotFound("User")),
        UpdateUser::EmailTaken => Err(ApiError::Conflict("Email is already registered".into())),
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(user_id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.ensure_self_or_admin(&claims, user_id).await?;

    if !state.db(move |db| db.delete_user(user_id)).await? {
        return Err(ApiError::NotFound("User"));
    }

    info!("User {} deleted by {}", user_id, claims.sub);
    Ok(StatusCode::NO_CONTENT)
}
