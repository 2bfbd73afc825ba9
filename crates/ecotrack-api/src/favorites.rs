use axum::{Extension, Json, extract::State};
use uuid::Uuid;

use ecotrack_types::api::{Claims, FavoriteToggleResponse};
use ecotrack_types::models::Mission;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::PathParam;

pub async fn list_favorites(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Mission>>, ApiError> {
    let include_unpublished = state.is_admin(claims.sub).await?;
    let missions = state
        .db(move |db| db.favorite_missions(claims.sub, include_unpublished))
        .await?;
    Ok(Json(missions))
}

/// Toggle a mission in the caller's favorites. Same call again undoes it.
/// Drafts are invisible to non-admins, so favoriting one is a 404.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(mission_id): PathParam<Uuid>,
) -> Result<Json<FavoriteToggleResponse>, ApiError> {
    let user_id = claims.sub;
    let caller_is_admin = state.is_admin(user_id).await?;
    let toggled = state
        .db(move |db| {
            match db.get_mission(mission_id)? {
                Some(mission) if mission.is_published || caller_is_admin => {}
                _ => return Ok(None),
            }
            db.toggle_favorite(user_id, mission_id).map(Some)
        })
        .await?;

    let (favorited, favorites) = toggled.ok_or(ApiError::NotFound("Mission"))?;
    Ok(Json(FavoriteToggleResponse { favorited, favorites }))
}
