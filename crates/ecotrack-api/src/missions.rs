use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use ecotrack_db::{DeleteMission, MissionFilter};
use ecotrack_types::api::{Claims, MissionInput, MissionPatch, MissionQuery};
use ecotrack_types::models::Mission;

use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::state::{AppState, AppStateInner};
use crate::validation::{
    JsonBody, PathParam, QueryParams, validate_mission, validate_mission_patch,
};

async fn viewer_is_admin(state: &AppStateInner, viewer: &Viewer) -> Result<bool, ApiError> {
    match &viewer.0 {
        Some(claims) => state.is_admin(claims.sub).await,
        None => Ok(false),
    }
}

async fn load_mission(state: &AppStateInner, mission_id: Uuid) -> Result<Mission, ApiError> {
    state
        .db(move |db| db.get_mission(mission_id))
        .await?
        .ok_or(ApiError::NotFound("Mission"))
}

pub async fn list_missions(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    QueryParams(query): QueryParams<MissionQuery>,
) -> Result<Json<Vec<Mission>>, ApiError> {
    let filter = MissionFilter {
        category: query.category,
        difficulty: query.difficulty,
        search: query.search,
        include_unpublished: viewer_is_admin(&state, &viewer).await?,
    };

    let missions = state.db(move |db| db.list_missions(&filter)).await?;
    Ok(Json(missions))
}

/// Drafts are reported as missing to everyone but admins.
pub async fn get_mission(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    PathParam(mission_id): PathParam<Uuid>,
) -> Result<Json<Mission>, ApiError> {
    let mission = load_mission(&state, mission_id).await?;
    if !mission.is_published && !viewer_is_admin(&state, &viewer).await? {
        return Err(ApiError::NotFound("Mission"));
    }
    Ok(Json(mission))
}

pub async fn create_mission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(input): JsonBody<MissionInput>,
) -> Result<(StatusCode, Json<Mission>), ApiError> {
    validate_mission(&input)?;

    let now = Utc::now();
    let mission = Mission {
        id: Uuid::new_v4(),
        title: input.title.trim().to_string(),
        description: input.description,
        category: input.category,
        difficulty: input.difficulty,
        points: input.points,
        impact: input.impact,
        submission_schema: input.submission_schema,
        is_published: input.is_published,
        created_by: Some(claims.sub),
        created_at: now,
        updated_at: now,
    };

    let stored = mission.clone();
    state.db(move |db| db.insert_mission(&stored)).await?;

    info!("Mission '{}' ({}) created by {}", mission.title, mission.id, claims.sub);
    Ok((StatusCode::CREATED, Json(mission)))
}

pub async fn replace_mission(
    State(state): State<AppState>,
    PathParam(mission_id): PathParam<Uuid>,
    JsonBody(input): JsonBody<MissionInput>,
) -> Result<Json<Mission>, ApiError> {
    validate_mission(&input)?;

    let current = load_mission(&state, mission_id).await?;
    let mission = Mission {
        title: input.title.trim().to_string(),
        description: input.description,
        category: input.category,
        difficulty: input.difficulty,
        points: input.points,
        impact: input.impact,
        submission_schema: input.submission_schema,
        is_published: input.is_published,
        updated_at: Utc::now(),
        ..current
    };

    save(&state, mission).await
}

pub async fn patch_mission(
    State(state): State<AppState>,
    PathParam(mission_id): PathParam<Uuid>,
    JsonBody(patch): JsonBody<MissionPatch>,
) -> Result<Json<Mission>, ApiError> {
    validate_mission_patch(&patch)?;

    let mut mission = load_mission(&state, mission_id).await?;
    if let Some(title) = patch.title {
        mission.title = title.trim().to_string();
    }
    if let Some(description) = patch.description {
        mission.description = description;
    }
    if let Some(category) = patch.category {
        mission.category = category;
    }
    if let Some(difficulty) = patch.difficulty {
        mission.difficulty = difficulty;
    }
    if let Some(points) = patch.points {
        mission.points = points;
    }
    if let Some(impact) = patch.impact {
        mission.impact = impact;
    }
    if let Some(schema) = patch.submission_schema {
        mission.submission_schema = schema;
    }
    if let Some(is_published) = patch.is_published {
        mission.is_published = is_published;
    }
    mission.updated_at = Utc::now();

    save(&state, mission).await
}

async fn save(state: &AppStateInner, mission: Mission) -> Result<Json<Mission>, ApiError> {
    let stored = mission.clone();
    if !state.db(move |db| db.update_mission(&stored)).await? {
        return Err(ApiError::NotFound("Mission"));
    }
    Ok(Json(mission))
}

pub async fn delete_mission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(mission_id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError> {
    match state.db(move |db| db.delete_mission(mission_id)).await? {
        DeleteMission::Deleted => {
            info!("Mission {} deleted by {}", mission_id, claims.sub);
            Ok(StatusCode::NO_CONTENT)
        }
        DeleteMission::NotFound => Err(ApiError::NotFound("Mission")),
        DeleteMission::HasCheckins => Err(ApiError::Conflict(
            "Mission has approved check-ins and cannot be deleted".into(),
        )),
    }
}
