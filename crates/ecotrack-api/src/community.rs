use axum::{Json, extract::State};

use ecotrack_types::api::{CommunityOverview, LeaderboardEntry, LeaderboardQuery};

use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::QueryParams;

const OVERVIEW_LEADERS: u32 = 10;
const OVERVIEW_RECENT: u32 = 10;
const LEADERBOARD_MAX: u32 = 100;

pub async fn overview(State(state): State<AppState>) -> Result<Json<CommunityOverview>, ApiError> {
    let overview = state
        .db(|db| {
            Ok(CommunityOverview {
                totals: db.community_totals()?,
                leaderboard: db.leaderboard(OVERVIEW_LEADERS)?,
                recent_checkins: db.recent_checkins(OVERVIEW_RECENT)?,
            })
        })
        .await?;
    Ok(Json(overview))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    let limit = query.limit.clamp(1, LEADERBOARD_MAX);
    let entries = state.db(move |db| db.leaderboard(limit)).await?;
    Ok(Json(entries))
}
