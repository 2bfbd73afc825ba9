use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Address, Category, Difficulty, Impact, SchemaField, SubmissionStatus, User,
};

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub address: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub address: Option<Address>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub search: Option<String>,
}

// -- Missions --

/// Body of `POST /missions` and `PUT /missions/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissionInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub points: i64,
    #[serde(default)]
    pub impact: Impact,
    #[serde(default)]
    pub submission_schema: Vec<SchemaField>,
    #[serde(default)]
    pub is_published: bool,
}

/// Body of `PATCH /missions/{id}`. Absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MissionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub points: Option<i64>,
    pub impact: Option<Impact>,
    pub submission_schema: Option<Vec<SchemaField>>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MissionQuery {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub search: Option<String>,
}

// -- Submissions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateSubmissionRequest {
    pub mission_id: Uuid,
    #[serde(default)]
    pub answers: BTreeMap<String, Value>,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmissionQuery {
    pub status: Option<SubmissionStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproveRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RejectRequest {
    pub reason: String,
}

// -- Favorites --

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteToggleResponse {
    pub favorited: bool,
    pub favorites: Vec<Uuid>,
}

// -- Community --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommunityTotals {
    pub users: i64,
    pub approved_submissions: i64,
    pub points: i64,
    pub co2_kg: f64,
    pub water_liters: f64,
    pub waste_kg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: Uuid,
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentCheckin {
    pub user_id: Uuid,
    pub user_name: String,
    pub mission_id: Uuid,
    pub mission_title: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommunityOverview {
    pub totals: CommunityTotals,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub recent_checkins: Vec<RecentCheckin>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    pub limit: u32,
}

fn default_leaderboard_limit() -> u32 {
    20
}

// -- Errors --

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}
