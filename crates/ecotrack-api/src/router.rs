use axum::{
    Json, Router, middleware,
    routing::{get, patch, post, put},
};
use serde_json::{Value, json};

use crate::middleware::{optional_jwt, require_admin, verify_jwt};
use crate::state::AppState;
use crate::{auth, community, favorites, missions, submissions, users};

/// The REST API. Route groups differ only in the auth they require; the
/// server adds the gateway route, CORS and tracing on top.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password));

    let browse_routes = Router::new()
        .route("/missions", get(missions::list_missions))
        .route("/missions/{mission_id}", get(missions::get_mission))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_jwt));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route(
            "/users/{user_id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/submissions", post(submissions::create_submission))
        .route("/submissions/mine", get(submissions::my_submissions))
        .route("/submissions/{submission_id}", get(submissions::get_submission))
        .route("/favorites", get(favorites::list_favorites))
        .route("/favorites/missions/{mission_id}", put(favorites::toggle_favorite))
        .route("/community/overview", get(community::overview))
        .route("/community/leaderboard", get(community::leaderboard))
        .route("/checkins/mine", get(submissions::my_checkins))
        .route_layer(middleware::from_fn_with_state(state.clone(), verify_jwt));

    // verify_jwt is added last so it runs before require_admin
    let admin_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/missions", post(missions::create_mission))
        .route(
            "/missions/{mission_id}",
            put(missions::replace_mission)
                .patch(missions::patch_mission)
                .delete(missions::delete_mission),
        )
        .route("/admin/submissions", get(submissions::review_queue))
        .route(
            "/admin/submissions/{submission_id}/approve",
            patch(submissions::approve_submission),
        )
        .route(
            "/admin/submissions/{submission_id}/reject",
            patch(submissions::reject_submission),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), verify_jwt));

    Router::new()
        .merge(public_routes)
        .merge(browse_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
