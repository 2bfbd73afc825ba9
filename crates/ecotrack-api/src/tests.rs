//! End-to-end tests driving the router in-process against an in-memory DB.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use ecotrack_db::Database;
use ecotrack_gateway::dispatcher::Dispatcher;

use crate::mail::{Email, Mailer};
use crate::router::router;
use crate::state::{AppState, AppStateInner};

struct TestApp {
    state: AppState,
    app: Router,
    outbox: Arc<Mutex<Vec<Email>>>,
}

impl TestApp {
    fn new() -> Self {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let state: AppState = Arc::new(AppStateInner {
            db: Arc::new(Database::open_in_memory().unwrap()),
            jwt_secret: "test-secret".into(),
            token_ttl_days: 7,
            cookie_secure: false,
            frontend_url: "http://localhost:5173".into(),
            mailer: Mailer::Outbox(outbox.clone()),
            dispatcher: Dispatcher::new(),
        });
        let app = router(state.clone());
        Self { state, app, outbox }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, name: &str, email: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "s3cret-pass" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    async fn admin(&self) -> String {
        let (token, _) = self.register("Ada Admin", "ada@example.com").await;
        assert!(self.state.db.set_admin_by_email("ada@example.com", true).unwrap());
        token
    }

    async fn create_mission(&self, admin: &str, published: bool) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/missions",
                Some(admin),
                Some(json!({
                    "title": "Bike to work",
                    "description": "Leave the car at home",
                    "category": "transport",
                    "difficulty": "easy",
                    "points": 40,
                    "impact": { "co2_kg": 2.5 },
                    "submission_schema": [
                        { "key": "km", "label": "Distance", "kind": "number", "required": true }
                    ],
                    "is_published": published
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn submit(&self, token: &str, mission_id: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/submissions",
            Some(token),
            Some(json!({
                "mission_id": mission_id,
                "answers": { "km": 12 },
                "evidence_urls": ["https://example.com/ride.jpg"]
            })),
        )
        .await
    }

    /// Waits for the background mailer to deliver a message with `subject`.
    async fn mail_with_subject(&self, subject: &str) -> Email {
        for _ in 0..100 {
            let found = self
                .outbox
                .lock()
                .unwrap()
                .iter()
                .find(|email| email.subject == subject)
                .cloned();
            if let Some(email) = found {
                return email;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no mail with subject '{subject}' was sent");
    }

    /// Runs forgot-password and returns the token from the mailed link.
    async fn request_reset(&self, email: &str) -> String {
        let (status, _) = self
            .call(
                Method::POST,
                "/auth/forgot-password",
                None,
                Some(json!({ "email": email })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let mail = self.mail_with_subject("Reset your EcoTrack password").await;
        assert_eq!(mail.to, email.to_lowercase());
        mail.text
            .split("reset-password?token=")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap()
            .to_string()
    }

    async fn login(&self, email: &str, password: &str) -> StatusCode {
        let (status, _) = self
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        status
    }

    async fn points(&self, token: &str) -> i64 {
        let (_, me) = self.call(Method::GET, "/auth/me", Some(token), None).await;
        me["points"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn health_is_public() {
    let t = TestApp::new();
    let (status, body) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn duplicate_email_conflicts_without_creating_a_user() {
    let t = TestApp::new();
    t.register("Robin", "robin@example.com").await;

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Other Robin", "email": "ROBIN@example.com", "password": "another-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
    assert_eq!(t.state.db.list_users(None).unwrap().len(), 1);
}

#[tokio::test]
async fn register_validation_reports_every_field() {
    let t = TestApp::new();
    let (status, body) = t
        .call(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "R", "email": "nope", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["details"].as_object().unwrap();
    assert!(details.contains_key("name"));
    assert!(details.contains_key("email"));
    assert!(details.contains_key("password"));
}

#[tokio::test]
async fn login_accepts_right_password_only() {
    let t = TestApp::new();
    t.register("Robin", "robin@example.com").await;

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "robin@example.com", "password": "s3cret-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());

    let (wrong, _) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "robin@example.com", "password": "wrong-pass" })),
        )
        .await;
    let (unknown, _) = t
        .call(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ghost@example.com", "password": "s3cret-pass" })),
        )
        .await;
    assert_eq!(wrong, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let t = TestApp::new();
    let (status, _) = t.call(Method::GET, "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.call(Method::GET, "/auth/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_refuse_regular_users() {
    let t = TestApp::new();
    let (token, _) = t.register("Robin", "robin@example.com").await;

    let (status, _) = t.call(Method::GET, "/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.call(Method::GET, "/admin/submissions", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unpublished_missions_are_invisible_to_users() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let draft = t.create_mission(&admin, false).await;
    t.create_mission(&admin, true).await;

    let (_, listed) = t.call(Method::GET, "/missions", Some(&user), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let (_, anonymous) = t.call(Method::GET, "/missions", None, None).await;
    assert_eq!(anonymous.as_array().unwrap().len(), 1);
    let (_, all) = t.call(Method::GET, "/missions", Some(&admin), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (status, _) = t.call(Method::GET, &format!("/missions/{draft}"), Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cannot_submit_to_unpublished_or_missing_mission() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let draft = t.create_mission(&admin, false).await;

    let (status, _) = t.submit(&user, &draft).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.submit(&user, &uuid::Uuid::new_v4().to_string()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn answers_are_validated_against_the_mission_form() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;

    let (status, body) = t
        .call(
            Method::POST,
            "/submissions",
            Some(&user),
            Some(json!({ "mission_id": mission, "answers": { "km": "far", "mood": "great" } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["answers.km"].is_string());
    assert!(body["details"]["answers.mood"].is_string());
}

#[tokio::test]
async fn second_pending_submission_conflicts() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;

    let (first, _) = t.submit(&user, &mission).await;
    let (second, _) = t.submit(&user, &mission).await;
    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::CONFLICT);

    let (_, mine) = t.call(Method::GET, "/submissions/mine", Some(&user), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["mission_title"], "Bike to work");
}

#[tokio::test]
async fn approval_awards_points_once_and_records_one_checkin() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;
    let (_, submission) = t.submit(&user, &mission).await;
    let id = submission["id"].as_str().unwrap();

    let (_, queue) = t.call(Method::GET, "/admin/submissions", Some(&admin), None).await;
    assert_eq!(queue.as_array().unwrap().len(), 1);

    let approve = format!("/admin/submissions/{id}/approve");
    let (status, approved) = t
        .call(Method::PATCH, &approve, Some(&admin), Some(json!({ "note": "Great ride" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["review_note"], "Great ride");

    let (again, _) = t.call(Method::PATCH, &approve, Some(&admin), None).await;
    assert_eq!(again, StatusCode::CONFLICT);

    assert_eq!(t.points(&user).await, 40);
    let (_, checkins) = t.call(Method::GET, "/checkins/mine", Some(&user), None).await;
    assert_eq!(checkins.as_array().unwrap().len(), 1);
    assert_eq!(checkins[0]["points"], 40);

    // an approved mission can be submitted again
    let (status, _) = t.submit(&user, &mission).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn rejection_keeps_points_and_reason() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;
    let (_, submission) = t.submit(&user, &mission).await;
    let reject = format!("/admin/submissions/{}/reject", submission["id"].as_str().unwrap());

    let (status, _) = t.call(Method::PATCH, &reject, Some(&admin), Some(json!({ "reason": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, rejected) = t
        .call(Method::PATCH, &reject, Some(&admin), Some(json!({ "reason": "Photo is blurry" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "rejected");
    assert_eq!(rejected["rejection_reason"], "Photo is blurry");
    assert_eq!(t.points(&user).await, 0);

    let (_, checkins) = t.call(Method::GET, "/checkins/mine", Some(&user), None).await;
    assert!(checkins.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn favorite_toggle_twice_restores_the_set() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;
    let uri = format!("/favorites/missions/{mission}");

    let (_, on) = t.call(Method::PUT, &uri, Some(&user), None).await;
    assert_eq!(on["favorited"], true);
    assert_eq!(on["favorites"], json!([mission]));

    let (_, off) = t.call(Method::PUT, &uri, Some(&user), None).await;
    assert_eq!(off["favorited"], false);
    assert_eq!(off["favorites"], json!([]));

    let (status, _) = t
        .call(Method::PUT, &format!("/favorites/missions/{}", uuid::Uuid::new_v4()), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_can_only_see_themselves() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (robin, robin_id) = t.register("Robin", "robin@example.com").await;
    let (_, sam_id) = t.register("Sam", "sam@example.com").await;

    let (status, _) = t.call(Method::GET, &format!("/users/{sam_id}"), Some(&robin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.call(Method::GET, &format!("/users/{robin_id}"), Some(&robin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t.call(Method::GET, &format!("/users/{sam_id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .call(
            Method::PATCH,
            &format!("/users/{robin_id}"),
            Some(&robin),
            Some(json!({ "is_admin": true })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_cannot_demote_themself() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (_, me) = t.call(Method::GET, "/auth/me", Some(&admin), None).await;
    let id = me["id"].as_str().unwrap();

    let (status, _) = t
        .call(Method::PATCH, &format!("/users/{id}"), Some(&admin), Some(json!({ "is_admin": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mission_with_checkins_cannot_be_deleted() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;
    let (_, submission) = t.submit(&user, &mission).await;
    let approve = format!("/admin/submissions/{}/approve", submission["id"].as_str().unwrap());
    t.call(Method::PATCH, &approve, Some(&admin), None).await;

    let (status, _) = t.call(Method::DELETE, &format!("/missions/{mission}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let unused = t.create_mission(&admin, true).await;
    let (status, _) = t.call(Method::DELETE, &format!("/missions/{unused}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn patch_mission_publishes_it() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;
    let draft = t.create_mission(&admin, false).await;

    let (status, patched) = t
        .call(Method::PATCH, &format!("/missions/{draft}"), Some(&admin), Some(json!({ "is_published": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched["is_published"], true);
    assert_eq!(patched["title"], "Bike to work");

    let (status, _) = t.call(Method::GET, &format!("/missions/{draft}"), Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn community_overview_reflects_approvals() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, user_id) = t.register("Robin", "robin@example.com").await;
    let mission = t.create_mission(&admin, true).await;
    let (_, submission) = t.submit(&user, &mission).await;
    let approve = format!("/admin/submissions/{}/approve", submission["id"].as_str().unwrap());
    t.call(Method::PATCH, &approve, Some(&admin), None).await;

    let (status, overview) = t.call(Method::GET, "/community/overview", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["totals"]["approved_submissions"], 1);
    assert_eq!(overview["totals"]["points"], 40);
    assert_eq!(overview["leaderboard"][0]["user_id"], user_id.as_str());
    assert_eq!(overview["leaderboard"][0]["rank"], 1);
    assert_eq!(overview["recent_checkins"][0]["mission_title"], "Bike to work");

    let (_, board) = t
        .call(Method::GET, "/community/leaderboard?limit=1", Some(&user), None)
        .await;
    assert_eq!(board.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn password_reset_with_unknown_token_fails() {
    let t = TestApp::new();
    let (status, _) = t
        .call(
            Method::POST,
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "ghost@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = t
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": "made-up", "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let t = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_path_and_query_are_validation_errors() {
    let t = TestApp::new();
    let (user, _) = t.register("Robin", "robin@example.com").await;

    let (status, body) = t.call(Method::GET, "/submissions/not-a-uuid", Some(&user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"]["path"].is_string());

    let (status, body) = t.call(Method::GET, "/missions/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["path"].is_string());

    let (status, body) = t
        .call(Method::GET, "/submissions/mine?status=bogus", Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["query"].is_string());

    let (status, body) = t
        .call(Method::GET, "/community/leaderboard?limit=abc", Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"]["query"].is_string());
}

#[tokio::test]
async fn unpublished_missions_cannot_be_favorited_or_listed() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (user, _) = t.register("Robin", "robin@example.com").await;

    let draft = t.create_mission(&admin, false).await;
    let (status, _) = t
        .call(Method::PUT, &format!("/favorites/missions/{draft}"), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, favorites) = t.call(Method::GET, "/favorites", Some(&user), None).await;
    assert_eq!(favorites, json!([]));

    // Favorited while live, then taken down
    let live = t.create_mission(&admin, true).await;
    let (status, _) = t
        .call(Method::PUT, &format!("/favorites/missions/{live}"), Some(&user), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = t
        .call(Method::PATCH, &format!("/missions/{live}"), Some(&admin), Some(json!({ "is_published": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, favorites) = t.call(Method::GET, "/favorites", Some(&user), None).await;
    assert_eq!(favorites, json!([]));

    let (status, _) = t
        .call(Method::PUT, &format!("/favorites/missions/{draft}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, favorites) = t.call(Method::GET, "/favorites", Some(&admin), None).await;
    assert_eq!(favorites[0]["id"], draft.as_str());
}

#[tokio::test]
async fn deleting_a_user_removes_everything_they_own() {
    let t = TestApp::new();
    let admin = t.admin().await;
    let (robin, robin_id) = t.register("Robin", "robin@example.com").await;
    let (_, sam_id) = t.register("Sam", "sam@example.com").await;
    let mission = t.create_mission(&admin, true).await;

    t.call(Method::PUT, &format!("/favorites/missions/{mission}"), Some(&robin), None).await;
    let (_, submission) = t.submit(&robin, &mission).await;
    let approve = format!("/admin/submissions/{}/approve", submission["id"].as_str().unwrap());
    let (status, _) = t.call(Method::PATCH, &approve, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let robin_id: uuid::Uuid = robin_id.parse().unwrap();
    let sam_id: uuid::Uuid = sam_id.parse().unwrap();
    t.state
        .db
        .insert_chat_message(&ecotrack_types::models::ChatMessage {
            id: uuid::Uuid::new_v4(),
            sender_id: robin_id,
            receiver_id: sam_id,
            content: "hi".into(),
            created_at: chrono::Utc::now(),
        })
        .unwrap();

    let (status, _) = t
        .call(Method::DELETE, &format!("/users/{robin_id}"), Some(&robin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let db = &t.state.db;
    assert!(db.get_user(robin_id).unwrap().is_none());
    assert!(db.favorite_missions(robin_id, true).unwrap().is_empty());
    assert!(db.list_user_submissions(robin_id, None).unwrap().is_empty());
    assert!(db.list_user_checkins(robin_id).unwrap().is_empty());
    assert!(db.chat_history(robin_id, sam_id, 50).unwrap().is_empty());
    assert_eq!(t.login("robin@example.com", "s3cret-pass").await, StatusCode::UNAUTHORIZED);

    let (status, _) = t.call(Method::GET, &format!("/missions/{mission}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn forgot_then_reset_then_login_with_new_password() {
    let t = TestApp::new();
    t.register("Robin", "robin@example.com").await;

    let token = t.request_reset("Robin@Example.com").await;

    let reset = json!({ "token": token, "password": "brand-new-pass" });
    let (status, _) = t
        .call(Method::POST, "/auth/reset-password", None, Some(reset.clone()))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(t.login("robin@example.com", "s3cret-pass").await, StatusCode::UNAUTHORIZED);
    assert_eq!(t.login("robin@example.com", "brand-new-pass").await, StatusCode::OK);

    let (status, _) = t.call(Method::POST, "/auth/reset-password", None, Some(reset)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn weak_password_leaves_reset_token_usable() {
    let t = TestApp::new();
    t.register("Robin", "robin@example.com").await;
    let token = t.request_reset("robin@example.com").await;

    let (status, body) = t
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["password"].is_string());

    let (status, _) = t
        .call(
            Method::POST,
            "/auth/reset-password",
            None,
            Some(json!({ "token": token, "password": "brand-new-pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}
