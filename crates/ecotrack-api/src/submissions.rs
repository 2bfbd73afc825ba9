use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
};
use tracing::{info, warn};
use uuid::Uuid;

use ecotrack_db::{InsertSubmission, NewSubmission, ReviewOutcome};
use ecotrack_types::api::{
    ApproveRequest, Claims, CreateSubmissionRequest, RejectRequest, SubmissionQuery,
};
use ecotrack_types::models::{Checkin, Submission, SubmissionStatus, User};

use crate::error::ApiError;
use crate::mail::{self, Email};
use crate::state::{AppState, AppStateInner};
use crate::validation::{
    JsonBody, NOTE_MAX, PathParam, QueryParams, REASON_LEN, Violations, optional_body,
    validate_answers, validate_evidence,
};

pub async fn create_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let mission_id = req.mission_id;
    let mission = state
        .db(move |db| db.get_mission(mission_id))
        .await?
        .filter(|mission| mission.is_published)
        .ok_or(ApiError::NotFound("Mission"))?;

    let evidence_urls: Vec<String> = req
        .evidence_urls
        .iter()
        .map(|url| url.trim().to_string())
        .collect();

    let mut v = Violations::new();
    validate_answers(&mut v, &mission.submission_schema, &req.answers);
    validate_evidence(&mut v, &evidence_urls);
    v.into_result()?;

    let new = NewSubmission {
        id: Uuid::new_v4(),
        user_id: claims.sub,
        mission_id,
        answers: req.answers,
        evidence_urls,
    };

    let submission = match state.db(move |db| db.insert_submission(&new)).await? {
        InsertSubmission::Created(submission) => submission,
        InsertSubmission::DuplicatePending => {
            return Err(ApiError::Conflict(
                "You already have a pending submission for this mission".into(),
            ));
        }
    };

    info!("Submission {} for '{}' from {}", submission.id, mission.title, claims.sub);
    let title = mission.title;
    notify_submitter(&state, claims.sub, move |user| mail::submission_pending(user, &title));

    Ok((StatusCode::CREATED, Json(submission)))
}

pub async fn my_submissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    QueryParams(query): QueryParams<SubmissionQuery>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let submissions = state
        .db(move |db| db.list_user_submissions(claims.sub, query.status))
        .await?;
    Ok(Json(submissions))
}

pub async fn get_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(submission_id): PathParam<Uuid>,
) -> Result<Json<Submission>, ApiError> {
    let submission = state
        .db(move |db| db.get_submission(submission_id))
        .await?
        .ok_or(ApiError::NotFound("Submission"))?;

    state.ensure_self_or_admin(&claims, submission.user_id).await?;
    Ok(Json(submission))
}

pub async fn my_checkins(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Checkin>>, ApiError> {
    let checkins = state.db(move |db| db.list_user_checkins(claims.sub)).await?;
    Ok(Json(checkins))
}

// -- Admin review --

/// Review queue, oldest first. Defaults to pending submissions.
pub async fn review_queue(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<SubmissionQuery>,
) -> Result<Json<Vec<Submission>>, ApiError> {
    let status = query.status.unwrap_or(SubmissionStatus::Pending);
    let submissions = state
        .db(move |db| db.list_submissions_by_status(status))
        .await?;
    Ok(Json(submissions))
}

pub async fn approve_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(submission_id): PathParam<Uuid>,
    body: Bytes,
) -> Result<Json<Submission>, ApiError> {
    let req: ApproveRequest = optional_body(&body)?;
    let note = req
        .note
        .map(|note| note.trim().to_string())
        .filter(|note| !note.is_empty());

    if note.as_ref().is_some_and(|note| note.chars().count() > NOTE_MAX) {
        let mut v = Violations::new();
        v.add("note", format!("must be at most {} characters", NOTE_MAX));
        v.into_result()?;
    }

    let reviewer = claims.sub;
    let stored_note = note.clone();
    let outcome = state
        .db(move |db| db.approve_submission(submission_id, reviewer, stored_note.as_deref()))
        .await?;

    let approval = match outcome {
        ReviewOutcome::Done(approval) => approval,
        ReviewOutcome::NotFound => return Err(ApiError::NotFound("Submission")),
        ReviewOutcome::NotPending(status) => return Err(already_reviewed(status)),
    };

    let submission = approval.submission;
    info!(
        "Submission {} approved by {}: +{} points to {} (now {})",
        submission.id, reviewer, approval.checkin.points, submission.user_id, approval.user_points
    );

    let title = submission.mission_title.clone();
    let points = approval.checkin.points;
    notify_submitter(&state, submission.user_id, move |user| {
        mail::submission_approved(user, &title, points, note.as_deref())
    });

    Ok(Json(submission))
}

pub async fn reject_submission(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(submission_id): PathParam<Uuid>,
    JsonBody(req): JsonBody<RejectRequest>,
) -> Result<Json<Submission>, ApiError> {
    let reason = req.reason.trim().to_string();
    let mut v = Violations::new();
    v.length("reason", &reason, REASON_LEN);
    v.into_result()?;

    let reviewer = claims.sub;
    let stored_reason = reason.clone();
    let outcome = state
        .db(move |db| db.reject_submission(submission_id, reviewer, &stored_reason))
        .await?;

    let submission = match outcome {
        ReviewOutcome::Done(submission) => submission,
        ReviewOutcome::NotFound => return Err(ApiError::NotFound("Submission")),
        ReviewOutcome::NotPending(status) => return Err(already_reviewed(status)),
    };

    info!("Submission {} rejected by {}", submission.id, reviewer);
    let title = submission.mission_title.clone();
    notify_submitter(&state, submission.user_id, move |user| {
        mail::submission_rejected(user, &title, &reason)
    });

    Ok(Json(submission))
}

fn already_reviewed(status: SubmissionStatus) -> ApiError {
    ApiError::Conflict(format!("Submission is already {}", status.as_str()))
}

/// Look up the submitter and mail them without holding up the response.
fn notify_submitter<F>(state: &AppStateInner, user_id: Uuid, build: F)
where
    F: FnOnce(&User) -> Email + Send + 'static,
{
    let db = state.db.clone();
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        let user = match tokio::task::spawn_blocking(move || db.get_user(user_id)).await {
            Ok(Ok(Some(user))) => user,
            Ok(Ok(None)) => return,
            Ok(Err(e)) => {
                warn!("Could not load {} for notification: {:#}", user_id, e);
                return;
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                return;
            }
        };
        mailer.send_in_background(build(&user));
    });
}
