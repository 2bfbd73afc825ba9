//! Database row and input types, plus the parsing helpers that turn stored
//! TEXT columns back into typed values. Distinct from ecotrack-types API
//! models where the DB needs extra fields (password hashes) or outcomes.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use ecotrack_types::models::{
    Address, Category, Checkin, Difficulty, SubmissionStatus, User,
};

/// User row including the password hash. Only the auth paths read this.
pub struct UserAuthRow {
    pub user: User,
    pub password: String,
}

pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub address: Address,
    pub is_admin: bool,
}

/// Partial user update. `None` leaves the column untouched.
#[derive(Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub address: Option<Address>,
    pub is_admin: Option<bool>,
}

pub enum UpdateUser {
    Updated(User),
    NotFound,
    EmailTaken,
}

#[derive(Default)]
pub struct MissionFilter {
    pub category: Option<Category>,
    pub difficulty: Option<Difficulty>,
    pub search: Option<String>,
    pub include_unpublished: bool,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeleteMission {
    Deleted,
    NotFound,
    HasCheckins,
}

pub struct NewSubmission {
    pub id: Uuid,
    pub user_id: Uuid,
    pub mission_id: Uuid,
    pub answers: BTreeMap<String, Value>,
    pub evidence_urls: Vec<String>,
}

pub enum InsertSubmission {
    Created(ecotrack_types::models::Submission),
    DuplicatePending,
}

/// Result of an admin review decision.
pub enum ReviewOutcome<T> {
    Done(T),
    NotFound,
    NotPending(SubmissionStatus),
}

/// Output of an approval: the updated submission and its ledger entry.
pub struct Approval {
    pub submission: ecotrack_types::models::Submission,
    pub checkin: Checkin,
    pub user_points: i64,
}

// -- Column helpers --

pub(crate) fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now() -> String {
    timestamp(Utc::now())
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}': {}", raw, e);
        DateTime::default()
    })
}

pub(crate) fn parse_uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned + Default>(raw: &str, column: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Corrupt {} JSON: {}", column, e);
        T::default()
    })
}

/// `%needle%` for a case-insensitive `LIKE ... ESCAPE '\'`, with the user's
/// own `%`, `_` and `\` matched literally.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
