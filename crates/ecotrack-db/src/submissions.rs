use anyhow::{Result, anyhow};
use rusqlite::{Connection, params};
use uuid::Uuid;

use ecotrack_types::models::{Checkin, Impact, Submission, SubmissionStatus};

use crate::models::{
    Approval, InsertSubmission, NewSubmission, ReviewOutcome, now, parse_json, parse_timestamp,
    parse_uuid,
};
use crate::{Database, OptionalExt, is_unique_violation};

const SUBMISSION_SELECT: &str =
    "SELECT s.id, s.user_id, s.mission_id, COALESCE(m.title, ''), s.answers, s.evidence_urls,
            s.status, s.review_note, s.rejection_reason, s.reviewed_by, s.reviewed_at,
            s.created_at, s.updated_at
     FROM submissions s
     LEFT JOIN missions m ON m.id = s.mission_id";

struct RawSubmission {
    id: String,
    user_id: String,
    mission_id: String,
    mission_title: String,
    answers: String,
    evidence_urls: String,
    status: String,
    review_note: Option<String>,
    rejection_reason: Option<String>,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubmission> {
    Ok(RawSubmission {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mission_id: row.get(2)?,
        mission_title: row.get(3)?,
        answers: row.get(4)?,
        evidence_urls: row.get(5)?,
        status: row.get(6)?,
        review_note: row.get(7)?,
        rejection_reason: row.get(8)?,
        reviewed_by: row.get(9)?,
        reviewed_at: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl TryFrom<RawSubmission> for Submission {
    type Error = anyhow::Error;

    fn try_from(raw: RawSubmission) -> Result<Self> {
        Ok(Submission {
            id: parse_uuid(&raw.id),
            user_id: parse_uuid(&raw.user_id),
            mission_id: parse_uuid(&raw.mission_id),
            mission_title: raw.mission_title,
            answers: parse_json(&raw.answers, "answers"),
            evidence_urls: parse_json(&raw.evidence_urls, "evidence_urls"),
            status: raw.status.parse()?,
            review_note: raw.review_note,
            rejection_reason: raw.rejection_reason,
            reviewed_by: raw.reviewed_by.as_deref().map(parse_uuid),
            reviewed_at: raw.reviewed_at.as_deref().map(parse_timestamp),
            created_at: parse_timestamp(&raw.created_at),
            updated_at: parse_timestamp(&raw.updated_at),
        })
    }
}

struct RawCheckin {
    id: String,
    user_id: String,
    mission_id: String,
    submission_id: String,
    points: i64,
    impact: Impact,
    created_at: String,
}

impl From<RawCheckin> for Checkin {
    fn from(raw: RawCheckin) -> Self {
        Checkin {
            id: parse_uuid(&raw.id),
            user_id: parse_uuid(&raw.user_id),
            mission_id: parse_uuid(&raw.mission_id),
            submission_id: parse_uuid(&raw.submission_id),
            points: raw.points,
            impact: raw.impact,
            created_at: parse_timestamp(&raw.created_at),
        }
    }
}

impl Database {
    // -- Submissions --

    /// Inserts a pending submission unless the user already has one pending
    /// for the same mission. The partial unique index backs up the lookup.
    pub fn insert_submission(&self, new: &NewSubmission) -> Result<InsertSubmission> {
        let answers = serde_json::to_string(&new.answers)?;
        let evidence = serde_json::to_string(&new.evidence_urls)?;

        self.with_conn_mut(|conn| {
            let uid = new.user_id.to_string();
            let mid = new.mission_id.to_string();

            let pending = conn
                .query_row(
                    "SELECT 1 FROM submissions
                     WHERE user_id = ?1 AND mission_id = ?2 AND status = 'pending'",
                    params![uid, mid],
                    |_| Ok(()),
                )
                .optional()?;
            if pending.is_some() {
                return Ok(InsertSubmission::DuplicatePending);
            }

            let ts = now();
            let inserted = conn.execute(
                "INSERT INTO submissions (id, user_id, mission_id, answers, evidence_urls, status,
                                          created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?6)",
                params![new.id.to_string(), uid, mid, answers, evidence, ts],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(InsertSubmission::DuplicatePending),
                Err(e) => return Err(e.into()),
            }

            let submission = query_submission(conn, &new.id.to_string())?
                .ok_or_else(|| anyhow!("Submission {} vanished after insert", new.id))?;
            Ok(InsertSubmission::Created(submission))
        })
    }

    pub fn get_submission(&self, id: Uuid) -> Result<Option<Submission>> {
        self.with_conn(|conn| query_submission(conn, &id.to_string()))
    }

    /// A user's submissions, newest first.
    pub fn list_user_submissions(
        &self,
        user_id: Uuid,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SUBMISSION_SELECT}
                 WHERE s.user_id = ?1 AND (?2 IS NULL OR s.status = ?2)
                 ORDER BY s.created_at DESC, s.rowid DESC"
            ))?;
            let rows = stmt
                .query_map(
                    params![user_id.to_string(), status.map(|s| s.as_str())],
                    map_submission,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Submission::try_from).collect()
        })
    }

    /// Review queue for a status, oldest first.
    pub fn list_submissions_by_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SUBMISSION_SELECT}
                 WHERE s.status = ?1
                 ORDER BY s.created_at ASC, s.rowid ASC"
            ))?;
            let rows = stmt
                .query_map([status.as_str()], map_submission)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(Submission::try_from).collect()
        })
    }

    /// Approves a pending submission. The status change, the point award and
    /// the checkin insert commit together or not at all.
    pub fn approve_submission(
        &self,
        id: Uuid,
        reviewer_id: Uuid,
        note: Option<&str>,
    ) -> Result<ReviewOutcome<Approval>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id_str = id.to_string();

            let (user_id, mission_id) = match pending_target(&tx, &id_str)? {
                ReviewOutcome::Done(target) => target,
                ReviewOutcome::NotFound => return Ok(ReviewOutcome::NotFound),
                ReviewOutcome::NotPending(status) => return Ok(ReviewOutcome::NotPending(status)),
            };

            let (points, impact) = tx.query_row(
                "SELECT points, co2_kg, water_liters, waste_kg FROM missions WHERE id = ?1",
                [&mission_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        Impact {
                            co2_kg: row.get(1)?,
                            water_liters: row.get(2)?,
                            waste_kg: row.get(3)?,
                        },
                    ))
                },
            )?;

            let ts = now();
            tx.execute(
                "UPDATE submissions
                 SET status = 'approved', review_note = ?2, reviewed_by = ?3,
                     reviewed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
                params![id_str, note, reviewer_id.to_string(), ts],
            )?;

            tx.execute(
                "UPDATE users SET points = points + ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, points, ts],
            )?;
            let user_points: i64 =
                tx.query_row("SELECT points FROM users WHERE id = ?1", [&user_id], |row| {
                    row.get(0)
                })?;

            let checkin_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO checkins (id, user_id, mission_id, submission_id, points,
                                       co2_kg, water_liters, waste_kg, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    checkin_id,
                    user_id,
                    mission_id,
                    id_str,
                    points,
                    impact.co2_kg,
                    impact.water_liters,
                    impact.waste_kg,
                    ts,
                ],
            )?;

            let submission = query_submission(&tx, &id_str)?
                .ok_or_else(|| anyhow!("Submission {} vanished during approval", id))?;
            let checkin = query_checkin(&tx, &checkin_id)?
                .ok_or_else(|| anyhow!("Checkin {} vanished during approval", checkin_id))?;

            tx.commit()?;
            Ok(ReviewOutcome::Done(Approval {
                submission,
                checkin,
                user_points,
            }))
        })
    }

    /// Rejects a pending submission, keeping the reason. Points are untouched.
    pub fn reject_submission(
        &self,
        id: Uuid,
        reviewer_id: Uuid,
        reason: &str,
    ) -> Result<ReviewOutcome<Submission>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id_str = id.to_string();

            match pending_target(&tx, &id_str)? {
                ReviewOutcome::Done(_) => {}
                ReviewOutcome::NotFound => return Ok(ReviewOutcome::NotFound),
                ReviewOutcome::NotPending(status) => return Ok(ReviewOutcome::NotPending(status)),
            }

            let ts = now();
            tx.execute(
                "UPDATE submissions
                 SET status = 'rejected', rejection_reason = ?2, reviewed_by = ?3,
                     reviewed_at = ?4, updated_at = ?4
                 WHERE id = ?1 AND status = 'pending'",
                params![id_str, reason, reviewer_id.to_string(), ts],
            )?;

            let submission = query_submission(&tx, &id_str)?
                .ok_or_else(|| anyhow!("Submission {} vanished during rejection", id))?;
            tx.commit()?;
            Ok(ReviewOutcome::Done(submission))
        })
    }

    // -- Checkins --

    /// A user's checkin ledger, newest first.
    pub fn list_user_checkins(&self, user_id: Uuid) -> Result<Vec<Checkin>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, mission_id, submission_id, points, co2_kg, water_liters,
                        waste_kg, created_at
                 FROM checkins WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], map_checkin)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }
}

/// Looks up (user_id, mission_id) of a submission that is still pending.
fn pending_target(conn: &Connection, id: &str) -> Result<ReviewOutcome<(String, String)>> {
    let row = conn
        .query_row(
            "SELECT status, user_id, mission_id FROM submissions WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((status, user_id, mission_id)) = row else {
        return Ok(ReviewOutcome::NotFound);
    };

    let status: SubmissionStatus = status.parse()?;
    if status != SubmissionStatus::Pending {
        return Ok(ReviewOutcome::NotPending(status));
    }
    Ok(ReviewOutcome::Done((user_id, mission_id)))
}

fn query_submission(conn: &Connection, id: &str) -> Result<Option<Submission>> {
    let raw = conn
        .query_row(&format!("{SUBMISSION_SELECT} WHERE s.id = ?1"), [id], map_submission)
        .optional()?;
    raw.map(Submission::try_from).transpose()
}

fn map_checkin(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCheckin> {
    Ok(RawCheckin {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mission_id: row.get(2)?,
        submission_id: row.get(3)?,
        points: row.get(4)?,
        impact: Impact {
            co2_kg: row.get(5)?,
            water_liters: row.get(6)?,
            waste_kg: row.get(7)?,
        },
        created_at: row.get(8)?,
    })
}

fn query_checkin(conn: &Connection, id: &str) -> Result<Option<Checkin>> {
    let raw = conn
        .query_row(
            "SELECT id, user_id, mission_id, submission_id, points, co2_kg, water_liters,
                    waste_kg, created_at
             FROM checkins WHERE id = ?1",
            [id],
            map_checkin,
        )
        .optional()?;
    Ok(raw.map(Into::into))
}
