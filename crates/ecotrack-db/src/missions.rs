use anyhow::Result;
use rusqlite::params;
use tracing::warn;
use uuid::Uuid;

use ecotrack_types::models::{Category, Difficulty, Impact, Mission};

use crate::models::{
    DeleteMission, MissionFilter, like_pattern, parse_json, parse_timestamp, parse_uuid, timestamp,
};
use crate::{Database, OptionalExt};

/// Mission columns, always selected from `missions m`.
pub(crate) const MISSION_COLUMNS: &str =
    "m.id, m.title, m.description, m.category, m.difficulty, m.points, m.co2_kg, \
     m.water_liters, m.waste_kg, m.submission_schema, m.is_published, m.created_by, \
     m.created_at, m.updated_at";

pub(crate) struct RawMission {
    id: String,
    title: String,
    description: String,
    category: String,
    difficulty: String,
    points: i64,
    impact: Impact,
    submission_schema: String,
    is_published: bool,
    created_by: Option<String>,
    created_at: String,
    updated_at: String,
}

pub(crate) fn map_mission(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawMission> {
    Ok(RawMission {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        difficulty: row.get(4)?,
        points: row.get(5)?,
        impact: Impact {
            co2_kg: row.get(6)?,
            water_liters: row.get(7)?,
            waste_kg: row.get(8)?,
        },
        submission_schema: row.get(9)?,
        is_published: row.get(10)?,
        created_by: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl From<RawMission> for Mission {
    fn from(raw: RawMission) -> Self {
        Mission {
            category: raw.category.parse().unwrap_or_else(|e| {
                warn!("Mission {}: {}", raw.id, e);
                Category::Community
            }),
            difficulty: raw.difficulty.parse().unwrap_or_else(|e| {
                warn!("Mission {}: {}", raw.id, e);
                Difficulty::Medium
            }),
            id: parse_uuid(&raw.id),
            title: raw.title,
            description: raw.description,
            points: raw.points,
            impact: raw.impact,
            submission_schema: parse_json(&raw.submission_schema, "submission_schema"),
            is_published: raw.is_published,
            created_by: raw.created_by.as_deref().map(parse_uuid),
            created_at: parse_timestamp(&raw.created_at),
            updated_at: parse_timestamp(&raw.updated_at),
        }
    }
}

impl Database {
    // -- Missions --

    pub fn insert_mission(&self, mission: &Mission) -> Result<()> {
        let schema = serde_json::to_string(&mission.submission_schema)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO missions (id, title, description, category, difficulty, points,
                                       co2_kg, water_liters, waste_kg, submission_schema,
                                       is_published, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    mission.id.to_string(),
                    mission.title,
                    mission.description,
                    mission.category.as_str(),
                    mission.difficulty.as_str(),
                    mission.points,
                    mission.impact.co2_kg,
                    mission.impact.water_liters,
                    mission.impact.waste_kg,
                    schema,
                    mission.is_published,
                    mission.created_by.map(|id| id.to_string()),
                    timestamp(mission.created_at),
                    timestamp(mission.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_mission(&self, id: Uuid) -> Result<Option<Mission>> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {MISSION_COLUMNS} FROM missions m WHERE m.id = ?1"),
                    [id.to_string()],
                    map_mission,
                )
                .optional()?;
            Ok(raw.map(Into::into))
        })
    }

    pub fn list_missions(&self, filter: &MissionFilter) -> Result<Vec<Mission>> {
        self.with_conn(|conn| {
            let pattern = filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(like_pattern);

            let mut stmt = conn.prepare(&format!(
                "SELECT {MISSION_COLUMNS} FROM missions m
                 WHERE (?1 OR m.is_published = 1)
                   AND (?2 IS NULL OR m.category = ?2)
                   AND (?3 IS NULL OR m.difficulty = ?3)
                   AND (?4 IS NULL
                        OR lower(m.title) LIKE ?4 ESCAPE '\\'
                        OR lower(m.description) LIKE ?4 ESCAPE '\\')
                 ORDER BY m.created_at DESC, m.rowid DESC"
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        filter.include_unpublished,
                        filter.category.map(|c| c.as_str()),
                        filter.difficulty.map(|d| d.as_str()),
                        pattern,
                    ],
                    map_mission,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    /// Overwrites every editable column. Returns false if the mission is gone.
    pub fn update_mission(&self, mission: &Mission) -> Result<bool> {
        let schema = serde_json::to_string(&mission.submission_schema)?;
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE missions
                 SET title = ?2, description = ?3, category = ?4, difficulty = ?5, points = ?6,
                     co2_kg = ?7, water_liters = ?8, waste_kg = ?9, submission_schema = ?10,
                     is_published = ?11, updated_at = ?12
                 WHERE id = ?1",
                params![
                    mission.id.to_string(),
                    mission.title,
                    mission.description,
                    mission.category.as_str(),
                    mission.difficulty.as_str(),
                    mission.points,
                    mission.impact.co2_kg,
                    mission.impact.water_liters,
                    mission.impact.waste_kg,
                    schema,
                    mission.is_published,
                    timestamp(mission.updated_at),
                ],
            )?;
            Ok(n > 0)
        })
    }

    /// Deletes a mission unless checkins reference it. Favorites and
    /// non-approved submissions go with it.
    pub fn delete_mission(&self, id: Uuid) -> Result<DeleteMission> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id_str = id.to_string();

            let exists = tx
                .query_row("SELECT 1 FROM missions WHERE id = ?1", [&id_str], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(DeleteMission::NotFound);
            }

            let checkins: i64 = tx.query_row(
                "SELECT COUNT(*) FROM checkins WHERE mission_id = ?1",
                [&id_str],
                |row| row.get(0),
            )?;
            if checkins > 0 {
                return Ok(DeleteMission::HasCheckins);
            }

            tx.execute("DELETE FROM missions WHERE id = ?1", [&id_str])?;
            tx.commit()?;
            Ok(DeleteMission::Deleted)
        })
    }
}
