use anyhow::Result;
use rusqlite::params;

use ecotrack_types::api::{CommunityTotals, LeaderboardEntry, RecentCheckin};

use crate::Database;
use crate::models::{parse_timestamp, parse_uuid};

impl Database {
    // -- Community --

    pub fn community_totals(&self) -> Result<CommunityTotals> {
        self.with_conn(|conn| {
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            let totals = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(points), 0), COALESCE(SUM(co2_kg), 0.0),
                        COALESCE(SUM(water_liters), 0.0), COALESCE(SUM(waste_kg), 0.0)
                 FROM checkins",
                [],
                |row| {
                    Ok(CommunityTotals {
                        users,
                        approved_submissions: row.get(0)?,
                        points: row.get(1)?,
                        co2_kg: row.get(2)?,
                        water_liters: row.get(3)?,
                        waste_kg: row.get(4)?,
                    })
                },
            )?;
            Ok(totals)
        })
    }

    /// Users ranked by points; ties go to whoever registered first.
    pub fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, points FROM users
                 ORDER BY points DESC, created_at ASC, rowid ASC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .enumerate()
                .map(|(i, (id, name, points))| LeaderboardEntry {
                    rank: i + 1,
                    user_id: parse_uuid(&id),
                    name,
                    points,
                })
                .collect())
        })
    }

    pub fn recent_checkins(&self, limit: u32) -> Result<Vec<RecentCheckin>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.user_id, u.name, c.mission_id, m.title, c.points, c.created_at
                 FROM checkins c
                 JOIN users u ON u.id = c.user_id
                 JOIN missions m ON m.id = c.mission_id
                 ORDER BY c.created_at DESC, c.rowid DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows
                .into_iter()
                .map(|(user_id, user_name, mission_id, mission_title, points, created_at)| {
                    RecentCheckin {
                        user_id: parse_uuid(&user_id),
                        user_name,
                        mission_id: parse_uuid(&mission_id),
                        mission_title,
                        points,
                        created_at: parse_timestamp(&created_at),
                    }
                })
                .collect())
        })
    }
}
