use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use ecotrack_types::models::{Address, Mission, User};

use crate::missions::{MISSION_COLUMNS, map_mission};
use crate::models::{
    NewUser, UpdateUser, UserAuthRow, UserChanges, like_pattern, now, parse_timestamp, parse_uuid,
    timestamp,
};
use crate::{Database, OptionalExt, is_unique_violation};

const USER_COLUMNS: &str = "id, name, email, password, street, city, postal_code, country, \
                            is_admin, points, created_at, updated_at";

struct RawUser {
    id: String,
    name: String,
    email: String,
    password: String,
    address: Address,
    is_admin: bool,
    points: i64,
    created_at: String,
    updated_at: String,
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        address: Address {
            street: row.get(4)?,
            city: row.get(5)?,
            postal_code: row.get(6)?,
            country: row.get(7)?,
        },
        is_admin: row.get(8)?,
        points: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn finish_user(conn: &Connection, raw: RawUser) -> Result<UserAuthRow> {
    let favorites = query_favorite_ids(conn, &raw.id)?;
    Ok(into_auth_row(raw, favorites))
}

fn into_auth_row(raw: RawUser, favorites: Vec<Uuid>) -> UserAuthRow {
    UserAuthRow {
        user: User {
            id: parse_uuid(&raw.id),
            name: raw.name,
            email: raw.email,
            address: raw.address,
            is_admin: raw.is_admin,
            points: raw.points,
            favorites,
            created_at: parse_timestamp(&raw.created_at),
            updated_at: parse_timestamp(&raw.updated_at),
        },
        password: raw.password,
    }
}

impl Database {
    // -- Users --

    /// Inserts a user. Returns `None` when the email is already registered.
    pub fn create_user(&self, new: &NewUser) -> Result<Option<User>> {
        self.with_conn_mut(|conn| {
            let ts = now();
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, street, city, postal_code, country,
                                    is_admin, points, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)",
                params![
                    new.id.to_string(),
                    new.name,
                    new.email,
                    new.password_hash,
                    new.address.street,
                    new.address.city,
                    new.address.postal_code,
                    new.address.country,
                    new.is_admin,
                    ts,
                ],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            Ok(query_user(conn, "id", &new.id.to_string())?.map(|row| row.user))
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| Ok(query_user(conn, "id", &id.to_string())?.map(|row| row.user)))
    }

    pub fn get_user_auth_by_email(&self, email: &str) -> Result<Option<UserAuthRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_auth(&self, id: Uuid) -> Result<Option<UserAuthRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn user_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id.to_string()], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// All users, optionally filtered by a case-insensitive name/email substring.
    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let pattern = search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(like_pattern);

            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE ?1 IS NULL
                    OR lower(name) LIKE ?1 ESCAPE '\\'
                    OR lower(email) LIKE ?1 ESCAPE '\\'
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let raws = stmt
                .query_map([pattern], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // One pass over favorites instead of a query per user
            let mut favorites: HashMap<String, Vec<Uuid>> = HashMap::new();
            let mut stmt = conn.prepare(
                "SELECT user_id, mission_id FROM favorites ORDER BY created_at ASC, rowid ASC",
            )?;
            let pairs = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for pair in pairs {
                let (user_id, mission_id) = pair?;
                favorites.entry(user_id).or_default().push(parse_uuid(&mission_id));
            }

            Ok(raws
                .into_iter()
                .map(|raw| {
                    let ids = favorites.remove(&raw.id).unwrap_or_default();
                    into_auth_row(raw, ids).user
                })
                .collect())
        })
    }

    pub fn update_user(&self, id: Uuid, changes: &UserChanges) -> Result<UpdateUser> {
        self.with_conn_mut(|conn| {
            let id_str = id.to_string();
            let Some(current) = query_user(conn, "id", &id_str)? else {
                return Ok(UpdateUser::NotFound);
            };

            let user = current.user;
            let address = changes.address.clone().unwrap_or(user.address);
            let result = conn.execute(
                "UPDATE users
                 SET name = ?2, email = ?3, password = ?4, street = ?5, city = ?6,
                     postal_code = ?7, country = ?8, is_admin = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    id_str,
                    changes.name.as_deref().unwrap_or(&user.name),
                    changes.email.as_deref().unwrap_or(&user.email),
                    changes.password_hash.as_deref().unwrap_or(&current.password),
                    address.street,
                    address.city,
                    address.postal_code,
                    address.country,
                    changes.is_admin.unwrap_or(user.is_admin),
                    now(),
                ],
            );

            match result {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(UpdateUser::EmailTaken),
                Err(e) => return Err(e.into()),
            }

            match query_user(conn, "id", &id_str)? {
                Some(row) => Ok(UpdateUser::Updated(row.user)),
                None => Ok(UpdateUser::NotFound),
            }
        })
    }

    /// Deletes a user and, through cascades, everything they own.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    pub fn set_admin_by_email(&self, email: &str, is_admin: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users SET is_admin = ?2, updated_at = ?3 WHERE email = ?1",
                params![email, is_admin, now()],
            )?;
            Ok(n > 0)
        })
    }

    // -- Favorites --

    /// Toggle a favorite: removes if present, inserts if not.
    /// Returns (favorited, favorites after the toggle).
    pub fn toggle_favorite(&self, user_id: Uuid, mission_id: Uuid) -> Result<(bool, Vec<Uuid>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let uid = user_id.to_string();
            let mid = mission_id.to_string();

            let removed = tx.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND mission_id = ?2",
                params![uid, mid],
            )?;
            let favorited = if removed == 0 {
                tx.execute(
                    "INSERT INTO favorites (user_id, mission_id, created_at) VALUES (?1, ?2, ?3)",
                    params![uid, mid, now()],
                )?;
                true
            } else {
                false
            };

            let favorites = query_favorite_ids(&tx, &uid)?;
            tx.commit()?;
            Ok((favorited, favorites))
        })
    }

    /// Missions the user has favorited. Unpublished ones only show up when
    /// `include_unpublished` is set (admins).
    pub fn favorite_missions(
        &self,
        user_id: Uuid,
        include_unpublished: bool,
    ) -> Result<Vec<Mission>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MISSION_COLUMNS} FROM missions m
                 JOIN favorites f ON f.mission_id = m.id
                 WHERE f.user_id = ?1 AND (?2 OR m.is_published = 1)
                 ORDER BY f.created_at ASC, f.rowid ASC"
            ))?;
            let missions = stmt
                .query_map(params![user_id.to_string(), include_unpublished], map_mission)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(missions.into_iter().map(Into::into).collect())
        })
    }

    // -- Password resets --

    pub fn insert_password_reset(
        &self,
        token_hash: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                params![token_hash, user_id.to_string(), timestamp(expires_at)],
            )?;
            Ok(())
        })
    }

    /// Owner of a reset token that is still unused and unexpired. Does not
    /// consume it.
    pub fn password_reset_user(&self, token_hash: &str) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let user_id: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM password_resets
                     WHERE token_hash = ?1 AND used = 0 AND expires_at > ?2",
                    params![token_hash, now()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(user_id.map(|id| parse_uuid(&id)))
        })
    }

    /// Spends a reset token and stores the new password hash in one
    /// transaction. Returns the user, or `None` if the token is unknown,
    /// used or expired, in which case nothing changes.
    pub fn complete_password_reset(
        &self,
        token_hash: &str,
        password_hash: &str,
    ) -> Result<Option<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let ts = now();
            let user_id: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM password_resets
                     WHERE token_hash = ?1 AND used = 0 AND expires_at > ?2",
                    params![token_hash, ts],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(user_id) = user_id else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE password_resets SET used = 1 WHERE token_hash = ?1",
                [token_hash],
            )?;
            let updated = tx.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id, password_hash, ts],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            tx.commit()?;
            Ok(Some(parse_uuid(&user_id)))
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserAuthRow>> {
    // column is one of a fixed set chosen by this module, never user input
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    let raw = stmt.query_row([value], map_user).optional()?;
    raw.map(|raw| finish_user(conn, raw)).transpose()
}

fn query_favorite_ids(conn: &Connection, user_id: &str) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT mission_id FROM favorites WHERE user_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let ids = stmt
        .query_map([user_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids.iter().map(|id| parse_uuid(id)).collect())
}
