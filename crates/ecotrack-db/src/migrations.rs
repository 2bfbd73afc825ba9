use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                street      TEXT,
                city        TEXT,
                postal_code TEXT,
                country     TEXT,
                is_admin    INTEGER NOT NULL DEFAULT 0,
                points      INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE missions (
                id                TEXT PRIMARY KEY,
                title             TEXT NOT NULL,
                description       TEXT NOT NULL DEFAULT '',
                category          TEXT NOT NULL,
                difficulty        TEXT NOT NULL,
                points            INTEGER NOT NULL,
                co2_kg            REAL NOT NULL DEFAULT 0,
                water_liters      REAL NOT NULL DEFAULT 0,
                waste_kg          REAL NOT NULL DEFAULT 0,
                submission_schema TEXT NOT NULL DEFAULT '[]',
                is_published      INTEGER NOT NULL DEFAULT 0,
                created_by        TEXT REFERENCES users(id) ON DELETE SET NULL,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL
            );

            CREATE TABLE favorites (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                mission_id  TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, mission_id)
            );

            CREATE TABLE submissions (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                mission_id       TEXT NOT NULL REFERENCES missions(id) ON DELETE CASCADE,
                answers          TEXT NOT NULL DEFAULT '{}',
                evidence_urls    TEXT NOT NULL DEFAULT '[]',
                status           TEXT NOT NULL DEFAULT 'pending',
                review_note      TEXT,
                rejection_reason TEXT,
                reviewed_by      TEXT REFERENCES users(id) ON DELETE SET NULL,
                reviewed_at      TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            -- At most one pending submission per (user, mission)
            CREATE UNIQUE INDEX idx_submissions_one_pending
                ON submissions(user_id, mission_id) WHERE status = 'pending';

            CREATE INDEX idx_submissions_status
                ON submissions(status, created_at);

            CREATE TABLE checkins (
                id            TEXT PRIMARY KEY,
                user_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                mission_id    TEXT NOT NULL REFERENCES missions(id),
                submission_id TEXT NOT NULL UNIQUE REFERENCES submissions(id) ON DELETE CASCADE,
                points        INTEGER NOT NULL,
                co2_kg        REAL NOT NULL,
                water_liters  REAL NOT NULL,
                waste_kg      REAL NOT NULL,
                created_at    TEXT NOT NULL
            );

            CREATE INDEX idx_checkins_user
                ON checkins(user_id, created_at);

            CREATE TABLE chat_messages (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_chat_pair
                ON chat_messages(sender_id, receiver_id, created_at);

            CREATE TABLE password_resets (
                token_hash  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at  TEXT NOT NULL,
                used        INTEGER NOT NULL DEFAULT 0
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
