use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            email               TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash       TEXT NOT NULL,
            display_name        TEXT NOT NULL,
            email_verified      INTEGER NOT NULL DEFAULT 0,
            email_verified_at   TEXT,
            preferences         TEXT NOT NULL DEFAULT '{}',
            traveler_profile    TEXT NOT NULL DEFAULT '{}',
            llm_config          TEXT NOT NULL DEFAULT '{}',
            saved_agents        TEXT NOT NULL DEFAULT '[]',
            friends             TEXT NOT NULL DEFAULT '[]',
            likes_received      INTEGER NOT NULL DEFAULT 0,
            last_known_location TEXT,
            push_token          TEXT,
            last_login          TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_nickname
            ON users(json_extract(traveler_profile, '$.nickname'));

        CREATE TABLE IF NOT EXISTS verification_tokens (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL COLLATE NOCASE,
            code        TEXT NOT NULL,
            kind        TEXT NOT NULL,
            expires_at  TEXT NOT NULL,
            used        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tokens_email
            ON verification_tokens(email, kind, used);

        CREATE TABLE IF NOT EXISTS trips (
            id          TEXT PRIMARY KEY,
            owner_id    TEXT NOT NULL REFERENCES users(id),
            share_type  TEXT NOT NULL DEFAULT 'private',
            doc         TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_trips_owner
            ON trips(owner_id, updated_at);

        CREATE TABLE IF NOT EXISTS pois (
            id            TEXT PRIMARY KEY,
            owner_user_id TEXT,
            author        TEXT NOT NULL DEFAULT '',
            lat           REAL NOT NULL,
            lng           REAL NOT NULL,
            doc           TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_pois_coords
            ON pois(lat, lng);

        CREATE TABLE IF NOT EXISTS posts (
            id              TEXT PRIMARY KEY,
            author_user_id  TEXT NOT NULL,
            content         TEXT NOT NULL,
            location        TEXT,
            photos          TEXT NOT NULL DEFAULT '[]',
            connected_poi   TEXT,
            likes           TEXT NOT NULL DEFAULT '[]',
            liked_user_ids  TEXT NOT NULL DEFAULT '[]',
            comments        TEXT NOT NULL DEFAULT '[]',
            like_count      INTEGER NOT NULL DEFAULT 0,
            comment_count   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_created
            ON posts(created_at);

        CREATE TABLE IF NOT EXISTS communities (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_by  TEXT NOT NULL,
            members     TEXT NOT NULL DEFAULT '[]',
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reports (
            id                 TEXT PRIMARY KEY,
            reporter_id        TEXT NOT NULL,
            reporter_nickname  TEXT NOT NULL DEFAULT '',
            target_type        TEXT NOT NULL,
            target_id          TEXT NOT NULL,
            target_name        TEXT NOT NULL DEFAULT '',
            target_content     TEXT NOT NULL DEFAULT '',
            target_author      TEXT NOT NULL DEFAULT '{}',
            issue_type         TEXT NOT NULL,
            description        TEXT NOT NULL,
            status             TEXT NOT NULL DEFAULT 'pending',
            admin_notes        TEXT,
            reviewed_by        TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reports_status
            ON reports(status, created_at);

        CREATE TABLE IF NOT EXISTS admins (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL UNIQUE,
            role        TEXT NOT NULL,
            assigned_by TEXT NOT NULL,
            permissions TEXT NOT NULL DEFAULT '{}',
            is_active   INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
