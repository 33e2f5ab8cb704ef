use crate::models::UserRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::{Connection, Row};
use tripyy_types::ts;

/// Outcome of a traveler-profile write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileUpdate {
    Applied,
    NicknameTaken,
}

const USER_COLUMNS: &str = "id, email, password_hash, display_name, email_verified, \
     email_verified_at, preferences, traveler_profile, llm_config, saved_agents, \
     friends, likes_received, last_known_location, push_token, last_login, created_at";

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        display_name: row.get(3)?,
        email_verified: row.get::<_, i64>(4)? != 0,
        email_verified_at: row.get(5)?,
        preferences: row.get(6)?,
        traveler_profile: row.get(7)?,
        llm_config: row.get(8)?,
        saved_agents: row.get(9)?,
        friends: row.get(10)?,
        likes_received: row.get(11)?,
        last_known_location: row.get(12)?,
        push_token: row.get(13)?,
        last_login: row.get(14)?,
        created_at: row.get(15)?,
    })
}

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        display_name: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, display_name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, email, password_hash, display_name, ts::now()),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1 COLLATE NOCASE", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Find the user owning a non-empty nickname, for uniqueness checks.
    pub fn get_user_by_nickname(&self, nickname: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "json_extract(traveler_profile, '$.nickname') = ?1",
                nickname,
            )
        })
    }

    pub fn touch_last_login(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                (ts::now(), id),
            )?;
            Ok(())
        })
    }

    pub fn mark_email_verified(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email_verified = 1, email_verified_at = ?1
                 WHERE email = ?2 COLLATE NOCASE",
                (ts::now(), email),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2 COLLATE NOCASE",
                (password_hash, email),
            )?;
            Ok(changed > 0)
        })
    }

    /// Replace the traveler profile document. The nickname-uniqueness
    /// check happens inside the same lock so two concurrent updates
    /// cannot both claim the same nickname.
    pub fn update_traveler_profile(
        &self,
        user_id: &str,
        profile_json: &str,
    ) -> Result<ProfileUpdate> {
        let nickname: Option<String> =
            serde_json::from_str::<serde_json::Value>(profile_json)
                .ok()
                .and_then(|v| v.get("nickname").and_then(|n| n.as_str().map(String::from)))
                .filter(|n| !n.is_empty());

        self.with_conn(|conn| {
            if let Some(nickname) = &nickname {
                let taken = query_user(
                    conn,
                    "json_extract(traveler_profile, '$.nickname') = ?1",
                    nickname,
                )?
                .map(|u| u.id != user_id)
                .unwrap_or(false);
                if taken {
                    return Ok(ProfileUpdate::NicknameTaken);
                }
            }
            conn.execute(
                "UPDATE users SET traveler_profile = ?1 WHERE id = ?2",
                (profile_json, user_id),
            )?;
            Ok(ProfileUpdate::Applied)
        })
    }

    pub fn update_llm_config(&self, user_id: &str, llm_config_json: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET llm_config = ?1 WHERE id = ?2",
                (llm_config_json, user_id),
            )?;
            Ok(())
        })
    }

    pub fn set_push_token(&self, user_id: &str, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET push_token = ?1 WHERE id = ?2",
                (token, user_id),
            )?;
            Ok(())
        })
    }

    pub fn get_push_token(&self, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let token: Option<Option<String>> = conn
                .query_row(
                    "SELECT push_token FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(token.flatten())
        })
    }

    /// Resolve push tokens for a set of users in one query. Users without
    /// a registered token are silently absent from the result.
    pub fn get_push_tokens(&self, user_ids: &[String]) -> Result<Vec<String>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=user_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT push_token FROM users WHERE id IN ({}) AND push_token IS NOT NULL",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = user_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let tokens = stmt
                .query_map(params.as_slice(), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tokens)
        })
    }

    /// Batch-fetch users by id, for post/comment enrichment.
    pub fn get_users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let rows = stmt
                .query_map(params.as_slice(), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn search_users(&self, q: &str, limit: u32) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", q);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE display_name LIKE ?1 COLLATE NOCASE
                    OR json_extract(traveler_profile, '$.nickname') LIKE ?1 COLLATE NOCASE
                 ORDER BY display_name
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, limit], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::ProfileUpdate;
    use crate::Database;

    #[test]
    fn email_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "Alice@Example.com", "hash", "Alice").unwrap();

        assert!(db.get_user_by_email("alice@example.com").unwrap().is_some());
        assert!(db.get_user_by_email("ALICE@EXAMPLE.COM").unwrap().is_some());
        assert!(db.get_user_by_email("bob@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@b.co", "hash", "Alice").unwrap();
        assert!(db.create_user("u2", "A@B.CO", "hash", "Alia").is_err());
    }

    #[test]
    fn nickname_uniqueness_enforced_on_profile_update() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@b.co", "hash", "Alice").unwrap();
        db.create_user("u2", "b@b.co", "hash", "Bob").unwrap();

        assert_eq!(
            db.update_traveler_profile("u1", r#"{"nickname":"wanderer"}"#)
                .unwrap(),
            ProfileUpdate::Applied
        );
        // Same user may re-save their own nickname
        assert_eq!(
            db.update_traveler_profile("u1", r#"{"nickname":"wanderer","bio":"hi"}"#)
                .unwrap(),
            ProfileUpdate::Applied
        );
        // A different user may not claim it
        assert_eq!(
            db.update_traveler_profile("u2", r#"{"nickname":"wanderer"}"#)
                .unwrap(),
            ProfileUpdate::NicknameTaken
        );
        // Empty nickname never conflicts
        assert_eq!(
            db.update_traveler_profile("u2", r#"{"nickname":""}"#).unwrap(),
            ProfileUpdate::Applied
        );
    }

    #[test]
    fn push_token_batch_lookup_skips_unregistered() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@b.co", "hash", "Alice").unwrap();
        db.create_user("u2", "b@b.co", "hash", "Bob").unwrap();
        db.set_push_token("u1", "ExponentPushToken[abc]").unwrap();

        let tokens = db
            .get_push_tokens(&["u1".into(), "u2".into(), "missing".into()])
            .unwrap();
        assert_eq!(tokens, vec!["ExponentPushToken[abc]".to_string()]);
    }
}
