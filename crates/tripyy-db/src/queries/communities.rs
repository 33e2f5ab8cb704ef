use crate::models::CommunityRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Row;
use tripyy_types::ts;

const COMMUNITY_COLUMNS: &str = "id, name, description, created_by, members, created_at";

fn community_from_row(row: &Row) -> rusqlite::Result<CommunityRow> {
    Ok(CommunityRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: row.get(3)?,
        members: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Database {
    pub fn insert_community(
        &self,
        id: &str,
        name: &str,
        description: &str,
        created_by: &str,
    ) -> Result<CommunityRow> {
        let members = serde_json::to_string(&[created_by])?;
        let now = ts::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO communities (id, name, description, created_by, members, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, name, description, created_by, &members, &now),
            )?;
            Ok(())
        })?;
        Ok(CommunityRow {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            created_by: created_by.to_string(),
            members,
            created_at: now,
        })
    }

    pub fn get_community(&self, id: &str) -> Result<Option<CommunityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1"
            ))?;
            let row = stmt.query_row([id], community_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn list_communities(&self) -> Result<Vec<CommunityRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMUNITY_COLUMNS} FROM communities ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], community_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn search_communities(&self, q: &str, limit: u32) -> Result<Vec<CommunityRow>> {
        let pattern = format!("%{}%", q);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMUNITY_COLUMNS} FROM communities
                 WHERE name LIKE ?1 COLLATE NOCASE
                 ORDER BY name
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, limit], community_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Add the user to the member list if absent. Returns the updated
    /// row, or `None` when the community does not exist.
    pub fn join_community(&self, id: &str, user_id: &str) -> Result<Option<CommunityRow>> {
        self.mutate_members(id, |members| {
            if !members.iter().any(|m| m == user_id) {
                members.push(user_id.to_string());
            }
        })
    }

    pub fn leave_community(&self, id: &str, user_id: &str) -> Result<Option<CommunityRow>> {
        self.mutate_members(id, |members| {
            members.retain(|m| m != user_id);
        })
    }

    pub fn count_memberships(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM communities, json_each(communities.members)
                 WHERE json_each.value = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    fn mutate_members<F>(&self, id: &str, mutate: F) -> Result<Option<CommunityRow>>
    where
        F: FnOnce(&mut Vec<String>),
    {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMUNITY_COLUMNS} FROM communities WHERE id = ?1"
            ))?;
            let Some(mut row) = stmt.query_row([id], community_from_row).optional()? else {
                return Ok(None);
            };

            let mut members: Vec<String> = serde_json::from_str(&row.members).unwrap_or_default();
            mutate(&mut members);
            row.members = serde_json::to_string(&members)?;

            conn.execute(
                "UPDATE communities SET members = ?1 WHERE id = ?2",
                (&row.members, id),
            )?;
            Ok(Some(row))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn members(row: &crate::models::CommunityRow) -> Vec<String> {
        serde_json::from_str(&row.members).unwrap()
    }

    #[test]
    fn creator_is_first_member() {
        let db = Database::open_in_memory().unwrap();
        let row = db
            .insert_community("c1", "Backpackers", "budget travel", "u1")
            .unwrap();
        assert_eq!(members(&row), vec!["u1"]);
    }

    #[test]
    fn join_is_idempotent_and_leave_removes() {
        let db = Database::open_in_memory().unwrap();
        db.insert_community("c1", "Backpackers", "", "u1").unwrap();

        let row = db.join_community("c1", "u2").unwrap().unwrap();
        assert_eq!(members(&row), vec!["u1", "u2"]);

        // Double-join must not duplicate
        let row = db.join_community("c1", "u2").unwrap().unwrap();
        assert_eq!(members(&row), vec!["u1", "u2"]);

        let row = db.leave_community("c1", "u2").unwrap().unwrap();
        assert_eq!(members(&row), vec!["u1"]);

        assert!(db.join_community("missing", "u2").unwrap().is_none());
    }

    #[test]
    fn membership_count_spans_communities() {
        let db = Database::open_in_memory().unwrap();
        db.insert_community("c1", "A", "", "u1").unwrap();
        db.insert_community("c2", "B", "", "u2").unwrap();
        db.join_community("c2", "u1").unwrap();

        assert_eq!(db.count_memberships("u1").unwrap(), 2);
        assert_eq!(db.count_memberships("u2").unwrap(), 1);
        assert_eq!(db.count_memberships("u3").unwrap(), 0);
    }
}
