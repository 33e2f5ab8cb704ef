use crate::models::TripRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Row;
use tripyy_types::ts;

const TRIP_COLUMNS: &str = "id, owner_id, share_type, doc, created_at, updated_at";

fn trip_from_row(row: &Row) -> rusqlite::Result<TripRow> {
    Ok(TripRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        share_type: row.get(2)?,
        doc: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl Database {
    pub fn insert_trip(
        &self,
        id: &str,
        owner_id: &str,
        share_type: &str,
        doc_json: &str,
    ) -> Result<TripRow> {
        let now = ts::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO trips (id, owner_id, share_type, doc, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (id, owner_id, share_type, doc_json, &now, &now),
            )?;
            Ok(())
        })?;
        Ok(TripRow {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            share_type: share_type.to_string(),
            doc: doc_json.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_trip(&self, id: &str) -> Result<Option<TripRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"))?;
            let row = stmt.query_row([id], trip_from_row).optional()?;
            Ok(row)
        })
    }

    /// A user's trips, most recently updated first. This is the computed
    /// view behind the "embedded trips" API.
    pub fn list_trips_by_owner(&self, owner_id: &str) -> Result<Vec<TripRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRIP_COLUMNS} FROM trips
                 WHERE owner_id = ?1
                 ORDER BY updated_at DESC"
            ))?;
            let rows = stmt
                .query_map([owner_id], trip_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_trip(&self, id: &str, share_type: &str, doc_json: &str) -> Result<Option<TripRow>> {
        let now = ts::now();
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE trips SET share_type = ?1, doc = ?2, updated_at = ?3 WHERE id = ?4",
                (share_type, doc_json, &now, id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let mut stmt =
                conn.prepare(&format!("SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"))?;
            let row = stmt.query_row([id], trip_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn delete_trip(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM trips WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn count_trips_by_owner(&self, owner_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM trips WHERE owner_id = ?1",
                [owner_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@b.co", "h", "Alice").unwrap();
        db.create_user("u2", "b@b.co", "h", "Bob").unwrap();
        db
    }

    #[test]
    fn owner_listing_sorts_by_updated_at_desc() {
        let db = db_with_users();
        db.insert_trip("t1", "u1", "private", r#"{"name":"Rome"}"#).unwrap();
        db.insert_trip("t2", "u1", "private", r#"{"name":"Lisbon"}"#).unwrap();
        db.insert_trip("t3", "u2", "public", r#"{"name":"Oslo"}"#).unwrap();

        // Touch t1 so it becomes the most recently updated
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE trips SET updated_at = ?1 WHERE id = 't1'",
                [ts::hours_from_now(1)],
            )?;
            Ok(())
        })
        .unwrap();

        let trips = db.list_trips_by_owner("u1").unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0].id, "t1");
        assert_eq!(trips[1].id, "t2");
    }

    #[test]
    fn update_bumps_updated_at_and_returns_row() {
        let db = db_with_users();
        let created = db
            .insert_trip("t1", "u1", "private", r#"{"name":"Rome"}"#)
            .unwrap();

        let updated = db
            .update_trip("t1", "friends", r#"{"name":"Rome, Italy"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(updated.share_type, "friends");
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);

        assert!(db.update_trip("missing", "private", "{}").unwrap().is_none());
    }

    #[test]
    fn delete_is_reported() {
        let db = db_with_users();
        db.insert_trip("t1", "u1", "private", "{}").unwrap();
        assert!(db.delete_trip("t1").unwrap());
        assert!(!db.delete_trip("t1").unwrap());
    }
}
