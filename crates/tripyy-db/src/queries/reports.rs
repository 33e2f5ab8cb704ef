use crate::models::ReportRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Row;
use tripyy_types::ts;

const REPORT_COLUMNS: &str = "id, reporter_id, reporter_nickname, target_type, target_id, \
     target_name, target_content, target_author, issue_type, description, status, \
     admin_notes, reviewed_by, created_at, updated_at";

fn report_from_row(row: &Row) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: row.get(0)?,
        reporter_id: row.get(1)?,
        reporter_nickname: row.get(2)?,
        target_type: row.get(3)?,
        target_id: row.get(4)?,
        target_name: row.get(5)?,
        target_content: row.get(6)?,
        target_author: row.get(7)?,
        issue_type: row.get(8)?,
        description: row.get(9)?,
        status: row.get(10)?,
        admin_notes: row.get(11)?,
        reviewed_by: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl Database {
    #[allow(clippy::too_many_arguments)]
    pub fn insert_report(
        &self,
        id: &str,
        reporter_id: &str,
        reporter_nickname: &str,
        target_type: &str,
        target_id: &str,
        target_name: &str,
        target_content: &str,
        target_author_json: &str,
        issue_type: &str,
        description: &str,
    ) -> Result<ReportRow> {
        let now = ts::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (id, reporter_id, reporter_nickname, target_type, target_id,
                     target_name, target_content, target_author, issue_type, description,
                     status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11, ?11)",
                rusqlite::params![
                    id,
                    reporter_id,
                    reporter_nickname,
                    target_type,
                    target_id,
                    target_name,
                    target_content,
                    target_author_json,
                    issue_type,
                    description,
                    &now,
                ],
            )?;
            Ok(())
        })?;
        self.get_report(id)?
            .ok_or_else(|| anyhow::anyhow!("report vanished after insert"))
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))?;
            let row = stmt.query_row([id], report_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn list_reports(&self) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REPORT_COLUMNS} FROM reports ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Patch status and/or admin notes, stamping the reviewer.
    pub fn update_report(
        &self,
        id: &str,
        status: Option<&str>,
        admin_notes: Option<&str>,
        reviewed_by: &str,
    ) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?1"))?;
            let Some(current) = stmt.query_row([id], report_from_row).optional()? else {
                return Ok(None);
            };

            let status = status.unwrap_or(&current.status);
            let admin_notes = admin_notes
                .map(String::from)
                .or(current.admin_notes.clone());

            conn.execute(
                "UPDATE reports
                 SET status = ?1, admin_notes = ?2, reviewed_by = ?3, updated_at = ?4
                 WHERE id = ?5",
                (status, &admin_notes, reviewed_by, ts::now(), id),
            )?;

            let row = stmt.query_row([id], report_from_row).optional()?;
            Ok(row)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    fn seed_report(db: &Database, id: &str) {
        db.insert_report(
            id,
            "u1",
            "alice",
            "post",
            "p1",
            "Post by Bob",
            "hello world",
            r#"{"id":"u2","name":"Bob","type":"user"}"#,
            "spam",
            "ten chars here",
        )
        .unwrap();
    }

    #[test]
    fn report_starts_pending() {
        let db = Database::open_in_memory().unwrap();
        seed_report(&db, "r1");

        let row = db.get_report("r1").unwrap().unwrap();
        assert_eq!(row.status, "pending");
        assert!(row.reviewed_by.is_none());
        assert_eq!(row.created_at, row.updated_at);
    }

    #[test]
    fn update_stamps_reviewer_and_preserves_unpatched_fields() {
        let db = Database::open_in_memory().unwrap();
        seed_report(&db, "r1");

        let row = db
            .update_report("r1", Some("resolved"), None, "admin-1")
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "resolved");
        assert_eq!(row.reviewed_by.as_deref(), Some("admin-1"));
        assert!(row.admin_notes.is_none());

        // Notes-only patch keeps the status
        let row = db
            .update_report("r1", None, Some("looked fine"), "admin-2")
            .unwrap()
            .unwrap();
        assert_eq!(row.status, "resolved");
        assert_eq!(row.admin_notes.as_deref(), Some("looked fine"));

        assert!(db.update_report("missing", None, None, "a").unwrap().is_none());
    }
}
