use crate::models::AdminRow;
use crate::{Database, OptionalExt, ids};
use anyhow::Result;
use rusqlite::Row;
use tripyy_types::ts;

const ADMIN_COLUMNS: &str =
    "id, user_id, role, assigned_by, permissions, is_active, created_at, updated_at";

fn admin_from_row(row: &Row) -> rusqlite::Result<AdminRow> {
    Ok(AdminRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        assigned_by: row.get(3)?,
        permissions: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl Database {
    /// Role assignment is an upsert on `user_id`: re-assigning changes
    /// the role and reactivates the row.
    pub fn assign_admin(&self, user_id: &str, role: &str, assigned_by: &str) -> Result<AdminRow> {
        let now = ts::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admins (id, user_id, role, assigned_by, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     role = excluded.role,
                     assigned_by = excluded.assigned_by,
                     is_active = 1,
                     updated_at = excluded.updated_at",
                (ids::entity_id(), user_id, role, assigned_by, &now),
            )?;
            Ok(())
        })?;
        self.get_admin_by_user_id(user_id)?
            .ok_or_else(|| anyhow::anyhow!("admin vanished after upsert"))
    }

    pub fn get_admin_by_user_id(&self, user_id: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ADMIN_COLUMNS} FROM admins WHERE user_id = ?1"
            ))?;
            let row = stmt.query_row([user_id], admin_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn list_admins(&self) -> Result<Vec<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ADMIN_COLUMNS} FROM admins ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([], admin_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_admin(
        &self,
        id: &str,
        role: Option<&str>,
        is_active: Option<bool>,
    ) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = ?1"))?;
            let Some(current) = stmt.query_row([id], admin_from_row).optional()? else {
                return Ok(None);
            };

            let role = role.unwrap_or(&current.role);
            let is_active = is_active.unwrap_or(current.is_active);

            conn.execute(
                "UPDATE admins SET role = ?1, is_active = ?2, updated_at = ?3 WHERE id = ?4",
                (role, is_active as i64, ts::now(), id),
            )?;

            let row = stmt.query_row([id], admin_from_row).optional()?;
            Ok(row)
        })
    }

    /// Active admin row of any role.
    pub fn is_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .get_admin_by_user_id(user_id)?
            .is_some_and(|a| a.is_active))
    }

    pub fn is_super_admin(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .get_admin_by_user_id(user_id)?
            .is_some_and(|a| a.is_active && a.role == "super_admin"))
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn assignment_upserts_on_user_id() {
        let db = Database::open_in_memory().unwrap();

        let first = db.assign_admin("u1", "moderator", "root").unwrap();
        assert_eq!(first.role, "moderator");
        assert!(first.is_active);

        let second = db.assign_admin("u1", "admin", "root").unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.role, "admin");
        assert_eq!(db.list_admins().unwrap().len(), 1);
    }

    #[test]
    fn gating_respects_role_and_active_flag() {
        let db = Database::open_in_memory().unwrap();
        let row = db.assign_admin("u1", "super_admin", "root").unwrap();

        assert!(db.is_admin("u1").unwrap());
        assert!(db.is_super_admin("u1").unwrap());
        assert!(!db.is_admin("u2").unwrap());

        db.update_admin(&row.id, None, Some(false)).unwrap();
        assert!(!db.is_admin("u1").unwrap());
        assert!(!db.is_super_admin("u1").unwrap());

        db.update_admin(&row.id, Some("moderator"), Some(true)).unwrap();
        assert!(db.is_admin("u1").unwrap());
        assert!(!db.is_super_admin("u1").unwrap());
    }
}
