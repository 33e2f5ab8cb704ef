use crate::models::PostRow;
use crate::{Database, OptionalExt, poiref};
use anyhow::Result;
use rusqlite::Row;
use serde_json::Value;
use tripyy_types::domain::{Comment, toggle_like};
use tripyy_types::ts;

const POST_COLUMNS: &str = "id, author_user_id, content, location, photos, connected_poi, \
     likes, liked_user_ids, comments, like_count, comment_count, created_at";

fn post_from_row(row: &Row) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_user_id: row.get(1)?,
        content: row.get(2)?,
        location: row.get(3)?,
        photos: row.get(4)?,
        connected_poi: row.get(5)?,
        likes: row.get(6)?,
        liked_user_ids: row.get(7)?,
        comments: row.get(8)?,
        like_count: row.get(9)?,
        comment_count: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Result of a like toggle, carrying what the notification fan-out needs.
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
    pub target_author_id: String,
    pub target_preview: String,
}

/// Result of adding a comment.
pub struct CommentOutcome {
    pub comment: Comment,
    pub comment_count: i64,
    pub post_author_id: String,
}

impl Database {
    pub fn insert_post(
        &self,
        id: &str,
        author_user_id: &str,
        content: &str,
        location: Option<&str>,
        photos_json: &str,
        connected_poi_json: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_user_id, content, location, photos, connected_poi, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    id,
                    author_user_id,
                    content,
                    location,
                    photos_json,
                    connected_poi_json,
                    ts::now(),
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
            let row = stmt.query_row([id], post_from_row).optional()?;
            Ok(row)
        })
    }

    /// All posts newer than `cutoff`, newest first. The reaper removes
    /// older rows eventually; the cutoff here guarantees an expired post
    /// is never observable in between.
    pub fn list_posts(&self, cutoff: &str) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE created_at >= ?1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([cutoff], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_post(
        &self,
        id: &str,
        content: &str,
        location: Option<&str>,
        photos_json: &str,
        connected_poi_json: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE posts
                 SET content = ?1, location = ?2, photos = ?3, connected_poi = ?4
                 WHERE id = ?5",
                (content, location, photos_json, connected_poi_json, id),
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete posts older than `cutoff`, returning their ids.
    pub fn delete_expired_posts(&self, cutoff: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM posts WHERE created_at < ?1")?;
            let ids = stmt
                .query_map([cutoff], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for id in &ids {
                conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            }
            Ok(ids)
        })
    }

    /// Toggle `nickname` in the post's like list. Runs entirely under
    /// the writer lock, so concurrent toggles by the same actor collapse
    /// to a consistent final state. `None` when the post is gone.
    pub fn toggle_post_like(
        &self,
        post_id: &str,
        nickname: &str,
        user_id: &str,
    ) -> Result<Option<LikeOutcome>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
            let Some(post) = stmt.query_row([post_id], post_from_row).optional()? else {
                return Ok(None);
            };

            let mut likes: Vec<String> = serde_json::from_str(&post.likes).unwrap_or_default();
            let mut liked_ids: Vec<String> =
                serde_json::from_str(&post.liked_user_ids).unwrap_or_default();
            let liked = toggle_like(&mut likes, &mut liked_ids, nickname, user_id);
            let like_count = likes.len() as i64;

            conn.execute(
                "UPDATE posts SET likes = ?1, liked_user_ids = ?2, like_count = ?3 WHERE id = ?4",
                (
                    serde_json::to_string(&likes)?,
                    serde_json::to_string(&liked_ids)?,
                    like_count,
                    post_id,
                ),
            )?;
            conn.execute(
                "UPDATE users SET likes_received = MAX(0, likes_received + ?1) WHERE id = ?2",
                (if liked { 1 } else { -1 }, &post.author_user_id),
            )?;

            Ok(Some(LikeOutcome {
                liked,
                like_count,
                target_author_id: post.author_user_id,
                target_preview: post.content,
            }))
        })
    }

    /// Toggle a like on an embedded comment. `None` when post or comment
    /// is missing.
    pub fn toggle_comment_like(
        &self,
        post_id: &str,
        comment_id: &str,
        nickname: &str,
        user_id: &str,
    ) -> Result<Option<LikeOutcome>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
            let Some(post) = stmt.query_row([post_id], post_from_row).optional()? else {
                return Ok(None);
            };

            let mut comments: Vec<Comment> =
                serde_json::from_str(&post.comments).unwrap_or_default();
            let Some(comment) = comments.iter_mut().find(|c| c.id == comment_id) else {
                return Ok(None);
            };

            let liked = toggle_like(
                &mut comment.likes,
                &mut comment.liked_user_ids,
                nickname,
                user_id,
            );
            comment.like_count = comment.likes.len() as i64;

            let outcome = LikeOutcome {
                liked,
                like_count: comment.like_count,
                target_author_id: comment.author_user_id.clone(),
                target_preview: comment.text.clone(),
            };

            conn.execute(
                "UPDATE posts SET comments = ?1 WHERE id = ?2",
                (serde_json::to_string(&comments)?, post_id),
            )?;
            Ok(Some(outcome))
        })
    }

    /// Append a comment and recompute the count in the same write.
    pub fn add_comment(&self, post_id: &str, comment: Comment) -> Result<Option<CommentOutcome>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"))?;
            let Some(post) = stmt.query_row([post_id], post_from_row).optional()? else {
                return Ok(None);
            };

            let mut comments: Vec<Comment> =
                serde_json::from_str(&post.comments).unwrap_or_default();
            comments.push(comment.clone());
            let comment_count = comments.len() as i64;

            conn.execute(
                "UPDATE posts SET comments = ?1, comment_count = ?2 WHERE id = ?3",
                (serde_json::to_string(&comments)?, comment_count, post_id),
            )?;

            Ok(Some(CommentOutcome {
                comment,
                comment_count,
                post_author_id: post.author_user_id,
            }))
        })
    }

    /// One-shot repair job: rewrite every string-typed `connected_poi`
    /// column to object form. Returns the ids of repaired posts.
    pub fn repair_poi_strings(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, connected_poi FROM posts WHERE connected_poi IS NOT NULL",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut repaired = Vec::new();
            for (id, stored) in rows {
                if let Some(fixed) = poiref::repair_stored(&stored) {
                    conn.execute(
                        "UPDATE posts SET connected_poi = ?1 WHERE id = ?2",
                        (serde_json::to_string(&fixed)?, &id),
                    )?;
                    repaired.push(id);
                }
            }
            Ok(repaired)
        })
    }

    pub fn count_posts_by_author(&self, author_user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM posts WHERE author_user_id = ?1",
                [author_user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Seed a raw `connected_poi` column value, bypassing
    /// canonicalisation. Test-only: reproduces legacy rows.
    #[cfg(test)]
    pub(crate) fn set_raw_connected_poi(&self, post_id: &str, raw: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE posts SET connected_poi = ?1 WHERE id = ?2",
                (raw, post_id),
            )?;
            Ok(())
        })
    }

    #[cfg(test)]
    pub(crate) fn backdate_post(&self, post_id: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE posts SET created_at = ?1 WHERE id = ?2",
                (created_at, post_id),
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;

    fn seed_post(db: &Database, id: &str, author: &str) {
        db.insert_post(id, author, "hello", None, "[]", None).unwrap();
    }

    #[test]
    fn like_toggle_keeps_count_in_sync() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@b.co", "h", "Alice").unwrap();
        seed_post(&db, "p1", "u1");

        let first = db.toggle_post_like("p1", "bob", "u2").unwrap().unwrap();
        assert!(first.liked);
        assert_eq!(first.like_count, 1);

        let second = db.toggle_post_like("p1", "bob", "u2").unwrap().unwrap();
        assert!(!second.liked);
        assert_eq!(second.like_count, 0);

        let post = db.get_post("p1").unwrap().unwrap();
        let likes: Vec<String> = serde_json::from_str(&post.likes).unwrap();
        assert_eq!(likes.len() as i64, post.like_count);
    }

    #[test]
    fn like_toggle_updates_author_likes_received() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "a@b.co", "h", "Alice").unwrap();
        seed_post(&db, "p1", "u1");

        db.toggle_post_like("p1", "bob", "u2").unwrap();
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().likes_received, 1);
        db.toggle_post_like("p1", "bob", "u2").unwrap();
        assert_eq!(db.get_user_by_id("u1").unwrap().unwrap().likes_received, 0);
    }

    #[test]
    fn missing_post_yields_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.toggle_post_like("nope", "bob", "u2").unwrap().is_none());
        assert!(
            db.toggle_comment_like("nope", "c1", "bob", "u2")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn comment_add_and_like() {
        let db = Database::open_in_memory().unwrap();
        seed_post(&db, "p1", "u1");

        let comment = Comment {
            id: ids::comment_id(),
            text: "nice".into(),
            author_user_id: "u2".into(),
            author_name: "Bob".into(),
            author_nickname: "bob".into(),
            author_photo: None,
            likes: vec![],
            liked_user_ids: vec![],
            like_count: 0,
            created_at: ts::now(),
        };
        let comment_id = comment.id.clone();

        let outcome = db.add_comment("p1", comment).unwrap().unwrap();
        assert_eq!(outcome.comment_count, 1);
        assert_eq!(outcome.post_author_id, "u1");

        let like = db
            .toggle_comment_like("p1", &comment_id, "carol", "u3")
            .unwrap()
            .unwrap();
        assert!(like.liked);
        assert_eq!(like.like_count, 1);
        assert_eq!(like.target_author_id, "u2");

        // Unknown comment id
        assert!(
            db.toggle_comment_like("p1", "missing", "carol", "u3")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn expired_posts_are_invisible_then_reaped() {
        let db = Database::open_in_memory().unwrap();
        seed_post(&db, "fresh", "u1");
        seed_post(&db, "stale", "u1");
        db.backdate_post("stale", &ts::hours_ago(25)).unwrap();

        let visible = db.list_posts(&ts::hours_ago(24)).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "fresh");

        let deleted = db.delete_expired_posts(&ts::hours_ago(24)).unwrap();
        assert_eq!(deleted, vec!["stale".to_string()]);
        assert!(db.get_post("stale").unwrap().is_none());
        assert!(db.get_post("fresh").unwrap().is_some());
    }

    #[test]
    fn repair_rewrites_only_string_rows() {
        let db = Database::open_in_memory().unwrap();
        seed_post(&db, "legacy", "u1");
        seed_post(&db, "ok", "u1");
        seed_post(&db, "bare", "u1");

        let double_encoded =
            serde_json::to_string(r#"{"name":"Cafe","description":"x"}"#).unwrap();
        db.set_raw_connected_poi("legacy", &double_encoded).unwrap();
        db.set_raw_connected_poi("ok", r#"{"id":"poi_1","name":"Cafe"}"#)
            .unwrap();

        let repaired = db.repair_poi_strings().unwrap();
        assert_eq!(repaired, vec!["legacy".to_string()]);

        let row = db.get_post("legacy").unwrap().unwrap();
        let value: serde_json::Value =
            serde_json::from_str(row.connected_poi.as_deref().unwrap()).unwrap();
        assert!(value["id"].as_str().unwrap().starts_with("poi_fix_"));
        assert_eq!(value["name"], "Cafe");

        // Second pass is a no-op
        assert!(db.repair_poi_strings().unwrap().is_empty());
    }
}
