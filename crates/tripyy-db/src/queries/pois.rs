use crate::models::PoiRow;
use crate::{Database, OptionalExt};
use anyhow::Result;
use rusqlite::Row;
use tripyy_types::domain::{Poi, Review, toggle_like};

const POI_COLUMNS: &str = "id, owner_user_id, author, lat, lng, doc, created_at";

fn poi_from_row(row: &Row) -> rusqlite::Result<PoiRow> {
    Ok(PoiRow {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        author: row.get(2)?,
        lat: row.get(3)?,
        lng: row.get(4)?,
        doc: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Outcome of a POI or review like toggle.
pub struct PoiLikeOutcome {
    pub liked: bool,
    pub like_count: i64,
    /// Nickname of whoever authored the liked thing (POI author or
    /// review author), for the notification fan-out.
    pub author: String,
    pub poi_name: String,
}

impl Database {
    pub fn insert_poi(&self, poi: &Poi) -> Result<()> {
        let doc = serde_json::to_string(poi)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pois (id, owner_user_id, author, lat, lng, doc, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                (
                    &poi.id,
                    &poi.owner_user_id,
                    &poi.author,
                    poi.location.lat,
                    poi.location.lng,
                    &doc,
                    &poi.created_at,
                ),
            )?;
            Ok(())
        })
    }

    pub fn get_poi(&self, id: &str) -> Result<Option<Poi>> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM pois WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(doc.and_then(|d| serde_json::from_str(&d).ok()))
        })
    }

    pub fn list_pois(&self) -> Result<Vec<Poi>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT doc FROM pois ORDER BY created_at DESC")?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(docs
                .iter()
                .filter_map(|d| serde_json::from_str(d).ok())
                .collect())
        })
    }

    /// Lookup by exact lat/lng match of the persisted location — the
    /// legacy client identifies POIs by coordinates, not id.
    pub fn find_poi_by_coords(&self, lat: f64, lng: f64) -> Result<Option<PoiRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POI_COLUMNS} FROM pois WHERE lat = ?1 AND lng = ?2"
            ))?;
            let row = stmt
                .query_row(rusqlite::params![lat, lng], poi_from_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Replace a POI document wholesale, keeping coordinate columns in
    /// sync with the embedded location.
    pub fn replace_poi(&self, poi: &Poi) -> Result<bool> {
        let doc = serde_json::to_string(poi)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE pois SET owner_user_id = ?1, author = ?2, lat = ?3, lng = ?4, doc = ?5
                 WHERE id = ?6",
                (
                    &poi.owner_user_id,
                    &poi.author,
                    poi.location.lat,
                    poi.location.lng,
                    &doc,
                    &poi.id,
                ),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_poi(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM pois WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn toggle_poi_like(
        &self,
        poi_id: &str,
        nickname: &str,
        user_id: &str,
    ) -> Result<Option<PoiLikeOutcome>> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM pois WHERE id = ?1", [poi_id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(doc) = doc else { return Ok(None) };
            let Ok(mut poi) = serde_json::from_str::<Poi>(&doc) else {
                return Ok(None);
            };

            let liked = toggle_like(&mut poi.likes, &mut poi.liked_user_ids, nickname, user_id);
            poi.like_count = poi.likes.len() as i64;

            conn.execute(
                "UPDATE pois SET doc = ?1 WHERE id = ?2",
                (serde_json::to_string(&poi)?, poi_id),
            )?;

            Ok(Some(PoiLikeOutcome {
                liked,
                like_count: poi.like_count,
                author: poi.author,
                poi_name: poi.name,
            }))
        })
    }

    /// Append a review at the POI identified by exact coordinates and
    /// recompute the aggregate rating in the same write.
    pub fn add_review(&self, lat: f64, lng: f64, review: Review) -> Result<Option<Poi>> {
        self.with_conn(|conn| {
            let found: Option<(String, String)> = conn
                .query_row(
                    "SELECT id, doc FROM pois WHERE lat = ?1 AND lng = ?2",
                    rusqlite::params![lat, lng],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((id, doc)) = found else { return Ok(None) };
            let Ok(mut poi) = serde_json::from_str::<Poi>(&doc) else {
                return Ok(None);
            };

            poi.reviews.push(review);
            poi.recompute_rating();

            conn.execute(
                "UPDATE pois SET doc = ?1 WHERE id = ?2",
                (serde_json::to_string(&poi)?, id),
            )?;
            Ok(Some(poi))
        })
    }

    pub fn toggle_review_like(
        &self,
        poi_id: &str,
        review_id: &str,
        nickname: &str,
        user_id: &str,
    ) -> Result<Option<PoiLikeOutcome>> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM pois WHERE id = ?1", [poi_id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(doc) = doc else { return Ok(None) };
            let Ok(mut poi) = serde_json::from_str::<Poi>(&doc) else {
                return Ok(None);
            };

            let poi_name = poi.name.clone();
            let Some(review) = poi.reviews.iter_mut().find(|r| r.id == review_id) else {
                return Ok(None);
            };

            let liked = toggle_like(
                &mut review.likes,
                &mut review.liked_user_ids,
                nickname,
                user_id,
            );
            review.like_count = review.likes.len() as i64;

            let outcome = PoiLikeOutcome {
                liked,
                like_count: review.like_count,
                author: review.author.clone(),
                poi_name,
            };

            conn.execute(
                "UPDATE pois SET doc = ?1 WHERE id = ?2",
                (serde_json::to_string(&poi)?, poi_id),
            )?;
            Ok(Some(outcome))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;
    use tripyy_types::domain::PoiLocation;
    use tripyy_types::ts;

    fn sample_poi(id: &str, lat: f64, lng: f64) -> Poi {
        Poi {
            id: id.to_string(),
            name: "Cafe Central".into(),
            description: "coffee".into(),
            location: PoiLocation::new(lat, lng),
            photos: vec![],
            icon: None,
            poi_type: "public".into(),
            author: "alice".into(),
            owner_user_id: Some("u1".into()),
            reviews: vec![],
            average_rating: 0.0,
            review_count: 0,
            likes: vec![],
            liked_user_ids: vec![],
            like_count: 0,
            created_at: ts::now(),
        }
    }

    fn sample_review(rating: i64) -> Review {
        Review {
            id: ids::comment_id(),
            rating,
            text: "good".into(),
            author: "bob".into(),
            author_photo: None,
            photo: None,
            likes: vec![],
            liked_user_ids: vec![],
            like_count: 0,
            created_at: ts::now(),
        }
    }

    #[test]
    fn coord_lookup_requires_exact_match() {
        let db = Database::open_in_memory().unwrap();
        db.insert_poi(&sample_poi("p1", 48.2082, 16.3738)).unwrap();

        assert!(db.find_poi_by_coords(48.2082, 16.3738).unwrap().is_some());
        assert!(db.find_poi_by_coords(48.2083, 16.3738).unwrap().is_none());
    }

    #[test]
    fn review_aggregate_stays_consistent() {
        let db = Database::open_in_memory().unwrap();
        db.insert_poi(&sample_poi("p1", 1.0, 2.0)).unwrap();

        for rating in [5, 3] {
            db.add_review(1.0, 2.0, sample_review(rating)).unwrap().unwrap();
        }
        let poi = db.add_review(1.0, 2.0, sample_review(4)).unwrap().unwrap();

        assert_eq!(poi.review_count, 3);
        assert!((poi.average_rating - 4.0).abs() < f64::EPSILON);

        // Stored doc matches the returned aggregate
        let stored = db.get_poi("p1").unwrap().unwrap();
        assert_eq!(stored.review_count, 3);
        assert!((stored.average_rating - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn review_like_toggle() {
        let db = Database::open_in_memory().unwrap();
        db.insert_poi(&sample_poi("p1", 1.0, 2.0)).unwrap();
        let poi = db.add_review(1.0, 2.0, sample_review(5)).unwrap().unwrap();
        let review_id = poi.reviews[0].id.clone();

        let first = db
            .toggle_review_like("p1", &review_id, "carol", "u3")
            .unwrap()
            .unwrap();
        assert!(first.liked);
        assert_eq!(first.like_count, 1);
        assert_eq!(first.author, "bob");
        assert_eq!(first.poi_name, "Cafe Central");

        let second = db
            .toggle_review_like("p1", &review_id, "carol", "u3")
            .unwrap()
            .unwrap();
        assert!(!second.liked);
        assert_eq!(second.like_count, 0);
    }

    #[test]
    fn poi_like_toggle_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.insert_poi(&sample_poi("p1", 1.0, 2.0)).unwrap();

        let like = db.toggle_poi_like("p1", "bob", "u2").unwrap().unwrap();
        assert!(like.liked);
        assert_eq!(like.like_count, 1);

        assert!(db.delete_poi("p1").unwrap());
        assert!(db.toggle_poi_like("p1", "bob", "u2").unwrap().is_none());
    }
}
