//! Domain model for everything stored in JSON columns.
//!
//! These types are the storage shapes (snake_case keys). API-facing
//! request/response shapes live in `api` and are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Traveler profile embedded in a user row. Free-form apart from the
/// fields the backend itself reads; unknown keys are preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelerProfile {
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Kinds of single-use email verification codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_verification" => Some(TokenKind::EmailVerification),
            "password_reset" => Some(TokenKind::PasswordReset),
            _ => None,
        }
    }

    /// Token lifetime: 24 h for verification, 1 h for reset.
    pub fn validity_hours(self) -> i64 {
        match self {
            TokenKind::EmailVerification => 24,
            TokenKind::PasswordReset => 1,
        }
    }
}

/// A comment embedded in a post's `comments` JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub author_user_id: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_nickname: String,
    #[serde(default)]
    pub author_photo: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub liked_user_ids: Vec<String>,
    #[serde(default)]
    pub like_count: i64,
    pub created_at: String,
}

/// A review embedded in a POI's `reviews` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub rating: i64,
    #[serde(default)]
    pub text: String,
    pub author: String,
    #[serde(default)]
    pub author_photo: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub liked_user_ids: Vec<String>,
    #[serde(default)]
    pub like_count: i64,
    pub created_at: String,
}

/// POI location. Both `lat/lng` and `latitude/longitude` spellings are
/// persisted for backward compatibility with older clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoiLocation {
    pub lat: f64,
    pub lng: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl PoiLocation {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            latitude: lat,
            longitude: lng,
        }
    }
}

/// A point of interest. Stored as a JSON document in the pois table,
/// with lat/lng duplicated into real columns for exact-match lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub location: PoiLocation,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_poi_type", rename = "type")]
    pub poi_type: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub owner_user_id: Option<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub review_count: i64,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub liked_user_ids: Vec<String>,
    #[serde(default)]
    pub like_count: i64,
    pub created_at: String,
}

fn default_poi_type() -> String {
    "public".to_string()
}

impl Poi {
    /// Recompute `average_rating` and `review_count` from the review list.
    pub fn recompute_rating(&mut self) {
        self.review_count = self.reviews.len() as i64;
        if self.reviews.is_empty() {
            self.average_rating = 0.0;
        } else {
            let sum: i64 = self.reviews.iter().map(|r| r.rating).sum();
            self.average_rating = sum as f64 / self.reviews.len() as f64;
        }
    }
}

/// Closed set of reportable entity kinds.
pub const REPORT_TARGET_TYPES: &[&str] = &["poi", "post", "comment", "group"];

/// Closed set of report issue categories.
pub const REPORT_ISSUE_TYPES: &[&str] = &[
    "spam",
    "harassment",
    "inappropriate_content",
    "fake_information",
    "copyright_violation",
    "hate_speech",
    "violence",
    "other",
];

/// Closed set of report workflow states.
pub const REPORT_STATUSES: &[&str] = &["pending", "reviewing", "resolved", "dismissed"];

/// Closed set of admin roles.
pub const ADMIN_ROLES: &[&str] = &["moderator", "admin", "super_admin"];

/// Trip sharing visibility.
pub const TRIP_SHARE_TYPES: &[&str] = &["private", "public", "friends"];

/// Toggle `actor` in a nickname-keyed like list, also maintaining the
/// parallel user-id list. Returns true when the like was added.
///
/// Likes are keyed by nickname for API compatibility; the user-id list
/// exists so a future migration can survive nickname changes.
pub fn toggle_like(
    likes: &mut Vec<String>,
    liked_user_ids: &mut Vec<String>,
    nickname: &str,
    user_id: &str,
) -> bool {
    if let Some(pos) = likes.iter().position(|n| n == nickname) {
        likes.remove(pos);
        liked_user_ids.retain(|id| id != user_id);
        false
    } else {
        likes.push(nickname.to_string());
        if !liked_user_ids.iter().any(|id| id == user_id) {
            liked_user_ids.push(user_id.to_string());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_like_is_idempotent_per_state() {
        let mut likes = vec![];
        let mut ids = vec![];

        assert!(toggle_like(&mut likes, &mut ids, "bob", "u1"));
        assert_eq!(likes, vec!["bob"]);
        assert_eq!(ids, vec!["u1"]);

        // Second toggle removes
        assert!(!toggle_like(&mut likes, &mut ids, "bob", "u1"));
        assert!(likes.is_empty());
        assert!(ids.is_empty());
    }

    #[test]
    fn toggle_like_never_duplicates_nickname() {
        let mut likes = vec!["alice".to_string(), "bob".to_string()];
        let mut ids = vec!["ua".to_string(), "ub".to_string()];

        toggle_like(&mut likes, &mut ids, "bob", "ub");
        toggle_like(&mut likes, &mut ids, "bob", "ub");
        assert_eq!(likes.iter().filter(|n| *n == "bob").count(), 1);
        assert_eq!(likes.len(), 2);
    }

    #[test]
    fn rating_recompute() {
        let mut poi = Poi {
            id: "p1".into(),
            name: "Cafe".into(),
            description: String::new(),
            location: PoiLocation::new(1.0, 2.0),
            photos: vec![],
            icon: None,
            poi_type: "public".into(),
            author: "alice".into(),
            owner_user_id: None,
            reviews: vec![],
            average_rating: 0.0,
            review_count: 0,
            likes: vec![],
            liked_user_ids: vec![],
            like_count: 0,
            created_at: crate::ts::now(),
        };
        for rating in [5, 3, 4] {
            poi.reviews.push(Review {
                id: format!("r{rating}"),
                rating,
                text: String::new(),
                author: "bob".into(),
                author_photo: None,
                photo: None,
                likes: vec![],
                liked_user_ids: vec![],
                like_count: 0,
                created_at: crate::ts::now(),
            });
        }
        poi.recompute_rating();
        assert_eq!(poi.review_count, 3);
        assert!((poi.average_rating - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn token_kind_roundtrip() {
        assert_eq!(
            TokenKind::parse("email_verification"),
            Some(TokenKind::EmailVerification)
        );
        assert_eq!(TokenKind::parse("password_reset"), Some(TokenKind::PasswordReset));
        assert_eq!(TokenKind::parse("bogus"), None);
        assert_eq!(TokenKind::EmailVerification.validity_hours(), 24);
        assert_eq!(TokenKind::PasswordReset.validity_hours(), 1);
    }

    #[test]
    fn traveler_profile_preserves_unknown_keys() {
        let json = r#"{"nickname":"wanderer","home_base":"Lisbon"}"#;
        let profile: TravelerProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.nickname.as_deref(), Some("wanderer"));
        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back["home_base"], "Lisbon");
    }
}
