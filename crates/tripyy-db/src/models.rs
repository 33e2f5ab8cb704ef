/// Database row types — these map directly to SQLite rows. JSON columns
/// come back as raw strings; callers parse them with the `tripyy-types`
/// domain shapes.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub email_verified: bool,
    pub email_verified_at: Option<String>,
    pub preferences: String,
    pub traveler_profile: String,
    pub llm_config: String,
    pub saved_agents: String,
    pub friends: String,
    pub likes_received: i64,
    pub last_known_location: Option<String>,
    pub push_token: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl UserRow {
    /// The nickname out of the traveler profile JSON, empty when unset.
    pub fn nickname(&self) -> String {
        serde_json::from_str::<tripyy_types::domain::TravelerProfile>(&self.traveler_profile)
            .ok()
            .and_then(|p| p.nickname)
            .unwrap_or_default()
    }

    /// Display handle used as the like key: nickname when set, else name.
    pub fn handle(&self) -> String {
        let nickname = self.nickname();
        if nickname.is_empty() {
            self.display_name.clone()
        } else {
            nickname
        }
    }

    pub fn profile_photo(&self) -> Option<String> {
        serde_json::from_str::<tripyy_types::domain::TravelerProfile>(&self.traveler_profile)
            .ok()
            .and_then(|p| p.photo)
    }
}

pub struct TokenRow {
    pub id: String,
    pub email: String,
    pub code: String,
    pub kind: String,
    pub expires_at: String,
    pub used: bool,
    pub created_at: String,
}

pub struct TripRow {
    pub id: String,
    pub owner_id: String,
    pub share_type: String,
    pub doc: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PoiRow {
    pub id: String,
    pub owner_user_id: Option<String>,
    pub author: String,
    pub lat: f64,
    pub lng: f64,
    pub doc: String,
    pub created_at: String,
}

pub struct PostRow {
    pub id: String,
    pub author_user_id: String,
    pub content: String,
    pub location: Option<String>,
    pub photos: String,
    pub connected_poi: Option<String>,
    pub likes: String,
    pub liked_user_ids: String,
    pub comments: String,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
}

pub struct CommunityRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub members: String,
    pub created_at: String,
}

pub struct ReportRow {
    pub id: String,
    pub reporter_id: String,
    pub reporter_nickname: String,
    pub target_type: String,
    pub target_id: String,
    pub target_name: String,
    pub target_content: String,
    pub target_author: String,
    pub issue_type: String,
    pub description: String,
    pub status: String,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct AdminRow {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub assigned_by: String,
    pub permissions: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}
