//! API request/response shapes.
//!
//! The wire format is camelCase; storage shapes in `domain` are
//! snake_case. Flexible payloads (POIs, trips, profile patches) are
//! handled as raw `serde_json::Value` in the handlers instead of
//! structs, because clients send open-ended documents there.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Comment;

// -- JWT Claims --

/// Session-token claims. Canonical definition lives here so the auth
/// handlers and the middleware share one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

// -- Envelope --

/// `{ "data": ... }` envelope used by the newer routes. Legacy auth and
/// engagement routes keep their fields at the root.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    /// The 6-digit code. Older clients send it as `code`.
    #[serde(alias = "code")]
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    #[serde(alias = "token")]
    pub code: String,
    pub new_password: String,
}

/// User shape returned to clients. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified_at: Option<String>,
    pub traveler_profile: Value,
    pub preferences: Value,
    pub likes_received: i64,
    pub friends: Vec<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub token: String,
    pub user: PublicUser,
    pub needs_verification: bool,
    /// Only present in dev mode (no mail provider configured), so the
    /// e2e flow can complete without a mailbox.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_code: Option<String>,
}

// -- Posts --

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub photos: Option<Vec<String>>,
    /// Full POI object, bare id string, or absent.
    #[serde(default, rename = "connectedPOI", alias = "connected_poi")]
    pub connected_poi: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub text: String,
    pub author_user_id: String,
    pub author_name: String,
    pub author_nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_photo: Option<String>,
    pub likes: Vec<String>,
    pub like_count: i64,
    pub created_at: String,
}

impl From<Comment> for CommentView {
    fn from(c: Comment) -> Self {
        Self {
            id: c.id,
            text: c.text,
            author_user_id: c.author_user_id,
            author_name: c.author_name,
            author_nickname: c.author_nickname,
            author_photo: c.author_photo,
            likes: c.likes,
            like_count: c.like_count,
            created_at: c.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub author_user_id: String,
    pub author_name: String,
    pub author_nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_photo: Option<String>,
    pub content: String,
    pub photos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "connectedPOI", skip_serializing_if = "Option::is_none")]
    pub connected_poi: Option<Value>,
    pub likes: Vec<String>,
    pub like_count: i64,
    pub comments: Vec<CommentView>,
    pub comment_count: i64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

// -- Communities --

#[derive(Debug, Deserialize)]
pub struct CreateCommunityRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunityView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub members: Vec<String>,
    pub member_count: usize,
    pub created_at: String,
}

// -- Search --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub users: Vec<UserSummary>,
    pub communities: Vec<CommunityView>,
}

// -- Profile --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub likes_received: i64,
    pub post_count: i64,
    pub trip_count: i64,
    pub friend_count: i64,
    pub community_count: i64,
}

#[derive(Debug, Serialize)]
pub struct NicknameCheck {
    pub available: bool,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportRequest {
    pub target_type: String,
    pub target_id: String,
    pub issue_type: String,
    pub description: String,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub target_content: Option<String>,
    #[serde(default)]
    pub target_author: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub id: String,
    pub reporter_id: String,
    pub reporter_nickname: String,
    pub target_type: String,
    pub target_id: String,
    pub target_name: String,
    pub target_content: String,
    pub target_author: Value,
    pub issue_type: String,
    pub description: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

// -- Admin --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAdminRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAdminRequest {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminView {
    pub id: String,
    pub user_id: String,
    pub role: String,
    pub assigned_by: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub deleted_count: usize,
    pub deleted_ids: Vec<String>,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMultipleRequest {
    pub user_ids: Vec<String>,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: Option<Value>,
}

// -- Uploads --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub public_id: String,
}

// -- Health --

#[derive(Debug, Serialize)]
pub struct HealthDependencies {
    pub database: bool,
    pub mailer: bool,
    pub media: bool,
    pub push: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub dependencies: HealthDependencies,
}
