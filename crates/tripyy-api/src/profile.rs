use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::Value;

use tripyy_db::models::UserRow;
use tripyy_db::queries::ProfileUpdate;
use tripyy_types::api::{Claims, Data, NicknameCheck, UserStats, UserSummary};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn get_traveler_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<Value>>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let profile: Value =
        serde_json::from_str(&user.traveler_profile).unwrap_or(Value::Object(Default::default()));
    Ok(Json(Data::new(profile)))
}

pub async fn update_traveler_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<Json<Data<Value>>, ApiError> {
    // Clients send either the bare profile document or wrap it.
    let profile = body.get("travelerProfile").cloned().unwrap_or(body);
    if !profile.is_object() {
        return Err(ApiError::InvalidInput("Profile must be an object".into()));
    }
    let profile_json =
        serde_json::to_string(&profile).map_err(|e| ApiError::Internal(e.into()))?;

    match state.db.update_traveler_profile(&claims.sub, &profile_json)? {
        ProfileUpdate::Applied => Ok(Json(Data::new(profile))),
        ProfileUpdate::NicknameTaken => Err(ApiError::Conflict("Nickname already taken".into())),
    }
}

fn stats_for(state: &AppState, user: &UserRow) -> Result<UserStats, ApiError> {
    let friend_count = serde_json::from_str::<Vec<String>>(&user.friends)
        .map(|f| f.len() as i64)
        .unwrap_or(0);
    Ok(UserStats {
        likes_received: user.likes_received,
        post_count: state.db.count_posts_by_author(&user.id)?,
        trip_count: state.db.count_trips_by_owner(&user.id)?,
        friend_count,
        community_count: state.db.count_memberships(&user.id)?,
    })
}

pub async fn get_my_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<UserStats>>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(Data::new(stats_for(&state, &user)?)))
}

/// Stats for another user; the identifier is a user id or a nickname.
pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> Result<Json<Data<UserStats>>, ApiError> {
    let user = match state.db.get_user_by_id(&identifier)? {
        Some(user) => user,
        None => state
            .db
            .get_user_by_nickname(&identifier)?
            .ok_or_else(|| ApiError::NotFound("User not found".into()))?,
    };
    Ok(Json(Data::new(stats_for(&state, &user)?)))
}

pub async fn get_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<Vec<UserSummary>>>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let friend_ids: Vec<String> = serde_json::from_str(&user.friends).unwrap_or_default();

    let db = state.clone();
    let friends = tokio::task::spawn_blocking(move || db.db.get_users_by_ids(&friend_ids))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    let summaries = friends
        .iter()
        .map(|f| UserSummary {
            id: f.id.clone(),
            name: f.display_name.clone(),
            nickname: f.nickname(),
            photo: f.profile_photo(),
        })
        .collect();
    Ok(Json(Data::new(summaries)))
}

pub async fn get_llm_config(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<Value>>, ApiError> {
    let user = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let config: Value =
        serde_json::from_str(&user.llm_config).unwrap_or(Value::Object(Default::default()));
    Ok(Json(Data::new(config)))
}

pub async fn update_llm_config(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<Json<Data<Value>>, ApiError> {
    if !body.is_object() {
        return Err(ApiError::InvalidInput("Config must be an object".into()));
    }
    let json = serde_json::to_string(&body).map_err(|e| ApiError::Internal(e.into()))?;
    state.db.update_llm_config(&claims.sub, &json)?;
    Ok(Json(Data::new(body)))
}

/// Public availability probe, no auth.
pub async fn check_nickname(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
) -> Result<Json<NicknameCheck>, ApiError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(ApiError::InvalidInput("Nickname is required".into()));
    }
    let available = state.db.get_user_by_nickname(nickname)?.is_none();
    Ok(Json(NicknameCheck { available }))
}

/// Authenticated probe: your own current nickname counts as available.
pub async fn check_nickname_authed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(nickname): Path<String>,
) -> Result<Json<NicknameCheck>, ApiError> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(ApiError::InvalidInput("Nickname is required".into()));
    }
    let available = match state.db.get_user_by_nickname(nickname)? {
        Some(holder) => holder.id == claims.sub,
        None => true,
    };
    Ok(Json(NicknameCheck { available }))
}
