use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};

use tripyy_db::ids;
use tripyy_db::models::CommunityRow;
use tripyy_types::api::{Claims, CommunityView, CreateCommunityRequest, Data};

use crate::error::ApiError;
use crate::state::AppState;

pub(crate) fn community_view(row: &CommunityRow) -> CommunityView {
    let members: Vec<String> = serde_json::from_str(&row.members).unwrap_or_default();
    CommunityView {
        id: row.id.clone(),
        name: row.name.clone(),
        description: row.description.clone(),
        created_by: row.created_by.clone(),
        member_count: members.len(),
        members,
        created_at: row.created_at.clone(),
    }
}

pub async fn create_community(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<Data<CommunityView>>), ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("Community name is required".into()));
    }

    let row = state.db.insert_community(
        &ids::entity_id(),
        name,
        req.description.trim(),
        &claims.sub,
    )?;
    Ok((StatusCode::CREATED, Json(Data::new(community_view(&row)))))
}

pub async fn list_communities(
    State(state): State<AppState>,
) -> Result<Json<Data<Vec<CommunityView>>>, ApiError> {
    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_communities())
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    Ok(Json(Data::new(rows.iter().map(community_view).collect())))
}

pub async fn join_community(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Data<CommunityView>>, ApiError> {
    let row = state
        .db
        .join_community(&id, &claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Community not found".into()))?;
    Ok(Json(Data::new(community_view(&row))))
}

pub async fn leave_community(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Data<CommunityView>>, ApiError> {
    let row = state
        .db
        .leave_community(&id, &claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Community not found".into()))?;
    Ok(Json(Data::new(community_view(&row))))
}
