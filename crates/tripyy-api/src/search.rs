use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use tripyy_types::api::{SearchResponse, UserSummary};

use crate::communities::community_view;
use crate::error::ApiError;
use crate::state::AppState;

const SEARCH_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let q = params.q.trim().to_string();
    if q.chars().count() < 2 {
        return Err(ApiError::InvalidInput(
            "Search query must be at least 2 characters".into(),
        ));
    }

    let db = state.clone();
    let (users, communities) = tokio::task::spawn_blocking(move || {
        let users = db.db.search_users(&q, SEARCH_LIMIT)?;
        let communities = db.db.search_communities(&q, SEARCH_LIMIT)?;
        anyhow::Ok((users, communities))
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    Ok(Json(SearchResponse {
        users: users
            .iter()
            .map(|u| UserSummary {
                id: u.id.clone(),
                name: u.display_name.clone(),
                nickname: u.nickname(),
                photo: u.profile_photo(),
            })
            .collect(),
        communities: communities.iter().map(community_view).collect(),
    }))
}
