use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde_json::{Value, json};
use tracing::info;

use tripyy_db::models::AdminRow;
use tripyy_types::api::{
    AdminView, AssignAdminRequest, Claims, CleanupSummary, Data, UpdateAdminRequest,
};
use tripyy_types::domain::ADMIN_ROLES;
use tripyy_types::ts;

use crate::error::ApiError;
use crate::posts::POST_TTL_HOURS;
use crate::state::AppState;

fn admin_view(row: &AdminRow) -> AdminView {
    AdminView {
        id: row.id.clone(),
        user_id: row.user_id.clone(),
        role: row.role.clone(),
        assigned_by: row.assigned_by.clone(),
        is_active: row.is_active,
        user_name: None,
        user_email: None,
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
    }
}

fn require_super_admin(state: &AppState, claims: &Claims) -> Result<(), ApiError> {
    if state.db.is_super_admin(&claims.sub)? {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Super admin access required".into()))
    }
}

pub async fn assign_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AssignAdminRequest>,
) -> Result<Json<Data<AdminView>>, ApiError> {
    require_super_admin(&state, &claims)?;

    if !ADMIN_ROLES.contains(&req.role.as_str()) {
        return Err(ApiError::InvalidInput("Invalid admin role".into()));
    }
    let user = state
        .db
        .get_user_by_id(&req.user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let row = state.db.assign_admin(&user.id, &req.role, &claims.sub)?;
    info!(user_id = %user.id, role = %req.role, "admin role assigned");

    let mut view = admin_view(&row);
    view.user_name = Some(user.display_name);
    view.user_email = Some(user.email);
    Ok(Json(Data::new(view)))
}

/// Admin listing joined with the user directory for display names.
pub async fn list_admins(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<Vec<AdminView>>>, ApiError> {
    if !state.db.is_admin(&claims.sub)? {
        return Err(ApiError::Forbidden("Admin access required".into()));
    }

    let db = state.clone();
    let views = tokio::task::spawn_blocking(move || {
        let rows = db.db.list_admins()?;
        let user_ids: Vec<String> = rows.iter().map(|r| r.user_id.clone()).collect();
        let users = db.db.get_users_by_ids(&user_ids)?;

        let views = rows
            .iter()
            .map(|row| {
                let mut view = admin_view(row);
                if let Some(user) = users.iter().find(|u| u.id == row.user_id) {
                    view.user_name = Some(user.display_name.clone());
                    view.user_email = Some(user.email.clone());
                }
                view
            })
            .collect::<Vec<_>>();
        anyhow::Ok(views)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    Ok(Json(Data::new(views)))
}

pub async fn update_admin(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAdminRequest>,
) -> Result<Json<Data<AdminView>>, ApiError> {
    require_super_admin(&state, &claims)?;

    if let Some(role) = &req.role {
        if !ADMIN_ROLES.contains(&role.as_str()) {
            return Err(ApiError::InvalidInput("Invalid admin role".into()));
        }
    }

    let row = state
        .db
        .update_admin(&id, req.role.as_deref(), req.is_active)?
        .ok_or_else(|| ApiError::NotFound("Admin not found".into()))?;
    Ok(Json(Data::new(admin_view(&row))))
}

/// Run the post reaper on demand instead of waiting for the janitor.
pub async fn cleanup_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<CleanupSummary>>, ApiError> {
    if !state.db.is_admin(&claims.sub)? {
        return Err(ApiError::Forbidden("Admin access required".into()));
    }

    let cutoff = ts::hours_ago(POST_TTL_HOURS);
    let db = state.clone();
    let deleted_ids = tokio::task::spawn_blocking(move || db.db.delete_expired_posts(&cutoff))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    info!(count = deleted_ids.len(), "expired posts removed on demand");
    Ok(Json(Data::new(CleanupSummary {
        deleted_count: deleted_ids.len(),
        deleted_ids,
    })))
}

/// One-shot repair job: rewrites string-typed `connected_poi` rows to
/// object form so reads stop synthesising fallback ids.
pub async fn fix_poi_strings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, ApiError> {
    if !state.db.is_admin(&claims.sub)? {
        return Err(ApiError::Forbidden("Admin access required".into()));
    }

    let db = state.clone();
    let repaired_ids = tokio::task::spawn_blocking(move || db.db.repair_poi_strings())
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    info!(count = repaired_ids.len(), "string-typed connected POIs rewritten");
    Ok(Json(json!({
        "repairedCount": repaired_ids.len(),
        "repairedIds": repaired_ids,
    })))
}
