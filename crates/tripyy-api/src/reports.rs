use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};

use tripyy_db::ids;
use tripyy_db::models::ReportRow;
use tripyy_types::api::{Claims, Data, ReportView, SubmitReportRequest, UpdateReportRequest};
use tripyy_types::domain::{REPORT_ISSUE_TYPES, REPORT_STATUSES, REPORT_TARGET_TYPES};

use crate::error::ApiError;
use crate::state::AppState;

fn report_view(row: &ReportRow) -> ReportView {
    ReportView {
        id: row.id.clone(),
        reporter_id: row.reporter_id.clone(),
        reporter_nickname: row.reporter_nickname.clone(),
        target_type: row.target_type.clone(),
        target_id: row.target_id.clone(),
        target_name: row.target_name.clone(),
        target_content: row.target_content.clone(),
        target_author: serde_json::from_str(&row.target_author).unwrap_or(Value::Null),
        issue_type: row.issue_type.clone(),
        description: row.description.clone(),
        status: row.status.clone(),
        admin_notes: row.admin_notes.clone(),
        reviewed_by: row.reviewed_by.clone(),
        created_at: row.created_at.clone(),
        updated_at: row.updated_at.clone(),
    }
}

struct ResolvedTarget {
    name: String,
    content: String,
    author: Value,
}

/// Fill in target context the client did not send by looking the target
/// up in the store. Missing targets are not an error: the report still
/// lands with whatever the reporter supplied.
fn resolve_target(state: &AppState, target_type: &str, target_id: &str) -> ResolvedTarget {
    let mut resolved = ResolvedTarget {
        name: String::new(),
        content: String::new(),
        author: Value::Null,
    };
    match target_type {
        "poi" => {
            if let Ok(Some(poi)) = state.db.get_poi(target_id) {
                resolved.name = poi.name;
                resolved.content = poi.description;
                resolved.author = json!({ "name": poi.author, "type": "user" });
            }
        }
        "post" => {
            if let Ok(Some(post)) = state.db.get_post(target_id) {
                resolved.content = post.content;
                if let Ok(Some(author)) = state.db.get_user_by_id(&post.author_user_id) {
                    resolved.name = format!("Post by {}", author.display_name);
                    resolved.author = json!({
                        "id": author.id,
                        "name": author.display_name,
                        "email": author.email,
                        "type": "user",
                    });
                }
            }
        }
        "group" => {
            if let Ok(Some(community)) = state.db.get_community(target_id) {
                resolved.name = community.name;
                resolved.content = community.description;
                resolved.author = json!({ "id": community.created_by, "type": "user" });
            }
        }
        // Comments live inside post documents; the client supplies context.
        _ => {}
    }
    resolved
}

pub async fn submit_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitReportRequest>,
) -> Result<(StatusCode, Json<Data<ReportView>>), ApiError> {
    if !REPORT_TARGET_TYPES.contains(&req.target_type.as_str()) {
        return Err(ApiError::InvalidInput("Invalid target type".into()));
    }
    if !REPORT_ISSUE_TYPES.contains(&req.issue_type.as_str()) {
        return Err(ApiError::InvalidInput("Invalid issue type".into()));
    }
    let description = req.description.trim();
    if !(10..=1000).contains(&description.chars().count()) {
        return Err(ApiError::InvalidInput(
            "Description must be between 10 and 1000 characters".into(),
        ));
    }
    if req.target_id.trim().is_empty() {
        return Err(ApiError::InvalidInput("Target id is required".into()));
    }

    let reporter = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;

    let resolved = resolve_target(&state, &req.target_type, &req.target_id);
    let target_name = req.target_name.unwrap_or(resolved.name);
    let target_content = req.target_content.unwrap_or(resolved.content);
    let target_author = req.target_author.unwrap_or(resolved.author);
    let target_author_json =
        serde_json::to_string(&target_author).map_err(|e| ApiError::Internal(e.into()))?;

    let row = state.db.insert_report(
        &ids::entity_id(),
        &reporter.id,
        &reporter.handle(),
        &req.target_type,
        &req.target_id,
        &target_name,
        &target_content,
        &target_author_json,
        &req.issue_type,
        description,
    )?;
    Ok((StatusCode::CREATED, Json(Data::new(report_view(&row)))))
}

async fn require_admin(state: &AppState, claims: &Claims) -> Result<(), ApiError> {
    if state.db.is_admin(&claims.sub)? {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Admin access required".into()))
    }
}

pub async fn list_reports(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<Vec<ReportView>>>, ApiError> {
    require_admin(&state, &claims).await?;

    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_reports())
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    Ok(Json(Data::new(rows.iter().map(report_view).collect())))
}

pub async fn get_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<Data<ReportView>>, ApiError> {
    require_admin(&state, &claims).await?;

    let row = state
        .db
        .get_report(&id)?
        .ok_or_else(|| ApiError::NotFound("Report not found".into()))?;
    Ok(Json(Data::new(report_view(&row))))
}

pub async fn update_report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<UpdateReportRequest>,
) -> Result<Json<Data<ReportView>>, ApiError> {
    require_admin(&state, &claims).await?;

    if let Some(status) = &req.status {
        if !REPORT_STATUSES.contains(&status.as_str()) {
            return Err(ApiError::InvalidInput("Invalid report status".into()));
        }
    }

    let row = state
        .db
        .update_report(
            &id,
            req.status.as_deref(),
            req.admin_notes.as_deref(),
            &claims.sub,
        )?
        .ok_or_else(|| ApiError::NotFound("Report not found".into()))?;
    Ok(Json(Data::new(report_view(&row))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[test]
    fn post_target_resolves_name_from_author() {
        let state = test_state();
        state.db.create_user("u1", "bob@b.co", "h", "Bob").unwrap();
        state.db.insert_post("p1", "u1", "hidden beach", None, "[]", None).unwrap();

        let resolved = resolve_target(&state, "post", "p1");
        assert_eq!(resolved.name, "Post by Bob");
        assert_eq!(resolved.content, "hidden beach");
        assert_eq!(resolved.author["name"], "Bob");
    }

    #[test]
    fn missing_target_resolves_empty() {
        let state = test_state();
        let resolved = resolve_target(&state, "post", "nope");
        assert!(resolved.name.is_empty());
        assert!(resolved.content.is_empty());
        assert!(resolved.author.is_null());
    }
}
