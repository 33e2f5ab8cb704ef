use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Map, Value, json};

use tripyy_db::ids;
use tripyy_db::models::TripRow;
use tripyy_types::api::{Claims, Data};
use tripyy_types::domain::TRIP_SHARE_TYPES;

use crate::error::ApiError;
use crate::state::AppState;

/// Trips are stored as one row per trip; the per-user list older clients
/// knew as an embedded collection is computed from the table on read.
fn trip_view(row: &TripRow) -> Value {
    let mut doc: Map<String, Value> = serde_json::from_str(&row.doc).unwrap_or_default();
    doc.insert("id".into(), json!(row.id));
    doc.insert("shareType".into(), json!(row.share_type));
    doc.insert("createdAt".into(), json!(row.created_at));
    doc.insert("updatedAt".into(), json!(row.updated_at));
    Value::Object(doc)
}

/// Pull `shareType` out of an ingress body, leaving the rest as the doc.
/// `numberOfTravelers` and every other field stay at the trip root.
fn split_share_type(mut body: Map<String, Value>) -> Result<(String, Map<String, Value>), ApiError> {
    let share_type = match body.remove("shareType").or_else(|| body.remove("share_type")) {
        Some(Value::String(s)) if TRIP_SHARE_TYPES.contains(&s.as_str()) => s,
        Some(Value::Null) | None => "private".to_string(),
        Some(_) => return Err(ApiError::InvalidInput("Invalid shareType".into())),
    };
    body.remove("id");
    body.remove("createdAt");
    body.remove("updatedAt");
    Ok((share_type, body))
}

fn as_object(body: Value) -> Result<Map<String, Value>, ApiError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::InvalidInput("Trip must be an object".into())),
    }
}

/// Legacy rows carried numeric owner ids; compare as trimmed strings.
fn same_owner(stored: &str, caller: &str) -> bool {
    stored.trim() == caller.trim()
}

pub async fn create_user_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Data<Value>>), ApiError> {
    let (share_type, doc) = split_share_type(as_object(body)?)?;
    let doc_json = serde_json::to_string(&doc).map_err(|e| ApiError::Internal(e.into()))?;

    let row = state
        .db
        .insert_trip(&ids::synthetic("trip"), &claims.sub, &share_type, &doc_json)?;
    Ok((StatusCode::CREATED, Json(Data::new(trip_view(&row)))))
}

pub async fn list_user_trips(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Data<Vec<Value>>>, ApiError> {
    let db = state.clone();
    let rows = tokio::task::spawn_blocking(move || db.db.list_trips_by_owner(&claims.sub))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    Ok(Json(Data::new(rows.iter().map(trip_view).collect())))
}

pub async fn update_user_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Data<Value>>, ApiError> {
    let existing = state
        .db
        .get_trip(&trip_id)?
        .ok_or_else(|| ApiError::NotFound("Trip not found".into()))?;
    if !same_owner(&existing.owner_id, &claims.sub) {
        return Err(ApiError::Forbidden("Only the owner may edit this trip".into()));
    }

    let patch = as_object(body)?;
    let has_share_type = patch.contains_key("shareType") || patch.contains_key("share_type");
    let (share_type, patch) = split_share_type(patch)?;
    let share_type = if has_share_type {
        share_type
    } else {
        existing.share_type.clone()
    };

    // Shallow merge over the stored doc so a partial patch keeps the rest
    let mut doc: Map<String, Value> = serde_json::from_str(&existing.doc).unwrap_or_default();
    for (key, value) in patch {
        doc.insert(key, value);
    }
    let doc_json = serde_json::to_string(&doc).map_err(|e| ApiError::Internal(e.into()))?;

    let row = state
        .db
        .update_trip(&trip_id, &share_type, &doc_json)?
        .ok_or_else(|| ApiError::NotFound("Trip not found".into()))?;
    Ok(Json(Data::new(trip_view(&row))))
}

pub async fn delete_user_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<String>,
) -> Result<Json<Data<Value>>, ApiError> {
    let existing = state
        .db
        .get_trip(&trip_id)?
        .ok_or_else(|| ApiError::NotFound("Trip not found".into()))?;
    if !same_owner(&existing.owner_id, &claims.sub) {
        return Err(ApiError::Forbidden(
            "Only the owner may delete this trip".into(),
        ));
    }
    state.db.delete_trip(&trip_id)?;
    Ok(Json(Data::new(json!({ "deleted": trip_id }))))
}

// Older clients hit /api/trips directly; same table, same semantics.

pub async fn create_trip(
    state: State<AppState>,
    claims: Extension<Claims>,
    body: Json<Value>,
) -> Result<(StatusCode, Json<Data<Value>>), ApiError> {
    create_user_trip(state, claims, body).await
}

pub async fn list_trips(
    state: State<AppState>,
    claims: Extension<Claims>,
) -> Result<Json<Data<Vec<Value>>>, ApiError> {
    list_user_trips(state, claims).await
}

pub async fn get_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<String>,
) -> Result<Json<Data<Value>>, ApiError> {
    let row = state
        .db
        .get_trip(&trip_id)?
        .ok_or_else(|| ApiError::NotFound("Trip not found".into()))?;
    if row.share_type == "private" && !same_owner(&row.owner_id, &claims.sub) {
        return Err(ApiError::Forbidden("This trip is private".into()));
    }
    Ok(Json(Data::new(trip_view(&row))))
}

pub async fn update_trip(
    state: State<AppState>,
    claims: Extension<Claims>,
    trip_id: Path<String>,
    body: Json<Value>,
) -> Result<Json<Data<Value>>, ApiError> {
    update_user_trip(state, claims, trip_id, body).await
}

pub async fn delete_trip(
    state: State<AppState>,
    claims: Extension<Claims>,
    trip_id: Path<String>,
) -> Result<Json<Data<Value>>, ApiError> {
    delete_user_trip(state, claims, trip_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn share_type_is_split_from_the_doc() {
        let body = as_object(json!({
            "name": "Rome",
            "shareType": "friends",
            "numberOfTravelers": 3,
        }))
        .unwrap();
        let (share_type, doc) = split_share_type(body).unwrap();
        assert_eq!(share_type, "friends");
        assert!(!doc.contains_key("shareType"));
        assert_eq!(doc["numberOfTravelers"], 3);
    }

    #[test]
    fn missing_share_type_defaults_to_private() {
        let (share_type, _) = split_share_type(as_object(json!({"name": "Oslo"})).unwrap()).unwrap();
        assert_eq!(share_type, "private");
    }

    #[test]
    fn unknown_share_type_is_rejected() {
        let body = as_object(json!({"shareType": "everyone"})).unwrap();
        assert!(split_share_type(body).is_err());
    }

    #[test]
    fn legacy_owner_ids_compare_after_trimming() {
        assert!(same_owner(" 42 ", "42"));
        assert!(!same_owner("42", "43"));
    }
}
