use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use tracing::warn;

use tripyy_db::ids;
use tripyy_db::models::UserRow;
use tripyy_types::api::{Claims, Data, LikeResponse};
use tripyy_types::domain::{Poi, PoiLocation, Review};
use tripyy_types::notify::PushEvent;
use tripyy_types::ts;

use crate::error::ApiError;
use crate::posts::spawn_push;
use crate::state::AppState;

/// Accept any of the coordinate spellings older clients send:
/// `{coordinates:{lat,lng}}`, `{location:{lat,lng}}`, or
/// `{location:{latitude,longitude}}`.
pub(crate) fn parse_coords(body: &Value) -> Option<(f64, f64)> {
    for key in ["coordinates", "location"] {
        let Some(obj) = body.get(key) else { continue };
        let lat = obj
            .get("lat")
            .or_else(|| obj.get("latitude"))
            .and_then(|v| v.as_f64());
        let lng = obj
            .get("lng")
            .or_else(|| obj.get("longitude"))
            .and_then(|v| v.as_f64());
        if let (Some(lat), Some(lng)) = (lat, lng) {
            return Some((lat, lng));
        }
    }
    None
}

/// Response shape keeps `coordinates` at the top level alongside the
/// stored document.
fn poi_response(poi: &Poi) -> Result<Value, ApiError> {
    let mut value = serde_json::to_value(poi).map_err(|e| ApiError::Internal(e.into()))?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "coordinates".to_string(),
            json!({ "lat": poi.location.lat, "lng": poi.location.lng }),
        );
    }
    Ok(value)
}

fn is_owner(poi_owner: Option<&str>, poi_author: &str, actor: &UserRow) -> bool {
    if poi_owner.is_some_and(|owner| owner == actor.id) {
        return true;
    }
    !poi_author.is_empty()
        && (poi_author == actor.nickname() || poi_author == actor.display_name)
}

pub async fn list_pois(State(state): State<AppState>) -> Result<Json<Data<Vec<Value>>>, ApiError> {
    let db = state.clone();
    let pois = tokio::task::spawn_blocking(move || db.db.list_pois())
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    let views = pois
        .iter()
        .map(poi_response)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(Data::new(views)))
}

pub async fn create_poi(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Data<Value>>), ApiError> {
    let name = body
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("POI name is required".into()))?;
    let (lat, lng) = parse_coords(&body)
        .ok_or_else(|| ApiError::InvalidInput("POI coordinates are required".into()))?;

    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;

    let poi = Poi {
        id: ids::synthetic("poi"),
        name: name.to_string(),
        description: body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        location: PoiLocation::new(lat, lng),
        photos: body
            .get("photos")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default(),
        icon: body.get("icon").and_then(|v| v.as_str()).map(String::from),
        poi_type: body
            .get("type")
            .and_then(|v| v.as_str())
            .filter(|t| ["public", "private"].contains(t))
            .unwrap_or("public")
            .to_string(),
        author: actor.handle(),
        owner_user_id: Some(actor.id.clone()),
        reviews: vec![],
        average_rating: 0.0,
        review_count: 0,
        likes: vec![],
        liked_user_ids: vec![],
        like_count: 0,
        created_at: ts::now(),
    };
    state.db.insert_poi(&poi)?;

    Ok((StatusCode::CREATED, Json(Data::new(poi_response(&poi)?))))
}

pub async fn update_poi(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<Json<Data<Value>>, ApiError> {
    let (lat, lng) = parse_coords(&body)
        .ok_or_else(|| ApiError::InvalidInput("POI coordinates are required".into()))?;

    let row = state
        .db
        .find_poi_by_coords(lat, lng)?
        .ok_or_else(|| ApiError::NotFound("POI not found".into()))?;
    let mut poi: Poi = serde_json::from_str(&row.doc)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt POI doc {}: {e}", row.id)))?;

    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    if !is_owner(poi.owner_user_id.as_deref(), &poi.author, &actor) {
        return Err(ApiError::Forbidden("Only the owner may edit this POI".into()));
    }

    if let Some(name) = body.get("name").and_then(|v| v.as_str()) {
        if name.trim().is_empty() {
            return Err(ApiError::InvalidInput("POI name is required".into()));
        }
        poi.name = name.trim().to_string();
    }
    if let Some(description) = body.get("description").and_then(|v| v.as_str()) {
        poi.description = description.to_string();
    }
    if let Some(icon) = body.get("icon").and_then(|v| v.as_str()) {
        poi.icon = Some(icon.to_string());
    }
    if let Some(poi_type) = body.get("type").and_then(|v| v.as_str()) {
        if !["public", "private"].contains(&poi_type) {
            return Err(ApiError::InvalidInput("Invalid POI type".into()));
        }
        poi.poi_type = poi_type.to_string();
    }
    if let Some(photos) = body.get("photos").and_then(|v| v.as_array()) {
        let new_photos: Vec<String> = photos
            .iter()
            .filter_map(|p| p.as_str().map(String::from))
            .collect();
        // Best-effort deletion of replaced blobs
        for old in poi.photos.iter().filter(|p| !new_photos.contains(p)) {
            match crate::media::extract_public_id(old) {
                Some(public_id) => {
                    let media_state = state.clone();
                    tokio::spawn(async move {
                        media_state.media.destroy(&public_id).await;
                    });
                }
                None => warn!(url = old, "unrecognised photo URL, skipping blob deletion"),
            }
        }
        poi.photos = new_photos;
    }

    state.db.replace_poi(&poi)?;
    Ok(Json(Data::new(poi_response(&poi)?)))
}

pub async fn delete_poi(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<Json<Data<Value>>, ApiError> {
    let (lat, lng) = parse_coords(&body)
        .ok_or_else(|| ApiError::InvalidInput("POI coordinates are required".into()))?;

    let row = state
        .db
        .find_poi_by_coords(lat, lng)?
        .ok_or_else(|| ApiError::NotFound("POI not found".into()))?;
    let poi: Poi = serde_json::from_str(&row.doc)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("corrupt POI doc {}: {e}", row.id)))?;

    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    if !is_owner(poi.owner_user_id.as_deref(), &poi.author, &actor) {
        return Err(ApiError::Forbidden("Only the owner may delete this POI".into()));
    }

    state.db.delete_poi(&poi.id)?;

    for photo in &poi.photos {
        match crate::media::extract_public_id(photo) {
            Some(public_id) => {
                let media_state = state.clone();
                tokio::spawn(async move {
                    media_state.media.destroy(&public_id).await;
                });
            }
            None => warn!(url = photo, "unrecognised photo URL, skipping blob deletion"),
        }
    }

    Ok(Json(Data::new(json!({ "deleted": poi.id }))))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(poi_id): Path<String>,
) -> Result<Json<LikeResponse>, ApiError> {
    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let nickname = actor.handle();

    let outcome = state
        .db
        .toggle_poi_like(&poi_id, &nickname, &claims.sub)?
        .ok_or_else(|| ApiError::NotFound("POI not found".into()))?;

    Ok(Json(LikeResponse {
        liked: outcome.liked,
        like_count: outcome.like_count,
    }))
}

pub async fn add_review(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Data<Value>>), ApiError> {
    let (lat, lng) = parse_coords(&body)
        .ok_or_else(|| ApiError::InvalidInput("POI coordinates are required".into()))?;
    let rating = body
        .get("rating")
        .and_then(|v| v.as_i64())
        .filter(|r| (1..=5).contains(r))
        .ok_or_else(|| ApiError::InvalidInput("Rating must be between 1 and 5".into()))?;

    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;

    let review = Review {
        id: ids::comment_id(),
        rating,
        text: body
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        author: actor.handle(),
        author_photo: actor.profile_photo(),
        photo: body.get("photo").and_then(|v| v.as_str()).map(String::from),
        likes: vec![],
        liked_user_ids: vec![],
        like_count: 0,
        created_at: ts::now(),
    };

    let poi = state
        .db
        .add_review(lat, lng, review)?
        .ok_or_else(|| ApiError::NotFound("POI not found".into()))?;

    Ok((StatusCode::CREATED, Json(Data::new(poi_response(&poi)?))))
}

pub async fn toggle_review_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(review_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<LikeResponse>, ApiError> {
    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let nickname = actor.handle();

    // The review route addresses the POI by id or by coordinates.
    let poi_id = match body.get("poiId").and_then(|v| v.as_str()) {
        Some(id) => id.to_string(),
        None => {
            let (lat, lng) = parse_coords(&body).ok_or_else(|| {
                ApiError::InvalidInput("poiId or coordinates are required".into())
            })?;
            state
                .db
                .find_poi_by_coords(lat, lng)?
                .ok_or_else(|| ApiError::NotFound("POI not found".into()))?
                .id
        }
    };

    let outcome = state
        .db
        .toggle_review_like(&poi_id, &review_id, &nickname, &claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Review not found".into()))?;

    // Review authors are keyed by nickname; resolve to a user for the push.
    if outcome.liked && outcome.author != nickname {
        if let Ok(Some(author)) = state.db.get_user_by_nickname(&outcome.author) {
            let event = PushEvent::ReviewLike {
                poi_id,
                review_id,
                liker_nickname: nickname,
                poi_name: outcome.poi_name.clone(),
            };
            spawn_push(state.clone(), author.id, event);
        }
    }

    Ok(Json(LikeResponse {
        liked: outcome.liked,
        like_count: outcome.like_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn all_three_coordinate_spellings_parse() {
        assert_eq!(
            parse_coords(&json!({"coordinates": {"lat": 1.5, "lng": 2.5}})),
            Some((1.5, 2.5))
        );
        assert_eq!(
            parse_coords(&json!({"location": {"lat": 1.5, "lng": 2.5}})),
            Some((1.5, 2.5))
        );
        assert_eq!(
            parse_coords(&json!({"location": {"latitude": 1.5, "longitude": 2.5}})),
            Some((1.5, 2.5))
        );
        assert_eq!(parse_coords(&json!({"location": {"lat": 1.5}})), None);
        assert_eq!(parse_coords(&json!({})), None);
    }

    #[test]
    fn response_exposes_top_level_coordinates() {
        let poi = Poi {
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
            created_at: ts::now(),
        };
        let value = poi_response(&poi).unwrap();
        assert_eq!(value["coordinates"]["lat"], 1.0);
        assert_eq!(value["coordinates"]["lng"], 2.0);
        // Both location spellings persist for older clients
        assert_eq!(value["location"]["latitude"], 1.0);
        assert_eq!(value["location"]["lng"], 2.0);
    }
}
