use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::Value;
use tracing::{error, warn};

use tripyy_db::models::{PostRow, UserRow};
use tripyy_db::{ids, poiref};
use tripyy_types::api::{
    AddCommentRequest, Claims, CommentView, CreatePostRequest, LikeResponse, PostView,
};
use tripyy_types::domain::Comment;
use tripyy_types::notify::{Notification, PushEvent, preview};
use tripyy_types::ts;

use crate::error::ApiError;
use crate::state::AppState;

/// Posts expire 24 h after creation.
pub const POST_TTL_HOURS: i64 = 24;

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::InvalidInput("Post content is required".into()));
    }

    let connected_poi = match req.connected_poi {
        Some(input) => canonicalize_poi_input(&state, input)?,
        None => None,
    };
    let connected_poi_json = connected_poi
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| ApiError::Internal(e.into()))?;

    let post_id = ids::entity_id();
    let photos = req.photos.unwrap_or_default();
    state.db.insert_post(
        &post_id,
        &claims.sub,
        req.content.trim(),
        req.location.as_deref(),
        &serde_json::to_string(&photos).map_err(|e| ApiError::Internal(e.into()))?,
        connected_poi_json.as_deref(),
    )?;

    let author = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let post = state
        .db
        .get_post(&post_id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("post vanished after insert")))?;

    let mut authors = HashMap::new();
    authors.insert(author.id.clone(), author);
    Ok((StatusCode::CREATED, Json(enrich_post(post, &authors))))
}

pub async fn list_posts(
    State(state): State<AppState>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let db = state.clone();
    let (posts, users) = tokio::task::spawn_blocking(move || {
        let posts = db.db.list_posts(&ts::hours_ago(POST_TTL_HOURS))?;

        // Batch-fetch every author and commenter in one query
        let mut user_ids: Vec<String> = Vec::new();
        for post in &posts {
            if !user_ids.contains(&post.author_user_id) {
                user_ids.push(post.author_user_id.clone());
            }
            let comments: Vec<Comment> =
                serde_json::from_str(&post.comments).unwrap_or_default();
            for comment in comments {
                if !user_ids.contains(&comment.author_user_id) {
                    user_ids.push(comment.author_user_id);
                }
            }
        }
        let users = db.db.get_users_by_ids(&user_ids)?;
        Ok::<_, anyhow::Error>((posts, users))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })??;

    let user_map: HashMap<String, UserRow> =
        users.into_iter().map(|u| (u.id.clone(), u)).collect();

    let views = posts
        .into_iter()
        .map(|post| enrich_post(post, &user_map))
        .collect();
    Ok(Json(views))
}

pub async fn update_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<PostView>, ApiError> {
    let post = state
        .db
        .get_post(&post_id)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    if post.author_user_id != claims.sub {
        return Err(ApiError::Forbidden("Only the author may edit this post".into()));
    }

    let content = match patch.get("content").and_then(|v| v.as_str()) {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        Some(_) => return Err(ApiError::InvalidInput("Post content is required".into())),
        None => post.content.clone(),
    };
    let location = match patch.get("location") {
        Some(v) => v.as_str().map(String::from),
        None => post.location.clone(),
    };
    let photos_json = match patch.get("photos") {
        Some(v) if v.is_array() => serde_json::to_string(v).map_err(|e| ApiError::Internal(e.into()))?,
        Some(_) => return Err(ApiError::InvalidInput("photos must be an array".into())),
        None => post.photos.clone(),
    };

    // connectedPOI: omitted keeps the prior value; an explicit null
    // clears it, as on create; anything else is re-canonicalised,
    // preserving the pre-existing id when the patch gives none.
    let poi_patch = patch
        .get("connectedPOI")
        .or_else(|| patch.get("connected_poi"));
    let connected_poi_json = match poi_patch {
        None => post.connected_poi.clone(),
        Some(Value::Null) => None,
        Some(input) => {
            let mut input = input.clone();
            if let (Some(obj), Some(prior)) = (input.as_object_mut(), post.connected_poi.as_deref())
            {
                let has_id = obj
                    .get("id")
                    .and_then(|id| id.as_str())
                    .is_some_and(|id| !id.is_empty());
                if !has_id {
                    if let Some(prior_id) = poiref::heal_stored(prior)
                        .and_then(|p| p.get("id").and_then(|id| id.as_str().map(String::from)))
                    {
                        obj.insert("id".to_string(), Value::String(prior_id));
                    }
                }
            }
            canonicalize_poi_input(&state, input)?
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| ApiError::Internal(e.into()))?
        }
    };

    state.db.update_post(
        &post_id,
        &content,
        location.as_deref(),
        &photos_json,
        connected_poi_json.as_deref(),
    )?;

    let updated = state
        .db
        .get_post(&post_id)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    let mut user_ids = vec![updated.author_user_id.clone()];
    let comments: Vec<Comment> = serde_json::from_str(&updated.comments).unwrap_or_default();
    for comment in &comments {
        if !user_ids.contains(&comment.author_user_id) {
            user_ids.push(comment.author_user_id.clone());
        }
    }
    let user_map: HashMap<String, UserRow> = state
        .db
        .get_users_by_ids(&user_ids)?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    Ok(Json(enrich_post(updated, &user_map)))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
) -> Result<Json<LikeResponse>, ApiError> {
    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let nickname = actor.handle();

    let outcome = state
        .db
        .toggle_post_like(&post_id, &nickname, &claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    // Notify only on fresh likes of someone else's post.
    if outcome.liked && outcome.target_author_id != claims.sub {
        let event = PushEvent::PostLike {
            post_id: post_id.clone(),
            liker_nickname: nickname,
            content_preview: preview(&outcome.target_preview, 60),
        };
        spawn_push(state.clone(), outcome.target_author_id.clone(), event);
    }

    Ok(Json(LikeResponse {
        liked: outcome.liked,
        like_count: outcome.like_count,
    }))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<String>,
    Json(req): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Comment text is required".into()));
    }

    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;

    let comment = Comment {
        id: ids::comment_id(),
        text: req.text.trim().to_string(),
        author_user_id: actor.id.clone(),
        author_name: actor.display_name.clone(),
        author_nickname: actor.nickname(),
        author_photo: actor.profile_photo(),
        likes: vec![],
        liked_user_ids: vec![],
        like_count: 0,
        created_at: ts::now(),
    };

    let outcome = state
        .db
        .add_comment(&post_id, comment)?
        .ok_or_else(|| ApiError::NotFound("Post not found".into()))?;

    Ok((StatusCode::CREATED, Json(outcome.comment.into())))
}

pub async fn toggle_comment_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((post_id, comment_id)): Path<(String, String)>,
) -> Result<Json<LikeResponse>, ApiError> {
    let actor = state
        .db
        .get_user_by_id(&claims.sub)?
        .ok_or(ApiError::Unauthorized)?;
    let nickname = actor.handle();

    let outcome = state
        .db
        .toggle_comment_like(&post_id, &comment_id, &nickname, &claims.sub)?
        .ok_or_else(|| ApiError::NotFound("Comment not found".into()))?;

    if outcome.liked && outcome.target_author_id != claims.sub {
        let event = PushEvent::CommentLike {
            post_id,
            comment_id,
            liker_nickname: nickname,
            comment_preview: preview(&outcome.target_preview, 60),
        };
        spawn_push(state.clone(), outcome.target_author_id.clone(), event);
    }

    Ok(Json(LikeResponse {
        liked: outcome.liked,
        like_count: outcome.like_count,
    }))
}

/// Canonicalise the client-supplied `connectedPOI` into the stored
/// POIRef form, which always carries an id:
///   - object with id: kept as-is;
///   - object without id: synthetic `poi_<ts>_<rand>` id added;
///   - id/reference string: the persisted POI is embedded when found,
///     else a `{id, reference, type: "reference"}` stub is stored.
pub(crate) fn canonicalize_poi_input(
    state: &AppState,
    input: Value,
) -> Result<Option<Value>, ApiError> {
    match input {
        Value::Null => Ok(None),
        Value::Object(_) => {
            let mut value = input;
            poiref::ensure_id(&mut value, "poi");
            Ok(Some(value))
        }
        Value::String(reference) => {
            if let Some(poi) = state.db.get_poi(&reference)? {
                let value = serde_json::to_value(&poi).map_err(|e| ApiError::Internal(e.into()))?;
                Ok(Some(value))
            } else {
                warn!(reference, "connected POI reference did not resolve, storing stub");
                Ok(Some(serde_json::json!({
                    "id": ids::synthetic("poi_ref"),
                    "reference": reference,
                    "type": "reference",
                })))
            }
        }
        _ => Err(ApiError::InvalidInput(
            "connectedPOI must be an object or an id".into(),
        )),
    }
}

/// Fill author fields from the user directory and heal the stored
/// POIRef for the response. Healing never writes back; the repair job
/// does that.
fn enrich_post(post: PostRow, users: &HashMap<String, UserRow>) -> PostView {
    let author = users.get(&post.author_user_id);

    let comments: Vec<Comment> = serde_json::from_str(&post.comments).unwrap_or_default();
    let comments = comments
        .into_iter()
        .map(|mut c| {
            if let Some(u) = users.get(&c.author_user_id) {
                c.author_name = u.display_name.clone();
                c.author_nickname = u.nickname();
                c.author_photo = u.profile_photo();
            }
            CommentView::from(c)
        })
        .collect();

    let connected_poi = post
        .connected_poi
        .as_deref()
        .and_then(poiref::heal_stored);

    PostView {
        id: post.id,
        author_user_id: post.author_user_id,
        author_name: author.map(|u| u.display_name.clone()).unwrap_or_default(),
        author_nickname: author.map(|u| u.nickname()).unwrap_or_default(),
        author_photo: author.and_then(|u| u.profile_photo()),
        content: post.content,
        photos: serde_json::from_str(&post.photos).unwrap_or_default(),
        location: post.location,
        connected_poi,
        likes: serde_json::from_str(&post.likes).unwrap_or_default(),
        like_count: post.like_count,
        comments,
        comment_count: post.comment_count,
        created_at: post.created_at,
    }
}

/// Fire-and-forget push to a single recipient.
pub(crate) fn spawn_push(state: AppState, recipient_user_id: String, event: PushEvent) {
    tokio::spawn(async move {
        let token = match state.db.get_push_token(&recipient_user_id) {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(e) => {
                warn!("push token lookup failed: {:#}", e);
                return;
            }
        };
        let notification = Notification::from_event(&event);
        state.notifier.deliver(&[token], &notification).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use serde_json::json;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            email: format!("{sub}@test.local"),
            exp: 0,
        }
    }

    #[tokio::test]
    async fn update_with_explicit_null_clears_connected_poi() {
        let state = test_state();
        state.db.create_user("u1", "a@b.co", "h", "Alice").unwrap();
        state
            .db
            .insert_post(
                "p1",
                "u1",
                "sunset",
                None,
                "[]",
                Some(r#"{"id":"poi_1","name":"Pier"}"#),
            )
            .unwrap();

        let view = update_post(
            State(state.clone()),
            Extension(claims("u1")),
            Path("p1".to_string()),
            Json(json!({ "connectedPOI": null })),
        )
        .await
        .unwrap();
        assert!(view.0.connected_poi.is_none());
        assert!(
            state
                .db
                .get_post("p1")
                .unwrap()
                .unwrap()
                .connected_poi
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_without_poi_field_keeps_prior_connection() {
        let state = test_state();
        state.db.create_user("u1", "a@b.co", "h", "Alice").unwrap();
        state
            .db
            .insert_post(
                "p1",
                "u1",
                "sunset",
                None,
                "[]",
                Some(r#"{"id":"poi_1","name":"Pier"}"#),
            )
            .unwrap();

        let view = update_post(
            State(state.clone()),
            Extension(claims("u1")),
            Path("p1".to_string()),
            Json(json!({ "content": "sunrise" })),
        )
        .await
        .unwrap();
        assert_eq!(view.0.content, "sunrise");
        let poi = view.0.connected_poi.expect("connection kept");
        assert_eq!(poi["id"], "poi_1");
    }
}
