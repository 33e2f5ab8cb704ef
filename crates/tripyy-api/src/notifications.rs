use axum::{Extension, Json, extract::State};

use tripyy_types::api::{
    Claims, MessageResponse, RegisterTokenRequest, SendMultipleRequest, SendNotificationRequest,
};
use tripyy_types::notify::Notification;

use crate::error::ApiError;
use crate::notifier::Notifier;
use crate::state::AppState;

pub async fn register_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterTokenRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !Notifier::is_valid_token(&req.token) {
        return Err(ApiError::InvalidInput("Invalid Expo push token".into()));
    }
    state.db.set_push_token(&claims.sub, &req.token)?;
    Ok(Json(MessageResponse {
        message: "Push token registered".into(),
        dev_code: None,
    }))
}

pub async fn send(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(token) = state.db.get_push_token(&req.user_id)? else {
        return Err(ApiError::NotFound("User has no push token".into()));
    };

    let notification = Notification::new(req.title, req.body, req.data.unwrap_or_default());
    state.notifier.deliver(&[token], &notification).await;
    Ok(Json(MessageResponse {
        message: "Notification sent".into(),
        dev_code: None,
    }))
}

pub async fn send_multiple(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<SendMultipleRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.user_ids.is_empty() {
        return Err(ApiError::InvalidInput("userIds must not be empty".into()));
    }

    let db = state.clone();
    let user_ids = req.user_ids.clone();
    let tokens = tokio::task::spawn_blocking(move || db.db.get_push_tokens(&user_ids))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    let notification = Notification::new(req.title, req.body, req.data.unwrap_or_default());
    state.notifier.deliver(&tokens, &notification).await;
    Ok(Json(MessageResponse {
        message: format!("Notification sent to {} devices", tokens.len()),
        dev_code: None,
    }))
}
