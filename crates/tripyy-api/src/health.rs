use axum::{Json, extract::State};

use tripyy_types::api::{HealthDependencies, HealthResponse};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.clone();
    let database = tokio::task::spawn_blocking(move || db.db.ping())
        .await
        .unwrap_or(false);

    Json(HealthResponse {
        status: if database { "ok" } else { "degraded" }.to_string(),
        dependencies: HealthDependencies {
            database,
            mailer: state.mailer.is_configured(),
            media: state.media.is_configured(),
            // Expo needs no credentials; delivery is always possible
            push: true,
        },
    })
}
