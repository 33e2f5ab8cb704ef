//! Background maintenance loops. Each one ticks on its own interval and
//! logs failures without dying.

use std::time::Duration;

use tracing::{info, warn};

use tripyy_api::posts::POST_TTL_HOURS;
use tripyy_api::state::AppState;
use tripyy_types::ts;

/// Deletes posts past their 24 hour lifetime, once an hour.
pub async fn run_post_reaper(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));

    loop {
        interval.tick().await;

        let db = state.clone();
        let cutoff = ts::hours_ago(POST_TTL_HOURS);
        let result =
            tokio::task::spawn_blocking(move || db.db.delete_expired_posts(&cutoff)).await;
        match result {
            Ok(Ok(ids)) if !ids.is_empty() => {
                info!(count = ids.len(), "janitor reaped expired posts");
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("post reaper failed: {}", e),
            Err(e) => warn!("post reaper task panicked: {}", e),
        }
    }
}

/// Removes used and expired verification tokens. Runs on two schedules
/// (hourly and six-hourly); the job is idempotent so the overlap is
/// harmless. The six-hourly pass also purges week-old rows outright.
pub async fn run_token_cleaner(state: AppState, interval_secs: u64, purge_old: bool) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.db.cleanup_tokens() {
            Ok(deleted) if deleted > 0 => {
                info!(deleted, "janitor removed spent verification tokens");
            }
            Ok(_) => {}
            Err(e) => warn!("token cleanup failed: {}", e),
        }

        if purge_old {
            match state.db.purge_old_tokens() {
                Ok(purged) if purged > 0 => {
                    info!(purged, "janitor purged week-old verification tokens");
                }
                Ok(_) => {}
                Err(e) => warn!("token purge failed: {}", e),
            }
        }
    }
}
