//! Push delivery through the Expo push API. Failures are logged and
//! swallowed — a broken push must never fail the operation that
//! triggered it.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use tripyy_types::notify::Notification;

const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo caps batch sends at 100 messages.
const CHUNK_SIZE: usize = 100;

pub struct Notifier {
    client: reqwest::Client,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Expo push tokens look like `ExponentPushToken[xxxxxxxx]`.
    pub fn is_valid_token(token: &str) -> bool {
        let inner = token
            .strip_suffix(']')
            .and_then(|t| {
                t.strip_prefix("ExponentPushToken[")
                    .or_else(|| t.strip_prefix("ExpoPushToken["))
            });
        inner.is_some_and(|i| !i.is_empty())
    }

    /// Deliver a notification to a batch of tokens, ≤100 per request.
    /// Per-chunk failures are logged, never propagated.
    pub async fn deliver(&self, tokens: &[String], notification: &Notification) {
        if tokens.is_empty() {
            debug!("no push tokens to deliver to");
            return;
        }

        for chunk in tokens.chunks(CHUNK_SIZE) {
            let messages: Vec<_> = chunk
                .iter()
                .map(|to| {
                    json!({
                        "to": to,
                        "sound": "default",
                        "title": notification.title,
                        "body": notification.body,
                        "data": notification.data,
                    })
                })
                .collect();

            match self.client.post(EXPO_PUSH_URL).json(&messages).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(count = chunk.len(), "push chunk delivered");
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "expo push rejected chunk");
                }
                Err(e) => {
                    warn!("expo push request failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_shape_validation() {
        assert!(Notifier::is_valid_token("ExponentPushToken[abc123]"));
        assert!(Notifier::is_valid_token("ExpoPushToken[abc123]"));
        assert!(!Notifier::is_valid_token("ExponentPushToken[]"));
        assert!(!Notifier::is_valid_token("ExponentPushToken[abc"));
        assert!(!Notifier::is_valid_token("abc123"));
        assert!(!Notifier::is_valid_token(""));
    }
}
