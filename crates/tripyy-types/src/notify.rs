use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push events fanned out on engagement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// Someone liked a post
    PostLike {
        post_id: String,
        liker_nickname: String,
        content_preview: String,
    },

    /// Someone liked a comment
    CommentLike {
        post_id: String,
        comment_id: String,
        liker_nickname: String,
        comment_preview: String,
    },

    /// Someone liked a review
    ReviewLike {
        poi_id: String,
        review_id: String,
        liker_nickname: String,
        poi_name: String,
    },
}

impl PushEvent {
    /// Title and body shown in the push notification tray.
    pub fn title_body(&self) -> (String, String) {
        match self {
            Self::PostLike {
                liker_nickname,
                content_preview,
                ..
            } => (
                "New like".to_string(),
                format!("{liker_nickname} liked your post: {content_preview}"),
            ),
            Self::CommentLike {
                liker_nickname,
                comment_preview,
                ..
            } => (
                "New like".to_string(),
                format!("{liker_nickname} liked your comment: {comment_preview}"),
            ),
            Self::ReviewLike {
                liker_nickname,
                poi_name,
                ..
            } => (
                "New like".to_string(),
                format!("{liker_nickname} liked your review of {poi_name}"),
            ),
        }
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }

    pub fn from_event(event: &PushEvent) -> Self {
        let (title, body) = event.title_body();
        Self {
            title,
            body,
            data: serde_json::to_value(event).unwrap_or(Value::Null),
        }
    }
}

/// Truncate a content snippet for notification bodies.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = PushEvent::PostLike {
            post_id: "p1".into(),
            liker_nickname: "bob".into(),
            content_preview: "hello".into(),
        };
        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "post_like");
        assert_eq!(v["data"]["post_id"], "p1");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("short", 40), "short");
        let long = "a".repeat(50);
        assert_eq!(preview(&long, 40).chars().count(), 41);
    }
}
