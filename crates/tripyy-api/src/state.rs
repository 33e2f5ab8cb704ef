use std::sync::Arc;

use tripyy_db::Database;

use crate::mailer::Mailer;
use crate::media::MediaGateway;
use crate::notifier::Notifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Accounts allowed to log in without email verification
    /// (`DEV_BYPASS_EMAILS`, lowercase).
    pub dev_bypass_emails: Vec<String>,
    pub mailer: Mailer,
    pub notifier: Notifier,
    pub media: MediaGateway,
}

impl AppStateInner {
    pub fn is_bypass_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.dev_bypass_emails.iter().any(|e| *e == email)
    }
}

/// In-memory state with unconfigured outbound gateways, for handler tests.
#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    Arc::new(AppStateInner {
        db: Database::open_in_memory().expect("in-memory db"),
        jwt_secret: "test-secret".into(),
        dev_bypass_emails: Vec::new(),
        mailer: Mailer::new(None, "noreply@test.local".into(), "Test".into(), None),
        notifier: Notifier::new(),
        media: MediaGateway::new(None, None, None),
    })
}
