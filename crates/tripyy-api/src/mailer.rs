//! Transactional email via SendGrid, with a dev-mode fallback that logs
//! the payload instead of sending when no API key is configured.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// No provider configured; the payload was logged instead. Callers
    /// may surface the code to the client for e2e flows.
    DevMode,
}

pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from_email: String,
    from_name: String,
    frontend_url: Option<String>,
}

impl Mailer {
    pub fn new(
        api_key: Option<String>,
        from_email: String,
        from_name: String,
        frontend_url: Option<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            from_email,
            from_name,
            frontend_url,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn send_verification(&self, email: &str, code: &str, name: &str) -> Result<SendOutcome> {
        let link = self.code_link("verify-email", email, code);
        let text = format!(
            "Hi {name},\n\nYour Tripyy verification code is {code}. It expires in 24 hours.{}",
            link.as_deref().map(|l| format!("\n{l}")).unwrap_or_default()
        );
        let html = code_block_html(
            &format!("Welcome to Tripyy, {name}!"),
            "Enter this code to verify your email address. It expires in 24 hours.",
            code,
            link.as_deref(),
        );
        self.send(email, "Verify your Tripyy email", &text, &html).await
    }

    pub async fn send_welcome(&self, email: &str, name: &str) -> Result<SendOutcome> {
        let text = format!(
            "Hi {name},\n\nYour email is verified — welcome aboard. Time to plan your first trip!"
        );
        let html = format!(
            "<div style=\"font-family:sans-serif\"><h2>Welcome aboard, {name}!</h2>\
             <p>Your email is verified. Time to plan your first trip.</p></div>"
        );
        self.send(email, "Welcome to Tripyy", &text, &html).await
    }

    pub async fn send_password_reset(&self, email: &str, code: &str, name: &str) -> Result<SendOutcome> {
        let link = self.code_link("reset-password", email, code);
        let text = format!(
            "Hi {name},\n\nYour Tripyy password reset code is {code}. It expires in 1 hour.\n\
             If you didn't request this, you can ignore this email.{}",
            link.as_deref().map(|l| format!("\n{l}")).unwrap_or_default()
        );
        let html = code_block_html(
            "Reset your password",
            "Enter this code to reset your Tripyy password. It expires in 1 hour.",
            code,
            link.as_deref(),
        );
        self.send(email, "Reset your Tripyy password", &text, &html).await
    }

    fn code_link(&self, path: &str, email: &str, code: &str) -> Option<String> {
        self.frontend_url
            .as_ref()
            .map(|base| format!("{}/{}?email={}&code={}", base.trim_end_matches('/'), path, email, code))
    }

    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> Result<SendOutcome> {
        let Some(api_key) = &self.api_key else {
            info!(to, subject, body = text, "mailer in dev mode, logging instead of sending");
            return Ok(SendOutcome::DevMode);
        };

        let body = json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_email, "name": self.from_name },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": html },
            ],
        });

        let resp = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("sendgrid request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            warn!(%status, detail, "sendgrid rejected mail");
            anyhow::bail!("sendgrid returned {status}");
        }

        Ok(SendOutcome::Sent)
    }
}

fn code_block_html(heading: &str, lead: &str, code: &str, link: Option<&str>) -> String {
    let link_html = link
        .map(|l| format!("<p><a href=\"{l}\">Or click here</a></p>"))
        .unwrap_or_default();
    format!(
        "<div style=\"font-family:sans-serif;max-width:480px\">\
         <h2>{heading}</h2><p>{lead}</p>\
         <div style=\"font-size:32px;letter-spacing:8px;font-weight:bold;\
         background:#f4f4f4;padding:16px;text-align:center\">{code}</div>\
         {link_html}</div>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_mailer() -> Mailer {
        Mailer::new(None, "noreply@tripyy.com".into(), "Tripyy".into(), None)
    }

    #[tokio::test]
    async fn unconfigured_mailer_reports_dev_mode() {
        let mailer = dev_mailer();
        assert!(!mailer.is_configured());
        let outcome = mailer
            .send_verification("a@b.co", "123456", "Alice")
            .await
            .unwrap();
        assert_eq!(outcome, SendOutcome::DevMode);
    }

    #[test]
    fn link_includes_email_and_code() {
        let mailer = Mailer::new(
            None,
            "noreply@tripyy.com".into(),
            "Tripyy".into(),
            Some("https://app.tripyy.com/".into()),
        );
        let link = mailer.code_link("verify-email", "a@b.co", "123456").unwrap();
        assert_eq!(
            link,
            "https://app.tripyy.com/verify-email?email=a@b.co&code=123456"
        );
    }

    #[test]
    fn empty_api_key_counts_as_unconfigured() {
        let mailer = Mailer::new(
            Some(String::new()),
            "noreply@tripyy.com".into(),
            "Tripyy".into(),
            None,
        );
        assert!(!mailer.is_configured());
    }
}
