use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tracing::warn;

use tripyy_db::ids;
use tripyy_db::models::UserRow;
use tripyy_types::api::{
    Claims, ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse, PublicUser,
    RegisterRequest, RegisterResponse, ResetPasswordRequest, SendVerificationRequest,
    VerifyEmailRequest,
};
use tripyy_types::domain::TokenKind;

use crate::error::ApiError;
use crate::mailer::SendOutcome;
use crate::state::AppState;

const SESSION_DAYS: i64 = 7;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::InvalidInput("Invalid email address".into()));
    }
    if req.password.len() < 6 {
        return Err(ApiError::InvalidInput(
            "Password must be at least 6 characters".into(),
        ));
    }
    let name = req.name.trim();
    if name.len() < 2 {
        return Err(ApiError::InvalidInput(
            "Name must be at least 2 characters".into(),
        ));
    }

    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = ids::entity_id();
    state.db.create_user(&user_id, &email, &password_hash, name)?;

    let code = state
        .db
        .create_verification_token(&email, TokenKind::EmailVerification)?
        .code;

    let dev_code = match state.mailer.send_verification(&email, &code, name).await {
        Ok(SendOutcome::DevMode) => Some(code),
        Ok(SendOutcome::Sent) => None,
        Err(e) => {
            // Registration still succeeds; the client can re-request a code.
            warn!(email, "verification email failed: {:#}", e);
            None
        }
    };

    let user = state
        .db
        .get_user_by_id(&user_id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user vanished after insert")))?;
    let token = create_token(&state.jwt_secret, &user_id, &email)?;

    Ok(Json(RegisterResponse {
        token,
        user: to_public(&user),
        needs_verification: true,
        dev_code,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or(ApiError::InvalidCredentials)?;

    verify_password(&req.password, &user.password_hash)?;

    if !user.email_verified && !state.is_bypass_email(&email) {
        return Err(ApiError::NeedsVerification);
    }

    state.db.touch_last_login(&user.id)?;
    let token = create_token(&state.jwt_secret, &user.id, &user.email)?;

    Ok(Json(LoginResponse {
        token,
        user: to_public(&user),
    }))
}

pub async fn send_verification(
    State(state): State<AppState>,
    Json(req): Json<SendVerificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or_else(|| ApiError::NotFound("No account with that email".into()))?;

    if user.email_verified {
        return Err(ApiError::Conflict("Email is already verified".into()));
    }

    let code = state
        .db
        .create_verification_token(&email, TokenKind::EmailVerification)?
        .code;

    let outcome = state
        .mailer
        .send_verification(&email, &code, &user.display_name)
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(MessageResponse {
        message: "Verification email sent".into(),
        dev_code: (outcome == SendOutcome::DevMode).then_some(code),
    }))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let consumed = state
        .db
        .consume_token(&email, req.token.trim(), TokenKind::EmailVerification)?;
    if !consumed {
        return Err(ApiError::InvalidInput(
            "Invalid or expired verification code".into(),
        ));
    }

    if !state.db.mark_email_verified(&email)? {
        return Err(ApiError::NotFound("No account with that email".into()));
    }

    // Welcome mail is fire-and-forget: its failure must not fail
    // verification.
    let name = state
        .db
        .get_user_by_email(&email)?
        .map(|u| u.display_name)
        .unwrap_or_default();
    let mail_state = state.clone();
    let mail_email = email.clone();
    tokio::spawn(async move {
        if let Err(e) = mail_state.mailer.send_welcome(&mail_email, &name).await {
            warn!(email = mail_email, "welcome email failed: {:#}", e);
        }
    });

    Ok(Json(MessageResponse {
        message: "Email verified".into(),
        dev_code: None,
    }))
}

/// Always answers success so the endpoint cannot be used to enumerate
/// registered addresses.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();

    if let Some(user) = state.db.get_user_by_email(&email)? {
        let code = state
            .db
            .create_verification_token(&email, TokenKind::PasswordReset)?
            .code;
        if let Err(e) = state
            .mailer
            .send_password_reset(&email, &code, &user.display_name)
            .await
        {
            warn!(email, "password reset email failed: {:#}", e);
        }
    }

    Ok(Json(MessageResponse {
        message: "If that email is registered, a reset code has been sent".into(),
        dev_code: None,
    }))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.new_password.len() < 6 {
        return Err(ApiError::InvalidInput(
            "Password must be at least 6 characters".into(),
        ));
    }

    let email = req.email.trim().to_lowercase();
    let consumed = state
        .db
        .consume_token(&email, req.code.trim(), TokenKind::PasswordReset)?;
    if !consumed {
        return Err(ApiError::InvalidInput("Invalid or expired reset code".into()));
    }

    let password_hash = hash_password(&req.new_password)?;
    if !state.db.set_password_hash(&email, &password_hash)? {
        return Err(ApiError::NotFound("No account with that email".into()));
    }

    Ok(Json(MessageResponse {
        message: "Password updated".into(),
        dev_code: None,
    }))
}

pub fn create_token(secret: &str, user_id: &str, email: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<(), ApiError> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| ApiError::Internal(anyhow::anyhow!("bad hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

/// The loose shape clients expect: anything@anything.anything with no
/// whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.contains(char::is_whitespace) || local.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && !tld.is_empty()
        && !domain.contains('@')
        && !domain.contains(char::is_whitespace)
}

pub(crate) fn to_public(user: &UserRow) -> PublicUser {
    PublicUser {
        id: user.id.clone(),
        email: user.email.clone(),
        name: user.display_name.clone(),
        email_verified: user.email_verified,
        email_verified_at: user.email_verified_at.clone(),
        traveler_profile: serde_json::from_str(&user.traveler_profile)
            .unwrap_or(Value::Object(Default::default())),
        preferences: serde_json::from_str(&user.preferences)
            .unwrap_or(Value::Object(Default::default())),
        likes_received: user.likes_received,
        friends: serde_json::from_str(&user.friends).unwrap_or_default(),
        created_at: user.created_at.clone(),
        last_login: user.last_login.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_matches_expected_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.com"));

        assert!(!is_valid_email("ab.co"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@bco"));
        assert!(!is_valid_email("a@b."));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a b@c.co"));
        assert!(!is_valid_email("a@b c.co"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("pass12").unwrap();
        assert!(verify_password("pass12", &hash).is_ok());
        assert!(verify_password("wrong!", &hash).is_err());
    }

    #[test]
    fn session_token_roundtrips_through_middleware_decoding() {
        use jsonwebtoken::{DecodingKey, Validation, decode};

        let token = create_token("test-secret", "u1", "a@b.co").unwrap();
        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "u1");
        assert_eq!(data.claims.email, "a@b.co");
    }
}
