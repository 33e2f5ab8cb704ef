use crate::models::TokenRow;
use crate::{Database, OptionalExt, ids};
use anyhow::Result;
use tripyy_types::domain::TokenKind;
use tripyy_types::ts;

impl Database {
    /// Mint a fresh code for `email`. Older unused tokens stay in the
    /// table but only the newest is ever surfaced by `consume_token`,
    /// and the cleaner removes them on schedule.
    pub fn create_verification_token(&self, email: &str, kind: TokenKind) -> Result<TokenRow> {
        let row = TokenRow {
            id: ids::entity_id(),
            email: email.to_lowercase(),
            code: ids::verification_code(),
            kind: kind.as_str().to_string(),
            expires_at: ts::hours_from_now(kind.validity_hours()),
            used: false,
            created_at: ts::now(),
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO verification_tokens (id, email, code, kind, expires_at, used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                (
                    &row.id,
                    &row.email,
                    &row.code,
                    &row.kind,
                    &row.expires_at,
                    &row.created_at,
                ),
            )?;
            Ok(())
        })?;
        Ok(row)
    }

    /// Atomically consume a matching valid token. The UPDATE's WHERE
    /// clause carries the full validity predicate, so a token can be
    /// consumed at most once even under concurrent attempts.
    pub fn consume_token(&self, email: &str, code: &str, kind: TokenKind) -> Result<bool> {
        self.with_conn(|conn| {
            let token_id: Option<String> = conn
                .query_row(
                    "SELECT id FROM verification_tokens
                     WHERE email = ?1 COLLATE NOCASE AND code = ?2 AND kind = ?3
                       AND used = 0 AND expires_at > ?4
                     ORDER BY created_at DESC
                     LIMIT 1",
                    (email, code, kind.as_str(), ts::now()),
                    |row| row.get(0),
                )
                .optional()?;

            let Some(token_id) = token_id else {
                return Ok(false);
            };

            let changed = conn.execute(
                "UPDATE verification_tokens SET used = 1 WHERE id = ?1 AND used = 0",
                [&token_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove used and expired tokens. Safe to run on overlapping
    /// schedules.
    pub fn cleanup_tokens(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM verification_tokens WHERE used = 1 OR expires_at < ?1",
                [ts::now()],
            )?;
            Ok(deleted)
        })
    }

    /// Unconditional purge of anything older than 7 days.
    pub fn purge_old_tokens(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM verification_tokens WHERE created_at < ?1",
                [ts::days_ago(7)],
            )?;
            Ok(deleted)
        })
    }

    #[cfg(test)]
    pub(crate) fn backdate_token(&self, id: &str, expires_at: &str, created_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE verification_tokens SET expires_at = ?1, created_at = ?2 WHERE id = ?3",
                (expires_at, created_at, id),
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_single_use() {
        let db = Database::open_in_memory().unwrap();
        let token = db
            .create_verification_token("a@b.co", TokenKind::EmailVerification)
            .unwrap();

        assert!(
            db.consume_token("a@b.co", &token.code, TokenKind::EmailVerification)
                .unwrap()
        );
        // A consumed token cannot be consumed again
        assert!(
            !db.consume_token("a@b.co", &token.code, TokenKind::EmailVerification)
                .unwrap()
        );
    }

    #[test]
    fn wrong_code_or_kind_does_not_consume() {
        let db = Database::open_in_memory().unwrap();
        let token = db
            .create_verification_token("a@b.co", TokenKind::EmailVerification)
            .unwrap();

        assert!(!db.consume_token("a@b.co", "000000", TokenKind::EmailVerification).unwrap());
        assert!(
            !db.consume_token("a@b.co", &token.code, TokenKind::PasswordReset)
                .unwrap()
        );
        // Still valid for the right kind
        assert!(
            db.consume_token("a@b.co", &token.code, TokenKind::EmailVerification)
                .unwrap()
        );
    }

    #[test]
    fn expired_token_is_rejected_and_cleaned() {
        let db = Database::open_in_memory().unwrap();
        let token = db
            .create_verification_token("a@b.co", TokenKind::PasswordReset)
            .unwrap();
        db.backdate_token(&token.id, &ts::hours_ago(2), &ts::hours_ago(3))
            .unwrap();

        assert!(
            !db.consume_token("a@b.co", &token.code, TokenKind::PasswordReset)
                .unwrap()
        );
        assert_eq!(db.cleanup_tokens().unwrap(), 1);
        assert_eq!(db.cleanup_tokens().unwrap(), 0);
    }

    #[test]
    fn week_old_tokens_are_purged_even_if_unexpired() {
        let db = Database::open_in_memory().unwrap();
        let token = db
            .create_verification_token("a@b.co", TokenKind::EmailVerification)
            .unwrap();
        // Created 8 days ago but somehow not expired (clock skew)
        db.backdate_token(&token.id, &ts::hours_from_now(1), &ts::days_ago(8))
            .unwrap();

        assert_eq!(db.cleanup_tokens().unwrap(), 0);
        assert_eq!(db.purge_old_tokens().unwrap(), 1);
    }

    #[test]
    fn newest_token_wins_when_several_exist() {
        let db = Database::open_in_memory().unwrap();
        let old = db
            .create_verification_token("a@b.co", TokenKind::EmailVerification)
            .unwrap();
        let new = db
            .create_verification_token("a@b.co", TokenKind::EmailVerification)
            .unwrap();

        // Both codes technically validate, but each exactly once.
        assert!(
            db.consume_token("a@b.co", &new.code, TokenKind::EmailVerification)
                .unwrap()
        );
        assert!(
            db.consume_token("a@b.co", &old.code, TokenKind::EmailVerification)
                .unwrap()
        );
        assert!(
            !db.consume_token("a@b.co", &new.code, TokenKind::EmailVerification)
                .unwrap()
        );
    }
}
