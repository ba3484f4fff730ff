//! Stateless session tokens (HS256).
//!
//! Tokens are self-contained: signature plus expiry decide validity without a
//! store lookup on every authenticated request. Logout is still enforceable
//! before natural expiry because each token carries a `jti` that the logout
//! handler records in the `revoked_tokens` table; paths that must honor
//! logout use [`SessionTokens::validate_live`], which checks that table after
//! the signature check.

use crate::entrada::handlers::storage::is_revoked;

use anyhow::{Context, Result};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Claims carried by a session token.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub iat: u64,
    pub exp: u64,
}

/// Why a presented token was rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Revoked,
    Invalid,
}

/// Issues and validates session tokens with a single signing key.
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl SessionTokens {
    #[must_use]
    pub fn new(secret: &SecretString, ttl_seconds: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // No leeway: a token expires exactly at `exp`.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            ttl_seconds,
        }
    }

    /// Sign a new token for the given user.
    pub fn issue(&self, user_id: Uuid) -> Result<String> {
        let now = now_unix_seconds();
        let ttl = u64::try_from(self.ttl_seconds).unwrap_or(0);
        let claims = Claims {
            sub: user_id,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign session token")
    }

    /// Check signature and expiry, returning the claims on success.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }

    /// Full check for paths that must honor logout: signature and expiry
    /// first, then the revocation list.
    ///
    /// The outer `Result` is a database failure; the inner one classifies the
    /// token itself.
    pub async fn validate_live(
        &self,
        pool: &sqlx::PgPool,
        token: &str,
    ) -> Result<std::result::Result<Claims, TokenError>> {
        let claims = match self.validate(token) {
            Ok(claims) => claims,
            Err(err) => return Ok(Err(err)),
        };

        if is_revoked(pool, claims.jti).await? {
            return Ok(Err(TokenError::Revoked));
        }

        Ok(Ok(claims))
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> SessionTokens {
        SessionTokens::new(&SecretString::from("test-secret"), 60)
    }

    #[test]
    fn issue_and_validate_round_trip() -> Result<()> {
        let tokens = tokens();
        let user_id = Uuid::new_v4();

        let token = tokens.issue(user_id)?;
        let claims = tokens.validate(&token).expect("token should validate");

        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
        Ok(())
    }

    #[test]
    fn each_token_gets_a_fresh_jti() -> Result<()> {
        let tokens = tokens();
        let user_id = Uuid::new_v4();

        let first = tokens.validate(&tokens.issue(user_id)?);
        let second = tokens.validate(&tokens.issue(user_id)?);

        assert_ne!(first.unwrap().jti, second.unwrap().jti);
        Ok(())
    }

    #[test]
    fn expired_token_is_classified_expired() -> Result<()> {
        let now = now_unix_seconds();
        let claims = Claims {
            sub: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: now.saturating_sub(120),
            exp: now.saturating_sub(60),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )?;

        assert_eq!(tokens().validate(&token), Err(TokenError::Expired));
        Ok(())
    }

    #[test]
    fn tampered_token_is_invalid() -> Result<()> {
        let tokens = tokens();
        let mut token = tokens.issue(Uuid::new_v4())?;
        token.push('x');

        assert_eq!(tokens.validate(&token), Err(TokenError::Invalid));
        Ok(())
    }

    #[test]
    fn token_signed_with_other_key_is_invalid() -> Result<()> {
        let other = SessionTokens::new(&SecretString::from("other-secret"), 60);
        let token = other.issue(Uuid::new_v4())?;

        assert_eq!(tokens().validate(&token), Err(TokenError::Invalid));
        Ok(())
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(
            tokens().validate("not-a-token"),
            Err(TokenError::Invalid)
        );
    }

    #[tokio::test]
    async fn validate_live_rejects_bad_tokens_before_any_lookup() -> Result<()> {
        // Lazy pool: never connects, so reaching the revocation lookup with a
        // bad token would fail this test with a connection error.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")?;

        let outcome = tokens().validate_live(&pool, "not-a-token").await?;

        assert_eq!(outcome, Err(TokenError::Invalid));
        Ok(())
    }
}
