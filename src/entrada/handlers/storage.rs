//! Database helpers for users, verification codes, reset tokens and the
//! session revocation list.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::cli::globals::GlobalArgs;

use super::utils::{
    build_reset_url, build_verify_url, generate_token, hash_token, is_unique_violation,
};

/// Outcome when attempting to create a new user + verification record.
#[derive(Debug)]
pub(crate) enum SignupOutcome {
    Created,
    DuplicateEmail,
}

/// Outcome of presenting a verification code.
#[derive(Debug)]
pub(crate) enum VerifyOutcome {
    Verified,
    AlreadyVerified,
    Invalid,
}

/// Outcome of redeeming a password reset token.
#[derive(Clone, Copy, Debug)]
pub(crate) enum RedeemOutcome {
    Updated,
    Expired,
    Invalid,
}

/// Minimal user fields needed by login and recovery.
pub(crate) struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) password_hash: String,
    pub(crate) is_verified: bool,
}

pub(crate) async fn user_exists(pool: &PgPool, email: &str) -> Result<bool> {
    let query = "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1) AS exists";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check if user exists")?;
    Ok(row.get("exists"))
}

pub(crate) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, password_hash, is_verified FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| UserRecord {
        id: row.get("id"),
        password_hash: row.get("password_hash"),
        is_verified: row.get("is_verified"),
    }))
}

/// Create the user, the verification code, and its outbox row in one
/// transaction; the unique constraint on `users.email` decides races between
/// concurrent registrations with the same address.
pub(crate) async fn insert_user_and_verification(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
    globals: &GlobalArgs,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users (name, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::DuplicateEmail);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let _token = insert_verification_records(&mut tx, user_id, name, email, globals).await?;

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created)
}

async fn insert_verification_records(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    name: &str,
    email: &str,
    globals: &GlobalArgs,
) -> Result<String> {
    // Generate a raw code for the email link and store only its hash.
    let token = generate_token()?;
    let token_hash = hash_token(&token);

    let query = r"
        INSERT INTO user_verifications (user_id, token_hash)
        VALUES ($1, $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert verification token")?;

    let verify_url = build_verify_url(&globals.base_url, &token);
    let payload_json = json!({
        "name": name,
        "email": email,
        "verify_url": verify_url,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    insert_outbox_row(tx, email, "verify_email", &payload_text).await?;

    Ok(token)
}

/// Consume a verification code and activate its user.
///
/// Consumption is a `consumed_at` tombstone, not a delete: presenting the same
/// code again resolves to an already-verified user and reports that outcome
/// instead of "invalid". The `consumed_at IS NULL` guard makes the state flip
/// single-use under concurrent requests.
pub(crate) async fn consume_verification(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<VerifyOutcome> {
    let mut tx = pool.begin().await.context("begin verify transaction")?;

    let query = r"
        SELECT users.id, users.is_verified
        FROM user_verifications
        JOIN users ON users.id = user_verifications.user_id
        WHERE user_verifications.token_hash = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup verification token")?;

    let Some(row) = row else {
        tx.commit().await.context("commit verify noop")?;
        return Ok(VerifyOutcome::Invalid);
    };

    if row.get::<bool, _>("is_verified") {
        tx.commit().await.context("commit verify noop")?;
        return Ok(VerifyOutcome::AlreadyVerified);
    }

    let query = r"
        UPDATE user_verifications
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let consumed = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume verification token")?;

    let Some(consumed) = consumed else {
        // Lost the race against a concurrent verify of the same code.
        tx.commit().await.context("commit verify noop")?;
        return Ok(VerifyOutcome::AlreadyVerified);
    };

    let user_id: Uuid = consumed.get("user_id");
    let query = "UPDATE users SET is_verified = TRUE WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to mark user verified")?;

    tx.commit().await.context("commit verify transaction")?;

    Ok(VerifyOutcome::Verified)
}

// Expired leftovers go with every insert, and so do the user's earlier
// tokens: only the most recent reset link stays live.
const PRUNE_PASSWORD_RESETS: &str = r"
    DELETE FROM password_resets
    WHERE expires_at <= NOW() OR user_id = $1
";

/// Create a reset token and its outbox row in one transaction, so a token
/// never exists without the email that should deliver it.
pub(crate) async fn insert_password_reset(
    pool: &PgPool,
    user_id: Uuid,
    email: &str,
    globals: &GlobalArgs,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = PRUNE_PASSWORD_RESETS
    );
    sqlx::query(PRUNE_PASSWORD_RESETS)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to prune password reset tokens")?;

    let token = generate_token()?;
    let token_hash = hash_token(&token);

    let query = r"
        INSERT INTO password_resets (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(globals.reset_ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert password reset token")?;

    let reset_url = build_reset_url(&globals.base_url, &token);
    let payload_json = json!({
        "email": email,
        "reset_url": reset_url,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize email payload")?;

    insert_outbox_row(&mut tx, email, "password_reset", &payload_text).await?;

    tx.commit().await.context("commit reset transaction")?;

    Ok(())
}

/// Redeem a reset token: consume it and update the password hash.
///
/// The DELETE is the consuming step. Its `RETURNING` row decides the outcome,
/// so of two concurrent redeems of the same token only one sees a row and
/// updates the password; the other resolves to `Invalid`.
pub(crate) async fn redeem_password_reset(
    pool: &PgPool,
    token_hash: &[u8],
    new_password_hash: &str,
) -> Result<RedeemOutcome> {
    let mut tx = pool.begin().await.context("begin redeem transaction")?;

    let query = r"
        DELETE FROM password_resets
        WHERE token_hash = $1
        RETURNING user_id, (expires_at <= NOW()) AS expired
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume password reset token")?;

    let consumed: Option<(Uuid, bool)> =
        row.map(|row| (row.get("user_id"), row.get("expired")));
    let outcome = classify_consumed_reset(consumed.map(|(_, expired)| expired));

    let Some((user_id, false)) = consumed else {
        // Unknown (or already consumed) token, or an expired one; the DELETE
        // already removed the latter so it cannot be retried.
        tx.commit().await.context("commit redeem noop")?;
        return Ok(outcome);
    };

    let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    tx.commit().await.context("commit redeem transaction")?;

    Ok(outcome)
}

fn classify_consumed_reset(expired: Option<bool>) -> RedeemOutcome {
    match expired {
        None => RedeemOutcome::Invalid,
        Some(true) => RedeemOutcome::Expired,
        Some(false) => RedeemOutcome::Updated,
    }
}

/// Record a logged-out token `jti`. Expired entries are pruned on the way in,
/// so the table stays bounded without a background job.
pub(crate) async fn insert_revocation(pool: &PgPool, jti: Uuid, exp_unix: i64) -> Result<()> {
    let query = "DELETE FROM revoked_tokens WHERE expires_at <= NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to prune revoked tokens")?;

    // Revoking twice is a no-op.
    let query = r"
        INSERT INTO revoked_tokens (jti, expires_at)
        VALUES ($1, to_timestamp($2))
        ON CONFLICT (jti) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(jti)
        .bind(exp_unix)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert token revocation")?;

    Ok(())
}

pub(crate) async fn is_revoked(pool: &PgPool, jti: Uuid) -> Result<bool> {
    let query = "SELECT 1 FROM revoked_tokens WHERE jti = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(jti)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check token revocation")?;
    Ok(row.is_some())
}

async fn insert_outbox_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    to_email: &str,
    template: &str,
    payload_text: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        classify_consumed_reset, RedeemOutcome, SignupOutcome, UserRecord, VerifyOutcome,
        PRUNE_PASSWORD_RESETS,
    };
    use uuid::Uuid;

    #[test]
    fn redeem_outcome_follows_what_the_delete_consumed() {
        // No row consumed: unknown token, or a concurrent redeem got there
        // first. Either way the token must not work.
        assert!(matches!(
            classify_consumed_reset(None),
            RedeemOutcome::Invalid
        ));
        assert!(matches!(
            classify_consumed_reset(Some(true)),
            RedeemOutcome::Expired
        ));
        assert!(matches!(
            classify_consumed_reset(Some(false)),
            RedeemOutcome::Updated
        ));
    }

    #[test]
    fn reset_prune_drops_expired_and_superseded_tokens() {
        assert!(PRUNE_PASSWORD_RESETS.contains("expires_at <= NOW()"));
        assert!(PRUNE_PASSWORD_RESETS.contains("user_id = $1"));
    }

    #[test]
    fn signup_outcome_debug_names() {
        assert_eq!(format!("{:?}", SignupOutcome::Created), "Created");
        assert_eq!(
            format!("{:?}", SignupOutcome::DuplicateEmail),
            "DuplicateEmail"
        );
    }

    #[test]
    fn verify_outcome_debug_names() {
        assert_eq!(format!("{:?}", VerifyOutcome::Verified), "Verified");
        assert_eq!(
            format!("{:?}", VerifyOutcome::AlreadyVerified),
            "AlreadyVerified"
        );
        assert_eq!(format!("{:?}", VerifyOutcome::Invalid), "Invalid");
    }

    #[test]
    fn redeem_outcome_debug_names() {
        assert_eq!(format!("{:?}", RedeemOutcome::Updated), "Updated");
        assert_eq!(format!("{:?}", RedeemOutcome::Expired), "Expired");
        assert_eq!(format!("{:?}", RedeemOutcome::Invalid), "Invalid");
    }

    #[test]
    fn user_record_holds_values() {
        let record = UserRecord {
            id: Uuid::nil(),
            password_hash: "$argon2id$stub".to_string(),
            is_verified: false,
        };
        assert_eq!(record.id, Uuid::nil());
        assert_eq!(record.password_hash, "$argon2id$stub");
        assert!(!record.is_verified);
    }
}
