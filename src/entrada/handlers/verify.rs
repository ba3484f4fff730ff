//! Email verification endpoint.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use tracing::{error, instrument};

use super::storage::{consume_verification, VerifyOutcome};
use super::types::{ack, failure, Ack};
use super::utils::hash_token;

#[utoipa::path(
    get,
    path = "/verify/{code}",
    params(
        ("code" = String, Path, description = "Verification code from the signup email")
    ),
    responses(
        (status = 200, description = "Email verified (or was already verified)", body = Ack, content_type = "application/json"),
        (status = 400, description = "Verification code is invalid"),
    ),
    tag = "verify"
)]
#[instrument(skip_all)]
pub async fn verify(pool: Extension<PgPool>, Path(code): Path<String>) -> impl IntoResponse {
    let code = code.trim();
    if code.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            failure("Verification code is invalid."),
        );
    }

    // Only the hash is stored; never compare raw codes against the database.
    let token_hash = hash_token(code);

    match consume_verification(&pool, &token_hash).await {
        Ok(VerifyOutcome::Verified) => (
            StatusCode::OK,
            ack("You have successfully verified your email address."),
        ),
        Ok(VerifyOutcome::AlreadyVerified) => (StatusCode::OK, ack("Account already verified.")),
        Ok(VerifyOutcome::Invalid) => (
            StatusCode::BAD_REQUEST,
            failure("Verification code is invalid."),
        ),
        Err(err) => {
            error!("Error verifying email: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Verification failed, please try again."),
            )
        }
    }
}
