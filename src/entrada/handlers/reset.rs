//! Reset-token redemption endpoint: set a new password without the old one.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, instrument};

use crate::entrada::password::hash_password;

use super::storage::{redeem_password_reset, RedeemOutcome};
use super::types::{ack, failure, Ack, ResetRequest};
use super::utils::hash_token;

#[utoipa::path(
    post,
    path = "/reset",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Password updated", body = Ack, content_type = "application/json"),
        (status = 400, description = "Reset token invalid or expired"),
        (status = 500, description = "Password update failed"),
    ),
    tag = "recover"
)]
#[instrument(skip_all)]
pub async fn reset(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetRequest>>,
) -> impl IntoResponse {
    let request: ResetRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, failure("Missing payload")),
    };

    let mut errors = serde_json::Map::new();
    if request.token.trim().is_empty() {
        errors.insert("token".to_string(), json!("The token field is required."));
    }
    if request.password.is_empty() {
        errors.insert(
            "password".to_string(),
            json!("The password field is required."),
        );
    }
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, failure(errors));
    }

    let token_hash = hash_token(request.token.trim());

    let password = request.password;
    let password_hash = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(err)) => {
            error!("Error hashing password: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to reset password, please try again."),
            );
        }
        Err(err) => {
            error!("Password hashing task failed: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to reset password, please try again."),
            );
        }
    };

    match redeem_password_reset(&pool, &token_hash, &password_hash).await {
        Ok(RedeemOutcome::Updated) => (
            StatusCode::OK,
            ack("Your password has been updated. Please log in with your new password."),
        ),
        Ok(RedeemOutcome::Expired) => (
            StatusCode::BAD_REQUEST,
            failure("Reset token has expired. Please request a new reset email."),
        ),
        Ok(RedeemOutcome::Invalid) => {
            (StatusCode::BAD_REQUEST, failure("Reset token is invalid."))
        }
        Err(err) => {
            error!("Error redeeming password reset: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to reset password, please try again."),
            )
        }
    }
}
