//! Password recovery endpoint: create a reset token and queue its email.
//!
//! Unknown addresses get a distinct error here while `/login` keeps its
//! failures indistinguishable. The inconsistency is inherited behavior, kept
//! on purpose until a product decision unifies it.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, instrument};

use crate::cli::globals::GlobalArgs;

use super::storage::{find_user_by_email, insert_password_reset};
use super::types::{failure, RecoverRequest};
use super::utils::{normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/recover",
    request_body = RecoverRequest,
    responses(
        (status = 200, description = "Reset email queued", content_type = "application/json"),
        (status = 401, description = "Email address not found"),
        (status = 500, description = "Failed to create the reset token"),
    ),
    tag = "recover"
)]
#[instrument(skip_all)]
pub async fn recover(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<RecoverRequest>>,
) -> impl IntoResponse {
    let request: RecoverRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, failure("Missing payload")),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (
            StatusCode::UNAUTHORIZED,
            failure(json!({ "email": "Your email address was not found." })),
        );
    }

    let user = match find_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                failure(json!({ "email": "Your email address was not found." })),
            );
        }
        Err(err) => {
            error!("Error looking up user for recovery: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to send reset email, please try again."),
            );
        }
    };

    match insert_password_reset(&pool, user.id, &email, &globals).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "data": { "message": "A reset email has been sent! Please check your email." },
            })),
        ),
        Err(err) => {
            error!("Error creating password reset: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to send reset email, please try again."),
            )
        }
    }
}
