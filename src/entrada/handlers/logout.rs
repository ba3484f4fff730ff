//! Logout endpoint: revoke a session token before its natural expiry.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};

use crate::entrada::session::SessionTokens;

use super::storage::insert_revocation;
use super::types::{ack, failure, Ack, LogoutRequest};

#[utoipa::path(
    post,
    path = "/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Token revoked", body = Ack, content_type = "application/json"),
        (status = 400, description = "Token missing from payload"),
        (status = 500, description = "Token invalid or revocation failed"),
    ),
    tag = "logout"
)]
#[instrument(skip_all)]
pub async fn logout(
    pool: Extension<PgPool>,
    tokens: Extension<Arc<SessionTokens>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request: LogoutRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, failure("Missing payload")),
    };

    if request.token.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            failure(serde_json::json!({ "token": "The token field is required." })),
        );
    }

    // Expired and already-revoked tokens land here too; there is nothing
    // left to revoke for them.
    let claims = match tokens.validate_live(&pool, &request.token).await {
        Ok(Ok(claims)) => claims,
        Ok(Err(err)) => {
            error!("Logout with unusable token: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to logout, please try again."),
            );
        }
        Err(err) => {
            error!("Error checking token revocation: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to logout, please try again."),
            );
        }
    };

    let exp_unix = i64::try_from(claims.exp).unwrap_or(i64::MAX);
    match insert_revocation(&pool, claims.jti, exp_unix).await {
        Ok(()) => (
            StatusCode::OK,
            ack("You have successfully logged out."),
        ),
        Err(err) => {
            error!("Error revoking token: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to logout, please try again."),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::response::IntoResponse;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn session_tokens() -> Arc<SessionTokens> {
        Arc::new(SessionTokens::new(&SecretString::from("test-secret"), 60))
    }

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn logout_missing_payload() -> Result<()> {
        let response = logout(Extension(lazy_pool()?), Extension(session_tokens()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn logout_requires_token_field() -> Result<()> {
        let response = logout(
            Extension(lazy_pool()?),
            Extension(session_tokens()),
            Some(Json(LogoutRequest {
                token: "  ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn logout_rejects_garbage_token() -> Result<()> {
        let response = logout(
            Extension(lazy_pool()?),
            Extension(session_tokens()),
            Some(Json(LogoutRequest {
                token: "not-a-token".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }
}
