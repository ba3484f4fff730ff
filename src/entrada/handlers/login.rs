//! Login endpoint: verify credentials and issue a session token.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, instrument};

use crate::entrada::password::{dummy_hash, verify_password};
use crate::entrada::session::SessionTokens;

use super::storage::find_user_by_email;
use super::types::{failure, LoginOk, LoginRequest, TokenData};
use super::utils::normalize_email;
use super::validate_login;

// Unknown email, wrong password, and unverified accounts are deliberately
// indistinguishable to avoid account enumeration.
const NOT_FOUND: &str = "We can't find an account with this credentials. \
    Please make sure you entered the right information and you have verified \
    your email address.";

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginOk, content_type = "application/json"),
        (status = 401, description = "Validation failed"),
        (status = 404, description = "Credentials not found or account unverified"),
        (status = 500, description = "Failed to sign session token"),
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn login(
    pool: Extension<PgPool>,
    tokens: Extension<Arc<SessionTokens>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (StatusCode::BAD_REQUEST, failure("Missing payload")).into_response();
        }
    };

    let email = normalize_email(&request.email);

    let errors = validate_login(&email, &request.password);
    if !errors.is_empty() {
        return (StatusCode::UNAUTHORIZED, failure(&errors)).into_response();
    }

    let user = match find_user_by_email(&pool, &email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Error looking up user: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to login, please try again."),
            )
                .into_response();
        }
    };

    // Verify against a dummy hash when the account is missing so response
    // timing does not reveal whether the email exists.
    let (stored_hash, can_login) = match &user {
        Some(user) => (user.password_hash.as_str(), user.is_verified),
        None => (dummy_hash(), false),
    };

    let password = request.password;
    let hash = stored_hash.to_string();
    let password_matches =
        match tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await {
            Ok(Ok(matches)) => matches,
            Ok(Err(err)) => {
                error!("Error verifying password: {err:?}");
                false
            }
            Err(err) => {
                error!("Password verification task failed: {err:?}");
                false
            }
        };

    if !password_matches || !can_login {
        debug!("Login rejected");
        return (StatusCode::NOT_FOUND, failure(NOT_FOUND)).into_response();
    }

    let Some(user) = user else {
        return (StatusCode::NOT_FOUND, failure(NOT_FOUND)).into_response();
    };

    match tokens.issue(user.id) {
        Ok(token) => {
            debug!("Login successful");
            (
                StatusCode::OK,
                Json(LoginOk {
                    ok: true,
                    data: TokenData { token },
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Error signing session token: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to login, please try again."),
            )
                .into_response()
        }
    }
}
