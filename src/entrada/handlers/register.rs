//! Registration endpoint: create the account, its verification code, and the
//! signup email in one transaction.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use tracing::{error, instrument};

use crate::cli::globals::GlobalArgs;
use crate::entrada::password::hash_password;

use super::storage::{insert_user_and_verification, user_exists, SignupOutcome};
use super::types::{ack, failure, Ack, RegisterRequest};
use super::utils::normalize_email;
use super::validate_register;

const EMAIL_TAKEN: &str = "The email has already been taken.";

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registration accepted, verification email queued", body = Ack, content_type = "application/json"),
        (status = 400, description = "Validation failed or email already taken"),
        (status = 500, description = "Registration failed"),
    ),
    tag = "register"
)]
#[instrument(skip_all)]
pub async fn register(
    pool: Extension<PgPool>,
    globals: Extension<GlobalArgs>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, failure("Missing payload")),
    };

    let email = normalize_email(&request.email);

    let errors = validate_register(&request.name, &email, &request.password);
    if !errors.is_empty() {
        return (StatusCode::BAD_REQUEST, failure(&errors));
    }

    // Pre-check for a friendlier error; the unique constraint still decides
    // races at insert time.
    match user_exists(&pool, &email).await {
        Ok(true) => {
            return (
                StatusCode::BAD_REQUEST,
                failure(serde_json::json!({ "email": EMAIL_TAKEN })),
            );
        }
        Ok(false) => (),
        Err(err) => {
            error!("Error checking if user exists: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to register, please try again."),
            );
        }
    }

    // Argon2 is deliberately expensive; keep it off the async worker.
    let password = request.password;
    let password_hash = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
        Ok(Ok(hash)) => hash,
        Ok(Err(err)) => {
            error!("Error hashing password: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to register, please try again."),
            );
        }
        Err(err) => {
            error!("Password hashing task failed: {err:?}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to register, please try again."),
            );
        }
    };

    match insert_user_and_verification(&pool, &request.name, &email, &password_hash, &globals).await
    {
        Ok(SignupOutcome::Created) => (
            StatusCode::OK,
            ack("Thanks for signing up! Please check your email to complete your registration."),
        ),
        Ok(SignupOutcome::DuplicateEmail) => (
            StatusCode::BAD_REQUEST,
            failure(serde_json::json!({ "email": EMAIL_TAKEN })),
        ),
        Err(err) => {
            error!("Error inserting user: {err:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                failure("Failed to register, please try again."),
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

    fn globals() -> GlobalArgs {
        let mut globals = GlobalArgs::new("https://accounts.example.com".to_string());
        globals.set_token_secret(SecretString::from("test-secret"));
        globals
    }

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn register_missing_payload() -> Result<()> {
        let response = register(Extension(lazy_pool()?), Extension(globals()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() -> Result<()> {
        let response = register(
            Extension(lazy_pool()?),
            Extension(globals()),
            Some(Json(RegisterRequest {
                name: "Ana".to_string(),
                email: "not-an-email".to_string(),
                password: "secret123".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_empty_name() -> Result<()> {
        let response = register(
            Extension(lazy_pool()?),
            Extension(globals()),
            Some(Json(RegisterRequest {
                name: "  ".to_string(),
                email: "ana@x.com".to_string(),
                password: "secret123".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
