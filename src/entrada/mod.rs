use crate::cli::globals::GlobalArgs;
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod email;
pub(crate) mod handlers;
pub mod password;
pub mod session;

use self::handlers::{
    health, health::__path_health, login, login::__path_login, logout, logout::__path_logout,
    recover, recover::__path_recover, register, register::__path_register, reset,
    reset::__path_reset, types, verify, verify::__path_verify,
};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

#[derive(OpenApi)]
#[openapi(
    paths(health, register, verify, login, logout, recover, reset),
    components(schemas(
        health::Health,
        types::RegisterRequest,
        types::LoginRequest,
        types::LogoutRequest,
        types::RecoverRequest,
        types::ResetRequest,
        types::Ack,
        types::TokenData,
        types::LoginOk,
    )),
    tags(
        (name = "entrada", description = "Account authentication API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, globals: &GlobalArgs) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let session_tokens = Arc::new(session::SessionTokens::new(
        &globals.token_secret,
        globals.session_ttl_seconds,
    ));

    // Drain the email outbox in the background; requests only enqueue.
    let sender: Arc<dyn email::EmailSender> =
        Arc::new(email::LogEmailSender::new(globals.from_email.clone()));
    let _outbox_worker =
        email::spawn_outbox_worker(pool.clone(), sender, email::EmailWorkerConfig::default());

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let app = Router::new()
        .route("/register", post(register))
        .route("/verify/:code", get(verify))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/recover", post(recover))
        .route("/reset", post(reset))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(globals.clone()))
                .layer(Extension(session_tokens))
                .layer(Extension(pool.clone())),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi()))
        .route("/health", get(health).options(health))
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
