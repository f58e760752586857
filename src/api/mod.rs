use crate::auth::{
    AuthConfig, PgStore, spawn_revocation_pruner, transport::OtpTransport,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::mpsc};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use handlers::auth::AuthState;
pub use openapi::openapi;

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    transport: Arc<dyn OtpTransport>,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store = Arc::new(PgStore::new(pool.clone()));

    // Revocations outlive their tokens only until `expires_at`; prune them periodically.
    spawn_revocation_pruner(
        store.clone(),
        Duration::from_secs(auth_config.revocation_prune_seconds()),
    );

    let auth_state = Arc::new(AuthState::new(auth_config, store, transport));
    let app = router(auth_state, pool);

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(err) => error!("Failed to listen for shutdown signal: {err}"),
        }
    });

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        rx.recv().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

/// Build the application router.
///
/// Auth endpoints are open; portal routes sit behind the basic or strict
/// guard via `route_layer`, so only matched routes are guarded.
pub fn router(auth_state: Arc<AuthState>, pool: PgPool) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let auth_routes = Router::new()
        .route("/api/auth_system/login", post(handlers::auth::login::login))
        .route(
            "/api/auth_system/verify-otp",
            post(handlers::auth::otp::verify_otp),
        )
        .route(
            "/api/auth_system/resend-otp",
            post(handlers::auth::otp::resend_otp),
        )
        .route(
            "/api/auth_system/lead-login",
            post(handlers::auth::otp::lead_login),
        )
        .route(
            "/api/auth_system/lead-verify-otp",
            post(handlers::auth::otp::lead_verify_otp),
        )
        .route(
            "/api/auth_system/token/refresh",
            post(handlers::auth::refresh::refresh),
        )
        .route(
            "/api/auth_system/logout",
            post(handlers::auth::logout::logout),
        );

    let basic_routes = Router::new()
        .route("/api/:portal/whoami", get(handlers::portal::whoami))
        .route(
            "/api/lead/verification/otp",
            post(handlers::verification::request_verification_otp),
        )
        .route(
            "/api/lead/verification/otp/verify",
            post(handlers::verification::confirm_verification_otp),
        )
        .route_layer(middleware::from_fn(
            handlers::auth::middleware::require_portal_token,
        ));

    let strict_routes = Router::new()
        .route("/api/:portal/session", get(handlers::portal::session))
        .route_layer(middleware::from_fn(
            handlers::auth::middleware::require_bound_session,
        ));

    Router::new()
        .route(
            "/health",
            get(handlers::health::health).options(handlers::health::health),
        )
        .merge(auth_routes)
        .merge(basic_routes)
        .merge(strict_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
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
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        )
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
