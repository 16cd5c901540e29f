use crate::{
    blob::{BlobBackend, HttpBlobStore},
    cli::config::ServerConfig,
    db,
    session::{PgSessionStore, SessionGate, SessionPolicy},
    store::TreeService,
    totp::Totp,
};
use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod email;
pub(crate) mod error;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Issuer label shown in authenticator apps.
const TOTP_ISSUER: &str = "Kesto";

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable, a configured backend
/// cannot be built, or the listener fails.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&config.dsn)
        .await
        .context("Failed to connect to database")?;

    db::ensure_schema(&pool).await?;

    let blobs = match &config.blob {
        Some(blob) => BlobBackend::Http(HttpBlobStore::new(
            &blob.endpoint,
            &blob.bucket,
            blob.token.clone(),
        )?),
        None => BlobBackend::memory(),
    };

    let sender = match &config.mail {
        Some(mail) => email::EmailBackend::Http(email::HttpEmailSender::new(
            &mail.endpoint,
            &mail.from,
            mail.token.clone(),
        )?),
        None => email::EmailBackend::Log(email::LogEmailSender),
    };
    email::spawn_outbox_worker(pool.clone(), sender, email::EmailWorkerConfig::new());

    let policy = SessionPolicy::new().with_require_biometric(config.require_biometric);
    let gate = SessionGate::new(PgSessionStore::new(pool.clone()), policy);
    if config.bypass_sessions {
        warn!("session validation is DISABLED (--dev-bypass-sessions); never run this in production");
    }
    let guard = Arc::new(handlers::AccessGuard::new(gate, config.bypass_sessions));
    let tree = Arc::new(TreeService::new(pool.clone(), blobs));
    let totp = Arc::new(Totp::new(TOTP_ISSUER));

    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(CorsLayer::permissive())
            .layer(Extension(guard))
            .layer(Extension(tree))
            .layer(Extension(totp))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{}", config.port)).await?;

    info!("Listening on [::]:{}", config.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
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
