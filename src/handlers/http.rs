//! HTTP adapter: `POST /` runs the pipeline, `GET /health` answers liveness.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::handlers::process::handle_json_body;
use crate::state::AppState;

fn origin_matches(pattern: &str, origin: &str) -> bool {
    let pattern = pattern.trim().trim_end_matches('/').to_ascii_lowercase();
    let origin = origin.trim().to_ascii_lowercase();
    if pattern == "*" {
        return true;
    }
    if let Some((scheme, domain)) = pattern.split_once("://*.") {
        let Some(host) = origin
            .strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix("://"))
        else {
            return false;
        };
        return host
            .strip_suffix(domain)
            .and_then(|prefix| prefix.strip_suffix('.'))
            .is_some_and(|subdomain| !subdomain.is_empty());
    }
    pattern == origin
}

/// True when `origin` matches an exact entry, a `scheme://*.domain` wildcard
/// entry, or a bare `*`.
pub fn origin_allowed(patterns: &[String], origin: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| origin_matches(pattern, origin))
}

pub fn cors_layer(patterns: &[String]) -> CorsLayer {
    let allow_origin = if patterns.iter().any(|pattern| pattern.trim() == "*") {
        AllowOrigin::any()
    } else {
        let patterns: Arc<[String]> = patterns.into();
        AllowOrigin::predicate(move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| origin_allowed(&patterns, origin))
                .unwrap_or(false)
        })
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn process_image(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            return (
                rejection.status(),
                Json(json!({ "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    let reply = handle_json_body(&state, &body, "http").await;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(reply.body)).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState, max_body_bytes: usize, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/", post(process_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn serve(state: AppState, config: &Config) -> anyhow::Result<()> {
    let app = router(state, config.max_body_bytes, &config.cors_allowed_origins);
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(
        "Listening on {} (CORS origins: {})",
        listener.local_addr()?,
        config.cors_allowed_origins.join(",")
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
