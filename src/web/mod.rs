//! HTTP surface (C8): routes the two proxy URL patterns, forces
//! OPTIONS preflights to 204 and HEAD via axum's GET fallthrough, emits
//! CORS on every response, and logs each request's outcome.

pub mod responses;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::proxy::fetcher::UpstreamFetcher;
use crate::proxy::resource_handler::ResourceOutcome;
use crate::proxy::{channel_handler, resource_handler};
use crate::registry::ChannelRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn ChannelRegistry>,
    pub fetcher: Arc<UpstreamFetcher>,
    pub public_origin: Option<String>,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn ChannelRegistry>,
        fetcher: Arc<UpstreamFetcher>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            fetcher,
            public_origin: config.proxy.public_origin.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            axum::http::header::CONTENT_LENGTH,
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static("content-range"),
        ])
        .max_age(std::time::Duration::from_secs(86400));

    Router::new()
        .route("/api/proxy/s", get(resource_entry))
        .route("/api/proxy/:entry", get(channel_entry))
        .fallback(unknown_route)
        .layer(cors)
        .layer(middleware::from_fn(force_preflight_no_content))
        .with_state(state)
}

/// `CorsLayer` answers a preflight itself with 200 OK; the proxy route
/// contract is 204 No Content, headers only. Rewrite the status after
/// the CORS layer has already set every `access-control-*` header.
async fn force_preflight_no_content(request: Request, next: Next) -> Response {
    let is_preflight = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_preflight {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

/// The scheme+authority rewritten descendant URLs are addressed to:
/// the configured public origin, or derived per-request from `Host`.
fn proxy_origin(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(origin) = &state.public_origin {
        return origin.clone();
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

async fn channel_entry(
    State(state): State<AppState>,
    Path(entry): Path<String>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let Some(channel_id) = entry.strip_suffix(".m3u8") else {
        warn!(route = %entry, "unknown proxy route");
        return responses::playlist_response(
            StatusCode::NOT_FOUND,
            "#EXTM3U\n#EXT-X-ERROR:Unknown proxy route\n".to_string(),
        );
    };

    let origin = proxy_origin(&state, &headers);
    let outcome =
        channel_handler::handle(state.registry.as_ref(), &state.fetcher, channel_id, &origin)
            .await;

    log_outcome("channel", channel_id, outcome.status, start);
    responses::playlist_response(outcome.status, outcome.body)
}

#[derive(Debug, Deserialize)]
struct ResourceQuery {
    url: String,
    h: Option<String>,
}

async fn resource_entry(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
    headers: HeaderMap,
) -> Response {
    let start = Instant::now();
    let origin = proxy_origin(&state, &headers);
    let outcome =
        resource_handler::handle(&state.fetcher, &query.url, query.h.as_deref(), &origin).await;

    match outcome {
        ResourceOutcome::Playlist { status, body } => {
            log_outcome("resource", &query.url, status, start);
            responses::playlist_response(status, body)
        }
        ResourceOutcome::Media {
            status,
            content_type,
            content_length,
            stream,
        } => {
            log_outcome("resource", &query.url, status, start);
            responses::media_response(status, content_type, content_length, stream)
        }
        ResourceOutcome::Error { status, body } => {
            log_outcome("resource", &query.url, status, start);
            responses::plain_text_response(status, body)
        }
    }
}

async fn unknown_route() -> Response {
    responses::plain_text_response(StatusCode::NOT_FOUND, "Unknown proxy route".to_string())
}

fn log_outcome(route: &str, target: &str, status: StatusCode, start: Instant) {
    let latency = start.elapsed();
    if status.is_server_error() {
        tracing::error!(route, target, %status, ?latency, "request failed");
    } else if status.is_client_error() {
        warn!(route, target, %status, ?latency, "request rejected");
    } else {
        info!(route, target, %status, ?latency, "request served");
    }
}
