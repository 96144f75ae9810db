//! HTTP-level integration tests driving the router end to end with a
//! mock transport, covering the channel and resource routes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use tower::ServiceExt;

use hls_proxy::proxy::codec;
use hls_proxy::proxy::fetcher::{
    FetchResponse, ResponseBody, RetryConfig, Transport, TransportError, UpstreamFetcher,
};
use hls_proxy::registry::{Channel, InMemoryChannelRegistry};
use hls_proxy::web::{self, AppState};

/// Maps an upstream URL to a canned response, and counts calls per URL
/// so tests can assert retry behavior.
struct ScriptedTransport {
    responses: HashMap<String, (StatusCode, Option<&'static str>, &'static str)>,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        url: &str,
        _headers: HeaderMap,
    ) -> Result<FetchResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (status, content_type, body) = self
            .responses
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError(format!("no scripted response for {url}")))?;

        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderValue::from_static(ct),
            );
        }
        headers.insert(
            axum::http::header::CONTENT_LENGTH,
            axum::http::HeaderValue::from_str(&body.len().to_string()).unwrap(),
        );

        Ok(FetchResponse {
            status,
            headers,
            final_url: url.to_string(),
            body: ResponseBody::Fixed(Bytes::from_static(body.as_bytes())),
        })
    }
}

fn test_app(responses: Vec<(&str, StatusCode, Option<&'static str>, &'static str)>) -> Router {
    let registry = InMemoryChannelRegistry::from_channels(vec![
        Channel {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            source_url: "https://cdn.example.com/a/b/live.m3u8".to_string(),
            headers: HashMap::new(),
        },
        Channel {
            id: "raw".to_string(),
            name: "Raw".to_string(),
            source_url: "https://cdn.example.com/raw.mp4".to_string(),
            headers: HashMap::new(),
        },
    ]);

    let transport = ScriptedTransport {
        responses: responses
            .into_iter()
            .map(|(url, status, ct, body)| (url.to_string(), (status, ct, body)))
            .collect(),
        calls: Arc::new(AtomicU32::new(0)),
    };
    let fetcher = UpstreamFetcher::new(Box::new(transport), RetryConfig::default());

    let config = hls_proxy::config::Config {
        web: hls_proxy::config::WebConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        },
        proxy: hls_proxy::config::ProxyConfig {
            public_origin: Some("http://p".to_string()),
            channels_file: "unused.toml".into(),
        },
        fetch: hls_proxy::config::FetchConfig {
            timeout_secs: 18,
            max_attempts: 3,
        },
    };

    let state = AppState::new(Arc::new(registry), Arc::new(fetcher), &config);
    web::router(state)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn scenario_1_rewrites_bare_segment_line() {
    let app = test_app(vec![(
        "https://cdn.example.com/a/b/live.m3u8",
        StatusCode::OK,
        Some("application/vnd.apple.mpegurl"),
        "#EXTM3U\n#EXTINF:6,\nseg1.ts\n",
    )]);

    let (status, body) = get(&app, "/api/proxy/demo.m3u8").await;
    assert_eq!(status, StatusCode::OK);
    let token = codec::encode("https://cdn.example.com/a/b/seg1.ts");
    assert_eq!(
        body,
        format!("#EXTM3U\n#EXTINF:6,\nhttp://p/api/proxy/s?url={token}\n")
    );
}

#[tokio::test]
async fn scenario_3_media_segment_streams_through_with_cache_headers() {
    let app = test_app(vec![(
        "https://cdn.example.com/a/b/seg1.ts",
        StatusCode::OK,
        Some("video/mp2t"),
        "segment-bytes",
    )]);

    let token = codec::encode("https://cdn.example.com/a/b/seg1.ts");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/proxy/s?url={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "video/mp2t"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=600, immutable"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"segment-bytes");
}

#[tokio::test]
async fn scenario_4_unknown_channel_is_404_with_hls_body() {
    let app = test_app(vec![]);
    let (status, body) = get(&app, "/api/proxy/unknown.m3u8").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "#EXTM3U\n#EXT-X-ERROR:Channel not found");
}

#[tokio::test]
async fn scenario_5_invalid_scheme_is_400() {
    let app = test_app(vec![]);
    // base64url("not-a-url")
    let (status, body) = get(&app, "/api/proxy/s?url=bm90LWEtdXJs").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid URL scheme");
}

#[tokio::test]
async fn scenario_6_non_hls_channel_source_synthesizes_four_line_master() {
    let app = test_app(vec![(
        "https://cdn.example.com/raw.mp4",
        StatusCode::OK,
        Some("video/mp4"),
        "binary-stand-in",
    )]);

    let (status, body) = get(&app, "/api/proxy/raw.m3u8").await;
    assert_eq!(status, StatusCode::OK);
    let token = codec::encode("https://cdn.example.com/raw.mp4");
    assert_eq!(
        body,
        format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=0\nhttp://p/api/proxy/s?url={token}")
    );
}

#[tokio::test]
async fn unknown_route_under_prefix_is_404() {
    let app = test_app(vec![]);
    let (status, body) = get(&app, "/api/proxy/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Unknown proxy route");
}

#[tokio::test]
async fn options_preflight_gets_cors_headers() {
    let app = test_app(vec![]);
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/proxy/demo.m3u8")
                .header("origin", "https://player.example.com")
                .header("access-control-request-method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}
