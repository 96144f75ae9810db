//! Resource proxy handler (C7): decode the encoded-URL token, enforce
//! scheme policy, fetch, and either rewrite (playlist) or stream
//! through (media) the response.

use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::StatusCode;

use crate::errors::ProxyError;
use crate::proxy::fetcher::UpstreamFetcher;
use crate::proxy::{classifier, codec, rewriter};

pub enum ResourceOutcome {
    Playlist {
        status: StatusCode,
        body: String,
    },
    Media {
        status: StatusCode,
        content_type: String,
        content_length: Option<u64>,
        stream: BoxStream<'static, reqwest::Result<Bytes>>,
    },
    Error {
        status: StatusCode,
        body: String,
    },
}

/// Render a `ProxyError` into an outcome, using the real upstream body
/// for a mirrored 4xx (`UpstreamClientError`) rather than the generic
/// short reason text.
fn error_outcome(err: &ProxyError) -> ResourceOutcome {
    let body = match err {
        ProxyError::UpstreamClientError { body, .. } => body.clone(),
        other => other.reason(),
    };
    ResourceOutcome::Error {
        status: err.status(),
        body,
    }
}

pub async fn handle(
    fetcher: &UpstreamFetcher,
    url_token: &str,
    headers_token: Option<&str>,
    proxy_origin: &str,
) -> ResourceOutcome {
    let target_url = match codec::decode(url_token) {
        Some(url) => url,
        None => return error_outcome(&ProxyError::bad_request("Invalid URL encoding")),
    };

    if !target_url.starts_with("http://") && !target_url.starts_with("https://") {
        return error_outcome(&ProxyError::bad_request("Invalid URL scheme"));
    }

    // Malformed `h` degrades to "no custom headers" rather than failing the request.
    let custom_headers = headers_token
        .and_then(codec::decode_headers)
        .unwrap_or_default();

    let response = match fetcher.fetch(&target_url, &custom_headers).await {
        Ok(response) => response,
        Err(err) => return error_outcome(&err),
    };

    if response.status.is_client_error() {
        // Mirror 4xx so auth/geo failures upstream remain visible to the client.
        let status = response.status;
        let body = response
            .body
            .text()
            .await
            .unwrap_or_else(|_| String::new());
        return error_outcome(&ProxyError::UpstreamClientError { status, body });
    }

    if !response.status.is_success() {
        return error_outcome(&ProxyError::upstream_server_error(format!(
            "Upstream {}",
            response.status
        )));
    }

    let content_type = response
        .headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let final_url = response.final_url.clone();

    if classifier::is_playlist(content_type.as_deref(), &final_url, None) {
        let body_text = match response.body.text().await {
            Ok(text) => text,
            Err(err) => {
                return error_outcome(&ProxyError::upstream_server_error(err.to_string()))
            }
        };
        let rewritten = rewriter::rewrite(&body_text, &final_url, proxy_origin, headers_token);
        ResourceOutcome::Playlist {
            status: StatusCode::OK,
            body: rewritten,
        }
    } else {
        let content_length = response
            .headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let media_content_type = classifier::media_mime(&final_url, content_type.as_deref());
        ResourceOutcome::Media {
            status: StatusCode::OK,
            content_type: media_content_type,
            content_length,
            stream: response.body.into_byte_stream(),
        }
    }
}
