//! Channel entry handler (C6): resolve a channel id through the
//! registry, fetch its source, and either rewrite it (if it is a
//! playlist) or wrap it in a synthesized master playlist.

use reqwest::StatusCode;

use crate::errors::ProxyError;
use crate::proxy::codec;
use crate::proxy::{classifier, fetcher::UpstreamFetcher, rewriter};
use crate::registry::ChannelRegistry;

/// Always HLS-shaped: a status plus an `#EXTM3U`-rooted body, so a
/// player surfaces even error conditions in its own idiom.
pub struct ChannelOutcome {
    pub status: StatusCode,
    pub body: String,
}

fn error_outcome(err: &ProxyError) -> ChannelOutcome {
    ChannelOutcome {
        status: err.status(),
        body: format!("#EXTM3U\n#EXT-X-ERROR:{}", err.reason()),
    }
}

pub async fn handle(
    registry: &dyn ChannelRegistry,
    fetcher: &UpstreamFetcher,
    channel_id: &str,
    proxy_origin: &str,
) -> ChannelOutcome {
    let channel = match registry.get(channel_id) {
        Some(channel) => channel,
        None => return error_outcome(&ProxyError::not_found("Channel not found")),
    };

    let headers_token = if channel.headers.is_empty() {
        None
    } else {
        Some(codec::encode_headers(&channel.headers))
    };

    let response = match fetcher.fetch(&channel.source_url, &channel.headers).await {
        Ok(response) => response,
        Err(err) => return error_outcome(&err),
    };

    if !response.status.is_success() {
        return error_outcome(&ProxyError::upstream_server_error(format!(
            "Upstream {}",
            response.status
        )));
    }

    let content_type = content_type_header(&response.headers);
    let final_url = response.final_url.clone();

    let body_text = match response.body.text().await {
        Ok(text) => text,
        Err(err) => return error_outcome(&ProxyError::upstream_server_error(err.to_string())),
    };

    if classifier::is_playlist(content_type.as_deref(), &final_url, Some(&body_text)) {
        let rewritten = rewriter::rewrite(
            &body_text,
            &final_url,
            proxy_origin,
            headers_token.as_deref(),
        );
        ChannelOutcome {
            status: StatusCode::OK,
            body: rewritten,
        }
    } else {
        ChannelOutcome {
            status: StatusCode::OK,
            body: synthesize_master_playlist(&final_url, proxy_origin, headers_token.as_deref()),
        }
    }
}

fn synthesize_master_playlist(
    source_url: &str,
    proxy_origin: &str,
    headers_token: Option<&str>,
) -> String {
    let token = codec::encode(source_url);
    let resource_url = match headers_token {
        Some(h) => format!("{proxy_origin}/api/proxy/s?url={token}&h={h}"),
        None => format!("{proxy_origin}/api/proxy/s?url={token}"),
    };
    format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-STREAM-INF:BANDWIDTH=0\n{resource_url}")
}

fn content_type_header(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
