//! Playlist rewriter (C5): parse an HLS playlist line-by-line and
//! rewrite every URI (bare URI lines and `URI="…"` attributes) to go
//! through the resource proxy endpoint.
//!
//! A strictly line-oriented, tag-unaware rewriter is sufficient because
//! HLS places URIs only on bare URI lines and inside quoted `URI="…"`
//! attributes; every other tag payload is left untouched. This keeps
//! the rewriter independent of the HLS tag grammar's evolution.

use std::sync::OnceLock;

use regex::Regex;

use crate::proxy::{codec, resolver};

fn uri_attr_re() -> &'static Regex {
    static URI_ATTR: OnceLock<Regex> = OnceLock::new();
    URI_ATTR.get_or_init(|| Regex::new(r#"(?i)URI\s*=\s*"([^"]*)""#).expect("valid regex"))
}

/// Rewrite a playlist body so every embedded URI points at the resource
/// proxy endpoint under `proxy_origin`.
pub fn rewrite(content: &str, base: &str, proxy_origin: &str, headers_token: Option<&str>) -> String {
    let trailing_newline = content.ends_with('\n');
    let mut lines: Vec<&str> = content.split('\n').collect();
    if trailing_newline {
        // split('\n') on a trailing newline yields a spurious empty
        // final element; drop it so we don't emit an extra blank line.
        lines.pop();
    }

    let rewritten_lines: Vec<String> = lines
        .into_iter()
        .map(|line| rewrite_line(line, base, proxy_origin, headers_token))
        .collect();

    let mut out = rewritten_lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

fn rewrite_line(line: &str, base: &str, proxy_origin: &str, headers_token: Option<&str>) -> String {
    let trimmed = line.trim_end();

    if trimmed.trim_start().starts_with('#') && uri_attr_re().is_match(trimmed) {
        uri_attr_re()
            .replace_all(trimmed, |caps: &regex::Captures| {
                let uri = &caps[1];
                let proxied = proxied_url(uri, base, proxy_origin, headers_token);
                format!(r#"URI="{proxied}""#)
            })
            .into_owned()
    } else if trimmed.trim_start().starts_with('#') || trimmed.trim().is_empty() {
        trimmed.to_string()
    } else {
        proxied_url(trimmed.trim(), base, proxy_origin, headers_token)
    }
}

fn proxied_url(uri: &str, base: &str, proxy_origin: &str, headers_token: Option<&str>) -> String {
    let absolute = resolver::resolve(uri, base);
    let token = codec::encode(&absolute);
    match headers_token {
        Some(h) => format!("{proxy_origin}/api/proxy/s?url={token}&h={h}"),
        None => format!("{proxy_origin}/api/proxy/s?url={token}"),
    }
}
