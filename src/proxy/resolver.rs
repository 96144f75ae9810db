//! URL resolver (C2): resolve a playlist-embedded URI against the
//! playlist's base URL, producing an absolute URL.
//!
//! Never fails — an unparseable base URL falls back to plain string
//! concatenation rather than rejecting the whole request.

use url::Url;

/// Resolve `uri` (as it appeared in a playlist) against `base` (the URL
/// that delivered the playlist containing it).
pub fn resolve(uri: &str, base: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }

    if let Some(rest) = uri.strip_prefix("//") {
        return format!("https://{rest}");
    }

    if let Some(path) = uri.strip_prefix('/') {
        let authority = scheme_and_authority(base);
        return format!("{authority}/{path}");
    }

    let directory = directory_url(base);
    format!("{directory}{uri}")
}

/// `scheme://host[:port]` of `base`, falling back to string scanning
/// when `base` does not parse as a URL.
fn scheme_and_authority(base: &str) -> String {
    if let Ok(parsed) = Url::parse(base) {
        format!(
            "{}://{}",
            parsed.scheme(),
            parsed.host_str().map(|h| match parsed.port() {
                Some(port) => format!("{h}:{port}"),
                None => h.to_string(),
            }).unwrap_or_default()
        )
    } else {
        // Fall back to everything up to the third '/' (scheme://host).
        let mut slashes = 0;
        for (idx, ch) in base.char_indices() {
            if ch == '/' {
                slashes += 1;
                if slashes == 3 {
                    return base[..idx].to_string();
                }
            }
        }
        base.to_string()
    }
}

/// The "directory" of `base`: query/fragment stripped, then truncated at
/// the last `/` past the authority, keeping the trailing slash.
///
/// Stripping the query before finding the last `/` is the behavior this
/// proxy relies on (see the query-string design note on `getBaseUrl`);
/// the alternative mis-resolves relative URIs whenever the playlist URL
/// itself carries a query string.
fn directory_url(base: &str) -> String {
    let without_fragment = base.split('#').next().unwrap_or(base);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);

    match without_query.rfind('/') {
        Some(idx) => {
            // Don't truncate into the `//` of `scheme://`.
            let scheme_end = without_query.find("://").map(|i| i + 3).unwrap_or(0);
            if idx < scheme_end {
                format!("{without_query}/")
            } else {
                without_query[..=idx].to_string()
            }
        }
        None => format!("{without_query}/"),
    }
}
