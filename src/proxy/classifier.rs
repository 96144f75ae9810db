//! Content classifier (C4): decide whether a fetched body is an HLS
//! playlist, and pick a MIME type for media resources by URL suffix.

/// True if the response should be treated as an HLS playlist and run
/// through the rewriter rather than streamed through as-is.
pub fn is_playlist(content_type: Option<&str>, url: &str, body: Option<&str>) -> bool {
    if let Some(ct) = content_type {
        let lower = ct.to_ascii_lowercase();
        if lower.contains("mpegurl") || lower.contains("m3u") {
            return true;
        }
    }

    let path = url.split('?').next().unwrap_or(url);
    let lower_path = path.to_ascii_lowercase();
    if lower_path.ends_with(".m3u8") || lower_path.ends_with(".m3u") {
        return true;
    }

    if let Some(body) = body {
        let trimmed = body.trim_start();
        if trimmed.starts_with("#EXTM3U") || body.contains("#EXT-X-") {
            return true;
        }
    }

    false
}

/// Canonical MIME type for a media resource, inferred from the URL's
/// path suffix. Falls back to `fallback` (typically the upstream's own
/// `Content-Type`), then to `application/octet-stream`.
pub fn media_mime(url: &str, fallback: Option<&str>) -> String {
    let path = url.split('?').next().unwrap_or(url).to_ascii_lowercase();

    let suffix_mime = [
        (".ts", "video/mp2t"),
        (".aac", "audio/aac"),
        (".fmp4", "video/mp4"),
        (".m4s", "video/mp4"),
        (".mp4", "video/mp4"),
        (".m4a", "audio/mp4"),
        (".mp3", "audio/mpeg"),
        (".webvtt", "text/vtt"),
        (".vtt", "text/vtt"),
        (".srt", "text/plain"),
        (".key", "application/octet-stream"),
        (".json", "application/json"),
        (".xml", "application/xml"),
        (".jpeg", "image/jpeg"),
        (".jpg", "image/jpeg"),
        (".png", "image/png"),
        (".webp", "image/webp"),
        (".gif", "image/gif"),
        (".woff2", "font/woff2"),
        (".woff", "font/woff"),
    ]
    .iter()
    .find(|(suffix, _)| path.ends_with(suffix))
    .map(|(_, mime)| *mime);

    suffix_mime
        .or(fallback)
        .unwrap_or("application/octet-stream")
        .to_string()
}
