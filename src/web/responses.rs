//! Response builders shared by the two proxy routes.
//!
//! Playlist and error bodies are small, UTF-8 text; media bodies are
//! forwarded as a byte stream so the first chunk reaches the client as
//! soon as it arrives from upstream rather than after full buffering.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::BoxStream;

pub fn playlist_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        body,
    )
        .into_response()
}

pub fn plain_text_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
}

pub fn media_response(
    status: StatusCode,
    content_type: String,
    content_length: Option<u64>,
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
) -> Response {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=600, immutable");

    if let Some(len) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, len);
    }

    builder
        .body(Body::from_stream(stream))
        .expect("response with known headers and streamed body")
}
