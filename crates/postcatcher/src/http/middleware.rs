//! The three cross-cutting layers from §4.G, each its own `from_fn`
//! middleware: response enveloping, the `Server:` header, and the Basic
//! auth gate. Domain error mapping lives on [`crate::error::ApiError`]'s
//! `IntoResponse` impl instead of a fourth layer, since axum's error
//! handling is naturally per-handler rather than per-response-body.
//!
//! Enveloping decides "is this raw?" from a [`RawResponse`] marker set by
//! the handler, not from `Content-Type`, since a stored part's own MIME
//! type can legitimately be `application/json`.

use crate::server::Server;
use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

const MAX_BODY: usize = 64 * 1024 * 1024;

/// Marker stashed in a response's extensions by handlers that return a raw
/// body (`.plain`/`.html`/`.source`/`.eml`/message parts) so the envelope
/// layer can bypass them regardless of their content type, matching the
/// original's bypass of every `StreamResponse` rather than sniffing
/// `Content-Type`.
#[derive(Clone, Copy)]
pub struct RawResponse;

/// Marks `response` as raw so [`envelope`] passes it through untouched.
pub fn mark_raw(response: &mut Response) {
    response.extensions_mut().insert(RawResponse);
}

/// Wraps any handler-returned JSON value whose top-level object doesn't
/// already carry a `code` field in `{"code":"OK","data":<body>}`. Responses
/// marked via [`mark_raw`] pass through untouched, matching the original's
/// `StreamResponse` bypass.
pub async fn envelope(req: Request<Body>, next: Next) -> Response {
    let response = next.run(req).await;

    if response.extensions().get::<RawResponse>().is_some() {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    let enveloped = match &value {
        serde_json::Value::Object(map) if map.contains_key("code") => value,
        _ => serde_json::json!({ "code": "OK", "data": value }),
    };

    let body = serde_json::to_vec(&enveloped).unwrap_or_default();
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(body))
}

pub async fn server_header(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    response.headers_mut().insert(
        header::SERVER,
        header::HeaderValue::from_static(concat!("postcatcher/", env!("CARGO_PKG_VERSION"))),
    );
    response
}

pub async fn basic_auth(State(server): State<Arc<Server>>, req: Request<Body>, next: Next) -> Response {
    let Some(auth_file) = &server.http_auth else {
        return next.run(req).await;
    };

    fn unauthorized() -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, "authentication required").into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            header::HeaderValue::from_static("Basic realm=\"postcatcher\""),
        );
        response
    }

    let Some(header_value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return unauthorized();
    };
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return unauthorized();
    };
    let Ok(decoded) = data_encoding::BASE64.decode(encoded.as_bytes()) else {
        return unauthorized();
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return unauthorized();
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return unauthorized();
    };

    if auth_file.check_password(user, pass) {
        next.run(req).await
    } else {
        unauthorized()
    }
}
