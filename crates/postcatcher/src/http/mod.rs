//! The HTTP/JSON/WebSocket surface (§4.G): one `axum::Router<Arc<Server>>`
//! assembled from `routes`, wrapped in the request tracing span, the auth
//! gate, and the two response-shaping layers. Auth sits outside envelope
//! and the `Server` header so it gates a request before any handler runs;
//! envelope is innermost so it sees each handler's raw response first.

mod middleware;
mod render;
mod routes;
mod ws;

use crate::server::Server;
use axum::middleware::from_fn;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/ws", get(ws::upgrade))
        .route("/api", delete(routes::terminate))
        .route(
            "/api/messages/",
            get(routes::list_messages).delete(routes::delete_all_messages),
        )
        .route(
            "/api/messages/{id}.json",
            get(routes::get_message_json),
        )
        .route("/api/messages/{id}", delete(routes::delete_message))
        .route("/api/messages/{id}.plain", get(routes::get_message_plain))
        .route("/api/messages/{id}.html", get(routes::get_message_html))
        .route(
            "/api/messages/{id}.source",
            get(routes::get_message_source),
        )
        .route("/api/messages/{id}.eml", get(routes::get_message_eml))
        .route(
            "/api/messages/{id}/parts/{cid}",
            get(routes::get_message_part),
        )
        .layer(from_fn(middleware::envelope))
        .layer(from_fn(middleware::server_header))
        .layer(from_fn_with_state(server.clone(), middleware::basic_auth))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}
