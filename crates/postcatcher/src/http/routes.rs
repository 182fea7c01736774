use crate::error::ApiError;
use crate::http::middleware::mark_raw;
use crate::http::render::{part_url, rewrite_html};
use crate::server::Server;
use crate::store::{Message, MessagePart};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

const HTML_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];
const PLAIN_TYPES: &[&str] = &["text/plain"];

pub async fn home() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<!doctype html><html><body><p>postcatcher is running. \
         See /api/messages/ for the JSON API.</p></body></html>",
    )
}

pub async fn terminate(State(server): State<Arc<Server>>) -> Result<Json<serde_json::Value>, ApiError> {
    if server.no_quit {
        return Err(ApiError::Forbidden);
    }
    tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        std::process::exit(0);
    });
    Ok(Json(serde_json::json!({})))
}

pub async fn list_messages(
    State(server): State<Arc<Server>>,
) -> Result<Json<Vec<serde_json::Value>>, ApiError> {
    let messages = server.store.list().await.map_err(ApiError::Store)?;
    Ok(Json(messages.iter().map(message_to_json).collect()))
}

pub async fn delete_all_messages(
    State(server): State<Arc<Server>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if server.no_clear {
        return Err(ApiError::Forbidden);
    }
    server.store.delete_all().await.map_err(ApiError::Store)?;
    server.broadcast.publish("delete_messages", &[]).await;
    Ok(Json(serde_json::json!({})))
}

pub async fn get_message_json(
    State(server): State<Arc<Server>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = server
        .store
        .get(id)
        .await
        .map_err(ApiError::Store)?
        .ok_or(ApiError::MessageNotFound)?;

    let mut value = message_to_json(&message);
    let obj = value.as_object_mut().expect("message_to_json returns an object");

    obj.insert(
        "href".to_string(),
        serde_json::json!(format!("/api/messages/{id}.eml")),
    );

    let mut formats = serde_json::json!({ "source": format!("/api/messages/{id}.source") });
    if server
        .store
        .has_any_type(id, PLAIN_TYPES)
        .await
        .map_err(ApiError::Store)?
    {
        formats["plain"] = serde_json::json!(format!("/api/messages/{id}.plain"));
    }
    if server
        .store
        .has_any_type(id, HTML_TYPES)
        .await
        .map_err(ApiError::Store)?
    {
        formats["html"] = serde_json::json!(format!("/api/messages/{id}.html"));
    }
    obj.insert("formats".to_string(), formats);

    let attachments = server.store.attachments(id).await.map_err(ApiError::Store)?;
    obj.insert(
        "attachments".to_string(),
        serde_json::Value::Array(
            attachments
                .iter()
                .map(|part| attachment_to_json(id, part))
                .collect(),
        ),
    );

    Ok(Json(value))
}

pub async fn delete_message(
    State(server): State<Arc<Server>>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let message = server.store.get(id).await.map_err(ApiError::Store)?;
    if message.is_none() {
        return Err(ApiError::MessageNotFound);
    }
    server.store.delete(id).await.map_err(ApiError::Store)?;
    server
        .broadcast
        .publish("delete_message", &[id.to_string().as_str()])
        .await;
    Ok(Json(serde_json::json!({})))
}

pub async fn get_message_plain(
    State(server): State<Arc<Server>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let part = server
        .store
        .get_first_part_by_types(id, PLAIN_TYPES)
        .await
        .map_err(ApiError::Store)?
        .ok_or(ApiError::PartNotFound)?;
    Ok(part_response(&part, "text/plain; charset=utf-8"))
}

pub async fn get_message_html(
    State(server): State<Arc<Server>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let part = server
        .store
        .get_first_part_by_types(id, HTML_TYPES)
        .await
        .map_err(ApiError::Store)?
        .ok_or(ApiError::PartNotFound)?;

    let html = String::from_utf8_lossy(&part.body).into_owned();
    let rewritten = rewrite_html(&html, id);
    let mut response = (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        rewritten,
    )
        .into_response();
    mark_raw(&mut response);
    Ok(response)
}

pub async fn get_message_source(
    State(server): State<Arc<Server>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let message = server
        .store
        .get(id)
        .await
        .map_err(ApiError::Store)?
        .ok_or(ApiError::MessageNotFound)?;
    let mut response = (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message.source,
    )
        .into_response();
    mark_raw(&mut response);
    Ok(response)
}

pub async fn get_message_eml(
    State(server): State<Arc<Server>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let message = server
        .store
        .get(id)
        .await
        .map_err(ApiError::Store)?
        .ok_or(ApiError::MessageNotFound)?;
    let mut response = (
        [(header::CONTENT_TYPE, "message/rfc822")],
        message.source,
    )
        .into_response();
    mark_raw(&mut response);
    Ok(response)
}

pub async fn get_message_part(
    State(server): State<Arc<Server>>,
    Path((id, cid)): Path<(i64, String)>,
) -> Result<Response, ApiError> {
    let part = server
        .store
        .get_part_by_cid(id, cid)
        .await
        .map_err(ApiError::Store)?
        .ok_or(ApiError::PartNotFound)?;
    Ok(part_response(&part, &part.content_type))
}

fn part_response(part: &MessagePart, content_type: &str) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type.to_string())],
        part.body.clone(),
    )
        .into_response();
    mark_raw(&mut response);
    response
}

fn message_to_json(message: &Message) -> serde_json::Value {
    serde_json::json!({
        "id": message.id,
        "sender_envelope": message.sender_envelope,
        "sender_message": message.sender_message,
        "recipients_envelope": message.recipients_envelope,
        "recipients_message_to": message.recipients_message_to,
        "recipients_message_cc": message.recipients_message_cc,
        "recipients_message_bcc": message.recipients_message_bcc,
        "subject": message.subject,
        "type": message.content_type,
        "size": message.size,
        "peer": message.peer,
        "created_at": message.created_at.to_rfc3339(),
    })
}

fn attachment_to_json(message_id: i64, part: &MessagePart) -> serde_json::Value {
    serde_json::json!({
        "message_id": message_id,
        "cid": part.cid,
        "type": part.content_type,
        "filename": part.filename,
        "size": part.size,
        "href": part_url(message_id, &part.cid),
    })
}
