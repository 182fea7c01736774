//! WebSocket upgrade endpoint (`GET /ws`, §4.G). Client frames are
//! ignored; the socket exists purely to receive broadcast events.

use crate::broadcast::PeerMessage;
use crate::server::Server;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use std::sync::Arc;

pub async fn upgrade(
    State(server): State<Arc<Server>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, server))
}

async fn handle_socket(mut socket: WebSocket, server: Arc<Server>) {
    let mut peer = server.broadcast.register().await;
    loop {
        tokio::select! {
            outgoing = peer.rx.recv() => {
                let sent = match outgoing {
                    Some(PeerMessage::Text(text)) => socket.send(Message::Text(text.into())).await,
                    Some(PeerMessage::Ping) => socket.send(Message::Ping(Vec::new().into())).await,
                    None => break,
                };
                if sent.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
    // `peer` drops here, unregistering itself from the broadcast bus.
}
