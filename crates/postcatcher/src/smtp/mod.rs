//! SMTP receiver (§4.C): accepts connections and spawns one session task
//! per connection, mirroring the one-goroutine-per-connection mapping
//! described for thread-based runtimes.

mod session;

use crate::server::Server;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub async fn serve(
    listener: TcpListener,
    server: Arc<Server>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(%err, "accept failed");
                        continue;
                    }
                };
                let server = server.clone();
                let session_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    session::run(stream, peer, server, session_shutdown).await;
                });
            }
            _ = shutdown.changed() => {
                tracing::info!("SMTP listener shutting down");
                break;
            }
        }
    }
}
