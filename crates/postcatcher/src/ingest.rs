//! Thin orchestrator glueing decode → persist → notify → enqueue webhook
//! (§4.D). Called from the SMTP receiver after `DATA` and exercised
//! directly by tests.

use crate::decode::decode;
use crate::error::{DecodeError, StoreError};
use crate::server::Server;
use crate::store::{NewMessage, NewPart};
use crate::webhook::WebhookPayload;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Envelope {
    pub sender: String,
    pub recipients: Vec<String>,
    pub peer: String,
    pub source: Vec<u8>,
}

/// Decodes, persists, and fans out a single SMTP transaction. Step 2 (the
/// store commit) is the only step whose failure is returned to the
/// caller; broadcast and webhook failures are logged and swallowed so they
/// never make an otherwise-successful ingest look like a failure.
pub async fn ingest(server: &Server, envelope: Envelope) -> Result<i64, IngestError> {
    let decoded = decode(&envelope.source)?;

    let parts = decoded
        .parts
        .into_iter()
        .map(|p| NewPart {
            cid: p.cid,
            content_type: p.content_type,
            is_attachment: p.is_attachment,
            filename: p.filename,
            charset: p.charset,
            body: p.body,
        })
        .collect();

    let new_message = NewMessage {
        sender_envelope: envelope.sender.clone(),
        recipients_envelope: envelope.recipients.clone(),
        peer: envelope.peer.clone(),
        source: envelope.source.clone(),
        sender_message: decoded.sender_message.clone(),
        recipients_message_to: decoded.recipients_to.clone(),
        recipients_message_cc: decoded.recipients_cc.clone(),
        recipients_message_bcc: decoded.recipients_bcc.clone(),
        subject: decoded.subject.clone(),
        content_type: decoded.content_type.clone(),
        parts,
    };

    let size = new_message.source.len() as i64;
    let id = server.store.add(new_message).await?;

    server
        .broadcast
        .publish("add_message", &[id.to_string().as_str()])
        .await;

    server.webhook.enqueue(WebhookPayload {
        message_id: id,
        sender_envelope: envelope.sender,
        sender_message: decoded.sender_message,
        recipients_envelope: envelope.recipients,
        recipients_message_to: decoded.recipients_to,
        recipients_message_cc: decoded.recipients_cc,
        recipients_message_bcc: decoded.recipients_bcc,
        subject: decoded.subject,
        content_type: decoded.content_type,
        size,
        peer: envelope.peer,
    });

    Ok(id)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::broadcast::{Broadcast, PeerMessage};
    use crate::server::Server;
    use crate::store::Store;
    use crate::webhook::Webhook;

    fn plain_message() -> Vec<u8> {
        b"Subject: Hi\r\nFrom: a@b\r\nTo: c@d\r\n\r\nhello\r\n".to_vec()
    }

    fn envelope(source: Vec<u8>) -> Envelope {
        Envelope {
            sender: "a@b".into(),
            recipients: vec!["c@d".into()],
            peer: "127.0.0.1:9".into(),
            source,
        }
    }

    #[tokio::test]
    async fn persists_and_broadcasts_before_returning() {
        let (server, tasks) = Server::for_test();
        let mut peer = server.broadcast.register().await;

        let id = ingest(&server, envelope(plain_message())).await.unwrap();

        let msg = server.store.get(id).await.unwrap().unwrap();
        assert_eq!(msg.subject, "Hi");
        assert_eq!(msg.size, plain_message().len() as i64);

        match peer.rx.recv().await.unwrap() {
            PeerMessage::Text(text) => assert_eq!(text, format!("add_message,{id}")),
            PeerMessage::Ping => panic!("expected the add_message text frame"),
        }
        tasks.abort_all();
    }

    #[tokio::test]
    async fn malformed_message_is_rejected_without_persisting() {
        let (server, tasks) = Server::for_test();
        let bad = concat!(
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "not valid base64 !!!\r\n",
        );

        let err = ingest(&server, envelope(bad.as_bytes().to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
        assert!(server.store.list().await.unwrap().is_empty());

        tasks.abort_all();
    }

    /// A webhook endpoint answering every request with 500 must not make an
    /// otherwise-successful ingest look like a failure.
    #[tokio::test]
    async fn ingest_succeeds_despite_webhook_failure() {
        let app = axum::Router::new().route(
            "/hook",
            axum::routing::post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let store = Store::open(":memory:").unwrap();
        let (broadcast, drainer, ping) = Broadcast::spawn();
        let (webhook, worker) = Webhook::spawn(Some(format!("http://{addr}/hook")), "POST".into(), None);
        let server = Server {
            store,
            broadcast,
            webhook,
            smtp_auth: None,
            http_auth: None,
            smtp_ident: "postcatcher".into(),
            no_quit: false,
            no_clear: false,
        };

        let id = ingest(&server, envelope(plain_message())).await.unwrap();
        assert!(server.store.get(id).await.unwrap().is_some());

        drainer.abort();
        ping.abort();
        if let Some(worker) = worker {
            worker.abort();
        }
    }
}
