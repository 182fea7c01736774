//! Bounded queue plus a single worker task that POSTs a JSON summary of
//! each new message to a configured URL (§4.F). Disabled entirely when no
//! URL is configured: `Webhook::disabled()` returns a sender whose queue is
//! never drained, and callers never learn the difference.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

const QUEUE_CAPACITY: usize = 256;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub message_id: i64,
    pub sender_envelope: String,
    pub sender_message: String,
    pub recipients_envelope: Vec<String>,
    pub recipients_message_to: Vec<String>,
    pub recipients_message_cc: Vec<String>,
    pub recipients_message_bcc: Vec<String>,
    pub subject: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: i64,
    pub peer: String,
}

#[derive(Clone)]
pub struct Webhook {
    queue: Option<mpsc::Sender<WebhookPayload>>,
}

impl Webhook {
    /// Builds the client and spawns the worker task if `url` is set.
    /// Returns the handle and, when active, the worker's `JoinHandle` so
    /// the caller can cancel it at shutdown.
    pub fn spawn(
        url: Option<String>,
        method: String,
        auth: Option<String>,
    ) -> (Self, Option<tokio::task::JoinHandle<()>>) {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return (Self { queue: None }, None);
        };

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(TOTAL_TIMEOUT)
            .build()
            .expect("reqwest client to build");

        let method = reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::POST);
        let basic_auth = auth.and_then(|raw| raw.split_once(':').map(|(u, p)| (u.to_string(), p.to_string())));

        let (tx, mut rx) = mpsc::channel::<WebhookPayload>(QUEUE_CAPACITY);

        let worker = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let mut request = client
                    .request(method.clone(), &url)
                    .header("User-Agent", concat!("postcatcher/", env!("CARGO_PKG_VERSION")))
                    .json(&payload);

                if let Some((user, pass)) = &basic_auth {
                    request = request.basic_auth(user, Some(pass));
                }

                match request.send().await {
                    Ok(resp) if resp.status().is_success() => {
                        tracing::debug!(message_id = payload.message_id, "webhook delivered");
                    }
                    Ok(resp) => {
                        tracing::warn!(
                            message_id = payload.message_id,
                            status = resp.status().as_u16(),
                            "webhook responded with a non-2xx status"
                        );
                    }
                    Err(err) => {
                        tracing::error!(message_id = payload.message_id, %err, "webhook delivery failed");
                    }
                }
            }
        });

        (Self { queue: Some(tx) }, Some(worker))
    }

    pub fn disabled() -> Self {
        Self { queue: None }
    }

    /// Non-blocking; silently dropped if disabled or the queue is full.
    pub fn enqueue(&self, payload: WebhookPayload) {
        if let Some(queue) = &self.queue {
            if queue.try_send(payload).is_err() {
                tracing::warn!("webhook queue full, dropping payload");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use axum::routing::post;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn sample(id: i64) -> WebhookPayload {
        WebhookPayload {
            message_id: id,
            sender_envelope: "a@b".into(),
            sender_message: "a@b".into(),
            recipients_envelope: vec!["c@d".into()],
            recipients_message_to: vec!["c@d".into()],
            recipients_message_cc: vec![],
            recipients_message_bcc: vec![],
            subject: "Hi".into(),
            content_type: "text/plain".into(),
            size: 20,
            peer: "127.0.0.1:1234".into(),
        }
    }

    #[tokio::test]
    async fn disabled_enqueue_is_a_silent_no_op() {
        let webhook = Webhook::disabled();
        webhook.enqueue(sample(1));
    }

    /// A webhook endpoint that always answers 500 must not take down the
    /// worker: a second item enqueued afterward is still delivered.
    #[tokio::test]
    async fn non_2xx_responses_do_not_stop_the_worker() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = axum::Router::new().route(
            "/hook",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (webhook, worker) = Webhook::spawn(
            Some(format!("http://{addr}/hook")),
            "POST".to_string(),
            None,
        );
        webhook.enqueue(sample(1));
        webhook.enqueue(sample(2));

        for _ in 0..50 {
            if hits.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        worker.unwrap().abort();
    }
}
