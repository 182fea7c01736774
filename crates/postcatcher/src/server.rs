//! The single `Server` value: no process-wide singletons, one value built
//! once in `main` (or by a test) and shared behind an `Arc` with every SMTP
//! session and every HTTP handler.

use crate::broadcast::Broadcast;
use crate::config::Opt;
use crate::htpasswd::HtpasswdFile;
use crate::store::Store;
use crate::webhook::Webhook;
use std::sync::Arc;

pub struct Server {
    pub store: Store,
    pub broadcast: Broadcast,
    pub webhook: Webhook,
    pub smtp_auth: Option<HtpasswdFile>,
    pub http_auth: Option<HtpasswdFile>,
    pub smtp_ident: String,
    pub no_quit: bool,
    pub no_clear: bool,
}

pub struct Tasks {
    pub broadcast_drainer: tokio::task::JoinHandle<()>,
    pub broadcast_ping: tokio::task::JoinHandle<()>,
    pub webhook_worker: Option<tokio::task::JoinHandle<()>>,
}

impl Tasks {
    pub fn abort_all(&self) {
        self.broadcast_drainer.abort();
        self.broadcast_ping.abort();
        if let Some(worker) = &self.webhook_worker {
            worker.abort();
        }
    }
}

impl Server {
    pub fn build(opt: &Opt) -> anyhow::Result<(Arc<Self>, Tasks)> {
        let db_path = opt
            .db
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ":memory:".to_string());
        let store = Store::open(&db_path)?;

        let smtp_auth = opt.smtp_auth.as_ref().map(HtpasswdFile::load).transpose()?;
        let http_auth = opt.http_auth.as_ref().map(HtpasswdFile::load).transpose()?;

        let (broadcast, broadcast_drainer, broadcast_ping) = Broadcast::spawn();
        let (webhook, webhook_worker) = Webhook::spawn(
            opt.callback_webhook_url.clone(),
            opt.callback_webhook_method.clone(),
            opt.callback_webhook_auth.clone(),
        );

        let server = Arc::new(Self {
            store,
            broadcast,
            webhook,
            smtp_auth,
            http_auth,
            smtp_ident: opt.smtp_ident.clone(),
            no_quit: opt.no_quit,
            no_clear: opt.no_clear,
        });

        let tasks = Tasks {
            broadcast_drainer,
            broadcast_ping,
            webhook_worker,
        };

        Ok((server, tasks))
    }

    /// Builds an in-memory server with no auth and no webhook, for tests.
    #[cfg(any(test, feature = "test-util"))]
    pub fn for_test() -> (Arc<Self>, Tasks) {
        let store = Store::open(":memory:").expect("in-memory store opens");
        let (broadcast, broadcast_drainer, broadcast_ping) = Broadcast::spawn();
        let server = Arc::new(Self {
            store,
            broadcast,
            webhook: Webhook::disabled(),
            smtp_auth: None,
            http_auth: None,
            smtp_ident: "postcatcher".to_string(),
            no_quit: false,
            no_clear: false,
        });
        let tasks = Tasks {
            broadcast_drainer,
            broadcast_ping,
            webhook_worker: None,
        };
        (server, tasks)
    }
}
