mod broadcast;
mod config;
mod decode;
#[cfg(test)]
mod e2e;
mod error;
mod htpasswd;
mod http;
mod ingest;
mod server;
mod smtp;
mod store;
mod webhook;

use clap::Parser;
use config::Opt;
use server::Server;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_logging(opt.debug);

    let (server, tasks) = Server::build(&opt)?;

    let smtp_listener = TcpListener::bind((opt.smtp_ip.as_str(), opt.smtp_port)).await?;
    let http_listener = TcpListener::bind((opt.http_ip.as_str(), opt.http_port)).await?;
    tracing::info!(
        smtp = %smtp_listener.local_addr()?,
        http = %http_listener.local_addr()?,
        "postcatcher listening",
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let smtp_task = tokio::spawn(smtp::serve(smtp_listener, server.clone(), shutdown_rx));

    let router = http::router(server.clone());
    let http_task = tokio::spawn(async move {
        axum::serve(http_listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    wait_for_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    let _ = shutdown_tx.send(true);

    let _ = smtp_task.await;
    if let Ok(Err(err)) = http_task.await {
        tracing::warn!(%err, "HTTP server exited with an error");
    }
    tasks.abort_all();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("registering SIGTERM handler");
    let mut hup = signal(SignalKind::hangup()).expect("registering SIGHUP handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
        _ = hup.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// A second, independent shutdown future so axum's own graceful-shutdown
/// machinery (which drains in-flight HTTP requests) starts at the same
/// moment as the SMTP listener's `watch` signal.
async fn shutdown_signal() {
    wait_for_signal().await;
}

fn init_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_filter = if debug { "postcatcher=debug,tower_http=debug" } else { "postcatcher=info" };
    let filter = EnvFilter::try_from_env("POSTCATCHER_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
