use clap::Parser;
use std::path::PathBuf;

/// postcatcher: a local SMTP catch-all for development and testing.
///
/// Accepts mail over SMTP, never relays it, and exposes a JSON/WebSocket
/// API for browsing what was received. See spec.md §6 for the full
/// configuration surface; this CLI is that surface in its entirety — there
/// is no separate config file.
#[derive(Debug, Parser, Clone)]
#[command(name = "postcatcher", version, about)]
pub struct Opt {
    /// SMTP bind address
    #[arg(long, default_value = "127.0.0.1")]
    pub smtp_ip: String,

    /// SMTP bind port
    #[arg(long, default_value_t = 1025)]
    pub smtp_port: u16,

    /// Apache-style htpasswd file for SMTP AUTH PLAIN. When set, SMTP
    /// requires authentication before MAIL/RCPT/DATA.
    #[arg(long)]
    pub smtp_auth: Option<PathBuf>,

    /// String advertised in the SMTP greeting and EHLO reply
    #[arg(long, default_value = "postcatcher")]
    pub smtp_ident: String,

    /// HTTP bind address
    #[arg(long, default_value = "127.0.0.1")]
    pub http_ip: String,

    /// HTTP bind port
    #[arg(long, default_value_t = 1080)]
    pub http_port: u16,

    /// Apache-style htpasswd file for HTTP Basic auth
    #[arg(long)]
    pub http_auth: Option<PathBuf>,

    /// Path to the SQLite database file. In-memory if omitted.
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Refuse DELETE /api (process termination)
    #[arg(long)]
    pub no_quit: bool,

    /// Refuse DELETE /api/messages/ (bulk clear)
    #[arg(long)]
    pub no_clear: bool,

    /// Webhook URL. If unset, no webhook is sent.
    #[arg(long)]
    pub callback_webhook_url: Option<String>,

    /// HTTP method used for the webhook request
    #[arg(long, default_value = "POST")]
    pub callback_webhook_method: String,

    /// Optional "login:password" for webhook Basic auth
    #[arg(long)]
    pub callback_webhook_auth: Option<String>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}
