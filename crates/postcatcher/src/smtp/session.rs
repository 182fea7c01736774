use crate::ingest::{ingest, Envelope};
use crate::server::Server;
use rfc5321::{Command, ForwardPath, ReversePath, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Per-connection mutable state. Transaction fields reset on `RSET`, on a
/// successful `DATA`, and on a failed `DATA`.
struct State {
    helo_seen: bool,
    authenticated: bool,
    mail_from: Option<String>,
    rcpt_to: Vec<String>,
}

impl State {
    fn new(auth_required: bool) -> Self {
        Self {
            helo_seen: false,
            authenticated: !auth_required,
            mail_from: None,
            rcpt_to: Vec::new(),
        }
    }

    fn reset_transaction(&mut self) {
        self.mail_from = None;
        self.rcpt_to.clear();
    }
}

pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    server: Arc<Server>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    if write_all(&mut writer, &format!("220 {} ESMTP\r\n", server.smtp_ident))
        .await
        .is_err()
    {
        return;
    }

    let mut state = State::new(server.smtp_auth.is_some());
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = tokio::select! {
            result = reader.read_until(b'\n', &mut line) => result,
            _ = shutdown.changed() => {
                let _ = write_all(&mut writer, "421 server shutting down\r\n").await;
                break;
            }
        };
        let n = match n {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%peer, %err, "smtp read error");
                break;
            }
        };
        let _ = n;

        let text = String::from_utf8_lossy(&line).into_owned();
        let command = match Command::parse(&text) {
            Ok(cmd) => cmd,
            Err(err) => {
                if write_all(&mut writer, &format!("500 {err}\r\n", err = err))
                    .await
                    .is_err()
                {
                    break;
                }
                continue;
            }
        };

        let response = match command {
            Command::Quit => {
                let _ = write_all(&mut writer, "221 bye\r\n").await;
                break;
            }
            Command::Rset => {
                state.reset_transaction();
                Response::new(250, "OK")
            }
            other if !state.helo_seen && !matches!(other, Command::Ehlo(_) | Command::Helo(_)) => {
                Response::new(503, "send EHLO/HELO first")
            }
            Command::Ehlo(_domain) => {
                if state.helo_seen {
                    Response::new(503, "Duplicate HELO/EHLO")
                } else {
                    state.helo_seen = true;
                    let mut lines = vec![server.smtp_ident.clone()];
                    if server.smtp_auth.is_some() {
                        lines.push("AUTH PLAIN".to_string());
                    }
                    lines.push("8BITMIME".to_string());
                    lines.push("SMTPUTF8".to_string());
                    lines.push("HELP".to_string());
                    Response::multi(250, lines)
                }
            }
            Command::Helo(_) => {
                if state.helo_seen {
                    Response::new(503, "Duplicate HELO/EHLO")
                } else {
                    state.helo_seen = true;
                    Response::new(250, format!("{} greets you", server.smtp_ident))
                }
            }
            Command::Auth {
                sasl_mech,
                initial_response,
            } => handle_auth(&server, &mut state, &sasl_mech, initial_response).await,
            Command::MailFrom { address, .. } => {
                if !state.authenticated {
                    Response::new(530, "Authentication required").with_enhanced(5, 7, 0)
                } else {
                    state.reset_transaction();
                    state.mail_from = Some(reverse_path_string(&address));
                    Response::new(250, "OK")
                }
            }
            Command::RcptTo { address, .. } => {
                if state.mail_from.is_none() {
                    Response::new(503, "need MAIL FROM first")
                } else {
                    state.rcpt_to.push(forward_path_string(&address));
                    Response::new(250, "OK")
                }
            }
            Command::Data => {
                if state.mail_from.is_none() || state.rcpt_to.is_empty() {
                    Response::new(503, "need MAIL FROM/RCPT TO first")
                } else if write_all(&mut writer, &Response::new(354, "go ahead").encode())
                    .await
                    .is_err()
                {
                    break;
                } else {
                    let body = match read_data(&mut reader).await {
                        Ok(body) => body,
                        Err(err) => {
                            tracing::debug!(%peer, %err, "smtp read error during DATA");
                            break;
                        }
                    };
                    let response = handle_data(&server, &state, peer, body).await;
                    state.reset_transaction();
                    response
                }
            }
            Command::Vrfy(_) => Response::new(252, "cannot verify"),
            Command::Noop(_) => Response::new(250, "OK"),
        };

        if write_all(&mut writer, &response.encode()).await.is_err() {
            break;
        }
    }
}

async fn handle_auth(
    server: &Server,
    state: &mut State,
    sasl_mech: &str,
    initial_response: Option<String>,
) -> Response {
    if !sasl_mech.eq_ignore_ascii_case("PLAIN") {
        return Response::new(504, "unsupported authentication mechanism");
    }
    let Some(auth_file) = &server.smtp_auth else {
        return Response::new(503, "authentication not enabled");
    };
    let Some(encoded) = initial_response else {
        return Response::new(
            504,
            "authentication exchange requires an initial response",
        );
    };

    let Ok(decoded) = data_encoding::BASE64.decode(encoded.as_bytes()) else {
        return Response::new(535, "Authentication credentials invalid").with_enhanced(5, 7, 8);
    };

    let mut fields = decoded.split(|&b| b == 0);
    let authzid = fields.next().unwrap_or_default();
    let authcid = fields.next().unwrap_or_default();
    let passwd = fields.next().unwrap_or_default();

    let authzid = String::from_utf8_lossy(authzid);
    let authcid = String::from_utf8_lossy(authcid);
    let passwd = String::from_utf8_lossy(passwd);

    if !(authzid.is_empty() || authzid == authcid) {
        return Response::new(535, "Authentication credentials invalid").with_enhanced(5, 7, 8);
    }

    if auth_file.check_password(&authcid, &passwd) {
        state.authenticated = true;
        Response::new(235, "Authentication successful")
    } else {
        Response::new(535, "Authentication credentials invalid").with_enhanced(5, 7, 8)
    }
}

async fn handle_data(server: &Server, state: &State, peer: SocketAddr, body: Vec<u8>) -> Response {
    let envelope = Envelope {
        sender: state.mail_from.clone().unwrap_or_default(),
        recipients: state.rcpt_to.clone(),
        peer: peer.to_string(),
        source: body,
    };

    match ingest(server, envelope).await {
        Ok(_id) => Response::new(250, "OK"),
        Err(crate::ingest::IngestError::Decode(err)) => {
            tracing::warn!(%err, "rejecting undecodable message");
            Response::new(554, "Transaction failed: malformed message")
        }
        Err(crate::ingest::IngestError::Store(err)) => {
            tracing::error!(%err, "store failure during ingest");
            Response::new(451, "Requested action aborted: local error")
        }
    }
}

/// Reads DATA lines until the lone `.` terminator, dot-unstuffing any line
/// that begins with `..`. Preserves original line terminators so the
/// stored source round-trips byte-for-byte.
async fn read_data<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = trim_crlf(&line);
        if trimmed == b"." {
            break;
        }
        if trimmed.starts_with(b".") {
            out.extend_from_slice(&line[1..]);
        } else {
            out.extend_from_slice(&line);
        }
    }
    Ok(out)
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    &line[..end]
}

fn reverse_path_string(path: &ReversePath) -> String {
    match path {
        ReversePath::NullSender => String::new(),
        ReversePath::Path(p) => p.mailbox.to_string(),
    }
}

fn forward_path_string(path: &ForwardPath) -> String {
    match path {
        ForwardPath::Postmaster => "postmaster".to_string(),
        ForwardPath::Path(p) => p.mailbox.to_string(),
    }
}

async fn write_all(
    writer: &mut (impl tokio::io::AsyncWrite + Unpin),
    text: &str,
) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn dot_unstuffing() {
        let raw = b"Subject: Hi\r\n\r\n..leading dot\r\nplain\r\n.\r\n";
        let mut reader = tokio::io::BufReader::new(&raw[..]);
        let body = read_data(&mut reader).await.unwrap();
        assert_eq!(body, b"Subject: Hi\r\n\r\n.leading dot\r\nplain\r\n".to_vec());
    }
}
