//! End-to-end coverage for the literal scenarios in spec.md §8: driving the
//! SMTP wire protocol and the HTTP API the way a real client would, rather
//! than calling internal functions directly.

use crate::config::Opt;
use crate::server::Server;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

fn test_opt() -> Opt {
    Opt {
        smtp_ip: "127.0.0.1".into(),
        smtp_port: 0,
        smtp_auth: None,
        smtp_ident: "postcatcher".into(),
        http_ip: "127.0.0.1".into(),
        http_port: 0,
        http_auth: None,
        db: None,
        no_quit: false,
        no_clear: false,
        callback_webhook_url: None,
        callback_webhook_method: "POST".into(),
        callback_webhook_auth: None,
        debug: false,
    }
}

async fn read_reply(reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>) -> String {
    let mut reply = String::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let done = line.as_bytes().get(3) != Some(&b'-');
        reply.push_str(&line);
        if done {
            break;
        }
    }
    reply
}

/// Scenario 1: plain ingest over the wire, byte-for-byte.
#[tokio::test]
async fn plain_ingest_over_the_wire() {
    let (server, tasks) = Server::for_test();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(crate::smtp::serve(listener, server.clone(), rx));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    assert!(read_reply(&mut reader).await.starts_with("220"));

    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("250"));

    write_half.write_all(b"MAIL FROM:<a@b>\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("250"));

    write_half.write_all(b"RCPT TO:<c@d>\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("250"));

    write_half.write_all(b"DATA\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("354"));

    write_half
        .write_all(b"Subject: Hi\r\n\r\nhello\r\n.\r\n")
        .await
        .unwrap();
    assert!(read_reply(&mut reader).await.starts_with("250"));

    write_half.write_all(b"QUIT\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("221"));

    let messages = server.store.list().await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].subject, "Hi");
    assert_eq!(messages[0].size, 22);

    tasks.abort_all();
}

/// Scenario 2: SMTP AUTH PLAIN gating `MAIL FROM` until authenticated.
#[tokio::test]
async fn auth_required_then_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let htpasswd_path = dir.path().join("htpasswd");
    std::fs::write(&htpasswd_path, "u:p\n").unwrap();

    let mut opt = test_opt();
    opt.smtp_auth = Some(PathBuf::from(&htpasswd_path));
    let (server, tasks) = Server::build(&opt).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(crate::smtp::serve(listener, server.clone(), rx));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    read_reply(&mut reader).await;
    write_half.write_all(b"EHLO client.example\r\n").await.unwrap();
    let ehlo = read_reply(&mut reader).await;
    assert!(ehlo.contains("AUTH PLAIN"));

    write_half.write_all(b"MAIL FROM:<a@b>\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("530"));

    let payload = data_encoding::BASE64.encode(b"\0u\0p");
    write_half
        .write_all(format!("AUTH PLAIN {payload}\r\n").as_bytes())
        .await
        .unwrap();
    assert!(read_reply(&mut reader).await.starts_with("235"));

    write_half.write_all(b"MAIL FROM:<a@b>\r\n").await.unwrap();
    assert!(read_reply(&mut reader).await.starts_with("250"));

    tasks.abort_all();
}

/// Scenario 3: inline image CID rewriting and forced `target="blank"`,
/// served through the real HTTP router.
#[tokio::test]
async fn html_part_rewrites_cid_and_forces_target_blank() {
    let (server, tasks) = Server::for_test();

    let raw = concat!(
        "Content-Type: multipart/related; boundary=\"b\"\r\n",
        "\r\n",
        "--b\r\n",
        "Content-Type: text/html\r\n",
        "\r\n",
        "<html><body><img src=\"cid:img1\"><a href=\"http://x\">x</a></body></html>\r\n",
        "--b\r\n",
        "Content-Type: image/png\r\n",
        "Content-Id: <img1>\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "aGVsbG8=\r\n",
        "--b--\r\n",
    );
    let id = crate::ingest::ingest(
        &server,
        crate::ingest::Envelope {
            sender: "a@b".into(),
            recipients: vec!["c@d".into()],
            peer: "127.0.0.1:9".into(),
            source: raw.as_bytes().to_vec(),
        },
    )
    .await
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = crate::http::router(server.clone());
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let client = reqwest::Client::new();
    let body = client
        .get(format!("http://{addr}/api/messages/{id}.html"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert!(body.contains(&format!("/api/messages/{id}/parts/img1")));
    assert!(body.contains(r#"target="blank""#));

    tasks.abort_all();
}

/// Scenario 4: deleting a message is observable by every live peer.
#[tokio::test]
async fn delete_fans_out_to_every_peer() {
    let (server, tasks) = Server::for_test();
    let id = crate::ingest::ingest(
        &server,
        crate::ingest::Envelope {
            sender: "a@b".into(),
            recipients: vec!["c@d".into()],
            peer: "127.0.0.1:9".into(),
            source: b"Subject: Hi\r\n\r\nhello\r\n".to_vec(),
        },
    )
    .await
    .unwrap();

    let mut first = server.broadcast.register().await;
    let mut second = server.broadcast.register().await;

    server.store.delete(id).await.unwrap();
    server
        .broadcast
        .publish("delete_message", &[id.to_string().as_str()])
        .await;

    let expected = format!("delete_message,{id}");
    for peer in [&mut first, &mut second] {
        match peer.rx.recv().await.unwrap() {
            crate::broadcast::PeerMessage::Text(text) => assert_eq!(text, expected),
            crate::broadcast::PeerMessage::Ping => panic!("expected text"),
        }
    }

    tasks.abort_all();
}
