//! Turns raw SMTP `DATA` bytes into the flat shape [`crate::store::Store::add`]
//! persists. Pure: no I/O, no shared state.

use crate::error::DecodeError;
use mailparsing::{Address, AddrSpec, MimePart};

#[derive(Debug, Clone)]
pub struct DecodedPart {
    pub cid: String,
    pub content_type: String,
    pub is_attachment: bool,
    pub filename: Option<String>,
    pub charset: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub sender_message: String,
    pub recipients_to: Vec<String>,
    pub recipients_cc: Vec<String>,
    pub recipients_bcc: Vec<String>,
    pub subject: String,
    pub content_type: String,
    pub parts: Vec<DecodedPart>,
}

/// Parse `source` (the dot-unstuffed bytes handed up by the SMTP receiver)
/// into a [`DecodedMessage`]. A non-multipart message yields exactly one
/// part mirroring the whole message, matching the historical behavior this
/// system preserves (see DESIGN.md).
pub fn decode(source: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let text = String::from_utf8_lossy(source).into_owned();
    let top = MimePart::parse(text)?;

    let headers = top.headers();
    let content_type = headers
        .content_type()
        .ok()
        .flatten()
        .map(|ct| ct.value)
        .unwrap_or_else(|| "text/plain".to_string());

    let sender_message = headers
        .from()
        .ok()
        .flatten()
        .map(|list| {
            list.0
                .iter()
                .map(format_mailbox)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let subject = headers.subject().ok().flatten().unwrap_or_default();

    let recipients_to = address_list(&top, "To");
    let recipients_cc = address_list(&top, "Cc");
    let recipients_bcc = address_list(&top, "Bcc");

    let mut parts = Vec::new();
    walk(&top, &mut parts)?;

    Ok(DecodedMessage {
        sender_message,
        recipients_to,
        recipients_cc,
        recipients_bcc,
        subject,
        content_type,
        parts,
    })
}

fn address_list(top: &MimePart, name: &str) -> Vec<String> {
    top.headers()
        .get_first(name)
        .and_then(|h| h.as_address_list().ok())
        .map(|list| list.0.iter().map(format_address).collect())
        .unwrap_or_default()
}

fn format_address(addr: &Address) -> String {
    match addr {
        Address::Mailbox(mbox) => format_mailbox(mbox),
        Address::Group { entries, .. } => entries
            .0
            .iter()
            .map(format_mailbox)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn format_mailbox(mbox: &mailparsing::Mailbox) -> String {
    let addr = format_addr_spec(&mbox.address);
    match &mbox.name {
        Some(name) if !name.is_empty() => format!("{name} <{addr}>"),
        _ => addr,
    }
}

fn format_addr_spec(addr: &AddrSpec) -> String {
    format!("{}@{}", addr.local_part, addr.domain)
}

/// Recursively walk the MIME tree, emitting one [`DecodedPart`] per leaf.
fn walk(part: &MimePart, out: &mut Vec<DecodedPart>) -> Result<(), DecodeError> {
    let children = part.child_parts();
    if !children.is_empty() {
        for child in children {
            walk(child, out)?;
        }
        return Ok(());
    }

    let headers = part.headers();

    let content_type_params = headers.content_type().ok().flatten();
    let content_type = content_type_params
        .as_ref()
        .map(|ct| ct.value.clone())
        .unwrap_or_else(|| "text/plain".to_string());

    let charset = content_type_params.as_ref().and_then(|ct| ct.get("charset"));

    let cid = headers
        .content_id()
        .ok()
        .flatten()
        .map(|id| id.0)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let filename = headers
        .content_disposition()
        .ok()
        .flatten()
        .and_then(|cd| cd.get("filename"))
        .or_else(|| content_type_params.as_ref().and_then(|ct| ct.get("name")));

    let body = match part.body()? {
        mailparsing::DecodedBody::Text(s) => s.as_bytes().to_vec(),
        mailparsing::DecodedBody::Binary(b) => b,
    };

    out.push(DecodedPart {
        cid,
        content_type,
        is_attachment: filename.is_some(),
        filename,
        charset,
        body,
    });

    Ok(())
}
