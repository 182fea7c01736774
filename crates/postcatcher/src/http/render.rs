//! CID rewriting for HTML message parts (§4.G). Parses with `html5ever`
//! into an RC DOM, mutates attributes and `<style>` text in place, then
//! re-serializes — a real parser for the structural rewrite, a regex only
//! for the text inside `<style>`, exactly as prescribed.

use html5ever::driver::ParseOpts;
use html5ever::tendril::TendrilSink;
use html5ever::{namespace_url, ns, parse_document, serialize, QualName};
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use regex::Regex;
use std::sync::OnceLock;

fn cid_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Mirrors the upstream pattern: optional quote, `cid:`, then any run
        // of characters that isn't `\`, `'`, or `)`. Group 1 captures the
        // `cid:...` token itself so only that substring gets replaced,
        // leaving the surrounding quotes and parens untouched.
        Regex::new(r#"url\(\s*["']?(cid:[^\\')]+)["']?\s*\)"#).expect("valid regex")
    })
}

pub fn part_url(message_id: i64, cid: &str) -> String {
    use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
    format!(
        "/api/messages/{message_id}/parts/{}",
        utf8_percent_encode(cid, NON_ALPHANUMERIC)
    )
}

/// Rewrites `cid:` attribute references and `url(cid:...)` occurrences
/// inside `<style>` blocks, and forces every `<a>` to `target="blank"`.
pub fn rewrite_html(source: &str, message_id: i64) -> String {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(source);
    walk(&dom.document, message_id);

    let document: SerializableHandle = dom.document.clone().into();
    let mut bytes = Vec::new();
    serialize(&mut bytes, &document, Default::default()).expect("serializing an in-memory DOM cannot fail");
    String::from_utf8_lossy(&bytes).into_owned()
}

fn walk(handle: &Handle, message_id: i64) {
    if let NodeData::Element { ref name, ref attrs, .. } = handle.data {
        let tag = name.local.as_ref();

        {
            let mut attrs = attrs.borrow_mut();
            for attr in attrs.iter_mut() {
                if let Some(cid) = attr.value.strip_prefix("cid:") {
                    attr.value = part_url(message_id, cid).into();
                }
            }
            if tag.eq_ignore_ascii_case("a") {
                match attrs.iter_mut().find(|a| a.name.local.as_ref() == "target") {
                    Some(attr) => attr.value = "blank".into(),
                    None => attrs.push(html5ever::Attribute {
                        name: QualName::new(None, ns!(), "target".into()),
                        value: "blank".into(),
                    }),
                }
            }
        }

        if tag.eq_ignore_ascii_case("style") {
            for child in handle.children.borrow().iter() {
                if let NodeData::Text { ref contents } = child.data {
                    let mut contents = contents.borrow_mut();
                    let rewritten = cid_url_regex()
                        .replace_all(&*contents, |caps: &regex::Captures| {
                            let whole = &caps[0];
                            let token = &caps[1];
                            let cid = token.strip_prefix("cid:").unwrap_or(token);
                            whole.replace(token, &part_url(message_id, cid))
                        })
                        .into_owned();
                    *contents = rewritten.into();
                }
            }
        }
    }

    for child in handle.children.borrow().iter() {
        walk(child, message_id);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rewrites_cid_attribute_and_forces_target_blank() {
        let html = r#"<html><body><img src="cid:img1"><a href="http://x">x</a></body></html>"#;
        let out = rewrite_html(html, 7);
        assert!(out.contains(r#"src="/api/messages/7/parts/img1""#));
        assert!(out.contains(r#"target="blank""#));
    }

    #[test]
    fn rewrites_cid_url_inside_style() {
        let html = r#"<html><head><style>body{background:url('cid:bg')}</style></head><body></body></html>"#;
        let out = rewrite_html(html, 3);
        assert!(out.contains("url('/api/messages/3/parts/bg')"));
    }
}
