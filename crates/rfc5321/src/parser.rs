use crate::types::{Command, Domain, EsmtpParameter, ForwardPath, MailPath, Mailbox, ReversePath};
use crate::ParseError;

/// Parse a single CRLF-terminated (or bare) SMTP command line into a
/// [`Command`]. Unlike a full RFC 5321 grammar, this accepts anything
/// that looks like a reasonable client would send rather than
/// rejecting everything the ABNF doesn't strictly allow; real test
/// clients are the only callers we need to satisfy.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (verb, rest) = match line.find(' ') {
        Some(idx) => (&line[..idx], line[idx + 1..].trim_start()),
        None => (line, ""),
    };
    let verb = verb.to_ascii_uppercase();

    match verb.as_str() {
        "EHLO" => Ok(Command::Ehlo(parse_domain(rest)?)),
        "HELO" => Ok(Command::Helo(parse_domain(rest)?)),
        "AUTH" => parse_auth(rest),
        "MAIL" => parse_mail(rest),
        "RCPT" => parse_rcpt(rest),
        "DATA" => Ok(Command::Data),
        "RSET" => Ok(Command::Rset),
        "QUIT" => Ok(Command::Quit),
        "VRFY" => {
            if rest.is_empty() {
                Err(ParseError(format!("VRFY requires an argument")))
            } else {
                Ok(Command::Vrfy(rest.to_string()))
            }
        }
        "NOOP" => Ok(Command::Noop(if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        })),
        other => Err(ParseError(format!("unrecognized command {other:?}"))),
    }
}

fn parse_domain(text: &str) -> Result<Domain, ParseError> {
    if text.is_empty() {
        return Err(ParseError("expected a domain".to_string()));
    }
    Ok(Domain::parse(text))
}

fn parse_auth(rest: &str) -> Result<Command, ParseError> {
    let mut parts = rest.splitn(2, ' ');
    let sasl_mech = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParseError("AUTH requires a mechanism".to_string()))?
        .to_string();
    let initial_response = parts.next().map(|s| s.to_string());
    Ok(Command::Auth {
        sasl_mech,
        initial_response,
    })
}

/// Split `FROM:<addr> PARAM=VALUE PARAM2` / `TO:<addr> ...` into the
/// path text and the list of trailing ESMTP parameters.
fn split_path_and_params<'a>(
    rest: &'a str,
    keyword: &str,
) -> Result<(&'a str, Vec<EsmtpParameter>), ParseError> {
    let rest = rest.trim_start();
    let lower = rest.to_ascii_lowercase();
    if !lower.starts_with(keyword) {
        return Err(ParseError(format!("expected {keyword}")));
    }
    let after_keyword = rest[keyword.len()..].trim_start();

    let (path_text, params_text) = if let Some(stripped) = after_keyword.strip_prefix('<') {
        match stripped.find('>') {
            Some(end) => (&stripped[..end], stripped[end + 1..].trim_start()),
            None => return Err(ParseError("unterminated path, missing '>'".to_string())),
        }
    } else {
        match after_keyword.find(' ') {
            Some(idx) => (&after_keyword[..idx], after_keyword[idx + 1..].trim_start()),
            None => (after_keyword, ""),
        }
    };

    let mut parameters = vec![];
    for param in params_text.split_whitespace() {
        match param.split_once('=') {
            Some((name, value)) => parameters.push(EsmtpParameter {
                name: name.to_string(),
                value: Some(value.to_string()),
            }),
            None => parameters.push(EsmtpParameter {
                name: param.to_string(),
                value: None,
            }),
        }
    }

    Ok((path_text, parameters))
}

fn parse_mail_path(path_text: &str) -> Result<ReversePath, ParseError> {
    if path_text.is_empty() {
        return Ok(ReversePath::NullSender);
    }
    Ok(ReversePath::Path(MailPath {
        mailbox: parse_mailbox(path_text)?,
    }))
}

fn parse_rcpt_path(path_text: &str) -> Result<ForwardPath, ParseError> {
    if path_text.is_empty() {
        return Err(ParseError("RCPT TO requires an address".to_string()));
    }
    if path_text.eq_ignore_ascii_case("postmaster") {
        return Ok(ForwardPath::Postmaster);
    }
    Ok(ForwardPath::Path(MailPath {
        mailbox: parse_mailbox(path_text)?,
    }))
}

fn parse_mailbox(text: &str) -> Result<Mailbox, ParseError> {
    match text.rsplit_once('@') {
        Some((local_part, domain)) if !local_part.is_empty() && !domain.is_empty() => Ok(Mailbox {
            local_part: local_part.to_string(),
            domain: Domain::parse(domain),
        }),
        _ => Err(ParseError(format!("invalid mailbox {text:?}"))),
    }
}

fn parse_mail(rest: &str) -> Result<Command, ParseError> {
    let (path_text, parameters) = split_path_and_params(rest, "from:")?;
    Ok(Command::MailFrom {
        address: parse_mail_path(path_text)?,
        parameters,
    })
}

fn parse_rcpt(rest: &str) -> Result<Command, ParseError> {
    let (path_text, parameters) = split_path_and_params(rest, "to:")?;
    Ok(Command::RcptTo {
        address: parse_rcpt_path(path_text)?,
        parameters,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ehlo() {
        assert_eq!(
            Command::parse("EHLO there.example.com\r\n").unwrap(),
            Command::Ehlo(Domain::Name("there.example.com".to_string()))
        );
    }

    #[test]
    fn mail_from_with_params() {
        match Command::parse("MAIL FROM:<a@b.com> SIZE=100 BODY=8BITMIME").unwrap() {
            Command::MailFrom {
                address,
                parameters,
            } => {
                assert_eq!(address.to_string(), "a@b.com");
                assert_eq!(parameters.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mail_from_null_sender() {
        assert_eq!(
            Command::parse("MAIL FROM:<>").unwrap(),
            Command::MailFrom {
                address: ReversePath::NullSender,
                parameters: vec![]
            }
        );
    }

    #[test]
    fn rcpt_to_postmaster() {
        assert_eq!(
            Command::parse("RCPT TO:<postmaster>").unwrap(),
            Command::RcptTo {
                address: ForwardPath::Postmaster,
                parameters: vec![]
            }
        );
    }

    #[test]
    fn auth_plain_with_initial_response() {
        assert_eq!(
            Command::parse("AUTH PLAIN AHUAcA==").unwrap(),
            Command::Auth {
                sasl_mech: "PLAIN".to_string(),
                initial_response: Some("AHUAcA==".to_string()),
            }
        );
    }

    #[test]
    fn rejects_unknown_verb() {
        assert!(Command::parse("BANANA").is_err());
    }
}
