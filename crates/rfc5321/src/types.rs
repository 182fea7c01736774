//! Value types for the handful of RFC 5321 productions a receiving
//! server needs: the reverse/forward path grammar used by `MAIL FROM`
//! and `RCPT TO`, and the `Command` enum produced by the parser.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    Name(String),
    V4(String),
    V6(String),
}

impl ToString for Domain {
    fn to_string(&self) -> String {
        match self {
            Self::Name(name) => name.to_string(),
            Self::V4(addr) => format!("[{addr}]"),
            Self::V6(addr) => format!("[IPv6:{addr}]"),
        }
    }
}

impl Domain {
    pub fn parse(text: &str) -> Self {
        if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            if let Some(v6) = inner.strip_prefix("IPv6:") {
                return Self::V6(v6.to_string());
            }
            return Self::V4(inner.to_string());
        }
        Self::Name(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: Domain,
}

impl ToString for Mailbox {
    fn to_string(&self) -> String {
        format!("{}@{}", self.local_part, self.domain.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailPath {
    pub mailbox: Mailbox,
}

impl ToString for MailPath {
    fn to_string(&self) -> String {
        self.mailbox.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversePath {
    Path(MailPath),
    NullSender,
}

impl ToString for ReversePath {
    fn to_string(&self) -> String {
        match self {
            Self::Path(p) => p.to_string(),
            Self::NullSender => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardPath {
    Path(MailPath),
    Postmaster,
}

impl ToString for ForwardPath {
    fn to_string(&self) -> String {
        match self {
            Self::Path(p) => p.to_string(),
            Self::Postmaster => "postmaster".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsmtpParameter {
    pub name: String,
    pub value: Option<String>,
}

impl ToString for EsmtpParameter {
    fn to_string(&self) -> String {
        match &self.value {
            Some(value) => format!("{}={}", self.name, value),
            None => self.name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ehlo(Domain),
    Helo(Domain),
    Auth {
        sasl_mech: String,
        initial_response: Option<String>,
    },
    MailFrom {
        address: ReversePath,
        parameters: Vec<EsmtpParameter>,
    },
    RcptTo {
        address: ForwardPath,
        parameters: Vec<EsmtpParameter>,
    },
    Data,
    Rset,
    Quit,
    Vrfy(String),
    Noop(Option<String>),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, crate::ParseError> {
        crate::parser::parse_command(line)
    }
}
