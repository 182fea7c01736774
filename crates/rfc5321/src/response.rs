use serde::{Deserialize, Serialize};

/// A single SMTP reply. `encode` renders the code, a `-` or ` `
/// continuation marker, and the line's text, per RFC 5321 4.2.1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub code: u16,
    pub enhanced_code: Option<(u8, u16, u16)>,
    pub lines: Vec<String>,
}

impl Response {
    pub fn new(code: u16, line: impl Into<String>) -> Self {
        Self {
            code,
            enhanced_code: None,
            lines: vec![line.into()],
        }
    }

    pub fn multi(code: u16, lines: Vec<String>) -> Self {
        Self {
            code,
            enhanced_code: None,
            lines,
        }
    }

    pub fn with_enhanced(mut self, class: u8, subject: u16, detail: u16) -> Self {
        self.enhanced_code = Some((class, subject, detail));
        self
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        let enhanced = self
            .enhanced_code
            .map(|(c, s, d)| format!("{c}.{s}.{d} "))
            .unwrap_or_default();
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            let prefix = if i == 0 { enhanced.as_str() } else { "" };
            out.push_str(&format!("{}{sep}{prefix}{line}\r\n", self.code));
        }
        out
    }

    pub fn is_success(&self) -> bool {
        self.code < 400
    }
}
