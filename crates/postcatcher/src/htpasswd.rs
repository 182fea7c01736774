//! A read-only, in-memory view of an Apache-style htpasswd file, loaded
//! once at startup per spec.md §5 ("Authentication material … loaded once
//! at startup and read-only thereafter").

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum HtpasswdError {
    #[error("reading htpasswd file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line} in htpasswd file has no ':' separator")]
    MalformedLine { line: usize },
}

#[derive(Debug, Clone)]
enum Hash {
    /// `{SHA}` + base64(sha1(password))
    Sha1(String),
    /// `$2a$`/`$2b$`/`$2y$` bcrypt
    Bcrypt(String),
    /// No recognized prefix: compared byte-for-byte.
    Plain(String),
    /// apr1-MD5 or crypt(3) DES: recognized but unsupported, see
    /// DESIGN.md's Open Questions.
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct HtpasswdFile {
    pub path: std::path::PathBuf,
    entries: HashMap<String, Hash>,
}

impl HtpasswdFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HtpasswdError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| HtpasswdError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut entries = HashMap::new();
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (user, hash) = line
                .split_once(':')
                .ok_or(HtpasswdError::MalformedLine { line: idx + 1 })?;
            entries.insert(user.to_string(), classify(hash));
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Verify `password` for `user`. Returns false for unknown users,
    /// mismatches, and hash schemes we can't verify (logged elsewhere).
    pub fn check_password(&self, user: &str, password: &str) -> bool {
        match self.entries.get(user) {
            None => false,
            Some(Hash::Plain(expected)) => expected == password,
            Some(Hash::Sha1(expected)) => {
                use sha1::{Digest, Sha1};
                let digest = Sha1::digest(password.as_bytes());
                let encoded = data_encoding::BASE64.encode(&digest);
                &encoded == expected
            }
            Some(Hash::Bcrypt(expected)) => {
                bcrypt::verify(password, expected).unwrap_or(false)
            }
            Some(Hash::Unsupported) => {
                tracing::warn!(user, "htpasswd entry uses an unsupported hash scheme (apr1-MD5 or crypt DES); rejecting");
                false
            }
        }
    }
}

fn classify(hash: &str) -> Hash {
    if let Some(rest) = hash.strip_prefix("{SHA}") {
        Hash::Sha1(rest.to_string())
    } else if hash.starts_with("$2a$") || hash.starts_with("$2b$") || hash.starts_with("$2y$") {
        Hash::Bcrypt(hash.to_string())
    } else if hash.starts_with("$apr1$") || (hash.len() == 13 && hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '/')) {
        Hash::Unsupported
    } else {
        Hash::Plain(hash.to_string())
    }
}
