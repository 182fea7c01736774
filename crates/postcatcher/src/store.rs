//! Embedded SQL persistence (§4.A). Two tables, `message` and
//! `message_part`, opened once at startup behind an `Arc` and accessed only
//! through [`Store::perform`], which pushes the blocking `sqlite` call onto
//! a blocking-pool thread so the async reactor never stalls on disk I/O.

use crate::error::StoreError;
use chrono::{DateTime, SubsecRound, Utc};
use sqlite::{Connection, ConnectionThreadSafe, State};
use std::sync::Arc;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub sender_envelope: String,
    pub sender_message: String,
    pub recipients_envelope: Vec<String>,
    pub recipients_message_to: Vec<String>,
    pub recipients_message_cc: Vec<String>,
    pub recipients_message_bcc: Vec<String>,
    pub subject: String,
    pub source: Vec<u8>,
    pub content_type: String,
    pub size: i64,
    pub peer: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MessagePart {
    pub id: i64,
    pub message_id: i64,
    pub cid: String,
    pub content_type: String,
    pub is_attachment: bool,
    pub filename: Option<String>,
    pub charset: Option<String>,
    pub body: Vec<u8>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// Everything the ingest pipeline has assembled and is ready to persist.
pub struct NewMessage {
    pub sender_envelope: String,
    pub recipients_envelope: Vec<String>,
    pub peer: String,
    pub source: Vec<u8>,
    pub sender_message: String,
    pub recipients_message_to: Vec<String>,
    pub recipients_message_cc: Vec<String>,
    pub recipients_message_bcc: Vec<String>,
    pub subject: String,
    pub content_type: String,
    pub parts: Vec<NewPart>,
}

pub struct NewPart {
    pub cid: String,
    pub content_type: String,
    pub is_attachment: bool,
    pub filename: Option<String>,
    pub charset: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct Store {
    db: Arc<ConnectionThreadSafe>,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS message (
    id INTEGER PRIMARY KEY ASC,
    sender_envelope TEXT,
    sender_message TEXT,
    recipients_envelope TEXT,
    recipients_message_to TEXT,
    recipients_message_cc TEXT,
    recipients_message_bcc TEXT,
    subject TEXT,
    source BLOB,
    size INTEGER,
    type TEXT,
    peer TEXT,
    created_at TEXT
);

CREATE TABLE IF NOT EXISTS message_part (
    id INTEGER PRIMARY KEY ASC,
    message_id INTEGER NOT NULL,
    cid TEXT,
    type TEXT,
    is_attachment INTEGER,
    filename TEXT,
    charset TEXT,
    body BLOB,
    size INTEGER,
    created_at TEXT
);
"#;

impl Store {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let mut db = Connection::open_thread_safe(path)?;
        db.set_busy_timeout(
            BUSY_TIMEOUT
                .as_millis()
                .try_into()
                .expect("timeout to be in range"),
        )?;
        db.execute(SCHEMA)?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Run `func` on the blocking pool against the shared connection.
    async fn perform<T: Send + 'static>(
        &self,
        func: impl FnOnce(&ConnectionThreadSafe) -> Result<T, StoreError> + Send + 'static,
    ) -> Result<T, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || func(&db)).await?
    }

    pub async fn add(&self, msg: NewMessage) -> Result<i64, StoreError> {
        self.perform(move |db| {
            db.execute("BEGIN")?;
            let result = (|| -> Result<i64, StoreError> {
                let size = msg.source.len() as i64;
                // Seconds granularity only, matching the original's
                // `datetime('now')`.
                let created_at = Utc::now().trunc_subsecs(0).to_rfc3339();

                let mut stmt = db.prepare(
                    "INSERT INTO message
                        (sender_envelope, sender_message, recipients_envelope,
                         recipients_message_to, recipients_message_cc, recipients_message_bcc,
                         subject, source, size, type, peer, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )?;
                stmt.bind((1, msg.sender_envelope.as_str()))?;
                stmt.bind((2, msg.sender_message.as_str()))?;
                stmt.bind((3, serde_json::to_string(&msg.recipients_envelope)?.as_str()))?;
                stmt.bind((
                    4,
                    serde_json::to_string(&msg.recipients_message_to)?.as_str(),
                ))?;
                stmt.bind((
                    5,
                    serde_json::to_string(&msg.recipients_message_cc)?.as_str(),
                ))?;
                stmt.bind((
                    6,
                    serde_json::to_string(&msg.recipients_message_bcc)?.as_str(),
                ))?;
                stmt.bind((7, msg.subject.as_str()))?;
                stmt.bind((8, msg.source.as_slice()))?;
                stmt.bind((9, size))?;
                stmt.bind((10, msg.content_type.as_str()))?;
                stmt.bind((11, msg.peer.as_str()))?;
                stmt.bind((12, created_at.as_str()))?;
                stmt.next()?;

                let message_id = db.last_insert_rowid();

                for part in &msg.parts {
                    let part_size = part.body.len() as i64;
                    let mut stmt = db.prepare(
                        "INSERT INTO message_part
                            (message_id, cid, type, is_attachment, filename, charset, body, size, created_at)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    )?;
                    stmt.bind((1, message_id))?;
                    stmt.bind((2, part.cid.as_str()))?;
                    stmt.bind((3, part.content_type.as_str()))?;
                    stmt.bind((4, if part.is_attachment { 1 } else { 0 }))?;
                    stmt.bind((5, part.filename.as_deref()))?;
                    stmt.bind((6, part.charset.as_deref()))?;
                    stmt.bind((7, part.body.as_slice()))?;
                    stmt.bind((8, part_size))?;
                    stmt.bind((9, created_at.as_str()))?;
                    stmt.next()?;
                }

                Ok(message_id)
            })();

            match &result {
                Ok(_) => db.execute("COMMIT")?,
                Err(_) => db.execute("ROLLBACK")?,
            }
            result
        })
        .await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Message>, StoreError> {
        self.perform(move |db| {
            let mut stmt = db.prepare("SELECT * FROM message WHERE id = ?")?;
            stmt.bind((1, id))?;
            if stmt.next()? == State::Row {
                Ok(Some(read_message(&stmt)?))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<Message>, StoreError> {
        self.perform(move |db| {
            let mut stmt = db.prepare("SELECT * FROM message ORDER BY created_at ASC")?;
            let mut out = Vec::new();
            while stmt.next()? == State::Row {
                out.push(read_message(&stmt)?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn get_part_by_cid(
        &self,
        message_id: i64,
        cid: String,
    ) -> Result<Option<MessagePart>, StoreError> {
        self.perform(move |db| {
            let mut stmt =
                db.prepare("SELECT * FROM message_part WHERE message_id = ? AND cid = ?")?;
            stmt.bind((1, message_id))?;
            stmt.bind((2, cid.as_str()))?;
            if stmt.next()? == State::Row {
                Ok(Some(read_part(&stmt)?))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn get_first_part_by_types(
        &self,
        message_id: i64,
        types: &'static [&'static str],
    ) -> Result<Option<MessagePart>, StoreError> {
        self.perform(move |db| {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT * FROM message_part WHERE message_id = ? AND is_attachment = 0 AND type IN ({placeholders}) LIMIT 1"
            );
            let mut stmt = db.prepare(sql.as_str())?;
            stmt.bind((1, message_id))?;
            for (i, ty) in types.iter().enumerate() {
                stmt.bind((i as usize + 2, *ty))?;
            }
            if stmt.next()? == State::Row {
                Ok(Some(read_part(&stmt)?))
            } else {
                Ok(None)
            }
        })
        .await
    }

    pub async fn has_any_type(
        &self,
        message_id: i64,
        types: &'static [&'static str],
    ) -> Result<bool, StoreError> {
        Ok(self
            .get_first_part_by_types(message_id, types)
            .await?
            .is_some())
    }

    pub async fn attachments(&self, message_id: i64) -> Result<Vec<MessagePart>, StoreError> {
        self.perform(move |db| {
            let mut stmt = db.prepare(
                "SELECT * FROM message_part WHERE message_id = ? AND is_attachment = 1 ORDER BY filename ASC",
            )?;
            stmt.bind((1, message_id))?;
            let mut out = Vec::new();
            while stmt.next()? == State::Row {
                out.push(read_part(&stmt)?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.perform(move |db| {
            db.execute("BEGIN")?;
            let result = (|| -> Result<(), StoreError> {
                let mut stmt = db.prepare("DELETE FROM message_part WHERE message_id = ?")?;
                stmt.bind((1, id))?;
                stmt.next()?;

                let mut stmt = db.prepare("DELETE FROM message WHERE id = ?")?;
                stmt.bind((1, id))?;
                stmt.next()?;
                Ok(())
            })();
            match &result {
                Ok(_) => db.execute("COMMIT")?,
                Err(_) => db.execute("ROLLBACK")?,
            }
            result
        })
        .await
    }

    pub async fn delete_all(&self) -> Result<(), StoreError> {
        self.perform(move |db| {
            db.execute("BEGIN")?;
            let result = (|| -> Result<(), StoreError> {
                db.execute("DELETE FROM message_part")?;
                db.execute("DELETE FROM message")?;
                Ok(())
            })();
            match &result {
                Ok(_) => db.execute("COMMIT")?,
                Err(_) => db.execute("ROLLBACK")?,
            }
            result
        })
        .await
    }
}

fn read_json_list(raw: Option<String>) -> Result<Vec<String>, StoreError> {
    match raw {
        None => Ok(Vec::new()),
        Some(s) if s.is_empty() => Ok(Vec::new()),
        Some(s) => Ok(serde_json::from_str(&s)?),
    }
}

fn parse_created_at(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn read_message(stmt: &sqlite::Statement) -> Result<Message, StoreError> {
    Ok(Message {
        id: stmt.read::<i64, _>("id")?,
        sender_envelope: stmt.read::<String, _>("sender_envelope")?,
        sender_message: stmt.read::<String, _>("sender_message")?,
        recipients_envelope: read_json_list(stmt.read::<Option<String>, _>("recipients_envelope")?)?,
        recipients_message_to: read_json_list(
            stmt.read::<Option<String>, _>("recipients_message_to")?,
        )?,
        recipients_message_cc: read_json_list(
            stmt.read::<Option<String>, _>("recipients_message_cc")?,
        )?,
        recipients_message_bcc: read_json_list(
            stmt.read::<Option<String>, _>("recipients_message_bcc")?,
        )?,
        subject: stmt.read::<String, _>("subject")?,
        source: stmt.read::<Vec<u8>, _>("source")?,
        content_type: stmt.read::<String, _>("type")?,
        size: stmt.read::<i64, _>("size")?,
        peer: stmt.read::<String, _>("peer")?,
        created_at: parse_created_at(stmt.read::<String, _>("created_at")?),
    })
}

fn read_part(stmt: &sqlite::Statement) -> Result<MessagePart, StoreError> {
    Ok(MessagePart {
        id: stmt.read::<i64, _>("id")?,
        message_id: stmt.read::<i64, _>("message_id")?,
        cid: stmt.read::<String, _>("cid")?,
        content_type: stmt.read::<String, _>("type")?,
        is_attachment: stmt.read::<i64, _>("is_attachment")? != 0,
        filename: stmt.read::<Option<String>, _>("filename")?,
        charset: stmt.read::<Option<String>, _>("charset")?,
        body: stmt.read::<Vec<u8>, _>("body")?,
        size: stmt.read::<i64, _>("size")?,
        created_at: parse_created_at(stmt.read::<String, _>("created_at")?),
    })
}
