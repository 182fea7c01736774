use axum::response::IntoResponse;

/// Failures from the Store (§4.A). Treated as fatal for the in-flight SMTP
/// transaction (451) or a 500 on read, per spec.md §7.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlite::Error),
    #[error("serializing recipients: {0}")]
    Json(#[from] serde_json::Error),
    #[error("background task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failures from the MIME decoder (§4.B). Malformed input; the SMTP
/// receiver turns this into a 554 and persists nothing.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Parse(#[from] mailparsing::MailParsingError),
    #[error("empty message body")]
    Empty,
}

/// API errors (§4.G / §7). `response_code` derives the `"…_ERROR"` code
/// the same way the original implementation does: take the error's type
/// name, strip a trailing "Error", and upper-snake-case what's left.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("message does not exist")]
    MessageNotFound,
    #[error("part does not exist")]
    PartNotFound,
    #[error("this instance does not allow termination via the API")]
    Forbidden,
    #[error("authentication required")]
    Unauthorized,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ApiError::MessageNotFound | ApiError::PartNotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn response_code(&self) -> String {
        let name = match self {
            ApiError::MessageNotFound => "MessageNotFound",
            ApiError::PartNotFound => "PartNotFound",
            ApiError::Forbidden => "Forbidden",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Store(_) => "Store",
        };
        to_screaming_snake(name) + "_ERROR"
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = serde_json::json!({
            "code": self.response_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

fn to_screaming_snake(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() && i != 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}
