mod parser;
mod response;
mod types;

pub use response::Response;
pub use types::*;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(pub String);
