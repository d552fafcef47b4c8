use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryIndexError {
    #[error("Request error: {0}")]
    Request(String),
    #[error("HTTP error: {status_code} - {message}")]
    Http { status_code: u16, message: String },
    #[error("Response error: {0}")]
    Response(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for MemoryIndexError {
    fn from(e: reqwest::Error) -> Self {
        MemoryIndexError::Request(e.to_string())
    }
}
