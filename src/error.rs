use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of a poll cycle. Nothing here is allowed to kill the
/// process: the poll loop logs the error and continues at the next tick.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] mongodb::error::Error),
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("Chain protocol error: {0}")]
    Protocol(String),
    #[error("Allocation error: {0}")]
    Allocation(String),
    #[error("Chain request failed: {0}")]
    Chain(#[source] reqwest::Error),
    #[error("Chat request failed: {0}")]
    Chat(#[source] reqwest::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
