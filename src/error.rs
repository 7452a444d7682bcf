use std::io;
use std::os::unix::io::RawFd;
use thiserror::Error;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP parsing error: {0}")]
    HttpParse(String),

    #[error("fd {0} is already registered")]
    DuplicateFd(RawFd),

    #[error("multiplexer is closed")]
    PollerClosed,

    #[error("multiplexer error: {0}")]
    Poller(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
