use crate::jwt::{KeyPairError, LoadKeyPairError};
use crate::sql_api::QueryFailureStatus;

/// Error opening a [Connection](crate::Connection)
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    LoadKeyPair(#[from] LoadKeyPairError),
    #[error("could not generate JWT token: {0}")]
    Token(#[from] KeyPairError),
    #[error("token is not a valid header value")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
    #[error("could not start client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("login request failed: {0}")]
    Request(reqwest::Error),
    #[error("failed to parse login response: {0}")]
    Decode(reqwest::Error),
    #[error("login rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}

/// Error running a statement
#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("connection is closed")]
    Closed,
    #[error("could not send sql statement: {0}")]
    Request(reqwest::Error),
    #[error("failed to parse returned json: {0}")]
    Decode(reqwest::Error),
    #[error(transparent)]
    Statement(#[from] QueryFailureStatus),
    #[error("statement failed ({code}): {message}")]
    Session { code: String, message: String },
    #[error("unknown error with status code {status}: {body}")]
    Unknown {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("unsupported result: {0}")]
    UnsupportedResult(String),
}

/// Error closing a [Connection](crate::Connection)
#[derive(thiserror::Error, Debug)]
pub enum CloseError {
    #[error("connection is already closed")]
    AlreadyClosed,
    #[error("could not send logout request: {0}")]
    Request(reqwest::Error),
    #[error("failed to parse logout response: {0}")]
    Decode(reqwest::Error),
    #[error("logout rejected ({code}): {message}")]
    Rejected { code: String, message: String },
}
