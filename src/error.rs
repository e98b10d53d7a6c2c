use snowflake_client::{CloseError, ConnectError, QueryError};

use crate::credentials::CredentialsError;

/// Anything that can stop a preview run
#[derive(thiserror::Error, Debug)]
pub enum PreviewError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("could not connect to snowflake: {0}")]
    Connect(#[from] ConnectError),
    #[error("query failed: {0}")]
    Query(#[from] QueryError),
    #[error("could not close connection: {0}")]
    Close(#[from] CloseError),
    #[error("unexpected result from `{statement}`: {reason}")]
    UnexpectedShape {
        statement: &'static str,
        reason: String,
    },
    #[error("could not write output: {0}")]
    Output(#[from] std::io::Error),
}
