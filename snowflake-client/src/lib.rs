use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

pub use error::{CloseError, ConnectError, QueryError};
pub use jwt::{KeyFileReadError, KeyPairError, LoadKeyPairError};
pub use options::{Authentication, ConnectOptions, PrivateKey};
pub use session::SessionConnection;
pub use sql_api::{QueryFailureStatus, SqlApiConnection, StatementHandle, TokenType};

mod error;
mod jwt;
mod options;
pub mod session;
pub mod sql_api;
#[cfg(test)]
mod test_server;

pub(crate) const USER_AGENT_VALUE: &str =
    concat!(env!("CARGO_PKG_NAME"), '/', env!("CARGO_PKG_VERSION"));

/// An open Snowflake session.
///
/// Every [execute](Connection::execute) call is its own statement: it is submitted, awaited
/// and fully fetched before it returns, so nothing outlives the call.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<ResultSet, QueryError>;
    /// Releases the session. Statements fail with [QueryError::Closed] afterwards.
    async fn close(&mut self) -> Result<(), CloseError>;
}

/// Opens connections, see [SnowflakeConnector].
#[async_trait]
pub trait Connect: Send + Sync {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, ConnectError>;
}

/// Picks the endpoint matching [ConnectOptions::authentication]:
/// passwords log in through the session API, tokens go straight to the SQL API.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnowflakeConnector;

#[async_trait]
impl Connect for SnowflakeConnector {
    async fn connect(&self, options: &ConnectOptions) -> Result<Box<dyn Connection>, ConnectError> {
        info!(
            account = %options.account,
            user = %options.user,
            authentication = options.authentication.kind(),
            "connecting to snowflake"
        );
        let connection: Box<dyn Connection> = match &options.authentication {
            Authentication::Password(password) => {
                Box::new(SessionConnection::login(options, password).await?)
            }
            Authentication::KeyPair(private_key) => {
                let key_pair = jwt::load_key_pair(private_key)?;
                let token = jwt::create_token(
                    &key_pair,
                    &options.account_name(),
                    &options.user.to_ascii_uppercase(),
                )?;
                Box::new(SqlApiConnection::try_new(
                    options,
                    &token,
                    TokenType::KeyPairJwt,
                )?)
            }
            Authentication::OAuth(token) => Box::new(SqlApiConnection::try_new(
                options,
                token,
                TokenType::OAuth,
            )?),
            Authentication::ProgrammaticAccessToken(token) => Box::new(SqlApiConnection::try_new(
                options,
                token,
                TokenType::ProgrammaticAccessToken,
            )?),
        };
        Ok(connection)
    }
}

/// Column names and rows of a finished statement.
///
/// Snowflake hands every cell back as text; SQL `NULL` is `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

/// [RowType](https://docs.snowflake.com/en/developer-guide/sql-api/reference#label-sql-api-reference-resultset-resultsetmetadata-rowtype)
/// reduced to what callers need
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Snowflake type name in lowercase, e.g. `fixed`, `text`, `timestamp_ntz`.
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            data_type: data_type.into().to_ascii_lowercase(),
        }
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    headers.append(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.append(ACCEPT, HeaderValue::from_static("application/json"));
    headers.append(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers
}
