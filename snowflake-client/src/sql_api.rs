//! [SQL API](https://docs.snowflake.com/en/developer-guide/sql-api/reference) transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    CloseError, Column, ConnectError, ConnectOptions, Connection, QueryError, ResultSet,
    json_headers,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Value of the `X-Snowflake-Authorization-Token-Type` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenType {
    KeyPairJwt,
    OAuth,
    ProgrammaticAccessToken,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::KeyPairJwt => "KEYPAIR_JWT",
            TokenType::OAuth => "OAUTH",
            TokenType::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

/// Bearer-token connection to `/api/v2/statements`.
///
/// The SQL API keeps no session on the server, closing only drops the client.
#[derive(Debug)]
pub struct SqlApiConnection {
    host: String,
    client: Option<reqwest::Client>,
    context: StatementContext,
}

/// Session context sent along with every statement.
#[derive(Clone, Debug, Default)]
struct StatementContext {
    timeout: Option<u32>,
    database: Option<String>,
    schema: Option<String>,
    warehouse: Option<String>,
    role: Option<String>,
}

impl SqlApiConnection {
    pub fn try_new(
        options: &ConnectOptions,
        token: &str,
        token_type: TokenType,
    ) -> Result<Self, ConnectError> {
        let mut headers = json_headers();
        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))?;
        authorization.set_sensitive(true);
        headers.append(AUTHORIZATION, authorization);
        headers.append(
            HeaderName::from_static("x-snowflake-authorization-token-type"),
            HeaderValue::from_static(token_type.as_str()),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(ConnectError::ClientBuild)?;
        Ok(SqlApiConnection {
            host: format!("{}/api/v2/", options.base_url()),
            client: Some(client),
            context: StatementContext {
                timeout: options.timeout,
                database: options.database.clone(),
                schema: options.schema.clone(),
                warehouse: options.warehouse.clone(),
                role: options.role.clone(),
            },
        })
    }

    fn statements_url(&self, request_id: &uuid::Uuid) -> String {
        format!("{}statements?requestId={request_id}", self.host)
    }

    fn status_url(&self, handle: &StatementHandle) -> String {
        format!("{}statements/{handle}", self.host)
    }

    /// Polls a running statement until it finishes.
    /// A statement that can no longer be observed is cancelled before giving up.
    async fn wait_for(
        &self,
        client: &reqwest::Client,
        handle: &StatementHandle,
    ) -> Result<StatementResponse, QueryError> {
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            debug!(%handle, "polling statement");
            let outcome = match client.get(self.status_url(handle)).send().await {
                Ok(response) => StatementOutcome::read(response).await,
                Err(error) => Err(QueryError::Request(error)),
            };
            match outcome {
                Ok(StatementOutcome::Finished(response)) => return Ok(response),
                Ok(StatementOutcome::Running(_)) => continue,
                Err(error @ QueryError::Statement(_)) => return Err(error),
                Err(error) => {
                    self.cancel(client, handle).await;
                    return Err(error);
                }
            }
        }
    }

    async fn cancel(&self, client: &reqwest::Client, handle: &StatementHandle) {
        let url = format!("{}/cancel", self.status_url(handle));
        match client.post(url).send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(%handle, "cancelled statement");
            }
            Ok(response) => warn!(%handle, status = %response.status(), "could not cancel statement"),
            Err(error) => warn!(%handle, %error, "could not cancel statement"),
        }
    }

    /// Fetches partitions `1..` of a multi-partition result, partition `0` came with the response.
    async fn remaining_partitions(
        &self,
        client: &reqwest::Client,
        response: &mut StatementResponse,
    ) -> Result<(), QueryError> {
        let row_counts: Vec<usize> = response
            .result_set_meta_data
            .partition_info
            .iter()
            .map(|info| info.row_count)
            .collect();
        for (partition, rows) in row_counts.into_iter().enumerate().skip(1) {
            debug!(handle = %response.statement_handle, partition, rows, "fetching partition");
            let r = client
                .get(self.status_url(&response.statement_handle))
                .query(&[("partition", partition)])
                .send()
                .await
                .map_err(QueryError::Request)?;
            let mut data = read_partition(r).await?;
            response.data.append(&mut data);
        }
        Ok(())
    }
}

/// Rows of one extra partition. Snowflake gzips these, reqwest inflates them.
async fn read_partition(r: reqwest::Response) -> Result<Vec<Vec<Option<String>>>, QueryError> {
    match r.status() {
        StatusCode::OK => Ok(r
            .json::<PartitionResponse>()
            .await
            .map_err(QueryError::Decode)?
            .data),
        status => {
            let body = r.text().await.unwrap_or_default();
            Err(QueryError::Unknown { status, body })
        }
    }
}

#[async_trait]
impl Connection for SqlApiConnection {
    async fn execute(&self, statement: &str) -> Result<ResultSet, QueryError> {
        let client = self.client.as_ref().ok_or(QueryError::Closed)?;
        let request_id = uuid::Uuid::new_v4();
        debug!(%request_id, statement, "submitting statement");
        let request = StatementRequest {
            statement,
            timeout: self.context.timeout,
            database: self.context.database.as_deref(),
            schema: self.context.schema.as_deref(),
            warehouse: self.context.warehouse.as_deref(),
            role: self.context.role.as_deref(),
        };
        let r = client
            .post(self.statements_url(&request_id))
            .json(&request)
            .send()
            .await
            .map_err(QueryError::Request)?;
        let mut response = match StatementOutcome::read(r).await? {
            StatementOutcome::Finished(response) => response,
            StatementOutcome::Running(status) => {
                self.wait_for(client, status.statement_handle()).await?
            }
        };
        self.remaining_partitions(client, &mut response).await?;
        Ok(response.into_result_set())
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        self.client.take().map(drop).ok_or(CloseError::AlreadyClosed)
    }
}

/// Body of `POST /api/v2/statements`
#[derive(Serialize, Debug)]
struct StatementRequest<'a> {
    statement: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

enum StatementOutcome {
    Finished(StatementResponse),
    Running(QueryStatus),
}

impl StatementOutcome {
    async fn read(r: reqwest::Response) -> Result<Self, QueryError> {
        match r.status() {
            StatusCode::OK => Ok(StatementOutcome::Finished(
                r.json().await.map_err(QueryError::Decode)?,
            )),
            StatusCode::ACCEPTED | StatusCode::REQUEST_TIMEOUT => Ok(StatementOutcome::Running(
                r.json().await.map_err(QueryError::Decode)?,
            )),
            StatusCode::UNPROCESSABLE_ENTITY => Err(QueryError::Statement(
                r.json().await.map_err(QueryError::Decode)?,
            )),
            status => {
                let body = r.text().await.unwrap_or_default();
                Err(QueryError::Unknown { status, body })
            }
        }
    }
}

/// [ResultSet](https://docs.snowflake.com/en/developer-guide/sql-api/reference#label-sql-api-reference-resultset)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    result_set_meta_data: MetaData,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    statement_handle: StatementHandle,
}

impl StatementResponse {
    fn into_result_set(self) -> ResultSet {
        ResultSet {
            columns: self
                .result_set_meta_data
                .row_type
                .into_iter()
                .map(|row_type| Column::new(row_type.name, row_type.data_type))
                .collect(),
            rows: self.data,
        }
    }
}

/// [ResultSetMetaData](https://docs.snowflake.com/en/developer-guide/sql-api/reference#label-sql-api-reference-resultset-resultsetmetadata)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MetaData {
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Deserialize, Debug)]
struct RowType {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[serde(default)]
    row_count: usize,
}

#[derive(Deserialize, Debug)]
struct PartitionResponse {
    data: Vec<Vec<Option<String>>>,
}

/// A unique tag that identifies a SQL statement request
#[derive(Deserialize, Clone, Debug)]
#[serde(transparent)]
pub struct StatementHandle(String);

impl StatementHandle {
    pub fn handle(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// [QueryStatus](https://docs.snowflake.com/en/developer-guide/sql-api/reference#label-sql-api-reference-querystatus)
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatus {
    code: String,
    #[serde(default)]
    message: String,
    statement_handle: StatementHandle,
}

impl QueryStatus {
    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn statement_handle(&self) -> &StatementHandle {
        &self.statement_handle
    }
}

/// [QueryFailureStatus](https://docs.snowflake.com/en/developer-guide/sql-api/reference#label-sql-api-reference-queryfailurestatus)
#[derive(Deserialize, thiserror::Error, Debug)]
#[serde(rename_all = "camelCase")]
#[error("Error for statement {statement_handle}: {message}")]
pub struct QueryFailureStatus {
    code: String,
    #[serde(default)]
    sql_state: String,
    message: String,
    statement_handle: StatementHandle,
}

impl QueryFailureStatus {
    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn sql_state(&self) -> &str {
        &self.sql_state
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn statement_handle(&self) -> &StatementHandle {
        &self.statement_handle
    }
}
