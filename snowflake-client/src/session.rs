//! Password login through the session endpoints Snowflake's own drivers use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    CloseError, Column, ConnectError, ConnectOptions, Connection, QueryError, ResultSet,
    json_headers,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Codes returned while a statement is still executing.
const IN_PROGRESS_CODES: [&str; 2] = ["333333", "333334"];

/// A logged-in session, logged out again by [close](Connection::close).
#[derive(Debug)]
pub struct SessionConnection {
    base_url: String,
    client: reqwest::Client,
    token: Option<HeaderValue>,
    sequence_id: AtomicU64,
}

impl SessionConnection {
    pub async fn login(options: &ConnectOptions, password: &str) -> Result<Self, ConnectError> {
        let client = reqwest::Client::builder()
            .default_headers(json_headers())
            .build()
            .map_err(ConnectError::ClientBuild)?;
        let base_url = options.base_url();
        let request_id = uuid::Uuid::new_v4().to_string();
        let account_name = options.account_name();

        let mut query = vec![("request_id", request_id.as_str())];
        for (key, value) in [
            ("databaseName", &options.database),
            ("schemaName", &options.schema),
            ("warehouse", &options.warehouse),
            ("roleName", &options.role),
        ] {
            if let Some(value) = value {
                query.push((key, value.as_str()));
            }
        }

        let body = LoginRequest {
            data: LoginRequestData {
                client_app_id: env!("CARGO_PKG_NAME"),
                client_app_version: env!("CARGO_PKG_VERSION"),
                account_name: &account_name,
                login_name: &options.user,
                password,
                client_environment: ClientEnvironment {
                    application: env!("CARGO_PKG_NAME"),
                    os: std::env::consts::OS,
                },
                session_parameters: options
                    .timeout
                    .map(|timeout| {
                        HashMap::from([(
                            "STATEMENT_TIMEOUT_IN_SECONDS",
                            serde_json::Value::from(timeout),
                        )])
                    })
                    .unwrap_or_default(),
            },
        };

        debug!(%request_id, "sending login request");
        let envelope: Envelope<LoginData> = client
            .post(format!("{base_url}/session/v1/login-request"))
            .query(&query)
            .json(&body)
            .send()
            .await
            .map_err(ConnectError::Request)?
            .json()
            .await
            .map_err(ConnectError::Decode)?;
        let (token, session_id) = match envelope {
            Envelope {
                success: true,
                data:
                    Some(LoginData {
                        token: Some(token),
                        session_id,
                    }),
                ..
            } => (token, session_id),
            envelope => {
                let (code, message) = envelope.failure();
                return Err(ConnectError::Rejected { code, message });
            }
        };

        let mut token = HeaderValue::from_str(&format!("Snowflake Token=\"{token}\""))?;
        token.set_sensitive(true);
        info!(?session_id, "logged in");
        Ok(SessionConnection {
            base_url,
            client,
            token: Some(token),
            sequence_id: AtomicU64::new(0),
        })
    }

    fn headers(&self) -> Result<HeaderMap, QueryError> {
        let token = self.token.clone().ok_or(QueryError::Closed)?;
        let mut headers = HeaderMap::with_capacity(1);
        headers.append(AUTHORIZATION, token);
        Ok(headers)
    }

    async fn query_envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, QueryError> {
        let r = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(QueryError::Request)?;
        let status = r.status();
        if !status.is_success() {
            let body = r.text().await.unwrap_or_default();
            return Err(QueryError::Unknown { status, body });
        }
        r.json().await.map_err(QueryError::Decode)
    }
}

#[async_trait]
impl Connection for SessionConnection {
    async fn execute(&self, statement: &str) -> Result<ResultSet, QueryError> {
        let request_id = uuid::Uuid::new_v4();
        let sequence_id = self.sequence_id.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(%request_id, sequence_id, statement, "submitting statement");
        let body = QueryRequest {
            sql_text: statement,
            async_exec: false,
            sequence_id,
            is_internal: false,
        };
        let request = self
            .client
            .post(format!("{}/queries/v1/query-request", self.base_url))
            .query(&[("requestId", request_id.to_string())])
            .json(&body);
        let mut envelope: Envelope<QueryData> = self.query_envelope(request).await?;

        while envelope.is_in_progress() {
            let Some(result_url) = envelope.data.as_ref().and_then(|d| d.get_result_url.clone())
            else {
                return Err(QueryError::UnsupportedResult(
                    "statement is still running but no result url was returned".into(),
                ));
            };
            tokio::time::sleep(POLL_INTERVAL).await;
            debug!(%request_id, "polling statement");
            let request = self.client.get(format!("{}{result_url}", self.base_url));
            envelope = self.query_envelope(request).await?;
        }

        envelope.into_result_set()
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        let token = self.token.take().ok_or(CloseError::AlreadyClosed)?;
        let request_id = uuid::Uuid::new_v4().to_string();
        let envelope: Envelope<serde_json::Value> = self
            .client
            .post(format!("{}/session", self.base_url))
            .query(&[("delete", "true"), ("request_id", request_id.as_str())])
            .header(AUTHORIZATION, token)
            .send()
            .await
            .map_err(CloseError::Request)?
            .json()
            .await
            .map_err(CloseError::Decode)?;
        if envelope.success {
            info!("logged out");
            Ok(())
        } else {
            let (code, message) = envelope.failure();
            Err(CloseError::Rejected { code, message })
        }
    }
}

#[derive(Serialize, Debug)]
struct LoginRequest<'a> {
    data: LoginRequestData<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginRequestData<'a> {
    client_app_id: &'a str,
    client_app_version: &'a str,
    account_name: &'a str,
    login_name: &'a str,
    password: &'a str,
    client_environment: ClientEnvironment<'a>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    session_parameters: HashMap<&'a str, serde_json::Value>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct ClientEnvironment<'a> {
    application: &'a str,
    os: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    is_internal: bool,
}

/// Wrapper around every session endpoint response.
#[derive(Deserialize, Debug)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    success: bool,
}

impl<T> Envelope<T> {
    fn failure(self) -> (String, String) {
        (
            self.code.unwrap_or_else(|| "N/A".into()),
            self.message.unwrap_or_else(|| "no message".into()),
        )
    }

    fn is_in_progress(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| IN_PROGRESS_CODES.contains(&code))
    }
}

impl Envelope<QueryData> {
    /// Rows of a finished statement, or the failure Snowflake reported for it.
    fn into_result_set(self) -> Result<ResultSet, QueryError> {
        match self {
            Envelope {
                success: true,
                data: Some(data),
                ..
            } => data.into_result_set(),
            envelope => {
                let (code, message) = envelope.failure();
                Err(QueryError::Session { code, message })
            }
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    session_id: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<SessionRowType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    rowset_base64: Option<String>,
    #[serde(default)]
    query_result_format: Option<String>,
    #[serde(default)]
    chunks: Vec<serde_json::Value>,
    #[serde(default)]
    get_result_url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SessionRowType {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
}

impl QueryData {
    fn into_result_set(self) -> Result<ResultSet, QueryError> {
        let format = self.query_result_format.as_deref().unwrap_or("json");
        if !format.eq_ignore_ascii_case("json")
            || self.rowset_base64.as_deref().is_some_and(|r| !r.is_empty())
        {
            return Err(QueryError::UnsupportedResult(format!(
                "result format `{format}`"
            )));
        }
        if !self.chunks.is_empty() {
            return Err(QueryError::UnsupportedResult(format!(
                "result split into {} remote chunks",
                self.chunks.len()
            )));
        }
        Ok(ResultSet {
            columns: self
                .rowtype
                .into_iter()
                .map(|row_type| Column::new(row_type.name, row_type.data_type))
                .collect(),
            rows: self.rowset,
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::Authentication;
    use crate::test_server::{response, serve};

    #[test]
    fn login_request_body() -> Result<(), anyhow::Error> {
        let body = LoginRequest {
            data: LoginRequestData {
                client_app_id: "app",
                client_app_version: "1.0.0",
                account_name: "XY12345",
                login_name: "alice",
                password: "hunter2",
                client_environment: ClientEnvironment {
                    application: "app",
                    os: "linux",
                },
                session_parameters: HashMap::new(),
            },
        };
        assert_eq!(
            serde_json::to_value(&body)?,
            serde_json::json!({
                "data": {
                    "CLIENT_APP_ID": "app",
                    "CLIENT_APP_VERSION": "1.0.0",
                    "ACCOUNT_NAME": "XY12345",
                    "LOGIN_NAME": "alice",
                    "PASSWORD": "hunter2",
                    "CLIENT_ENVIRONMENT": { "APPLICATION": "app", "OS": "linux" }
                }
            })
        );
        Ok(())
    }

    #[test]
    fn rejected_login() -> Result<(), anyhow::Error> {
        let envelope: Envelope<LoginData> = serde_json::from_str(
            r#"{
                "data": { "nextAction": "RETRY_LOGIN", "authnMethod": "USERNAME_PASSWORD" },
                "code": "390100",
                "message": "Incorrect username or password was specified.",
                "success": false,
                "headers": null
            }"#,
        )?;
        assert!(!envelope.success);
        assert!(envelope.data.as_ref().is_some_and(|data| data.token.is_none()));
        assert_eq!(
            envelope.failure(),
            (
                "390100".to_owned(),
                "Incorrect username or password was specified.".to_owned()
            )
        );
        Ok(())
    }

    #[test]
    fn query_response_into_result_set() -> Result<(), anyhow::Error> {
        let envelope: Envelope<QueryData> = serde_json::from_str(
            r#"{
                "data": {
                    "parameters": [],
                    "rowtype": [
                        { "name": "created_on", "type": "timestamp_ltz", "nullable": true },
                        { "name": "name", "type": "text", "nullable": true }
                    ],
                    "rowset": [
                        ["2024-01-01 00:00:00.000 -0800", "DB_A"],
                        ["2024-01-02 00:00:00.000 -0800", "DB_B"]
                    ],
                    "total": 2,
                    "returned": 2,
                    "queryId": "01b2c3d4",
                    "queryResultFormat": "json"
                },
                "code": null,
                "message": null,
                "success": true
            }"#,
        )?;
        assert!(!envelope.is_in_progress());
        let result = envelope.into_result_set()?;
        assert_eq!(result.column_names().collect::<Vec<_>>(), ["created_on", "name"]);
        assert_eq!(result.rows[1][1].as_deref(), Some("DB_B"));
        Ok(())
    }

    #[test]
    fn in_progress_response() -> Result<(), anyhow::Error> {
        let envelope: Envelope<QueryData> = serde_json::from_str(
            r#"{
                "data": { "queryId": "01b2c3d4", "getResultUrl": "/queries/01b2c3d4/result" },
                "code": "333334",
                "message": "Asynchronous execution in progress.",
                "success": true
            }"#,
        )?;
        assert!(envelope.is_in_progress());
        assert_eq!(
            envelope.data.and_then(|d| d.get_result_url).as_deref(),
            Some("/queries/01b2c3d4/result")
        );
        Ok(())
    }

    #[test]
    fn arrow_results_are_rejected() {
        let data = QueryData {
            rowtype: Vec::new(),
            rowset: Vec::new(),
            rowset_base64: Some("QVJST1cx".into()),
            query_result_format: Some("arrow".into()),
            chunks: Vec::new(),
            get_result_url: None,
        };
        assert!(matches!(
            data.into_result_set(),
            Err(QueryError::UnsupportedResult(_))
        ));
    }

    #[test]
    fn failed_statement_is_session_error() -> Result<(), anyhow::Error> {
        let envelope: Envelope<QueryData> = serde_json::from_str(
            r#"{
                "data": { "queryId": "01b2c3d4", "sqlState": "42S02" },
                "code": "002003",
                "message": "SQL compilation error:\nObject 'D.S.T' does not exist or not authorized.",
                "success": false
            }"#,
        )?;
        assert!(!envelope.is_in_progress());
        match envelope.into_result_set() {
            Err(QueryError::Session { code, message }) => {
                assert_eq!(code, "002003");
                assert!(message.contains("does not exist"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(result) => panic!("unexpected rows: {result:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn login_poll_and_logout() -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let mut options = ConnectOptions::new(
            "xy12345",
            "alice",
            Authentication::Password("hunter2".into()),
        );
        options.host = Some(format!("http://{}", listener.local_addr()?));
        options.warehouse = Some("COMPUTE_WH".into());

        let server = serve(
            listener,
            vec![
                response(
                    "200 OK",
                    "",
                    br#"{"data": {"token": "session-token", "sessionId": 42}, "code": null, "message": null, "success": true}"#,
                ),
                response(
                    "200 OK",
                    "",
                    br#"{"data": {"queryId": "01b2c3d4", "getResultUrl": "/queries/01b2c3d4/result"},
                        "code": "333334", "message": "Asynchronous execution in progress.", "success": true}"#,
                ),
                response(
                    "200 OK",
                    "",
                    br#"{"data": {"rowtype": [{"name": "name", "type": "text"}], "rowset": [["DB_A"]],
                        "queryResultFormat": "json"}, "code": null, "message": null, "success": true}"#,
                ),
                response(
                    "200 OK",
                    "",
                    br#"{"data": null, "code": null, "message": null, "success": true}"#,
                ),
            ],
        );

        let mut connection = SessionConnection::login(&options, "hunter2").await?;
        let result = connection.execute("SHOW DATABASES").await?;
        assert_eq!(result.rows, [vec![Some("DB_A".to_owned())]]);
        connection.close().await?;
        assert!(matches!(
            connection.execute("SHOW DATABASES").await,
            Err(QueryError::Closed)
        ));

        let requests = server.await??;
        assert!(requests[0].starts_with("POST /session/v1/login-request?request_id="));
        assert!(requests[0].contains("warehouse=COMPUTE_WH"));
        assert!(requests[1].starts_with("POST /queries/v1/query-request?requestId="));
        assert_eq!(requests[2], "GET /queries/01b2c3d4/result HTTP/1.1");
        assert!(requests[3].starts_with("POST /session?delete=true&request_id="));
        Ok(())
    }
}
