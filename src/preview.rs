//! The two canned queries and the run that prints them.

use std::io::Write;

use snowflake_client::{Connect, Connection, QueryError, ResultSet};
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::PreviewError;
use crate::format::render_markdown;

const SHOW_DATABASES: &str = "SHOW DATABASES";
/// How many database names are printed.
const LISTED_DATABASES: usize = 10;

/// Database names in server order, taken from the second column of `SHOW DATABASES`.
pub async fn list_databases(connection: &dyn Connection) -> Result<Vec<String>, PreviewError> {
    let result = connection.execute(SHOW_DATABASES).await?;
    result
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, mut row)| match row.get_mut(1).map(Option::take) {
            Some(Some(name)) => Ok(name),
            Some(None) => Err(PreviewError::UnexpectedShape {
                statement: SHOW_DATABASES,
                reason: format!("row {i} has no database name"),
            }),
            None => Err(PreviewError::UnexpectedShape {
                statement: SHOW_DATABASES,
                reason: format!("row {i} has {} columns, expected at least 2", row.len()),
            }),
        })
        .collect()
}

/// `SELECT *` with a row limit. Identifiers are quoted but not escaped, so they must not
/// contain `"` themselves.
pub fn sample_rows_sql(database: &str, schema: &str, table: &str, limit: u32) -> String {
    format!(r#"SELECT * FROM "{database}"."{schema}"."{table}" LIMIT {limit}"#)
}

/// Up to `limit` rows of `database.schema.table`. An empty table gives an empty result that
/// still carries the column names.
pub async fn fetch_sample_rows(
    connection: &dyn Connection,
    database: &str,
    schema: &str,
    table: &str,
    limit: u32,
) -> Result<ResultSet, QueryError> {
    connection
        .execute(&sample_rows_sql(database, schema, table, limit))
        .await
}

/// Loads credentials, connects, prints the database list and the preview.
///
/// Once connected, the connection is closed exactly once no matter how the queries went.
/// When both a query and the close fail, the query error wins and the close error is logged.
pub async fn run<W: Write>(
    config: &Config,
    connector: &dyn Connect,
    out: &mut W,
) -> Result<(), PreviewError> {
    let credentials = Credentials::load(&config.cred_path)?;
    let options = credentials.connect_options()?;

    writeln!(
        out,
        "Connecting to Snowflake account {} as {}...",
        options.account, options.user
    )?;
    let mut connection = connector.connect(&options).await?;
    info!(account = %options.account, "connected");

    let outcome = preview(connection.as_ref(), config, out).await;
    let closed = connection.close().await;
    match (outcome, closed) {
        (Err(error), Err(close_error)) => {
            warn!(%close_error, "failed to close connection");
            Err(error)
        }
        (Err(error), Ok(())) => Err(error),
        (Ok(()), closed) => Ok(closed?),
    }
}

async fn preview<W: Write>(
    connection: &dyn Connection,
    config: &Config,
    out: &mut W,
) -> Result<(), PreviewError> {
    writeln!(out, "\nAvailable databases (first {LISTED_DATABASES}):")?;
    let databases = list_databases(connection).await?;
    for name in databases.iter().take(LISTED_DATABASES) {
        writeln!(out, "- {name}")?;
    }

    writeln!(
        out,
        "\nPreviewing {}.{}.{} (limit {})...",
        config.database, config.schema, config.table, config.limit
    )?;
    let rows = fetch_sample_rows(
        connection,
        &config.database,
        &config.schema,
        &config.table,
        config.limit,
    )
    .await?;
    if rows.is_empty() {
        writeln!(out, "Table is empty or not found.")?;
    } else {
        writeln!(out, "{}", render_markdown(&rows))?;
    }
    Ok(())
}
