//! List the databases of a Snowflake account and preview a few rows of one table.
//!
//! ```text
//! snowflake-preview --cred_path credentials/snowflake_credential.json \
//!     --database ADVENTUREWORKS --schema ADVENTUREWORKS --table CURRENCYRATE --limit 5
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod format;
pub mod preview;

pub use config::Config;
pub use credentials::{Credentials, CredentialsError};
pub use error::PreviewError;
pub use preview::{fetch_sample_rows, list_databases, run};
pub use snowflake_client::{Connect, Connection, ResultSet, SnowflakeConnector};
