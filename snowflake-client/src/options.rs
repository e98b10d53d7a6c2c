use std::path::PathBuf;

/// Everything needed to open a [Connection](crate::Connection).
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    /// Account identifier, e.g. `xy12345.us-east-1` or `myorg-myaccount`.
    pub account: String,
    /// Overrides `{account}.snowflakecomputing.com`.
    pub host: Option<String>,
    pub user: String,
    pub authentication: Authentication,
    pub role: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// Statement timeout in seconds, forwarded to Snowflake.
    pub timeout: Option<u32>,
}

impl ConnectOptions {
    pub fn new(
        account: impl Into<String>,
        user: impl Into<String>,
        authentication: Authentication,
    ) -> Self {
        ConnectOptions {
            account: account.into(),
            host: None,
            user: user.into(),
            authentication,
            role: None,
            warehouse: None,
            database: None,
            schema: None,
            timeout: None,
        }
    }

    /// `https://` origin every endpoint is resolved against, without a trailing slash.
    pub fn base_url(&self) -> String {
        match &self.host {
            Some(host) => {
                let host = host.trim_end_matches('/');
                if host.starts_with("https://") || host.starts_with("http://") {
                    host.to_owned()
                } else {
                    format!("https://{host}")
                }
            }
            None => format!("https://{}.snowflakecomputing.com", self.account),
        }
    }

    /// Account locator as Snowflake expects it in tokens and login requests:
    /// uppercase, without any region or cloud suffix.
    pub fn account_name(&self) -> String {
        self.account
            .split('.')
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase()
    }
}

/// How the user proves who they are.
#[derive(Clone)]
pub enum Authentication {
    /// Username and password through the session login endpoint.
    Password(String),
    /// Key-pair JWT through the SQL API.
    KeyPair(PrivateKey),
    /// OAuth access token through the SQL API.
    OAuth(String),
    /// Programmatic access token through the SQL API.
    ProgrammaticAccessToken(String),
}

impl Authentication {
    pub fn kind(&self) -> &'static str {
        match self {
            Authentication::Password(_) => "password",
            Authentication::KeyPair(_) => "key pair",
            Authentication::OAuth(_) => "oauth",
            Authentication::ProgrammaticAccessToken(_) => "programmatic access token",
        }
    }
}

impl std::fmt::Debug for Authentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authentication::KeyPair(PrivateKey::Path(path)) => {
                f.debug_tuple("KeyPair").field(path).finish()
            }
            _ => write!(f, "{}(<redacted>)", self.kind()),
        }
    }
}

#[derive(Clone, Debug)]
pub enum PrivateKey {
    Path(PathBuf),
    Pem(String),
}
