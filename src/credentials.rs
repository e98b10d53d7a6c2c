//! Loading the JSON credentials file and turning it into [ConnectOptions].

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use snowflake_client::{Authentication, ConnectOptions, PrivateKey};

/// Keys that may carry a private key, in lookup order.
const PRIVATE_KEY_FILE_FIELDS: [&str; 2] = ["private_key_file", "private_key_path"];

/// Connection parameters exactly as found in the credentials file.
///
/// The only change made on load is copying `username` into `user` when `user` is absent.
#[derive(Clone, PartialEq)]
pub struct Credentials(Map<String, Value>);

impl Credentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| CredentialsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, CredentialsError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Err(CredentialsError::NotAnObject),
        }
    }

    pub fn from_map(mut map: Map<String, Value>) -> Self {
        if !map.contains_key("user") {
            if let Some(username) = map.get("username").cloned() {
                map.insert("user".into(), username);
            }
        }
        Credentials(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Typed view used to open the connection. Fields the connector does not know are ignored.
    pub fn connect_options(&self) -> Result<ConnectOptions, CredentialsError> {
        let account = self.required_string("account")?;
        let user = self.required_string("user")?;
        let mut options = ConnectOptions::new(account, user, self.authentication()?);
        options.host = self.optional_string("host")?;
        options.role = self.optional_string("role")?;
        options.warehouse = self.optional_string("warehouse")?;
        options.database = self.optional_string("database")?;
        options.schema = self.optional_string("schema")?;
        options.timeout = match self.get("timeout") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .and_then(|timeout| u32::try_from(timeout).ok())
                    .ok_or(CredentialsError::InvalidField {
                        field: "timeout",
                        expected: "a number of seconds",
                    })?,
            ),
        };
        Ok(options)
    }

    fn authentication(&self) -> Result<Authentication, CredentialsError> {
        if self.get("private_key_file_pwd").is_some_and(|pwd| !pwd.is_null()) {
            return Err(CredentialsError::EncryptedKey);
        }
        let private_key = self.private_key()?;
        let authenticator = self
            .optional_string("authenticator")?
            .map(|authenticator| authenticator.to_ascii_lowercase());

        match (authenticator.as_deref(), private_key) {
            (None | Some("snowflake_jwt"), Some(private_key)) => {
                Ok(Authentication::KeyPair(private_key))
            }
            (Some("snowflake_jwt"), None) => Err(CredentialsError::MissingField("private_key_file")),
            (None | Some("snowflake"), _) => {
                Ok(Authentication::Password(self.required_string("password")?))
            }
            (Some("oauth"), _) => Ok(Authentication::OAuth(self.required_string("token")?)),
            (Some("programmatic_access_token"), _) => Ok(Authentication::ProgrammaticAccessToken(
                self.required_string("token")?,
            )),
            (Some(other), _) => Err(CredentialsError::UnsupportedAuthenticator(other.to_owned())),
        }
    }

    fn private_key(&self) -> Result<Option<PrivateKey>, CredentialsError> {
        for field in PRIVATE_KEY_FILE_FIELDS {
            if let Some(path) = self.optional_string(field)? {
                return Ok(Some(PrivateKey::Path(PathBuf::from(path))));
            }
        }
        Ok(self.optional_string("private_key")?.map(PrivateKey::Pem))
    }

    fn required_string(&self, field: &'static str) -> Result<String, CredentialsError> {
        self.optional_string(field)?
            .ok_or(CredentialsError::MissingField(field))
    }

    fn optional_string(&self, field: &'static str) -> Result<Option<String>, CredentialsError> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(CredentialsError::InvalidField {
                field,
                expected: "a string",
            }),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credentials")
            .field(&self.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Error loading credentials or reading connection options out of them
#[derive(thiserror::Error, Debug)]
pub enum CredentialsError {
    #[error("failed to read credentials file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("credentials file is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("credentials file must contain a json object")]
    NotAnObject,
    #[error("credentials are missing `{0}`")]
    MissingField(&'static str),
    #[error("credential `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unsupported authenticator `{0}`")]
    UnsupportedAuthenticator(String),
    #[error("encrypted private keys are not supported, decrypt the key first")]
    EncryptedKey,
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn credentials(json: &str) -> Credentials {
        Credentials::from_json(json).expect("valid credentials json")
    }

    #[test]
    fn username_becomes_user() {
        let credentials = credentials(r#"{"username": "alice", "account": "X"}"#);
        assert_eq!(credentials.get("user"), Some(&Value::from("alice")));
        assert_eq!(credentials.get("username"), Some(&Value::from("alice")));
        assert_eq!(credentials.get("account"), Some(&Value::from("X")));
    }

    #[test]
    fn user_is_not_overwritten() {
        let credentials = credentials(r#"{"user": "bob", "username": "alice"}"#);
        assert_eq!(credentials.get("user"), Some(&Value::from("bob")));
    }

    #[test]
    fn load_from_file() -> Result<(), anyhow::Error> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"account": "xy12345", "username": "alice", "password": "hunter2", "warehouse": "WH"}}"#
        )?;
        let credentials = Credentials::load(file.path())?;
        assert_eq!(credentials.get("user"), Some(&Value::from("alice")));
        let options = credentials.connect_options()?;
        assert_eq!(options.account, "xy12345");
        assert_eq!(options.user, "alice");
        assert_eq!(options.warehouse.as_deref(), Some("WH"));
        assert!(matches!(options.authentication, Authentication::Password(ref p) if p == "hunter2"));
        Ok(())
    }

    #[test]
    fn missing_file() {
        let error = Credentials::load("./no/such/snowflake_credential.json")
            .expect_err("file does not exist");
        match error {
            CredentialsError::Read { path, source } => {
                assert_eq!(path, PathBuf::from("./no/such/snowflake_credential.json"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            Credentials::from_json(r#"{"account": "#),
            Err(CredentialsError::Parse(_))
        ));
        assert!(matches!(
            Credentials::from_json(r#"["account"]"#),
            Err(CredentialsError::NotAnObject)
        ));
    }

    #[test]
    fn key_pair_selected_by_private_key_file() -> Result<(), anyhow::Error> {
        let options = credentials(
            r#"{"account": "xy12345", "user": "alice", "private_key_file": "rsa_key.p8"}"#,
        )
        .connect_options()?;
        assert!(matches!(
            options.authentication,
            Authentication::KeyPair(PrivateKey::Path(ref path)) if path == &PathBuf::from("rsa_key.p8")
        ));
        Ok(())
    }

    #[test]
    fn authenticator_is_case_insensitive() -> Result<(), anyhow::Error> {
        let options = credentials(
            r#"{"account": "xy12345", "user": "alice", "authenticator": "OAUTH", "token": "abc"}"#,
        )
        .connect_options()?;
        assert!(matches!(options.authentication, Authentication::OAuth(ref t) if t == "abc"));

        let options = credentials(
            r#"{"account": "xy12345", "user": "alice",
                "authenticator": "programmatic_access_token", "token": "pat"}"#,
        )
        .connect_options()?;
        assert!(matches!(
            options.authentication,
            Authentication::ProgrammaticAccessToken(ref t) if t == "pat"
        ));
        Ok(())
    }

    #[test]
    fn rejected_authentication() {
        let unsupported = credentials(
            r#"{"account": "xy12345", "user": "alice", "authenticator": "externalbrowser"}"#,
        )
        .connect_options();
        assert!(matches!(
            unsupported,
            Err(CredentialsError::UnsupportedAuthenticator(ref a)) if a == "externalbrowser"
        ));

        let encrypted = credentials(
            r#"{"account": "xy12345", "user": "alice",
                "private_key_file": "rsa_key.p8", "private_key_file_pwd": "secret"}"#,
        )
        .connect_options();
        assert!(matches!(encrypted, Err(CredentialsError::EncryptedKey)));

        let no_password = credentials(r#"{"account": "xy12345", "user": "alice"}"#).connect_options();
        assert!(matches!(no_password, Err(CredentialsError::MissingField("password"))));
    }

    #[test]
    fn invalid_field_types() {
        let account = credentials(r#"{"account": 42, "user": "alice", "password": "p"}"#)
            .connect_options();
        assert!(matches!(
            account,
            Err(CredentialsError::InvalidField { field: "account", .. })
        ));

        let timeout = credentials(
            r#"{"account": "xy12345", "user": "alice", "password": "p", "timeout": "soon"}"#,
        )
        .connect_options();
        assert!(matches!(
            timeout,
            Err(CredentialsError::InvalidField { field: "timeout", .. })
        ));
    }

    #[test]
    fn debug_lists_keys_only() {
        let rendered = format!(
            "{:?}",
            credentials(r#"{"account": "xy12345", "password": "hunter2"}"#)
        );
        assert!(rendered.contains("account"));
        assert!(!rendered.contains("hunter2"));
    }
}
