use std::path::Path;

use base64::Engine;
use jwt_simple::prelude::*;

use crate::options::PrivateKey;

/// Signs a key-pair authentication token for `ACCOUNT.USER`.
///
/// Snowflake identifies the public key by the standard (padded) base64 form of its
/// SHA-256 fingerprint, while `jwt_simple` hands out the url-safe unpadded form.
pub fn create_token(
    key_pair: &RS256KeyPair,
    account_identifier: &str,
    user: &str,
) -> Result<String, KeyPairError> {
    let thumbprint = key_pair.public_key().sha256_thumbprint();
    let fingerprint = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(thumbprint)
        .map_err(|error| KeyPairError::FingerprintGeneration(error.into()))?;
    let fingerprint = base64::engine::general_purpose::STANDARD.encode(fingerprint);

    let qualified_username = format!("{account_identifier}.{user}");
    let issuer = format!("{qualified_username}.SHA256:{fingerprint}");
    let claims = Claims::create(Duration::from_hours(1))
        .with_issuer(issuer)
        .with_subject(qualified_username);
    key_pair
        .sign(claims)
        .map_err(KeyPairError::KeyPairGeneration)
}

/// Loads the RSA key pair from an unencrypted PKCS#8 PEM, inline or on disk.
pub fn load_key_pair(private_key: &PrivateKey) -> Result<RS256KeyPair, LoadKeyPairError> {
    let pem = match private_key {
        PrivateKey::Pem(pem) => pem.clone(),
        PrivateKey::Path(path) => read_private_key(path)?,
    };
    Ok(RS256KeyPair::from_pem(&pem).map_err(KeyPairError::KeyPairGeneration)?)
}

fn read_private_key(path: &Path) -> Result<String, KeyFileReadError> {
    std::fs::read_to_string(path).map_err(|error| KeyFileReadError {
        error,
        path: path.display().to_string(),
    })
}

#[derive(thiserror::Error, Debug)]
pub enum LoadKeyPairError {
    #[error(transparent)]
    KeyPair(#[from] KeyPairError),
    #[error(transparent)]
    KeyFileRead(#[from] KeyFileReadError),
}

#[derive(thiserror::Error, Debug)]
#[error("failed to read private key at {path}: {error}")]
pub struct KeyFileReadError {
    error: std::io::Error,
    path: String,
}

#[derive(thiserror::Error, Debug)]
pub enum KeyPairError {
    #[error("failed to generate fingerprint from public key: {0}")]
    FingerprintGeneration(anyhow::Error),
    #[error("failed to generate key pair from private key: {0}")]
    KeyPairGeneration(anyhow::Error),
}
