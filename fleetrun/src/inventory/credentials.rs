//! Device credentials.
//!
//! The engine never looks inside these; they travel with the host to
//! whichever backend serves it.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

/// Login material for a device.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// Login user.
    pub username: String,

    /// Password, also used for in-session prompts such as `enable`.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Path to a private key file.
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Passphrase for an encrypted private key.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub passphrase: Option<SecretString>,
}

impl Credentials {
    /// Credentials with a username only.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            private_key: None,
            passphrase: None,
        }
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the private key path.
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Set the private key passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(SecretString::from(passphrase.into()));
        self
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}
