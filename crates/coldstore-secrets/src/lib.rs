//! coldstore-secrets: request-signing credentials
//!
//! Discovery chain (in order of precedence):
//!   1. $COLDSTORE_ACCESS_KEY_ID / $COLDSTORE_SECRET_ACCESS_KEY
//!   2. $AWS_ACCESS_KEY_ID / $AWS_SECRET_ACCESS_KEY
//!   3. `credentials.access_key_id` from config.toml (access key only)
//!   4. interactive prompt on the terminal (secret input is hidden)
//!
//! The secret key is never read from the config file or the command line.

pub mod prompt;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use coldstore_core::config::ColdstoreConfig;

pub use prompt::{Prompt, TerminalPrompt};

/// Credentials used to sign every request. Read-only once loaded.
pub struct Credentials {
    pub access_key_id: String,
    secret_access_key: SecretString,
    pub region: String,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: SecretString,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key,
            region: region.into(),
        }
    }

    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            access_key_id: self.access_key_id.clone(),
            secret_access_key: SecretString::from(self.secret_access_key().to_string()),
            region: self.region.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("region", &self.region)
            .finish()
    }
}

const ACCESS_KEY_VARS: [&str; 2] = ["COLDSTORE_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"];
const SECRET_KEY_VARS: [&str; 2] = ["COLDSTORE_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"];

/// Load credentials from the process environment, config, and terminal.
pub fn load(config: &ColdstoreConfig) -> Result<Credentials> {
    load_with(config, |name| std::env::var(name).ok(), &TerminalPrompt)
}

/// Load credentials with an explicit variable lookup and prompt.
pub fn load_with<F>(config: &ColdstoreConfig, lookup: F, prompt: &dyn Prompt) -> Result<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = |names: &[&'static str]| {
        names
            .iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()).map(|v| (*name, v)))
    };

    let access_key_id = match from_env(&ACCESS_KEY_VARS) {
        Some((source, key)) => {
            tracing::debug!(source, "access key id from environment");
            key
        }
        None => match config
            .credentials
            .access_key_id
            .as_ref()
            .filter(|k| !k.trim().is_empty())
        {
            Some(key) => {
                tracing::debug!("access key id from config");
                key.clone()
            }
            None => prompt
                .ask("Access key id: ")
                .context("reading access key id")?,
        },
    };

    let secret = match from_env(&SECRET_KEY_VARS) {
        Some((source, secret)) => {
            tracing::debug!(source, "secret access key from environment");
            SecretString::from(secret)
        }
        None => prompt
            .ask_hidden("Secret access key: ")
            .context("reading secret access key")?,
    };

    if access_key_id.trim().is_empty() {
        anyhow::bail!("access key id must not be empty");
    }
    if secret.expose_secret().is_empty() {
        anyhow::bail!("secret access key must not be empty");
    }

    Ok(Credentials::new(
        access_key_id.trim(),
        secret,
        config.client.region.clone(),
    ))
}
