use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ColdstoreError;
use crate::types::PartSize;

/// Top-level client configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdstoreConfig {
    pub client: ClientConfig,
    pub credentials: CredentialsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service region (default: us-east-1)
    pub region: String,
    /// Endpoint override; empty means https://glacier.{region}.amazonaws.com
    pub endpoint: String,
    /// Multipart part size in MiB (power of two, default: 8)
    pub part_size_mib: u64,
    /// Attempts per request, including the first (default: 10)
    pub max_attempts: u32,
    /// Pause between attempts in milliseconds (default: 1000)
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds (default: 300)
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Access key id; the secret key is never read from config
    pub access_key_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl ClientConfig {
    pub fn part_size(&self) -> Result<PartSize, ColdstoreError> {
        PartSize::from_mib(self.part_size_mib)
    }

    /// The endpoint URL to talk to, derived from the region unless overridden
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://glacier.{}.amazonaws.com", self.region)
        } else {
            self.endpoint.trim_end_matches('/').to_string()
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject values that would only fail later, mid-upload
    pub fn validate(&self) -> Result<(), ColdstoreError> {
        if self.region.is_empty() {
            return Err(ColdstoreError::Config("client.region must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(ColdstoreError::Config("client.max_attempts must be at least 1".into()));
        }
        self.part_size()?;
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".into(),
            endpoint: String::new(),
            part_size_mib: 8,
            max_attempts: 10,
            retry_delay_ms: 1000,
            timeout_secs: 300,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[client]
region = "eu-west-1"
endpoint = "http://localhost:9000/"
part_size_mib = 64
max_attempts = 4
retry_delay_ms = 50
timeout_secs = 30

[credentials]
access_key_id = "AKIDEXAMPLE"

[log]
level = "debug"
format = "json"
"#;
        let config: ColdstoreConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.client.region, "eu-west-1");
        assert_eq!(config.client.endpoint_url(), "http://localhost:9000");
        assert_eq!(config.client.part_size().unwrap().mib(), 64);
        assert_eq!(config.client.max_attempts, 4);
        assert_eq!(config.client.retry_delay(), Duration::from_millis(50));
        assert_eq!(config.client.timeout(), Duration::from_secs(30));
        assert_eq!(config.credentials.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert_eq!(config.log.format, "json");
        assert!(config.client.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config: ColdstoreConfig = toml::from_str("").unwrap();

        assert_eq!(config.client.region, "us-east-1");
        assert_eq!(
            config.client.endpoint_url(),
            "https://glacier.us-east-1.amazonaws.com"
        );
        assert_eq!(config.client.part_size().unwrap(), PartSize::DEFAULT);
        assert_eq!(config.client.max_attempts, 10);
        assert!(config.credentials.access_key_id.is_none());
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_part_size() {
        let toml_str = r#"
[client]
part_size_mib = 3
"#;
        let config: ColdstoreConfig = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            config.client.validate(),
            Err(ColdstoreError::InvalidPartSize(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ColdstoreConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ColdstoreConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.client.region, parsed.client.region);
        assert_eq!(config.client.part_size_mib, parsed.client.part_size_mib);
        assert_eq!(config.log.format, parsed.log.format);
    }
}
