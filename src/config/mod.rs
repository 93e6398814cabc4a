use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::oss::Client;

/// Credentials and bucket location
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Access key ID
    pub access_key_id: String,

    /// Access key secret
    pub access_key_secret: String,

    /// Bucket endpoint, e.g. https://<bucket>.oss-cn-hangzhou.aliyuncs.com
    pub prefix: String,

    /// Bucket name
    pub bucket: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl Config {
    /// Placeholder values written by `osslite init`
    pub fn template() -> Self {
        Self {
            access_key_id: "LTAIxxxxxxxxxxxxxxxxxxxx".to_string(),
            access_key_secret: "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxx".to_string(),
            prefix: "https://xxxxxxxx.oss-cn-hangzhou.aliyuncs.com".to_string(),
            bucket: "xxxxxxxx".to_string(),
        }
    }

    /// Build a client for this bucket
    pub fn client(&self) -> Result<Client> {
        Client::new(
            self.access_key_id.clone(),
            self.access_key_secret.clone(),
            self.prefix.clone(),
            self.bucket.clone(),
        )
        .context("Failed to create OSS client")
    }

    fn validate(&self) -> Result<()> {
        if self.access_key_id.is_empty() {
            anyhow::bail!("access_key_id is empty");
        }
        if self.access_key_secret.is_empty() {
            anyhow::bail!("access_key_secret is empty");
        }
        if !(self.prefix.starts_with("http://") || self.prefix.starts_with("https://")) {
            anyhow::bail!("prefix must be an http(s) URL, got {:?}", self.prefix);
        }
        if self.bucket.is_empty() {
            anyhow::bail!("bucket is empty");
        }
        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;
    config.validate()?;

    Ok(config)
}

/// Write configuration to a YAML file
pub fn write_yaml<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let content = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    std::fs::write(path.as_ref(), content)
        .context(format!("Failed to write config file: {:?}", path.as_ref()))?;
    Ok(())
}

/// Load configuration from environment variables
///
/// - OSS_ACCESS_KEY_ID
/// - OSS_ACCESS_KEY_SECRET
/// - OSS_PREFIX
/// - OSS_BUCKET
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let var = |name: &str| {
        std::env::var(name).context(format!("{} environment variable not set", name))
    };

    let config = Config {
        access_key_id: var("OSS_ACCESS_KEY_ID")?,
        access_key_secret: var("OSS_ACCESS_KEY_SECRET")?,
        prefix: var("OSS_PREFIX")?,
        bucket: var("OSS_BUCKET")?,
    };
    config.validate()?;

    Ok(config)
}

/// Load configuration from file or environment
///
/// Reads the YAML file when a path is given, otherwise falls back to
/// environment variables.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}
