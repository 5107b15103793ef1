//! Client configuration
//!
//! Values are layered: built-in defaults, then an optional TOML/YAML file,
//! then `LATCH_*` environment variables (`LATCH_BASE_URL`,
//! `LATCH_TIMEOUT_SECS`, `LATCH_USER_AGENT`, `LATCH_STATE_DIR`).

use latch_core::{CoreError, CoreResult, StateDir};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables read by [`ClientConfig::load`]
pub const ENV_PREFIX: &str = "LATCH";

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the authentication backend
    pub base_url: String,

    /// Transport timeout in seconds (0 = no timeout)
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Override for the directory holding persisted credentials
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
            user_agent: concat!("latch/", env!("CARGO_PKG_VERSION")).to_string(),
            state_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a value cannot be parsed
    /// or the resulting configuration is invalid
    pub fn load(path: Option<&Path>) -> CoreResult<Self> {
        Self::load_with_env(path, config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load_with_env(path: Option<&Path>, env: config::Environment) -> CoreResult<Self> {
        let defaults = Self::default();

        let mut builder = config::Config::builder()
            .set_default("base_url", defaults.base_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("user_agent", defaults.user_agent)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Self = builder
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can be used to build a client
    pub fn validate(&self) -> CoreResult<()> {
        let url = url::Url::parse(&self.base_url)
            .map_err(|e| CoreError::invalid_config(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::invalid_config(format!(
                "base_url must use http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// Transport timeout, if one is configured
    pub const fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Where persisted credentials live
    pub fn state_dir(&self) -> StateDir {
        self.state_dir
            .as_ref()
            .map_or_else(StateDir::new, StateDir::with_override)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::with_prefix(ENV_PREFIX).source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(config.user_agent.starts_with("latch/"));
    }

    #[test]
    fn test_file_then_environment_precedence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latch.toml");
        std::fs::write(
            &path,
            "base_url = \"https://auth.example.com\"\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config =
            ClientConfig::load_with_env(Some(&path), env(&[("LATCH_TIMEOUT_SECS", "0")])).unwrap();

        assert_eq!(config.base_url, "https://auth.example.com");
        assert_eq!(config.timeout_secs, 0);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_state_dir_override() {
        let config = ClientConfig::load_with_env(
            None,
            env(&[("LATCH_STATE_DIR", "/tmp/latch-test")]),
        )
        .unwrap();
        assert_eq!(
            config.state_dir().credentials_dir(),
            PathBuf::from("/tmp/latch-test/data/credentials")
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result =
            ClientConfig::load_with_env(None, env(&[("LATCH_BASE_URL", "not a url")]));
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));

        let ftp = ClientConfig {
            base_url: "ftp://example.com".into(),
            ..ClientConfig::default()
        };
        assert!(ftp.validate().is_err());
    }
}
