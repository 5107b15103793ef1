//! CLI configuration utilities

use anyhow::{Context, Result};
use latch_http::ClientConfig;
use std::path::{Path, PathBuf};

/// Load the client configuration and apply command-line overrides.
///
/// Without `--config`, the file in the state directory's config location is
/// used when it exists.
pub fn load(
    path: Option<&Path>,
    state_dir: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<ClientConfig> {
    let default_path = state_dir_config_path(state_dir.clone());
    let path = path.or_else(|| Some(default_path.as_path()).filter(|p| p.exists()));

    let mut config = ClientConfig::load(path)
        .with_context(|| format!("failed to load configuration from {path:?}"))?;
    apply_overrides(&mut config, state_dir, base_url);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut ClientConfig, state_dir: Option<PathBuf>, base_url: Option<String>) {
    if let Some(state_dir) = state_dir {
        config.state_dir = Some(state_dir);
    }
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
}

fn state_dir_config_path(state_dir: Option<PathBuf>) -> PathBuf {
    let config = ClientConfig {
        state_dir,
        ..ClientConfig::default()
    };
    config.state_dir().config_path()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_win_over_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("latch.toml");
        std::fs::write(&path, "base_url = \"https://file.example.com\"\n").unwrap();

        let config = load(
            Some(&path),
            Some(temp_dir.path().to_path_buf()),
            Some("https://flag.example.com".into()),
        )
        .unwrap();

        assert_eq!(config.base_url, "https://flag.example.com");
        assert_eq!(config.state_dir.as_deref(), Some(temp_dir.path()));
    }

    #[test]
    fn test_reads_config_from_state_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "base_url = \"https://state.example.com\"\n",
        )
        .unwrap();

        let config = load(None, Some(temp_dir.path().to_path_buf()), None).unwrap();
        assert_eq!(config.base_url, "https://state.example.com");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = load(
            None,
            Some(temp_dir.path().to_path_buf()),
            Some("ftp://example.com".into()),
        );
        assert!(result.is_err());
    }
}
