//! Platform-specific state directory management

use crate::error::{CoreError, CoreResult};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Manages platform-specific application directories
#[derive(Debug, Clone)]
pub struct StateDir {
    /// Project directories from the directories crate
    project_dirs: Option<ProjectDirs>,
    /// Override directory for testing or custom installations
    override_dir: Option<PathBuf>,
}

impl StateDir {
    /// Create a new StateDir instance
    pub fn new() -> Self {
        let project_dirs = ProjectDirs::from("rs", "Latch", "latch");
        if project_dirs.is_none() {
            warn!("Failed to determine platform-specific directories, will use fallback");
        }
        Self {
            project_dirs,
            override_dir: None,
        }
    }

    /// Create a new StateDir with an override directory
    pub fn with_override(path: impl Into<PathBuf>) -> Self {
        Self {
            project_dirs: None,
            override_dir: Some(path.into()),
        }
    }

    /// Get the configuration directory
    pub fn config_dir(&self) -> PathBuf {
        if let Some(override_dir) = &self.override_dir {
            return override_dir.join("config");
        }

        self.project_dirs.as_ref().map_or_else(
            || PathBuf::from("./config"),
            |dirs| dirs.config_dir().to_path_buf(),
        )
    }

    /// Get the data directory for persistent storage
    pub fn data_dir(&self) -> PathBuf {
        if let Some(override_dir) = &self.override_dir {
            return override_dir.join("data");
        }

        self.project_dirs.as_ref().map_or_else(
            || PathBuf::from("./data"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
    }

    /// Directory holding persisted credentials (the refresh token)
    pub fn credentials_dir(&self) -> PathBuf {
        self.data_dir().join("credentials")
    }

    /// Get the config path
    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    /// Create all required directories
    pub async fn create_directories(&self) -> CoreResult<()> {
        let dirs = [self.config_dir(), self.data_dir(), self.credentials_dir()];

        for dir in dirs {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                CoreError::io_error(format!("Failed to create directory {}: {e}", dir.display()))
            })?;
            debug!("Ensured directory exists: {}", dir.display());
        }

        Ok(())
    }
}

impl Default for StateDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_override_directory() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = StateDir::with_override(temp_dir.path());

        assert_eq!(state_dir.config_dir(), temp_dir.path().join("config"));
        assert_eq!(state_dir.data_dir(), temp_dir.path().join("data"));
        assert_eq!(
            state_dir.credentials_dir(),
            temp_dir.path().join("data").join("credentials")
        );
        assert_eq!(
            state_dir.config_path(),
            temp_dir.path().join("config").join("config.toml")
        );
    }

    #[tokio::test]
    async fn test_create_directories() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = StateDir::with_override(temp_dir.path());

        state_dir.create_directories().await.unwrap();

        assert!(state_dir.config_dir().exists());
        assert!(state_dir.data_dir().exists());
        assert!(state_dir.credentials_dir().exists());
    }
}
