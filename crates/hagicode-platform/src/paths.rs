use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

const APP_DIR_NAME: &str = "hagicode-desktop";
const USER_DATA_ENV: &str = "HAGICODE_USER_DATA";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

/// Every location the desktop shell reads or writes, derived from a single
/// user-data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    user_data: PathBuf,
    apps_installed_dir: PathBuf,
    apps_data_dir: PathBuf,
    config_dir: PathBuf,
    cache_dir: PathBuf,
    state_dir: PathBuf,
    logs_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths rooted at the OS user-data directory.
    ///
    /// `HAGICODE_USER_DATA` overrides the root when set.
    ///
    /// # Errors
    /// Returns an error when the platform data directory cannot be determined.
    pub fn new() -> Result<Self, AppPathsError> {
        if let Some(root) = std::env::var_os(USER_DATA_ENV).filter(|value| !value.is_empty()) {
            return Ok(Self::from_user_data(root));
        }

        let root = dirs::data_dir()
            .ok_or(AppPathsError::DataDirUnavailable)?
            .join(APP_DIR_NAME);
        Ok(Self::from_user_data(root))
    }

    #[must_use]
    pub fn from_user_data(root: impl Into<PathBuf>) -> Self {
        let user_data = root.into();
        let config_dir = user_data.join("config");

        Self {
            apps_installed_dir: user_data.join("apps").join("installed"),
            apps_data_dir: user_data.join("apps").join("data"),
            cache_dir: config_dir.join("cache"),
            state_dir: config_dir.join("state"),
            logs_dir: user_data.join("logs"),
            config_dir,
            user_data,
        }
    }

    #[must_use]
    pub fn user_data(&self) -> &Path {
        &self.user_data
    }

    #[must_use]
    pub fn apps_installed_dir(&self) -> &Path {
        &self.apps_installed_dir
    }

    #[must_use]
    pub fn apps_data_dir(&self) -> &Path {
        &self.apps_data_dir
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    #[must_use]
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    #[must_use]
    pub fn versions_state_dir(&self) -> PathBuf {
        self.state_dir.join("versions")
    }

    #[must_use]
    pub fn installed_versions_file(&self) -> PathBuf {
        self.versions_state_dir().join("installed.json")
    }

    #[must_use]
    pub fn active_version_file(&self) -> PathBuf {
        self.versions_state_dir().join("active.json")
    }

    #[must_use]
    pub fn dependencies_state_file(&self) -> PathBuf {
        self.state_dir.join("dependencies.json")
    }

    #[must_use]
    pub fn web_service_config_file(&self) -> PathBuf {
        self.config_dir.join("web-service.json")
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir.join("hagicode-desktop.log")
    }

    #[must_use]
    pub fn instance_lock_file(&self) -> PathBuf {
        self.user_data.join("instance.lock")
    }

    /// Directory a version is extracted into. No existence check.
    #[must_use]
    pub fn installed_version_path(&self, version_id: &str) -> PathBuf {
        self.apps_installed_dir.join(version_id)
    }

    /// Default data directory handed to a version's service.
    #[must_use]
    pub fn version_data_path(&self, version_id: &str) -> PathBuf {
        self.apps_data_dir.join(version_id)
    }

    #[must_use]
    pub fn app_settings_path(&self, version_id: &str) -> PathBuf {
        self.installed_version_path(version_id)
            .join("config")
            .join("appsettings.yml")
    }

    #[must_use]
    pub fn cached_package_path(&self, filename: &str) -> PathBuf {
        self.cache_dir.join(filename)
    }

    /// Ensure all application directories exist on disk.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.apps_installed_dir.clone(),
            self.apps_data_dir.clone(),
            self.config_dir.clone(),
            self.cache_dir.clone(),
            self.versions_state_dir(),
            self.logs_dir.clone(),
        ] {
            if !dir.is_dir() {
                debug!("Creating directory {}", dir.display());
                std::fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::AppPaths;

    fn test_paths() -> (tempfile::TempDir, AppPaths) {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = AppPaths::from_user_data(temp.path().join("user-data"));
        (temp, paths)
    }

    #[test]
    fn app_settings_path_is_rooted_under_installed_version() {
        let (_temp, paths) = test_paths();

        for version_id in ["hagicode-1.0.0-linux-x64", "x", "hagicode-2.0.0-beta.1-win-x64"] {
            let settings = paths.app_settings_path(version_id);

            assert!(settings.ends_with(Path::new("config").join("appsettings.yml")));
            assert!(settings.starts_with(paths.apps_installed_dir().join(version_id)));
            assert!(
                paths
                    .apps_installed_dir()
                    .ends_with(Path::new("apps").join("installed"))
            );
        }
    }

    #[test]
    fn state_files_use_expected_layout() {
        let (_temp, paths) = test_paths();
        let root = paths.user_data().to_path_buf();

        assert_eq!(
            paths.installed_versions_file(),
            root.join("config/state/versions/installed.json")
        );
        assert_eq!(
            paths.active_version_file(),
            root.join("config/state/versions/active.json")
        );
        assert_eq!(
            paths.dependencies_state_file(),
            root.join("config/state/dependencies.json")
        );
        assert_eq!(
            paths.cached_package_path("hagicode-1.0.0-linux-x64.zip"),
            root.join("config/cache/hagicode-1.0.0-linux-x64.zip")
        );
        assert_eq!(paths.log_file(), root.join("logs/hagicode-desktop.log"));
    }

    #[test]
    fn ensure_directories_is_idempotent() {
        let (_temp, paths) = test_paths();

        paths
            .ensure_directories()
            .expect("first ensure_directories should succeed");
        paths
            .ensure_directories()
            .expect("second ensure_directories should succeed");

        assert!(paths.apps_installed_dir().is_dir());
        assert!(paths.apps_data_dir().is_dir());
        assert!(paths.cache_dir().is_dir());
        assert!(paths.versions_state_dir().is_dir());
        assert!(paths.logs_dir().is_dir());
    }
}
