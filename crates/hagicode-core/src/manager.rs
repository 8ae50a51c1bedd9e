use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hagicode_appsettings::AppSettingsError;
use hagicode_platform::AppPaths;
use hagicode_source::{ConfigValidation, PackageSource, ProgressFn, SourceError, Version};
use log::{info, warn};
use tempfile::TempPath;
use thiserror::Error;

use crate::install::{InstallError, install_package};
use crate::state::{
    ActiveVersionInfo, InstalledVersionInfo, StateError, StateSnapshot, VersionStateStore,
};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    AppSettings(#[from] AppSettingsError),
    #[error("Version {0} is not installed")]
    VersionNotInstalled(String),
    #[error("Version {0} is not available from the package source")]
    VersionNotAvailable(String),
    #[error("No package source is available")]
    NoPackageSource,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ManagerError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Ties a package source, the state store and the filesystem layout
/// together into the install/switch/uninstall workflow.
pub struct VersionManager {
    paths: Arc<AppPaths>,
    store: VersionStateStore,
    source: Option<Box<dyn PackageSource>>,
    data_dir_override: Option<PathBuf>,
}

impl VersionManager {
    #[must_use]
    pub fn new(paths: Arc<AppPaths>, source: Box<dyn PackageSource>) -> Self {
        Self::with_source(paths, Some(source))
    }

    /// A manager limited to installed versions and the active pointer.
    /// Listing and installing fail with [`ManagerError::NoPackageSource`].
    #[must_use]
    pub fn offline(paths: Arc<AppPaths>) -> Self {
        Self::with_source(paths, None)
    }

    fn with_source(paths: Arc<AppPaths>, source: Option<Box<dyn PackageSource>>) -> Self {
        let store = VersionStateStore::new(&paths);
        Self {
            paths,
            store,
            source,
            data_dir_override: None,
        }
    }

    /// Use `data_dir` for every installed version instead of the per-version
    /// default under `apps/data`.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        self.data_dir_override = data_dir;
        self
    }

    #[must_use]
    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    #[must_use]
    pub fn store(&self) -> &VersionStateStore {
        &self.store
    }

    #[must_use]
    pub fn source(&self) -> Option<&dyn PackageSource> {
        self.source.as_deref()
    }

    fn require_source(&self) -> Result<&dyn PackageSource, ManagerError> {
        self.source().ok_or(ManagerError::NoPackageSource)
    }

    pub async fn list_versions(&self) -> Result<Vec<Version>, ManagerError> {
        Ok(self.require_source()?.list_available_versions().await?)
    }

    /// Look up a listed version by id or by version string.
    pub async fn find_available(&self, query: &str) -> Result<Version, ManagerError> {
        let query = query.trim().trim_start_matches('v');
        self.list_versions()
            .await?
            .into_iter()
            .find(|version| version.id == query || version.version == query)
            .ok_or_else(|| ManagerError::VersionNotAvailable(query.to_string()))
    }

    pub async fn installed_versions(&self) -> Result<Vec<InstalledVersionInfo>, ManagerError> {
        Ok(self.store.installed_versions().await?)
    }

    pub async fn active_version(&self) -> Result<Option<ActiveVersionInfo>, ManagerError> {
        Ok(self.store.active_version().await?)
    }

    pub async fn validate_source(&self) -> ConfigValidation {
        match self.source() {
            Some(source) => source.validate_config().await,
            None => ConfigValidation::invalid(ManagerError::NoPackageSource.to_string()),
        }
    }

    pub async fn export_state(&self) -> StateSnapshot {
        self.store.export_state().await
    }

    /// Download, extract, record and configure `version`.
    ///
    /// The cached package is removed once extracted, and also when the
    /// install fails or its future is dropped.
    pub async fn install(
        &self,
        version: &Version,
        on_progress: Option<&ProgressFn>,
        activate: bool,
    ) -> Result<InstalledVersionInfo, ManagerError> {
        let source = self.require_source()?;
        info!("Installing {} from {}", version.id, source.describe());
        let cached = TempPath::from_path(self.paths.cached_package_path(&version.package_filename));
        source
            .download_package(version, &cached, on_progress)
            .await?;

        let install_path = self.paths.installed_version_path(&version.id);
        let outcome = install_package(&cached, &install_path).await;
        let cache_path = cached.to_path_buf();
        if let Err(error) = cached.close() {
            warn!(
                "Failed to remove cached package {}: {error}",
                cache_path.display()
            );
        }
        let outcome = outcome?;
        if let Some(declared) = outcome.manifest_version.as_deref()
            && declared != version.version
        {
            warn!(
                "Package {} declares version {declared} in its manifest",
                version.id
            );
        }

        let info = InstalledVersionInfo {
            id: version.id.clone(),
            version: version.version.clone(),
            platform: version.platform,
            package_filename: version.package_filename.clone(),
            install_path,
            installed_at: Utc::now(),
            status: outcome.status,
            dependencies: outcome.dependencies,
            is_active: false,
        };
        self.store.set_installed_version(info).await?;

        let data_dir = self.data_dir_for(&version.id);
        self.write_data_dir(&version.id, data_dir).await?;

        if activate {
            self.store.set_active_version(&version.id).await?;
        }

        self.store
            .installed_version(&version.id)
            .await?
            .ok_or_else(|| ManagerError::VersionNotInstalled(version.id.clone()))
    }

    /// Remove the install directory and its record. Data directories are
    /// left in place.
    pub async fn uninstall(&self, version_id: &str) -> Result<(), ManagerError> {
        let Some(info) = self.store.installed_version(version_id).await? else {
            return Err(ManagerError::VersionNotInstalled(version_id.to_string()));
        };

        match tokio::fs::remove_dir_all(&info.install_path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Install directory {} already gone",
                    info.install_path.display()
                );
            }
            Err(error) => {
                return Err(ManagerError::io("failed to remove install directory", error));
            }
        }

        self.store.remove_installed_version(version_id).await?;
        info!("Uninstalled {version_id}");
        Ok(())
    }

    pub async fn switch_version(
        &self,
        version_id: &str,
    ) -> Result<ActiveVersionInfo, ManagerError> {
        if self.store.installed_version(version_id).await?.is_none() {
            return Err(ManagerError::VersionNotInstalled(version_id.to_string()));
        }

        let active = self.store.set_active_version(version_id).await?;
        info!("Switched active version to {version_id}");
        Ok(active)
    }

    pub async fn clear_active_version(&self) -> Result<(), ManagerError> {
        Ok(self.store.clear_active_version().await?)
    }

    /// Point an installed version at `data_dir`.
    pub async fn set_data_dir(
        &self,
        version_id: &str,
        data_dir: &Path,
    ) -> Result<(), ManagerError> {
        if self.store.installed_version(version_id).await?.is_none() {
            return Err(ManagerError::VersionNotInstalled(version_id.to_string()));
        }
        self.write_data_dir(version_id, data_dir.to_path_buf()).await
    }

    fn data_dir_for(&self, version_id: &str) -> PathBuf {
        self.data_dir_override
            .clone()
            .unwrap_or_else(|| self.paths.version_data_path(version_id))
    }

    async fn write_data_dir(
        &self,
        version_id: &str,
        data_dir: PathBuf,
    ) -> Result<(), ManagerError> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|error| ManagerError::io("failed to create data directory", error))?;

        let settings_path = self.paths.app_settings_path(version_id);
        tokio::task::spawn_blocking(move || {
            hagicode_appsettings::update_data_dir(&settings_path, &data_dir)
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use hagicode_platform::AppPaths;
    use hagicode_source::{
        PackageLocator, PackageSource, ProgressFn, SourceError, SourceKind, Version,
    };

    use super::{ManagerError, VersionManager};
    use crate::install::InstallError;

    const FILENAME: &str = "hagicode-1.0.0-linux-x64.zip";

    fn version() -> Version {
        Version::from_package_filename(FILENAME, PackageLocator::File(PathBuf::from(FILENAME)))
            .expect("package filename should parse")
    }

    /// Writes `content` to the cache path and, when `stall` is set, never
    /// finishes.
    struct ScriptedSource {
        content: &'static [u8],
        stall: bool,
    }

    #[async_trait]
    impl PackageSource for ScriptedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::LocalFolder
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn list_available_versions(&self) -> Result<Vec<Version>, SourceError> {
            Ok(vec![version()])
        }

        async fn download_package(
            &self,
            _version: &Version,
            cache_path: &Path,
            _on_progress: Option<&ProgressFn>,
        ) -> Result<(), SourceError> {
            if let Some(parent) = cache_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .expect("cache dir should be created");
            }
            tokio::fs::write(cache_path, self.content)
                .await
                .expect("package bytes should be written");
            if self.stall {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn manager(user_data: &Path, source: ScriptedSource) -> VersionManager {
        let paths = Arc::new(AppPaths::from_user_data(user_data));
        VersionManager::new(paths, Box::new(source))
    }

    #[tokio::test]
    async fn offline_manager_handles_state_but_not_packages() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let manager = VersionManager::offline(Arc::new(AppPaths::from_user_data(temp.path())));

        assert!(
            manager
                .installed_versions()
                .await
                .expect("state readable")
                .is_empty()
        );
        manager.clear_active_version().await.expect("nothing to clear");
        assert!(matches!(
            manager.switch_version("hagicode-1.0.0-linux-x64").await,
            Err(ManagerError::VersionNotInstalled(_))
        ));
        assert!(matches!(
            manager.list_versions().await,
            Err(ManagerError::NoPackageSource)
        ));
        assert!(!manager.validate_source().await.valid);
    }

    #[tokio::test]
    async fn timed_out_install_removes_partial_download() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let manager = manager(
            temp.path(),
            ScriptedSource {
                content: b"partial",
                stall: true,
            },
        );
        let cache_path = manager.paths().cached_package_path(FILENAME);

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            manager.install(&version(), None, false),
        )
        .await;

        assert!(result.is_err());
        assert!(!cache_path.exists());
    }

    #[tokio::test]
    async fn failed_extraction_removes_cached_package() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let manager = manager(
            temp.path(),
            ScriptedSource {
                content: b"not a zip",
                stall: false,
            },
        );

        let result = manager.install(&version(), None, false).await;

        assert!(matches!(
            result,
            Err(ManagerError::Install(InstallError::Zip { .. }))
        ));
        assert!(!manager.paths().cached_package_path(FILENAME).exists());
        assert!(
            manager
                .installed_versions()
                .await
                .expect("state readable")
                .is_empty()
        );
    }
}
