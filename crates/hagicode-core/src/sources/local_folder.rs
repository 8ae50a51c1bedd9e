use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hagicode_platform::Platform;
use hagicode_source::{
    ConfigValidation, PackageLocator, PackageSource, ProgressFn, SourceError, SourceKind, Version,
    retain_platform, sort_newest_first,
};
use log::debug;

use crate::download::copy_with_progress;

/// Packages dropped into a directory on disk, e.g. an offline bundle.
#[derive(Debug, Clone)]
pub struct LocalFolderSource {
    path: PathBuf,
    platform: Platform,
}

impl LocalFolderSource {
    #[must_use]
    pub fn new(path: PathBuf, platform: Platform) -> Self {
        Self { path, platform }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn scan(&self) -> Result<Vec<Version>, SourceError> {
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound {
                    location: self.path.display().to_string(),
                });
            }
            Err(error) => return Err(SourceError::io_with_path(&self.path, &error)),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| SourceError::io_with_path(&self.path, &error))?
        {
            let path = entry.path();
            let is_zip = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
            if !is_zip {
                continue;
            }
            let metadata = entry
                .metadata()
                .await
                .map_err(|error| SourceError::io_with_path(&path, &error))?;
            if !metadata.is_file() {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().into_owned();
            match Version::from_package_filename(&filename, PackageLocator::File(path.clone())) {
                Ok(mut version) => {
                    version.size = Some(metadata.len());
                    versions.push(version);
                }
                Err(error) => debug!("Skipping {}: {error}", path.display()),
            }
        }

        Ok(versions)
    }
}

#[async_trait]
impl PackageSource for LocalFolderSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LocalFolder
    }

    fn describe(&self) -> String {
        format!("local folder {}", self.path.display())
    }

    async fn list_available_versions(&self) -> Result<Vec<Version>, SourceError> {
        let mut versions = retain_platform(self.scan().await?, self.platform);
        sort_newest_first(&mut versions);
        debug!(
            "Found {} {} package(s) in {}",
            versions.len(),
            self.platform,
            self.path.display()
        );
        Ok(versions)
    }

    async fn download_package(
        &self,
        version: &Version,
        cache_path: &Path,
        on_progress: Option<&ProgressFn>,
    ) -> Result<(), SourceError> {
        let PackageLocator::File(src) = &version.locator else {
            return Err(SourceError::LocatorMismatch {
                source_kind: SourceKind::LocalFolder.as_str(),
                locator: format!("{:?}", version.locator),
            });
        };

        copy_with_progress(src, cache_path, on_progress).await?;
        Ok(())
    }

    async fn validate_config(&self) -> ConfigValidation {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) if metadata.is_dir() => ConfigValidation::valid(),
            Ok(_) => ConfigValidation::invalid(format!(
                "{} is not a directory",
                self.path.display()
            )),
            Err(error) => ConfigValidation::invalid(format!(
                "Cannot access {}: {error}",
                self.path.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use hagicode_platform::Platform;
    use hagicode_source::{PackageLocator, PackageSource, SourceError, Version};

    use super::LocalFolderSource;

    fn folder_with(files: &[&str]) -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        for name in files {
            std::fs::write(temp.path().join(name), name.as_bytes()).expect("package written");
        }
        temp
    }

    #[tokio::test]
    async fn lists_only_current_platform_packages() {
        let temp = folder_with(&["hagicode-1.2.3-linux-x64.zip", "hagicode-1.2.3-win-x64.zip"]);
        let source = LocalFolderSource::new(temp.path().to_path_buf(), Platform::LinuxX64);

        let versions = source
            .list_available_versions()
            .await
            .expect("listing succeeds");

        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].platform, Platform::LinuxX64);
        assert_eq!(versions[0].version, "1.2.3");
        assert_eq!(versions[0].size, Some(28));
    }

    #[tokio::test]
    async fn skips_unrelated_files_and_sorts_newest_first() {
        let temp = folder_with(&[
            "hagicode-1.0.0-osx-x64.zip",
            "hagicode-1.1.0-osx-x64.zip",
            "hagicode.zip",
            "notes.txt",
            "hagicode-0.9.0-osx-x64.zip",
        ]);
        let source = LocalFolderSource::new(temp.path().to_path_buf(), Platform::OsxX64);

        let first = source
            .list_available_versions()
            .await
            .expect("listing succeeds");
        let second = source
            .list_available_versions()
            .await
            .expect("listing succeeds");

        let order: Vec<_> = first.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, vec!["1.1.0", "1.0.0", "0.9.0"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_folder_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let source = LocalFolderSource::new(temp.path().join("absent"), Platform::LinuxX64);

        assert!(matches!(
            source.list_available_versions().await,
            Err(SourceError::NotFound { .. })
        ));
        assert!(!source.validate_config().await.valid);
    }

    #[tokio::test]
    async fn download_copies_package_to_cache() {
        let temp = folder_with(&["hagicode-1.2.3-linux-x64.zip"]);
        let source = LocalFolderSource::new(temp.path().to_path_buf(), Platform::LinuxX64);
        let versions = source
            .list_available_versions()
            .await
            .expect("listing succeeds");
        let cache_path = temp.path().join("cache").join(&versions[0].package_filename);

        source
            .download_package(&versions[0], &cache_path, None)
            .await
            .expect("download succeeds");

        assert_eq!(
            std::fs::read(&cache_path).expect("cached package readable"),
            b"hagicode-1.2.3-linux-x64.zip"
        );
    }

    #[tokio::test]
    async fn download_rejects_remote_locator() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let source = LocalFolderSource::new(temp.path().to_path_buf(), Platform::LinuxX64);
        let version = Version::from_package_filename(
            "hagicode-1.2.3-linux-x64.zip",
            PackageLocator::Url("https://example.invalid/hagicode-1.2.3-linux-x64.zip".into()),
        )
        .expect("valid package name");

        let result = source
            .download_package(&version, &temp.path().join("out.zip"), None)
            .await;

        assert!(matches!(result, Err(SourceError::LocatorMismatch { .. })));
    }
}
