use std::path::Path;

use async_trait::async_trait;
use hagicode_platform::Platform;

use crate::error::SourceError;
use crate::types::{ConfigValidation, ProgressFn, SourceKind, Version};

/// A backend that can enumerate installable service versions and fetch
/// their packages.
#[async_trait]
pub trait PackageSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Human readable location, used in logs.
    fn describe(&self) -> String;

    /// Versions for the platform this source was created for, newest first.
    async fn list_available_versions(&self) -> Result<Vec<Version>, SourceError>;

    /// Copy the package of `version` to `cache_path`.
    ///
    /// `on_progress` is invoked at least once, after the last byte is written.
    async fn download_package(
        &self,
        version: &Version,
        cache_path: &Path,
        on_progress: Option<&ProgressFn>,
    ) -> Result<(), SourceError>;

    async fn validate_config(&self) -> ConfigValidation {
        ConfigValidation::valid()
    }
}

/// Drop every version that does not target `platform`.
#[must_use]
pub fn retain_platform(versions: Vec<Version>, platform: Platform) -> Vec<Version> {
    versions
        .into_iter()
        .filter(|version| version.platform == platform)
        .collect()
}
