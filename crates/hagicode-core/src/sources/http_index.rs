use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hagicode_platform::Platform;
use hagicode_source::{
    ConfigValidation, PackageLocator, PackageSource, ProgressFn, SourceError, SourceKind, Version,
    retain_platform, sort_newest_first,
};
use log::{debug, warn};
use reqwest::Url;
use serde::Deserialize;

use crate::download::download_to_file;

#[derive(Debug, Deserialize)]
struct IndexDocument {
    #[serde(default)]
    versions: Vec<IndexVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexVersion {
    version: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    files: Vec<IndexFile>,
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    sha256: Option<String>,
}

/// A static `index.json` listing versions and their package files.
#[derive(Clone)]
pub struct HttpIndexSource {
    index_url: String,
    client: reqwest::Client,
    platform: Platform,
}

impl HttpIndexSource {
    #[must_use]
    pub fn new(index_url: String, client: reqwest::Client, platform: Platform) -> Self {
        Self {
            index_url,
            client,
            platform,
        }
    }

    fn base_url(&self) -> Result<Url, SourceError> {
        Url::parse(&self.index_url).map_err(|error| {
            SourceError::invalid_config(format!("invalid index URL {}: {error}", self.index_url))
        })
    }

    async fn fetch_index(&self) -> Result<IndexDocument, SourceError> {
        const OPERATION: &str = "fetch package index";
        let url = self.base_url()?;
        debug!("Fetching package index from {url}");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| SourceError::network_request_from(OPERATION, error))?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                operation: OPERATION,
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|error| SourceError::network_parse_from(OPERATION, error))
    }

    fn resolve_file_url(base: &Url, version: &str, file: &IndexFile) -> Option<String> {
        if let Some(url) = &file.url {
            return base.join(url).ok().map(String::from);
        }
        base.join(&format!("{version}/{}", file.name))
            .ok()
            .map(String::from)
    }

    fn index_versions(base: &Url, document: IndexDocument) -> Vec<Version> {
        let mut versions = Vec::new();
        for entry in document.versions {
            for file in &entry.files {
                let Some(url) = Self::resolve_file_url(base, &entry.version, file) else {
                    warn!("Skipping {}: cannot resolve download URL", file.name);
                    continue;
                };
                match Version::from_package_filename(&file.name, PackageLocator::Url(url)) {
                    Ok(mut version) => {
                        version.version.clone_from(&entry.version);
                        version.size = file.size;
                        version.sha256.clone_from(&file.sha256);
                        version.published_at = entry.published_at;
                        versions.push(version);
                    }
                    Err(error) => debug!("Skipping index file {}: {error}", file.name),
                }
            }
        }
        versions
    }
}

#[async_trait]
impl PackageSource for HttpIndexSource {
    fn kind(&self) -> SourceKind {
        SourceKind::HttpIndex
    }

    fn describe(&self) -> String {
        format!("package index {}", self.index_url)
    }

    async fn list_available_versions(&self) -> Result<Vec<Version>, SourceError> {
        let base = self.base_url()?;
        let document = self.fetch_index().await?;
        let mut versions = retain_platform(Self::index_versions(&base, document), self.platform);
        sort_newest_first(&mut versions);
        Ok(versions)
    }

    async fn download_package(
        &self,
        version: &Version,
        cache_path: &Path,
        on_progress: Option<&ProgressFn>,
    ) -> Result<(), SourceError> {
        let PackageLocator::Url(url) = &version.locator else {
            return Err(SourceError::LocatorMismatch {
                source_kind: SourceKind::HttpIndex.as_str(),
                locator: format!("{:?}", version.locator),
            });
        };

        download_to_file(
            self.client.get(url),
            "download package",
            cache_path,
            version.sha256.as_deref(),
            on_progress,
        )
        .await?;
        Ok(())
    }

    async fn validate_config(&self) -> ConfigValidation {
        match self.fetch_index().await {
            Ok(document) if document.versions.is_empty() => {
                ConfigValidation::invalid("Package index lists no versions")
            }
            Ok(_) => ConfigValidation::valid(),
            Err(error) => ConfigValidation::invalid(error.to_string()),
        }
    }
}
