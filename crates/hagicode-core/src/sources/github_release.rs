use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hagicode_platform::Platform;
use hagicode_source::{
    ConfigValidation, PackageLocator, PackageSource, ProgressFn, SourceError, SourceKind, Version,
    retain_platform, sort_newest_first,
};
use log::debug;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::download::download_to_file;

const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const MAX_PAGES: u32 = 20;

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_.-]+$").expect("name regex is valid"));

#[derive(Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Deserialize)]
struct GitHubAsset {
    name: String,
    url: String,
    browser_download_url: String,
    size: u64,
    #[serde(default)]
    digest: Option<String>,
}

/// Release assets of a GitHub repository, optionally private.
#[derive(Clone)]
pub struct GitHubReleaseSource {
    owner: String,
    repo: String,
    token: Option<String>,
    api_base: String,
    client: reqwest::Client,
    platform: Platform,
}

impl GitHubReleaseSource {
    #[must_use]
    pub fn new(
        owner: String,
        repo: String,
        token: Option<String>,
        client: reqwest::Client,
        platform: Platform,
    ) -> Self {
        Self {
            owner,
            repo,
            token: token.filter(|token| !token.trim().is_empty()),
            api_base: GITHUB_API.to_string(),
            client,
            platform,
        }
    }

    /// Point the source at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn fetch_page(&self, page: u32) -> Result<Vec<GitHubRelease>, SourceError> {
        const OPERATION: &str = "list GitHub releases";
        let url = format!(
            "{}/repos/{}/{}/releases?per_page={PER_PAGE}&page={page}",
            self.api_base, self.owner, self.repo
        );
        debug!("Fetching releases page {page} from {url}");

        let response = self
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|error| SourceError::network_request_from(OPERATION, error))?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus {
                operation: OPERATION,
                status: response.status().as_u16(),
                url,
            });
        }

        response
            .json()
            .await
            .map_err(|error| SourceError::network_parse_from(OPERATION, error))
    }

    async fn fetch_releases(&self) -> Result<Vec<GitHubRelease>, SourceError> {
        let mut releases = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(page).await?;
            let last_page = batch.len() < PER_PAGE;
            releases.extend(batch);
            if last_page {
                break;
            }
        }
        Ok(releases)
    }

    fn release_versions(&self, release: GitHubRelease) -> Vec<Version> {
        let version_name = release
            .tag_name
            .strip_prefix('v')
            .unwrap_or(&release.tag_name)
            .to_string();

        release
            .assets
            .into_iter()
            .filter_map(|asset| {
                let locator = if self.token.is_some() {
                    asset.url
                } else {
                    asset.browser_download_url
                };
                match Version::from_package_filename(&asset.name, PackageLocator::Url(locator)) {
                    Ok(mut version) => {
                        version.version.clone_from(&version_name);
                        version.size = Some(asset.size);
                        version.sha256 = asset.digest.as_deref().and_then(parse_sha256_digest);
                        version.published_at = release.published_at;
                        Some(version)
                    }
                    Err(error) => {
                        debug!("Skipping asset {}: {error}", asset.name);
                        None
                    }
                }
            })
            .collect()
    }
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}

#[async_trait]
impl PackageSource for GitHubReleaseSource {
    fn kind(&self) -> SourceKind {
        SourceKind::GithubRelease
    }

    fn describe(&self) -> String {
        format!("GitHub releases of {}/{}", self.owner, self.repo)
    }

    async fn list_available_versions(&self) -> Result<Vec<Version>, SourceError> {
        let releases = self.fetch_releases().await?;
        let versions = releases
            .into_iter()
            .filter(|release| !release.draft)
            .flat_map(|release| self.release_versions(release))
            .collect();

        let mut versions = retain_platform(versions, self.platform);
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
                source_kind: SourceKind::GithubRelease.as_str(),
                locator: format!("{:?}", version.locator),
            });
        };

        let request = self.get(url).header(ACCEPT, "application/octet-stream");
        download_to_file(
            request,
            "download GitHub release asset",
            cache_path,
            version.sha256.as_deref(),
            on_progress,
        )
        .await?;
        Ok(())
    }

    async fn validate_config(&self) -> ConfigValidation {
        for (label, value) in [("owner", &self.owner), ("repository", &self.repo)] {
            if !NAME_REGEX.is_match(value) {
                return ConfigValidation::invalid(format!(
                    "GitHub {label} name {value:?} contains invalid characters"
                ));
            }
        }

        let url = format!("{}/repos/{}/{}", self.api_base, self.owner, self.repo);
        let response = match self
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                return ConfigValidation::invalid(format!("Failed to reach GitHub: {error}"));
            }
        };

        match response.status() {
            status if status.is_success() => ConfigValidation::valid(),
            StatusCode::UNAUTHORIZED => {
                ConfigValidation::invalid("GitHub rejected the access token")
            }
            StatusCode::FORBIDDEN => ConfigValidation::invalid(format!(
                "Access to {}/{} was denied (token scope or rate limit)",
                self.owner, self.repo
            )),
            StatusCode::NOT_FOUND => ConfigValidation::invalid(format!(
                "Repository {}/{} was not found or is not accessible",
                self.owner, self.repo
            )),
            status => ConfigValidation::invalid(format!("GitHub responded with HTTP {status}")),
        }
    }
}
