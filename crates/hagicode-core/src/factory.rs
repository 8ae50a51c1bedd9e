use std::time::Duration;

use hagicode_platform::Platform;
use hagicode_source::{PackageSource, PackageSourceConfig, SourceError, SourceKind};
use log::debug;

use crate::sources::{GitHubReleaseSource, HttpIndexSource, LocalFolderSource};

/// Everything a source needs besides its own configuration.
#[derive(Clone)]
pub struct SourceContext {
    pub platform: Platform,
    pub client: reqwest::Client,
}

impl SourceContext {
    #[must_use]
    pub fn new(platform: Platform, client: reqwest::Client) -> Self {
        Self { platform, client }
    }

    /// Context for the running machine.
    ///
    /// # Errors
    /// Returns an error when the host is not a supported platform.
    pub fn for_current_platform(
        client: reqwest::Client,
    ) -> Result<Self, hagicode_platform::PlatformError> {
        Ok(Self::new(Platform::current()?, client))
    }
}

/// Shared HTTP client with the desktop user agent.
///
/// `timeout` bounds connecting and each read, not a whole transfer, so large
/// package downloads are not cut off.
///
/// # Errors
/// Returns an error when the TLS backend cannot be initialized.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .user_agent(format!("hagicode-desktop/{}", env!("CARGO_PKG_VERSION")))
        .build()
}

#[must_use]
pub fn create_package_source(
    config: &PackageSourceConfig,
    context: &SourceContext,
) -> Box<dyn PackageSource> {
    debug!("Creating {} package source", config.kind());
    match config {
        PackageSourceConfig::LocalFolder { path } => {
            Box::new(LocalFolderSource::new(path.clone(), context.platform))
        }
        PackageSourceConfig::GithubRelease { owner, repo, token } => {
            Box::new(GitHubReleaseSource::new(
                owner.clone(),
                repo.clone(),
                token.clone(),
                context.client.clone(),
                context.platform,
            ))
        }
        PackageSourceConfig::HttpIndex { index_url } => Box::new(HttpIndexSource::new(
            index_url.clone(),
            context.client.clone(),
            context.platform,
        )),
    }
}

/// Parse a stored source configuration, distinguishing an unknown `type`
/// tag from a malformed body.
///
/// # Errors
/// Returns [`SourceError::UnknownSourceType`] for unrecognized tags and
/// [`SourceError::InvalidConfig`] for everything else that fails to parse.
pub fn source_config_from_value(
    value: serde_json::Value,
) -> Result<PackageSourceConfig, SourceError> {
    let Some(tag) = value.get("type").and_then(serde_json::Value::as_str) else {
        return Err(SourceError::invalid_config("missing string field `type`"));
    };
    if SourceKind::from_name(tag).is_none() {
        return Err(SourceError::UnknownSourceType {
            tag: tag.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|error| SourceError::invalid_config(error.to_string()))
}
