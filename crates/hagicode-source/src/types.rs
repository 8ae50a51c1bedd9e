use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use hagicode_platform::{Platform, PlatformError};
use regex::Regex;
use serde::{Deserialize, Serialize};

static PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<stem>[A-Za-z0-9_.]+?-(?P<version>\d+\.\d+\.\d+(?:-[0-9A-Za-z.]+)?)-(?:linux-x64|win-x64|osx-x64|darwin-arm64)(?:-[0-9A-Za-z_.-]+)?)\.zip$",
    )
    .expect("package name regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Not a service package name: {filename}")]
    InvalidPackageName { filename: String },
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Where a listed package can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "location")]
pub enum PackageLocator {
    File(PathBuf),
    Url(String),
}

/// An installable release for one platform, as listed by a package source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    pub version: String,
    pub platform: Platform,
    pub package_filename: String,
    pub locator: PackageLocator,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl Version {
    /// Build a version from a package filename of the form
    /// `<name>-<semver>-<platform>[-variant].zip`.
    ///
    /// # Errors
    /// Returns an error when the filename does not follow that shape.
    pub fn from_package_filename(
        filename: &str,
        locator: PackageLocator,
    ) -> Result<Self, VersionParseError> {
        let platform = Platform::from_filename(filename)?;
        let captures =
            PACKAGE_NAME
                .captures(filename)
                .ok_or_else(|| VersionParseError::InvalidPackageName {
                    filename: filename.to_string(),
                })?;

        Ok(Self {
            id: captures["stem"].to_string(),
            version: captures["version"].to_string(),
            platform,
            package_filename: filename.to_string(),
            locator,
            size: None,
            sha256: None,
            published_at: None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub current: u64,
    pub total: u64,
    pub percentage: f64,
}

impl DownloadProgress {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(current: u64, total: u64) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64 * 100.0).min(100.0)
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

pub type ProgressFn = dyn Fn(DownloadProgress) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    LocalFolder,
    GithubRelease,
    HttpIndex,
}

impl SourceKind {
    pub const ALL: [Self; 3] = [Self::LocalFolder, Self::GithubRelease, Self::HttpIndex];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalFolder => "local-folder",
            Self::GithubRelease => "github-release",
            Self::HttpIndex => "http-index",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum PackageSourceConfig {
    LocalFolder {
        path: PathBuf,
    },
    GithubRelease {
        owner: String,
        repo: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    HttpIndex {
        index_url: String,
    },
}

impl PackageSourceConfig {
    #[must_use]
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::LocalFolder { .. } => SourceKind::LocalFolder,
            Self::GithubRelease { .. } => SourceKind::GithubRelease,
            Self::HttpIndex { .. } => SourceKind::HttpIndex,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigValidation {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConfigValidation {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

fn parse_semver(version: &str) -> Option<semver::Version> {
    semver::Version::parse(version.trim().trim_start_matches('v')).ok()
}

/// Newest first; versions that are not valid semver sort last, by string.
#[must_use]
pub fn compare_newest_first(a: &Version, b: &Version) -> Ordering {
    match (parse_semver(&a.version), parse_semver(&b.version)) {
        (Some(a_ver), Some(b_ver)) => b_ver.cmp(&a_ver),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.version.cmp(&a.version),
    }
    .then_with(|| a.package_filename.cmp(&b.package_filename))
}

pub fn sort_newest_first(versions: &mut [Version]) {
    versions.sort_by(compare_newest_first);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(filename: &str) -> Version {
        Version::from_package_filename(filename, PackageLocator::File(PathBuf::from(filename)))
            .expect("valid package name in test")
    }

    #[test]
    fn from_package_filename_extracts_fields() {
        let v = local("hagicode-1.2.3-linux-x64.zip");
        assert_eq!(v.id, "hagicode-1.2.3-linux-x64");
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.platform, Platform::LinuxX64);
        assert_eq!(v.package_filename, "hagicode-1.2.3-linux-x64.zip");
    }

    #[test]
    fn from_package_filename_keeps_prerelease_and_variant() {
        let v = local("hagicode-2.0.0-beta.4-osx-x64-nort.zip");
        assert_eq!(v.id, "hagicode-2.0.0-beta.4-osx-x64-nort");
        assert_eq!(v.version, "2.0.0-beta.4");
        assert_eq!(v.platform, Platform::OsxX64);
    }

    #[test]
    fn from_package_filename_rejects_foreign_names() {
        let missing_platform = Version::from_package_filename(
            "hagicode.zip",
            PackageLocator::Url("https://example.invalid/hagicode.zip".to_string()),
        );
        assert!(matches!(
            missing_platform,
            Err(VersionParseError::Platform(PlatformError::Parse { .. }))
        ));

        let missing_version = Version::from_package_filename(
            "hagicode-linux-x64.zip",
            PackageLocator::File(PathBuf::from("hagicode-linux-x64.zip")),
        );
        assert!(matches!(
            missing_version,
            Err(VersionParseError::InvalidPackageName { .. })
        ));
    }

    #[test]
    fn sort_newest_first_orders_by_semver() {
        let mut versions = vec![
            local("hagicode-1.2.0-linux-x64.zip"),
            local("hagicode-1.10.0-linux-x64.zip"),
            local("hagicode-1.10.0-beta.1-linux-x64.zip"),
            local("hagicode-0.9.9-linux-x64.zip"),
        ];

        sort_newest_first(&mut versions);

        let order: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, vec!["1.10.0", "1.10.0-beta.1", "1.2.0", "0.9.9"]);
    }

    #[test]
    fn download_progress_computes_percentage() {
        let halfway = DownloadProgress::new(50, 200);
        assert!((halfway.percentage - 25.0).abs() < f64::EPSILON);

        let unknown_total = DownloadProgress::new(50, 0);
        assert!(unknown_total.percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn source_config_uses_type_tag_and_camel_case_fields() {
        let config: PackageSourceConfig = serde_json::from_str(
            r#"{ "type": "http-index", "indexUrl": "https://example.invalid/index.json" }"#,
        )
        .expect("http-index config parses");
        assert_eq!(
            config,
            PackageSourceConfig::HttpIndex {
                index_url: "https://example.invalid/index.json".to_string()
            }
        );
        assert_eq!(config.kind(), SourceKind::HttpIndex);

        let github = PackageSourceConfig::GithubRelease {
            owner: "HagiCode-org".to_string(),
            repo: "releases".to_string(),
            token: None,
        };
        let value = serde_json::to_value(&github).expect("config serializes");
        assert_eq!(value["type"], "github-release");
        assert!(value.get("token").is_none());
    }

    #[test]
    fn source_kind_names_round_trip() {
        for kind in SourceKind::ALL {
            assert_eq!(SourceKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(SourceKind::from_name("ftp-mirror"), None);
    }
}
