use std::path::PathBuf;

use hagicode_platform::AppPaths;
use hagicode_source::PackageSourceConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Cannot read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub package_source: Option<PackageSourceConfig>,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_http_timeout() -> u64 {
    30
}

fn default_download_timeout() -> u64 {
    1800
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            package_source: None,
            data_dir: None,
            http_timeout_secs: default_http_timeout(),
            download_timeout_secs: default_download_timeout(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    /// A missing file loads as defaults. The caller decides what to do with
    /// an unreadable or malformed one, since logging is not up yet.
    pub fn load(paths: &AppPaths) -> Result<Self, SettingsError> {
        let path = paths.settings_file();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => return Err(SettingsError::Read { path, source }),
        };

        serde_json::from_str(&content)
            .map_err(|source| SettingsError::Malformed { path, source })
    }

    pub async fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        let content = serde_json::to_vec_pretty(self)?;
        hagicode_core::write_atomic(&paths.settings_file(), &content).await
    }

    /// The configured source, or the `packages` folder under the user data
    /// root when none is set.
    pub fn package_source_or_default(&self, paths: &AppPaths) -> PackageSourceConfig {
        self.package_source
            .clone()
            .unwrap_or_else(|| PackageSourceConfig::LocalFolder {
                path: paths.user_data().join("packages"),
            })
    }
}
