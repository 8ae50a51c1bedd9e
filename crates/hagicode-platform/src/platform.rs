use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static PLATFORM_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(linux-x64|win-x64|osx-x64|darwin-arm64)").expect("platform tag regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Unsupported platform: {os}/{arch}")]
    Unsupported { os: String, arch: String },

    #[error("No platform tag found in package name: {filename}")]
    Parse { filename: String },
}

/// Target platform of a service package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "win-x64")]
    WinX64,
    #[serde(rename = "osx-x64")]
    OsxX64,
    #[serde(rename = "darwin-arm64")]
    DarwinArm64,
}

impl Platform {
    pub const ALL: [Self; 4] = [Self::LinuxX64, Self::WinX64, Self::OsxX64, Self::DarwinArm64];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinuxX64 => "linux-x64",
            Self::WinX64 => "win-x64",
            Self::OsxX64 => "osx-x64",
            Self::DarwinArm64 => "darwin-arm64",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::LinuxX64 => "Linux (x64)",
            Self::WinX64 => "Windows (x64)",
            Self::OsxX64 => "macOS (Intel)",
            Self::DarwinArm64 => "macOS (Apple Silicon)",
        }
    }

    /// Platform of the running process.
    ///
    /// # Errors
    /// Returns [`PlatformError::Unsupported`] on any OS/architecture pair
    /// that has no service package.
    pub fn current() -> Result<Self, PlatformError> {
        Self::from_os_arch(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map an OS name and CPU architecture (as reported by
    /// `std::env::consts`) to a platform tag.
    ///
    /// # Errors
    /// Returns [`PlatformError::Unsupported`] for unknown combinations.
    pub fn from_os_arch(os: &str, arch: &str) -> Result<Self, PlatformError> {
        match (os, arch) {
            ("linux", "x86_64") => Ok(Self::LinuxX64),
            ("windows", "x86_64") => Ok(Self::WinX64),
            ("macos", "x86_64") => Ok(Self::OsxX64),
            ("macos", "aarch64") => Ok(Self::DarwinArm64),
            _ => Err(PlatformError::Unsupported {
                os: os.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    /// Extract the platform tag embedded in a package filename such as
    /// `hagicode-0.1.0-linux-x64.zip`.
    ///
    /// # Errors
    /// Returns [`PlatformError::Parse`] when no tag is present.
    pub fn from_filename(filename: &str) -> Result<Self, PlatformError> {
        PLATFORM_TAG
            .find(filename)
            .and_then(|tag| tag.as_str().parse().ok())
            .ok_or_else(|| PlatformError::Parse {
                filename: filename.to_string(),
            })
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|platform| platform.as_str() == s)
            .ok_or_else(|| PlatformError::Parse {
                filename: s.to_string(),
            })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
