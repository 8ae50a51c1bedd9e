use hagicode_core::ManagerError;
use hagicode_platform::{AppPathsError, PlatformError};
use hagicode_source::SourceError;
use thiserror::Error;

use crate::single_instance::AcquireError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to resolve application paths: {0}")]
    Paths(#[from] AppPathsError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Instance(#[from] AcquireError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    #[error("failed to build HTTP client: {details}")]
    HttpClient { details: String },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn timeout(operation: &'static str, seconds: u64) -> Self {
        Self::Timeout { operation, seconds }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn http_client(error: impl std::fmt::Display) -> Self {
        Self::HttpClient {
            details: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use hagicode_core::ManagerError;
    use hagicode_source::SourceError;

    use super::AppError;

    #[test]
    fn timeout_constructor_and_display_match() {
        let error = AppError::timeout("install", 30);

        assert!(matches!(
            error,
            AppError::Timeout {
                operation: "install",
                seconds: 30
            }
        ));
        assert_eq!(error.to_string(), "install timed out after 30s");
    }

    #[test]
    fn wrapped_errors_display_transparently() {
        let source = AppError::from(SourceError::UnknownSourceType {
            tag: "ftp".to_string(),
        });
        let manager = AppError::from(ManagerError::VersionNotInstalled(
            "hagicode-1.0.0-linux-x64".to_string(),
        ));

        assert_eq!(source.to_string(), "Unknown package source type: ftp");
        assert_eq!(
            manager.to_string(),
            "Version hagicode-1.0.0-linux-x64 is not installed"
        );
    }

    #[test]
    fn io_constructor_keeps_context() {
        let error = AppError::io(
            "failed to create application directories",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert_eq!(
            error.to_string(),
            "failed to create application directories: denied"
        );
    }
}
