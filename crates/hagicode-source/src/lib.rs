mod error;
mod traits;
mod types;

pub use error::{NetworkStage, SourceError};
pub use traits::{PackageSource, retain_platform};
pub use types::{
    ConfigValidation, DownloadProgress, PackageLocator, PackageSourceConfig, ProgressFn,
    SourceKind, Version, VersionParseError, compare_newest_first, sort_newest_first,
};
