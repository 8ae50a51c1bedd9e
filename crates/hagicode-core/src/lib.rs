//! Package sources and local version management for Hagicode Desktop.
//!
//! This crate holds the logic that is independent of the command line
//! front end:
//! - Concrete package sources (local folder, GitHub releases, HTTP index)
//!   and the factory selecting one from configuration.
//! - Streaming downloads with progress and checksum verification.
//! - Package extraction and the persisted installed/active version state.
//! - The version manager driving install, switch and uninstall.
#![allow(clippy::missing_errors_doc)]

mod atomic;
mod download;
mod factory;
mod install;
mod manager;
pub mod sources;
mod state;

/// Crash-safe whole-file replacement.
pub use atomic::write_atomic;
/// Source construction from configuration.
pub use factory::{SourceContext, create_package_source, http_client, source_config_from_value};
/// Zip package extraction and manifest inspection.
pub use install::{InstallError, InstallOutcome, install_package};
/// Install/switch/uninstall workflow.
pub use manager::{ManagerError, VersionManager};
/// Persisted installed and active version records.
pub use state::{
    ActiveVersionInfo, InstallStatus, InstalledVersionInfo, StateError, StateSnapshot,
    VersionStateStore,
};
