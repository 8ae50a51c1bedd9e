use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::state::InstallStatus;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("installation was cancelled")]
    Cancelled,
    #[error("installation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InstallError {
    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstallOutcome {
    pub status: InstallStatus,
    pub dependencies: Vec<Value>,
    pub manifest_version: Option<String>,
}

impl InstallOutcome {
    fn incomplete() -> Self {
        Self {
            status: InstallStatus::InstalledIncomplete,
            dependencies: Vec::new(),
            manifest_version: None,
        }
    }
}

/// Raises the flag when dropped, so a blocking extraction stops once the
/// future awaiting it is gone.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Extract `archive` into `destination`, replacing whatever was there.
///
/// The archive is unpacked into a sibling staging directory first so a
/// failed or cancelled extraction leaves the previous install untouched.
///
/// # Errors
/// Returns an error when the archive cannot be read or the destination
/// cannot be written.
pub async fn install_package(
    archive: &Path,
    destination: &Path,
) -> Result<InstallOutcome, InstallError> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel = CancelOnDrop(Arc::clone(&cancelled));

    tokio::task::spawn_blocking(move || install_blocking(&archive, &destination, &cancelled))
        .await?
}

fn install_blocking(
    archive: &Path,
    destination: &Path,
    cancelled: &AtomicBool,
) -> Result<InstallOutcome, InstallError> {
    let parent = destination
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    std::fs::create_dir_all(&parent).map_err(|error| {
        InstallError::io_with_path("failed to create install directory", &parent, &error)
    })?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&parent)
        .map_err(|error| {
            InstallError::io_with_path("failed to create staging directory", &parent, &error)
        })?;

    extract_zip(archive, staging.path(), cancelled)?;
    let outcome = read_manifest(staging.path());

    if cancelled.load(Ordering::Relaxed) {
        return Err(InstallError::Cancelled);
    }
    if destination.exists() {
        std::fs::remove_dir_all(destination).map_err(|error| {
            InstallError::io_with_path("failed to remove previous install", destination, &error)
        })?;
    }

    let staged = staging.keep();
    std::fs::rename(&staged, destination).map_err(|error| {
        let _ = std::fs::remove_dir_all(&staged);
        InstallError::io_with_path("failed to move staged install", destination, &error)
    })?;

    info!(
        "Installed {} into {} ({})",
        archive.display(),
        destination.display(),
        outcome.status
    );
    Ok(outcome)
}

fn read_manifest(root: &Path) -> InstallOutcome {
    let path = root.join(MANIFEST_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(error) => {
            debug!("No readable {MANIFEST_FILE} in package: {error}");
            return InstallOutcome::incomplete();
        }
    };

    let manifest: PackageManifest = match serde_json::from_str(&content) {
        Ok(manifest) => manifest,
        Err(error) => {
            warn!("Ignoring malformed {MANIFEST_FILE}: {error}");
            return InstallOutcome::incomplete();
        }
    };

    InstallOutcome {
        status: InstallStatus::InstalledReady,
        dependencies: manifest
            .dependencies
            .map(dependency_list)
            .unwrap_or_default(),
        manifest_version: manifest.version,
    }
}

/// Dependencies may be a list of entries or a `{ name: requirement }` map.
fn dependency_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) => map
            .into_iter()
            .map(|(name, requirement)| {
                serde_json::json!({ "name": name, "requirement": requirement })
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("Unexpected dependencies value in {MANIFEST_FILE}: {other}");
            Vec::new()
        }
    }
}

fn extract_zip(zip_path: &Path, dest: &Path, cancelled: &AtomicBool) -> Result<(), InstallError> {
    let file = std::fs::File::open(zip_path).map_err(|error| {
        InstallError::io_with_path("failed to open package archive", zip_path, &error)
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::zip("failed to read package archive", error))?;

    for i in 0..archive.len() {
        if cancelled.load(Ordering::Relaxed) {
            return Err(InstallError::Cancelled);
        }
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::zip("failed to read archive entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                InstallError::io_with_path("failed to create directory", &out_path, &error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                InstallError::io_with_path("failed to create directory", parent, &error)
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            InstallError::io_with_path("failed to create extracted file", &out_path, &error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            InstallError::io_with_path("failed to extract archive entry", &out_path, &error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extracted {} to {}", zip_path.display(), dest.display());
    Ok(())
}
