use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use hagicode_platform::{AppPaths, Platform};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::atomic::write_atomic;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl StateError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStatus {
    InstalledReady,
    InstalledIncomplete,
}

impl InstallStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InstalledReady => "installed-ready",
            Self::InstalledIncomplete => "installed-incomplete",
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledVersionInfo {
    pub id: String,
    pub version: String,
    pub platform: Platform,
    pub package_filename: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    pub status: InstallStatus,
    #[serde(default)]
    pub dependencies: Vec<Value>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveVersionInfo {
    pub version_id: String,
    pub switched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub installed_versions: Vec<InstalledVersionInfo>,
    pub active_version: Option<ActiveVersionInfo>,
}

/// Persists which versions are installed and which one is active.
///
/// Mutations hold one async lock for their whole read-modify-write cycle and
/// each document is replaced atomically, so concurrent callers never lose
/// updates and readers never see a half written file. Every document a
/// mutation depends on is read before anything is written, so a corrupt file
/// fails the call without touching the other one.
#[derive(Debug)]
pub struct VersionStateStore {
    installed_file: PathBuf,
    active_file: PathBuf,
    lock: Mutex<()>,
}

impl VersionStateStore {
    #[must_use]
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            installed_file: paths.installed_versions_file(),
            active_file: paths.active_version_file(),
            lock: Mutex::new(()),
        }
    }

    /// Installed versions in stored order; empty when nothing is recorded.
    ///
    /// # Errors
    /// Returns [`StateError::Corrupt`] when the file exists but cannot be
    /// parsed, or an I/O error when it cannot be read.
    pub async fn installed_versions(&self) -> Result<Vec<InstalledVersionInfo>, StateError> {
        Ok(read_json(&self.installed_file).await?.unwrap_or_default())
    }

    /// # Errors
    /// See [`Self::installed_versions`].
    pub async fn installed_version(
        &self,
        id: &str,
    ) -> Result<Option<InstalledVersionInfo>, StateError> {
        Ok(self
            .installed_versions()
            .await?
            .into_iter()
            .find(|info| info.id == id))
    }

    /// # Errors
    /// Returns an error when the document cannot be written.
    pub async fn set_installed_versions(
        &self,
        versions: &[InstalledVersionInfo],
    ) -> Result<(), StateError> {
        let _guard = self.lock.lock().await;
        write_json(&self.installed_file, &versions).await
    }

    /// Replace the record with the same id in place, or append it.
    ///
    /// The `is_active` flag is derived from the active pointer.
    ///
    /// # Errors
    /// Returns an error when either document cannot be read or written.
    pub async fn set_installed_version(
        &self,
        mut info: InstalledVersionInfo,
    ) -> Result<(), StateError> {
        let _guard = self.lock.lock().await;
        let active: Option<ActiveVersionInfo> = read_json(&self.active_file).await?;
        info.is_active = active.is_some_and(|active| active.version_id == info.id);

        let mut versions = self.installed_versions().await?;
        match versions.iter_mut().find(|existing| existing.id == info.id) {
            Some(existing) => *existing = info,
            None => versions.push(info),
        }
        write_json(&self.installed_file, &versions).await
    }

    /// Returns whether a record was removed. The active pointer is cleared
    /// when it referenced the removed version.
    ///
    /// # Errors
    /// Returns an error when either document cannot be read or written.
    pub async fn remove_installed_version(&self, id: &str) -> Result<bool, StateError> {
        let _guard = self.lock.lock().await;
        let mut versions = self.installed_versions().await?;
        let active: Option<ActiveVersionInfo> = read_json(&self.active_file).await?;

        let before = versions.len();
        versions.retain(|info| info.id != id);
        let removed = versions.len() != before;
        if removed {
            write_json(&self.installed_file, &versions).await?;
        }
        if active.is_some_and(|active| active.version_id == id) {
            debug!("Clearing active pointer to removed version {id}");
            remove_if_exists(&self.active_file).await?;
        }

        Ok(removed)
    }

    /// # Errors
    /// Returns [`StateError::Corrupt`] for an unparsable pointer file.
    pub async fn active_version(&self) -> Result<Option<ActiveVersionInfo>, StateError> {
        read_json(&self.active_file).await
    }

    /// Point the active version at `version_id`, stamped with the current
    /// time, and update the `is_active` flags to match.
    ///
    /// # Errors
    /// Returns an error when either document cannot be read or written.
    pub async fn set_active_version(
        &self,
        version_id: &str,
    ) -> Result<ActiveVersionInfo, StateError> {
        let _guard = self.lock.lock().await;
        let mut versions = self.installed_versions().await?;
        let active = ActiveVersionInfo {
            version_id: version_id.to_string(),
            switched_at: Utc::now(),
        };

        if mark_active(&mut versions, Some(version_id)) {
            write_json(&self.installed_file, &versions).await?;
        }
        write_json(&self.active_file, &active).await?;
        Ok(active)
    }

    /// Succeeds when nothing is active.
    ///
    /// # Errors
    /// Returns an error when the pointer cannot be deleted or the installed
    /// list cannot be updated.
    pub async fn clear_active_version(&self) -> Result<(), StateError> {
        let _guard = self.lock.lock().await;
        let mut versions = self.installed_versions().await?;

        if mark_active(&mut versions, None) {
            write_json(&self.installed_file, &versions).await?;
        }
        remove_if_exists(&self.active_file).await
    }

    /// Diagnostics view of both documents. Errors are logged and read as
    /// empty.
    pub async fn export_state(&self) -> StateSnapshot {
        let (installed, active) = tokio::join!(self.installed_versions(), self.active_version());

        StateSnapshot {
            installed_versions: installed.unwrap_or_else(|error| {
                warn!("Exporting empty installed list: {error}");
                Vec::new()
            }),
            active_version: active.unwrap_or_else(|error| {
                warn!("Exporting without active version: {error}");
                None
            }),
        }
    }
}

/// Returns whether any flag changed.
fn mark_active(versions: &mut [InstalledVersionInfo], active_id: Option<&str>) -> bool {
    let mut changed = false;
    for info in versions {
        let is_active = active_id == Some(info.id.as_str());
        if info.is_active != is_active {
            info.is_active = is_active;
            changed = true;
        }
    }
    changed
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(StateError::io(path, error)),
    };

    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(source) => {
            warn!("State file {} is corrupt: {source}", path.display());
            Err(StateError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    let data = serde_json::to_vec_pretty(value).map_err(StateError::Serialize)?;
    write_atomic(path, &data)
        .await
        .map_err(|error| StateError::io(path, error))
}

async fn remove_if_exists(path: &Path) -> Result<(), StateError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(StateError::io(path, error)),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use chrono::Utc;
    use hagicode_platform::{AppPaths, Platform};

    use super::{InstallStatus, InstalledVersionInfo, StateError, VersionStateStore};

    fn record(id: &str) -> InstalledVersionInfo {
        InstalledVersionInfo {
            id: id.to_string(),
            version: "1.0.0".to_string(),
            platform: Platform::LinuxX64,
            package_filename: format!("{id}.zip"),
            install_path: PathBuf::from("/tmp").join(id),
            installed_at: Utc::now(),
            status: InstallStatus::InstalledReady,
            dependencies: Vec::new(),
            is_active: false,
        }
    }

    fn store() -> (tempfile::TempDir, AppPaths, VersionStateStore) {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = AppPaths::from_user_data(temp.path());
        let store = VersionStateStore::new(&paths);
        (temp, paths, store)
    }

    #[tokio::test]
    async fn missing_files_read_as_empty() {
        let (_temp, _paths, store) = store();

        assert!(store.installed_versions().await.expect("read").is_empty());
        assert_eq!(store.active_version().await.expect("read"), None);
    }

    #[tokio::test]
    async fn installed_list_round_trips_in_order() {
        let (_temp, paths, store) = store();
        let list = vec![record("b"), record("a"), record("c")];

        store.set_installed_versions(&list).await.expect("write");

        assert_eq!(store.installed_versions().await.expect("read"), list);
        let raw = std::fs::read_to_string(paths.installed_versions_file()).expect("file");
        assert!(raw.contains("\"packageFilename\""));
        assert!(raw.contains("\"installed-ready\""));
    }

    #[tokio::test]
    async fn set_installed_version_replaces_in_place() {
        let (_temp, _paths, store) = store();
        store
            .set_installed_versions(&[record("a"), record("b")])
            .await
            .expect("write");
        let mut updated = record("a");
        updated.version = "2.0.0".to_string();

        store.set_installed_version(updated).await.expect("update");
        store.set_installed_version(record("c")).await.expect("append");

        let versions = store.installed_versions().await.expect("read");
        let ids: Vec<_> = versions.iter().map(|info| info.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(versions[0].version, "2.0.0");
    }

    #[tokio::test]
    async fn active_flags_follow_the_pointer() {
        let (_temp, _paths, store) = store();
        store
            .set_installed_versions(&[record("a"), record("b")])
            .await
            .expect("write");

        store.set_active_version("b").await.expect("activate b");
        let flags: Vec<_> = store
            .installed_versions()
            .await
            .expect("read")
            .iter()
            .map(|info| info.is_active)
            .collect();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(
            store
                .active_version()
                .await
                .expect("read")
                .map(|active| active.version_id),
            Some("b".to_string())
        );

        store.clear_active_version().await.expect("clear");
        store.clear_active_version().await.expect("clear twice");
        assert_eq!(store.active_version().await.expect("read"), None);
        assert!(
            store
                .installed_versions()
                .await
                .expect("read")
                .iter()
                .all(|info| !info.is_active)
        );
    }

    #[tokio::test]
    async fn removing_active_version_clears_pointer() {
        let (_temp, _paths, store) = store();
        store
            .set_installed_versions(&[record("a"), record("b")])
            .await
            .expect("write");
        store.set_active_version("a").await.expect("activate");

        assert!(store.remove_installed_version("a").await.expect("remove"));
        assert!(!store.remove_installed_version("a").await.expect("remove again"));

        assert_eq!(store.active_version().await.expect("read"), None);
        assert_eq!(store.installed_versions().await.expect("read").len(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error_but_export_is_empty() {
        let (_temp, paths, store) = store();
        std::fs::create_dir_all(paths.versions_state_dir()).expect("state dir");
        std::fs::write(paths.installed_versions_file(), b"{ not json").expect("write");

        assert!(matches!(
            store.installed_versions().await,
            Err(StateError::Corrupt { .. })
        ));
        let snapshot = store.export_state().await;
        assert!(snapshot.installed_versions.is_empty());
        assert_eq!(snapshot.active_version, None);
    }

    #[tokio::test]
    async fn failed_activation_leaves_pointer_untouched() {
        let (_temp, paths, store) = store();
        store.set_installed_versions(&[record("a")]).await.expect("write");
        store.set_active_version("a").await.expect("activate a");
        std::fs::write(paths.installed_versions_file(), b"{ broken").expect("corrupt");

        assert!(matches!(
            store.set_active_version("b").await,
            Err(StateError::Corrupt { .. })
        ));
        assert!(store.clear_active_version().await.is_err());

        let active = store.active_version().await.expect("read");
        assert_eq!(active.map(|active| active.version_id), Some("a".to_string()));
    }

    #[tokio::test]
    async fn failed_removal_leaves_installed_list_untouched() {
        let (_temp, paths, store) = store();
        store
            .set_installed_versions(&[record("a"), record("b")])
            .await
            .expect("write");
        std::fs::write(paths.active_version_file(), b"not json").expect("corrupt");

        assert!(store.remove_installed_version("a").await.is_err());

        assert_eq!(store.installed_versions().await.expect("read").len(), 2);
    }

    #[tokio::test]
    async fn concurrent_updates_are_not_lost() {
        let (_temp, _paths, store) = store();
        let store = Arc::new(store);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .set_installed_version(record(&format!("v{i}")))
                        .await
                        .expect("update");
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("task joins");
        }

        assert_eq!(store.installed_versions().await.expect("read").len(), 16);
    }
}
