use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hagicode_core::{
    SourceContext, VersionManager, create_package_source, http_client, source_config_from_value,
};
use hagicode_platform::{AppPaths, Platform};
use hagicode_source::{PackageSource, PackageSourceConfig, Version};
use log::info;

use crate::cli::{Command, SourceAction};
use crate::error::AppError;
use crate::progress::{download_bar, progress_callback};
use crate::settings::AppSettings;

fn build_source(
    paths: &AppPaths,
    settings: &AppSettings,
) -> Result<Box<dyn PackageSource>, AppError> {
    let client = http_client(Duration::from_secs(settings.http_timeout_secs))
        .map_err(AppError::http_client)?;
    let context = SourceContext::for_current_platform(client)?;
    let config = settings.package_source_or_default(paths);
    let source = create_package_source(&config, &context);
    info!("Using {}", source.describe());
    Ok(source)
}

fn build_manager(
    paths: &Arc<AppPaths>,
    settings: &AppSettings,
) -> Result<VersionManager, AppError> {
    let source = build_source(paths, settings)?;
    Ok(VersionManager::new(Arc::clone(paths), source).with_data_dir(settings.data_dir.clone()))
}

/// For commands that only touch installed versions, so they keep working on
/// hosts without a service package.
fn offline_manager(paths: &Arc<AppPaths>, settings: &AppSettings) -> VersionManager {
    VersionManager::offline(Arc::clone(paths)).with_data_dir(settings.data_dir.clone())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_size(size: Option<u64>) -> String {
    const MIB: u64 = 1024 * 1024;
    match size {
        Some(bytes) if bytes >= MIB => format!("{} MiB", bytes / MIB),
        Some(bytes) => format!("{} KiB", bytes.div_ceil(1024)),
        None => "-".to_string(),
    }
}

fn print_versions(versions: &[Version]) {
    if versions.is_empty() {
        println!("No versions available for this platform.");
        return;
    }
    for version in versions {
        println!(
            "{:<16} {:<10} {}",
            version.version,
            format_size(version.size),
            version.id
        );
    }
}

fn absolute(path: &Path) -> Result<std::path::PathBuf, AppError> {
    std::path::absolute(path).map_err(|error| AppError::io("failed to resolve path", error))
}

pub async fn run(
    command: Command,
    paths: Arc<AppPaths>,
    settings: &mut AppSettings,
) -> Result<(), AppError> {
    match command {
        Command::Versions { json } => {
            let versions = build_manager(&paths, settings)?.list_versions().await?;
            if json {
                print_json(&versions)?;
            } else {
                print_versions(&versions);
            }
        }
        Command::Install { version, activate } => {
            install(&paths, settings, &version, activate).await?;
        }
        Command::Installed { json } => {
            let installed = offline_manager(&paths, settings).installed_versions().await?;
            if json {
                print_json(&installed)?;
            } else if installed.is_empty() {
                println!("No versions installed.");
            } else {
                for info in &installed {
                    let marker = if info.is_active { "*" } else { " " };
                    println!(
                        "{marker} {:<16} {:<22} {}",
                        info.version, info.status, info.id
                    );
                }
            }
        }
        Command::Uninstall { id } => {
            offline_manager(&paths, settings).uninstall(&id).await?;
            println!("Uninstalled {id}");
        }
        Command::Use { id } => {
            let active = offline_manager(&paths, settings).switch_version(&id).await?;
            println!("Active version: {}", active.version_id);
        }
        Command::Active => match offline_manager(&paths, settings).active_version().await? {
            Some(active) => println!(
                "{} (since {})",
                active.version_id,
                active.switched_at.to_rfc3339()
            ),
            None => println!("No active version."),
        },
        Command::ClearActive => {
            offline_manager(&paths, settings).clear_active_version().await?;
            println!("Active version cleared.");
        }
        Command::SetDataDir { id, dir } => {
            let dir = absolute(&dir)?;
            offline_manager(&paths, settings)
                .set_data_dir(&id, &dir)
                .await?;
            let stored = hagicode_appsettings::read_data_dir(&paths.app_settings_path(&id))
                .map_err(hagicode_core::ManagerError::from)?;
            println!(
                "DataDir for {id}: {}",
                stored.unwrap_or_else(|| dir.display().to_string())
            );
        }
        Command::ValidateSource => {
            let source = build_source(&paths, settings)?;
            let validation = source.validate_config().await;
            if validation.valid {
                println!("{} is valid.", source.describe());
            } else {
                println!(
                    "{} is invalid: {}",
                    source.describe(),
                    validation.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Command::ExportState => {
            let snapshot = offline_manager(&paths, settings).export_state().await;
            print_json(&snapshot)?;
        }
        Command::Paths => print_paths(&paths),
        Command::Source { action } => source(&paths, settings, action).await?,
    }

    Ok(())
}

async fn install(
    paths: &Arc<AppPaths>,
    settings: &AppSettings,
    query: &str,
    activate: bool,
) -> Result<(), AppError> {
    let manager = build_manager(paths, settings)?;
    let version = manager.find_available(query).await?;

    let bar = download_bar(&version.package_filename);
    let on_progress = progress_callback(bar.clone());
    let seconds = settings.download_timeout_secs;
    let result = tokio::time::timeout(
        Duration::from_secs(seconds),
        manager.install(&version, Some(&on_progress), activate),
    )
    .await;
    bar.finish_and_clear();

    let installed = result.map_err(|_| AppError::timeout("install", seconds))??;
    println!(
        "Installed {} ({}) into {}",
        installed.id,
        installed.status,
        installed.install_path.display()
    );
    if installed.is_active {
        println!("Active version: {}", installed.id);
    }
    Ok(())
}

async fn source(
    paths: &AppPaths,
    settings: &mut AppSettings,
    action: Option<SourceAction>,
) -> Result<(), AppError> {
    let config = match action {
        None | Some(SourceAction::Show) => {
            print_json(&settings.package_source_or_default(paths))?;
            return Ok(());
        }
        Some(SourceAction::Local { path }) => PackageSourceConfig::LocalFolder {
            path: absolute(&path)?,
        },
        Some(SourceAction::Github { owner, repo, token }) => {
            PackageSourceConfig::GithubRelease { owner, repo, token }
        }
        Some(SourceAction::Index { url }) => PackageSourceConfig::HttpIndex { index_url: url },
        Some(SourceAction::Json { value }) => {
            source_config_from_value(serde_json::from_str(&value)?)?
        }
    };

    println!("Package source set to {}", config.kind());
    settings.package_source = Some(config);
    settings
        .save(paths)
        .await
        .map_err(|error| AppError::io("failed to save settings", error))
}

fn print_paths(paths: &AppPaths) {
    let rows = [
        ("user data", paths.user_data().to_path_buf()),
        ("installed versions", paths.apps_installed_dir().to_path_buf()),
        ("data", paths.apps_data_dir().to_path_buf()),
        ("config", paths.config_dir().to_path_buf()),
        ("cache", paths.cache_dir().to_path_buf()),
        ("installed list", paths.installed_versions_file()),
        ("active pointer", paths.active_version_file()),
        ("dependencies", paths.dependencies_state_file()),
        ("web service config", paths.web_service_config_file()),
        ("settings", paths.settings_file()),
        ("log file", paths.log_file()),
    ];
    let platform = Platform::current().map_or_else(
        |error| error.to_string(),
        |platform| format!("{} ({platform})", platform.display_name()),
    );
    println!("{:<20} {platform}", "platform");
    for (label, path) in rows {
        println!("{label:<20} {}", path.display());
    }
}
