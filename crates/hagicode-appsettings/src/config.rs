use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info};
use regex::{NoExpand, Regex};
use thiserror::Error;

pub const DATA_DIR_KEY: &str = "DataDir";

const BOM: char = '\u{feff}';

static DATA_DIR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^DataDir[ \t]*:[^\r\n]*").expect("DataDir line pattern should compile")
});

#[derive(Error, Debug)]
pub enum AppSettingsError {
    #[error("IO error on {}: {source}", path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data directory must be absolute: {}", .0.display())]
    RelativeDataDir(PathBuf),

    #[error("Data directory is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

impl AppSettingsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A version's `appsettings.yml`, edited as text so comments and unrelated
/// keys survive untouched.
pub struct AppSettingsFile {
    path: PathBuf,
    content: String,
}

impl AppSettingsFile {
    /// A missing file loads as empty content.
    pub fn load(path: PathBuf) -> Result<Self, AppSettingsError> {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(AppSettingsError::io(&path, error)),
        };

        Ok(Self { path, content })
    }

    #[must_use]
    pub fn from_content(path: PathBuf, content: impl Into<String>) -> Self {
        Self {
            path,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The configured `DataDir`, unquoted.
    #[must_use]
    pub fn data_dir(&self) -> Option<String> {
        let line = DATA_DIR_LINE.find(self.body())?.as_str();
        let (_, value) = line.split_once(':')?;
        let value = unquote(value.trim());
        (!value.is_empty()).then_some(value)
    }

    #[must_use]
    pub fn set_data_dir(&self, data_dir: &str) -> AppSettingsEdit {
        let line = format!("{DATA_DIR_KEY}: \"{}\"", escape_double_quoted(data_dir));
        let body = self.body();
        let bom = &self.content[..self.content.len() - body.len()];
        let newline = if body.contains("\r\n") { "\r\n" } else { "\n" };

        let (modified, change) = if body.trim().is_empty() {
            (format!("{bom}{line}{newline}"), format!("Create {line}"))
        } else if let Some(existing) = DATA_DIR_LINE.find(body) {
            if existing.as_str().trim_end() == line {
                return AppSettingsEdit::unchanged(&self.content);
            }
            (
                format!("{bom}{}", DATA_DIR_LINE.replace(body, NoExpand(&line))),
                format!("Replace {} with {line}", existing.as_str().trim_end()),
            )
        } else {
            let separator = if body.ends_with('\n') { "" } else { newline };
            (
                format!("{}{separator}{line}{newline}", self.content),
                format!("Add {line}"),
            )
        };

        AppSettingsEdit {
            original: self.content.clone(),
            modified,
            changes: vec![change],
        }
    }

    /// Content without a leading byte order mark.
    fn body(&self) -> &str {
        self.content.strip_prefix(BOM).unwrap_or(&self.content)
    }

    pub fn apply_edit(&mut self, edit: &AppSettingsEdit) -> Result<(), AppSettingsError> {
        if !edit.has_changes() {
            debug!("{} already up to date", self.path.display());
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|error| AppSettingsError::io(parent, error))?;
        }

        fs::write(&self.path, &edit.modified)
            .map_err(|error| AppSettingsError::io(&self.path, error))?;
        self.content.clone_from(&edit.modified);

        Ok(())
    }
}

pub struct AppSettingsEdit {
    pub original: String,
    pub modified: String,
    pub changes: Vec<String>,
}

impl AppSettingsEdit {
    fn unchanged(content: &str) -> Self {
        Self {
            original: content.to_string(),
            modified: content.to_string(),
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    #[must_use]
    pub fn diff_preview(&self) -> String {
        if !self.has_changes() {
            return "No changes needed.".to_string();
        }

        let mut preview = String::new();

        for change in &self.changes {
            let _ = writeln!(preview, "+ {change}");
        }

        preview
    }
}

/// Point the `appsettings.yml` at `path` to `data_dir` and write it back.
pub fn update_data_dir(path: &Path, data_dir: &Path) -> Result<AppSettingsEdit, AppSettingsError> {
    if !data_dir.is_absolute() {
        return Err(AppSettingsError::RelativeDataDir(data_dir.to_path_buf()));
    }
    let data_dir_str = data_dir
        .to_str()
        .ok_or_else(|| AppSettingsError::NonUtf8Path(data_dir.to_path_buf()))?;

    let mut file = AppSettingsFile::load(path.to_path_buf())?;
    let edit = file.set_data_dir(data_dir_str);
    file.apply_edit(&edit)?;

    if edit.has_changes() {
        info!("Set {DATA_DIR_KEY} in {} to {data_dir_str}", path.display());
    }
    Ok(edit)
}

pub fn read_data_dir(path: &Path) -> Result<Option<String>, AppSettingsError> {
    Ok(AppSettingsFile::load(path.to_path_buf())?.data_dir())
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unquote(value: &str) -> String {
    if let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        let mut result = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\'
                && let Some(escaped) = chars.next()
            {
                result.push(escaped);
            } else {
                result.push(c);
            }
        }
        return result;
    }

    if let Some(inner) = value
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return inner.replace("''", "'");
    }

    value.to_string()
}
