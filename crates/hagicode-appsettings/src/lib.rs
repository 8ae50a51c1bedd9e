#![allow(clippy::missing_errors_doc)]

mod config;

pub use config::{
    AppSettingsEdit, AppSettingsError, AppSettingsFile, DATA_DIR_KEY, read_data_dir,
    update_data_dir,
};
