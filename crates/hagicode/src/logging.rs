use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

fn log_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_thread_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Debug)
        .add_filter_allow_str("hagicode")
        .build()
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Keep the newest half of the log, cut at a line boundary.
fn trim_log_file(path: &Path, max_log_size: u64) -> io::Result<()> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.len() > max_log_size => {}
        Ok(_) => return Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(error),
    }

    let contents = std::fs::read(path)?;
    let half = contents.len() / 2;
    let keep_from = contents[half..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(half, |pos| half + pos + 1);
    std::fs::write(path, &contents[keep_from..])
}

/// Each run appends to `log_file`. The terminal gets the same records when
/// `verbose` is set and always in debug builds.
///
/// The terminal logger is still installed when the file cannot be opened;
/// that failure is returned so the caller can report it.
pub fn init_logging(
    log_file: &Path,
    debug_enabled: bool,
    verbose: bool,
    max_log_size: u64,
) -> io::Result<()> {
    let config = log_config();
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if verbose || cfg!(debug_assertions) {
        loggers.push(TermLogger::new(
            LevelFilter::Debug,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    let file = trim_log_file(log_file, max_log_size).and_then(|()| open_log_file(log_file));
    let file_error = match file {
        Ok(file) => {
            loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
            None
        }
        Err(error) => Some(error),
    };

    if !loggers.is_empty() {
        let _ = CombinedLogger::init(loggers);
    }
    set_debug_logging(debug_enabled);

    file_error.map_or(Ok(()), Err)
}

pub fn set_debug_logging(enabled: bool) {
    if enabled {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{open_log_file, set_debug_logging, trim_log_file};

    #[test]
    fn log_file_is_appended_across_runs() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("logs").join("hagicode-desktop.log");

        for line in ["first run\n", "second run\n"] {
            let mut file = open_log_file(&log_path).expect("log file should open");
            file.write_all(line.as_bytes()).expect("log line written");
        }

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log readable"),
            "first run\nsecond run\n"
        );
    }

    #[test]
    fn oversized_log_keeps_recent_half() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("hagicode-desktop.log");
        let original = "line-1\nline-2\nline-3\nline-4\nline-5\n";
        std::fs::write(&log_path, original).expect("test log file should be written");

        trim_log_file(&log_path, 10).expect("trim succeeds");

        let trimmed =
            std::fs::read_to_string(&log_path).expect("trimmed log file should be readable");
        assert!(trimmed.starts_with("line-4\n") || trimmed.starts_with("line-3\n"));
        assert!(!trimmed.contains("line-1"));
        assert!(trimmed.ends_with("line-5\n"));
    }

    #[test]
    fn small_or_missing_log_is_left_alone() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("hagicode-desktop.log");

        trim_log_file(&log_path, 1024).expect("missing log is fine");
        assert!(!log_path.exists());

        std::fs::write(&log_path, "line-1\n").expect("test log file should be written");
        trim_log_file(&log_path, 1024).expect("trim succeeds");

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log readable"),
            "line-1\n"
        );
    }

    #[test]
    fn set_debug_logging_updates_global_level() {
        set_debug_logging(true);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);

        set_debug_logging(false);
        assert_eq!(log::max_level(), log::LevelFilter::Info);
    }
}
