use hagicode_source::DownloadProgress;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})";

pub fn download_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .map_or_else(
            |_| ProgressStyle::default_bar(),
            |style| style.progress_chars("#>-"),
        );
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar
}

/// Adapt a progress bar to the download callback.
pub fn progress_callback(bar: ProgressBar) -> impl Fn(DownloadProgress) + Send + Sync + 'static {
    move |progress: DownloadProgress| {
        if progress.total > 0 {
            bar.set_length(progress.total);
        }
        bar.set_position(progress.current);
    }
}
