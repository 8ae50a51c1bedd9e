mod github_release;
mod http_index;
mod local_folder;

pub use github_release::GitHubReleaseSource;
pub use http_index::HttpIndexSource;
pub use local_folder::LocalFolderSource;
