use std::path::Path;

use futures_util::StreamExt;
use hagicode_source::{DownloadProgress, ProgressFn, SourceError};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

fn report(on_progress: Option<&ProgressFn>, current: u64, total: u64) {
    if let Some(callback) = on_progress {
        callback(DownloadProgress::new(current, total));
    }
}

async fn create_destination(dest: &Path) -> Result<tokio::fs::File, SourceError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| SourceError::io_with_path(parent, &error))?;
    }
    tokio::fs::File::create(dest)
        .await
        .map_err(|error| SourceError::io_with_path(dest, &error))
}

async fn discard_partial(dest: &Path) {
    if let Err(error) = tokio::fs::remove_file(dest).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(
            "Failed to remove partial download {}: {error}",
            dest.display()
        );
    }
}

fn verify_digest(filename: &str, expected: &str, actual: &str) -> Result<(), SourceError> {
    if actual.eq_ignore_ascii_case(expected) {
        debug!("Checksum verified for {filename}");
        Ok(())
    } else {
        Err(SourceError::ChecksumMismatch {
            filename: filename.to_string(),
            expected: expected.to_ascii_lowercase(),
            actual: actual.to_string(),
        })
    }
}

/// Stream an HTTP response body into `dest`, verifying `expected_sha256`
/// when given. A partial file is removed on failure.
pub(crate) async fn download_to_file(
    request: reqwest::RequestBuilder,
    operation: &'static str,
    dest: &Path,
    expected_sha256: Option<&str>,
    on_progress: Option<&ProgressFn>,
) -> Result<u64, SourceError> {
    let result = stream_response(request, operation, dest, expected_sha256, on_progress).await;
    if result.is_err() {
        discard_partial(dest).await;
    }
    result
}

async fn stream_response(
    request: reqwest::RequestBuilder,
    operation: &'static str,
    dest: &Path,
    expected_sha256: Option<&str>,
    on_progress: Option<&ProgressFn>,
) -> Result<u64, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|error| SourceError::network_request_from(operation, error))?;

    if !response.status().is_success() {
        return Err(SourceError::HttpStatus {
            operation,
            status: response.status().as_u16(),
            url: response.url().to_string(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut hasher = Sha256::new();
    let mut file = create_destination(dest).await?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| SourceError::network_request_from(operation, error))?;
        file.write_all(&chunk)
            .await
            .map_err(|error| SourceError::io_with_path(dest, &error))?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        report(on_progress, downloaded, total);
    }

    file.flush()
        .await
        .map_err(|error| SourceError::io_with_path(dest, &error))?;

    if downloaded == 0 || total != downloaded {
        report(on_progress, downloaded, downloaded);
    }

    if let Some(expected) = expected_sha256 {
        let filename = dest
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
        verify_digest(&filename, expected, &format!("{:x}", hasher.finalize()))?;
    }

    info!("Downloaded {downloaded} bytes to {}", dest.display());
    Ok(downloaded)
}

/// Copy a local package into the cache, reporting progress per chunk.
pub(crate) async fn copy_with_progress(
    src: &Path,
    dest: &Path,
    on_progress: Option<&ProgressFn>,
) -> Result<u64, SourceError> {
    let result = copy_chunks(src, dest, on_progress).await;
    if result.is_err() {
        discard_partial(dest).await;
    }
    result
}

async fn copy_chunks(
    src: &Path,
    dest: &Path,
    on_progress: Option<&ProgressFn>,
) -> Result<u64, SourceError> {
    let mut input = tokio::fs::File::open(src)
        .await
        .map_err(|error| SourceError::io_with_path(src, &error))?;
    let total = input
        .metadata()
        .await
        .map_err(|error| SourceError::io_with_path(src, &error))?
        .len();
    let mut output = create_destination(dest).await?;

    let mut buffer = vec![0_u8; COPY_BUFFER_SIZE];
    let mut copied: u64 = 0;
    loop {
        let read = input
            .read(&mut buffer)
            .await
            .map_err(|error| SourceError::io_with_path(src, &error))?;
        if read == 0 {
            break;
        }
        output
            .write_all(&buffer[..read])
            .await
            .map_err(|error| SourceError::io_with_path(dest, &error))?;
        copied += read as u64;
        report(on_progress, copied, total);
    }

    output
        .flush()
        .await
        .map_err(|error| SourceError::io_with_path(dest, &error))?;

    if copied == 0 {
        report(on_progress, 0, 0);
    }

    debug!("Copied {} to {}", src.display(), dest.display());
    Ok(copied)
}
