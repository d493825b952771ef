//! Storage operations
//!
//! Validates and writes uploads into the directory root.

use log::{debug, info};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::error::UploadError;
use crate::storage::filesystem::directory_exists;
use crate::storage::results::UploadTarget;
use crate::storage::root::DirectoryRoot;
use crate::storage::validation::is_directory_spelling;

const BUFFER_SIZE: usize = 8192;

/// Prepares for file storage.
///
/// Checks, in order: confinement, that the target is not a directory, that
/// its parent exists, and finally the declared body length. Nothing is
/// written to disk.
pub async fn prepare_file_storage(
    root: &DirectoryRoot,
    virtual_path: &str,
    content_length: Option<&str>,
) -> Result<UploadTarget, UploadError> {
    let path = root.resolve(virtual_path)?;
    root.confine(&path)?;

    if is_directory_spelling(virtual_path) || directory_exists(&path).await {
        return Err(UploadError::TargetIsDirectory(virtual_path.to_string()));
    }

    match path.parent() {
        Some(parent) if directory_exists(parent).await => {}
        _ => return Err(UploadError::ParentMissing(virtual_path.to_string())),
    }

    let length = match content_length {
        None => return Err(UploadError::LengthRequired),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| UploadError::BadLength(raw.to_string()))?,
    };

    debug!(
        "Prepared file storage for {} (real: {}, {} bytes)",
        virtual_path,
        path.display(),
        length
    );

    Ok(UploadTarget {
        virtual_path: virtual_path.to_string(),
        path,
        length,
    })
}

/// Copies exactly `target.length` bytes from `body` into the target file,
/// creating or truncating it.
///
/// Each read waits at most `read_timeout`. No cleanup happens on failure:
/// whatever was received stays on disk.
pub async fn store_upload<R>(
    target: &UploadTarget,
    body: &mut R,
    read_timeout: Duration,
) -> Result<u64, UploadError>
where
    R: AsyncRead + Unpin,
{
    let mut file = File::create(&target.path).await?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut received = 0u64;

    while received < target.length {
        let want = (target.length - received).min(BUFFER_SIZE as u64) as usize;
        let n = match timeout(read_timeout, body.read(&mut buffer[..want])).await {
            Ok(result) => result?,
            Err(_) => {
                file.flush().await?;
                return Err(UploadError::TimedOut);
            }
        };

        if n == 0 {
            file.flush().await?;
            return Err(UploadError::Truncated {
                expected: target.length,
                received,
            });
        }

        file.write_all(&buffer[..n]).await?;
        received += n as u64;
    }

    file.flush().await?;

    info!(
        "Stored upload {} ({} bytes)",
        target.path.display(),
        received
    );

    Ok(received)
}
