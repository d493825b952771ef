//! File system operations
//!
//! Small async probes over the served tree.

use std::path::Path;
use tokio::fs;

/// Check if file exists
pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Check if directory exists
pub async fn directory_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}
